// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Configuration settings that affect all crates in current system.

use ini::Ini;
use lazy_static::lazy_static;
use rusoto_core::Region;
use rusoto_glue::GlueClient;
use rusoto_s3::S3Client;

lazy_static! {
    /// Global settings.
    pub static ref PLOVER_CONF: Ini = Ini::load_from_str(include_str!("./config.toml")).unwrap();

    /// The logical schema the source tables live in.
    pub static ref PLOVER_SOURCE_SCHEMA: String = PLOVER_CONF["plover"]["source_schema"].to_string();
    /// The name of the output table registered in the catalog.
    pub static ref PLOVER_CATALOG_TABLE: String = PLOVER_CONF["plover"]["catalog_table"].to_string();
    /// The partition key columns of the output table.
    pub static ref PLOVER_PARTITION_KEYS: Vec<String> = PLOVER_CONF["sink"]["partition_keys"]
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    /// Plover associated services.
    /// Plover S3 Client.
    pub static ref PLOVER_S3_CLIENT: S3Client = S3Client::new(Region::default());
    /// Plover Glue Data Catalog Client.
    pub static ref PLOVER_GLUE_CLIENT: GlueClient = GlueClient::new(Region::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[tokio::test]
    async fn setting_shows() -> Result<()> {
        let conf = Ini::load_from_str(include_str!("./config.toml")).unwrap();

        for (sec, prop) in &conf {
            println!("Section: {:?}", sec);
            for (key, value) in prop.iter() {
                println!("{:?}:{:?}", key, value);
            }
        }

        assert_eq!("classicmodels", &conf["plover"]["source_schema"]);
        assert_eq!("ratings_ml_training", &conf["plover"]["catalog_table"]);
        assert_eq!(vec!["customerNumber".to_string()], *PLOVER_PARTITION_KEYS);

        Ok(())
    }
}
