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

//! The command-line front door. It resolves the required run parameters
//! (absence of any of them fails the process before a read happens), builds
//! the connector registry and catalog backend, and launches one pipeline
//! run. The process exits non-zero with the triggering error if any stage
//! fails.

use anyhow::{anyhow, Result};
use clap::{crate_version, App, Arg};
use plover::catalog::{CatalogBackend, GlueCatalogBackend, HashMapCatalogBackend};
use plover::config::PLOVER_CONF;
use plover::context::RunParams;
use plover::datasink::PartitionWritePolicy;
use plover::datasource::{connector_from_url, ConnectorRegistry};
use plover::driver::{training_set_sink, BatchPipeline};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("Plover")
        .version(crate_version!())
        .about("Batch extract-join-load pipelines for recommendation training data")
        .author("UMD Database Group")
        .arg(
            Arg::new("job name")
                .short('j')
                .long("job-name")
                .value_name("NAME")
                .help("Sets the job identifier")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("connection")
                .short('c')
                .long("connection")
                .value_name("NAME")
                .help("Sets the connection name of the relational source")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("NAME")
                .help("Sets the catalog database the output table is registered in")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("target path")
                .short('t')
                .long("target-path")
                .value_name("PATH")
                .help("Sets the storage path or s3:// prefix of the output table")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("URL")
                .help("Overrides the connection with a <format>:<directory> connection string")
                .takes_value(true),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("BACKEND")
                .help("Selects the catalog backend: glue or memory")
                .takes_value(true)
                .default_value("glue"),
        )
        .arg(
            Arg::new("replace partitions")
                .long("replace-partitions")
                .help("Clears each partition before writing instead of appending files"),
        )
        .get_matches();

    let mut args = HashMap::new();
    for (key, arg) in [
        ("job_name", "job name"),
        ("connection", "connection"),
        ("database", "database"),
        ("target_path", "target path"),
    ] {
        if let Some(value) = matches.value_of(arg) {
            args.insert(key.to_string(), value.to_string());
        }
    }
    let params = RunParams::resolve(&args).map_err(|e| anyhow!(e))?;

    let mut registry = ConnectorRegistry::from_conf(&PLOVER_CONF)?;
    if let Some(url) = matches.value_of("source") {
        registry.register(params.connection.clone(), connector_from_url(url)?);
    }

    let catalog: Arc<dyn CatalogBackend> = match matches.value_of("catalog") {
        Some("memory") => Arc::new(HashMapCatalogBackend::new()),
        _ => Arc::new(GlueCatalogBackend::new()),
    };

    let write_policy = if matches.is_present("replace partitions") {
        PartitionWritePolicy::Replace
    } else {
        PartitionWritePolicy::Append
    };
    let sink = training_set_sink(&params, write_policy);

    let mut pipeline = BatchPipeline::new(params, registry, catalog, sink);
    match pipeline.run().await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            log::error!("run failed: {}", e);
            Err(anyhow!(e))
        }
    }
}
