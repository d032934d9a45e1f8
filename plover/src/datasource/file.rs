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

//! A connector for relational tables exported as CSV or Parquet files. Each
//! table is a single file named `<table>.<format>` under the connection's
//! root directory; the schema is inferred by the DataFusion reader at read
//! time.

use crate::datasource::{DataConnector, RecordSet, SourceDescriptor};
use crate::error::{PloverError, Result};
use async_trait::async_trait;
use datafusion::arrow::datatypes::Schema;
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions, SessionContext};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

/// The file format a connection's tables are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    /// Comma-separated values with a header line.
    Csv,
    /// Apache Parquet.
    Parquet,
}

impl FileFormat {
    fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// A connector reading one file per table from a root directory.
#[derive(Debug, Clone)]
pub struct FileConnector {
    root:   PathBuf,
    format: FileFormat,
}

impl FileConnector {
    /// Creates a connector rooted at `root` for tables in `format`.
    pub fn new<P>(root: P, format: FileFormat) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            root: root.into(),
            format,
        }
    }
}

#[async_trait]
impl DataConnector for FileConnector {
    fn name(&self) -> String {
        self.format.extension().to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn read_table(&self, source: &SourceDescriptor) -> Result<RecordSet> {
        if !self.root.is_dir() {
            return Err(PloverError::Connection(format!(
                "Source directory unreachable: {}",
                self.root.display()
            )));
        }

        let path = self
            .root
            .join(format!("{}.{}", source.object_name(), self.format.extension()));
        if !path.is_file() {
            return Err(PloverError::Schema(format!(
                "Table not found: {} ({})",
                source.table,
                path.display()
            )));
        }
        let path = path.to_str().ok_or_else(|| {
            PloverError::Connection(format!("Non UTF-8 source path: {}", path.display()))
        })?;

        let ctx = SessionContext::new();
        let df = match self.format {
            FileFormat::Csv => {
                let options = CsvReadOptions::new()
                    .has_header(true)
                    .schema_infer_max_records(100);
                ctx.read_csv(path, options).await
            }
            FileFormat::Parquet => ctx.read_parquet(path, ParquetReadOptions::default()).await,
        }
        .map_err(|e| PloverError::Connection(e.to_string()))?;

        let schema = Arc::new(Schema::from(df.schema()));
        let batches = df
            .collect()
            .await
            .map_err(|e| PloverError::Connection(e.to_string()))?;
        Ok(RecordSet::new(schema, batches))
    }
}
