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

//! A catalog backend registering tables in the AWS Glue Data Catalog. Tables
//! are written with Hive-compatible Parquet storage descriptors, so Athena,
//! EMR, and Redshift Spectrum can query the output by partition.

use crate::catalog::{CatalogBackend, CatalogUpdatePolicy, ColumnMetadata, TableMetadata};
use crate::config::PLOVER_GLUE_CLIENT;
use crate::error::{PloverError, Result};
use async_trait::async_trait;
use rusoto_core::RusotoError;
use rusoto_glue::{
    Column, CreateTableRequest, GetTableError, GetTableRequest, Glue, SerDeInfo,
    StorageDescriptor, TableInput, UpdateTableRequest,
};
use std::any::Any;
use std::collections::HashMap;

const PARQUET_INPUT_FORMAT: &str =
    "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat";
const PARQUET_OUTPUT_FORMAT: &str =
    "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat";
const PARQUET_SERDE: &str = "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe";

const TEXT_INPUT_FORMAT: &str = "org.apache.hadoop.mapred.TextInputFormat";
const TEXT_OUTPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat";
const CSV_SERDE: &str = "org.apache.hadoop.hive.serde2.OpenCSVSerde";

/// The Hive `(input format, output format, serde)` triple for a data file
/// format name.
fn hive_descriptors(format: &str) -> (&'static str, &'static str, &'static str) {
    match format {
        "csv" => (TEXT_INPUT_FORMAT, TEXT_OUTPUT_FORMAT, CSV_SERDE),
        _ => (PARQUET_INPUT_FORMAT, PARQUET_OUTPUT_FORMAT, PARQUET_SERDE),
    }
}

/// A catalog backend for the AWS Glue Data Catalog.
#[derive(Debug, Clone, Default)]
pub struct GlueCatalogBackend {}

impl GlueCatalogBackend {
    /// Creates a new GlueCatalogBackend using the process-wide Glue client.
    pub fn new() -> Self {
        Self {}
    }
}

fn glue_columns(columns: &[ColumnMetadata]) -> Vec<Column> {
    columns
        .iter()
        .map(|c| Column {
            name: c.name.clone(),
            type_: Some(c.data_type.clone()),
            ..Default::default()
        })
        .collect()
}

fn table_input(table: &TableMetadata) -> TableInput {
    let mut parameters = HashMap::new();
    parameters.insert("classification".to_string(), table.format.clone());
    parameters.insert("compressionType".to_string(), table.compression.clone());
    let (input_format, output_format, serde) = hive_descriptors(&table.format);

    TableInput {
        name: table.name.clone(),
        table_type: Some("EXTERNAL_TABLE".to_string()),
        partition_keys: Some(glue_columns(&table.partition_keys)),
        parameters: Some(parameters),
        storage_descriptor: Some(StorageDescriptor {
            columns: Some(glue_columns(&table.columns)),
            location: Some(table.location.clone()),
            input_format: Some(input_format.to_string()),
            output_format: Some(output_format.to_string()),
            compressed: Some(table.compression != "none"),
            serde_info: Some(SerDeInfo {
                serialization_library: Some(serde.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl CatalogBackend for GlueCatalogBackend {
    fn name(&self) -> String {
        "GlueCatalogBackend".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn register(&self, table: &TableMetadata, policy: CatalogUpdatePolicy) -> Result<()> {
        let existing = PLOVER_GLUE_CLIENT
            .get_table(GetTableRequest {
                database_name: table.database.clone(),
                name: table.name.clone(),
                ..Default::default()
            })
            .await;

        match existing {
            Ok(_) => match policy {
                CatalogUpdatePolicy::UpdateInPlace => {
                    PLOVER_GLUE_CLIENT
                        .update_table(UpdateTableRequest {
                            database_name: table.database.clone(),
                            table_input: table_input(table),
                            skip_archive: Some(true),
                            ..Default::default()
                        })
                        .await
                        .map_err(|e| PloverError::Catalog {
                            desc:         e.to_string(),
                            data_written: false,
                        })?;
                }
                CatalogUpdatePolicy::AppendOnly => {
                    log::debug!(
                        "Glue table {}.{} exists; append-only policy leaves it untouched",
                        table.database,
                        table.name
                    );
                }
            },
            Err(RusotoError::Service(GetTableError::EntityNotFound(_))) => {
                PLOVER_GLUE_CLIENT
                    .create_table(CreateTableRequest {
                        database_name: table.database.clone(),
                        table_input: table_input(table),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| PloverError::Catalog {
                        desc:         e.to_string(),
                        data_written: false,
                    })?;
            }
            Err(e) => {
                return Err(PloverError::Catalog {
                    desc:         e.to_string(),
                    data_written: false,
                })
            }
        }
        Ok(())
    }

    async fn table(&self, database: &str, name: &str) -> Result<Option<TableMetadata>> {
        let response = PLOVER_GLUE_CLIENT
            .get_table(GetTableRequest {
                database_name: database.to_string(),
                name: name.to_string(),
                ..Default::default()
            })
            .await;

        let table = match response {
            Ok(r) => match r.table {
                Some(t) => t,
                None => return Ok(None),
            },
            Err(RusotoError::Service(GetTableError::EntityNotFound(_))) => return Ok(None),
            Err(e) => {
                return Err(PloverError::Catalog {
                    desc:         e.to_string(),
                    data_written: false,
                })
            }
        };

        let from_glue = |columns: Option<Vec<Column>>| -> Vec<ColumnMetadata> {
            columns
                .unwrap_or_default()
                .into_iter()
                .map(|c| ColumnMetadata {
                    name:      c.name,
                    data_type: c.type_.unwrap_or_else(|| "string".to_string()),
                })
                .collect()
        };
        let descriptor = table.storage_descriptor.unwrap_or_default();
        let parameters = table.parameters.unwrap_or_default();

        Ok(Some(TableMetadata {
            database:       database.to_string(),
            name:           table.name,
            location:       descriptor.location.unwrap_or_default(),
            columns:        from_glue(descriptor.columns),
            partition_keys: from_glue(table.partition_keys),
            format:         parameters
                .get("classification")
                .cloned()
                .unwrap_or_else(|| "parquet".to_string()),
            compression:    parameters
                .get("compressionType")
                .cloned()
                .unwrap_or_else(|| "none".to_string()),
        }))
    }
}
