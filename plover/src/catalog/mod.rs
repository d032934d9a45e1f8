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

//! The catalog records the schema and partition layout of written tables so
//! downstream query tools can address the output as a structured table.
//!
//! Out of the box, Plover bundles these catalog backends:
//!
//! - `HashMapCatalogBackend`: holds registrations in process memory. This
//!   backend is always available and is the default for tests and embedded
//!   runs.
//!
//! - `GlueCatalogBackend`: registers tables in the AWS Glue Data Catalog
//!   with Hive-compatible storage descriptors, so the output is queryable
//!   from Athena, EMR, and Spectrum.
//!
//! With the `UpdateInPlace` policy, each run overwrites the recorded schema
//! and partition layout for the table name, so re-running a pipeline against
//! the same target is safe at the catalog level. `AppendOnly` never touches
//! an existing registration.

mod glue;
pub use glue::GlueCatalogBackend;

use crate::error::{PloverError, Result};
use async_trait::async_trait;
use datafusion::arrow::datatypes::{DataType, SchemaRef};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

/// How a run treats an existing catalog registration for its table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogUpdatePolicy {
    /// Overwrite the recorded schema and partition layout on each run.
    UpdateInPlace,
    /// Register the table only if it is absent; never modify an existing
    /// registration.
    AppendOnly,
}

/// A named, Hive-typed column of a registered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// The column name.
    pub name:      String,
    /// The Hive type name, e.g. `bigint` or `string`.
    pub data_type: String,
}

/// The schema and partition layout recorded for a written table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// The catalog database the table belongs to.
    pub database:       String,
    /// The table name.
    pub name:           String,
    /// The storage location of the table root.
    pub location:       String,
    /// The data columns, excluding partition keys.
    pub columns:        Vec<ColumnMetadata>,
    /// The partition key columns, materialized in the storage layout rather
    /// than in the data files.
    pub partition_keys: Vec<ColumnMetadata>,
    /// The data file format, e.g. `parquet`.
    pub format:         String,
    /// The block-level compression of the data files.
    pub compression:    String,
}

impl TableMetadata {
    /// Derives table metadata from an output schema, splitting the partition
    /// key columns out of the data columns.
    ///
    /// Fails with a schema error if a partition key is absent from the
    /// schema.
    pub fn from_schema(
        database: &str,
        name: &str,
        location: &str,
        schema: &SchemaRef,
        partition_keys: &[String],
        format: &str,
        compression: &str,
    ) -> Result<Self> {
        let mut columns = vec![];
        let mut keys = vec![];
        for key in partition_keys {
            let field = schema.field_with_name(key).map_err(|_| {
                PloverError::Schema(format!(
                    "Partition column {} is absent from the output schema",
                    key
                ))
            })?;
            keys.push(ColumnMetadata {
                name:      field.name().clone(),
                data_type: hive_type(field.data_type()),
            });
        }
        for field in schema.fields() {
            if partition_keys.iter().any(|k| k == field.name()) {
                continue;
            }
            columns.push(ColumnMetadata {
                name:      field.name().clone(),
                data_type: hive_type(field.data_type()),
            });
        }
        Ok(Self {
            database: database.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            columns,
            partition_keys: keys,
            format: format.to_string(),
            compression: compression.to_string(),
        })
    }
}

/// Maps an Arrow data type to the Hive type name catalogs record.
pub fn hive_type(data_type: &DataType) -> String {
    match data_type {
        DataType::Boolean => "boolean".to_string(),
        DataType::Int8 => "tinyint".to_string(),
        DataType::Int16 => "smallint".to_string(),
        DataType::Int32 | DataType::UInt8 | DataType::UInt16 => "int".to_string(),
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 => "bigint".to_string(),
        DataType::Float32 => "float".to_string(),
        DataType::Float64 => "double".to_string(),
        DataType::Date32 | DataType::Date64 => "date".to_string(),
        DataType::Timestamp(..) => "timestamp".to_string(),
        DataType::Decimal128(p, s) => format!("decimal({},{})", p, s),
        _ => "string".to_string(),
    }
}

/// The catalog backend trait defines the interface for catalog services.
#[async_trait]
pub trait CatalogBackend: Debug + Send + Sync {
    /// The type of the catalog backend.
    fn name(&self) -> String;

    /// Returns the backend as [`Any`](std::any::Any) so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    /// Registers or updates a table according to the update policy.
    ///
    /// Backends report failures with `data_written = false`; the sink
    /// re-wraps them after a successful data write.
    async fn register(&self, table: &TableMetadata, policy: CatalogUpdatePolicy) -> Result<()>;

    /// Returns the recorded metadata for a table, if any.
    async fn table(&self, database: &str, name: &str) -> Result<Option<TableMetadata>>;
}

/// The default catalog backend, holding registrations in process memory.
#[derive(Debug, Default)]
pub struct HashMapCatalogBackend {
    tables: RwLock<HashMap<(String, String), TableMetadata>>,
}

impl HashMapCatalogBackend {
    /// Creates a new HashMapCatalogBackend.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CatalogBackend for HashMapCatalogBackend {
    fn name(&self) -> String {
        "HashMapCatalogBackend".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn register(&self, table: &TableMetadata, policy: CatalogUpdatePolicy) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| PloverError::Internal("Catalog lock poisoned".to_string()))?;
        let key = (table.database.clone(), table.name.clone());
        match policy {
            CatalogUpdatePolicy::UpdateInPlace => {
                tables.insert(key, table.clone());
            }
            CatalogUpdatePolicy::AppendOnly => {
                if !tables.contains_key(&key) {
                    tables.insert(key, table.clone());
                } else {
                    log::debug!(
                        "Catalog entry {}.{} exists; append-only policy leaves it untouched",
                        table.database,
                        table.name
                    );
                }
            }
        }
        Ok(())
    }

    async fn table(&self, database: &str, name: &str) -> Result<Option<TableMetadata>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| PloverError::Internal("Catalog lock poisoned".to_string()))?;
        Ok(tables
            .get(&(database.to_string(), name.to_string()))
            .cloned())
    }
}
