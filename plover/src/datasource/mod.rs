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

//! A data source is the location where data that is being used originates
//! from. Sources are addressed by a typed [`SourceDescriptor`] and read
//! through a [`DataConnector`], which returns the current contents of the
//! named table as a [`RecordSet`] with an inferred schema. Connectors hold no
//! local cache, so re-invoking a read returns live data.

mod file;
pub use file::{FileConnector, FileFormat};

mod memory;
pub use memory::MemoryConnector;

use crate::error::{PloverError, Result};
use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// An ordered collection of rows sharing a schema. Produced by a source read
/// or a join evaluation, and immutable once produced.
#[derive(Debug, Clone)]
pub struct RecordSet {
    /// The schema shared by all batches, inferred from the source.
    pub schema:  SchemaRef,
    /// The rows, in batch granularity.
    pub batches: Vec<RecordBatch>,
}

impl RecordSet {
    /// Creates a record set from a schema and batches. The explicit schema
    /// keeps empty tables representable.
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// Creates a record set from non-empty batches, taking the schema from
    /// the first batch.
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or_else(|| PloverError::Internal("Empty record set without a schema".to_string()))?;
        Ok(Self { schema, batches })
    }

    /// Returns the total number of rows across all batches.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Identifies a connection target and a table to read from it. Constructed
/// per run from the job parameters and discarded after the read.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// The connection name, resolved against the [`ConnectorRegistry`].
    pub connection: String,
    /// The qualified table name, e.g. `classicmodels.products`.
    pub table:      String,
    /// Connection-type-specific options.
    pub options:    HashMap<String, String>,
}

impl SourceDescriptor {
    /// Creates a descriptor for a table behind a named connection.
    pub fn new<T>(connection: T, table: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            connection: connection.into(),
            table:      table.into(),
            options:    HashMap::new(),
        }
    }

    /// Returns the unqualified table name.
    pub fn object_name(&self) -> &str {
        self.table.rsplit('.').next().unwrap_or(&self.table)
    }
}

/// A connector reads tables from one relational source. Opening and closing
/// the remote connection is the connector's side effect; reads through the
/// same connector share no state and may run concurrently.
#[async_trait]
pub trait DataConnector: Debug + Send + Sync {
    /// The type of the connector.
    fn name(&self) -> String;

    /// Returns the connector as [`Any`](std::any::Any) so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    /// Reads the current contents of the table named by `source`.
    ///
    /// Fails with a connection error if the source is unreachable or refuses
    /// access, and with a schema error if the table does not exist. The
    /// returned schema is inferred from the source and is not validated
    /// before downstream use.
    async fn read_table(&self, source: &SourceDescriptor) -> Result<RecordSet>;
}

/// Resolves connection names to connectors. This is the boundary to the
/// external credential/connection-resolution mechanism: the registry is
/// populated from configuration before a run starts.
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn DataConnector>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Registers a connector under a connection name. An existing entry with
    /// the same name is replaced.
    pub fn register<T>(&mut self, name: T, connector: Arc<dyn DataConnector>)
    where
        T: Into<String>,
    {
        self.connectors.insert(name.into(), connector);
    }

    /// Resolves a connection name, failing with a connection error if the
    /// name is unknown.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DataConnector>> {
        self.connectors.get(name).cloned().ok_or_else(|| {
            PloverError::Connection(format!("Unknown connection name: {}", name))
        })
    }

    /// Populates a registry from the `[connections]` section of the global
    /// configuration. Each entry maps a connection name to a connection
    /// string of the form `<format>:<directory>`.
    pub fn from_conf(conf: &ini::Ini) -> Result<Self> {
        let mut registry = ConnectorRegistry::new();
        if let Some(section) = conf.section(Some("connections")) {
            for (name, url) in section.iter() {
                registry.register(name, connector_from_url(url)?);
            }
        }
        Ok(registry)
    }
}

/// Builds a connector from a `<format>:<directory>` connection string.
pub fn connector_from_url(url: &str) -> Result<Arc<dyn DataConnector>> {
    match url.split_once(':') {
        Some(("csv", dir)) => Ok(Arc::new(FileConnector::new(dir, FileFormat::Csv))),
        Some(("parquet", dir)) => Ok(Arc::new(FileConnector::new(dir, FileFormat::Parquet))),
        Some(("memory", _)) | None if url.starts_with("memory") => {
            Ok(Arc::new(MemoryConnector::new()))
        }
        _ => Err(PloverError::Connection(format!(
            "Unsupported connection string: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::test_util;

    #[tokio::test]
    async fn resolve_unknown_connection() -> Result<()> {
        let registry = ConnectorRegistry::new();
        let err = registry.resolve("classicmodels").unwrap_err();
        assert!(matches!(err, PloverError::Connection(_)));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_registered_connection() -> Result<()> {
        let mut registry = ConnectorRegistry::new();
        registry.register("classicmodels", Arc::new(test_util::classicmodels()));
        let connector = registry.resolve("classicmodels")?;
        assert_eq!("memory", connector.name());
        Ok(())
    }

    #[test]
    fn descriptor_object_name() {
        let source = SourceDescriptor::new("classicmodels", "classicmodels.products");
        assert_eq!("products", source.object_name());
        let source = SourceDescriptor::new("classicmodels", "ratings");
        assert_eq!("ratings", source.object_name());
    }

    #[test]
    fn connector_urls() -> Result<()> {
        assert_eq!("csv", connector_from_url("csv:/var/data")?.name());
        assert_eq!("parquet", connector_from_url("parquet:/var/data")?.name());
        assert!(connector_from_url("mysteryformat").is_err());
        Ok(())
    }
}
