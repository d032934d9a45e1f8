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

//! The pipeline driver wires reader, join engine, and sink into one run:
//! three independent table reads (concurrent, they share no state), one join
//! consuming all three, one partitioned write consuming the join output, and
//! a commit. Control flow is strictly linear; a failure in any stage aborts
//! the run with no retry and no partial commit.

use crate::catalog::{CatalogBackend, CatalogUpdatePolicy};
use crate::config::{PLOVER_CATALOG_TABLE, PLOVER_PARTITION_KEYS, PLOVER_SOURCE_SCHEMA};
use crate::context::{JobContext, JobState, RunParams};
use crate::datasink::{
    DataSinkDescriptor, DataSinkFormat, PartitionWritePolicy, PartitionedSink, SinkCompression,
    SinkReport,
};
use crate::datasource::{ConnectorRegistry, SourceDescriptor};
use crate::error::Result;
use crate::query::JoinQuery;
use indoc::indoc;
use std::sync::Arc;

/// The declarative join assembling the training set: an inner join of
/// ratings against the product catalog and the customer book on the two
/// foreign keys, projecting the fixed 13-column output.
pub fn training_set_query() -> String {
    indoc! {r#"
        SELECT r."customerNumber",
               c."city",
               c."state",
               c."postalCode",
               c."country",
               c."creditLimit",
               r."productCode",
               p."productLine",
               p."productScale",
               p."quantityInStock",
               p."buyPrice",
               p."MSRP",
               r."productRating"
        FROM ratings r
        JOIN products p ON p."productCode" = r."productCode"
        JOIN customers c ON c."customerNumber" = r."customerNumber"
    "#}
    .to_string()
}

/// Builds the three source descriptors of a run from its parameters and the
/// configured source schema.
pub fn training_set_sources(params: &RunParams) -> (SourceDescriptor, SourceDescriptor, SourceDescriptor) {
    let table = |name: &str| format!("{}.{}", *PLOVER_SOURCE_SCHEMA, name);
    (
        SourceDescriptor::new(params.connection.clone(), table("ratings")),
        SourceDescriptor::new(params.connection.clone(), table("products")),
        SourceDescriptor::new(params.connection.clone(), table("customers")),
    )
}

/// Builds the sink descriptor of a run from its parameters and the
/// configured defaults.
pub fn training_set_sink(params: &RunParams, write_policy: PartitionWritePolicy) -> DataSinkDescriptor {
    DataSinkDescriptor {
        target_path: params.target_path.clone(),
        database: params.database.clone(),
        table_name: PLOVER_CATALOG_TABLE.clone(),
        format: DataSinkFormat::Parquet,
        compression: SinkCompression::Snappy,
        partition_keys: PLOVER_PARTITION_KEYS.clone(),
        catalog_policy: CatalogUpdatePolicy::UpdateInPlace,
        write_policy,
    }
}

/// A single extract-join-load run.
pub struct BatchPipeline {
    ctx:      JobContext,
    registry: ConnectorRegistry,
    catalog:  Arc<dyn CatalogBackend>,
    sink:     DataSinkDescriptor,
}

impl BatchPipeline {
    /// Creates a pipeline for the given run parameters and collaborators.
    pub fn new(
        params: RunParams,
        registry: ConnectorRegistry,
        catalog: Arc<dyn CatalogBackend>,
        sink: DataSinkDescriptor,
    ) -> Self {
        Self {
            ctx: JobContext::init(params),
            registry,
            catalog,
            sink,
        }
    }

    /// Returns the job context of this run.
    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Runs the pipeline to completion. Commits the job context after a
    /// successful write; any stage failure propagates unmodified and marks
    /// the run as failed.
    pub async fn run(&mut self) -> Result<SinkReport> {
        match self.execute().await {
            Ok(report) => {
                self.ctx.commit()?;
                Ok(report)
            }
            Err(e) => {
                self.ctx.fail(&e);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<SinkReport> {
        self.ctx.enter(JobState::Reading)?;
        let connector = self.registry.resolve(&self.ctx.params.connection)?;
        let (ratings_src, products_src, customers_src) =
            training_set_sources(&self.ctx.params);
        // the three reads share no state and run concurrently
        let (ratings, products, customers) = futures::future::try_join3(
            connector.read_table(&ratings_src),
            connector.read_table(&products_src),
            connector.read_table(&customers_src),
        )
        .await?;
        log::info!(
            "[{}] read {} ratings, {} products, {} customers",
            self.ctx.run_id,
            ratings.num_rows(),
            products.num_rows(),
            customers.num_rows()
        );

        self.ctx.enter(JobState::Joining)?;
        let query = JoinQuery::new(
            training_set_query(),
            vec![
                ("ratings".to_string(), ratings),
                ("products".to_string(), products),
                ("customers".to_string(), customers),
            ],
        );
        let joined = query.execute().await?;
        log::info!(
            "[{}] join produced {} rows",
            self.ctx.run_id,
            joined.num_rows()
        );

        self.ctx.enter(JobState::Writing)?;
        let sink = PartitionedSink::new(self.sink.clone());
        sink.write(self.catalog.as_ref(), &joined).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::HashMapCatalogBackend;
    use crate::error::{PloverError, Result};
    use crate::test_util::{self, TRAINING_SET_COLUMNS};
    use std::sync::Arc;

    fn params(target: &str) -> RunParams {
        RunParams {
            job_name:    "ratings-etl".to_string(),
            connection:  "classicmodels".to_string(),
            database:    "recommender".to_string(),
            target_path: target.to_string(),
        }
    }

    fn registry() -> ConnectorRegistry {
        let mut registry = ConnectorRegistry::new();
        registry.register("classicmodels", Arc::new(test_util::classicmodels()));
        registry
    }

    #[tokio::test]
    async fn end_to_end_run_commits() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = Arc::new(HashMapCatalogBackend::new());
        let sink = training_set_sink(&params(target), PartitionWritePolicy::Append);

        let mut pipeline =
            BatchPipeline::new(params(target), registry(), catalog.clone(), sink);
        let report = pipeline.run().await?;

        assert_eq!(JobState::Committed, pipeline.context().state());
        assert_eq!(4, report.rows);
        assert_eq!(3, report.partitions);
        assert_eq!("ratings_ml_training", report.table);

        // the catalog records the 12 data columns plus the partition key
        let table = catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .unwrap();
        assert_eq!(TRAINING_SET_COLUMNS.len() - 1, table.columns.len());
        assert_eq!("customerNumber", table.partition_keys[0].name);

        assert!(dir
            .path()
            .join("ratings_ml_training/customerNumber=103")
            .is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn unresolved_connection_fails_before_any_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = Arc::new(HashMapCatalogBackend::new());
        let sink = training_set_sink(&params(target), PartitionWritePolicy::Append);

        let mut pipeline = BatchPipeline::new(
            params(target),
            ConnectorRegistry::new(),
            catalog.clone(),
            sink,
        );
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, PloverError::Connection(_)));
        assert_eq!(JobState::Failed, pipeline.context().state());
        // nothing was written and nothing was registered
        assert!(!dir.path().join("ratings_ml_training").exists());
        assert!(catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_table_aborts_the_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let mut registry = ConnectorRegistry::new();
        registry.register(
            "classicmodels",
            Arc::new(
                crate::datasource::MemoryConnector::new()
                    .with_table("products", test_util::products())
                    .with_table("customers", test_util::customers()),
            ),
        );
        let catalog = Arc::new(HashMapCatalogBackend::new());
        let sink = training_set_sink(&params(target), PartitionWritePolicy::Append);

        let mut pipeline = BatchPipeline::new(params(target), registry, catalog, sink);
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PloverError::Schema(_)));
        assert_eq!(JobState::Failed, pipeline.context().state());
        Ok(())
    }

    #[tokio::test]
    async fn rerun_is_idempotent_at_the_catalog_level() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = Arc::new(HashMapCatalogBackend::new());

        for _ in 0..2 {
            let sink = training_set_sink(&params(target), PartitionWritePolicy::Append);
            let mut pipeline =
                BatchPipeline::new(params(target), registry(), catalog.clone(), sink);
            pipeline.run().await?;
        }

        let table = catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .unwrap();
        assert_eq!("recommender", table.database);
        // two runs, two files per partition, one catalog registration
        let partition = dir.path().join("ratings_ml_training/customerNumber=103");
        assert_eq!(2, std::fs::read_dir(partition)?.count());
        Ok(())
    }
}
