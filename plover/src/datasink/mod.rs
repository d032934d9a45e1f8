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

//! The partitioned sink writes a record set to columnar storage. Each
//! distinct value of the partition key occupies its own `key=value`
//! subdirectory (Hive layout), partition columns are materialized in the
//! path rather than in the data files, and the table's schema and partition
//! layout are registered in the catalog after the data write.
//!
//! The data write is append-like per partition: re-running a pipeline adds
//! files unless the partition-replace policy is selected. Already-written
//! files are never rolled back on failure; a catalog failure after a data
//! write surfaces as a distinct partial-failure error.

pub mod s3;

use crate::catalog::{CatalogBackend, CatalogUpdatePolicy, TableMetadata};
use crate::datasource::RecordSet;
use crate::error::{PloverError, Result};
use datafusion::arrow::array::UInt32Array;
use datafusion::arrow::compute;
use datafusion::arrow::csv;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::basic::{Compression, ZstdLevel};
use datafusion::parquet::file::properties::WriterProperties;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{self, JoinHandle};
use uuid::Uuid;

/// The value recorded in the partition path for a null partition key.
const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// The data format of the sink's output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSinkFormat {
    /// CSV format.
    CSV,
    /// Parquet format.
    /// This is the default format.
    Parquet,
}

impl Default for DataSinkFormat {
    fn default() -> Self {
        DataSinkFormat::Parquet
    }
}

impl DataSinkFormat {
    /// The format name recorded in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSinkFormat::CSV => "csv",
            DataSinkFormat::Parquet => "parquet",
        }
    }
}

/// The block-level compression of the sink's output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkCompression {
    /// Snappy block compression.
    /// This is the default compression.
    Snappy,
    /// Zstandard block compression.
    Zstd,
    /// No compression.
    Uncompressed,
}

impl Default for SinkCompression {
    fn default() -> Self {
        SinkCompression::Snappy
    }
}

impl SinkCompression {
    /// The compression name recorded in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkCompression::Snappy => "snappy",
            SinkCompression::Zstd => "zstd",
            SinkCompression::Uncompressed => "none",
        }
    }

    fn parquet(&self) -> Compression {
        match self {
            SinkCompression::Snappy => Compression::SNAPPY,
            SinkCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            SinkCompression::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// How a run treats data files already present in a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionWritePolicy {
    /// Add new files next to existing ones. Files accumulate across runs.
    /// This is the default policy.
    Append,
    /// Clear the partition before writing its new files.
    Replace,
}

impl Default for PartitionWritePolicy {
    fn default() -> Self {
        PartitionWritePolicy::Append
    }
}

/// Describes the sink target: where to write, how to lay the data out, and
/// how to register it in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSinkDescriptor {
    /// The storage path or `s3://` prefix the table root lives under.
    pub target_path:    String,
    /// The catalog database the table is registered in.
    pub database:       String,
    /// The output table name.
    pub table_name:     String,
    /// The output file format.
    pub format:         DataSinkFormat,
    /// The output compression.
    pub compression:    SinkCompression,
    /// The partition key columns. They must exist in the written schema.
    pub partition_keys: Vec<String>,
    /// How an existing catalog registration is treated.
    pub catalog_policy: CatalogUpdatePolicy,
    /// How existing partition data files are treated.
    pub write_policy:   PartitionWritePolicy,
}

impl DataSinkDescriptor {
    /// The table root under the target path.
    pub fn table_root(&self) -> String {
        format!(
            "{}/{}/",
            self.target_path.trim_end_matches('/'),
            self.table_name
        )
    }

    fn file_name(&self) -> String {
        match (self.format, self.compression) {
            (DataSinkFormat::CSV, _) => format!("part-00000-{}.csv", Uuid::new_v4()),
            (DataSinkFormat::Parquet, SinkCompression::Uncompressed) => {
                format!("part-00000-{}.parquet", Uuid::new_v4())
            }
            (DataSinkFormat::Parquet, compression) => {
                format!("part-00000-{}.{}.parquet", Uuid::new_v4(), compression.as_str())
            }
        }
    }
}

/// One physical subgroup of the output: all rows sharing a partition key
/// value, with the partition columns projected out.
#[derive(Debug, Clone)]
pub struct Partition {
    /// The relative Hive-style path, e.g. `customerNumber=103`.
    pub path:    String,
    /// The partition's rows, holding only the data columns.
    pub batches: Vec<RecordBatch>,
}

/// Splits a record set into Hive-style partitions by the given key columns,
/// preserving first-seen key order. Every partition batch holds the data
/// columns only; the key values live in the partition path.
pub fn partition_record_set(
    data: &RecordSet,
    partition_keys: &[String],
) -> Result<(SchemaRef, Vec<Partition>)> {
    let key_indices: Vec<usize> = partition_keys
        .iter()
        .map(|key| {
            data.schema.index_of(key).map_err(|_| {
                PloverError::Schema(format!(
                    "Partition column {} is absent from the output schema",
                    key
                ))
            })
        })
        .collect::<Result<_>>()?;
    let data_indices: Vec<usize> = (0..data.schema.fields().len())
        .filter(|i| !key_indices.contains(i))
        .collect();
    if data_indices.is_empty() {
        return Err(PloverError::Schema(
            "Partition keys cover the entire output schema".to_string(),
        ));
    }
    let data_schema = Arc::new(data.schema.project(&data_indices)?);

    let mut order: Vec<String> = vec![];
    let mut partitions: HashMap<String, Vec<RecordBatch>> = HashMap::new();

    for batch in &data.batches {
        let mut rows_by_path: HashMap<String, Vec<u32>> = HashMap::new();
        for row in 0..batch.num_rows() {
            let mut segments = vec![];
            for &i in &key_indices {
                let value = if batch.column(i).is_null(row) {
                    NULL_PARTITION.to_string()
                } else {
                    array_value_to_string(batch.column(i), row)?
                };
                segments.push(format!("{}={}", data.schema.field(i).name(), value));
            }
            let path = segments.iter().join("/");
            if !partitions.contains_key(&path) && !rows_by_path.contains_key(&path) {
                order.push(path.clone());
            }
            rows_by_path.entry(path).or_default().push(row as u32);
        }

        for (path, rows) in rows_by_path {
            let indices = UInt32Array::from(rows);
            let columns = data_indices
                .iter()
                .map(|&i| compute::take(batch.column(i).as_ref(), &indices, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let part = RecordBatch::try_new(data_schema.clone(), columns)?;
            partitions.entry(path).or_default().push(part);
        }
    }

    let partitions = order
        .into_iter()
        .map(|path| {
            let batches = partitions.get(&path).cloned().unwrap_or_default();
            Partition { path, batches }
        })
        .collect();
    Ok((data_schema, partitions))
}

fn encode(
    format: DataSinkFormat,
    compression: SinkCompression,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<Vec<u8>> {
    let mut buffer = vec![];
    match format {
        DataSinkFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(compression.parquet())
                .build();
            let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
            for batch in batches {
                writer.write(batch)?;
            }
            writer.close()?;
        }
        DataSinkFormat::CSV => {
            let mut writer = csv::Writer::new(&mut buffer);
            for batch in batches {
                writer.write(batch)?;
            }
        }
    }
    Ok(buffer)
}

/// The outcome of a sink write, returned to the driver and printed by the
/// CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReport {
    /// The registered table name.
    pub table:      String,
    /// The catalog database of the registration.
    pub database:   String,
    /// The table root location.
    pub location:   String,
    /// The number of rows written.
    pub rows:       usize,
    /// The number of distinct partitions written.
    pub partitions: usize,
    /// The number of data files written in this run.
    pub files:      usize,
}

/// Writes record sets as partitioned columnar files and registers the result
/// in a catalog.
#[derive(Debug, Clone)]
pub struct PartitionedSink {
    descriptor: DataSinkDescriptor,
}

impl PartitionedSink {
    /// Creates a sink for the given descriptor.
    pub fn new(descriptor: DataSinkDescriptor) -> Self {
        Self { descriptor }
    }

    /// Writes the record set and registers the table in the catalog.
    ///
    /// The partition layout is derived before any file is written; a missing
    /// partition column fails the write with a schema error. A catalog
    /// failure after files were written carries the partial-failure flag:
    /// the data is on storage and the catalog entry is stale, and no written
    /// file is rolled back.
    pub async fn write(
        &self,
        catalog: &dyn CatalogBackend,
        data: &RecordSet,
    ) -> Result<SinkReport> {
        let conf = &self.descriptor;
        let metadata = TableMetadata::from_schema(
            &conf.database,
            &conf.table_name,
            &conf.table_root(),
            &data.schema,
            &conf.partition_keys,
            conf.format.as_str(),
            conf.compression.as_str(),
        )?;
        let (data_schema, partitions) = partition_record_set(data, &conf.partition_keys)?;
        let rows = data.num_rows();
        let num_partitions = partitions.len();

        let mut tasks: Vec<JoinHandle<Result<()>>> = vec![];
        match s3::parse_s3_path(&conf.target_path) {
            Some((bucket, prefix)) => {
                let table_prefix = if prefix.is_empty() {
                    conf.table_name.clone()
                } else {
                    format!("{}/{}", prefix, conf.table_name)
                };
                for partition in partitions {
                    let bucket = bucket.clone();
                    let partition_prefix = format!("{}/{}", table_prefix, partition.path);
                    let object_key = format!("{}/{}", partition_prefix, conf.file_name());
                    let replace = conf.write_policy == PartitionWritePolicy::Replace;
                    let (format, compression) = (conf.format, conf.compression);
                    let schema = data_schema.clone();
                    tasks.push(task::spawn(async move {
                        if replace {
                            s3::delete_prefix(&bucket, &partition_prefix).await?;
                        }
                        let body = encode(format, compression, schema, &partition.batches)?;
                        s3::put_object(&bucket, &object_key, body).await
                    }));
                }
            }
            None => {
                let base = PathBuf::from(conf.table_root());
                for partition in partitions {
                    let dir = base.join(&partition.path);
                    let file = dir.join(conf.file_name());
                    let replace = conf.write_policy == PartitionWritePolicy::Replace;
                    let (format, compression) = (conf.format, conf.compression);
                    let schema = data_schema.clone();
                    tasks.push(task::spawn(async move {
                        let storage = |e: std::io::Error| PloverError::Write(e.to_string());
                        if replace && dir.exists() {
                            std::fs::remove_dir_all(&dir).map_err(storage)?;
                        }
                        std::fs::create_dir_all(&dir).map_err(storage)?;
                        let body = encode(format, compression, schema, &partition.batches)?;
                        std::fs::write(file, body).map_err(storage)
                    }));
                }
            }
        }

        let mut files = 0;
        for task in tasks {
            task.await.map_err(|e| PloverError::Write(e.to_string()))??;
            files += 1;
        }
        log::info!(
            "wrote {} rows into {} partitions ({} files) under {}",
            rows,
            num_partitions,
            files,
            conf.table_root()
        );

        catalog
            .register(&metadata, conf.catalog_policy)
            .await
            .map_err(|e| match e {
                PloverError::Catalog { desc, .. } => PloverError::Catalog {
                    desc,
                    data_written: files > 0,
                },
                other => PloverError::Catalog {
                    desc:         other.to_string(),
                    data_written: files > 0,
                },
            })?;

        Ok(SinkReport {
            table:      conf.table_name.clone(),
            database:   conf.database.clone(),
            location:   conf.table_root(),
            rows,
            partitions: num_partitions,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::HashMapCatalogBackend;
    use crate::error::Result;
    use crate::test_util;
    use async_trait::async_trait;
    use datafusion::prelude::{ParquetReadOptions, SessionContext};
    use std::any::Any;

    fn descriptor(target: &str) -> DataSinkDescriptor {
        DataSinkDescriptor {
            target_path:    target.to_string(),
            database:       "recommender".to_string(),
            table_name:     "ratings_ml_training".to_string(),
            format:         DataSinkFormat::default(),
            compression:    SinkCompression::default(),
            partition_keys: vec!["customerNumber".to_string()],
            catalog_policy: CatalogUpdatePolicy::UpdateInPlace,
            write_policy:   PartitionWritePolicy::default(),
        }
    }

    fn partition_dirs(root: &std::path::Path) -> Vec<String> {
        let mut dirs: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_str().unwrap().to_string())
            .collect();
        dirs.sort();
        dirs
    }

    fn file_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn hive_partitioning_by_key_value() -> Result<()> {
        let data = test_util::ratings();
        let (schema, partitions) =
            partition_record_set(&data, &["customerNumber".to_string()])?;

        // 103 appears twice, 112 and 114 once; first-seen order.
        assert_eq!(3, partitions.len());
        assert_eq!("customerNumber=103", partitions[0].path);
        assert_eq!("customerNumber=112", partitions[1].path);
        assert_eq!("customerNumber=114", partitions[2].path);
        assert_eq!(
            2usize,
            partitions[0].batches.iter().map(|b| b.num_rows()).sum::<usize>()
        );

        // the partition column lives in the path, not in the data files
        assert_eq!(
            vec!["productCode", "productRating"],
            schema
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn missing_partition_column() {
        let data = test_util::ratings();
        let err = partition_record_set(&data, &["region".to_string()]).unwrap_err();
        assert!(matches!(err, PloverError::Schema(_)));
    }

    #[tokio::test]
    async fn write_partitioned_parquet_and_register() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = HashMapCatalogBackend::new();
        let sink = PartitionedSink::new(descriptor(target));

        let report = sink.write(&catalog, &test_util::ratings()).await?;
        assert_eq!(4, report.rows);
        assert_eq!(3, report.partitions);
        assert_eq!(3, report.files);

        let root = dir.path().join("ratings_ml_training");
        assert_eq!(
            vec![
                "customerNumber=103",
                "customerNumber=112",
                "customerNumber=114"
            ],
            partition_dirs(&root)
        );

        // read one partition back: data columns only
        let ctx = SessionContext::new();
        let path = root.join("customerNumber=103");
        let df = ctx
            .read_parquet(path.to_str().unwrap(), ParquetReadOptions::default())
            .await?;
        let batches = df.collect().await?;
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(2, rows);
        assert_eq!(2, batches[0].num_columns());

        // the catalog records the full schema with the partition key split out
        let table = catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .unwrap();
        assert_eq!(2, table.columns.len());
        assert_eq!("customerNumber", table.partition_keys[0].name);
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_is_a_write_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // a regular file occupies the path the table root needs
        let target = dir.path().join("blocked");
        std::fs::write(&target, b"occupied")?;
        let catalog = HashMapCatalogBackend::new();
        let sink = PartitionedSink::new(descriptor(target.to_str().unwrap()));

        let err = sink
            .write(&catalog, &test_util::ratings())
            .await
            .unwrap_err();
        assert!(matches!(err, PloverError::Write(_)));
        assert!(catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rerun_appends_files_but_catalog_stays_consistent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = HashMapCatalogBackend::new();
        let sink = PartitionedSink::new(descriptor(target));

        sink.write(&catalog, &test_util::ratings()).await?;
        let before = catalog.table("recommender", "ratings_ml_training").await?;

        sink.write(&catalog, &test_util::ratings()).await?;
        let after = catalog.table("recommender", "ratings_ml_training").await?;

        // idempotent catalog state, even though files accumulate
        assert_eq!(before, after);
        let partition = dir.path().join("ratings_ml_training/customerNumber=103");
        assert_eq!(2, file_count(&partition));
        Ok(())
    }

    #[tokio::test]
    async fn replace_policy_clears_the_partition() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = HashMapCatalogBackend::new();

        let sink = PartitionedSink::new(descriptor(target));
        sink.write(&catalog, &test_util::ratings()).await?;

        let mut replacing = descriptor(target);
        replacing.write_policy = PartitionWritePolicy::Replace;
        let sink = PartitionedSink::new(replacing);
        sink.write(&catalog, &test_util::ratings()).await?;

        let partition = dir.path().join("ratings_ml_training/customerNumber=103");
        assert_eq!(1, file_count(&partition));
        Ok(())
    }

    #[derive(Debug, Default)]
    struct RefusingCatalogBackend {}

    #[async_trait]
    impl CatalogBackend for RefusingCatalogBackend {
        fn name(&self) -> String {
            "RefusingCatalogBackend".to_string()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        async fn register(
            &self,
            _table: &TableMetadata,
            _policy: CatalogUpdatePolicy,
        ) -> Result<()> {
            Err(PloverError::Catalog {
                desc:         "registration refused".to_string(),
                data_written: false,
            })
        }

        async fn table(&self, _database: &str, _name: &str) -> Result<Option<TableMetadata>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn catalog_failure_after_write_is_partial() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let sink = PartitionedSink::new(descriptor(target));

        let err = sink
            .write(&RefusingCatalogBackend::default(), &test_util::ratings())
            .await
            .unwrap_err();
        match err {
            PloverError::Catalog { data_written, .. } => assert!(data_written),
            other => panic!("expected a catalog error, got {}", other),
        }

        // data files stay on storage; no rollback is attempted
        let partition = dir.path().join("ratings_ml_training/customerNumber=103");
        assert_eq!(1, file_count(&partition));
        Ok(())
    }

    #[tokio::test]
    async fn empty_record_set_registers_the_schema_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().to_str().unwrap();
        let catalog = HashMapCatalogBackend::new();
        let sink = PartitionedSink::new(descriptor(target));

        let empty = RecordSet::new(test_util::ratings_schema(), vec![]);
        let report = sink.write(&catalog, &empty).await?;
        assert_eq!(0, report.rows);
        assert_eq!(0, report.files);
        assert!(catalog
            .table("recommender", "ratings_ml_training")
            .await?
            .is_some());
        Ok(())
    }
}
