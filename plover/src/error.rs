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

//! Plover error types

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use datafusion::parquet::errors::ParquetError;

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [PloverError]
pub type Result<T> = result::Result<T, PloverError>;

/// Plover error
#[derive(Debug)]
pub enum PloverError {
    /// Error returned when a connection name cannot be resolved, or the
    /// source behind it is unreachable or refuses access.
    Connection(String),
    /// Error returned when an expected table or column is absent from a
    /// source at read time.
    Schema(String),
    /// Error returned when the join query references an unregistered alias
    /// or a nonexistent column, or fails during evaluation.
    Query(String),
    /// Error returned when the data sink fails to write to storage.
    Write(String),
    /// Error returned when catalog metadata registration fails.
    ///
    /// `data_written` distinguishes the partial-failure state: data files
    /// were already written to storage and the catalog entry is stale. No
    /// rollback of written files is attempted.
    Catalog {
        /// The underlying catalog failure.
        desc:         String,
        /// True if data files were written before the catalog call failed.
        data_written: bool,
    },
    /// Error returned when Arrow is unexpectedly executed.
    Arrow(ArrowError),
    /// Error returned when DataFusion is unexpectedly executed.
    DataFusion(DataFusionError),
    /// Error returned when the Parquet writer fails.
    Parquet(ParquetError),
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned when accessing the AWS services fails.
    AWS(String),
    /// Error returned as a consequence of an error in Plover.
    /// This error should not happen in normal usage. Plover has internal
    /// invariants that we are unable to ask the compiler to check for us.
    /// This error is raised when one of those invariants is not verified
    /// during execution.
    Internal(String),
}

impl From<io::Error> for PloverError {
    fn from(e: io::Error) -> Self {
        PloverError::IoError(e)
    }
}

impl From<ArrowError> for PloverError {
    fn from(e: ArrowError) -> Self {
        PloverError::Arrow(e)
    }
}

impl From<DataFusionError> for PloverError {
    fn from(e: DataFusionError) -> Self {
        PloverError::DataFusion(e)
    }
}

impl From<ParquetError> for PloverError {
    fn from(e: ParquetError) -> Self {
        PloverError::Parquet(e)
    }
}

impl From<serde_json::Error> for PloverError {
    fn from(e: serde_json::Error) -> Self {
        PloverError::SerdeJson(e)
    }
}

impl From<&str> for PloverError {
    fn from(e: &str) -> Self {
        PloverError::Internal(e.to_string())
    }
}

impl Display for PloverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            PloverError::Connection(ref desc) => write!(f, "Connection error: {}", desc),
            PloverError::Schema(ref desc) => write!(f, "Schema error: {}", desc),
            PloverError::Query(ref desc) => write!(f, "Query error: {}", desc),
            PloverError::Write(ref desc) => write!(f, "Write error: {}", desc),
            PloverError::Catalog {
                ref desc,
                data_written,
            } => {
                if data_written {
                    write!(
                        f,
                        "Catalog error after data write: {}. Data files were written to \
                         storage but the catalog registration is stale",
                        desc
                    )
                } else {
                    write!(f, "Catalog error: {}", desc)
                }
            }
            PloverError::Arrow(ref desc) => write!(f, "Arrow error: {}", desc),
            PloverError::DataFusion(ref desc) => write!(f, "DataFusion error: {:?}", desc),
            PloverError::Parquet(ref desc) => write!(f, "Parquet error: {}", desc),
            PloverError::IoError(ref desc) => write!(f, "IO error: {}", desc),
            PloverError::SerdeJson(ref desc) => write!(f, "serde_json error: {:?}", desc),
            PloverError::AWS(ref desc) => write!(f, "AWS error: {}", desc),
            PloverError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in Plover's \
                 code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
        }
    }
}

impl error::Error for PloverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_partial_failure_is_distinguishable() {
        let clean = PloverError::Catalog {
            desc:         "registration refused".to_string(),
            data_written: false,
        };
        let partial = PloverError::Catalog {
            desc:         "registration refused".to_string(),
            data_written: true,
        };
        assert!(!clean.to_string().contains("after data write"));
        assert!(partial.to_string().contains("after data write"));
    }
}
