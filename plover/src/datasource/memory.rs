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

//! An in-memory connector. It is always available and is the default source
//! for unit tests and embedded runs.

use crate::datasource::{DataConnector, RecordSet, SourceDescriptor};
use crate::error::{PloverError, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;

/// A connector serving record sets held in the process' memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    tables: HashMap<String, RecordSet>,
}

impl MemoryConnector {
    /// Creates an empty in-memory connector.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Adds a table under its unqualified name.
    pub fn with_table<T>(mut self, name: T, data: RecordSet) -> Self
    where
        T: Into<String>,
    {
        self.tables.insert(name.into(), data);
        self
    }
}

#[async_trait]
impl DataConnector for MemoryConnector {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn read_table(&self, source: &SourceDescriptor) -> Result<RecordSet> {
        self.tables
            .get(source.object_name())
            .or_else(|| self.tables.get(&source.table))
            .cloned()
            .ok_or_else(|| PloverError::Schema(format!("Table not found: {}", source.table)))
    }
}
