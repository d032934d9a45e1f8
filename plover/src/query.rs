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

//! The join engine evaluates a declarative query over named record sets.
//! Each aliased record set is registered as an in-memory table and the query
//! runs against the combined namespace, producing one flattened record set.
//! Join semantics are standard relational semantics: an inner join emits one
//! output row per matching combination, fanning out on duplicate keys, and
//! silently drops rows with no match.

use crate::datasource::RecordSet;
use crate::error::{PloverError, Result};
use datafusion::arrow::datatypes::Schema;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use std::sync::Arc;

/// Alias name for a record set registered in the query namespace.
pub type Alias = String;

/// A declarative query over aliased record sets.
///
/// Invariant: every alias referenced in the query must have a corresponding
/// entry in `tables`, or evaluation fails with a query error.
#[derive(Debug, Clone)]
pub struct JoinQuery {
    /// ANSI SQL evaluated over the registered aliases.
    pub sql:    String,
    /// The record sets visible to the query, keyed by alias.
    pub tables: Vec<(Alias, RecordSet)>,
}

impl JoinQuery {
    /// Creates a new query over the given alias mapping.
    pub fn new<T>(sql: T, tables: Vec<(Alias, RecordSet)>) -> Self
    where
        T: Into<String>,
    {
        Self {
            sql: sql.into(),
            tables,
        }
    }

    /// Registers each record set under its alias and evaluates the query.
    ///
    /// Fails with a query error if the query references an unregistered
    /// alias or a nonexistent column. The output schema is taken from the
    /// query plan, so it is exact even when the result is empty.
    pub async fn execute(&self) -> Result<RecordSet> {
        let ctx = SessionContext::new();
        for (alias, set) in &self.tables {
            let table = MemTable::try_new(set.schema.clone(), vec![set.batches.clone()])
                .map_err(|e| PloverError::Query(e.to_string()))?;
            ctx.register_table(alias.as_str(), Arc::new(table))
                .map_err(|e| PloverError::Query(e.to_string()))?;
        }

        let df = ctx
            .sql(&self.sql)
            .await
            .map_err(|e| PloverError::Query(e.to_string()))?;
        let schema = Arc::new(Schema::from(df.schema()));
        let batches = df
            .collect()
            .await
            .map_err(|e| PloverError::Query(e.to_string()))?;

        Ok(RecordSet::new(schema, batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::training_set_query;
    use crate::error::Result;
    use crate::test_util::{self, TRAINING_SET_COLUMNS};
    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::util::pretty::pretty_format_batches;
    use indoc::indoc;

    fn training_set_tables() -> Vec<(Alias, RecordSet)> {
        vec![
            ("ratings".to_string(), test_util::ratings()),
            ("products".to_string(), test_util::products()),
            ("customers".to_string(), test_util::customers()),
        ]
    }

    #[tokio::test]
    async fn inner_join_emits_one_row_per_matching_triple() -> Result<()> {
        // One rating (cust=103, prod=S10_1678) with both sides present.
        let query = JoinQuery::new(
            training_set_query(),
            vec![
                (
                    "ratings".to_string(),
                    test_util::ratings_rows(&[(103, "S10_1678", 5)]),
                ),
                ("products".to_string(), test_util::products()),
                ("customers".to_string(), test_util::customers()),
            ],
        );
        let joined = query.execute().await?;
        println!("{}", pretty_format_batches(&joined.batches).unwrap());

        assert_eq!(1, joined.num_rows());
        let batch = &joined.batches[0];
        let customers = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(103, customers.value(0));
        let cities = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!("Nantes", cities.value(0));
        let lines = batch
            .column(7)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!("Motorcycles", lines.value(0));
        let stars = batch
            .column(12)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(5, stars.value(0));
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_ratings_are_dropped() -> Result<()> {
        // No product catalog entry for the rated product code.
        let query = JoinQuery::new(
            training_set_query(),
            vec![
                (
                    "ratings".to_string(),
                    test_util::ratings_rows(&[(103, "S99_9999", 5)]),
                ),
                ("products".to_string(), test_util::products()),
                ("customers".to_string(), test_util::customers()),
            ],
        );
        let joined = query.execute().await?;
        assert_eq!(0, joined.num_rows());

        // The schema is exact even for an empty result.
        assert_eq!(
            TRAINING_SET_COLUMNS.to_vec(),
            joined
                .schema
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_keys_fan_out() -> Result<()> {
        // Two product rows share the same product code, so a single rating
        // of that code yields two output rows. No implicit deduplication.
        let products = test_util::products_rows(&[
            ("S10_1678", "Motorcycles", "1:10", 7933, 48.81, 95.70),
            ("S10_1678", "Motorcycles", "1:12", 7305, 98.58, 214.30),
        ]);
        let query = JoinQuery::new(
            training_set_query(),
            vec![
                (
                    "ratings".to_string(),
                    test_util::ratings_rows(&[(103, "S10_1678", 4)]),
                ),
                ("products".to_string(), products),
                ("customers".to_string(), test_util::customers()),
            ],
        );
        let joined = query.execute().await?;
        assert_eq!(2, joined.num_rows());
        Ok(())
    }

    #[tokio::test]
    async fn projection_is_fixed_and_ordered() -> Result<()> {
        // Source tables carry extra columns (customerName, productName);
        // the output is always exactly the 13 selected columns, in order.
        let query = JoinQuery::new(training_set_query(), training_set_tables());
        let joined = query.execute().await?;
        assert_eq!(
            TRAINING_SET_COLUMNS.to_vec(),
            joined
                .schema
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[tokio::test]
    async fn unregistered_alias_is_a_query_error() -> Result<()> {
        let query = JoinQuery::new(
            training_set_query(),
            vec![
                ("ratings".to_string(), test_util::ratings()),
                ("products".to_string(), test_util::products()),
                // no "customers" entry
            ],
        );
        let err = query.execute().await.unwrap_err();
        assert!(matches!(err, PloverError::Query(_)));
        Ok(())
    }

    #[tokio::test]
    async fn nonexistent_column_is_a_query_error() -> Result<()> {
        let sql = indoc! {r#"
            SELECT r."customerNumber", r."starCount"
            FROM ratings r
        "#};
        let query = JoinQuery::new(sql, vec![("ratings".to_string(), test_util::ratings())]);
        let err = query.execute().await.unwrap_err();
        assert!(matches!(err, PloverError::Query(_)));
        Ok(())
    }
}
