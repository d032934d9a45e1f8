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

//! Common unit test utility methods

use crate::datasource::{MemoryConnector, RecordSet};
use datafusion::arrow::array::{Float64Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// The fixed output columns of the training set, in order.
pub const TRAINING_SET_COLUMNS: [&str; 13] = [
    "customerNumber",
    "city",
    "state",
    "postalCode",
    "country",
    "creditLimit",
    "productCode",
    "productLine",
    "productScale",
    "quantityInStock",
    "buyPrice",
    "MSRP",
    "productRating",
];

/// The schema of the `classicmodels.products` sample table. It carries a
/// `productName` column the join projection drops.
pub fn products_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("productCode", DataType::Utf8, false),
        Field::new("productName", DataType::Utf8, false),
        Field::new("productLine", DataType::Utf8, false),
        Field::new("productScale", DataType::Utf8, false),
        Field::new("quantityInStock", DataType::Int64, false),
        Field::new("buyPrice", DataType::Float64, false),
        Field::new("MSRP", DataType::Float64, false),
    ]))
}

/// The schema of the `classicmodels.customers` sample table. It carries a
/// `customerName` column the join projection drops.
pub fn customers_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("customerNumber", DataType::Int64, false),
        Field::new("customerName", DataType::Utf8, false),
        Field::new("city", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, true),
        Field::new("postalCode", DataType::Utf8, true),
        Field::new("country", DataType::Utf8, false),
        Field::new("creditLimit", DataType::Float64, false),
    ]))
}

/// The schema of the `classicmodels.ratings` sample table.
pub fn ratings_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("customerNumber", DataType::Int64, false),
        Field::new("productCode", DataType::Utf8, false),
        Field::new("productRating", DataType::Int64, false),
    ]))
}

/// Builds a products record set from `(code, line, scale, stock, buy, msrp)`
/// rows.
pub fn products_rows(rows: &[(&str, &str, &str, i64, f64, f64)]) -> RecordSet {
    let batch = RecordBatch::try_new(
        products_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| format!("model {}", r.0)),
            )),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.3))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.4))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.5))),
        ],
    )
    .unwrap();
    RecordSet::new(products_schema(), vec![batch])
}

/// Builds a customers record set from
/// `(number, name, city, state, postal, country, credit)` rows.
pub fn customers_rows(
    rows: &[(i64, &str, &str, Option<&str>, Option<&str>, &str, f64)],
) -> RecordSet {
    let batch = RecordBatch::try_new(
        customers_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.4).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.5))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.6))),
        ],
    )
    .unwrap();
    RecordSet::new(customers_schema(), vec![batch])
}

/// Builds a ratings record set from `(customer, product, rating)` rows.
pub fn ratings_rows(rows: &[(i64, &str, i64)]) -> RecordSet {
    let batch = RecordBatch::try_new(
        ratings_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
        ],
    )
    .unwrap();
    RecordSet::new(ratings_schema(), vec![batch])
}

/// A small products sample.
pub fn products() -> RecordSet {
    products_rows(&[
        ("S10_1678", "Motorcycles", "1:10", 7933, 48.81, 95.70),
        ("S10_1949", "Classic Cars", "1:10", 7305, 98.58, 214.30),
        ("S18_2325", "Planes", "1:18", 9354, 53.90, 103.64),
    ])
}

/// A small customers sample.
pub fn customers() -> RecordSet {
    customers_rows(&[
        (
            103,
            "Atelier graphique",
            "Nantes",
            None,
            Some("44000"),
            "France",
            21000.0,
        ),
        (
            112,
            "Signal Gift Stores",
            "Las Vegas",
            Some("NV"),
            Some("83030"),
            "USA",
            71800.0,
        ),
        (
            114,
            "Australian Collectors, Co.",
            "Melbourne",
            Some("Victoria"),
            Some("3004"),
            "Australia",
            117300.0,
        ),
    ])
}

/// A small ratings sample joining cleanly against [`products`] and
/// [`customers`].
pub fn ratings() -> RecordSet {
    ratings_rows(&[
        (103, "S10_1678", 5),
        (103, "S18_2325", 3),
        (112, "S10_1949", 4),
        (114, "S10_1678", 2),
    ])
}

/// An in-memory connector preloaded with the classicmodels sample tables.
pub fn classicmodels() -> MemoryConnector {
    MemoryConnector::new()
        .with_table("products", products())
        .with_table("customers", customers())
        .with_table("ratings", ratings())
}
