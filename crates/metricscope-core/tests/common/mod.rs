//! Shared fixtures for the integration tests.

use metricscope_core::{Column, ColumnType, Database};

pub fn database(id: u64, name: &str, cost: f64) -> Database {
    Database::new(id, name, "sqlite://", cost)
}

pub fn str_column(name: &str) -> Column {
    Column::new(name, ColumnType::Str)
}

pub fn int_column(name: &str) -> Column {
    Column::new(name, ColumnType::Int)
}
