//! Schema oracle trait and types for column metadata lookup

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("column `{column}` not found in `{data_source}`")]
    NotFound { data_source: String, column: String },

    #[error("schema lookup timed out: {0}")]
    Timeout(String),

    #[error("schema lookup failed: {0}")]
    Unavailable(String),
}

/// Column metadata
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Table schema information
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Build a schema from `(column, native type)` pairs
    pub fn from_pairs(name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(column, data_type)| ColumnInfo {
                    name: column.to_string(),
                    data_type: data_type.to_string(),
                })
                .collect(),
        }
    }
}

/// Resolves column types for a data source, typically against a live database.
///
/// Implementations must be side-effect free: the verifier may ask the same
/// question more than once and never caches answers itself.
pub trait SchemaOracle {
    /// Native type name of `column` in `data_source`
    fn resolve_column(&self, data_source: &str, column: &str) -> Result<String, OracleError>;
}

impl<T: SchemaOracle + ?Sized> SchemaOracle for &T {
    fn resolve_column(&self, data_source: &str, column: &str) -> Result<String, OracleError> {
        (**self).resolve_column(data_source, column)
    }
}

/// Oracle over schemas registered up front
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaOracle {
    tables: HashMap<String, TableSchema>,
}

impl MemorySchemaOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }

    pub fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.add_table(TableSchema::from_pairs(name, columns));
        self
    }
}

impl SchemaOracle for MemorySchemaOracle {
    fn resolve_column(&self, data_source: &str, column: &str) -> Result<String, OracleError> {
        let not_found = || OracleError::NotFound {
            data_source: data_source.to_string(),
            column: column.to_string(),
        };

        let table = self.tables.get(data_source).ok_or_else(not_found)?;

        // Column names compare case-insensitively, as in most SQL engines
        table
            .columns
            .iter()
            .find(|c| c.name == column)
            .or_else(|| table.columns.iter().find(|c| c.name.eq_ignore_ascii_case(column)))
            .map(|c| c.data_type.clone())
            .ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> MemorySchemaOracle {
        MemorySchemaOracle::new().with_table(
            "churn.train",
            &[("customerID", "VARCHAR(255)"), ("tenure", "BIGINT")],
        )
    }

    #[test]
    fn test_table_schema_from_pairs() {
        let schema = TableSchema::from_pairs("iris.train", &[("class", "INT"), ("sepal_length", "FLOAT")]);
        assert_eq!(schema.name, "iris.train");
        let columns: Vec<(&str, &str)> = schema
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(columns, vec![("class", "INT"), ("sepal_length", "FLOAT")]);
    }

    #[test]
    fn test_resolve_column() {
        let oracle = oracle();
        assert_eq!(oracle.resolve_column("churn.train", "tenure").unwrap(), "BIGINT");
        assert_eq!(
            oracle.resolve_column("churn.train", "customerid").unwrap(),
            "VARCHAR(255)"
        );
    }

    #[test]
    fn test_missing_table_and_column() {
        let oracle = oracle();
        assert_eq!(
            oracle.resolve_column("churn.test", "tenure"),
            Err(OracleError::NotFound {
                data_source: "churn.test".to_string(),
                column: "tenure".to_string(),
            })
        );
        assert!(matches!(
            oracle.resolve_column("churn.train", "gender"),
            Err(OracleError::NotFound { .. })
        ));
    }

    #[test]
    fn test_repeated_queries_are_stable() {
        let oracle = oracle();
        let first = oracle.resolve_column("churn.train", "tenure");
        let second = oracle.resolve_column("churn.train", "tenure");
        assert_eq!(first, second);
    }
}
