//! Semantic verification of extended-SQL statements
//!
//! Binds every column a statement references to the native type the schema
//! oracle reports, producing the [`CompilationContext`] code generation reads.

use sqlflow_ir::{
    CompilationContext, DataType, OracleError, PredictClause, PredictTarget, ResolvedFieldType,
    SchemaOracle, StatementKind, StatementTree, TrainClause,
};
use sqlflow_registry::{ModelRegistry, RegistryError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerifyError {
    #[error("no data source: the select has no FROM table: {select}")]
    NoDataSource { select: String },

    #[error("TRAIN {estimator} has no feature columns")]
    NoFeatureColumns { estimator: String },

    #[error("PREDICT USING {model} has no paired TRAIN clause")]
    MissingTrainClause { model: String },

    #[error("PREDICT {result} defines its own COLUMN clause; feature columns come from the TRAIN clause")]
    PredictRedefinesColumns { result: String },

    #[error("invalid PREDICT target {target}: expected <table>.<column>")]
    InvalidPredictTarget { target: String },

    #[error("column {column} not found in {data_source}")]
    ColumnNotFound { data_source: String, column: String },

    #[error("unsupported field data type {native_type} for column {column}")]
    UnsupportedFieldType { column: String, native_type: String },

    #[error(transparent)]
    Oracle(OracleError),

    #[error(transparent)]
    Backend(#[from] RegistryError),
}

impl From<OracleError> for VerifyError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::NotFound { data_source, column } => VerifyError::ColumnNotFound { data_source, column },
            other => VerifyError::Oracle(other),
        }
    }
}

/// Statement verifier.
///
/// Only reads from the oracle. Without a registry the verifier checks
/// structure and column types; backend policy (attribute keys, label types) is
/// then left to code generation.
#[derive(Default)]
pub struct Verifier<'r> {
    registry: Option<&'r ModelRegistry>,
}

impl Verifier<'static> {
    pub fn new() -> Self {
        Self { registry: None }
    }
}

impl<'r> Verifier<'r> {
    /// Verifier that also runs the registry's backend checks
    pub fn with_registry(registry: &'r ModelRegistry) -> Self {
        Self { registry: Some(registry) }
    }

    pub fn verify(&self, stmt: &StatementTree, oracle: &dyn SchemaOracle) -> Result<CompilationContext, VerifyError> {
        let data_source = stmt.source.as_deref().ok_or_else(|| VerifyError::NoDataSource {
            select: stmt.select.clone(),
        })?;

        let (train, predict) = match &stmt.kind {
            StatementKind::Train(train) => (train, None),
            StatementKind::Predict { predict, train } => {
                if !predict.columns.is_empty() {
                    return Err(VerifyError::PredictRedefinesColumns {
                        result: predict.result.clone(),
                    });
                }
                let train = train.as_ref().ok_or_else(|| VerifyError::MissingTrainClause {
                    model: predict.model.clone(),
                })?;
                (train, Some(predict))
            }
        };

        let feature_names = train.field_names();
        if feature_names.is_empty() {
            return Err(VerifyError::NoFeatureColumns {
                estimator: train.estimator.clone(),
            });
        }
        debug!(data_source, estimator = %train.estimator, features = feature_names.len(), "verifying statement");

        let mut fields = BTreeMap::new();
        for name in feature_names {
            let field = resolve(oracle, data_source, name)?;
            fields.insert(name.to_string(), field);
        }

        let label = match train.label.as_deref() {
            Some(name) => {
                let field = match fields.get(name) {
                    Some(field) => field.clone(),
                    None => resolve(oracle, data_source, name)?,
                };
                fields.insert(name.to_string(), field.clone());
                Some(field)
            }
            None => None,
        };

        if let Some(registry) = self.registry {
            registry.check(&train.estimator, &train.attributes, label.as_ref())?;
            if let Some(clause) = predict {
                registry.check_predict_attributes(&train.estimator, &clause.attributes)?;
            }
        }

        let predict = predict.map(|clause| predict_target(clause, train)).transpose()?;

        Ok(CompilationContext::new(
            stmt.select.clone(),
            data_source.to_string(),
            train.clone(),
            predict,
            fields,
            label,
        ))
    }
}

fn resolve(oracle: &dyn SchemaOracle, data_source: &str, column: &str) -> Result<ResolvedFieldType, VerifyError> {
    let native = oracle.resolve_column(data_source, column)?;
    let field = ResolvedFieldType::new(column, native);
    if field.data_type == DataType::Unknown {
        return Err(VerifyError::UnsupportedFieldType {
            column: column.to_string(),
            native_type: field.native_type,
        });
    }

    debug!(column, native_type = %field.native_type, data_type = %field.data_type, "resolved column");
    Ok(field)
}

/// Split `db.table.column` into its table and column parts
fn predict_target(clause: &PredictClause, train: &TrainClause) -> Result<PredictTarget, VerifyError> {
    let (result_table, result_column) = match clause.result.rsplit_once('.') {
        Some((table, column)) => (table.to_string(), column.to_string()),
        None => {
            let column = train.label.clone().ok_or_else(|| VerifyError::InvalidPredictTarget {
                target: clause.result.clone(),
            })?;
            (clause.result.clone(), column)
        }
    };

    Ok(PredictTarget {
        clause: clause.clone(),
        result_table,
        result_column,
    })
}
