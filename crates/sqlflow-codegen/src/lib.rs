//! Code generation for verified extended-SQL statements
//!
//! Turns a [`CompilationContext`] into a Python submitter program for the
//! backend that owns the statement's estimator. Backends are registered once
//! when the [`Generator`] is built and looked up through the model registry.

pub mod python;

mod feature_column;
mod tensorflow;
mod xgboost;

use serde::{Deserialize, Serialize};
use sqlflow_ast::ParseError;
use sqlflow_ir::{CompilationContext, OracleError, SchemaOracle, SessionConfig, StatementTree, Value};
use sqlflow_registry::{BackendKind, ModelRegistry, ModelSpec, RegistryError};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;
use tracing::debug;

pub use tensorflow::TensorFlowBackend;
pub use xgboost::XGBoostBackend;

/// Attribute naming a separate validation query
pub const VALIDATION_SELECT: &str = "validation.select";

#[derive(Debug, Error)]
pub enum GenError {
    #[error(transparent)]
    Backend(#[from] RegistryError),

    #[error("no code generator registered for backend {0}")]
    NoBackend(BackendKind),

    #[error("statement and compilation context disagree: {0}")]
    ContextMismatch(&'static str),

    #[error("invalid validation.select: {0}")]
    ValidationSelect(#[from] ParseError),

    #[error("validation.select has no FROM table: {0}")]
    ValidationNoSource(String),

    #[error("feature column {column} not found in validation source {data_source}")]
    ValidationColumnMissing { data_source: String, column: String },

    #[error(transparent)]
    Oracle(OracleError),

    #[error("column {0} was not resolved during verification")]
    UnresolvedColumn(String),

    #[error("unsupported column transform {0}")]
    UnsupportedColumnTransform(String),

    #[error("invalid column expression {expr}: {reason}")]
    InvalidColumnExpr { expr: String, reason: String },

    #[error("{backend} cannot use feature {column}: {reason}")]
    UnsupportedFeatureType {
        backend: BackendKind,
        column: String,
        reason: String,
    },

    #[error("failed to write program: {0}")]
    Io(#[from] std::io::Error),
}

/// A model saved by an earlier train run; overrides the `USING` name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedModelRef {
    pub save: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Bucket count for string features without an explicit transform
    pub hash_bucket_size: u64,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { hash_bucket_size: 1000 }
    }
}

/// Everything a backend needs to emit one program
pub struct ProgramInput<'a> {
    pub ctx: &'a CompilationContext,
    pub spec: &'a ModelSpec,
    /// Model name to save to (train) or load from (predict)
    pub save: &'a str,
    /// Validation query for train programs
    pub validate_select: &'a str,
    pub session: &'a SessionConfig,
    pub options: &'a CodegenOptions,
}

impl ProgramInput<'_> {
    pub fn estimator(&self) -> &str {
        &self.ctx.train().estimator
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.ctx.train().attributes.get(key)
    }

    /// `WITH` attribute of the PREDICT clause, if this is a predict program
    pub fn predict_attribute(&self, key: &str) -> Option<&Value> {
        self.ctx.predict().and_then(|target| target.clause.attributes.get(key))
    }

    /// Attributes under `namespace.`, with the namespace stripped
    pub fn namespaced(&self, namespace: &str) -> BTreeMap<&str, &Value> {
        self.ctx
            .train()
            .attributes
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(namespace)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map(|name| (name, value))
            })
            .collect()
    }
}

/// Code generation strategy for one backend family
pub trait Backend {
    fn generate(&self, out: &mut dyn Write, input: &ProgramInput<'_>) -> Result<(), GenError>;
}

pub struct Generator {
    registry: ModelRegistry,
    options: CodegenOptions,
    backends: BTreeMap<BackendKind, Box<dyn Backend + Send + Sync>>,
}

impl Generator {
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_options(registry, CodegenOptions::default())
    }

    pub fn with_options(registry: ModelRegistry, options: CodegenOptions) -> Self {
        let mut backends: BTreeMap<BackendKind, Box<dyn Backend + Send + Sync>> = BTreeMap::new();
        backends.insert(BackendKind::TensorFlow, Box::new(TensorFlowBackend::estimator()));
        backends.insert(BackendKind::Keras, Box::new(TensorFlowBackend::keras()));
        backends.insert(BackendKind::XGBoost, Box::new(XGBoostBackend));

        Self {
            registry,
            options,
            backends,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Emit the submitter program for a verified statement.
    ///
    /// `stmt` must be the statement `ctx` was verified from. Output is written
    /// incrementally; on error the sink may hold a partial program.
    pub fn generate(
        &self,
        sink: &mut dyn Write,
        stmt: &StatementTree,
        trained_model: Option<&TrainedModelRef>,
        ctx: &CompilationContext,
        oracle: &dyn SchemaOracle,
        session: &SessionConfig,
    ) -> Result<(), GenError> {
        if stmt.is_train() == ctx.is_predict() {
            return Err(GenError::ContextMismatch("train/predict mode"));
        }

        let train = ctx.train();
        let spec = self.registry.check(&train.estimator, &train.attributes, ctx.label())?;
        if let Some(target) = ctx.predict() {
            self.registry
                .check_predict_attributes(&train.estimator, &target.clause.attributes)?;
        }
        let backend = self
            .backends
            .get(&spec.backend)
            .ok_or(GenError::NoBackend(spec.backend))?;

        let validate_select = match ctx.predict() {
            Some(_) => ctx.select().to_string(),
            None => validation_select(ctx, oracle)?,
        };

        let save = match (trained_model, ctx.predict()) {
            (Some(model), _) => model.save.as_str(),
            (None, Some(target)) => target.clause.model.as_str(),
            (None, None) => train.save.as_str(),
        };

        debug!(
            backend = %spec.backend,
            estimator = %train.estimator,
            predict = ctx.is_predict(),
            save,
            "generating program"
        );

        let input = ProgramInput {
            ctx,
            spec,
            save,
            validate_select: &validate_select,
            session,
            options: &self.options,
        };
        backend.generate(sink, &input)?;
        sink.flush()?;
        Ok(())
    }
}

/// The `validation.select` query after checking that it can feed every
/// feature column, or the training select when none is given.
fn validation_select(ctx: &CompilationContext, oracle: &dyn SchemaOracle) -> Result<String, GenError> {
    let Some(value) = ctx.train().attributes.get(VALIDATION_SELECT) else {
        return Ok(ctx.select().to_string());
    };
    let text = value.as_str().ok_or_else(|| {
        GenError::Backend(RegistryError::InvalidAttribute {
            estimator: ctx.train().estimator.clone(),
            key: VALIDATION_SELECT.to_string(),
            expected: sqlflow_registry::ParamKind::String,
            actual: value.kind_name(),
        })
    })?;

    let select = sqlflow_ast::parse_select(text)?;
    let data_source = select
        .source
        .ok_or_else(|| GenError::ValidationNoSource(select.text.clone()))?;

    for feature in ctx.features() {
        oracle
            .resolve_column(&data_source, &feature.name)
            .map_err(|err| match err {
                OracleError::NotFound { data_source, column } => GenError::ValidationColumnMissing { data_source, column },
                other => GenError::Oracle(other),
            })?;
    }

    debug!(data_source = %data_source, "validation select checked");
    Ok(select.text)
}
