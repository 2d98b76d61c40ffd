//! Model registry and backend attribute policy
//!
//! Maps an estimator identifier from `TRAIN <model>` to the backend that
//! generates code for it, together with the `WITH` attributes it understands
//! and the label types it can learn from.

use serde::{Deserialize, Serialize};
use sqlflow_ir::{Attributes, ResolvedFieldType, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Prefix shared by every Keras model shipped in the model zoo
pub const KERAS_PREFIX: &str = "sqlflow_models.";

/// Optional prefix accepted in front of canned TensorFlow estimators
pub const ESTIMATOR_PREFIX: &str = "tf.estimator.";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unrecognized attribute {key} for {estimator}")]
    UnknownAttribute { estimator: String, key: String },

    #[error("attribute {key} of {estimator} uses an unknown namespace")]
    UnknownNamespace { estimator: String, key: String },

    #[error("attribute {key} of {estimator} expects {expected}, got {actual}")]
    InvalidAttribute {
        estimator: String,
        key: String,
        expected: ParamKind,
        actual: &'static str,
    },

    #[error("attribute {key} = {value} conflicts with {estimator}")]
    ConflictingAttribute {
        estimator: String,
        key: String,
        value: String,
    },

    #[error("{estimator} requires attribute {key}")]
    MissingAttribute { estimator: String, key: String },

    #[error("{estimator} requires a LABEL column")]
    MissingLabel { estimator: String },

    #[error("unsupported label data type: {native_type} (column {column}) for {estimator}")]
    UnsupportedLabelType {
        estimator: String,
        column: String,
        native_type: String,
    },
}

/// Code generation strategy family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    TensorFlow,
    Keras,
    XGBoost,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::TensorFlow, BackendKind::Keras, BackendKind::XGBoost];

    pub fn default_policy(self) -> UnknownKeyPolicy {
        match self {
            BackendKind::TensorFlow => UnknownKeyPolicy::Strict,
            BackendKind::Keras | BackendKind::XGBoost => UnknownKeyPolicy::PassThrough,
        }
    }

    /// Attribute namespaces (`model.` in `model.n_classes`) the backend reads
    pub fn namespaces(self) -> &'static [&'static str] {
        match self {
            BackendKind::TensorFlow => &["model", "train", "validation", "predict"],
            BackendKind::Keras => &["model", "train", "validation", "predict", "optimizer"],
            BackendKind::XGBoost => &["train", "validation", "predict"],
        }
    }

    /// Whether keys without a namespace are accepted (XGBoost booster params)
    pub fn allows_bare_keys(self) -> bool {
        matches!(self, BackendKind::XGBoost)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::TensorFlow => write!(f, "tensorflow"),
            BackendKind::Keras => write!(f, "keras"),
            BackendKind::XGBoost => write!(f, "xgboost"),
        }
    }
}

/// What to do with a namespaced key the model does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    /// Forward the key to the generated program untouched
    PassThrough,
    /// Reject the statement
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Classification,
    Regression,
    Clustering,
    /// Decided by attributes at generation time (e.g. an XGBoost objective)
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Bool,
    Int,
    /// Integers are accepted too
    Float,
    String,
    IntList,
}

impl ParamKind {
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ParamKind::Bool, Value::Bool(_)) => true,
            (ParamKind::Int, Value::Int(_)) => true,
            (ParamKind::Float, Value::Int(_) | Value::Float(_)) => true,
            (ParamKind::String, Value::String(_)) => true,
            (ParamKind::IntList, Value::List(items)) => items.iter().all(|v| matches!(v, Value::Int(_))),
            _ => false,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Bool => "boolean",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::String => "string",
            ParamKind::IntList => "list of integers",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub key: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    fn optional(key: &str, kind: ParamKind) -> Self {
        Self { key: key.to_string(), kind, required: false }
    }

    fn required(key: &str, kind: ParamKind) -> Self {
        Self { key: key.to_string(), kind, required: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub backend: BackendKind,
    pub task: TaskKind,
    /// Sparse categorical inputs must be wrapped before the model sees them
    pub needs_dense: bool,
    pub params: Vec<ParamSpec>,
}

impl ModelSpec {
    pub fn param(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }
}

pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
    keras_fallback: ModelSpec,
    policies: BTreeMap<BackendKind, UnknownKeyPolicy>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            models: BTreeMap::new(),
            keras_fallback: ModelSpec {
                backend: BackendKind::Keras,
                task: TaskKind::Unspecified,
                needs_dense: true,
                params: loop_params(),
            },
            policies: BackendKind::ALL
                .into_iter()
                .map(|backend| (backend, backend.default_policy()))
                .collect(),
        };
        registry.register_builtins();
        registry
    }

    /// Registry whose unknown-key policies are overridden per backend
    pub fn with_policies(policies: impl IntoIterator<Item = (BackendKind, UnknownKeyPolicy)>) -> Self {
        let mut registry = Self::new();
        registry.policies.extend(policies);
        registry
    }

    fn register_builtins(&mut self) {
        use ParamKind::*;

        // Canned TensorFlow estimators
        let dnn = || {
            vec![
                ParamSpec::required("model.hidden_units", IntList),
                ParamSpec::optional("model.dropout", Float),
                ParamSpec::optional("model.batch_norm", Bool),
                ParamSpec::optional("model.optimizer", String),
            ]
        };
        let linear = || {
            vec![
                ParamSpec::optional("model.optimizer", String),
                ParamSpec::optional("model.sparse_combiner", String),
            ]
        };
        let combined = || {
            vec![
                ParamSpec::required("model.dnn_hidden_units", IntList),
                ParamSpec::optional("model.dnn_dropout", Float),
                ParamSpec::optional("model.dnn_optimizer", String),
                ParamSpec::optional("model.linear_optimizer", String),
                ParamSpec::optional("model.batch_norm", Bool),
            ]
        };
        let classifier = || ParamSpec::optional("model.n_classes", Int);
        let regressor = || ParamSpec::optional("model.label_dimension", Int);

        let tensorflow = [
            ("DNNClassifier", TaskKind::Classification, true, dnn(), classifier()),
            ("DNNRegressor", TaskKind::Regression, true, dnn(), regressor()),
            ("LinearClassifier", TaskKind::Classification, false, linear(), classifier()),
            ("LinearRegressor", TaskKind::Regression, false, linear(), regressor()),
            ("DNNLinearCombinedClassifier", TaskKind::Classification, true, combined(), classifier()),
            ("DNNLinearCombinedRegressor", TaskKind::Regression, true, combined(), regressor()),
        ];
        for (name, task, needs_dense, mut params, head) in tensorflow {
            params.push(head);
            params.extend(loop_params());
            self.register(name, ModelSpec { backend: BackendKind::TensorFlow, task, needs_dense, params });
        }

        // Keras model zoo
        let keras = [
            (
                "sqlflow_models.DNNClassifier",
                TaskKind::Classification,
                vec![
                    ParamSpec::optional("model.n_classes", Int),
                    ParamSpec::optional("model.hidden_units", IntList),
                ],
            ),
            (
                "sqlflow_models.StackedBiLSTMClassifier",
                TaskKind::Classification,
                vec![
                    ParamSpec::optional("model.n_classes", Int),
                    ParamSpec::optional("model.stack_units", IntList),
                ],
            ),
            (
                "sqlflow_models.DeepEmbeddingClusterModel",
                TaskKind::Clustering,
                vec![
                    ParamSpec::optional("model.n_clusters", Int),
                    ParamSpec::optional("model.pretrain_dims", IntList),
                    ParamSpec::optional("model.pretrain_lr", Float),
                    ParamSpec::optional("model.pretrain_epochs", Int),
                    ParamSpec::optional("model.run_pretrain", Bool),
                ],
            ),
        ];
        for (name, task, mut params) in keras {
            params.extend(loop_params());
            self.register(name, ModelSpec { backend: BackendKind::Keras, task, needs_dense: true, params });
        }

        // XGBoost boosters
        for booster in ["gbtree", "gblinear", "dart"] {
            let params = vec![
                ParamSpec::optional("booster", String),
                ParamSpec::optional("objective", String),
                ParamSpec::optional("eval_metric", String),
                ParamSpec::optional("num_class", Int),
                ParamSpec::optional("eta", Float),
                ParamSpec::optional("gamma", Float),
                ParamSpec::optional("max_depth", Int),
                ParamSpec::optional("min_child_weight", Float),
                ParamSpec::optional("subsample", Float),
                ParamSpec::optional("colsample_bytree", Float),
                ParamSpec::optional("lambda", Float),
                ParamSpec::optional("alpha", Float),
                ParamSpec::optional("train.num_boost_round", Int),
                ParamSpec::optional("validation.select", String),
            ];
            self.register(
                &format!("xgboost.{booster}"),
                ModelSpec { backend: BackendKind::XGBoost, task: TaskKind::Unspecified, needs_dense: false, params },
            );
        }
    }

    pub fn register(&mut self, name: &str, spec: ModelSpec) {
        self.models.insert(name.to_string(), spec);
    }

    pub fn resolve(&self, estimator: &str) -> Result<&ModelSpec, RegistryError> {
        let name = estimator.strip_prefix(ESTIMATOR_PREFIX).unwrap_or(estimator);
        if let Some(spec) = self.models.get(name) {
            return Ok(spec);
        }

        match name.strip_prefix(KERAS_PREFIX) {
            Some(model) if !model.is_empty() => Ok(&self.keras_fallback),
            _ => Err(RegistryError::UnknownModel(estimator.to_string())),
        }
    }

    pub fn policy(&self, backend: BackendKind) -> UnknownKeyPolicy {
        self.policies
            .get(&backend)
            .copied()
            .unwrap_or_else(|| backend.default_policy())
    }

    /// Validate `WITH` attributes against the model's declared parameters
    pub fn check_attributes(&self, estimator: &str, attributes: &Attributes) -> Result<(), RegistryError> {
        let spec = self.resolve(estimator)?;
        self.check_keys(estimator, spec, attributes)?;

        if let Some(missing) = spec.params.iter().find(|p| p.required && !attributes.contains_key(&p.key)) {
            return Err(RegistryError::MissingAttribute {
                estimator: estimator.to_string(),
                key: missing.key.clone(),
            });
        }

        Ok(())
    }

    /// Validate the `WITH` attributes of a `PREDICT` clause. Keys follow the
    /// same rules as on the train side, but required parameters were already
    /// supplied when the model was trained.
    pub fn check_predict_attributes(&self, estimator: &str, attributes: &Attributes) -> Result<(), RegistryError> {
        let spec = self.resolve(estimator)?;
        self.check_keys(estimator, spec, attributes)
    }

    fn check_keys(&self, estimator: &str, spec: &ModelSpec, attributes: &Attributes) -> Result<(), RegistryError> {
        let policy = self.policy(spec.backend);

        for (key, value) in attributes {
            if let Some(param) = spec.param(key) {
                if !param.kind.accepts(value) {
                    return Err(RegistryError::InvalidAttribute {
                        estimator: estimator.to_string(),
                        key: key.clone(),
                        expected: param.kind,
                        actual: value.kind_name(),
                    });
                }
                continue;
            }

            let known_namespace = match key.split_once('.') {
                Some((namespace, _)) => spec.backend.namespaces().contains(&namespace),
                None => spec.backend.allows_bare_keys(),
            };
            if !known_namespace {
                return Err(RegistryError::UnknownNamespace {
                    estimator: estimator.to_string(),
                    key: key.clone(),
                });
            }

            if policy == UnknownKeyPolicy::Strict {
                return Err(RegistryError::UnknownAttribute {
                    estimator: estimator.to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check that the model can learn from the resolved label column
    pub fn check_label(&self, estimator: &str, label: Option<&ResolvedFieldType>) -> Result<(), RegistryError> {
        let spec = self.resolve(estimator)?;

        let Some(label) = label else {
            return match spec.task {
                TaskKind::Clustering => Ok(()),
                _ => Err(RegistryError::MissingLabel { estimator: estimator.to_string() }),
            };
        };

        let supported = match spec.task {
            TaskKind::Classification => label.data_type.is_integral(),
            TaskKind::Regression | TaskKind::Clustering | TaskKind::Unspecified => label.data_type.is_numeric(),
        };
        if supported {
            Ok(())
        } else {
            Err(RegistryError::UnsupportedLabelType {
                estimator: estimator.to_string(),
                column: label.name.clone(),
                native_type: label.native_type.clone(),
            })
        }
    }

    /// Resolve the model and run every check
    pub fn check(
        &self,
        estimator: &str,
        attributes: &Attributes,
        label: Option<&ResolvedFieldType>,
    ) -> Result<&ModelSpec, RegistryError> {
        let spec = self.resolve(estimator)?;
        self.check_attributes(estimator, attributes)?;
        self.check_label(estimator, label)?;
        Ok(spec)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Training-loop, validation and prediction keys shared by the TensorFlow family
fn loop_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::optional("train.batch_size", ParamKind::Int),
        ParamSpec::optional("train.epoch", ParamKind::Int),
        ParamSpec::optional("train.verbose", ParamKind::Int),
        ParamSpec::optional("train.max_steps", ParamKind::Int),
        ParamSpec::optional("validation.select", ParamKind::String),
        ParamSpec::optional("predict.batch_size", ParamKind::Int),
    ]
}
