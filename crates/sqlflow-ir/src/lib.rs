//! SQLFlow Intermediate Representation (IR)
//!
//! The statement tree produced by the parser, the compilation context produced
//! by the verifier, and the collaborator interfaces (schema oracle, session
//! configuration) that the compilation phases consume.
//! All types are deterministically serializable for caching and provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

mod context;
mod schema;
mod session;
mod types;

pub use context::{CompilationContext, PredictTarget};
pub use schema::{ColumnInfo, MemorySchemaOracle, OracleError, SchemaOracle, TableSchema};
pub use session::{BackendCredentials, CredentialField, SessionConfig};
pub use types::*;

/// `FOR` target used when a `COLUMN` clause names none
pub const DEFAULT_COLUMN_TARGET: &str = "feature_columns";

/// `WITH` attributes, ordered by key
pub type Attributes = BTreeMap<String, Value>;

/// `COLUMN` expressions grouped by their `FOR` target
pub type ColumnGroups = BTreeMap<String, Vec<ColumnExpr>>;

/// One extended-SQL statement: the base select plus exactly one ML clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTree {
    /// Verbatim text of the base `SELECT`
    pub select: String,

    /// First table named after the top-level `FROM`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatementKind {
    Train(TrainClause),
    Predict {
        predict: PredictClause,
        /// Train clause borrowed through [`StatementTree::merge_for_reuse`]
        #[serde(skip_serializing_if = "Option::is_none")]
        train: Option<TrainClause>,
    },
}

/// `TRAIN <estimator> WITH ... COLUMN ... LABEL ... INTO <save>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainClause {
    pub estimator: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: ColumnGroups,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub save: String,
}

impl TrainClause {
    /// Every field referenced by the `COLUMN` clauses, deduplicated, in
    /// declaration order (targets in key order).
    pub fn field_names(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        for expr in self.columns.values().flatten() {
            expr.collect_fields(&mut fields);
        }
        let mut seen = std::collections::HashSet::new();
        fields.retain(|name| seen.insert(*name));
        fields
    }
}

/// `PREDICT <result> WITH ... USING <model>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictClause {
    /// Result target, usually `table.column`
    pub result: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,

    /// Accepted by the grammar so the verifier can reject it with a precise error
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: ColumnGroups,

    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReuseError {
    #[error("clause reuse expects a PREDICT statement, got a TRAIN statement")]
    NotPredict,

    #[error("clause reuse borrows from a TRAIN statement, got a PREDICT statement")]
    NotTrain,

    #[error("PREDICT statement is already paired with a TRAIN clause")]
    AlreadyPaired,

    #[error("PREDICT statement may not redefine COLUMN when reusing a TRAIN clause")]
    ColumnRedefined,
}

impl StatementTree {
    /// Pair a predict statement with the train clause of a train statement so
    /// the predict borrows its feature and label definitions.
    pub fn merge_for_reuse(predict: StatementTree, train: StatementTree) -> Result<StatementTree, ReuseError> {
        let train_clause = match train.kind {
            StatementKind::Train(clause) => clause,
            StatementKind::Predict { .. } => return Err(ReuseError::NotTrain),
        };

        match predict.kind {
            StatementKind::Train(_) => Err(ReuseError::NotPredict),
            StatementKind::Predict { train: Some(_), .. } => Err(ReuseError::AlreadyPaired),
            StatementKind::Predict { predict: clause, train: None } => {
                if !clause.columns.is_empty() {
                    return Err(ReuseError::ColumnRedefined);
                }
                Ok(StatementTree {
                    select: predict.select,
                    source: predict.source,
                    kind: StatementKind::Predict {
                        predict: clause,
                        train: Some(train_clause),
                    },
                })
            }
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self.kind, StatementKind::Train(_))
    }

    /// The statement's own train clause, or the one a predict borrowed
    pub fn train_clause(&self) -> Option<&TrainClause> {
        match &self.kind {
            StatementKind::Train(clause) => Some(clause),
            StatementKind::Predict { train, .. } => train.as_ref(),
        }
    }

    pub fn predict_clause(&self) -> Option<&PredictClause> {
        match &self.kind {
            StatementKind::Train(_) => None,
            StatementKind::Predict { predict, .. } => Some(predict),
        }
    }
}

/// `WITH` literal. No expression evaluation happens on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A `COLUMN` entry: a bare field or a transform call over fields and literals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnExpr {
    Field(String),
    Literal(Value),
    List(Vec<ColumnExpr>),
    Call { name: String, args: Vec<ColumnExpr> },
}

impl ColumnExpr {
    /// Append every field this expression references
    pub fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ColumnExpr::Field(name) => out.push(name),
            ColumnExpr::Literal(_) => {}
            ColumnExpr::List(items) => items.iter().for_each(|e| e.collect_fields(out)),
            ColumnExpr::Call { args, .. } => args.iter().for_each(|e| e.collect_fields(out)),
        }
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[ColumnExpr]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            ColumnExpr::Field(name) => write!(f, "{name}"),
            ColumnExpr::Literal(value) => write!(f, "{value}"),
            ColumnExpr::List(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            ColumnExpr::Call { name, args } => {
                write!(f, "{name}(")?;
                join(f, args)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_tree() -> StatementTree {
        StatementTree {
            select: "SELECT * FROM iris.train".to_string(),
            source: Some("iris.train".to_string()),
            kind: StatementKind::Train(TrainClause {
                estimator: "DNNClassifier".to_string(),
                attributes: BTreeMap::from([
                    ("model.n_classes".to_string(), Value::Int(3)),
                ]),
                columns: BTreeMap::from([(
                    DEFAULT_COLUMN_TARGET.to_string(),
                    vec![
                        ColumnExpr::Field("sepal_length".to_string()),
                        ColumnExpr::Call {
                            name: "CROSS".to_string(),
                            args: vec![
                                ColumnExpr::List(vec![
                                    ColumnExpr::Field("sepal_length".to_string()),
                                    ColumnExpr::Field("petal_width".to_string()),
                                ]),
                                ColumnExpr::Literal(Value::Int(10)),
                            ],
                        },
                    ],
                )]),
                label: Some("class".to_string()),
                save: "sqlflow_models.my_dnn_model".to_string(),
            }),
        }
    }

    fn predict_tree() -> StatementTree {
        StatementTree {
            select: "SELECT * FROM iris.test".to_string(),
            source: Some("iris.test".to_string()),
            kind: StatementKind::Predict {
                predict: PredictClause {
                    result: "iris.predict.class".to_string(),
                    attributes: Attributes::new(),
                    columns: ColumnGroups::new(),
                    model: "sqlflow_models.my_dnn_model".to_string(),
                },
                train: None,
            },
        }
    }

    #[test]
    fn test_field_names_deduplicated_in_order() {
        let tree = train_tree();
        let clause = tree.train_clause().unwrap();
        assert_eq!(clause.field_names(), vec!["sepal_length", "petal_width"]);
    }

    #[test]
    fn test_merge_for_reuse_pairs_train_clause() {
        let merged = StatementTree::merge_for_reuse(predict_tree(), train_tree()).unwrap();

        assert!(!merged.is_train());
        assert_eq!(merged.source.as_deref(), Some("iris.test"));
        assert_eq!(merged.train_clause().unwrap().estimator, "DNNClassifier");
        assert_eq!(merged.predict_clause().unwrap().result, "iris.predict.class");
    }

    #[test]
    fn test_merge_for_reuse_rejects_wrong_sides() {
        assert_eq!(
            StatementTree::merge_for_reuse(train_tree(), train_tree()),
            Err(ReuseError::NotPredict)
        );
        assert_eq!(
            StatementTree::merge_for_reuse(predict_tree(), predict_tree()),
            Err(ReuseError::NotTrain)
        );

        let merged = StatementTree::merge_for_reuse(predict_tree(), train_tree()).unwrap();
        assert_eq!(
            StatementTree::merge_for_reuse(merged, train_tree()),
            Err(ReuseError::AlreadyPaired)
        );
    }

    #[test]
    fn test_merge_for_reuse_rejects_predict_columns() {
        let mut predict = predict_tree();
        if let StatementKind::Predict { predict: clause, .. } = &mut predict.kind {
            clause.columns.insert(
                DEFAULT_COLUMN_TARGET.to_string(),
                vec![ColumnExpr::Field("sepal_width".to_string())],
            );
        }

        assert_eq!(
            StatementTree::merge_for_reuse(predict, train_tree()),
            Err(ReuseError::ColumnRedefined)
        );
    }

    #[test]
    fn test_column_expr_display() {
        let expr = ColumnExpr::Call {
            name: "BUCKET".to_string(),
            args: vec![
                ColumnExpr::Call {
                    name: "NUMERIC".to_string(),
                    args: vec![
                        ColumnExpr::Field("age".to_string()),
                        ColumnExpr::Literal(Value::Int(1)),
                    ],
                },
                ColumnExpr::Literal(Value::List(vec![Value::Int(18), Value::Float(65.5)])),
            ],
        };
        assert_eq!(expr.to_string(), "BUCKET(NUMERIC(age, 1), [18, 65.5])");
    }

    #[test]
    fn test_json_round_trip() {
        let tree = StatementTree::merge_for_reuse(predict_tree(), train_tree()).unwrap();

        let json = serde_json::to_string(&tree).unwrap();
        let parsed: StatementTree = serde_json::from_str(&json).unwrap();

        assert_eq!(tree, parsed);
    }
}
