//! Compilation context: the verifier's output and the generator's input

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{PredictClause, ResolvedFieldType, TrainClause};

/// Where a predict statement writes its results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictTarget {
    pub clause: PredictClause,
    pub result_table: String,
    pub result_column: String,
}

/// Type-resolved snapshot of one statement.
///
/// Built once per statement by the verifier and consumed by one generator
/// invocation. The fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationContext {
    select: String,
    data_source: String,
    train: TrainClause,
    #[serde(skip_serializing_if = "Option::is_none")]
    predict: Option<PredictTarget>,
    fields: BTreeMap<String, ResolvedFieldType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<ResolvedFieldType>,
}

impl CompilationContext {
    pub fn new(
        select: String,
        data_source: String,
        train: TrainClause,
        predict: Option<PredictTarget>,
        fields: BTreeMap<String, ResolvedFieldType>,
        label: Option<ResolvedFieldType>,
    ) -> Self {
        Self {
            select,
            data_source,
            train,
            predict,
            fields,
            label,
        }
    }

    pub fn select(&self) -> &str {
        &self.select
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// The authoritative train clause, own or borrowed
    pub fn train(&self) -> &TrainClause {
        &self.train
    }

    pub fn predict(&self) -> Option<&PredictTarget> {
        self.predict.as_ref()
    }

    pub fn is_predict(&self) -> bool {
        self.predict.is_some()
    }

    /// Every referenced column, feature and label alike
    pub fn fields(&self) -> &BTreeMap<String, ResolvedFieldType> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedFieldType> {
        self.fields.get(name)
    }

    pub fn label(&self) -> Option<&ResolvedFieldType> {
        self.label.as_ref()
    }

    /// Resolved feature columns in `COLUMN` declaration order
    pub fn features(&self) -> Vec<&ResolvedFieldType> {
        self.train
            .field_names()
            .into_iter()
            .filter_map(|name| self.fields.get(name))
            .collect()
    }

    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("context should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnExpr, Value, DEFAULT_COLUMN_TARGET};

    fn context() -> CompilationContext {
        let train = TrainClause {
            estimator: "DNNClassifier".to_string(),
            attributes: BTreeMap::from([("model.n_classes".to_string(), Value::Int(3))]),
            columns: BTreeMap::from([(
                DEFAULT_COLUMN_TARGET.to_string(),
                vec![
                    ColumnExpr::Field("petal_width".to_string()),
                    ColumnExpr::Field("sepal_length".to_string()),
                ],
            )]),
            label: Some("class".to_string()),
            save: "sqlflow_models.my_dnn_model".to_string(),
        };
        let fields = BTreeMap::from([
            ("class".to_string(), ResolvedFieldType::new("class", "INT")),
            ("petal_width".to_string(), ResolvedFieldType::new("petal_width", "FLOAT")),
            ("sepal_length".to_string(), ResolvedFieldType::new("sepal_length", "FLOAT")),
        ]);
        CompilationContext::new(
            "SELECT * FROM iris.train".to_string(),
            "iris.train".to_string(),
            train,
            None,
            fields,
            Some(ResolvedFieldType::new("class", "INT")),
        )
    }

    #[test]
    fn test_features_follow_declaration_order() {
        let ctx = context();
        let names: Vec<_> = ctx.features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["petal_width", "sepal_length"]);
        assert!(!ctx.is_predict());
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let ctx1 = context();
        let ctx2 = ctx1.clone();

        assert_eq!(ctx1.fingerprint(), ctx2.fingerprint());
        assert_eq!(ctx1.fingerprint().len(), 64);
    }

    #[test]
    fn test_json_round_trip() {
        let ctx = context();

        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: CompilationContext = serde_json::from_str(&json).unwrap();

        assert_eq!(ctx.fingerprint(), parsed.fingerprint());
    }
}
