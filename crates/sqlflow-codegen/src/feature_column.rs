//! Lowering of `COLUMN` expressions to TensorFlow feature-column code

use sqlflow_ir::{ColumnExpr, ColumnGroups, CompilationContext, ResolvedFieldType, Value};
use sqlflow_registry::BackendKind;
use std::collections::BTreeMap;

use crate::{python, GenError};

const TF_FC: &str = "tf.feature_column";

/// Rendered feature column with the TensorFlow column families it belongs to
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureColumn {
    pub code: String,
    pub categorical: bool,
    pub dense: bool,
}

impl FeatureColumn {
    fn dense(code: String) -> Self {
        Self { code, categorical: false, dense: true }
    }

    fn sparse(code: String) -> Self {
        Self { code, categorical: true, dense: false }
    }

    /// Bucketized columns are both
    fn bucketized(code: String) -> Self {
        Self { code, categorical: true, dense: true }
    }
}

pub(crate) struct FeatureColumnBuilder<'a> {
    ctx: &'a CompilationContext,
    backend: BackendKind,
    needs_dense: bool,
    hash_bucket_size: u64,
}

impl<'a> FeatureColumnBuilder<'a> {
    pub fn new(ctx: &'a CompilationContext, backend: BackendKind, needs_dense: bool, hash_bucket_size: u64) -> Self {
        Self {
            ctx,
            backend,
            needs_dense,
            hash_bucket_size,
        }
    }

    /// Code for one top-level `COLUMN` entry. Categorical-only columns are wrapped
    /// in an indicator column when the model only accepts dense inputs.
    pub fn build(&self, expr: &ColumnExpr) -> Result<String, GenError> {
        let column = self.column(expr)?;
        if !column.dense && self.needs_dense {
            Ok(format!("{TF_FC}.indicator_column({})", column.code))
        } else {
            Ok(column.code)
        }
    }

    fn column(&self, expr: &ColumnExpr) -> Result<FeatureColumn, GenError> {
        match expr {
            ColumnExpr::Field(name) => self.field_column(name),
            ColumnExpr::Call { name, args } => self.transform(name, args),
            ColumnExpr::Literal(_) | ColumnExpr::List(_) => Err(invalid(expr, "not a feature column")),
        }
    }

    fn field_column(&self, name: &str) -> Result<FeatureColumn, GenError> {
        let field = self.field(name)?;
        if field.data_type.is_numeric() {
            Ok(FeatureColumn::dense(numeric_column(name, "[1]")))
        } else if field.data_type.is_string() {
            Ok(FeatureColumn::sparse(format!(
                "{TF_FC}.categorical_column_with_hash_bucket({}, hash_bucket_size={})",
                python::string(name),
                self.hash_bucket_size
            )))
        } else {
            Err(self.unsupported_type(field))
        }
    }

    fn transform(&self, name: &str, args: &[ColumnExpr]) -> Result<FeatureColumn, GenError> {
        let call = ColumnExpr::Call {
            name: name.to_string(),
            args: args.to_vec(),
        };

        match name.to_ascii_uppercase().as_str() {
            "NUMERIC" => {
                let (column, rest) = self.numeric_field(&call, args)?;
                let shape = match rest {
                    [] => "[1]".to_string(),
                    [shape] => shape_literal(shape).ok_or_else(|| invalid(&call, "shape must be an integer or a list of integers"))?,
                    _ => return Err(invalid(&call, "expects NUMERIC(column[, shape])")),
                };
                Ok(FeatureColumn::dense(numeric_column(column, &shape)))
            }
            "CATEGORY_ID" => {
                let (column, buckets) = field_and_count(&call, args)?;
                let field = self.field(column)?;
                if !field.data_type.is_integral() {
                    return Err(GenError::UnsupportedFeatureType {
                        backend: self.backend,
                        column: field.name.clone(),
                        reason: format!("CATEGORY_ID reads integer ids, got {}", field.native_type),
                    });
                }
                Ok(FeatureColumn::sparse(format!(
                    "{TF_FC}.categorical_column_with_identity({}, num_buckets={buckets})",
                    python::string(column)
                )))
            }
            "CATEGORY_HASH" => {
                let (column, buckets) = field_and_count(&call, args)?;
                self.field(column)?;
                Ok(FeatureColumn::sparse(format!(
                    "{TF_FC}.categorical_column_with_hash_bucket({}, hash_bucket_size={buckets})",
                    python::string(column)
                )))
            }
            "BUCKET" => {
                let [source, boundaries] = args else {
                    return Err(invalid(&call, "expects BUCKET(column, [boundaries])"));
                };
                let source = match source {
                    ColumnExpr::Field(_) => {
                        let (column, _) = self.numeric_field(&call, std::slice::from_ref(source))?;
                        numeric_column(column, "[1]")
                    }
                    ColumnExpr::Call { name, .. } if name.eq_ignore_ascii_case("NUMERIC") => self.column(source)?.code,
                    _ => return Err(invalid(&call, "bucketizes a numeric column")),
                };
                let boundaries = number_list(boundaries)
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| invalid(&call, "boundaries must be a non-empty list of numbers"))?;
                Ok(FeatureColumn::bucketized(format!(
                    "{TF_FC}.bucketized_column({source}, boundaries={})",
                    python::list(boundaries)
                )))
            }
            "CROSS" => {
                let [ColumnExpr::List(keys), buckets] = args else {
                    return Err(invalid(&call, "expects CROSS([columns], hash_bucket_size)"));
                };
                let buckets = count(buckets).ok_or_else(|| invalid(&call, "hash_bucket_size must be a positive integer"))?;
                if keys.len() < 2 {
                    return Err(invalid(&call, "crosses at least two columns"));
                }
                let keys = keys
                    .iter()
                    .map(|key| match key {
                        ColumnExpr::Field(name) => self.field(name).map(|_| python::string(name)),
                        ColumnExpr::Call { .. } => self.categorical(&call, key),
                        _ => Err(invalid(&call, "crosses columns, not literals")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FeatureColumn::sparse(format!(
                    "{TF_FC}.crossed_column({}, hash_bucket_size={buckets})",
                    python::list(keys)
                )))
            }
            "EMBEDDING" => {
                let (categorical, dimension, combiner) = match args {
                    [categorical, dimension] => (categorical, dimension, "mean"),
                    [categorical, dimension, ColumnExpr::Literal(Value::String(combiner))] => {
                        (categorical, dimension, combiner.as_str())
                    }
                    _ => return Err(invalid(&call, "expects EMBEDDING(categorical, dimension[, combiner])")),
                };
                if !matches!(combiner, "mean" | "sum" | "sqrtn") {
                    return Err(invalid(&call, "combiner must be one of mean, sum, sqrtn"));
                }
                let dimension = count(dimension).ok_or_else(|| invalid(&call, "dimension must be a positive integer"))?;
                Ok(FeatureColumn::dense(format!(
                    "{TF_FC}.embedding_column({}, dimension={dimension}, combiner={})",
                    self.categorical(&call, categorical)?,
                    python::string(combiner)
                )))
            }
            "INDICATOR" => {
                let [categorical] = args else {
                    return Err(invalid(&call, "expects INDICATOR(categorical)"));
                };
                Ok(FeatureColumn::dense(format!(
                    "{TF_FC}.indicator_column({})",
                    self.categorical(&call, categorical)?
                )))
            }
            "SCALE" => {
                let (column, rest) = self.numeric_field(&call, args)?;
                let [min, max] = rest else {
                    return Err(invalid(&call, "expects SCALE(column, min, max)"));
                };
                let (Some(min), Some(max)) = (number(min), number(max)) else {
                    return Err(invalid(&call, "min and max must be numbers"));
                };
                if max <= min {
                    return Err(invalid(&call, "max must be greater than min"));
                }
                Ok(FeatureColumn::dense(format!(
                    "{TF_FC}.numeric_column({}, shape=[1], normalizer_fn=lambda x: (x - {}) / ({} - {}))",
                    python::string(column),
                    python::float(min),
                    python::float(max),
                    python::float(min)
                )))
            }
            _ => Err(GenError::UnsupportedColumnTransform(name.to_string())),
        }
    }

    /// A categorical argument of `EMBEDDING`, `INDICATOR` or `CROSS`
    fn categorical(&self, call: &ColumnExpr, expr: &ColumnExpr) -> Result<String, GenError> {
        let column = self.column(expr)?;
        if column.categorical {
            Ok(column.code)
        } else {
            Err(invalid(call, &format!("{expr} is not a categorical column")))
        }
    }

    /// Leading field argument that must resolve to a numeric column
    fn numeric_field<'e>(&self, call: &ColumnExpr, args: &'e [ColumnExpr]) -> Result<(&'e str, &'e [ColumnExpr]), GenError> {
        let Some((ColumnExpr::Field(column), rest)) = args.split_first() else {
            return Err(invalid(call, "first argument must be a column name"));
        };
        let field = self.field(column)?;
        if !field.data_type.is_numeric() {
            return Err(self.unsupported_type(field));
        }
        Ok((column.as_str(), rest))
    }

    fn field(&self, name: &str) -> Result<&'a ResolvedFieldType, GenError> {
        self.ctx
            .field(name)
            .ok_or_else(|| GenError::UnresolvedColumn(name.to_string()))
    }

    fn unsupported_type(&self, field: &ResolvedFieldType) -> GenError {
        GenError::UnsupportedFeatureType {
            backend: self.backend,
            column: field.name.clone(),
            reason: format!("{} is neither numeric nor a string", field.native_type),
        }
    }
}

/// Shapes declared with `NUMERIC(column, shape)`, by column. The first
/// declaration of a column wins.
pub(crate) fn declared_shapes(columns: &ColumnGroups) -> BTreeMap<&str, String> {
    let mut shapes = BTreeMap::new();
    for expr in columns.values().flatten() {
        collect_shapes(expr, &mut shapes);
    }
    shapes
}

fn collect_shapes<'e>(expr: &'e ColumnExpr, shapes: &mut BTreeMap<&'e str, String>) {
    match expr {
        ColumnExpr::Call { name, args } => {
            if name.eq_ignore_ascii_case("NUMERIC") {
                if let [ColumnExpr::Field(column), shape] = args.as_slice() {
                    if let Some(shape) = shape_literal(shape) {
                        shapes.entry(column.as_str()).or_insert(shape);
                    }
                }
            }
            for arg in args {
                collect_shapes(arg, shapes);
            }
        }
        ColumnExpr::List(items) => {
            for item in items {
                collect_shapes(item, shapes);
            }
        }
        ColumnExpr::Field(_) | ColumnExpr::Literal(_) => {}
    }
}

fn numeric_column(column: &str, shape: &str) -> String {
    format!("{TF_FC}.numeric_column({}, shape={shape})", python::string(column))
}

fn invalid(expr: &ColumnExpr, reason: &str) -> GenError {
    GenError::InvalidColumnExpr {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

fn field_and_count<'e>(call: &ColumnExpr, args: &'e [ColumnExpr]) -> Result<(&'e str, i64), GenError> {
    match args {
        [ColumnExpr::Field(column), buckets] => {
            let buckets = count(buckets).ok_or_else(|| invalid(call, "bucket count must be a positive integer"))?;
            Ok((column.as_str(), buckets))
        }
        _ => Err(invalid(call, "expects (column, bucket count)")),
    }
}

fn count(expr: &ColumnExpr) -> Option<i64> {
    match expr {
        ColumnExpr::Literal(Value::Int(n)) if *n > 0 => Some(*n),
        _ => None,
    }
}

fn number(expr: &ColumnExpr) -> Option<f64> {
    match expr {
        ColumnExpr::Literal(Value::Int(n)) => Some(*n as f64),
        ColumnExpr::Literal(Value::Float(f)) => Some(*f),
        _ => None,
    }
}

/// Bracketed numbers, accepted as a column list or a literal list
fn number_list(expr: &ColumnExpr) -> Option<Vec<String>> {
    let render = |value: &Value| match value {
        Value::Int(n) => Some(n.to_string()),
        Value::Float(f) => Some(python::float(*f)),
        _ => None,
    };

    match expr {
        ColumnExpr::List(items) => items
            .iter()
            .map(|item| match item {
                ColumnExpr::Literal(value) => render(value),
                _ => None,
            })
            .collect(),
        ColumnExpr::Literal(Value::List(items)) => items.iter().map(render).collect(),
        _ => None,
    }
}

fn shape_literal(expr: &ColumnExpr) -> Option<String> {
    match expr {
        ColumnExpr::Literal(Value::Int(n)) if *n > 0 => Some(format!("[{n}]")),
        ColumnExpr::List(items) => {
            let dims = items.iter().map(count).collect::<Option<Vec<_>>>()?;
            (!dims.is_empty()).then(|| python::list(dims.iter().map(i64::to_string)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlflow_ir::{Attributes, ColumnGroups, TrainClause};
    use std::collections::BTreeMap;

    fn ctx() -> CompilationContext {
        let fields = [
            ("age", "INT"),
            ("fare", "DOUBLE"),
            ("city", "VARCHAR(64)"),
            ("occupation", "TEXT"),
            ("joined", "DATE"),
        ]
        .into_iter()
        .map(|(name, native)| (name.to_string(), ResolvedFieldType::new(name, native)))
        .collect::<BTreeMap<_, _>>();

        let train = TrainClause {
            estimator: "DNNClassifier".to_string(),
            attributes: Attributes::new(),
            columns: ColumnGroups::new(),
            label: None,
            save: "m".to_string(),
        };
        CompilationContext::new("SELECT * FROM t".to_string(), "t".to_string(), train, None, fields, None)
    }

    fn field(name: &str) -> ColumnExpr {
        ColumnExpr::Field(name.to_string())
    }

    fn int(n: i64) -> ColumnExpr {
        ColumnExpr::Literal(Value::Int(n))
    }

    fn call(name: &str, args: Vec<ColumnExpr>) -> ColumnExpr {
        ColumnExpr::Call { name: name.to_string(), args }
    }

    fn build(expr: &ColumnExpr, needs_dense: bool) -> Result<String, GenError> {
        let ctx = ctx();
        FeatureColumnBuilder::new(&ctx, BackendKind::TensorFlow, needs_dense, 1000).build(expr)
    }

    #[test]
    fn test_bare_fields() {
        assert_eq!(
            build(&field("age"), true).unwrap(),
            "tf.feature_column.numeric_column(\"age\", shape=[1])"
        );
        assert_eq!(
            build(&field("city"), true).unwrap(),
            "tf.feature_column.indicator_column(tf.feature_column.categorical_column_with_hash_bucket(\"city\", hash_bucket_size=1000))"
        );
        assert_eq!(
            build(&field("city"), false).unwrap(),
            "tf.feature_column.categorical_column_with_hash_bucket(\"city\", hash_bucket_size=1000)"
        );
        assert!(matches!(
            build(&field("joined"), true),
            Err(GenError::UnsupportedFeatureType { .. })
        ));
        assert!(matches!(build(&field("missing"), true), Err(GenError::UnresolvedColumn(_))));
    }

    #[test]
    fn test_numeric_and_bucket() {
        assert_eq!(
            build(&call("numeric", vec![field("fare"), ColumnExpr::List(vec![int(2), int(3)])]), true).unwrap(),
            "tf.feature_column.numeric_column(\"fare\", shape=[2, 3])"
        );

        let bucket = call(
            "BUCKET",
            vec![
                call("NUMERIC", vec![field("age"), int(1)]),
                ColumnExpr::List(vec![int(18), ColumnExpr::Literal(Value::Float(65.5))]),
            ],
        );
        assert_eq!(
            build(&bucket, false).unwrap(),
            "tf.feature_column.bucketized_column(tf.feature_column.numeric_column(\"age\", shape=[1]), boundaries=[18, 65.5])"
        );

        let bare = call("BUCKET", vec![field("age"), ColumnExpr::List(vec![int(30)])]);
        assert_eq!(
            build(&bare, false).unwrap(),
            "tf.feature_column.bucketized_column(tf.feature_column.numeric_column(\"age\", shape=[1]), boundaries=[30])"
        );
        assert!(build(&call("NUMERIC", vec![field("city")]), true).is_err());
    }

    #[test]
    fn test_categorical_transforms() {
        let identity = call("CATEGORY_ID", vec![field("age"), int(100)]);
        assert_eq!(
            build(&identity, false).unwrap(),
            "tf.feature_column.categorical_column_with_identity(\"age\", num_buckets=100)"
        );
        assert!(build(&identity, true).unwrap().starts_with("tf.feature_column.indicator_column("));

        let embedding = call("EMBEDDING", vec![call("CATEGORY_HASH", vec![field("city"), int(50)]), int(8), ColumnExpr::Literal(Value::String("sum".to_string()))]);
        assert_eq!(
            build(&embedding, true).unwrap(),
            "tf.feature_column.embedding_column(tf.feature_column.categorical_column_with_hash_bucket(\"city\", hash_bucket_size=50), dimension=8, combiner=\"sum\")"
        );

        let cross = call("CROSS", vec![ColumnExpr::List(vec![field("city"), field("occupation")]), int(1000)]);
        assert_eq!(
            build(&cross, false).unwrap(),
            "tf.feature_column.crossed_column([\"city\", \"occupation\"], hash_bucket_size=1000)"
        );

        let indicator = call("INDICATOR", vec![field("city")]);
        assert_eq!(
            build(&indicator, false).unwrap(),
            "tf.feature_column.indicator_column(tf.feature_column.categorical_column_with_hash_bucket(\"city\", hash_bucket_size=1000))"
        );
        assert!(matches!(
            build(&call("INDICATOR", vec![field("age")]), false),
            Err(GenError::InvalidColumnExpr { .. })
        ));
    }

    #[test]
    fn test_category_id_needs_integer_column() {
        for column in ["city", "fare"] {
            let err = build(&call("CATEGORY_ID", vec![field(column), int(10)]), false).unwrap_err();
            assert!(matches!(
                err,
                GenError::UnsupportedFeatureType { column: ref c, .. } if c == column
            ));
        }
        assert!(build(&call("category_id", vec![field("age"), int(10)]), false).is_ok());
    }

    #[test]
    fn test_declared_shapes() {
        let mut columns = ColumnGroups::new();
        columns.insert(
            "feature_columns".to_string(),
            vec![
                field("age"),
                call("NUMERIC", vec![field("fare"), ColumnExpr::List(vec![int(2), int(3)])]),
                call("BUCKET", vec![call("numeric", vec![field("age"), int(4)]), ColumnExpr::List(vec![int(30)])]),
                call("NUMERIC", vec![field("fare"), int(6)]),
            ],
        );

        let shapes = declared_shapes(&columns);
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes["fare"], "[2, 3]");
        assert_eq!(shapes["age"], "[4]");
    }

    #[test]
    fn test_scale() {
        assert_eq!(
            build(&call("SCALE", vec![field("fare"), int(0), int(500)]), true).unwrap(),
            "tf.feature_column.numeric_column(\"fare\", shape=[1], normalizer_fn=lambda x: (x - 0.0) / (500.0 - 0.0))"
        );
        assert!(build(&call("SCALE", vec![field("fare"), int(5), int(5)]), true).is_err());
    }

    #[test]
    fn test_unknown_transform() {
        let err = build(&call("HASH_EVERYTHING", vec![field("age")]), true).unwrap_err();
        assert_eq!(err.to_string(), "unsupported column transform HASH_EVERYTHING");
    }
}
