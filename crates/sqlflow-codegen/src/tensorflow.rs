//! TensorFlow estimator and Keras model programs

use sqlflow_ir::{ResolvedFieldType, Value};
use sqlflow_registry::{BackendKind, ESTIMATOR_PREFIX};
use std::io::Write;

use crate::feature_column::{declared_shapes, FeatureColumnBuilder};
use crate::{python, Backend, GenError, ProgramInput};

const HEADER: &str = "# Generated by sqlflow-codegen. Do not edit.";

/// Shape of a column read as one value per row
pub(crate) const SCALAR_SHAPE: &str = "[1]";

pub struct TensorFlowBackend {
    keras: bool,
}

impl TensorFlowBackend {
    /// Canned `tf.estimator` models
    pub fn estimator() -> Self {
        Self { keras: false }
    }

    /// `sqlflow_models` Keras models
    pub fn keras() -> Self {
        Self { keras: true }
    }

    fn backend(&self) -> BackendKind {
        if self.keras {
            BackendKind::Keras
        } else {
            BackendKind::TensorFlow
        }
    }

    /// Python expression naming the model class
    fn estimator_expr(&self, estimator: &str) -> String {
        if self.keras {
            estimator.to_string()
        } else {
            let name = estimator.strip_prefix(ESTIMATOR_PREFIX).unwrap_or(estimator);
            format!("{ESTIMATOR_PREFIX}{name}")
        }
    }
}

impl Backend for TensorFlowBackend {
    fn generate(&self, out: &mut dyn Write, input: &ProgramInput<'_>) -> Result<(), GenError> {
        let ctx = input.ctx;
        let predict = ctx.predict();

        writeln!(out, "{HEADER}")?;
        writeln!(out, "import tensorflow as tf")?;
        if self.keras {
            writeln!(out, "import sqlflow_models")?;
        }
        match predict {
            Some(_) => writeln!(out, "from sqlflow_submitter.tensorflow.predict import pred")?,
            None => writeln!(out, "from sqlflow_submitter.tensorflow.train import train")?,
        }
        writeln!(out)?;

        writeln!(out, "datasource = {}", python::string(&input.session.connection))?;
        writeln!(out, "select = {}", python::string(ctx.select()))?;
        if predict.is_none() {
            writeln!(out, "validate_select = {}", python::string(input.validate_select))?;
        }
        writeln!(out)?;

        let features = ctx.features();
        writeln!(
            out,
            "feature_column_names = {}",
            python::list(features.iter().map(|f| python::string(&f.name)))
        )?;
        writeln!(out)?;

        let builder = FeatureColumnBuilder::new(
            ctx,
            self.backend(),
            input.spec.needs_dense,
            input.options.hash_bucket_size,
        );
        writeln!(out, "feature_columns = {{")?;
        for (target, exprs) in &ctx.train().columns {
            writeln!(out, "    {}: [", python::string(target))?;
            for expr in exprs {
                writeln!(out, "        {},", builder.build(expr)?)?;
            }
            writeln!(out, "    ],")?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        let shapes = declared_shapes(&ctx.train().columns);
        writeln!(out, "feature_metas = {{")?;
        for feature in &features {
            let dtype = feature.data_type.tensor_dtype().ok_or_else(|| GenError::UnsupportedFeatureType {
                backend: self.backend(),
                column: feature.name.clone(),
                reason: format!("{} has no tensor type", feature.native_type),
            })?;
            let shape = shapes.get(feature.name.as_str()).map_or(SCALAR_SHAPE, String::as_str);
            writeln!(out, "    {}: {},", python::string(&feature.name), field_meta(&feature.name, dtype, shape))?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        let label_name = match predict {
            Some(target) => target.result_column.as_str(),
            None => ctx.label().map_or("", |label| label.name.as_str()),
        };
        writeln!(
            out,
            "label_meta = {}",
            field_meta(label_name, label_dtype(ctx.label()), SCALAR_SHAPE)
        )?;
        writeln!(out)?;

        let model_params = python::dict(
            input
                .namespaced("model")
                .into_iter()
                .map(|(key, value)| (key, python::literal(value))),
        );
        writeln!(out, "model_params = {model_params}")?;
        writeln!(out)?;

        let mut kwargs: Vec<(&str, String)> = vec![
            ("is_keras_model", python::literal(&Value::Bool(self.keras))),
            ("datasource", "datasource".to_string()),
            ("estimator", self.estimator_expr(input.estimator())),
            ("select", "select".to_string()),
        ];
        match predict {
            Some(target) => kwargs.push(("result_table", python::string(&target.result_table))),
            None => kwargs.push(("validate_select", "validate_select".to_string())),
        }
        kwargs.extend([
            ("feature_columns", "feature_columns".to_string()),
            ("feature_column_names", "feature_column_names".to_string()),
            ("feature_metas", "feature_metas".to_string()),
            ("label_meta", "label_meta".to_string()),
            ("model_params", "model_params".to_string()),
            ("save", python::string(input.save)),
            ("batch_size", batch_size(input)),
        ]);
        if predict.is_none() {
            kwargs.push(("epochs", int_attr(input, "train.epoch", 1)));
            kwargs.push(("verbose", int_attr(input, "train.verbose", 0)));
            if let Some(max_steps) = input.attribute("train.max_steps") {
                kwargs.push(("max_steps", python::literal(max_steps)));
            }
            let optimizer = input.namespaced("optimizer");
            if self.keras && !optimizer.is_empty() {
                kwargs.push((
                    "optimizer_params",
                    python::dict(optimizer.into_iter().map(|(key, value)| (key, python::literal(value)))),
                ));
            }
        }
        kwargs.extend(python::credential_kwargs(input.session));

        writeln!(out, "if __name__ == \"__main__\":")?;
        let entry = if predict.is_some() { "pred" } else { "train" };
        write_call(out, entry, &kwargs)?;
        Ok(())
    }
}

pub(crate) fn field_meta(name: &str, dtype: &str, shape: &str) -> String {
    python::dict([
        ("feature_name", python::string(name)),
        ("dtype", python::string(dtype)),
        ("delimiter", python::string("")),
        ("shape", shape.to_string()),
        ("is_sparse", "False".to_string()),
    ])
}

/// Unlabeled models (clustering) predict integer ids
pub(crate) fn label_dtype(label: Option<&ResolvedFieldType>) -> &'static str {
    label
        .and_then(|label| label.data_type.tensor_dtype())
        .unwrap_or("int64")
}

pub(crate) fn int_attr(input: &ProgramInput<'_>, key: &str, default: i64) -> String {
    input
        .attribute(key)
        .and_then(Value::as_int)
        .unwrap_or(default)
        .to_string()
}

/// Predict programs take `predict.batch_size` from the PREDICT clause and fall
/// back to the training batch size.
fn batch_size(input: &ProgramInput<'_>) -> String {
    match input.predict_attribute("predict.batch_size").and_then(Value::as_int) {
        Some(size) => size.to_string(),
        None => int_attr(input, "train.batch_size", 1),
    }
}

/// Indented entry-point call, one keyword argument per line
pub(crate) fn write_call(out: &mut dyn Write, function: &str, kwargs: &[(&str, String)]) -> Result<(), GenError> {
    writeln!(out, "    {function}(")?;
    for (name, value) in kwargs {
        writeln!(out, "        {name}={value},")?;
    }
    writeln!(out, "    )")?;
    Ok(())
}
