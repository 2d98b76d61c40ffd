//! XGBoost booster programs

use sqlflow_ir::{ColumnExpr, Value};
use sqlflow_registry::{BackendKind, RegistryError};
use std::io::Write;

use crate::feature_column::declared_shapes;
use crate::tensorflow::{field_meta, int_attr, label_dtype, write_call, SCALAR_SHAPE};
use crate::{python, Backend, GenError, ProgramInput};

const DEFAULT_OBJECTIVE: &str = "reg:squarederror";
const DEFAULT_NUM_BOOST_ROUND: i64 = 10;

pub struct XGBoostBackend;

impl XGBoostBackend {
    /// Features must be plain numeric columns
    fn check_features(&self, input: &ProgramInput<'_>) -> Result<(), GenError> {
        for expr in input.ctx.train().columns.values().flatten() {
            let column = match expr {
                ColumnExpr::Field(name) => name,
                ColumnExpr::Call { name, args } if name.eq_ignore_ascii_case("NUMERIC") => match args.first() {
                    Some(ColumnExpr::Field(column)) => column,
                    _ => return Err(unsupported(expr.to_string(), "NUMERIC expects a column name")),
                },
                ColumnExpr::Call { name, .. } => {
                    return Err(unsupported(expr.to_string(), &format!("column transform {name} is not supported")));
                }
                ColumnExpr::Literal(_) | ColumnExpr::List(_) => {
                    return Err(unsupported(expr.to_string(), "not a feature column"));
                }
            };

            let field = input
                .ctx
                .field(column)
                .ok_or_else(|| GenError::UnresolvedColumn(column.clone()))?;
            if !field.data_type.is_numeric() {
                return Err(unsupported(column.clone(), &format!("{} is not numeric", field.native_type)));
            }
        }
        Ok(())
    }

    /// The objective decides whether the label must be a class id
    fn check_objective<'a>(&self, input: &'a ProgramInput<'_>) -> Result<&'a str, GenError> {
        let objective = input
            .attribute("objective")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OBJECTIVE);

        if objective.starts_with("multi:") && input.attribute("num_class").is_none() {
            return Err(RegistryError::MissingAttribute {
                estimator: input.estimator().to_string(),
                key: "num_class".to_string(),
            }
            .into());
        }

        let classification = objective.starts_with("multi:") || objective.starts_with("binary:");
        if let Some(label) = input.ctx.label() {
            if classification && !label.data_type.is_integral() {
                return Err(RegistryError::UnsupportedLabelType {
                    estimator: input.estimator().to_string(),
                    column: label.name.clone(),
                    native_type: label.native_type.clone(),
                }
                .into());
            }
        }
        Ok(objective)
    }

    /// The estimator names the booster; a `booster` attribute may only repeat it
    fn check_booster<'a>(&self, input: &'a ProgramInput<'_>) -> Result<&'a str, GenError> {
        let estimator = input.estimator();
        let booster = estimator.strip_prefix("xgboost.").unwrap_or(estimator);
        match input.attribute("booster") {
            Some(value) if value.as_str() != Some(booster) => Err(RegistryError::ConflictingAttribute {
                estimator: estimator.to_string(),
                key: "booster".to_string(),
                value: python::literal(value),
            }
            .into()),
            _ => Ok(booster),
        }
    }
}

impl Backend for XGBoostBackend {
    fn generate(&self, out: &mut dyn Write, input: &ProgramInput<'_>) -> Result<(), GenError> {
        self.check_features(input)?;
        let objective = self.check_objective(input)?;
        let booster = self.check_booster(input)?;

        let ctx = input.ctx;
        let predict = ctx.predict();

        writeln!(out, "# Generated by sqlflow-codegen. Do not edit.")?;
        match predict {
            Some(_) => writeln!(out, "from sqlflow_submitter.xgboost.predict import pred")?,
            None => writeln!(out, "from sqlflow_submitter.xgboost.train import train")?,
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

        let shapes = declared_shapes(&ctx.train().columns);
        writeln!(out, "feature_metas = {{")?;
        for feature in &features {
            let dtype = feature.data_type.tensor_dtype().unwrap_or("float32");
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

        // Booster parameters are the attributes without a namespace
        let mut params: Vec<(&str, String)> = ctx
            .train()
            .attributes
            .iter()
            .filter(|(key, _)| !key.contains('.') && key.as_str() != "booster")
            .map(|(key, value)| (key.as_str(), python::literal(value)))
            .collect();
        if input.attribute("objective").is_none() {
            params.push(("objective", python::string(objective)));
        }
        params.push(("booster", python::string(booster)));
        params.sort_by(|a, b| a.0.cmp(b.0));
        writeln!(out, "params = {}", python::dict(params))?;
        writeln!(out)?;

        let mut kwargs: Vec<(&str, String)> = vec![
            ("datasource", "datasource".to_string()),
            ("select", "select".to_string()),
        ];
        match predict {
            Some(target) => kwargs.push(("result_table", python::string(&target.result_table))),
            None => kwargs.push(("validate_select", "validate_select".to_string())),
        }
        kwargs.extend([
            ("feature_column_names", "feature_column_names".to_string()),
            ("feature_metas", "feature_metas".to_string()),
            ("label_meta", "label_meta".to_string()),
            ("model_params", "params".to_string()),
            ("save", python::string(input.save)),
        ]);
        if predict.is_none() {
            kwargs.push((
                "num_boost_round",
                int_attr(input, "train.num_boost_round", DEFAULT_NUM_BOOST_ROUND),
            ));
        }
        kwargs.extend(python::credential_kwargs(input.session));

        writeln!(out, "if __name__ == \"__main__\":")?;
        let entry = if predict.is_some() { "pred" } else { "train" };
        write_call(out, entry, &kwargs)
    }
}

fn unsupported(column: String, reason: &str) -> GenError {
    GenError::UnsupportedFeatureType {
        backend: BackendKind::XGBoost,
        column,
        reason: reason.to_string(),
    }
}
