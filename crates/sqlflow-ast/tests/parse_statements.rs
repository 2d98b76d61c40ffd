//! Parser tests over complete extended-SQL statements

use sqlflow_ast::{parse, parse_select, parse_statement, Clause, Expr, FuncCall, Literal};
use sqlflow_ir::{ColumnExpr, StatementKind, Value, DEFAULT_COLUMN_TARGET};

fn field(name: &str) -> ColumnExpr {
    ColumnExpr::Field(name.to_string())
}

#[test]
fn test_parse_dnn_train_statement() {
    let tree = parse_statement(
        "SELECT * FROM iris.train \
         TRAIN DNNClassifier \
         WITH model.n_classes=3, model.hidden_units=[10,20] \
         COLUMN sepal_length, sepal_width, petal_length, petal_width \
         LABEL class \
         INTO sqlflow_models.my_dnn_model;",
    )
    .unwrap();

    assert_eq!(tree.select, "SELECT * FROM iris.train");
    assert_eq!(tree.source.as_deref(), Some("iris.train"));

    let train = tree.train_clause().unwrap();
    assert_eq!(train.estimator, "DNNClassifier");
    assert_eq!(train.attributes["model.n_classes"], Value::Int(3));
    assert_eq!(
        train.attributes["model.hidden_units"],
        Value::List(vec![Value::Int(10), Value::Int(20)])
    );
    assert_eq!(
        train.columns[DEFAULT_COLUMN_TARGET],
        vec![
            field("sepal_length"),
            field("sepal_width"),
            field("petal_length"),
            field("petal_width"),
        ]
    );
    assert_eq!(train.label.as_deref(), Some("class"));
    assert_eq!(train.save, "sqlflow_models.my_dnn_model");
}

#[test]
fn test_parse_predict_statement() {
    let tree = parse_statement(
        "SELECT * FROM iris.test PREDICT iris.predict.class USING sqlflow_models.my_dnn_model;",
    )
    .unwrap();

    match tree.kind {
        StatementKind::Predict { predict, train } => {
            assert_eq!(predict.result, "iris.predict.class");
            assert_eq!(predict.model, "sqlflow_models.my_dnn_model");
            assert!(predict.columns.is_empty());
            assert!(train.is_none());
        }
        StatementKind::Train(_) => panic!("expected a predict statement"),
    }
}

#[test]
fn test_parse_clustering_train_without_label() {
    let tree = parse_statement(
        "SELECT * FROM iris.train \
         TRAIN sqlflow_models.DeepEmbeddingClusterModel \
         WITH model.n_clusters = 3, model.run_pretrain = false \
         COLUMN sepal_length, sepal_width \
         INTO sqlflow_models.my_cluster_model",
    )
    .unwrap();

    let train = tree.train_clause().unwrap();
    assert_eq!(train.estimator, "sqlflow_models.DeepEmbeddingClusterModel");
    assert_eq!(train.label, None);
    assert_eq!(train.attributes["model.run_pretrain"], Value::Bool(false));
}

#[test]
fn test_keywords_are_case_insensitive() {
    let upper = parse_statement(
        "SELECT * FROM iris.train TRAIN DNNClassifier WITH model.n_classes = 3 \
         COLUMN sepal_length LABEL class INTO my_model",
    )
    .unwrap();
    let lower = parse_statement(
        "select * from iris.train train DNNClassifier with model.n_classes = 3 \
         column sepal_length label class into my_model",
    )
    .unwrap();

    assert_eq!(upper.kind, lower.kind);
    assert_eq!(lower.source.as_deref(), Some("iris.train"));
    assert_eq!(lower.select, "select * from iris.train");
}

#[test]
fn test_select_keeps_qualified_names_that_look_like_keywords() {
    let stmt = parse(
        "SELECT train.x, train.y FROM db.train WHERE train.x > 0.5 \
         TRAIN LinearRegressor COLUMN x LABEL y INTO m",
    )
    .unwrap();

    assert_eq!(
        stmt.select.text,
        "SELECT train.x, train.y FROM db.train WHERE train.x > 0.5"
    );
    assert_eq!(stmt.select.source.as_deref(), Some("db.train"));
    assert!(matches!(stmt.clause, Clause::Train(_)));
}

#[test]
fn test_select_with_quoted_keyword_and_comment() {
    let stmt = parse(
        "-- training data\n\
         SELECT * FROM events WHERE kind = 'TRAIN' -- only training rows\n\
         TRAIN DNNClassifier COLUMN a LABEL b INTO m",
    )
    .unwrap();

    assert_eq!(stmt.select.source.as_deref(), Some("events"));
    assert!(stmt.select.text.ends_with("'TRAIN'"));
}

#[test]
fn test_attribute_literals() {
    let tree = parse_statement(
        "SELECT * FROM t TRAIN DNNRegressor \
         WITH optimizer.learning_rate = 0.01, model.name = \"my \\\"dnn\\\"\", \
              model.bias = -1, train.verbose = TRUE, model.scale = 1e-3, \
              model.grid = [[1, 2], [3]], model.tag = 'x' \
         COLUMN a LABEL b INTO m",
    )
    .unwrap();

    let attrs = &tree.train_clause().unwrap().attributes;
    assert_eq!(attrs["optimizer.learning_rate"], Value::Float(0.01));
    assert_eq!(attrs["model.name"], Value::String("my \"dnn\"".to_string()));
    assert_eq!(attrs["model.bias"], Value::Int(-1));
    assert_eq!(attrs["train.verbose"], Value::Bool(true));
    assert_eq!(attrs["model.scale"], Value::Float(0.001));
    assert_eq!(
        attrs["model.grid"],
        Value::List(vec![
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(3)]),
        ])
    );
    assert_eq!(attrs["model.tag"], Value::String("x".to_string()));
}

#[test]
fn test_column_transforms_and_targets() {
    let stmt = parse(
        "SELECT * FROM census TRAIN DNNLinearCombinedClassifier \
         COLUMN age, CROSS([education, occupation], 1000) FOR linear_feature_columns \
         COLUMN EMBEDDING(CATEGORY_ID(workclass, 16), 8) FOR dnn_feature_columns \
         LABEL income INTO census_model",
    )
    .unwrap();

    let Clause::Train(train) = &stmt.clause else {
        panic!("expected a train clause");
    };
    assert_eq!(train.columns.len(), 2);
    assert_eq!(train.columns[0].target.as_deref(), Some("linear_feature_columns"));
    assert_eq!(
        train.columns[1].exprs,
        vec![Expr::FuncCall(FuncCall {
            name: "EMBEDDING".to_string(),
            args: vec![
                Expr::FuncCall(FuncCall {
                    name: "CATEGORY_ID".to_string(),
                    args: vec![
                        Expr::Column("workclass".to_string()),
                        Expr::Literal(Literal::Int(16)),
                    ],
                }),
                Expr::Literal(Literal::Int(8)),
            ],
        })]
    );

    let tree = stmt.to_ir();
    let train = tree.train_clause().unwrap();
    assert_eq!(
        train.columns.keys().collect::<Vec<_>>(),
        vec!["dnn_feature_columns", "linear_feature_columns"]
    );
    assert_eq!(
        train.columns["linear_feature_columns"][1].to_string(),
        "CROSS([education, occupation], 1000)"
    );
    assert_eq!(
        train.field_names(),
        vec!["workclass", "age", "education", "occupation"]
    );
}

#[test]
fn test_column_clauses_with_same_target_are_merged() {
    let tree = parse_statement(
        "SELECT * FROM t TRAIN DNNClassifier COLUMN a, b COLUMN c LABEL y INTO m",
    )
    .unwrap();

    let columns = &tree.train_clause().unwrap().columns;
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[DEFAULT_COLUMN_TARGET], vec![field("a"), field("b"), field("c")]);
}

#[test]
fn test_quoted_label() {
    let tree = parse_statement("SELECT * FROM t TRAIN DNNClassifier COLUMN a LABEL \"class\" INTO m")
        .unwrap();
    assert_eq!(tree.train_clause().unwrap().label.as_deref(), Some("class"));
}

#[test]
fn test_parse_select_only() {
    let select = parse_select("SELECT a, b FROM iris.val WHERE a > 1;").unwrap();
    assert_eq!(select.text, "SELECT a, b FROM iris.val WHERE a > 1");
    assert_eq!(select.source.as_deref(), Some("iris.val"));

    assert!(parse_select("SELECT * FROM t TRAIN DNNClassifier COLUMN a INTO m").is_err());
}

#[test]
fn test_error_missing_into() {
    let source = "SELECT * FROM t TRAIN DNNClassifier COLUMN a LABEL b";
    let err = parse(source).unwrap_err();

    assert!(err.expected.contains("INTO"), "expected: {}", err.expected);
    assert_eq!(err.found, "end of input");
    assert_eq!(err.position, source.len());
}

#[test]
fn test_error_missing_ml_clause() {
    let err = parse("SELECT * FROM iris.train").unwrap_err();
    assert!(err.expected.contains("TRAIN"), "expected: {}", err.expected);
    assert!(err.expected.contains("PREDICT"), "expected: {}", err.expected);
}

#[test]
fn test_error_reports_position_of_bad_attribute_value() {
    let err = parse(
        "SELECT * FROM t TRAIN DNNClassifier WITH model.n_classes = COLUMN a LABEL b INTO m",
    )
    .unwrap_err();

    assert_eq!(err.position, 59);
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 60);
    assert_eq!(err.found, "COLUMN");
    assert!(err.expected.contains("attribute value"), "expected: {}", err.expected);
}

#[test]
fn test_error_line_and_column_across_lines() {
    let err = parse("SELECT *\nFROM t\nTRAIN DNNClassifier\nWITH a = \nINTO m").unwrap_err();

    assert_eq!(err.line, 5);
    assert_eq!(err.column, 1);
    assert_eq!(err.found, "INTO");
    assert!(err.to_string().starts_with("syntax error at line 5, column 1"));
}

#[test]
fn test_error_integer_out_of_range() {
    let err = parse(
        "SELECT * FROM t TRAIN DNNClassifier WITH model.n_classes = 99999999999999999999 \
         COLUMN a LABEL b INTO m",
    )
    .unwrap_err();

    assert_eq!(err.expected, "64-bit integer");
    assert_eq!(err.found, "99999999999999999999");
}

#[test]
fn test_error_predict_without_using() {
    let err = parse("SELECT * FROM t PREDICT t.result").unwrap_err();
    assert!(err.expected.contains("USING"), "expected: {}", err.expected);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: parsing the same text twice yields identical results
        #[test]
        fn test_parse_is_deterministic(text in "[ a-zA-Z0-9_.,=*;()\\[\\]'\"-]{0,80}") {
            let prefixed = format!("SELECT * FROM t {text}");
            prop_assert_eq!(parse(&prefixed), parse(&prefixed));
        }

        /// Property: integer attributes survive parsing unchanged
        #[test]
        fn test_integer_attribute_value(n in -100_000i64..100_000, classes in 2i64..64) {
            let source = format!(
                "SELECT * FROM t TRAIN DNNClassifier WITH model.n_classes = {classes}, train.seed = {n} \
                 COLUMN a LABEL b INTO m"
            );
            let tree = parse_statement(&source).unwrap();
            let attrs = &tree.train_clause().unwrap().attributes;
            prop_assert_eq!(&attrs["train.seed"], &Value::Int(n));
            prop_assert_eq!(&attrs["model.n_classes"], &Value::Int(classes));
        }

        /// Property: extra whitespace between tokens never changes the ML clause
        #[test]
        fn test_whitespace_insensitive(gap in "[ \t\n]{1,4}") {
            let compact = parse_statement("SELECT * FROM t TRAIN DNNClassifier COLUMN a, b LABEL c INTO m").unwrap();
            let spaced = parse_statement(&format!(
                "SELECT * FROM t{gap}TRAIN{gap}DNNClassifier{gap}COLUMN{gap}a{gap},{gap}b{gap}LABEL{gap}c{gap}INTO{gap}m"
            )).unwrap();
            prop_assert_eq!(compact.kind, spaced.kind);
        }
    }
}
