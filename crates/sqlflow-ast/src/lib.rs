//! SQLFlow AST - extended SQL parser and AST types
//!
//! Parses `SELECT ... TRAIN ...` and `SELECT ... PREDICT ...` statements.
//! Parsing is purely syntactic; nothing here touches a database.

pub mod ast;
pub mod parser;
mod to_ir;

pub use ast::*;
pub use parser::{parse, parse_select, ParseError};

/// Parse statement text straight into the IR statement tree
pub fn parse_statement(source: &str) -> Result<sqlflow_ir::StatementTree, ParseError> {
    parse(source).map(Statement::to_ir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statement_lowers_to_ir() {
        let tree = parse_statement(
            "SELECT * FROM iris.test PREDICT iris.predict.class USING sqlflow_models.my_dnn_model",
        )
        .unwrap();

        assert!(!tree.is_train());
        assert_eq!(tree.source.as_deref(), Some("iris.test"));
        assert_eq!(tree.predict_clause().unwrap().model, "sqlflow_models.my_dnn_model");
        assert!(tree.train_clause().is_none());
    }
}
