//! Convert AST to the statement tree IR

use sqlflow_ir::{self as ir};
use crate::ast::*;

impl Statement {
    /// Convert AST Statement to IR StatementTree
    pub fn to_ir(self) -> ir::StatementTree {
        let kind = match self.clause {
            Clause::Train(train) => ir::StatementKind::Train(train.to_ir()),
            Clause::Predict(predict) => ir::StatementKind::Predict {
                predict: predict.to_ir(),
                train: None,
            },
        };

        ir::StatementTree {
            select: self.select.text,
            source: self.select.source,
            kind,
        }
    }
}

impl Train {
    fn to_ir(self) -> ir::TrainClause {
        ir::TrainClause {
            estimator: self.model,
            attributes: attributes_to_ir(self.with),
            columns: columns_to_ir(self.columns),
            label: self.label,
            save: self.into,
        }
    }
}

impl Predict {
    fn to_ir(self) -> ir::PredictClause {
        ir::PredictClause {
            result: self.result,
            attributes: attributes_to_ir(self.with),
            columns: columns_to_ir(self.columns),
            model: self.using,
        }
    }
}

fn attributes_to_ir(with: Vec<Attribute>) -> ir::Attributes {
    with.into_iter()
        .map(|attr| (attr.key, attr.value.to_ir()))
        .collect()
}

/// Clauses sharing a `FOR` target are concatenated in source order
fn columns_to_ir(clauses: Vec<ColumnClause>) -> ir::ColumnGroups {
    let mut groups = ir::ColumnGroups::new();
    for clause in clauses {
        let target = clause
            .target
            .unwrap_or_else(|| ir::DEFAULT_COLUMN_TARGET.to_string());
        groups
            .entry(target)
            .or_default()
            .extend(clause.exprs.into_iter().map(Expr::to_ir));
    }
    groups
}

impl Expr {
    fn to_ir(self) -> ir::ColumnExpr {
        match self {
            Expr::Literal(v) => ir::ColumnExpr::Literal(v.to_ir()),
            Expr::Column(name) => ir::ColumnExpr::Field(name),
            Expr::List(items) => ir::ColumnExpr::List(items.into_iter().map(Expr::to_ir).collect()),
            Expr::FuncCall(func) => ir::ColumnExpr::Call {
                name: func.name,
                args: func.args.into_iter().map(Expr::to_ir).collect(),
            },
        }
    }
}

impl Literal {
    fn to_ir(self) -> ir::Value {
        match self {
            Literal::Bool(b) => ir::Value::Bool(b),
            Literal::Int(i) => ir::Value::Int(i),
            Literal::Float(f) => ir::Value::Float(f),
            Literal::String(s) => ir::Value::String(s),
            Literal::List(items) => ir::Value::List(items.into_iter().map(Literal::to_ir).collect()),
        }
    }
}
