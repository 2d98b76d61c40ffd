//! AST types for extended SQL
//!
//! Minimal syntactic representation closely following the Pest grammar.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub select: Select,
    pub clause: Clause,
}

/// The base `SELECT`, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub text: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Train(Train),
    Predict(Predict),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub model: String,
    pub with: Vec<Attribute>,
    pub columns: Vec<ColumnClause>,
    pub label: Option<String>,
    pub into: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predict {
    pub result: String,
    pub with: Vec<Attribute>,
    pub columns: Vec<ColumnClause>,
    pub using: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnClause {
    pub exprs: Vec<Expr>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Column(String),
    List(Vec<Expr>),
    FuncCall(FuncCall),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Literal>),
}
