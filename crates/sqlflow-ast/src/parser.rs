//! Pest-based parser for extended SQL

use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::{Parser, Position, Span};
use pest_derive::Parser;
use std::collections::HashSet;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "sqlflow.pest"]
pub struct StatementParser;

/// Grammar violation. Parsing never returns a partial tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: expected {expected}, found {found}")]
pub struct ParseError {
    /// Byte offset into the statement text
    pub position: usize,
    pub line: usize,
    pub column: usize,
    pub expected: String,
    pub found: String,
}

/// Parse an extended SQL statement into AST
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    let mut pairs =
        StatementParser::parse(Rule::statement, source).map_err(|e| syntax_error(source, e))?;
    let statement = pairs.next().ok_or_else(|| at_end(source, "SELECT"))?;

    let mut select = None;
    let mut clause = None;

    for pair in statement.into_inner() {
        match pair.as_rule() {
            Rule::select_stmt => {
                select = Some(build_select(pair));
            }
            Rule::train_clause => {
                clause = Some(Clause::Train(build_train(pair)?));
            }
            Rule::predict_clause => {
                clause = Some(Clause::Predict(build_predict(pair)?));
            }
            Rule::EOI => {}
            _ => {}
        }
    }

    Ok(Statement {
        select: select.ok_or_else(|| at_end(source, "SELECT"))?,
        clause: clause.ok_or_else(|| at_end(source, "TRAIN or PREDICT"))?,
    })
}

/// Parse a plain `SELECT` (no ML clause), e.g. a `validation.select` attribute
pub fn parse_select(source: &str) -> Result<Select, ParseError> {
    let mut pairs =
        StatementParser::parse(Rule::select_only, source).map_err(|e| syntax_error(source, e))?;
    let select_only = pairs.next().ok_or_else(|| at_end(source, "SELECT"))?;

    select_only
        .into_inner()
        .find(|p| p.as_rule() == Rule::select_stmt)
        .map(build_select)
        .ok_or_else(|| at_end(source, "SELECT"))
}

fn build_select(pair: Pair<Rule>) -> Select {
    let text = pair.as_str().trim().to_string();
    let source = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::from_source)
        .and_then(|p| p.into_inner().find(|p| p.as_rule() == Rule::source_table))
        .map(|p| p.as_str().to_string());

    Select { text, source }
}

fn build_train(pair: Pair<Rule>) -> Result<Train, ParseError> {
    let span = pair.as_span();

    let mut model = None;
    let mut with = Vec::new();
    let mut columns = Vec::new();
    let mut label = None;
    let mut into = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::model_name => model = Some(inner.as_str().to_string()),
            Rule::with_clause => with = build_with(inner)?,
            Rule::column_clause => columns.push(build_column_clause(inner)?),
            Rule::label_clause => label = build_label(inner),
            Rule::into_clause => into = build_model_ref(inner),
            _ => {}
        }
    }

    Ok(Train {
        model: model.ok_or_else(|| error_at(&span, "model name"))?,
        with,
        columns,
        label,
        into: into.ok_or_else(|| error_at(&span, "INTO"))?,
    })
}

fn build_predict(pair: Pair<Rule>) -> Result<Predict, ParseError> {
    let span = pair.as_span();

    let mut result = None;
    let mut with = Vec::new();
    let mut columns = Vec::new();
    let mut using = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::result_target => result = Some(inner.as_str().to_string()),
            Rule::with_clause => with = build_with(inner)?,
            Rule::column_clause => columns.push(build_column_clause(inner)?),
            Rule::using_clause => using = build_model_ref(inner),
            _ => {}
        }
    }

    Ok(Predict {
        result: result.ok_or_else(|| error_at(&span, "result table"))?,
        with,
        columns,
        using: using.ok_or_else(|| error_at(&span, "USING"))?,
    })
}

fn build_with(pair: Pair<Rule>) -> Result<Vec<Attribute>, ParseError> {
    let mut seen = HashSet::new();
    let mut attributes = Vec::new();

    for attr in pair.into_inner().filter(|p| p.as_rule() == Rule::attribute) {
        let span = attr.as_span();
        let mut inner = attr.into_inner();
        let key_pair = inner.next().ok_or_else(|| error_at(&span, "attribute"))?;
        let value_pair = inner.next().ok_or_else(|| error_at(&span, "attribute value"))?;

        let key = key_pair.as_str().to_string();
        if !seen.insert(key.clone()) {
            return Err(error_at(&key_pair.as_span(), "unique attribute name"));
        }

        attributes.push(Attribute {
            key,
            value: build_literal(value_pair)?,
        });
    }

    Ok(attributes)
}

fn build_literal(pair: Pair<Rule>) -> Result<Literal, ParseError> {
    let inner = match pair.as_rule() {
        Rule::attr_value => first_inner(pair, "attribute value")?,
        _ => pair,
    };

    match inner.as_rule() {
        Rule::list => {
            let items: Result<Vec<_>, _> = inner.into_inner().map(build_literal).collect();
            Ok(Literal::List(items?))
        }
        Rule::boolean => Ok(Literal::Bool(inner.as_str().eq_ignore_ascii_case("true"))),
        Rule::number => build_number(&inner),
        Rule::string => Ok(Literal::String(build_string(inner))),
        _ => Err(error_at(&inner.as_span(), "attribute value")),
    }
}

fn build_number(pair: &Pair<Rule>) -> Result<Literal, ParseError> {
    let text = pair.as_str();
    if text.contains(|c| matches!(c, '.' | 'e' | 'E')) {
        text.parse()
            .map(Literal::Float)
            .map_err(|_| error_at(&pair.as_span(), "number"))
    } else {
        text.parse()
            .map(Literal::Int)
            .map_err(|_| error_at(&pair.as_span(), "64-bit integer"))
    }
}

fn build_string(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|chars| unescape(chars.as_str()))
        .unwrap_or_default()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn build_column_clause(pair: Pair<Rule>) -> Result<ColumnClause, ParseError> {
    let mut exprs = Vec::new();
    let mut target = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::column_expr => exprs.push(build_expr(inner)?),
            Rule::for_target => {
                target = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::target_name)
                    .map(|p| p.as_str().to_string());
            }
            _ => {}
        }
    }

    Ok(ColumnClause { exprs, target })
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let inner = first_inner(pair, "column expression")?;

    match inner.as_rule() {
        Rule::call => {
            let span = inner.as_span();
            let mut parts = inner.into_inner();
            let name = parts
                .next()
                .ok_or_else(|| error_at(&span, "column transform"))?
                .as_str()
                .to_string();
            let args = parts.map(build_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::FuncCall(FuncCall { name, args }))
        }
        Rule::column_list => {
            let items = inner.into_inner().map(build_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::List(items))
        }
        Rule::number => build_number(&inner).map(Expr::Literal),
        Rule::string => Ok(Expr::Literal(Literal::String(build_string(inner)))),
        Rule::field => Ok(Expr::Column(inner.as_str().to_string())),
        _ => Err(error_at(&inner.as_span(), "column expression")),
    }
}

fn build_label(pair: Pair<Rule>) -> Option<String> {
    let inner = pair
        .into_inner()
        .find(|p| matches!(p.as_rule(), Rule::label_name | Rule::string))?;
    match inner.as_rule() {
        Rule::string => Some(build_string(inner)),
        _ => Some(inner.as_str().to_string()),
    }
}

fn build_model_ref(pair: Pair<Rule>) -> Option<String> {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::model_ref)
        .map(|p| p.as_str().to_string())
}

fn first_inner<'i>(pair: Pair<'i, Rule>, expected: &str) -> Result<Pair<'i, Rule>, ParseError> {
    let span = pair.as_span();
    pair.into_inner().next().ok_or_else(|| error_at(&span, expected))
}

fn error_at(span: &Span, expected: &str) -> ParseError {
    let (line, column) = span.start_pos().line_col();
    ParseError {
        position: span.start(),
        line,
        column,
        expected: expected.to_string(),
        found: found_at(span.as_str(), 0),
    }
}

fn at_end(source: &str, expected: &str) -> ParseError {
    let (line, column) = Position::new(source, source.len()).map_or((1, 1), |p| p.line_col());
    ParseError {
        position: source.len(),
        line,
        column,
        expected: expected.to_string(),
        found: "end of input".to_string(),
    }
}

fn syntax_error(source: &str, err: pest::error::Error<Rule>) -> ParseError {
    let position = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match err.line_col {
        LineColLocation::Pos(lc) => lc,
        LineColLocation::Span(lc, _) => lc,
    };
    let expected = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } => describe_rules(positives),
        ErrorVariant::CustomError { message } => message.clone(),
    };

    ParseError {
        position,
        line,
        column,
        expected,
        found: found_at(source, position),
    }
}

fn describe_rules(rules: &[Rule]) -> String {
    let mut labels: Vec<&str> = Vec::new();
    for label in rules.iter().filter_map(describe) {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    if labels.is_empty() {
        "valid syntax".to_string()
    } else {
        labels.join(" or ")
    }
}

fn describe(rule: &Rule) -> Option<&'static str> {
    let label = match rule {
        Rule::EOI => "end of input",
        Rule::select_stmt | Rule::kw_select => "SELECT",
        Rule::from_source | Rule::kw_from => "FROM",
        Rule::train_clause | Rule::kw_train => "TRAIN",
        Rule::predict_clause | Rule::kw_predict => "PREDICT",
        Rule::with_clause | Rule::kw_with => "WITH",
        Rule::column_clause | Rule::kw_column => "COLUMN",
        Rule::label_clause | Rule::kw_label => "LABEL",
        Rule::into_clause | Rule::kw_into => "INTO",
        Rule::using_clause | Rule::kw_using => "USING",
        Rule::for_target | Rule::kw_for => "FOR",
        Rule::attribute | Rule::attr_key => "attribute",
        Rule::attr_value | Rule::list | Rule::boolean => "attribute value",
        Rule::column_expr | Rule::call | Rule::column_list | Rule::field => "column expression",
        Rule::model_name | Rule::model_ref => "model name",
        Rule::result_target => "result table",
        Rule::target_name => "column target",
        Rule::label_name => "label column",
        Rule::number => "number",
        Rule::string => "string",
        _ => return None,
    };
    Some(label)
}

fn found_at(source: &str, position: usize) -> String {
    let rest = source.get(position..).unwrap_or("");
    let word: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
        .take(32)
        .collect();
    if !word.is_empty() {
        return word;
    }

    rest.chars()
        .next()
        .map_or_else(|| "end of input".to_string(), |c| c.to_string())
}
