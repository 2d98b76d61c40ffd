//! Print the pest pair tree of a statement: `cargo run --example debug_parse -- "<sql>"`

use pest::Parser;
use sqlflow_ast::parser::{Rule, StatementParser};

fn main() {
    let input = std::env::args().nth(1).unwrap_or_else(|| {
        "SELECT * FROM iris.train TRAIN DNNClassifier WITH model.n_classes = 3 \
         COLUMN sepal_length LABEL class INTO sqlflow_models.my_dnn_model;"
            .to_string()
    });

    match StatementParser::parse(Rule::statement, &input) {
        Ok(pairs) => {
            for pair in pairs {
                print_pair(&pair, 0);
            }
        }
        Err(e) => println!("Error: {}", e),
    }
}

fn print_pair(pair: &pest::iterators::Pair<Rule>, indent: usize) {
    let indent_str = "  ".repeat(indent);
    println!("{}Rule::{:?} = {:?}", indent_str, pair.as_rule(), pair.as_str());
    for inner in pair.clone().into_inner() {
        print_pair(&inner, indent + 1);
    }
}
