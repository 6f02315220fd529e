//! Substitution tokens

use crate::error::{FormulaError, FormulaResult};
use al_core::{ParameterId, VariableId, VariableScope};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::trace;

/// A parsed substitution token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Variable { scope: VariableScope, id: VariableId },
    Parameter(ParameterId),
}

/// Resolves tokens to numbers
///
/// Implemented by whatever owns the variables a formula can see. Returns
/// `None` for anything that does not exist or is not numeric.
pub trait TokenSource {
    fn resolve(&self, token: &Token) -> Option<f64>;
}

fn token_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[(var|param):([^\[\]]*)\]").expect("token pattern is a valid regex")
    })
}

fn parse_token(captures: &Captures<'_>) -> Option<Token> {
    let body = captures.get(2)?.as_str().trim();
    match captures.get(1)?.as_str() {
        "var" => {
            let (scope, id) = match body.split_once(':') {
                Some((scope, id)) => (scope.parse().ok()?, id),
                None => (VariableScope::Global, body),
            };
            let id = id.trim().parse().ok()?;
            Some(Token::Variable {
                scope,
                id: VariableId(id),
            })
        }
        "param" => body.parse().ok().map(|id| Token::Parameter(ParameterId(id))),
        _ => None,
    }
}

/// Every well-formed token in `formula`, in order of appearance
pub fn find_tokens(formula: &str) -> Vec<Token> {
    token_regex()
        .captures_iter(formula)
        .filter_map(|c| parse_token(&c))
        .collect()
}

/// Replace every token with the textual form of its numeric value
///
/// Fails on the first token that is malformed or cannot be resolved.
/// Negative values are parenthesised so that `2 - [var:1]` stays well-formed.
pub fn substitute(formula: &str, source: &dyn TokenSource) -> FormulaResult<String> {
    let mut output = String::with_capacity(formula.len());
    let mut last = 0;

    for captures in token_regex().captures_iter(formula) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let unresolved = || FormulaError::UnresolvedToken {
            token: whole.as_str().to_string(),
        };

        let token = parse_token(&captures).ok_or_else(unresolved)?;
        let value = source.resolve(&token).ok_or_else(unresolved)?;
        trace!(token = whole.as_str(), value, "Substituted formula token");

        output.push_str(&formula[last..whole.start()]);
        if value < 0.0 {
            output.push_str(&format!("({})", value));
        } else {
            output.push_str(&value.to_string());
        }
        last = whole.end();
    }

    output.push_str(&formula[last..]);
    Ok(output)
}
