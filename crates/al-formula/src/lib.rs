//! Formula evaluation
//!
//! Evaluates small arithmetic expressions over numeric literals, `+ - * /`
//! and parentheses. Before parsing, substitution tokens are replaced with
//! the numeric value they resolve to:
//!
//! - `[var:<scope>:<id>]` - a variable (`global`/`g`, `local`/`l`, `component`/`c`)
//! - `[var:<id>]` - a global variable
//! - `[param:<id>]` - a numeric parameter of the running sequence
//!
//! # Example
//!
//! ```ignore
//! let evaluator = FormulaEvaluator::new();
//! let result = evaluator.evaluate("[var:global:7] * 2 + 1", &source)?;
//! ```

mod error;
mod evaluator;
mod parser;
mod token;

pub use error::{FormulaError, FormulaResult};
pub use evaluator::FormulaEvaluator;
pub use parser::{parse, BinaryOp, Expr};
pub use token::{find_tokens, substitute, Token, TokenSource};
