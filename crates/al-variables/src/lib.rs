//! Variables and scopes
//!
//! Variables are named, typed, id-stable cells living in exactly one of
//! three scopes:
//!
//! - Global: one process-wide table
//! - Local: one table per sequence host, created and destroyed with it
//! - Component: one table per external object
//!
//! # Key Types
//!
//! - [`Variable`] - A single typed cell with backup support
//! - [`VariableTable`] - The variables of one container
//! - [`VariableScopes`] - Resolves (scope, id, container) to a live variable

mod compare;
mod scopes;
mod table;
mod variable;

pub use compare::{compare, values_equal, CompareOptions, ComparisonOp};
pub use scopes::{LocalContext, VariableRef, VariableScopes};
pub use table::VariableTable;
pub use variable::{BackupOwner, Variable, VariableConfig};
