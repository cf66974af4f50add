//! qa-run-macros: Procedural macros for qa-run
//!
//! This crate provides table literals for the qa-run command automation
//! library. A table that would fail to compile at runtime fails the build
//! instead:
//!
//! - [`qa_table!`] - Literal questions, checked to match their own pattern
//! - [`std_qa_table!`] - Regular-expression questions, checked to compile
//!
//! # Example
//!
//! ```ignore
//! use qa_run::{qa_table, std_qa_table};
//!
//! let table = qa_table! {
//!     "Install to /opt/foo? [y/n]" => "y",
//!     "Pick a mirror:" => ["1", "2"],
//!     no_qa r"Downloading \S+",
//! };
//! let licences = std_qa_table! {
//!     r"Licence key for (?P<product>\w+):" => "KEY-$product",
//! };
//! ```

// In proc-macro crates, passing parsed input by value is idiomatic
#![allow(clippy::needless_pass_by_value)]

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod table;

use table::{TableInput, TableKind};

/// Build a `QaTable` of literal questions.
///
/// # Syntax
///
/// ```ignore
/// qa_table! {
///     "question" => "answer",
///     "question" => ["first answer", "second answer"],
///     no_qa r"regex for harmless output",
/// }
/// ```
///
/// Each question must be non-blank and must match the pattern derived from
/// it; each no-op pattern must be a valid regular expression.
#[proc_macro]
pub fn qa_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as TableInput);
    table::expand(TableKind::Exact, input).into()
}

/// Build a `QaTable` of regular-expression questions.
///
/// Same syntax as [`qa_table!`]; every question is a regex.
///
/// ```ignore
/// let table = std_qa_table! {
///     r"Install into (?P<dir>/\S+)\?" => "${dir}/sub",
///     r"(Proceed|Continue)\? \[y/N\]" => "y",
/// };
/// ```
#[proc_macro]
pub fn std_qa_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as TableInput);
    table::expand(TableKind::Standard, input).into()
}
