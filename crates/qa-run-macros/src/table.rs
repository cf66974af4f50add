//! Question table macro implementation.
//!
//! Both `qa_table!` and `std_qa_table!` share one grammar; they differ in
//! which builder method the questions are fed to and in how a question is
//! turned into a pattern for validation.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, LitStr, Result, Token, bracketed};

/// Separator between the words of a literal question.
const WORD_SEPARATOR: &str = r"[\s\n]+";

/// Suffix anchoring a pattern at the end of the transcript.
const END_ANCHOR: &str = r"[\s\n]*$";

/// How the questions of a table are interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TableKind {
    /// Literal questions.
    Exact,
    /// Regular expressions.
    Standard,
}

/// One line of a table.
pub enum TableEntry {
    /// `"question" => "answer"` or `"question" => ["a", "b"]`.
    Question {
        /// The question literal.
        question: LitStr,
        /// Answers in rotation order.
        answers: Vec<LitStr>,
    },
    /// `no_qa "pattern"`.
    NoQa(LitStr),
}

impl Parse for TableEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(Ident) {
            let keyword: Ident = input.parse()?;
            if keyword != "no_qa" {
                return Err(syn::Error::new(
                    keyword.span(),
                    format!("unknown table keyword: {keyword}"),
                ));
            }
            return Ok(Self::NoQa(input.parse()?));
        }

        let question: LitStr = input.parse()?;
        let _: Token![=>] = input.parse()?;
        let answers = if input.peek(syn::token::Bracket) {
            let content;
            bracketed!(content in input);
            let list: Punctuated<LitStr, Token![,]> = Punctuated::parse_terminated(&content)?;
            list.into_iter().collect()
        } else {
            vec![input.parse()?]
        };
        Ok(Self::Question { question, answers })
    }
}

/// The macro input: comma-separated entries.
pub struct TableInput {
    /// The entries in declaration order.
    pub entries: Punctuated<TableEntry, Token![,]>,
}

impl Parse for TableInput {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            entries: Punctuated::parse_terminated(input)?,
        })
    }
}

/// The pattern the runtime derives from a literal question.
fn exact_pattern(question: &str) -> String {
    let words: Vec<String> = question.split_whitespace().map(regex::escape).collect();
    format!("{}{END_ANCHOR}", words.join(WORD_SEPARATOR))
}

fn compile(lit: &LitStr, pattern: &str) -> Result<regex::bytes::Regex> {
    regex::bytes::Regex::new(pattern)
        .map_err(|e| syn::Error::new(lit.span(), format!("invalid regex: {e}")))
}

/// Reject what the runtime would reject when compiling the table.
fn validate(kind: TableKind, question: &LitStr, answers: &[LitStr]) -> Result<()> {
    let text = question.value();
    match kind {
        TableKind::Exact => {
            if text.trim().is_empty() {
                return Err(syn::Error::new(question.span(), "question is blank"));
            }
            let pattern = exact_pattern(&text);
            if !compile(question, &pattern)?.is_match(text.as_bytes()) {
                return Err(syn::Error::new(
                    question.span(),
                    format!("question does not match its own pattern `{pattern}`"),
                ));
            }
        }
        TableKind::Standard => {
            compile(question, &format!("(?:{text}){END_ANCHOR}"))?;
        }
    }
    if answers.is_empty() {
        return Err(syn::Error::new(question.span(), "question has no answers"));
    }
    Ok(())
}

/// Generate the builder chain for a table.
pub fn expand(kind: TableKind, input: TableInput) -> TokenStream {
    let mut calls = Vec::with_capacity(input.entries.len());

    for entry in input.entries {
        match entry {
            TableEntry::Question { question, answers } => {
                if let Err(e) = validate(kind, &question, &answers) {
                    return e.to_compile_error();
                }
                calls.push(match kind {
                    TableKind::Exact => quote! { .exact_cycle(#question, [#(#answers),*]) },
                    TableKind::Standard => quote! { .standard_cycle(#question, [#(#answers),*]) },
                });
            }
            TableEntry::NoQa(pattern) => {
                if let Err(e) = compile(&pattern, &format!("(?:{}){END_ANCHOR}", pattern.value())) {
                    return e.to_compile_error();
                }
                calls.push(quote! { .no_qa(#pattern) });
            }
        }
    }

    quote! {
        ::qa_run::rules::QaTable::new() #(#calls)*
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn parse_mixed_entries() {
        let input: TableInput = parse_quote! {
            "Continue? [y/n]" => "y",
            "Pick one:" => ["a", "b"],
            no_qa r"Compiling \S+",
        };
        assert_eq!(input.entries.len(), 3);
        match &input.entries[1] {
            TableEntry::Question { answers, .. } => assert_eq!(answers.len(), 2),
            TableEntry::NoQa(_) => panic!("expected a question"),
        }
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let result: Result<TableInput> = syn::parse2(quote! { maybe "x" });
        assert!(result.is_err());
    }

    #[test]
    fn exact_questions_match_themselves() {
        let q: LitStr = parse_quote!("Install to /opt/foo? [y/n]");
        assert!(validate(TableKind::Exact, &q, &[parse_quote!("y")]).is_ok());
    }

    #[test]
    fn blank_question_is_rejected() {
        let q: LitStr = parse_quote!("   ");
        assert!(validate(TableKind::Exact, &q, &[parse_quote!("y")]).is_err());
    }

    #[test]
    fn invalid_standard_pattern_is_rejected() {
        let q: LitStr = parse_quote!("Enter (name:");
        assert!(validate(TableKind::Standard, &q, &[parse_quote!("x")]).is_err());
    }

    #[test]
    fn empty_answer_list_is_rejected() {
        let q: LitStr = parse_quote!("Proceed?");
        assert!(validate(TableKind::Exact, &q, &[]).is_err());
    }

    #[test]
    fn expansion_uses_builder() {
        let input: TableInput = parse_quote! { "Proceed?" => "y" };
        let tokens = expand(TableKind::Exact, input).to_string();
        assert!(tokens.contains("exact_cycle"));
        assert!(!tokens.contains("compile_error"));
    }
}
