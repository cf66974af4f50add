//! Question tables and the rules compiled from them.
//!
//! A [`QaTable`] is what callers write: exact questions, standard (regex)
//! questions and no-op patterns, each in declaration order. [`RuleSet::compile`]
//! turns it into matchers anchored at the end of the transcript:
//!
//! - exact questions are split on whitespace, each word is escaped, and the
//!   words are joined by `[\s\n]+`, so reflowed prompts still match
//! - standard questions are used as written (wrapped in a group, so an
//!   alternation is anchored as a whole)
//! - every pattern is followed by `[\s\n]*$`, so a rule only fires while its
//!   prompt is the last thing the command printed
//!
//! # Example
//!
//! ```
//! use qa_run::rules::{QaTable, RuleSet};
//!
//! let table = QaTable::new()
//!     .exact("Continue? [y/n]", "y")
//!     .standard(r"Install into (?P<dir>/\S+)\?", "${dir}/sub")
//!     .no_qa(r"Compiling \S+\.\.\.");
//!
//! let rules = RuleSet::compile(&table)?;
//! assert_eq!(rules.len(), 2);
//! # Ok::<(), qa_run::QaError>(())
//! ```

use std::fmt;

use regex::bytes::{Captures, Regex};

use crate::error::{QaError, Result};

/// Separator placed between the words of an exact question.
const WORD_SEPARATOR: &str = r"[\s\n]+";

/// Suffix anchoring every pattern at the end of the transcript.
const END_ANCHOR: &str = r"[\s\n]*$";

/// A question and the answers given to it, in rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaEntry {
    /// Literal question text or regular expression.
    pub question: String,
    /// Answer templates; successive matches cycle through them.
    pub answers: Vec<String>,
}

/// The question/answer table for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaTable {
    exact: Vec<QaEntry>,
    standard: Vec<QaEntry>,
    no_qa: Vec<String>,
}

impl QaTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a literal question with a single answer.
    #[must_use]
    pub fn exact(self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.exact_cycle(question, [answer])
    }

    /// Add a literal question whose answers are used in turn.
    #[must_use]
    pub fn exact_cycle<I, S>(mut self, question: impl Into<String>, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exact.push(QaEntry {
            question: question.into(),
            answers: answers.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a regular-expression question with a single answer.
    #[must_use]
    pub fn standard(self, pattern: impl Into<String>, answer: impl Into<String>) -> Self {
        self.standard_cycle(pattern, [answer])
    }

    /// Add a regular-expression question whose answers are used in turn.
    #[must_use]
    pub fn standard_cycle<I, S>(mut self, pattern: impl Into<String>, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.standard.push(QaEntry {
            question: pattern.into(),
            answers: answers.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a pattern for output that is not a question and needs no answer.
    #[must_use]
    pub fn no_qa(mut self, pattern: impl Into<String>) -> Self {
        self.no_qa.push(pattern.into());
        self
    }

    /// Exact questions in declaration order.
    #[must_use]
    pub fn exact_entries(&self) -> &[QaEntry] {
        &self.exact
    }

    /// Standard questions in declaration order.
    #[must_use]
    pub fn standard_entries(&self) -> &[QaEntry] {
        &self.standard
    }

    /// No-op patterns in declaration order.
    #[must_use]
    pub fn no_qa_patterns(&self) -> &[String] {
        &self.no_qa
    }

    /// Check whether the table declares anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.standard.is_empty() && self.no_qa.is_empty()
    }
}

/// Which table a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Built from a literal question.
    Exact,
    /// Built from a caller-supplied regular expression.
    Standard,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Standard => f.write_str("standard"),
        }
    }
}

/// Build the anchored pattern for a literal question.
///
/// ```
/// assert_eq!(
///     qa_run::rules::exact_pattern("Continue? [y/n]"),
///     r"Continue\?[\s\n]+\[y/n\][\s\n]*$"
/// );
/// ```
#[must_use]
pub fn exact_pattern(question: &str) -> String {
    let words: Vec<String> = question.split_whitespace().map(regex::escape).collect();
    format!("{}{END_ANCHOR}", words.join(WORD_SEPARATOR))
}

fn anchored(pattern: &str) -> String {
    format!("(?:{pattern}){END_ANCHOR}")
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| QaError::invalid_pattern(pattern, e))
}

/// A compiled question and its answers.
#[derive(Debug, Clone)]
pub struct QuestionRule {
    kind: RuleKind,
    question: String,
    matcher: Regex,
    answers: Vec<String>,
    expands: bool,
}

impl QuestionRule {
    /// Compile a literal question.
    ///
    /// Fails if the question is blank, has no answers, or if the derived
    /// pattern does not match the question text itself.
    pub fn exact(question: &str, answers: Vec<String>) -> Result<Self> {
        if question.trim().is_empty() {
            return Err(QaError::invalid_pattern(question, "question is blank"));
        }
        let pattern = exact_pattern(question);
        let matcher = compile_regex(&pattern)?;
        if !matcher.is_match(question.as_bytes()) {
            return Err(QaError::QuestionSelfMatch {
                question: question.to_string(),
                pattern,
            });
        }
        Self::with_matcher(RuleKind::Exact, question, matcher, answers)
    }

    /// Compile a regular-expression question.
    pub fn standard(pattern: &str, answers: Vec<String>) -> Result<Self> {
        let matcher = compile_regex(&anchored(pattern))?;
        Self::with_matcher(RuleKind::Standard, pattern, matcher, answers)
    }

    fn with_matcher(
        kind: RuleKind,
        question: &str,
        matcher: Regex,
        answers: Vec<String>,
    ) -> Result<Self> {
        if answers.is_empty() {
            return Err(QaError::NoAnswers {
                question: question.to_string(),
            });
        }
        let expands = matcher.capture_names().flatten().next().is_some();
        tracing::debug!(%kind, question, pattern = matcher.as_str(), ?answers, "compiled question rule");
        Ok(Self {
            kind,
            question: question.to_string(),
            matcher,
            answers,
            expands,
        })
    }

    /// Which table the rule came from.
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        self.kind
    }

    /// The question as declared.
    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    /// The compiled, anchored pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    /// Number of answers in rotation.
    #[must_use]
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Match against the whole transcript.
    #[must_use]
    pub fn captures<'t>(&self, transcript: &'t [u8]) -> Option<Captures<'t>> {
        self.matcher.captures(transcript)
    }

    /// Build the bytes to send for the answer at `index` (modulo the
    /// rotation length).
    ///
    /// When the pattern has named groups, `$name` and `${name}` in the
    /// template are replaced by the captured text. The result ends in
    /// exactly one newline.
    #[must_use]
    pub fn answer(&self, index: usize, captures: &Captures<'_>) -> Vec<u8> {
        let template = &self.answers[index % self.answers.len()];
        let mut answer = Vec::with_capacity(template.len() + 1);
        if self.expands {
            captures.expand(template.as_bytes(), &mut answer);
        } else {
            answer.extend_from_slice(template.as_bytes());
        }
        while answer.last() == Some(&b'\n') {
            answer.pop();
        }
        answer.push(b'\n');
        answer
    }
}

/// A compiled pattern for output that needs no answer.
#[derive(Debug, Clone)]
pub struct NoOpPattern {
    source: String,
    matcher: Regex,
}

impl NoOpPattern {
    /// Compile a no-op pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let matcher = compile_regex(&anchored(pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    /// The pattern as declared.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check the end of the transcript.
    #[must_use]
    pub fn is_match(&self, transcript: &[u8]) -> bool {
        self.matcher.is_match(transcript)
    }
}

/// A rule that matched, with its position in priority order.
#[derive(Debug)]
pub struct RuleMatch<'r, 't> {
    /// Index into [`RuleSet::rules`].
    pub index: usize,
    /// The rule itself.
    pub rule: &'r QuestionRule,
    /// Captures of the match.
    pub captures: Captures<'t>,
}

/// Every compiled rule of one table.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Exact rules followed by standard rules, each in declaration order.
    rules: Vec<QuestionRule>,
    no_qa: Vec<NoOpPattern>,
}

impl RuleSet {
    /// Compile a table.
    ///
    /// The first invalid entry aborts compilation.
    pub fn compile(table: &QaTable) -> Result<Self> {
        let mut rules = Vec::with_capacity(table.exact.len() + table.standard.len());
        for entry in &table.exact {
            rules.push(QuestionRule::exact(&entry.question, entry.answers.clone())?);
        }
        for entry in &table.standard {
            rules.push(QuestionRule::standard(&entry.question, entry.answers.clone())?);
        }
        let no_qa = table
            .no_qa
            .iter()
            .map(|p| NoOpPattern::new(p))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            rules = rules.len(),
            no_qa = ?no_qa.iter().map(NoOpPattern::source).collect::<Vec<_>>(),
            "compiled question table"
        );
        Ok(Self { rules, no_qa })
    }

    /// All question rules in priority order.
    #[must_use]
    pub fn rules(&self) -> &[QuestionRule] {
        &self.rules
    }

    /// No-op patterns in declaration order.
    #[must_use]
    pub fn no_qa(&self) -> &[NoOpPattern] {
        &self.no_qa
    }

    /// Number of question rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check whether there are no question rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the highest-priority rule matching the end of the transcript.
    ///
    /// Exact rules outrank standard rules; within a kind the earlier
    /// declaration wins.
    #[must_use]
    pub fn find<'r, 't>(&'r self, transcript: &'t [u8]) -> Option<RuleMatch<'r, 't>> {
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            rule.captures(transcript).map(|captures| RuleMatch {
                index,
                rule,
                captures,
            })
        })
    }

    /// Find the first no-op pattern matching the end of the transcript.
    #[must_use]
    pub fn find_no_qa(&self, transcript: &[u8]) -> Option<&NoOpPattern> {
        self.no_qa.iter().find(|p| p.is_match(transcript))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn answers(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn exact_rule_tolerates_reflowed_whitespace() {
        let rule = QuestionRule::exact("Continue? [y/n]", answers(&["y"])).unwrap();
        assert!(rule.captures(b"Continue? [y/n] ").is_some());
        assert!(rule.captures(b"some output\nContinue?\n  [y/n]\n").is_some());
        assert!(rule.captures(b"Continue? [y/n] and more").is_none());
    }

    #[test]
    fn exact_rule_escapes_metacharacters() {
        let rule = QuestionRule::exact("Path (e.g. /usr/*)?", answers(&["/opt"])).unwrap();
        assert!(rule.captures(b"Path (e.g. /usr/*)?").is_some());
        assert!(rule.captures(b"Path xe.g. /usr/*)?").is_none());
    }

    #[test]
    fn blank_question_is_rejected() {
        let err = QuestionRule::exact("   ", answers(&["y"])).unwrap_err();
        assert!(matches!(err, QaError::InvalidPattern { .. }));
    }

    #[test]
    fn missing_answers_are_rejected() {
        let err = QuestionRule::exact("Continue?", Vec::new()).unwrap_err();
        assert!(matches!(err, QaError::NoAnswers { .. }));
    }

    #[test]
    fn invalid_standard_pattern_is_rejected() {
        let err = QuestionRule::standard("Install (here", answers(&["y"])).unwrap_err();
        assert!(matches!(err, QaError::InvalidPattern { .. }));
    }

    #[test]
    fn standard_rule_is_anchored() {
        let rule = QuestionRule::standard(r"Proceed\? \[\w+\]", answers(&["yes"])).unwrap();
        assert!(rule.captures(b"Proceed? [yes]  \n").is_some());
        assert!(rule.captures(b"Proceed? [yes] done").is_none());
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let rule = QuestionRule::standard("Overwrite|Replace", answers(&["y"])).unwrap();
        assert!(rule.captures(b"Overwrite\n").is_some());
        assert!(rule.captures(b"Overwrite done, next step").is_none());
    }

    #[test]
    fn answer_gets_trailing_newline() {
        let rule = QuestionRule::exact("Name?", answers(&["bob", "alice\n"])).unwrap();
        let caps = rule.captures(b"Name?").unwrap();
        assert_eq!(rule.answer(0, &caps), b"bob\n");
        assert_eq!(rule.answer(1, &caps), b"alice\n");
        assert_eq!(rule.answer(2, &caps), b"bob\n");
    }

    #[test]
    fn extra_trailing_newlines_collapse_to_one() {
        let rule = QuestionRule::exact("Proceed?", answers(&["y\n\n", "", "\n"])).unwrap();
        let caps = rule.captures(b"Proceed?").unwrap();
        assert_eq!(rule.answer(0, &caps), b"y\n");
        assert_eq!(rule.answer(1, &caps), b"\n");
        assert_eq!(rule.answer(2, &caps), b"\n");
    }

    #[test]
    fn named_groups_expand_into_answer() {
        let rule =
            QuestionRule::standard(r"Install into (?P<dir>/\S+)\?", answers(&["${dir}/sub"]))
                .unwrap();
        let caps = rule.captures(b"Install into /opt/app?").unwrap();
        assert_eq!(rule.answer(0, &caps), b"/opt/app/sub\n");
    }

    #[test]
    fn dollar_is_verbatim_without_named_groups() {
        let rule = QuestionRule::exact("Password?", answers(&["pa$word"])).unwrap();
        let caps = rule.captures(b"Password?").unwrap();
        assert_eq!(rule.answer(0, &caps), b"pa$word\n");
    }

    #[test]
    fn rule_set_prefers_exact_over_standard() {
        let table = QaTable::new()
            .standard(r"Continue\?.*", "standard")
            .exact("Continue? [y/n]", "exact");
        let rules = RuleSet::compile(&table).unwrap();

        let hit = rules.find(b"Continue? [y/n] ").unwrap();
        assert_eq!(hit.rule.kind(), RuleKind::Exact);
        assert_eq!(hit.index, 0);
        assert_eq!(hit.rule.answer(0, &hit.captures), b"exact\n");
    }

    #[test]
    fn rule_set_keeps_declaration_order() {
        let table = QaTable::new()
            .standard(r"Select.*:", "first")
            .standard(r"Select a compiler:", "second");
        let rules = RuleSet::compile(&table).unwrap();
        let hit = rules.find(b"Select a compiler:").unwrap();
        assert_eq!(hit.rule.question(), "Select.*:");
    }

    #[test]
    fn no_qa_patterns_are_anchored() {
        let table = QaTable::new().no_qa(r"Compiling \S+\.\.\.");
        let rules = RuleSet::compile(&table).unwrap();
        assert!(rules.find_no_qa(b"Compiling foo.c...\n").is_some());
        assert!(rules.find_no_qa(b"Compiling foo.c...\nWhat now?").is_none());
        assert!(rules.is_empty());
    }

    #[test]
    fn first_bad_entry_aborts_compilation() {
        let table = QaTable::new().exact("ok?", "y").no_qa("(unclosed");
        assert!(RuleSet::compile(&table).is_err());
    }

    proptest! {
        #[test]
        fn exact_pattern_matches_its_question(question in "[ -~\t\n]{1,80}") {
            prop_assume!(!question.trim().is_empty());
            let rule = QuestionRule::exact(&question, answers(&["x"]));
            prop_assert!(rule.is_ok(), "{question:?} did not self-match");
        }

        #[test]
        fn answers_end_in_exactly_one_newline(answer in "[ -~\n]{0,40}") {
            let rule = QuestionRule::exact("Q?", vec![answer.clone()]).unwrap();
            let caps = rule.captures(b"Q?").unwrap();
            let sent = rule.answer(0, &caps);
            let body = answer.trim_end_matches('\n');
            prop_assert_eq!(sent.last(), Some(&b'\n'));
            prop_assert_eq!(&sent[..sent.len() - 1], body.as_bytes());
        }
    }
}
