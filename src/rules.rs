//! # rules: ordered include / exclude glob evaluation
//!
//! Exclude and include lists are folded into one ordered list of
//! [`PatternRule`]s, evaluated last-match-wins:
//!
//! 1. A universal `**` rule selects everything.
//! 2. Every exclude entry follows in its original order. Plain entries
//!    deselect; entries starting with `!` have the marker stripped and
//!    re-select, overriding only the excludes before them.
//! 3. Every include entry is appended last, so includes win over any exclude.
//!
//! [`RuleSet`] compiles the list once and answers per-path verdicts without
//! touching the filesystem.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::PackageError;

/// Leading marker that turns an exclude entry into a re-include.
pub const NEGATION_MARKER: char = '!';

/// Pattern that matches every path, the implicit first rule.
pub const MATCH_ALL: &str = "**";

/// What a rule does to the paths it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Removes matching paths from the selection.
    Exclude,
    /// Adds matching paths; comes from the include list (or the implicit `**`).
    Include,
    /// Adds matching paths; comes from a `!`-prefixed exclude entry.
    Reinclude,
}

impl Polarity {
    /// Whether a path whose last matching rule has this polarity is selected.
    pub fn selects(self) -> bool {
        !matches!(self, Polarity::Exclude)
    }
}

/// A single glob with its polarity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub pattern: String,
    pub polarity: Polarity,
}

impl PatternRule {
    fn new(pattern: impl Into<String>, polarity: Polarity) -> Self {
        Self {
            pattern: pattern.into(),
            polarity,
        }
    }
}

/// Fold exclude and include lists into the ordered rule list.
pub fn normalize(exclude: &[String], include: &[String]) -> Vec<PatternRule> {
    let mut rules = Vec::with_capacity(1 + exclude.len() + include.len());
    rules.push(PatternRule::new(MATCH_ALL, Polarity::Include));

    for entry in exclude {
        match entry.strip_prefix(NEGATION_MARKER) {
            Some(pattern) => rules.push(PatternRule::new(pattern, Polarity::Reinclude)),
            None => rules.push(PatternRule::new(entry.as_str(), Polarity::Exclude)),
        }
    }

    rules.extend(
        include
            .iter()
            .map(|pattern| PatternRule::new(pattern.as_str(), Polarity::Include)),
    );
    rules
}

/// Order-preserving union: `base` followed by the entries of `extra` not already present.
pub fn merge_unique(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged = base.to_vec();
    for entry in extra {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    merged
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: PatternRule,
    matcher: GlobMatcher,
}

/// A compiled, ordered rule list with last-match-wins evaluation.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile an ordered rule list.
    ///
    /// `*` does not cross `/`, `**` spans any number of directories and
    /// dotfiles are matched like any other name.
    pub fn compile(rules: Vec<PatternRule>) -> Result<Self, PackageError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matcher = GlobBuilder::new(&rule.pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|source| PackageError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                Ok(CompiledRule { rule, matcher })
            })
            .collect::<Result<Vec<_>, PackageError>>()?;
        Ok(Self { rules })
    }

    /// Normalize and compile exclude / include lists in one step.
    pub fn from_lists(exclude: &[String], include: &[String]) -> Result<Self, PackageError> {
        Self::compile(normalize(exclude, include))
    }

    /// The verdict of the last rule matching `path`, if any rule matches.
    pub fn verdict(&self, path: &str) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|compiled| compiled.matcher.is_match(path))
            .map(|compiled| compiled.rule.polarity.selects())
    }

    /// Whether `path` (forward-slash, relative to the project root) is selected.
    pub fn is_selected(&self, path: &str) -> bool {
        self.verdict(path).unwrap_or(false)
    }

    pub fn rules(&self) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
