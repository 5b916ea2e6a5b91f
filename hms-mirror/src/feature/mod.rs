//! Schema correction features
//!
//! A feature recognises one class of captured definition that can't be replayed
//! verbatim as `CREATE TABLE` on the target and rewrites the lines so it can.
//! Features run in a fixed order, each once, over the output of the previous one.

mod bad_text_file_def;

use regex::Regex;

/// Known definition fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// `ROW FORMAT DELIMITED` combined with `WITH SERDEPROPERTIES`
    BadTextFileDef,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::BadTextFileDef => "BAD_TEXTFILE_DEF",
        }
    }

    /// True when the definition has the defect this feature repairs.
    pub fn applicable(&self, lines: &[String]) -> bool {
        match self {
            Feature::BadTextFileDef => bad_text_file_def::applicable(lines),
        }
    }

    /// Rewrite the definition in place. Returns false when nothing was changed.
    pub fn fix_schema(&self, lines: &mut Vec<String>) -> bool {
        match self {
            Feature::BadTextFileDef => bad_text_file_def::fix_schema(lines),
        }
    }
}

/// Ordered list of features applied before a definition is replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Every known feature in its documented order.
    pub fn standard() -> Self {
        Self::new(vec![Feature::BadTextFileDef])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Apply each feature once, in order. Returns the names of those that changed the lines.
    pub fn apply(&self, lines: &mut Vec<String>) -> Vec<&'static str> {
        let mut applied = Vec::new();
        for feature in &self.features {
            if feature.applicable(lines) && feature.fix_schema(lines) {
                tracing::debug!(feature = feature.name(), "Definition rewritten");
                applied.push(feature.name());
            }
        }
        applied
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::standard()
    }
}

// -- line helpers shared by features ------------------------------------------

fn line_contains(line: &str, marker: &str) -> bool {
    line.to_ascii_uppercase().contains(marker)
}

fn contains(marker: &str, lines: &[String]) -> bool {
    lines.iter().any(|line| line_contains(line, marker))
}

fn index_of(lines: &[String], marker: &str, from: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line_contains(line, marker))
        .map(|(idx, _)| idx)
}

/// First capture group of `pattern` in `lines`, trailing spaces and tabs trimmed.
///
/// Other whitespace is kept: a raw form feed is a valid delimiter value.
fn group_for(pattern: &Regex, lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(&[' ', '\t'][..]).to_string())
    })
}
