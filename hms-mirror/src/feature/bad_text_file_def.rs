//! `ROW FORMAT DELIMITED ... WITH SERDEPROPERTIES` repair.
//!
//! Captured form (not replayable):
//!
//! ```text
//! ROW FORMAT DELIMITED
//!   FIELDS TERMINATED BY '|'
//!   LINES TERMINATED BY '\n'
//! WITH SERDEPROPERTIES (
//!   'escape.delim'='\\')
//! STORED AS INPUTFORMAT
//! ```
//!
//! Rewritten form:
//!
//! ```text
//! ROW FORMAT SERDE
//!   'org.apache.hadoop.hive.serde2.lazy.LazySimpleSerDe'
//! WITH SERDEPROPERTIES (
//!   'field.delim'='|',
//!   'line.delim'='\n',
//!   'escape.delim'='\\')
//! STORED AS INPUTFORMAT
//! ```

use super::{contains, group_for, index_of};
use regex::Regex;
use std::sync::OnceLock;

const ROW_FORMAT_DELIMITED: &str = "ROW FORMAT DELIMITED";
const WITH_SERDEPROPERTIES: &str = "WITH SERDEPROPERTIES";
const ROW_FORMAT_SERDE: &str = "ROW FORMAT SERDE";
const LAZY_SERDE: &str = "'org.apache.hadoop.hive.serde2.lazy.LazySimpleSerDe'";

/// Octal escape Hive accepts for a form-feed delimiter
const FORM_FEED_ESCAPE: &str = "'\\014'";

struct Delimiters {
    fields: Regex,
    lines: Regex,
    collection_items: Regex,
    map_keys: Regex,
}

/// A quoted delimiter (escapes allowed) or a bare run up to the next space or tab.
const VALUE: &str = r"('(?:[^'\\]|\\.)*'|[^ \t]+)";

fn delimiters() -> &'static Delimiters {
    static PATTERNS: OnceLock<Delimiters> = OnceLock::new();
    let clause = |prefix: &str| {
        Regex::new(&format!(r"(?i){} TERMINATED BY {}", prefix, VALUE)).expect("valid pattern")
    };
    PATTERNS.get_or_init(|| Delimiters {
        fields: clause("FIELDS"),
        lines: clause("LINES"),
        collection_items: clause("COLLECTION ITEMS"),
        map_keys: clause("MAP KEYS"),
    })
}

/// Position of the serde-properties marker that follows the delimited block
/// starting at `rfd`: on the same line after `ROW FORMAT DELIMITED`, or on a
/// later line.
fn serde_marker_after(lines: &[String], rfd: usize) -> Option<SerdeMarker> {
    let line = lines[rfd].to_ascii_uppercase();
    if let Some(start) = line.find(ROW_FORMAT_DELIMITED) {
        let tail = start + ROW_FORMAT_DELIMITED.len();
        if let Some(pos) = line[tail..].find(WITH_SERDEPROPERTIES) {
            return Some(SerdeMarker::Inline(tail + pos));
        }
    }
    index_of(lines, WITH_SERDEPROPERTIES, rfd + 1).map(SerdeMarker::Line)
}

enum SerdeMarker {
    /// Byte offset within the `ROW FORMAT DELIMITED` line
    Inline(usize),
    Line(usize),
}

pub(super) fn applicable(lines: &[String]) -> bool {
    let mut from = 0;
    while let Some(rfd) = index_of(lines, ROW_FORMAT_DELIMITED, from) {
        if serde_marker_after(lines, rfd).is_some() {
            return true;
        }
        from = rfd + 1;
    }
    false
}

pub(super) fn fix_schema(lines: &mut Vec<String>) -> bool {
    if !applicable(lines) {
        return false;
    }
    tracing::debug!("Checking if table has an old TEXTFILE definition");

    let mut rewritten = false;
    let mut from = 0;
    while let Some(rfd) = index_of(lines, ROW_FORMAT_DELIMITED, from) {
        // A delimited block with no serde properties after it is valid as is.
        let ws = match serde_marker_after(lines, rfd) {
            Some(SerdeMarker::Line(ws)) => ws,
            Some(SerdeMarker::Inline(offset)) => {
                let line = lines[rfd].clone();
                lines[rfd] = line[..offset].trim_end().to_string();
                lines.insert(rfd + 1, line[offset..].to_string());
                rfd + 1
            }
            None => break,
        };
        let marker = rewrite_block(lines, rfd, ws);
        rewritten = true;
        from = marker + 1;
    }
    rewritten
}

/// Replace `lines[rfd..ws]` with the serde header and move the delimiters into
/// the serde properties. Returns the index of the `WITH SERDEPROPERTIES` line.
fn rewrite_block(lines: &mut Vec<String>, rfd: usize, ws: usize) -> usize {
    let patterns = delimiters();
    let block = &lines[rfd..ws];
    let serde_props = &lines[ws..];

    let delims: Vec<(&str, Option<String>)> = vec![
        (
            "field.delim",
            group_for(&patterns.fields, block).map(|v| escape_form_feed(&v)),
        ),
        ("line.delim", group_for(&patterns.lines, block)),
        (
            "collection.delim",
            group_for(&patterns.collection_items, block),
        ),
        ("mapkey.delim", group_for(&patterns.map_keys, block)),
    ];
    // Properties set by a later ALTER win over the original delimiter clause.
    let additions: Vec<String> = delims
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value?;
            let quoted_key = format!("'{}'", key);
            if serde_props.iter().any(|line| line.contains(&quoted_key)) {
                None
            } else {
                Some(format!("{}={},", quoted_key, value))
            }
        })
        .collect();

    lines.drain(rfd..ws);
    lines.insert(rfd, ROW_FORMAT_SERDE.to_string());
    lines.insert(rfd + 1, LAZY_SERDE.to_string());

    let marker = rfd + 2;
    open_serde_properties(lines, marker);

    for (offset, addition) in additions.into_iter().enumerate() {
        lines.insert(marker + 1 + offset, addition);
    }
    marker
}

/// Make the marker line end with `(` so new properties can follow it directly.
///
/// Handles `WITH SERDEPROPERTIES` followed by a `(...` line, and the single-line
/// `WITH SERDEPROPERTIES ('k'='v')` form.
fn open_serde_properties(lines: &mut Vec<String>, marker: usize) {
    let line = lines[marker].trim().to_string();
    let end = line
        .to_ascii_uppercase()
        .find(WITH_SERDEPROPERTIES)
        .map(|pos| pos + WITH_SERDEPROPERTIES.len())
        .unwrap_or(line.len());
    let head = &line[..end];
    let rest = line[end..].trim();

    if rest.is_empty() {
        let next_opens = lines
            .get(marker + 1)
            .map(|next| next.trim_start().starts_with('('))
            .unwrap_or(false);
        if next_opens {
            lines[marker] = format!("{} (", head);
            let next = lines[marker + 1].trim_start();
            lines[marker + 1] = next[1..].trim_start().to_string();
        }
    } else if let Some(inline) = rest.strip_prefix('(') {
        let inline = inline.trim().to_string();
        lines[marker] = format!("{} (", head);
        if !inline.is_empty() {
            lines.insert(marker + 1, inline);
        }
    }
}

/// A form feed, bare or quoted, becomes its octal escape.
fn escape_form_feed(value: &str) -> String {
    if value.trim_matches('\'') == "\u{000C}" {
        FORM_FEED_ESCAPE.to_string()
    } else {
        value.to_string()
    }
}
