//! Tolerant parsing of `docker ps` listings.
//!
//! The status command prints one `name<TAB>state` line per container. The
//! output comes from an external process and is treated as unreliable:
//! blank lines are skipped, a line without a tab still registers the name,
//! and a line without a name is dropped. Nothing here can fail.

use std::collections::btree_map::{self, BTreeMap};

/// Field delimiter between the container name and its state.
pub const FIELD_DELIMITER: char = '\t';

/// Container name to reported state, as listed by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedState(BTreeMap<String, String>);

impl ParsedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reported state for `name`. An empty string means the name was
    /// listed without a state.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, state: impl Into<String>) {
        self.0.insert(name.into(), state.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for ParsedState {
    fn from_iter<T: IntoIterator<Item = (N, S)>>(iter: T) -> Self {
        let mut parsed = ParsedState::new();
        for (name, state) in iter {
            parsed.insert(name, state);
        }
        parsed
    }
}

/// Split one line into `(name, state)`.
///
/// The line is split before trimming: a leading tab marks an empty name, and
/// such lines are dropped like blank ones.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let (name, state) = match line.split_once(FIELD_DELIMITER) {
        Some((name, state)) => (name.trim(), state.trim()),
        None => (line.trim(), ""),
    };

    if name.is_empty() {
        None
    } else {
        Some((name, state))
    }
}

/// Parse a status listing into a [`ParsedState`].
///
/// Later occurrences of a name overwrite earlier ones.
///
/// # Example
///
/// ```
/// use dockwatch::parser::parse;
///
/// let parsed = parse("web\trunning\n\nweb\texited\n");
/// assert_eq!(parsed.get("web"), Some("exited"));
/// assert_eq!(parsed.len(), 1);
/// ```
pub fn parse(text: &str) -> ParsedState {
    text.lines().filter_map(split_line).collect()
}

/// Container names from a listing, in first-seen order, without duplicates.
///
/// Used for the name-only listing behind the import operation; a state
/// column, if present, is ignored.
pub fn parse_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (name, _) in text.lines().filter_map(split_line) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
