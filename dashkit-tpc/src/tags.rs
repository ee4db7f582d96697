//! Tag specifications of master tiles
//!
//! A master tile carries a UISpec: for each selected tag, either the whole tag
//! value is significant or only its prefix up to the `:` separator. The UISpec
//! is compiled into a [`MatchSpec`] which is matched against the tags of
//! incoming report instances.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Separator between a tag's name and its value (`env:prod`)
pub const TPCREATOR_SEPARATOR: char = ':';

/// One UISpec entry: a tag and the prefix of it that must match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiSpecEntry {
    pub tag: String,
    pub prefix: String,
}

impl UiSpecEntry {
    pub fn new(tag: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            prefix: prefix.into(),
        }
    }

    /// Whether the entry requires the exact tag value
    pub fn is_full_tag(&self) -> bool {
        self.tag == self.prefix
    }
}

/// User-facing tag selection of a master tile
pub type UiSpec = Vec<UiSpecEntry>;

/// Prefix of a tag up to and including the first separator
///
/// Returns `None` when the tag has no separator.
pub fn tpcreator_prefix(tag: &str) -> Option<String> {
    tag.find(TPCREATOR_SEPARATOR)
        .map(|idx| tag[..idx + TPCREATOR_SEPARATOR.len_utf8()].to_string())
}

/// Suggested UISpec for a list of tags
///
/// Tags containing the separator get prefix matching, other tags must match
/// in full.
pub fn suggest_uispec(tags: &[String]) -> UiSpec {
    tags.iter()
        .map(|tag| match tpcreator_prefix(tag) {
            Some(prefix) => UiSpecEntry::new(tag.clone(), prefix),
            None => UiSpecEntry::new(tag.clone(), tag.clone()),
        })
        .collect()
}

/// Candidate prefixes for one tag, from "match everything" to exact
pub fn suggest_prefixes(tag: &str) -> Vec<String> {
    let mut res = vec![String::new()];
    if let Some(prefix) = tpcreator_prefix(tag) {
        res.push(prefix);
    }
    res.push(tag.to_string());
    res
}

/// Compiled matching rule of a master tile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpec {
    /// Tags that must be present verbatim
    pub full_tags: Vec<String>,
    /// Prefixes that must each match at least one tag, shortest first
    pub prefixes: Vec<String>,
}

impl MatchSpec {
    /// Compile a UISpec
    pub fn compile(uispec: &[UiSpecEntry]) -> Self {
        let mut full_tags: Vec<String> = Vec::new();
        let mut prefixes: Vec<String> = Vec::new();

        for entry in uispec {
            if entry.is_full_tag() {
                if !full_tags.contains(&entry.tag) {
                    full_tags.push(entry.tag.clone());
                }
            } else if !prefixes.contains(&entry.prefix) {
                prefixes.push(entry.prefix.clone());
            }
        }

        // stable: equal lengths keep first-seen order
        prefixes.sort_by_key(|p| p.len());

        Self {
            full_tags,
            prefixes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_tags.is_empty() && self.prefixes.is_empty()
    }

    /// Tags of `tags` selected by this spec, sorted and deduplicated
    ///
    /// Returns `None` when the spec or the tag list is empty, a full tag is
    /// missing, or a prefix matches no tag.
    pub fn matching_tags(&self, tags: &[String]) -> Option<Vec<String>> {
        if self.is_empty() || tags.is_empty() {
            return None;
        }

        let mut res: Vec<String> = Vec::new();
        for full_tag in &self.full_tags {
            if !tags.contains(full_tag) {
                return None;
            }
            res.push(full_tag.clone());
        }

        for prefix in &self.prefixes {
            let mut prefix_matched = false;
            for tag in tags.iter().filter(|t| t.starts_with(prefix.as_str())) {
                res.push(tag.clone());
                prefix_matched = true;
            }
            if !prefix_matched {
                return None;
            }
        }

        res.sort();
        res.dedup();
        Some(res)
    }
}

/// Piece of a tag compared in natural order: digit runs as numbers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Num(u64),
    Text(String),
}

fn natural_chunks(s: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let flush = |current: &mut String, in_digits: bool, chunks: &mut Vec<Chunk>| {
        if current.is_empty() {
            return;
        }
        let chunk = if in_digits {
            match current.parse::<u64>() {
                Ok(n) => Chunk::Num(n),
                Err(_) => Chunk::Text(current.clone()),
            }
        } else {
            Chunk::Text(current.clone())
        };
        chunks.push(chunk);
        current.clear();
    };

    for c in s.chars() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits {
            flush(&mut current, in_digits, &mut chunks);
            in_digits = is_digit;
        }
        current.push(c);
    }
    flush(&mut current, in_digits, &mut chunks);
    chunks
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TagKey {
    has_value: bool,
    name: Vec<Chunk>,
    value: Vec<Chunk>,
}

impl TagKey {
    fn new(tag: &str) -> Self {
        let (name, value) = match tag.split_once(TPCREATOR_SEPARATOR) {
            Some((name, value)) => (name, value),
            None => (tag, ""),
        };
        Self {
            has_value: !value.is_empty(),
            name: natural_chunks(name),
            value: natural_chunks(value),
        }
    }
}

/// Visual ordering of tag lists
///
/// Fewer tags sort first. Tag by tag, tags without a value (`web`, `web:`)
/// come before `name:value` tags, then names and values are compared in
/// natural order, so `p1:9` sorts before `p1:10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsSortKey {
    len: usize,
    keys: Vec<TagKey>,
}

impl TagsSortKey {
    pub fn new(tags: &[String]) -> Self {
        Self {
            len: tags.len(),
            keys: tags.iter().map(|t| TagKey::new(t)).collect(),
        }
    }
}

impl PartialOrd for TagsSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TagsSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len
            .cmp(&other.len)
            .then_with(|| self.keys.cmp(&other.keys))
    }
}
