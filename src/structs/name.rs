// src/structs/name.rs

//! Structured task names.
//!
//! A name is a `group::body` pair of dot separated word paths, e.g.
//! `basic::build.docs`. Derived names extend the body past an empty word
//! with a marker (`basic::build..$cleanup$`), and concrete instances carry a
//! uuid suffix (`basic::build[<67e55044-10b1-426f-9247-bb680e5fe0c8>]`).
//!
//! Names are partially ordered by the subname relation: `A < B` when both
//! share a group, `B`'s body continues `A`'s, and `A` is either abstract or
//! carries the same uuid as `B`. Unrelated names are incomparable.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::errors::{DagtrackError, Result};

/// Separator between the group and the body.
pub const GROUP_SEP: &str = "::";
const WORD_SEP: char = '.';
/// Empty word opening the generated section of a body.
const GEN_MARK: &str = "";
/// Group prefix tolerated (and dropped) when parsing.
const TASKS_PREFIX: &str = "tasks";

/// Marker words with positional meaning in a task name body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameMark {
    Head,
    Cleanup,
    Partial,
    Data,
    Customised,
    /// Leading `+`: the spec extends another and acts as a job.
    Extend,
    /// Leading `_`: internal, hidden from listings.
    Hide,
}

impl NameMark {
    pub const fn word(self) -> &'static str {
        match self {
            NameMark::Head => "$head$",
            NameMark::Cleanup => "$cleanup$",
            NameMark::Partial => "$partial$",
            NameMark::Data => "$data$",
            NameMark::Customised => "$+$",
            NameMark::Extend => "+",
            NameMark::Hide => "_",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        [
            NameMark::Head,
            NameMark::Cleanup,
            NameMark::Partial,
            NameMark::Data,
            NameMark::Customised,
            NameMark::Extend,
            NameMark::Hide,
        ]
        .into_iter()
        .find(|m| m.word() == word)
    }

    /// Whether the mark lives in the generated section of a body.
    pub const fn is_generated(self) -> bool {
        !matches!(self, NameMark::Extend | NameMark::Hide)
    }
}

/// A structured, hashable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskName {
    group: Vec<String>,
    body: Vec<String>,
    uuid: Option<Uuid>,
}

impl TaskName {
    /// Build a name from separate group and body strings.
    pub fn new(group: &str, body: &str) -> Result<Self> {
        format!("{group}{GROUP_SEP}{body}").parse()
    }

    pub fn group(&self) -> &[String] {
        &self.group
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Concrete names carry exactly one uuid; abstract names carry none.
    pub fn is_concrete(&self) -> bool {
        self.uuid.is_some()
    }

    pub fn has_mark(&self, mark: NameMark) -> bool {
        self.body.iter().any(|w| w == mark.word())
    }

    pub fn has_generated_section(&self) -> bool {
        self.body.iter().any(|w| w == GEN_MARK)
    }

    /// The last generated-section mark in the body, if any.
    pub fn last_mark(&self) -> Option<NameMark> {
        self.body
            .iter()
            .rev()
            .filter_map(|w| NameMark::from_word(w))
            .find(|m| m.is_generated())
    }

    pub fn is_head(&self) -> bool {
        self.last_mark() == Some(NameMark::Head)
    }

    pub fn is_cleanup(&self) -> bool {
        self.last_mark() == Some(NameMark::Cleanup)
    }

    pub fn is_partial(&self) -> bool {
        self.has_mark(NameMark::Partial)
    }

    /// Append a word or marker to the body, keeping the uuid.
    ///
    /// Generated marks open the generated section if it does not exist yet.
    pub fn push(&self, word: &str) -> TaskName {
        let mut out = self.clone();
        if word.is_empty() {
            return out;
        }
        let opens_section = NameMark::from_word(word).is_some_and(NameMark::is_generated);
        if opens_section && !out.has_generated_section() {
            out.body.push(GEN_MARK.to_string());
        }
        out.body.push(word.to_string());
        out
    }

    pub fn push_mark(&self, mark: NameMark) -> TaskName {
        self.push(mark.word())
    }

    /// Truncate the generated section, keeping the uuid.
    ///
    /// `top = true` cuts at the first generated marker (back to the owning
    /// base name), `top = false` only strips the innermost section.
    pub fn pop(&self, top: bool) -> TaskName {
        let mut positions = self.body.iter().enumerate().filter(|(_, w)| *w == GEN_MARK);
        let cut = if top {
            positions.next()
        } else {
            positions.last()
        };
        let mut out = self.clone();
        if let Some((idx, _)) = cut {
            out.body.truncate(idx);
        }
        out
    }

    /// The base name this (possibly derived) name belongs to.
    pub fn root(&self) -> TaskName {
        self.pop(true)
    }

    pub fn with_head(&self) -> TaskName {
        if self.is_head() {
            return self.clone();
        }
        self.push_mark(NameMark::Head)
    }

    pub fn with_cleanup(&self) -> TaskName {
        if self.is_cleanup() {
            return self.clone();
        }
        self.push_mark(NameMark::Cleanup)
    }

    /// A concrete copy of this name with a fresh uuid.
    pub fn to_uniq(&self) -> TaskName {
        self.with_uuid(Uuid::new_v4())
    }

    pub fn with_uuid(&self, uuid: Uuid) -> TaskName {
        TaskName {
            uuid: Some(uuid),
            ..self.clone()
        }
    }

    /// The abstract form of this name.
    pub fn de_uniq(&self) -> TaskName {
        TaskName {
            uuid: None,
            ..self.clone()
        }
    }

    /// `self <= other` under the subname relation.
    pub fn is_prefix_of(&self, other: &TaskName) -> bool {
        self.group == other.group
            && other.body.starts_with(&self.body)
            && (self.uuid.is_none() || self.uuid == other.uuid)
    }

    /// The group words joined back together.
    pub fn group_str(&self) -> String {
        self.group.join(".")
    }

    /// The body words joined back together, without the uuid.
    pub fn body_str(&self) -> String {
        self.body.join(".")
    }
}

impl PartialOrd for TaskName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_prefix_of(other) {
            Some(Ordering::Less)
        } else if other.is_prefix_of(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{GROUP_SEP}{}", self.group_str(), self.body_str())?;
        if let Some(uuid) = self.uuid {
            write!(f, "[<{uuid}>]")?;
        }
        Ok(())
    }
}

impl FromStr for TaskName {
    type Err = DagtrackError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (rest, uuid) = split_uuid(s)?;

        let Some((group, body)) = rest.split_once(GROUP_SEP) else {
            let msg = if rest.contains(':') {
                format!("'{s}' uses a single ':' where '{GROUP_SEP}' is required")
            } else {
                format!("'{s}' has no '{GROUP_SEP}' between group and body")
            };
            return Err(DagtrackError::NameFormatError(msg));
        };

        if group.contains(':') || body.contains(':') {
            return Err(DagtrackError::NameFormatError(format!(
                "'{s}' has too many separators"
            )));
        }

        let mut group_words: Vec<String> = group.split(WORD_SEP).map(str::to_string).collect();
        if group_words.len() > 1 && group_words[0] == TASKS_PREFIX {
            group_words.remove(0);
        }
        if group_words.iter().any(|w| w.trim().is_empty()) {
            return Err(DagtrackError::NameFormatError(format!(
                "'{s}' has an empty group segment"
            )));
        }

        let body_words = normalise_body(body.split(WORD_SEP).map(str::to_string), s)?;

        Ok(TaskName {
            group: group_words,
            body: body_words,
            uuid,
        })
    }
}

impl TryFrom<&str> for TaskName {
    type Error = DagtrackError;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Split a trailing `[<uuid>]` off a name string.
fn split_uuid(s: &str) -> Result<(&str, Option<Uuid>)> {
    let Some(stripped) = s.strip_suffix(">]") else {
        return Ok((s, None));
    };
    let Some((rest, raw)) = stripped.rsplit_once("[<") else {
        return Err(DagtrackError::NameFormatError(format!(
            "'{s}' has an unopened uuid suffix"
        )));
    };
    let uuid = Uuid::parse_str(raw).map_err(|e| {
        DagtrackError::NameFormatError(format!("'{s}' has a bad uuid ({e})"))
    })?;
    Ok((rest, Some(uuid)))
}

/// Validate body words, inserting the generated-section marker before the
/// first generated mark when the source text left it out.
fn normalise_body(words: impl Iterator<Item = String>, src: &str) -> Result<Vec<String>> {
    let words: Vec<String> = words.collect();
    let bad = |why: &str| DagtrackError::NameFormatError(format!("'{src}' {why}"));

    match (words.first(), words.last()) {
        (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {}
        _ => return Err(bad("has an empty body or a dangling separator")),
    }
    if words.windows(2).any(|w| w[0].is_empty() && w[1].is_empty()) {
        return Err(bad("has repeated empty segments"));
    }

    let mut out: Vec<String> = Vec::with_capacity(words.len() + 1);
    let mut in_section = false;
    for word in words {
        if word.is_empty() {
            in_section = true;
        } else if !in_section && NameMark::from_word(&word).is_some_and(NameMark::is_generated) {
            out.push(GEN_MARK.to_string());
            in_section = true;
        }
        out.push(word);
    }
    Ok(out)
}
