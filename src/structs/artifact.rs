// src/structs/artifact.rs

//! File artifacts: filesystem locations that tasks produce or consume.
//!
//! Written `file::>some/path.txt` in task definitions. An artifact whose path
//! contains `*`, `?` or `**` is abstract and stands for every concrete path
//! its wildcards match.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::errors::{DagtrackError, Result};

/// Prefix marking a relation target as a file artifact.
pub const ARTIFACT_PREFIX: &str = "file::>";
const REC_GLOB: &str = "**";

/// An abstract or concrete file location. Ordered by its path text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Artifact {
    path: String,
}

impl Artifact {
    /// Build an artifact from a path, with or without the `file::>` prefix.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref().trim();
        let raw = raw.strip_prefix(ARTIFACT_PREFIX).unwrap_or(raw);
        let raw = raw.strip_prefix("./").unwrap_or(raw);
        if raw.is_empty() {
            return Err(DagtrackError::StructLoadError(
                "artifact path is empty".to_string(),
            ));
        }
        Ok(Self {
            path: raw.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_abstract(&self) -> bool {
        is_wild(&self.path)
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_abstract()
    }

    /// Compile this artifact's path as a glob; `*` does not cross directories.
    pub fn matcher(&self) -> Result<GlobMatcher> {
        let glob = GlobBuilder::new(&self.path)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                DagtrackError::StructLoadError(format!("bad artifact pattern '{}': {e}", self.path))
            })?;
        Ok(glob.compile_matcher())
    }

    /// Whether `other` is covered by this artifact.
    ///
    /// Concrete artifacts only match themselves.
    pub fn matches(&self, other: &Artifact) -> bool {
        if self == other {
            return true;
        }
        if self.is_concrete() || other.is_abstract() {
            return false;
        }
        self.matcher()
            .map(|m| m.is_match(other.path()))
            .unwrap_or(false)
    }

    /// File stem (the file name before its last `.`).
    pub fn stem(&self) -> Option<&str> {
        split_file(&self.path).1.map(|(stem, _)| stem)
    }

    /// File extension including the leading `.`, if any.
    pub fn ext(&self) -> Option<&str> {
        split_file(&self.path).1.and_then(|(_, ext)| ext)
    }

    /// Unify this abstract artifact's wildcards with `other`.
    ///
    /// Directories are matched segment by segment (`**` absorbs the rest of
    /// `other`'s directories), then stem and extension separately. Returns
    /// `None` when the two cannot be unified into a concrete path.
    pub fn reify(&self, other: &Artifact) -> Option<Artifact> {
        if self.is_concrete() {
            return None;
        }
        let (self_dirs, self_file) = split_file(&self.path);
        let (other_dirs, other_file) = split_file(&other.path);

        let mut result: Vec<&str> = Vec::new();
        let mut take_rest = false;
        for i in 0..self_dirs.len().max(other_dirs.len()) {
            let (x, y) = (self_dirs.get(i).copied(), other_dirs.get(i).copied());
            if take_rest {
                result.extend(y.or(x));
                continue;
            }
            match (x, y) {
                (Some(x), None) => result.push(x),
                (None, Some(y)) => result.push(y),
                (Some(x), Some(y)) if x == y => result.push(x),
                (Some(REC_GLOB), Some(y)) => {
                    take_rest = true;
                    result.push(y);
                }
                (Some(x), Some(y)) if is_wild(x) && segment_match(x, y) => result.push(y),
                (Some(x), Some(y)) if is_wild(y) && segment_match(y, x) => result.push(x),
                _ => return None,
            }
        }

        let (self_stem, self_ext) = self_file.unwrap_or(("", None));
        let (other_stem, other_ext) = other_file.unwrap_or(("", None));
        let stem = unify_part(Some(self_stem), Some(other_stem))?;
        let ext = unify_part(self_ext, other_ext)?;

        let file = format!("{stem}{ext}");
        if !file.is_empty() {
            result.push(&file);
        }
        let reified = Artifact::new(result.join("/")).ok()?;
        reified.is_concrete().then_some(reified)
    }

    /// Replace a wildcard stem with a concrete one, keeping directories and
    /// extension. Fails if anything else in the path is still abstract.
    pub fn with_stem(&self, stem: &str) -> Option<Artifact> {
        let (dirs, file) = split_file(&self.path);
        let (own_stem, ext) = file?;
        if dirs.iter().any(|d| is_wild(d)) || ext.is_some_and(is_wild) {
            return None;
        }
        if !(own_stem == stem || (is_wild(own_stem) && segment_match(own_stem, stem))) {
            return None;
        }
        let mut parts: Vec<String> = dirs.iter().map(|d| d.to_string()).collect();
        parts.push(format!("{stem}{}", ext.unwrap_or("")));
        Artifact::new(parts.join("/")).ok()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ARTIFACT_PREFIX}{}", self.path)
    }
}

impl FromStr for Artifact {
    type Err = DagtrackError;

    fn from_str(s: &str) -> Result<Self> {
        Artifact::new(s)
    }
}

fn is_wild(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

fn segment_match(pattern: &str, text: &str) -> bool {
    Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(text))
        .unwrap_or(false)
}

/// Unify a stem or extension pair.
fn unify_part<'a>(x: Option<&'a str>, y: Option<&'a str>) -> Option<&'a str> {
    match (x, y) {
        (None, None) => Some(""),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) if x == y => Some(x),
        (Some(x), Some(y)) if is_wild(x) && segment_match(x, y) => Some(y),
        (Some(x), Some(y)) if is_wild(y) && segment_match(y, x) => Some(x),
        _ => None,
    }
}

/// Split a path into its directory segments and `(stem, ext)` of the file.
fn split_file(path: &str) -> (Vec<&str>, Option<(&str, Option<&str>)>) {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file) = segments.pop() else {
        return (segments, None);
    };
    if file == REC_GLOB {
        segments.push(file);
        return (segments, None);
    }
    let split = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], Some(&file[idx..])),
        _ => (file, None),
    };
    (segments, Some(split))
}
