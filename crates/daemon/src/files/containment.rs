//! Path containment primitives.
//!
//! These helpers are pure: they never touch the filesystem. The resolver
//! combines them with `fs::canonicalize` to enforce the vault boundary.
//!
//! Containment is always decided component-wise. A plain string prefix test
//! would accept `/srv/files2` as being inside `/srv/files`.

use std::path::{Component, Path, PathBuf};

/// One component of a client-supplied path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A regular name.
    Name(&'a str),
    /// A `..` component.
    Parent,
}

/// A client-supplied path split into components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPath<'a> {
    /// Whether the input was absolute (leading separator or drive prefix).
    pub absolute: bool,
    /// Components in order, with `.` and empty components removed.
    pub segments: Vec<Segment<'a>>,
}

impl SplitPath<'_> {
    /// Whether the path refers to the root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Split a client-supplied path on both `/` and `\`.
///
/// Input made only of separators is treated as empty. Any other input with a
/// leading separator, or whose first component is a drive prefix such as
/// `C:`, is reported as absolute.
pub fn split_relative(input: &str) -> SplitPath<'_> {
    let is_separator = |c: char| c == '/' || c == '\\';

    let segments: Vec<Segment<'_>> = input
        .split(is_separator)
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| if s == ".." { Segment::Parent } else { Segment::Name(s) })
        .collect();

    let leading_separator = input.starts_with(is_separator);
    let drive_prefix = matches!(segments.first(), Some(Segment::Name(first)) if is_drive_prefix(first));

    SplitPath {
        absolute: !segments.is_empty() && (leading_separator || drive_prefix),
        segments,
    }
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Apply a client path onto `root`, resolving `.` and `..` lexically.
///
/// Returns `None` when the path is absolute or when a `..` would climb above
/// `root`.
pub fn join_confined(root: &Path, input: &str) -> Option<PathBuf> {
    let split = split_relative(input);
    if split.absolute {
        return None;
    }

    let mut stack: Vec<&str> = Vec::with_capacity(split.segments.len());
    for segment in &split.segments {
        match segment {
            Segment::Name(name) => stack.push(name),
            Segment::Parent => {
                stack.pop()?;
            }
        }
    }

    let mut joined = root.to_path_buf();
    joined.extend(stack);
    Some(joined)
}

/// Whether `candidate` equals `root` or lies beneath it.
///
/// Both paths must already be normalized (canonical or lexically joined).
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Express `path` relative to `root` with `/` separators.
///
/// Returns `None` if `path` is not within `root`. The root itself maps to
/// the empty string.
pub fn to_relative_string(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
