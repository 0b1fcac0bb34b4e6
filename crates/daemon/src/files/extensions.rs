//! Upload extension allow-list.

use std::collections::BTreeSet;
use std::path::Path;

use protocol::messages::AllowedTypes;

/// Entry that accepts every extension.
pub const WILDCARD: &str = "*";

/// The set of file extensions accepted for upload.
///
/// Extensions are stored lowercase with their leading dot. An empty
/// restricted set accepts nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// Only the listed extensions are accepted.
    Restricted(BTreeSet<String>),
    /// Every extension is accepted, including files without one.
    Any,
}

impl AllowList {
    /// Build an allow-list from configured entries.
    ///
    /// A `"*"` entry anywhere in the list yields [`AllowList::Any`].
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry == WILDCARD {
                return Self::Any;
            }
            if !entry.is_empty() {
                set.insert(entry.to_lowercase());
            }
        }
        Self::Restricted(set)
    }

    /// Whether a file name passes the allow-list.
    pub fn permits(&self, file_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Restricted(set) => extension_of(file_name)
                .map(|ext| set.contains(&ext))
                .unwrap_or(false),
        }
    }

    /// Client-facing description of the allow-list.
    pub fn to_allowed_types(&self) -> AllowedTypes {
        match self {
            Self::Any => AllowedTypes {
                allowed_extensions: Vec::new(),
                allow_all: true,
            },
            Self::Restricted(set) => AllowedTypes {
                allowed_extensions: set.iter().cloned().collect(),
                allow_all: false,
            },
        }
    }
}

/// Lowercase extension of a file name, including the dot.
///
/// Names without a dot, and dot-files such as `.bashrc`, have no extension.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}
