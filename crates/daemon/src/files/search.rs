//! Recursive name search with optional size bounds.

use std::cmp::Ordering;

use protocol::messages::FileEntry;
use tracing::debug;
use walkdir::WalkDir;

use super::browser::{describe, Pagination};
use super::error::{VaultError, VaultResult};
use super::resolver::{is_missing, PathResolver};

/// Search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive substring of the entry name. Empty matches all.
    pub query: String,
    /// Minimum file size in bytes, inclusive.
    pub min_size: Option<u64>,
    /// Maximum file size in bytes, inclusive.
    pub max_size: Option<u64>,
    /// Page to return. `None` returns every match.
    pub pagination: Option<Pagination>,
}

impl SearchQuery {
    /// Search by name only.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Restrict results to files within a size range.
    pub fn with_size_range(mut self, min_size: Option<u64>, max_size: Option<u64>) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Return a single page of results.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    fn has_size_bounds(&self) -> bool {
        self.min_size.is_some() || self.max_size.is_some()
    }

    fn size_matches(&self, size: u64) -> bool {
        self.min_size.map_or(true, |min| size >= min) && self.max_size.map_or(true, |max| size <= max)
    }

    fn validate(&self) -> VaultResult<()> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(VaultError::InvalidParameter(format!(
                    "minSize ({}) is greater than maxSize ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// Walks the vault root looking for matching entries.
#[derive(Debug, Clone)]
pub struct FileSearch {
    resolver: PathResolver,
}

impl FileSearch {
    /// Create a search over the resolver's root.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Find every entry below the root matching the query.
    ///
    /// Directory symlinks are reported but never descended into. With a size
    /// bound in place, directories are excluded. Entries removed during the
    /// walk are skipped; any other walk failure fails the search.
    pub fn search(&self, query: &SearchQuery) -> VaultResult<Vec<FileEntry>> {
        query.validate()?;
        let needle = query.query.to_lowercase();
        let sized = query.has_size_bounds();

        let mut results = Vec::new();
        for walk_entry in WalkDir::new(self.resolver.root())
            .follow_links(false)
            .min_depth(1)
        {
            let walk_entry = match walk_entry {
                Ok(e) => e,
                Err(e) if e.io_error().is_some_and(is_missing) => {
                    debug!(error = %e, "Entry vanished during search");
                    continue;
                }
                Err(e) => return Err(VaultError::Io(e.into())),
            };

            let name = walk_entry.file_name().to_string_lossy();
            if !name.to_lowercase().contains(&needle) {
                continue;
            }

            let Some(entry) = describe(&self.resolver, walk_entry.path())? else {
                continue;
            };
            if sized {
                match entry.size {
                    Some(size) if query.size_matches(size) => {}
                    _ => continue,
                }
            }
            results.push(entry);
        }

        results.sort_by(compare_by_path);
        debug!(
            query = %query.query,
            min_size = ?query.min_size,
            max_size = ?query.max_size,
            matches = results.len(),
            "Search complete"
        );

        Ok(match query.pagination {
            Some(pagination) => pagination.apply(results),
            None => results,
        })
    }
}

/// Search order: directories first, then relative path ignoring case.
fn compare_by_path(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| {
            a.relative_path
                .to_lowercase()
                .cmp(&b.relative_path.to_lowercase())
        })
        .then_with(|| a.relative_path.cmp(&b.relative_path))
}
