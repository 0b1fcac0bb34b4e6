//! Directory browsing and download lookup.
//!
//! Listings are built fresh from the filesystem on every call. Entries whose
//! symlink target leaves the vault root are left out, and so are special
//! files (sockets, FIFOs, devices) and in-progress uploads. Any other I/O
//! failure while reading a directory fails the whole call.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use protocol::messages::FileEntry;
use tracing::debug;

use super::error::{VaultError, VaultResult};
use super::resolver::{is_missing, PathResolver};
use super::transfer::is_staging_name;

/// A page request, validated against the configured maximum page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    /// Entries per page.
    pub page_size: usize,
}

impl Pagination {
    /// Validate a page request.
    pub fn new(page: usize, page_size: usize, max_page_size: usize) -> VaultResult<Self> {
        if page == 0 {
            return Err(VaultError::InvalidParameter(
                "page must be at least 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(VaultError::InvalidParameter(format!(
                "pageSize must be between 1 and {}",
                max_page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Number of entries skipped before this page.
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Cut this page out of a sorted sequence.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.page_size)
            .collect()
    }
}

/// A regular file located for download.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Client-facing metadata.
    pub entry: FileEntry,
    /// Canonical location on disk. Never serialized.
    pub absolute_path: PathBuf,
}

/// Lists directories and looks up files inside the vault root.
#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    resolver: PathResolver,
}

impl DirectoryBrowser {
    /// Create a browser over the resolver's root.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// List the immediate children of a directory, one page at a time.
    ///
    /// Directories come first, then files, each sorted by name ignoring
    /// case. Pages past the end are empty.
    pub fn list_directory(
        &self,
        path: Option<&str>,
        pagination: Pagination,
    ) -> VaultResult<Vec<FileEntry>> {
        let input = path.unwrap_or("");
        let dir = self.resolver.resolve(path)?;

        let metadata = fs::metadata(&dir).map_err(|e| not_found_or_io(e, input))?;
        if !metadata.is_dir() {
            return Err(VaultError::NotADirectory(input.to_string()));
        }

        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&dir)? {
            let dir_entry = dir_entry?;
            if let Some(entry) = describe(&self.resolver, &dir_entry.path())? {
                entries.push(entry);
            }
        }

        entries.sort_by(compare_by_name);
        debug!(path = %input, total = entries.len(), page = pagination.page, "Listed directory");
        Ok(pagination.apply(entries))
    }

    /// Look up a regular file for download.
    ///
    /// Directories and special files are reported as not a file, and
    /// in-progress uploads as not found.
    pub fn get_file(&self, path: &str) -> VaultResult<ResolvedFile> {
        let resolved = self.resolver.resolve(Some(path))?;
        if resolved
            .file_name()
            .is_some_and(|n| is_staging_name(&n.to_string_lossy()))
        {
            return Err(VaultError::NotFound(path.to_string()));
        }

        let metadata = fs::metadata(&resolved).map_err(|e| not_found_or_io(e, path))?;
        if !metadata.is_file() {
            return Err(VaultError::NotAFile(path.to_string()));
        }

        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| VaultError::NotAFile(path.to_string()))?;
        let relative = self
            .resolver
            .relative(&resolved)
            .ok_or_else(|| VaultError::AccessDenied(path.to_string()))?;

        Ok(ResolvedFile {
            entry: FileEntry::file(name, relative, metadata.len()),
            absolute_path: resolved,
        })
    }
}

/// Build the client-facing entry for a path inside the root.
///
/// Symlinks are described by their target. Returns `None` for symlinks that
/// leave the root or cannot be followed, entries removed since the directory
/// was read, in-progress uploads, and anything that is neither a directory
/// nor a regular file.
pub(crate) fn describe(resolver: &PathResolver, path: &Path) -> VaultResult<Option<FileEntry>> {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    if is_staging_name(&name) {
        return Ok(None);
    }

    let link_metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(VaultError::Io(e)),
    };
    let metadata = if link_metadata.file_type().is_symlink() {
        if !resolver.contains_target(path) {
            debug!(path = ?path, "Omitting symlink that leaves the vault root");
            return Ok(None);
        }
        match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = ?path, error = %e, "Omitting unusable symlink");
                return Ok(None);
            }
        }
    } else {
        link_metadata
    };

    let Some(relative) = resolver.relative(path) else {
        return Ok(None);
    };

    Ok(if metadata.is_dir() {
        Some(FileEntry::directory(name, relative))
    } else if metadata.is_file() {
        Some(FileEntry::file(name, relative, metadata.len()))
    } else {
        None
    })
}

/// Listing order: directories first, then name ignoring case, then raw name.
pub(crate) fn compare_by_name(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

pub(crate) fn not_found_or_io(e: std::io::Error, input: &str) -> VaultError {
    if is_missing(&e) {
        VaultError::NotFound(input.to_string())
    } else {
        VaultError::Io(e)
    }
}
