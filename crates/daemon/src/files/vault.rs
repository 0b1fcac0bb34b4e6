//! The vault facade: one entry point for every filesystem operation.

use std::io::Read;
use std::path::Path;

use protocol::messages::{AllowedTypes, FileEntry};
use tracing::info;

use super::browser::{DirectoryBrowser, Pagination, ResolvedFile};
use super::error::VaultResult;
use super::extensions::AllowList;
use super::resolver::PathResolver;
use super::search::{FileSearch, SearchQuery};
use super::transfer::{FileTransfer, UploadTarget};
use crate::config::VaultConfig;

/// Confined access to one directory tree.
///
/// Holds only immutable state after construction and is shared between
/// request handlers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FileVault {
    resolver: PathResolver,
    browser: DirectoryBrowser,
    search: FileSearch,
    transfer: FileTransfer,
    default_page_size: usize,
    max_page_size: usize,
    max_request_size: u64,
}

impl FileVault {
    /// Open the vault described by `config`, creating the root if absent.
    pub fn new(config: &VaultConfig) -> std::io::Result<Self> {
        let resolver = PathResolver::create(&config.root)?;
        let allow_list = AllowList::from_entries(&config.allowed_extensions);

        info!(
            root = ?resolver.root(),
            allow_list = ?allow_list,
            max_upload_size = config.max_upload_size,
            "Opened file vault"
        );

        Ok(Self {
            browser: DirectoryBrowser::new(resolver.clone()),
            search: FileSearch::new(resolver.clone()),
            transfer: FileTransfer::new(resolver.clone(), allow_list, config.max_upload_size),
            resolver,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_request_size: config.max_request_size,
        })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Largest accepted upload, in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.transfer.max_upload_size()
    }

    /// Maximum size of a whole upload request body in bytes.
    pub fn max_request_size(&self) -> u64 {
        self.max_request_size
    }

    /// Build a page request, filling in defaults for missing values.
    pub fn pagination(
        &self,
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> VaultResult<Pagination> {
        Pagination::new(
            page.unwrap_or(1),
            page_size.unwrap_or(self.default_page_size),
            self.max_page_size,
        )
    }

    /// List one page of a directory.
    pub fn list(&self, path: Option<&str>, pagination: Pagination) -> VaultResult<Vec<FileEntry>> {
        self.browser.list_directory(path, pagination)
    }

    /// Locate a regular file for download.
    pub fn get_file(&self, path: &str) -> VaultResult<ResolvedFile> {
        self.browser.get_file(path)
    }

    /// Search the whole tree.
    pub fn search(&self, query: &SearchQuery) -> VaultResult<Vec<FileEntry>> {
        self.search.search(query)
    }

    /// Store one uploaded file.
    pub fn save<R: Read>(
        &self,
        file_name: &str,
        content: R,
        target: Option<&str>,
    ) -> VaultResult<String> {
        self.transfer.save(file_name, content, target)
    }

    /// Resolve an upload directory, creating it if needed.
    pub fn prepare_target(&self, target: Option<&str>) -> VaultResult<UploadTarget> {
        self.transfer.prepare_target(target)
    }

    /// Store one uploaded file in a prepared directory.
    pub fn save_in<R: Read>(
        &self,
        target: &UploadTarget,
        file_name: &str,
        content: R,
    ) -> VaultResult<String> {
        self.transfer.save_in(target, file_name, content)
    }

    /// The upload allow-list as reported to clients.
    pub fn allowed_types(&self) -> AllowedTypes {
        self.transfer.allow_list().to_allowed_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::error::{ErrorKind, VaultError};
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_vault() -> (TempDir, FileVault) {
        let temp_dir = TempDir::new().unwrap();
        let config = VaultConfig {
            root: temp_dir.path().join("files"),
            allowed_extensions: vec![".pdf".to_string(), ".txt".to_string()],
            max_upload_size: 1024,
            max_request_size: 4096,
            default_page_size: 3,
            max_page_size: 10,
        };
        let vault = FileVault::new(&config).unwrap();
        (temp_dir, vault)
    }

    #[test]
    fn test_new_creates_root() {
        let (temp_dir, vault) = create_vault();
        assert!(temp_dir.path().join("files").is_dir());
        assert!(vault.root().is_absolute());
    }

    #[test]
    fn test_pagination_defaults() {
        let (_temp_dir, vault) = create_vault();
        let pagination = vault.pagination(None, None).unwrap();
        assert_eq!(pagination, Pagination { page: 1, page_size: 3 });

        assert!(vault.pagination(Some(2), Some(10)).is_ok());
        assert_eq!(
            vault.pagination(Some(1), Some(11)).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            vault.pagination(Some(0), None).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_list_has_no_side_effects() {
        let (_temp_dir, vault) = create_vault();
        let pagination = vault.pagination(None, None).unwrap();

        let result = vault.list(Some("ghost/dir"), pagination);
        assert!(matches!(result, Err(VaultError::NotFound(_))));
        assert!(!vault.root().join("ghost").exists());
    }

    #[test]
    fn test_save_then_get_round_trip() {
        let (_temp_dir, vault) = create_vault();
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let saved = vault
            .save("data.txt", Cursor::new(content.clone()), Some("in/here"))
            .unwrap();
        let resolved = vault.get_file(&format!("in/here/{}", saved)).unwrap();

        assert_eq!(resolved.entry.relative_path, "in/here/data.txt");
        assert_eq!(resolved.entry.size, Some(1000));
        assert_eq!(fs::read(&resolved.absolute_path).unwrap(), content);
    }

    #[test]
    fn test_uploaded_files_are_listed_and_searchable() {
        let (_temp_dir, vault) = create_vault();
        vault
            .save("Annual_Report.pdf", Cursor::new(b"%PDF".to_vec()), None)
            .unwrap();
        vault
            .save("q1.txt", Cursor::new(b"q1".to_vec()), Some("reports"))
            .unwrap();

        let listing = vault.list(None, vault.pagination(None, None).unwrap()).unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["reports", "Annual_Report.pdf"]);

        let found = vault.search(&SearchQuery::new("report")).unwrap();
        let paths: Vec<&str> = found.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["reports", "Annual_Report.pdf"]);
    }

    #[test]
    fn test_allowed_types() {
        let (_temp_dir, vault) = create_vault();
        let types = vault.allowed_types();
        assert_eq!(types.allowed_extensions, vec![".pdf", ".txt"]);
        assert!(!types.allow_all);
    }

    #[test]
    fn test_save_in_prepared_target() {
        let (_temp_dir, vault) = create_vault();
        let target = vault.prepare_target(Some("batch")).unwrap();
        assert!(vault.root().join("batch").is_dir());
        assert_eq!(vault.max_request_size(), 4096);

        let small = vault.save_in(&target, "a.txt", Cursor::new(b"a".to_vec()));
        let large = vault.save_in(&target, "b.txt", Cursor::new(vec![0u8; 2048]));
        assert_eq!(small.unwrap(), "a.txt");
        assert!(matches!(large, Err(VaultError::FileTooLarge { limit: 1024 })));
        assert!(!vault.root().join("batch/b.txt").exists());
    }
}
