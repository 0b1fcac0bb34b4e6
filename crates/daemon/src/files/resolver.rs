//! Root-confined path resolution.
//!
//! All vault operations go through [`PathResolver`]. A client path is first
//! applied onto the root lexically (see [`containment::join_confined`]), then
//! canonicalized so that symlinks are followed and re-checked against the
//! root. Any path that ends up outside the root is rejected with
//! [`VaultError::AccessDenied`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::containment;
use super::error::{VaultError, VaultResult};

/// Maps client-supplied relative paths to absolute paths inside one root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical root directory.
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for an existing root directory.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("vault root is not a directory: {}", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Create the root directory if it is missing, then build a resolver.
    pub fn create<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Self::new(root)
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path to an absolute path inside the root.
    ///
    /// `None` and the empty string resolve to the root. A path that does not
    /// exist is returned in lexical form so the caller can report it as not
    /// found. Its deepest existing ancestor must still lie inside the root.
    pub fn resolve(&self, input: Option<&str>) -> VaultResult<PathBuf> {
        let input = input.unwrap_or("");
        let lexical = self.join(input)?;

        match fs::canonicalize(&lexical) {
            Ok(canonical) => self.confine(canonical, input),
            Err(e) if is_missing(&e) => {
                self.verify_existing_ancestor(&lexical, input)?;
                Ok(lexical)
            }
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    /// Resolve a directory path for writing, creating it if absent.
    ///
    /// Directories are only created after the deepest existing ancestor has
    /// been verified to lie inside the root. The created directory is
    /// verified again afterwards.
    pub fn resolve_for_creation(&self, input: Option<&str>) -> VaultResult<PathBuf> {
        let input = input.unwrap_or("");
        let lexical = self.join(input)?;
        self.verify_existing_ancestor(&lexical, input)?;

        fs::create_dir_all(&lexical).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
                VaultError::NotADirectory(input.to_string())
            }
            _ => VaultError::Io(e),
        })?;

        let canonical = self.confine(fs::canonicalize(&lexical)?, input)?;
        if !canonical.is_dir() {
            return Err(VaultError::NotADirectory(input.to_string()));
        }
        Ok(canonical)
    }

    /// Whether an existing path (following symlinks) stays inside the root.
    pub fn contains_target(&self, path: &Path) -> bool {
        fs::canonicalize(path)
            .map(|canonical| containment::is_within(&self.root, &canonical))
            .unwrap_or(false)
    }

    /// Root-relative, `/`-separated form of a path inside the root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        containment::to_relative_string(&self.root, path)
    }

    fn join(&self, input: &str) -> VaultResult<PathBuf> {
        if input.contains('\0') {
            return Err(VaultError::InvalidParameter(
                "path contains a NUL byte".to_string(),
            ));
        }
        containment::join_confined(&self.root, input).ok_or_else(|| self.deny(input))
    }

    fn confine(&self, canonical: PathBuf, input: &str) -> VaultResult<PathBuf> {
        if containment::is_within(&self.root, &canonical) {
            Ok(canonical)
        } else {
            Err(self.deny(input))
        }
    }

    fn verify_existing_ancestor(&self, lexical: &Path, input: &str) -> VaultResult<()> {
        for ancestor in lexical.ancestors() {
            match fs::canonicalize(ancestor) {
                Ok(canonical) => {
                    self.confine(canonical, input)?;
                    return Ok(());
                }
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(VaultError::Io(e)),
            }
        }
        Err(self.deny(input))
    }

    fn deny(&self, input: &str) -> VaultError {
        warn!(path = %input, "Rejected path outside vault root");
        VaultError::AccessDenied(input.to_string())
    }
}

/// Whether an I/O error means "nothing there" rather than a real failure.
pub(crate) fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
