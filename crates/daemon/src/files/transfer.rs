//! Upload handling with atomic, collision-safe writes.
//!
//! Uploaded bytes are streamed into a staging file inside the target
//! directory and then linked into place without ever replacing an existing
//! entry. Staging files carry [`STAGING_PREFIX`] and are never listed,
//! searched, or served. Final names are tried in order:
//! - The original name is tried first
//! - Then `stem_<unix-seconds>.ext`
//! - Then `stem_<unix-seconds>_<n>.ext` with increasing `n`
//!
//! Two concurrent uploads of the same name therefore never overwrite each
//! other.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use protocol::messages::UploadResult;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use super::error::{VaultError, VaultResult};
use super::extensions::{extension_of, AllowList};
use super::resolver::PathResolver;

/// Buffer size used while streaming uploads to disk (64KB).
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum number of candidate names tried before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Name prefix of in-progress uploads.
pub const STAGING_PREFIX: &str = ".filevault-upload-";

/// Longest file name most filesystems accept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Bytes kept free for the `_<unix-seconds>_<n>` collision suffix.
const COLLISION_SUFFIX_LEN: usize = 16;

/// Whether a directory entry is an in-progress upload.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// A resolved upload directory, created if it was missing.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    dir: PathBuf,
}

/// Result of storing one file of a batch.
#[derive(Debug)]
pub struct UploadOutcome {
    /// File name as supplied by the client.
    pub file_name: String,
    /// Stored name, or why the file was rejected.
    pub result: VaultResult<String>,
}

impl UploadOutcome {
    /// Convert to the wire representation.
    pub fn to_upload_result(&self) -> UploadResult {
        match &self.result {
            Ok(saved) => UploadResult {
                file_name: self.file_name.clone(),
                saved_name: Some(saved.clone()),
                error: None,
            },
            Err(e) => UploadResult {
                file_name: self.file_name.clone(),
                saved_name: None,
                error: Some(e.to_error_message()),
            },
        }
    }
}

/// Stores uploaded files inside the vault root.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    resolver: PathResolver,
    allow_list: AllowList,
    max_upload_size: u64,
}

impl FileTransfer {
    /// Create a new upload handler.
    pub fn new(resolver: PathResolver, allow_list: AllowList, max_upload_size: u64) -> Self {
        Self {
            resolver,
            allow_list,
            max_upload_size,
        }
    }

    /// The extension allow-list.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Maximum accepted size of a single file in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Store one file in `target`, creating the directory if needed.
    ///
    /// Returns the name the file was stored under.
    pub fn save<R: Read>(
        &self,
        file_name: &str,
        content: R,
        target: Option<&str>,
    ) -> VaultResult<String> {
        let target = self.prepare_target(target)?;
        self.save_in(&target, file_name, content)
    }

    /// Resolve the upload directory, creating it if needed.
    ///
    /// Done once per request, so a bad target fails the whole batch before
    /// anything is written.
    pub fn prepare_target(&self, target: Option<&str>) -> VaultResult<UploadTarget> {
        let dir = self.resolver.resolve_for_creation(target)?;
        Ok(UploadTarget { dir })
    }

    /// Store one file in an already prepared directory.
    pub fn save_in<R: Read>(
        &self,
        target: &UploadTarget,
        file_name: &str,
        content: R,
    ) -> VaultResult<String> {
        self.store(&target.dir, file_name, content)
    }

    fn store<R: Read>(&self, dir: &Path, file_name: &str, content: R) -> VaultResult<String> {
        let name = sanitize_file_name(file_name)?;

        if !self.allow_list.permits(name) {
            let extension = extension_of(name).unwrap_or_else(|| "(none)".to_string());
            debug!(file = %name, extension = %extension, "Rejected upload with disallowed extension");
            return Err(VaultError::DisallowedExtension(extension));
        }

        let mut temp = Builder::new().prefix(STAGING_PREFIX).tempfile_in(dir)?;
        let written = copy_limited(content, temp.as_file_mut(), self.max_upload_size)
            .inspect_err(|e| debug!(file = %name, error = %e, "Upload aborted"))?;

        let saved = persist_unique(temp, dir, name)?;
        info!(file = %name, saved = %saved, bytes = written, "Stored upload");
        Ok(saved)
    }
}

/// Reduce a client-supplied name to its final path component.
///
/// Fails for names that are empty, `.`, `..`, contain NUL, use the staging
/// prefix, or leave no room for a collision suffix.
pub fn sanitize_file_name(raw: &str) -> VaultResult<&str> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('\0')
        || is_staging_name(name)
        || name.len() > MAX_FILE_NAME_LEN - COLLISION_SUFFIX_LEN
    {
        return Err(VaultError::InvalidFileName(raw.to_string()));
    }
    Ok(name)
}

/// The name tried on a given attempt.
///
/// Attempt 0 is the original name, attempt 1 adds the timestamp, later
/// attempts add a counter after it.
pub fn candidate_name(name: &str, timestamp: u64, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let suffix = if attempt == 1 {
        format!("{}_{}", stem, timestamp)
    } else {
        format!("{}_{}_{}", stem, timestamp, attempt - 1)
    };

    match path.extension() {
        Some(ext) => format!("{}.{}", suffix, ext.to_string_lossy()),
        None => suffix,
    }
}

fn persist_unique(mut temp: NamedTempFile, dir: &Path, name: &str) -> VaultResult<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = candidate_name(name, timestamp, attempt);
        match temp.persist_noclobber(dir.join(&candidate)) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                temp = e.file;
            }
            Err(e) => return Err(VaultError::Io(e.error)),
        }
    }

    Err(VaultError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {} after {} attempts", name, MAX_NAME_ATTEMPTS),
    )))
}

fn copy_limited<R: Read, W: Write>(mut reader: R, writer: &mut W, limit: u64) -> VaultResult<u64> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(VaultError::Io(e)),
        };
        total += n as u64;
        if total > limit {
            return Err(VaultError::FileTooLarge { limit });
        }
        writer.write_all(&buffer[..n])?;
    }

    writer.flush()?;
    Ok(total)
}
