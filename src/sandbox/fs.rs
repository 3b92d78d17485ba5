//! Filesystem façade.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::event::Subscription;

use super::{require_non_empty, subscribe_typed};

// ============================================================================
// Constants
// ============================================================================

const READ_FILE: &str = "fs/readFile";
const WRITE_FILE: &str = "fs/writeFile";
const READ_DIR: &str = "fs/readDir";
const STAT: &str = "fs/stat";
const MKDIR: &str = "fs/mkdir";
const REMOVE: &str = "fs/remove";
const RENAME: &str = "fs/rename";
const WATCH_EVENT: &str = "fs/watchEvent";

// ============================================================================
// Types
// ============================================================================

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Anything else.
    #[serde(other)]
    Other,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name, without the parent path.
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub file_type: FileType,
}

/// File metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileStat {
    /// Whether the path exists.
    pub exists: bool,
    /// Entry kind, when it exists.
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    /// Size in bytes.
    pub size: u64,
    /// Last modification, milliseconds since the Unix epoch.
    pub modified_ms: Option<u64>,
}

/// Kind of change reported by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    /// Path created.
    Create,
    /// Contents or metadata changed.
    Modify,
    /// Path removed.
    Remove,
    /// Path renamed.
    Rename,
    /// Anything else.
    #[serde(other)]
    Other,
}

/// Payload of `fs/watchEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    /// Affected path.
    pub path: String,
    /// Change kind.
    #[serde(rename = "event")]
    pub kind: WatchEventKind,
    /// Previous path for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

#[derive(Serialize)]
struct PathParams<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct RecursiveParams<'a> {
    path: &'a str,
    recursive: bool,
}

#[derive(Serialize)]
struct WriteParams<'a> {
    path: &'a str,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenameParams<'a> {
    old_path: &'a str,
    new_path: &'a str,
}

#[derive(Deserialize)]
struct ContentResult {
    content: String,
}

#[derive(Deserialize)]
struct EntriesResult {
    entries: Vec<DirEntry>,
}

// ============================================================================
// Fs
// ============================================================================

/// Filesystem operations inside the sandbox.
///
/// File contents travel base64-encoded.
#[derive(Debug, Clone)]
pub struct Fs {
    connection: Connection,
}

impl Fs {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Reads a file's bytes.
    ///
    /// # Errors
    ///
    /// Request errors, or [`Error::UnexpectedResponse`] if the content is
    /// not valid base64.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        require_non_empty("path", path)?;
        debug!(path, "Reading file");

        let result: ContentResult = self.connection.request_typed(READ_FILE, &PathParams { path }).await?;
        let bytes = Base64Standard
            .decode(result.content.as_bytes())
            .map_err(|e| Error::unexpected_response(READ_FILE, format!("invalid base64 content: {e}")))?;

        debug!(path, len = bytes.len(), "Read file");
        Ok(bytes)
    }

    /// Reads a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file), plus
    /// [`Error::UnexpectedResponse`] for non-UTF-8 content.
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|e| Error::unexpected_response(READ_FILE, e.to_string()))
    }

    /// Writes `contents` to a file, replacing it.
    pub async fn write_file(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        require_non_empty("path", path)?;
        let contents = contents.as_ref();
        debug!(path, len = contents.len(), "Writing file");

        let params = WriteParams {
            path,
            content: Base64Standard.encode(contents),
        };
        self.connection.request(WRITE_FILE, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Lists a directory.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        require_non_empty("path", path)?;
        let result: EntriesResult = self.connection.request_typed(READ_DIR, &PathParams { path }).await?;
        debug!(path, count = result.entries.len(), "Read directory");
        Ok(result.entries)
    }

    /// Returns metadata for a path. Missing paths report `exists == false`.
    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        require_non_empty("path", path)?;
        self.connection.request_typed(STAT, &PathParams { path }).await
    }

    /// Creates a directory, with parents when `recursive`.
    pub async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        require_non_empty("path", path)?;
        debug!(path, recursive, "Creating directory");
        let params = RecursiveParams { path, recursive };
        self.connection.request(MKDIR, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Removes a file or directory, with contents when `recursive`.
    pub async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        require_non_empty("path", path)?;
        debug!(path, recursive, "Removing path");
        let params = RecursiveParams { path, recursive };
        self.connection.request(REMOVE, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Renames `from` to `to`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        require_non_empty("from", from)?;
        require_non_empty("to", to)?;
        debug!(from, to, "Renaming path");
        let params = RenameParams {
            old_path: from,
            new_path: to,
        };
        self.connection.request(RENAME, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Subscribes to filesystem change notifications.
    pub fn on_watch_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, WATCH_EVENT, handler)
    }
}

// ============================================================================
// Tests
// ============================================================================
