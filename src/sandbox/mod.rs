//! Typed domain façades over a [`Connection`].
//!
//! Each façade is a cheap handle wrapping a connection clone. Requests go
//! through [`Connection::request_typed`]; notifications are decoded into the
//! façade's payload types before reaching the handler.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `fs` | Files, directories, watch events |
//! | `shell` | Interactive shells and their output |
//! | `ports` | Listening ports |
//! | `tasks` | Configured tasks |
//! | `setup` | Sandbox setup progress |
//! | `system` | Metrics and hibernation notices |
//!
//! # Example
//!
//! ```ignore
//! let shell = client.shell();
//! let info = shell.create(CreateShellOptions::new().with_command("bash")).await?;
//!
//! let _out = shell.on_output_for(&info.id, |output| print!("{}", output.data));
//! shell.input(&info.id, "ls\n").await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::event::Subscription;

// ============================================================================
// Submodules
// ============================================================================

mod fs;
mod ports;
mod setup;
mod shell;
mod system;
mod tasks;

// ============================================================================
// Re-exports
// ============================================================================

pub use fs::{DirEntry, FileStat, FileType, Fs, WatchEvent, WatchEventKind};
pub use ports::{PortInfo, Ports, PortsChanged};
pub use setup::{Setup, SetupProgress, SetupState, SetupStatus, SetupStep};
pub use shell::{CreateShellOptions, Shell, ShellExit, ShellInfo, ShellOutput};
pub use system::{HibernateNotice, System, SystemMetrics};
pub use tasks::{TaskInfo, TaskState, TaskUpdate, Tasks};

// ============================================================================
// Helpers
// ============================================================================

/// Subscribes to `method`, decoding params into `T`. Missing params decode
/// as an empty object; payloads that do not decode are logged and skipped.
fn subscribe_typed<T, F>(connection: &Connection, method: &'static str, handler: F) -> Subscription
where
    T: DeserializeOwned,
    F: Fn(&T) + Send + Sync + 'static,
{
    connection.on_notification(method, move |params| {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        match serde_json::from_value::<T>(params) {
            Ok(payload) => handler(&payload),
            Err(e) => warn!(method, error = %e, "Dropping malformed notification"),
        }
    })
}

/// Rejects empty path-like arguments.
fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_argument(format!("{name} must not be empty")));
    }
    Ok(())
}
