//! Interactive shell façade.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::identifiers::ShellId;

use super::subscribe_typed;

// ============================================================================
// Constants
// ============================================================================

const CREATE: &str = "shell/create";
const INPUT: &str = "shell/in";
const RESIZE: &str = "shell/resize";
const TERMINATE: &str = "shell/terminate";
const LIST: &str = "shell/list";
const OUTPUT: &str = "shell/out";
const EXIT: &str = "shell/exit";

/// Default terminal width.
const DEFAULT_COLS: u16 = 80;

/// Default terminal height.
const DEFAULT_ROWS: u16 = 24;

// ============================================================================
// Types
// ============================================================================

/// Options for [`Shell::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShellOptions {
    /// Program to run; the agent's default shell when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Program arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Extra environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Terminal width.
    pub cols: u16,
    /// Terminal height.
    pub rows: u16,
}

impl Default for CreateShellOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateShellOptions {
    /// Default shell at 80x24.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    /// Sets the program.
    #[inline]
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Appends an argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[inline]
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the terminal size.
    #[inline]
    #[must_use]
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// A shell known to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellInfo {
    /// Shell id.
    pub id: ShellId,
    /// Program running in the shell.
    #[serde(default)]
    pub command: String,
    /// Process id, if running.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Terminal width.
    #[serde(default)]
    pub cols: u16,
    /// Terminal height.
    #[serde(default)]
    pub rows: u16,
}

/// Payload of `shell/out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellOutput {
    /// Producing shell.
    pub shell_id: ShellId,
    /// Output chunk.
    pub data: String,
}

/// Payload of `shell/exit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellExit {
    /// Exited shell.
    pub shell_id: ShellId,
    /// Exit code, if the process exited normally.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    #[serde(default)]
    pub signal: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShellParams<'a> {
    shell_id: &'a ShellId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputParams<'a> {
    shell_id: &'a ShellId,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResizeParams<'a> {
    shell_id: &'a ShellId,
    cols: u16,
    rows: u16,
}

#[derive(Deserialize)]
struct ShellsResult {
    shells: Vec<ShellInfo>,
}

// ============================================================================
// Shell
// ============================================================================

/// Interactive shells inside the sandbox.
#[derive(Debug, Clone)]
pub struct Shell {
    connection: Connection,
}

impl Shell {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Starts a shell.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero terminal size; otherwise any
    /// request error.
    pub async fn create(&self, options: CreateShellOptions) -> Result<ShellInfo> {
        check_size(options.cols, options.rows)?;
        debug!(command = ?options.command, cols = options.cols, rows = options.rows, "Creating shell");

        let info: ShellInfo = self.connection.request_typed(CREATE, &options).await?;
        debug!(shell_id = %info.id, pid = ?info.pid, "Shell created");
        Ok(info)
    }

    /// Writes `data` to the shell's input.
    pub async fn input(&self, shell_id: &ShellId, data: &str) -> Result<()> {
        let params = InputParams { shell_id, data };
        self.connection.request(INPUT, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Resizes the shell's terminal.
    pub async fn resize(&self, shell_id: &ShellId, cols: u16, rows: u16) -> Result<()> {
        check_size(cols, rows)?;
        debug!(shell_id = %shell_id, cols, rows, "Resizing shell");
        let params = ResizeParams { shell_id, cols, rows };
        self.connection.request(RESIZE, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Terminates the shell.
    pub async fn terminate(&self, shell_id: &ShellId) -> Result<()> {
        debug!(shell_id = %shell_id, "Terminating shell");
        let params = ShellParams { shell_id };
        self.connection.request(TERMINATE, serde_json::to_value(params)?).await?;
        Ok(())
    }

    /// Lists running shells.
    pub async fn list(&self) -> Result<Vec<ShellInfo>> {
        let result: ShellsResult = self.connection.request_typed(LIST, &serde_json::Map::new()).await?;
        Ok(result.shells)
    }

    /// Subscribes to output from every shell.
    pub fn on_output<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ShellOutput) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, OUTPUT, handler)
    }

    /// Subscribes to output from one shell.
    pub fn on_output_for<F>(&self, shell_id: &ShellId, handler: F) -> Subscription
    where
        F: Fn(&ShellOutput) + Send + Sync + 'static,
    {
        let shell_id = shell_id.clone();
        self.on_output(move |output| {
            if output.shell_id == shell_id {
                handler(output);
            }
        })
    }

    /// Subscribes to shell exits.
    pub fn on_exit<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ShellExit) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, EXIT, handler)
    }
}

fn check_size(cols: u16, rows: u16) -> Result<()> {
    if cols == 0 || rows == 0 {
        return Err(Error::invalid_argument(format!(
            "terminal size must be non-zero, got {cols}x{rows}"
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
