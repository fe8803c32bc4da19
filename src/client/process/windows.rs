//! Windows process handler.
//!
//! Process ids come from a PowerShell WMI query piped through
//! `ConvertTo-Json`; kills go through `taskkill`. The helper executable is
//! located via `%ALLUSERSPROFILE%/Riot Games/RiotClientInstalls.json`.
//! Command construction and output parsing are plain functions so they
//! are testable on any OS.

#![cfg_attr(not(windows), allow(dead_code))]

use std::path::{Path, PathBuf};

use serde_json::Value;
#[cfg(windows)]
use tracing::{debug, info, warn};

use super::{Game, ProcessError};

pub const HELPER_IMAGE: &str = "RiotClientServices.exe";
const INSTALLS_DIR: &str = "Riot Games";
const INSTALLS_FILE: &str = "RiotClientInstalls.json";
const INSTALL_KEYS: [&str; 2] = ["rc_live", "rc_default"];
const AUTH_TOKEN_FLAG: &str = "--remoting-auth-token";

#[must_use]
pub fn image_name(game: Game) -> &'static str {
    match game {
        Game::Valorant => "VALORANT-Win64-Shipping.exe",
        Game::LeagueOfLegends => "LeagueClient.exe",
        Game::LegendsOfRuneterra => "LOR.exe",
        Game::RiotClient => "Riot Client.exe",
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// `powershell.exe -Command (Get-WmiObject -Query "...") | ConvertTo-Json`.
#[must_use]
pub fn wmi_query_command(image: &str, fields: &[&str]) -> (String, Vec<String>) {
    let query = format!("SELECT {} FROM Win32_Process WHERE Name='{image}'", fields.join(","));
    (
        "powershell.exe".into(),
        vec!["-Command".into(), format!("(Get-WmiObject -Query \"{query}\") | ConvertTo-Json")],
    )
}

#[must_use]
pub fn taskkill_command(pid: u32) -> (String, Vec<String>) {
    ("taskkill".into(), vec!["/F".into(), "/PID".into(), pid.to_string()])
}

#[must_use]
pub fn helper_args(port: u16, secret: &str) -> Vec<String> {
    vec!["--headless".into(), format!("{AUTH_TOKEN_FLAG}={secret}"), format!("--app-port={port}")]
}

#[must_use]
pub fn ui_args(port: u16, helper_pid: u32, secret: &str) -> Vec<String> {
    vec![format!("--app-port={port}"), format!("--app-pid={helper_pid}"), format!("{AUTH_TOKEN_FLAG}={secret}")]
}

/// The UI executable shipped next to the helper.
#[must_use]
pub fn ui_executable(helper: &Path) -> PathBuf {
    helper.parent().unwrap_or_else(|| Path::new("")).join("RiotClientElectron").join("Riot Client.exe")
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    pub pid: u32,
    pub command_line: Option<String>,
}

/// Parse `ConvertTo-Json` output: a single object, an array, or nothing.
#[must_use]
pub fn parse_process_rows(output: &str) -> Vec<ProcessRow> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let rows = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        Ok(obj @ Value::Object(_)) => vec![obj],
        _ => return Vec::new(),
    };
    rows.iter()
        .filter_map(|row| {
            let pid = u32::try_from(row.get("ProcessId")?.as_u64()?).ok()?;
            let command_line = row.get("CommandLine").and_then(Value::as_str).map(str::to_owned);
            Some(ProcessRow { pid, command_line })
        })
        .collect()
}

/// The UI process is the one launched with an auth token flag.
#[must_use]
pub fn select_ui_process(rows: &[ProcessRow]) -> Option<u32> {
    rows.iter()
        .find(|row| row.command_line.as_deref().is_some_and(|c| c.contains(AUTH_TOKEN_FLAG)))
        .map(|row| row.pid)
}

/// Pick the helper path out of the installs manifest.
///
/// # Errors
///
/// Returns `HelperNotFound` when the manifest is not a JSON object or
/// carries neither install key.
pub fn helper_path_from_installs(manifest: &str) -> Result<PathBuf, ProcessError> {
    let value: Value = serde_json::from_str(manifest)
        .map_err(|e| ProcessError::HelperNotFound(format!("{INSTALLS_FILE} is not JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ProcessError::HelperNotFound(format!("{INSTALLS_FILE} is not an object")))?;
    INSTALL_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).filter(|p| !p.is_empty()))
        .map(PathBuf::from)
        .ok_or_else(|| ProcessError::HelperNotFound(format!("{INSTALLS_FILE} has no install entry")))
}

/// Locate the helper executable under `all_users_profile`.
///
/// # Errors
///
/// Returns `HelperNotFound` when the manifest is missing, unusable, or
/// names a file that does not exist.
pub fn locate_helper(all_users_profile: &Path) -> Result<PathBuf, ProcessError> {
    let manifest_path = all_users_profile.join(INSTALLS_DIR).join(INSTALLS_FILE);
    let manifest = std::fs::read_to_string(&manifest_path)
        .map_err(|e| ProcessError::HelperNotFound(format!("{}: {e}", manifest_path.display())))?;
    let helper = helper_path_from_installs(&manifest)?;
    if !helper.is_file() {
        return Err(ProcessError::HelperNotFound(helper.display().to_string()));
    }
    Ok(helper)
}

// =============================================================================
// HANDLER
// =============================================================================

#[cfg(windows)]
pub struct WindowsProcessHandler {
    helper: PathBuf,
}

#[cfg(windows)]
impl WindowsProcessHandler {
    /// # Errors
    ///
    /// Returns `HelperNotFound` when the helper cannot be located.
    pub fn discover() -> Result<Self, ProcessError> {
        let profile = std::env::var_os("ALLUSERSPROFILE")
            .ok_or_else(|| ProcessError::HelperNotFound("ALLUSERSPROFILE is not set".into()))?;
        let helper = locate_helper(Path::new(&profile))?;
        info!(path = %helper.display(), "process: helper located");
        Ok(Self { helper })
    }

    async fn query(&self, image: &str, fields: &[&str]) -> Result<Vec<ProcessRow>, ProcessError> {
        let (program, args) = wmi_query_command(image, fields);
        let output = tokio::process::Command::new(program).args(args).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(%image, stderr = %stderr.trim(), "process: query reported errors, assuming not running");
            return Ok(Vec::new());
        }
        Ok(parse_process_rows(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn first_pid(&self, image: &str) -> Option<u32> {
        match self.query(image, &["ProcessId"]).await {
            Ok(rows) => rows.first().map(|r| r.pid),
            Err(e) => {
                warn!(%image, error = %e, "process: query failed");
                None
            }
        }
    }
}

#[cfg(windows)]
#[async_trait::async_trait]
impl super::ProcessHandler for WindowsProcessHandler {
    async fn start_helper(&self, port: u16, secret: &str) -> Result<(), ProcessError> {
        info!(port, "process: starting helper");
        let mut child = tokio::process::Command::new(&self.helper).args(helper_args(port, secret)).spawn()?;
        tokio::spawn(async move {
            let status = child.wait().await;
            debug!(?status, "process: helper exited");
        });
        Ok(())
    }

    async fn helper_process_id(&self) -> Option<u32> {
        self.first_pid(HELPER_IMAGE).await
    }

    async fn game_process_id(&self, game: Game) -> Option<u32> {
        if game == Game::RiotClient {
            return match self.query(image_name(game), &["ProcessId", "CommandLine"]).await {
                Ok(rows) => select_ui_process(&rows),
                Err(e) => {
                    warn!(error = %e, "process: ui query failed");
                    None
                }
            };
        }
        self.first_pid(image_name(game)).await
    }

    async fn kill_process(&self, pid: u32) -> bool {
        let (program, args) = taskkill_command(pid);
        match tokio::process::Command::new(program).args(args).output().await {
            Ok(output) if output.status.success() && output.stderr.iter().all(u8::is_ascii_whitespace) => {
                info!(pid, "process: killed");
                true
            }
            Ok(output) => {
                debug!(pid, stderr = %String::from_utf8_lossy(&output.stderr).trim(), "process: kill failed");
                false
            }
            Err(e) => {
                warn!(pid, error = %e, "process: kill command failed");
                false
            }
        }
    }

    async fn launch_ui(&self, port: u16, secret: &str) -> Result<(), ProcessError> {
        let ui = ui_executable(&self.helper);
        if !ui.is_file() {
            return Err(ProcessError::Lookup(format!("ui executable missing: {}", ui.display())));
        }
        let helper_pid = self
            .helper_process_id()
            .await
            .ok_or_else(|| ProcessError::Lookup("helper process not running".into()))?;
        info!(port, helper_pid, "process: launching ui");
        let mut child = tokio::process::Command::new(ui).args(ui_args(port, helper_pid, secret)).spawn()?;
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "windows_test.rs"]
mod tests;
