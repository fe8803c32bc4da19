//! Process control: launching the helper, finding and killing game
//! processes, starting the attached UI.
//!
//! DESIGN
//! ======
//! `ProcessHandler` is the seam between the connector and the OS. Only a
//! Windows implementation exists; on every other OS `for_current_os`
//! fails and startup aborts, because nothing works without it.

pub mod windows;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("no process handler available for {0}")]
    UnsupportedOs(&'static str),

    #[error("helper executable not found: {0}")]
    HelperNotFound(String),

    #[error("process command failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("process lookup failed: {0}")]
    #[cfg_attr(not(windows), allow(dead_code))]
    Lookup(String),
}

// =============================================================================
// GAMES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    Valorant,
    LeagueOfLegends,
    LegendsOfRuneterra,
    RiotClient,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub display_name: &'static str,
    pub internal_name: &'static str,
}

impl Game {
    pub const ALL: [Self; 4] = [Self::Valorant, Self::LeagueOfLegends, Self::LegendsOfRuneterra, Self::RiotClient];

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Valorant => "Valorant",
            Self::LeagueOfLegends => "League of Legends",
            Self::LegendsOfRuneterra => "Legends of Runeterra",
            Self::RiotClient => "Riot Client",
        }
    }

    /// Product id used by the Client's session and launcher APIs.
    #[must_use]
    pub fn internal_name(self) -> &'static str {
        match self {
            Self::Valorant => "valorant",
            Self::LeagueOfLegends => "league_of_legends",
            Self::LegendsOfRuneterra => "bacon",
            Self::RiotClient => "riot_client",
        }
    }

    #[must_use]
    pub fn from_internal_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.internal_name() == name)
    }

    #[must_use]
    pub fn info(self) -> GameInfo {
        GameInfo { display_name: self.display_name(), internal_name: self.internal_name() }
    }
}

// =============================================================================
// HANDLER
// =============================================================================

#[async_trait]
pub trait ProcessHandler: Send + Sync {
    /// Start the helper headless on `port`, authenticated by `secret`.
    async fn start_helper(&self, port: u16, secret: &str) -> Result<(), ProcessError>;

    async fn helper_process_id(&self) -> Option<u32>;

    async fn game_process_id(&self, game: Game) -> Option<u32>;

    /// Forcefully terminate `pid`. Returns whether the kill succeeded.
    async fn kill_process(&self, pid: u32) -> bool;

    /// Start the UI process attached to the running helper.
    async fn launch_ui(&self, port: u16, secret: &str) -> Result<(), ProcessError>;
}

/// The handler for the host OS.
///
/// # Errors
///
/// `UnsupportedOs` when no handler exists for this OS, `HelperNotFound`
/// when the helper executable cannot be located.
pub fn for_current_os() -> Result<Arc<dyn ProcessHandler>, ProcessError> {
    #[cfg(windows)]
    {
        let handler = windows::WindowsProcessHandler::discover()?;
        Ok(Arc::new(handler))
    }
    #[cfg(not(windows))]
    {
        Err(ProcessError::UnsupportedOs(std::env::consts::OS))
    }
}
