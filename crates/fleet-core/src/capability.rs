//! What workflows need from a game server or cluster. Each backend
//! implements the subset it can support.

use async_trait::async_trait;

#[async_trait]
pub trait PlayerCounter: Send + Sync {
    async fn count_players(&self) -> anyhow::Result<u32>;
}

#[async_trait]
pub trait PlayerLister: Send + Sync {
    async fn list_players(&self) -> anyhow::Result<PlayerList>;
}

/// Carries out a privileged action: restart, scale, ...
#[async_trait]
pub trait Executor: Send + Sync {
    async fn perform(&self) -> anyhow::Result<()>;
}

/// Broadcasts to players currently on the server. Best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Whitelister: Send + Sync {
    async fn whitelist(&self, username: &str) -> anyhow::Result<()>;
}

/// Raw console access.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(&self, command: &str) -> anyhow::Result<String>;
}

/// For servers without in-game chat.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PlayerList
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerList {
    pub count: u32,
    pub roster: PlayerRoster,
}

/// Whether the backend can name its players at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRoster {
    Names(Vec<String>),
    Unavailable,
}

impl PlayerList {
    pub fn named(count: u32, names: Vec<String>) -> Self {
        Self {
            count,
            roster: PlayerRoster::Names(names),
        }
    }

    pub fn count_only(count: u32) -> Self {
        Self {
            count,
            roster: PlayerRoster::Unavailable,
        }
    }

    /// `<none>` for an empty server, `<unknown>` when names can't be had.
    pub fn display_names(&self) -> String {
        match &self.roster {
            PlayerRoster::Names(names) if !names.is_empty() => names.join(", "),
            _ if self.count == 0 => "<none>".to_string(),
            PlayerRoster::Names(_) | PlayerRoster::Unavailable => "<unknown>".to_string(),
        }
    }
}
