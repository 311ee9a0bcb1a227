use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use fleet_core::capability::{
    CommandSender, Executor, Notifier, PlayerCounter, PlayerList, PlayerLister, Whitelister,
};
use rcon_client::{Connector, ReconnectPolicy, ResilientTransport, TcpConnector};
use regex::Regex;
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// `list` parsing
// ---------------------------------------------------------------------------

/// The server answered `list` with something we don't recognise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid player list response: {payload:?}")]
pub struct ProtocolParseError {
    pub payload: String,
}

static LIST_RE: OnceLock<Regex> = OnceLock::new();

fn list_re() -> &'static Regex {
    // "There are 2 of a max of 20 players online: Steve, Alex"
    // "There are 2/20 players online:\nSteve, Alex"
    LIST_RE.get_or_init(|| {
        Regex::new(r"(?is)^\D*?(\d+)\D+?(\d+)\D*?players?\s+online[.:]?\s*(.*)$").unwrap()
    })
}

/// Online count and names from a `list` response. The names may fall short
/// of the count; the count wins. Servers that group players print one
/// `group: names` line per group; the labels are dropped.
pub fn parse_player_list(payload: &str) -> Result<(u32, Vec<String>), ProtocolParseError> {
    let invalid = || ProtocolParseError {
        payload: payload.to_string(),
    };
    let caps = list_re().captures(payload.trim()).ok_or_else(invalid)?;
    let count: u32 = caps[1].parse().map_err(|_| invalid())?;
    if count == 0 {
        return Ok((0, Vec::new()));
    }
    let names = caps
        .get(3)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .lines()
        .map(|line| line.rsplit_once(':').map_or(line, |(_, names)| names))
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    Ok((count, names))
}

// ---------------------------------------------------------------------------
// MinecraftServer
// ---------------------------------------------------------------------------

/// A Minecraft server reached over RCON. Cheap to clone; clones share one
/// connection.
pub struct MinecraftServer<C: Connector = TcpConnector> {
    transport: Arc<ResilientTransport<C>>,
}

impl<C: Connector> Clone for MinecraftServer<C> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl MinecraftServer<TcpConnector> {
    pub fn over_tcp(
        address: &str,
        password: &str,
        timeout: Duration,
        max_reconnects: Option<u32>,
    ) -> Self {
        let connector = TcpConnector::new(address, password).with_timeout(timeout);
        let policy = ReconnectPolicy {
            max_reconnects,
            ..ReconnectPolicy::default()
        };
        Self::new(Arc::new(ResilientTransport::with_policy(connector, policy)))
    }
}

impl<C: Connector> MinecraftServer<C> {
    pub fn new(transport: Arc<ResilientTransport<C>>) -> Self {
        Self { transport }
    }

    /// Connect now rather than on the first command.
    pub async fn connect(&self) -> anyhow::Result<()> {
        self.transport.connect().await.context("connecting to rcon")
    }

    async fn send(&self, command: &str) -> anyhow::Result<String> {
        let verb = command.split_whitespace().next().unwrap_or_default();
        let body = self
            .transport
            .call(command)
            .await
            .with_context(|| format!("sending {verb}"))?;
        info!(command = verb, payload = %body, "receiving rcon response");
        Ok(body)
    }

    pub async fn players(&self) -> anyhow::Result<(u32, Vec<String>)> {
        let body = self.send("list").await?;
        Ok(parse_player_list(&body)?)
    }
}

#[async_trait]
impl<C: Connector> PlayerCounter for MinecraftServer<C> {
    async fn count_players(&self) -> anyhow::Result<u32> {
        Ok(self.players().await?.0)
    }
}

#[async_trait]
impl<C: Connector> PlayerLister for MinecraftServer<C> {
    async fn list_players(&self) -> anyhow::Result<PlayerList> {
        let (count, names) = self.players().await?;
        Ok(PlayerList::named(count, names))
    }
}

/// Restarts through the server's own `restart` command.
#[async_trait]
impl<C: Connector> Executor for MinecraftServer<C> {
    async fn perform(&self) -> anyhow::Result<()> {
        self.send("restart").await.map(|_| ())
    }
}

#[async_trait]
impl<C: Connector> Notifier for MinecraftServer<C> {
    async fn notify(&self, text: &str) -> anyhow::Result<()> {
        self.send(&format!("say {text}")).await.map(|_| ())
    }
}

#[async_trait]
impl<C: Connector> Whitelister for MinecraftServer<C> {
    async fn whitelist(&self, username: &str) -> anyhow::Result<()> {
        self.send(&format!("whitelist add {username}")).await.map(|_| ())
    }
}

#[async_trait]
impl<C: Connector> CommandSender for MinecraftServer<C> {
    async fn send_command(&self, command: &str) -> anyhow::Result<String> {
        self.send(command).await
    }
}
