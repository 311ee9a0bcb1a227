use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::Operand;
use crate::capability::CommandSender;
use crate::error::{FleetError, Result};
use crate::gate::RoleGate;
use crate::interaction::ChannelMessage;

/// Relays messages from one channel to the server console and posts the
/// console's answer back.
pub struct ConsoleRelay {
    channel: String,
    gate: RoleGate,
    sender: Arc<dyn CommandSender>,
}

impl ConsoleRelay {
    pub fn new(channel: impl Into<String>, gate: RoleGate, sender: Arc<dyn CommandSender>) -> Self {
        Self {
            channel: channel.into(),
            gate,
            sender,
        }
    }
}

#[async_trait]
impl Operand for ConsoleRelay {
    fn name(&self) -> &str {
        "rcon"
    }

    async fn handle(&self, message: &ChannelMessage) -> Result<Option<String>> {
        if message.channel != self.channel {
            return Ok(None);
        }
        let command = message.content.trim();
        if command.is_empty() {
            return Ok(None);
        }
        self.gate.check(&message.author, "send RCON commands")?;

        info!(command, author = %message.author.name, "sending rcon command");
        let body = self
            .sender
            .send_command(command)
            .await
            .map_err(|e| FleetError::action("failed to send RCON command", e))?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("`{body}`")))
    }
}
