//! Slash-command workflows and channel operands.
//!
//! A workflow owns one command name and the buttons it renders. Button ids
//! are `{action}_{workflow}` (`retry_restart`, `approve_whitelist`) so a
//! click can be routed without any stored state.

pub mod approval;
pub mod console;
pub mod direct;
pub mod gated;
pub mod players;

use async_trait::async_trait;

use crate::error::Result;
use crate::interaction::{ChannelMessage, Click, CommandDefinition, Invocation, Reply};
use crate::message::ActionMessage;

pub use approval::WhitelistApproval;
pub use console::ConsoleRelay;
pub use direct::DirectAction;
pub use gated::{ActionCopy, GatedAction};
pub use players::PlayersPanel;

#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> CommandDefinition;

    /// Whether a click on `button` belongs to this workflow.
    fn handles(&self, button: &str) -> bool;

    async fn invoke(&self, invocation: &Invocation) -> Result<Reply>;

    async fn click(&self, click: &Click) -> Result<Reply>;
}

/// Reacts to plain channel messages rather than commands.
#[async_trait]
pub trait Operand: Send + Sync {
    fn name(&self) -> &str;

    /// Text to post back into the channel, if any.
    async fn handle(&self, message: &ChannelMessage) -> Result<Option<String>>;
}

/// Whether a rendered message answers a command or replaces the clicked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    Post,
    Update,
}

impl Render {
    pub fn reply(self, message: ActionMessage) -> Reply {
        match self {
            Render::Post => Reply::Post(message),
            Render::Update => Reply::Update(message),
        }
    }
}

pub fn button_id(action: &str, workflow: &str) -> String {
    format!("{action}_{workflow}")
}
