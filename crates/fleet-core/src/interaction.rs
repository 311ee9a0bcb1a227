use std::collections::BTreeMap;

use crate::error::{FleetError, Result};
use crate::message::ActionMessage;

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// The member behind an event, with roles as resolved by the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A slash command being run.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Platform id of this interaction, for logs.
    pub id: String,
    pub tenant: String,
    pub command: String,
    pub member: Member,
    pub options: BTreeMap<String, String>,
}

impl Invocation {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn require_option(&self, name: &str) -> Result<&str> {
        self.option(name)
            .ok_or_else(|| FleetError::MissingOption(name.to_string()))
    }
}

/// A button pressed on a message a workflow rendered earlier.
#[derive(Debug, Clone)]
pub struct Click {
    pub id: String,
    pub tenant: String,
    pub button: String,
    pub member: Member,
    /// The message the button belongs to, as it currently reads.
    pub message: ActionMessage,
}

/// A plain message posted in a channel the bot can read.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub tenant: String,
    pub channel: String,
    pub author: Member,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer with a new message.
    Post(ActionMessage),
    /// Replace the message the button was clicked on.
    Update(ActionMessage),
    /// Text visible only to the member who caused the event.
    Notice(String),
    /// Accept the event and change nothing.
    Acknowledge,
}

impl Reply {
    pub fn message(&self) -> Option<&ActionMessage> {
        match self {
            Reply::Post(m) | Reply::Update(m) => Some(m),
            Reply::Notice(_) | Reply::Acknowledge => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Command metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionDefinition>,
}

/// A string option on a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.options.push(OptionDefinition {
            name: name.into(),
            description: description.into(),
            required,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_roles_and_mention() {
        let member = Member::new("7", "alex").with_role("admins");
        assert_eq!(member.mention(), "<@7>");
        assert!(member.has_role("admins"));
        assert!(!member.has_role("mods"));
    }

    #[test]
    fn missing_option_names_it() {
        let invocation = Invocation::default();
        let err = invocation.require_option("minecraft-name").unwrap_err();
        assert_eq!(err.to_string(), "missing option 'minecraft-name'");
    }
}
