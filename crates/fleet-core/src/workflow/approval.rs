use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{button_id, Workflow};
use crate::capability::Whitelister;
use crate::error::{FleetError, Result};
use crate::gate::RoleGate;
use crate::interaction::{Click, CommandDefinition, Invocation, Reply};
use crate::message::{ActionMessage, Button, ButtonStyle, FIELD_USERNAME};

const COMMAND: &str = "whitelist";
pub const OPTION_USERNAME: &str = "minecraft-name";

/// One-step approval: a member asks to be whitelisted, someone with the
/// approver role confirms.
pub struct WhitelistApproval {
    whitelister: Arc<dyn Whitelister>,
    gate: RoleGate,
    approve_id: String,
}

impl WhitelistApproval {
    pub fn new(whitelister: Arc<dyn Whitelister>, gate: RoleGate) -> Self {
        Self {
            whitelister,
            gate,
            approve_id: button_id("approve", COMMAND),
        }
    }
}

/// Minecraft account names: 3 to 16 of `[A-Za-z0-9_]`. Anything else would
/// end up verbatim in a console command.
pub fn validate_username(name: &str) -> Result<&str> {
    let name = name.trim();
    let valid = (3..=16).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(FleetError::InvalidArgument(format!(
            "'{name}' is not a valid Minecraft name"
        )))
    }
}

#[async_trait]
impl Workflow for WhitelistApproval {
    fn name(&self) -> &str {
        COMMAND
    }

    fn definition(&self) -> CommandDefinition {
        CommandDefinition::new(COMMAND, "Whitelist a player on the Minecraft server").with_option(
            OPTION_USERNAME,
            "The name of your Minecraft Account",
            true,
        )
    }

    fn handles(&self, button: &str) -> bool {
        button == self.approve_id
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<Reply> {
        let username = validate_username(invocation.require_option(OPTION_USERNAME)?)?;
        Ok(Reply::Post(
            ActionMessage::new("Requesting Whitelist", "Please wait for approval :-)")
                .with_field(FIELD_USERNAME, username)
                .with_button(
                    Button::new(self.approve_id.clone(), "Approve", ButtonStyle::Success)
                        .with_emoji("✅"),
                ),
        ))
    }

    async fn click(&self, click: &Click) -> Result<Reply> {
        if click.message.is_terminal() || click.button != self.approve_id {
            return Ok(Reply::Acknowledge);
        }
        self.gate.check(&click.member, "confirm your Whitelist")?;
        let username = validate_username(click.message.require_field(FIELD_USERNAME)?)?;

        self.whitelister
            .whitelist(username)
            .await
            .map_err(|e| FleetError::action(format!("failed to whitelist {username}"), e))?;
        info!(username, approver = %click.member.name, "whitelisted");

        Ok(Reply::Update(ActionMessage::new(
            "Approved",
            format!("Welcome on the Server **{username}**!"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::Member;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeWhitelist {
        added: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Whitelister for FakeWhitelist {
        async fn whitelist(&self, username: &str) -> anyhow::Result<()> {
            self.added.lock().unwrap().push(username.to_string());
            Ok(())
        }
    }

    fn request(name: &str) -> Invocation {
        let mut invocation = Invocation {
            command: COMMAND.into(),
            member: Member::new("1", "steve"),
            ..Default::default()
        };
        invocation
            .options
            .insert(OPTION_USERNAME.to_string(), name.to_string());
        invocation
    }

    fn approve(member: Member, message: ActionMessage) -> Click {
        Click {
            id: "c".into(),
            tenant: "g".into(),
            button: "approve_whitelist".into(),
            member,
            message,
        }
    }

    #[tokio::test]
    async fn request_then_approve() {
        let list = Arc::new(FakeWhitelist::default());
        let workflow = WhitelistApproval::new(list.clone(), RoleGate::new("mods"));

        let reply = workflow.invoke(&request("Steve_01")).await.unwrap();
        let Reply::Post(pending) = reply else {
            panic!("expected a post");
        };
        assert_eq!(pending.field(FIELD_USERNAME), Some("Steve_01"));
        assert!(list.added.lock().unwrap().is_empty());

        let err = workflow
            .click(&approve(Member::new("1", "steve"), pending.clone()))
            .await
            .unwrap_err();
        assert!(err.notice().contains("can confirm your Whitelist"));

        let reply = workflow
            .click(&approve(Member::new("2", "mod").with_role("mods"), pending))
            .await
            .unwrap();
        let Reply::Update(done) = reply else {
            panic!("expected an update");
        };
        assert_eq!(done.description, "Welcome on the Server **Steve_01**!");
        assert!(done.is_terminal());
        assert_eq!(list.added.lock().unwrap().as_slice(), ["Steve_01"]);
    }

    #[tokio::test]
    async fn rejects_names_that_are_not_minecraft_names() {
        let workflow =
            WhitelistApproval::new(Arc::new(FakeWhitelist::default()), RoleGate::new("mods"));
        for bad in ["ab", "name with spaces", "x; op everyone", "seventeen_chars__"] {
            let err = workflow.invoke(&request(bad)).await.unwrap_err();
            assert!(matches!(err, FleetError::InvalidArgument(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn missing_option_is_reported() {
        let workflow =
            WhitelistApproval::new(Arc::new(FakeWhitelist::default()), RoleGate::new("mods"));
        let invocation = Invocation {
            command: COMMAND.into(),
            ..Default::default()
        };
        let err = workflow.invoke(&invocation).await.unwrap_err();
        assert!(matches!(err, FleetError::MissingOption(_)));
    }

    #[tokio::test]
    async fn approving_a_message_without_username_is_malformed() {
        let workflow =
            WhitelistApproval::new(Arc::new(FakeWhitelist::default()), RoleGate::new("mods"));
        let message = ActionMessage::new("Requesting Whitelist", "").with_button(Button::new(
            "approve_whitelist",
            "Approve",
            ButtonStyle::Success,
        ));
        let err = workflow
            .click(&approve(Member::new("2", "m").with_role("mods"), message))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::MalformedInteraction(_)));
    }
}
