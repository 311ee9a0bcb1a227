//! Discord adapter: converts serenity events into core events and core
//! replies back into interaction responses.

use std::sync::Arc;

use anyhow::Context as _;
use fleet_core::interaction::{
    ChannelMessage, Click, CommandDefinition, Invocation, Member, Reply,
};
use fleet_core::message::{ActionMessage, Button, ButtonStyle, Field};
use fleet_core::registry::{CommandInstaller, Dispatch};
use serenity::all::{
    ActionRow, ActionRowComponent, ButtonKind, ButtonStyle as DiscordStyle, CommandInteraction,
    CommandOptionType, ComponentInteraction, Context, CreateActionRow, CreateButton,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, Embed, EventHandler, GatewayIntents, GuildId, Http,
    Interaction, Message, ReactionType, Ready, RoleId, User,
};
use serenity::async_trait;
use serenity::Client;
use tracing::{debug, error, info};

/// Gateway intents for the bot. Message content is privileged, so it is only
/// asked for when something relays channel messages.
pub fn intents(relay_messages: bool) -> GatewayIntents {
    let mut intents = GatewayIntents::GUILDS;
    if relay_messages {
        intents |= GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    }
    intents
}

pub async fn serve(
    token: &str,
    dispatch: Arc<dyn Dispatch>,
    intents: GatewayIntents,
) -> anyhow::Result<()> {
    let mut client = Client::builder(token, intents)
        .event_handler(Handler { dispatch })
        .await
        .context("building discord client")?;
    client.start().await.context("discord gateway")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

struct Handler {
    dispatch: Arc<dyn Dispatch>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to discord");
        self.dispatch.start(&Installer::new(&ctx)).await;
    }

    async fn guild_create(
        &self,
        ctx: Context,
        guild: serenity::model::guild::Guild,
        _is_new: Option<bool>,
    ) {
        self.dispatch
            .tenant_discovered(&guild.id.to_string(), &Installer::new(&ctx))
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.on_command(&ctx, &command).await,
            Interaction::Component(component) => self.on_component(&ctx, &component).await,
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild) = msg.guild_id else {
            return;
        };
        let roles = msg
            .member
            .as_ref()
            .map(|m| m.roles.as_slice())
            .unwrap_or_default();
        let message = ChannelMessage {
            tenant: guild.to_string(),
            channel: msg.channel_id.to_string(),
            author: member(&msg.author, roles),
            content: msg.content.clone(),
        };
        for text in self.dispatch.message(&message).await {
            if let Err(e) = msg.channel_id.say(&ctx.http, text).await {
                error!(channel = %msg.channel_id, error = %e, "posting reply");
            }
        }
    }
}

impl Handler {
    async fn on_command(&self, ctx: &Context, command: &CommandInteraction) {
        let roles = command
            .member
            .as_ref()
            .map(|m| m.roles.as_slice())
            .unwrap_or_default();
        let invocation = Invocation {
            id: command.id.to_string(),
            tenant: command.guild_id.map(|g| g.to_string()).unwrap_or_default(),
            command: command.data.name.clone(),
            member: member(&command.user, roles),
            options: command
                .data
                .options
                .iter()
                .filter_map(|o| Some((o.name.clone(), o.value.as_str()?.to_string())))
                .collect(),
        };
        let Some(reply) = self.dispatch.invocation(&invocation).await else {
            debug!(command = %invocation.command, "no workflow for command");
            return;
        };
        if let Err(e) = command.create_response(&ctx.http, response(&reply)).await {
            error!(interaction = %invocation.id, error = %e, "responding to command");
        }
    }

    async fn on_component(&self, ctx: &Context, component: &ComponentInteraction) {
        let roles = component
            .member
            .as_ref()
            .map(|m| m.roles.as_slice())
            .unwrap_or_default();
        let click = Click {
            id: component.id.to_string(),
            tenant: component.guild_id.map(|g| g.to_string()).unwrap_or_default(),
            button: component.data.custom_id.clone(),
            member: member(&component.user, roles),
            message: action_message(&component.message.embeds, &component.message.components),
        };
        let Some(reply) = self.dispatch.click(&click).await else {
            debug!(button = %click.button, "no workflow for button");
            return;
        };
        if let Err(e) = component.create_response(&ctx.http, response(&reply)).await {
            error!(interaction = %click.id, error = %e, "responding to interaction");
        }
    }
}

fn member(user: &User, roles: &[RoleId]) -> Member {
    Member {
        id: user.id.to_string(),
        name: user.name.clone(),
        roles: roles.iter().map(ToString::to_string).collect(),
    }
}

// ---------------------------------------------------------------------------
// Command installation
// ---------------------------------------------------------------------------

struct Installer {
    http: Arc<Http>,
}

impl Installer {
    fn new(ctx: &Context) -> Self {
        Self {
            http: Arc::clone(&ctx.http),
        }
    }
}

#[async_trait]
impl CommandInstaller for Installer {
    async fn install(&self, tenant: &str, definition: &CommandDefinition) -> anyhow::Result<()> {
        guild_id(tenant)?
            .create_command(&self.http, create_command(definition))
            .await
            .with_context(|| format!("creating /{} in {tenant}", definition.name))?;
        Ok(())
    }
}

fn guild_id(tenant: &str) -> anyhow::Result<GuildId> {
    let id: u64 = tenant
        .parse()
        .with_context(|| format!("invalid guild id {tenant:?}"))?;
    anyhow::ensure!(id != 0, "invalid guild id {tenant:?}");
    Ok(GuildId::new(id))
}

pub fn create_command(definition: &CommandDefinition) -> CreateCommand {
    definition.options.iter().fold(
        CreateCommand::new(&definition.name).description(&definition.description),
        |command, option| {
            command.add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    &option.name,
                    &option.description,
                )
                .required(option.required),
            )
        },
    )
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn response(reply: &Reply) -> CreateInteractionResponse {
    match reply {
        Reply::Post(message) => CreateInteractionResponse::Message(rendered(message)),
        Reply::Update(message) => CreateInteractionResponse::UpdateMessage(rendered(message)),
        Reply::Notice(text) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        ),
        // Only valid for component interactions; no workflow answers a
        // command with it.
        Reply::Acknowledge => CreateInteractionResponse::Acknowledge,
    }
}

fn rendered(message: &ActionMessage) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .embed(embed(message))
        .components(action_rows(message))
}

pub fn embed(message: &ActionMessage) -> CreateEmbed {
    let mut embed = CreateEmbed::new().title(&message.title);
    if !message.description.is_empty() {
        embed = embed.description(&message.description);
    }
    message
        .fields
        .iter()
        .fold(embed, |embed, field| embed.field(&field.name, &field.value, false))
}

/// One row holding every button; an empty list clears old buttons.
pub fn action_rows(message: &ActionMessage) -> Vec<CreateActionRow> {
    if message.buttons.is_empty() {
        return Vec::new();
    }
    let buttons = message
        .buttons
        .iter()
        .map(|b| {
            let button = CreateButton::new(&b.id)
                .label(&b.label)
                .style(match b.style {
                    ButtonStyle::Primary => DiscordStyle::Primary,
                    ButtonStyle::Secondary => DiscordStyle::Secondary,
                    ButtonStyle::Success => DiscordStyle::Success,
                    ButtonStyle::Danger => DiscordStyle::Danger,
                });
            match &b.emoji {
                Some(emoji) => button.emoji(ReactionType::Unicode(emoji.clone())),
                None => button,
            }
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

// ---------------------------------------------------------------------------
// Reading messages back
// ---------------------------------------------------------------------------

/// The [`ActionMessage`] a posted message was rendered from. Only the first
/// embed counts.
pub fn action_message(embeds: &[Embed], rows: &[ActionRow]) -> ActionMessage {
    let mut message = ActionMessage::default();
    if let Some(embed) = embeds.first() {
        message.title = embed.title.clone().unwrap_or_default();
        message.description = embed.description.clone().unwrap_or_default();
        message.fields = embed
            .fields
            .iter()
            .map(|f| Field {
                name: f.name.clone(),
                value: f.value.clone(),
            })
            .collect();
    }
    message.buttons = rows
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(button)
        .collect();
    message
}

fn button(component: &ActionRowComponent) -> Option<Button> {
    let ActionRowComponent::Button(b) = component else {
        return None;
    };
    let ButtonKind::NonLink { custom_id, style } = &b.data else {
        return None;
    };
    let style = match style {
        DiscordStyle::Primary => ButtonStyle::Primary,
        DiscordStyle::Success => ButtonStyle::Success,
        DiscordStyle::Danger => ButtonStyle::Danger,
        _ => ButtonStyle::Secondary,
    };
    Some(Button {
        id: custom_id.clone(),
        label: b.label.clone().unwrap_or_default(),
        emoji: b.emoji.as_ref().and_then(|e| match e {
            ReactionType::Unicode(name) => Some(name.clone()),
            ReactionType::Custom { name, .. } => name.clone(),
            _ => None,
        }),
        style,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::workflow::button_id;
    use serde_json::json;

    #[test]
    fn message_content_only_when_relaying() {
        let plain = intents(false);
        assert!(plain.contains(GatewayIntents::GUILDS));
        assert!(!plain.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(!plain.contains(GatewayIntents::GUILD_MESSAGES));

        let relaying = intents(true);
        assert!(relaying.contains(GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES));
        assert!(relaying.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    fn blocked() -> ActionMessage {
        ActionMessage::new("Requesting Restart", "<@1> is requesting a server restart.")
            .with_field("Players", "2")
            .with_field("Last try", "2024/06/01 18:30:00")
            .with_button(
                Button::new(button_id("override", "restart"), "Override", ButtonStyle::Danger)
                    .with_emoji("⚠"),
            )
            .with_button(Button::new(
                button_id("retry", "restart"),
                "Retry",
                ButtonStyle::Primary,
            ))
    }

    #[test]
    fn embed_carries_title_and_fields() {
        let value = serde_json::to_value(embed(&blocked())).unwrap();
        assert_eq!(value["title"], "Requesting Restart");
        assert_eq!(value["fields"][0]["name"], "Players");
        assert_eq!(value["fields"][0]["value"], "2");
        assert_eq!(value["fields"][1]["name"], "Last try");
    }

    #[test]
    fn buttons_render_into_one_row() {
        let rows = action_rows(&blocked());
        assert_eq!(rows.len(), 1);
        let value = serde_json::to_value(&rows).unwrap();
        assert_eq!(value[0]["components"][0]["custom_id"], "override_restart");
        assert_eq!(value[0]["components"][1]["label"], "Retry");

        let done = ActionMessage::new("Restarting Server", "Please stand by.");
        assert!(action_rows(&done).is_empty());
    }

    #[test]
    fn reads_a_rendered_message_back() {
        let embed: Embed = serde_json::from_value(json!({
            "title": "Requesting Restart",
            "description": "<@1> is requesting a server restart.",
            "fields": [
                { "name": "Players", "value": "2", "inline": false },
                { "name": "Last try", "value": "2024/06/01 18:30:00", "inline": false }
            ]
        }))
        .unwrap();
        let row: ActionRow = serde_json::from_value(json!({
            "type": 1,
            "components": [
                { "type": 2, "style": 4, "custom_id": "override_restart", "label": "Override", "emoji": { "name": "⚠" } },
                { "type": 2, "style": 1, "custom_id": "retry_restart", "label": "Retry" }
            ]
        }))
        .unwrap();

        assert_eq!(action_message(&[embed], &[row]), blocked());
    }

    #[test]
    fn message_without_embed_reads_empty() {
        let message = action_message(&[], &[]);
        assert!(message.title.is_empty());
        assert!(message.is_terminal());
    }

    #[test]
    fn command_options_are_strings() {
        let definition = CommandDefinition::new("whitelist", "Request whitelisting")
            .with_option("minecraft-name", "Your Minecraft name", true);
        let value = serde_json::to_value(create_command(&definition)).unwrap();
        assert_eq!(value["name"], "whitelist");
        assert_eq!(value["options"][0]["name"], "minecraft-name");
        assert_eq!(value["options"][0]["type"], 3);
        assert_eq!(value["options"][0]["required"], true);
    }

    #[test]
    fn tenants_must_be_guild_ids() {
        assert_eq!(guild_id("1234").unwrap(), GuildId::new(1234));
        assert!(guild_id("0").is_err());
        assert!(guild_id("lobby").is_err());
    }
}
