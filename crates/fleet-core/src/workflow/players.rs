use std::sync::Arc;

use async_trait::async_trait;

use super::{button_id, Render, Workflow};
use crate::capability::PlayerLister;
use crate::clock::{Clock, SystemClock};
use crate::error::{FleetError, Result};
use crate::gate::DebounceWindow;
use crate::interaction::{Click, CommandDefinition, Invocation, Reply};
use crate::message::{
    format_timestamp, ActionMessage, Button, ButtonStyle, FIELD_LAST_REFRESH, FIELD_PLAYERS,
    FIELD_PLAYER_COUNT,
};

const COMMAND: &str = "players";

/// `/players`: who is online, with a debounced Refresh button.
pub struct PlayersPanel {
    lister: Arc<dyn PlayerLister>,
    poll_interval: DebounceWindow,
    clock: Arc<dyn Clock>,
    refresh_id: String,
}

impl PlayersPanel {
    pub fn new(lister: Arc<dyn PlayerLister>) -> Self {
        Self {
            lister,
            poll_interval: DebounceWindow::default(),
            clock: Arc::new(SystemClock),
            refresh_id: button_id("refresh", COMMAND),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: DebounceWindow) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn refresh(&self, render: Render) -> Result<Reply> {
        let players = self
            .lister
            .list_players()
            .await
            .map_err(|e| FleetError::action("failed getting player count", e))?;
        Ok(render.reply(
            ActionMessage::new(
                "Players on the Server",
                "Click Refresh to get the current status.",
            )
            .with_field(FIELD_PLAYER_COUNT, players.count.to_string())
            .with_field(FIELD_PLAYERS, players.display_names())
            .with_field(FIELD_LAST_REFRESH, format_timestamp(self.clock.now()))
            .with_button(
                Button::new(self.refresh_id.clone(), "Refresh", ButtonStyle::Secondary)
                    .with_emoji("♻️"),
            ),
        ))
    }
}

#[async_trait]
impl Workflow for PlayersPanel {
    fn name(&self) -> &str {
        COMMAND
    }

    fn definition(&self) -> CommandDefinition {
        CommandDefinition::new(COMMAND, "List the players currently online on the server")
    }

    fn handles(&self, button: &str) -> bool {
        button == self.refresh_id
    }

    async fn invoke(&self, _invocation: &Invocation) -> Result<Reply> {
        self.refresh(Render::Post).await
    }

    async fn click(&self, click: &Click) -> Result<Reply> {
        if click.button != self.refresh_id {
            return Ok(Reply::Acknowledge);
        }
        self.poll_interval
            .check(&click.message, FIELD_LAST_REFRESH, self.clock.now())?;
        self.refresh(Render::Update).await
    }
}
