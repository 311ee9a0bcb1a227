use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{button_id, Render, Workflow};
use crate::capability::{Executor, Notifier, PlayerCounter, SilentNotifier};
use crate::clock::{Clock, SystemClock};
use crate::error::{FleetError, Result};
use crate::gate::{DebounceWindow, RoleGate};
use crate::interaction::{Click, CommandDefinition, Invocation, Member, Reply};
use crate::message::{
    format_timestamp, ActionMessage, Button, ButtonStyle, FIELD_LAST_TRY, FIELD_PLAYERS,
};

// ---------------------------------------------------------------------------
// ActionCopy
// ---------------------------------------------------------------------------

/// Display text for one gated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCopy {
    pub command: String,
    pub command_description: String,
    /// "server restart", as in "X is requesting a server restart."
    pub request: String,
    pub blocked_title: String,
    pub executing_title: String,
    pub executing_description: String,
    /// What an override does, for the role-denied notice.
    pub override_action: String,
    /// What got aborted, as in "The restart was aborted by X."
    pub noun: String,
    /// Prefix for executor failures.
    pub failure: String,
}

impl ActionCopy {
    pub fn restart() -> Self {
        Self {
            command: "restart".into(),
            command_description: "Restart the server".into(),
            request: "server restart".into(),
            blocked_title: "Requesting Restart".into(),
            executing_title: "Restarting Server".into(),
            executing_description: "The server will be back shortly. Please stand by.".into(),
            override_action: "override your Restart".into(),
            noun: "restart".into(),
            failure: "failed to restart the server".into(),
        }
    }

    pub fn wind_down() -> Self {
        Self {
            command: "winddown".into(),
            command_description: "Wind down the server".into(),
            request: "server wind down".into(),
            blocked_title: "Requesting Winddown".into(),
            executing_title: "Winding down Server".into(),
            executing_description: "Use /wakeup to bring it back.".into(),
            override_action: "override your winddown".into(),
            noun: "winddown".into(),
            failure: "failed to wind down the server".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GatedAction
// ---------------------------------------------------------------------------

/// A privileged action that only runs on an empty server, unless someone
/// with the override role forces it.
///
/// ```text
/// invoke ─► players? ──0──► execute ─► "Restarting Server"
///               │
///               └─n──► "Requesting Restart"  [Override] [Abort] [Retry]
///                          │ override (role)  ─► execute
///                          │ abort   (anyone) ─► "Aborted"
///                          └ retry (debounced) ─► players? ...
/// ```
pub struct GatedAction {
    copy: ActionCopy,
    counter: Arc<dyn PlayerCounter>,
    executor: Arc<dyn Executor>,
    notifier: Arc<dyn Notifier>,
    gate: RoleGate,
    debounce: DebounceWindow,
    clock: Arc<dyn Clock>,
    override_id: String,
    abort_id: String,
    retry_id: String,
}

impl GatedAction {
    pub fn new(
        copy: ActionCopy,
        counter: Arc<dyn PlayerCounter>,
        executor: Arc<dyn Executor>,
        gate: RoleGate,
    ) -> Self {
        Self {
            override_id: button_id("override", &copy.command),
            abort_id: button_id("abort", &copy.command),
            retry_id: button_id("retry", &copy.command),
            copy,
            counter,
            executor,
            notifier: Arc::new(SilentNotifier),
            gate,
            debounce: DebounceWindow::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_debounce(mut self, debounce: DebounceWindow) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn attempt(&self, render: Render) -> Result<Reply> {
        let players = self
            .counter
            .count_players()
            .await
            .map_err(|e| FleetError::action("failed getting player count", e))?;
        if players == 0 {
            return self.execute(render).await;
        }
        info!(workflow = %self.copy.command, players, "waiting for the server to empty");
        Ok(render.reply(self.blocked(players)))
    }

    async fn execute(&self, render: Render) -> Result<Reply> {
        self.executor
            .perform()
            .await
            .map_err(|e| FleetError::action(self.copy.failure.clone(), e))?;
        info!(workflow = %self.copy.command, "action executed");
        Ok(render.reply(ActionMessage::new(
            self.copy.executing_title.clone(),
            self.copy.executing_description.clone(),
        )))
    }

    fn blocked(&self, players: u32) -> ActionMessage {
        ActionMessage::new(
            self.copy.blocked_title.clone(),
            "The server is waiting for all players to leave. Retry when it's empty.",
        )
        .with_field(FIELD_PLAYERS, players.to_string())
        .with_field(FIELD_LAST_TRY, format_timestamp(self.clock.now()))
        .with_button(
            Button::new(self.override_id.clone(), "Override", ButtonStyle::Danger).with_emoji("⚠️"),
        )
        .with_button(
            Button::new(self.abort_id.clone(), "Abort", ButtonStyle::Secondary).with_emoji("🛑"),
        )
        .with_button(
            Button::new(self.retry_id.clone(), "Retry", ButtonStyle::Primary).with_emoji("🔃"),
        )
    }

    fn aborted(&self, by: &Member) -> ActionMessage {
        ActionMessage::new(
            "Aborted",
            format!("The {} was aborted by {}.", self.copy.noun, by.mention()),
        )
    }
}

#[async_trait]
impl Workflow for GatedAction {
    fn name(&self) -> &str {
        &self.copy.command
    }

    fn definition(&self) -> CommandDefinition {
        CommandDefinition::new(
            self.copy.command.clone(),
            self.copy.command_description.clone(),
        )
    }

    fn handles(&self, button: &str) -> bool {
        button == self.override_id || button == self.abort_id || button == self.retry_id
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<Reply> {
        let announcement = format!(
            "{} is requesting a {}. You can leave the server to comply with their request.",
            invocation.member.mention(),
            self.copy.request
        );
        if let Err(e) = self.notifier.notify(&announcement).await {
            warn!(workflow = %self.copy.command, error = %format!("{e:#}"), "notifying players");
        }
        self.attempt(Render::Post).await
    }

    async fn click(&self, click: &Click) -> Result<Reply> {
        if click.message.is_terminal() {
            return Ok(Reply::Acknowledge);
        }
        if click.button == self.override_id {
            self.gate.check(&click.member, &self.copy.override_action)?;
            info!(workflow = %self.copy.command, member = %click.member.name, "override");
            self.execute(Render::Update).await
        } else if click.button == self.abort_id {
            info!(workflow = %self.copy.command, member = %click.member.name, "aborted");
            Ok(Reply::Update(self.aborted(&click.member)))
        } else if click.button == self.retry_id {
            self.debounce
                .check(&click.message, FIELD_LAST_TRY, self.clock.now())?;
            self.attempt(Render::Update).await
        } else {
            Ok(Reply::Acknowledge)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCounter {
        players: AtomicU32,
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl PlayerCounter for FakeCounter {
        async fn count_players(&self) -> anyhow::Result<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("rcon unreachable");
            }
            Ok(self.players.load(Ordering::SeqCst))
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn perform(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("forbidden");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                anyhow::bail!("say failed");
            }
            Ok(())
        }
    }

    struct Harness {
        counter: Arc<FakeCounter>,
        executor: Arc<FakeExecutor>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
        action: GatedAction,
    }

    fn harness(players: u32) -> Harness {
        harness_with(players, RecordingNotifier::default())
    }

    fn harness_with(players: u32, notifier: RecordingNotifier) -> Harness {
        let counter = Arc::new(FakeCounter::default());
        counter.players.store(players, Ordering::SeqCst);
        let executor = Arc::new(FakeExecutor::default());
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap(),
        ));
        let action = GatedAction::new(
            ActionCopy::restart(),
            counter.clone(),
            executor.clone(),
            RoleGate::new("ops"),
        )
        .with_notifier(notifier.clone())
        .with_clock(clock.clone());
        Harness {
            counter,
            executor,
            notifier,
            clock,
            action,
        }
    }

    fn invocation() -> Invocation {
        Invocation {
            id: "i1".into(),
            tenant: "g1".into(),
            command: "restart".into(),
            member: Member::new("100", "requester"),
            ..Default::default()
        }
    }

    fn click(button: &str, member: Member, message: &ActionMessage) -> Click {
        Click {
            id: "c1".into(),
            tenant: "g1".into(),
            button: button.into(),
            member,
            message: message.clone(),
        }
    }

    fn posted(reply: Reply) -> ActionMessage {
        match reply {
            Reply::Post(m) => m,
            other => panic!("expected a posted message, got {other:?}"),
        }
    }

    fn updated(reply: Reply) -> ActionMessage {
        match reply {
            Reply::Update(m) => m,
            other => panic!("expected an updated message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn occupied_server_blocks_without_executing() {
        let h = harness(2);
        let msg = posted(h.action.invoke(&invocation()).await.unwrap());

        assert_eq!(msg.title, "Requesting Restart");
        assert_eq!(msg.field(FIELD_PLAYERS), Some("2"));
        assert_eq!(msg.field(FIELD_LAST_TRY), Some("2024/03/01 20:00:00"));
        let ids: Vec<_> = msg.buttons.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["override_restart", "abort_restart", "retry_restart"]);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.notifier.sent.lock().unwrap().as_slice(),
            ["<@100> is requesting a server restart. You can leave the server to comply with their request."]
        );
    }

    #[tokio::test]
    async fn empty_server_executes_once() {
        let h = harness(0);
        let msg = posted(h.action.invoke(&invocation()).await.unwrap());

        assert_eq!(msg.title, "Restarting Server");
        assert!(msg.is_terminal());
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_stop_the_workflow() {
        let h = harness_with(
            0,
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        h.action.invoke(&invocation()).await.unwrap();
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn counter_failure_is_an_action_error() {
        let h = harness(0);
        h.counter.fail.store(true, Ordering::SeqCst);
        let err = h.action.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, FleetError::Action { .. }));
        assert!(err.to_string().starts_with("failed getting player count"));
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_is_debounced_then_reevaluated() {
        let h = harness(2);
        let blocked = posted(h.action.invoke(&invocation()).await.unwrap());
        assert_eq!(h.counter.calls.load(Ordering::SeqCst), 1);

        h.clock.advance(Duration::seconds(3));
        let err = h
            .action
            .click(&click("retry_restart", Member::new("5", "x"), &blocked))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::RateLimited { .. }));
        assert_eq!(err.notice(), "Please wait at least 7 seconds before retrying.");
        assert_eq!(h.counter.calls.load(Ordering::SeqCst), 1);

        h.clock.advance(Duration::seconds(8));
        h.counter.players.store(1, Ordering::SeqCst);
        let msg = updated(
            h.action
                .click(&click("retry_restart", Member::new("5", "x"), &blocked))
                .await
                .unwrap(),
        );
        assert_eq!(h.counter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(msg.field(FIELD_PLAYERS), Some("1"));
        assert_eq!(msg.field(FIELD_LAST_TRY), Some("2024/03/01 20:00:11"));
    }

    #[tokio::test]
    async fn override_requires_the_role() {
        let h = harness(3);
        let blocked = posted(h.action.invoke(&invocation()).await.unwrap());

        let err = h
            .action
            .click(&click("override_restart", Member::new("5", "x"), &blocked))
            .await
            .unwrap_err();
        assert_eq!(
            err.notice(),
            "Only members with the <@&ops> role can override your Restart. Please wait :-)"
        );
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);

        let admin = Member::new("6", "admin").with_role("ops");
        let msg = updated(
            h.action
                .click(&click("override_restart", admin, &blocked))
                .await
                .unwrap(),
        );
        assert_eq!(msg.title, "Restarting Server");
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn executor_failure_leaves_the_message_alone() {
        let h = harness(3);
        let blocked = posted(h.action.invoke(&invocation()).await.unwrap());
        h.executor.fail.store(true, Ordering::SeqCst);

        let admin = Member::new("6", "admin").with_role("ops");
        let err = h
            .action
            .click(&click("override_restart", admin, &blocked))
            .await
            .unwrap_err();
        assert_eq!(
            err.notice(),
            "The bot encountered an error:\nfailed to restart the server: forbidden"
        );
    }

    #[tokio::test]
    async fn abort_is_terminal_for_anyone() {
        let h = harness(3);
        let blocked = posted(h.action.invoke(&invocation()).await.unwrap());

        let aborted = updated(
            h.action
                .click(&click("abort_restart", Member::new("5", "x"), &blocked))
                .await
                .unwrap(),
        );
        assert_eq!(aborted.title, "Aborted");
        assert_eq!(aborted.description, "The restart was aborted by <@5>.");
        assert!(aborted.is_terminal());

        let again = h
            .action
            .click(&click("abort_restart", Member::new("5", "x"), &aborted))
            .await
            .unwrap();
        assert_eq!(again, Reply::Acknowledge);
        let late_override = h
            .action
            .click(
                &click("override_restart", Member::new("6", "a").with_role("ops"), &aborted),
            )
            .await
            .unwrap();
        assert_eq!(late_override, Reply::Acknowledge);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wind_down_uses_its_own_buttons() {
        let h = harness(0);
        let action = GatedAction::new(
            ActionCopy::wind_down(),
            h.counter.clone(),
            h.executor.clone(),
            RoleGate::new("ops"),
        );
        assert_eq!(action.name(), "winddown");
        assert!(action.handles("retry_winddown"));
        assert!(!action.handles("retry_restart"));
        assert_eq!(action.definition().description, "Wind down the server");
    }
}
