use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::Workflow;
use crate::capability::Executor;
use crate::error::{FleetError, Result};
use crate::interaction::{Click, CommandDefinition, Invocation, Reply};
use crate::message::ActionMessage;

/// Runs its executor straight away. No gate, no buttons.
pub struct DirectAction {
    definition: CommandDefinition,
    executor: Arc<dyn Executor>,
    done: ActionMessage,
    failure: String,
}

impl DirectAction {
    pub fn new(
        definition: CommandDefinition,
        executor: Arc<dyn Executor>,
        done: ActionMessage,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            definition,
            executor,
            done,
            failure: failure.into(),
        }
    }

    /// `/wakeup`: bring a wound-down server back.
    pub fn wake_up(executor: Arc<dyn Executor>) -> Self {
        Self::new(
            CommandDefinition::new("wakeup", "Wakeup the server"),
            executor,
            ActionMessage::new("Waking up Server", "Use /winddown to bring it down."),
            "failed to scale up the server",
        )
    }
}

#[async_trait]
impl Workflow for DirectAction {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn definition(&self) -> CommandDefinition {
        self.definition.clone()
    }

    fn handles(&self, _button: &str) -> bool {
        false
    }

    async fn invoke(&self, _invocation: &Invocation) -> Result<Reply> {
        self.executor
            .perform()
            .await
            .map_err(|e| FleetError::action(self.failure.clone(), e))?;
        info!(workflow = %self.definition.name, "action executed");
        Ok(Reply::Post(self.done.clone()))
    }

    async fn click(&self, _click: &Click) -> Result<Reply> {
        Ok(Reply::Acknowledge)
    }
}
