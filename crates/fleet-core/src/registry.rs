//! Binds workflows to command names and routes events to them.
//!
//! [`Guild`] serves one fixed tenant. [`Fleet`] serves every tenant the bot
//! discovers, building a fresh [`Guild`] from the [`Catalog`] for each.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{FleetError, Result};
use crate::interaction::{ChannelMessage, Click, CommandDefinition, Invocation, Reply};
use crate::workflow::{Operand, Workflow};

/// Registers command metadata with the chat platform.
#[async_trait]
pub trait CommandInstaller: Send + Sync {
    async fn install(&self, tenant: &str, definition: &CommandDefinition) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

type WorkflowFactory = Arc<dyn Fn() -> Arc<dyn Workflow> + Send + Sync>;
type OperandFactory = Arc<dyn Fn() -> Arc<dyn Operand> + Send + Sync>;

/// Recipes for the workflows and operands every tenant gets.
#[derive(Clone, Default)]
pub struct Catalog {
    workflows: Vec<WorkflowFactory>,
    operands: Vec<OperandFactory>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Workflow> + Send + Sync + 'static,
    {
        self.workflows.push(Arc::new(factory));
        self
    }

    pub fn with_operand<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Operand> + Send + Sync + 'static,
    {
        self.operands.push(Arc::new(factory));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty() && self.operands.is_empty()
    }

    /// Whether any operand needs to see channel messages.
    pub fn has_operands(&self) -> bool {
        !self.operands.is_empty()
    }

    /// A guild for `tenant` with its own instance of everything.
    pub fn instantiate(&self, tenant: &str) -> Guild {
        let mut guild = Guild::new(tenant);
        for factory in &self.workflows {
            guild.workflows.push(factory());
        }
        for factory in &self.operands {
            guild.operands.push(factory());
        }
        guild
    }
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

pub struct Guild {
    tenant: String,
    workflows: Vec<Arc<dyn Workflow>>,
    operands: Vec<Arc<dyn Operand>>,
    installed: AtomicBool,
}

impl Guild {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            workflows: Vec::new(),
            operands: Vec::new(),
            installed: AtomicBool::new(false),
        }
    }

    pub fn with_workflow(mut self, workflow: Arc<dyn Workflow>) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn with_operand(mut self, operand: Arc<dyn Operand>) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn commands(&self) -> Vec<String> {
        self.workflows.iter().map(|w| w.name().to_string()).collect()
    }

    /// Register every workflow's command. Runs once; later calls return 0.
    /// A command that fails to install is logged and skipped.
    pub async fn install(&self, installer: &dyn CommandInstaller) -> usize {
        if self.installed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        for operand in &self.operands {
            info!(tenant = %self.tenant, operand = operand.name(), "installing operand");
        }
        let mut count = 0;
        for workflow in &self.workflows {
            let definition = workflow.definition();
            info!(tenant = %self.tenant, command = %definition.name, "installing command");
            match installer.install(&self.tenant, &definition).await {
                Ok(()) => count += 1,
                Err(e) => {
                    error!(tenant = %self.tenant, command = %definition.name, error = %format!("{e:#}"), "installing command")
                }
            }
        }
        count
    }

    /// `None` when no workflow owns the command.
    pub async fn handle_invocation(&self, invocation: &Invocation) -> Option<Reply> {
        let workflow = self
            .workflows
            .iter()
            .find(|w| w.name() == invocation.command)?;
        info!(tenant = %self.tenant, interaction = %invocation.id, command = %invocation.command, "handling command");
        Some(settle(workflow.name(), workflow.invoke(invocation).await))
    }

    /// `None` when no workflow owns the button.
    pub async fn handle_click(&self, click: &Click) -> Option<Reply> {
        let workflow = self.workflows.iter().find(|w| w.handles(&click.button))?;
        info!(tenant = %self.tenant, interaction = %click.id, button = %click.button, "handling interaction");
        Some(settle(workflow.name(), workflow.click(click).await))
    }

    /// Texts to post back into the message's channel.
    pub async fn handle_message(&self, message: &ChannelMessage) -> Vec<String> {
        let mut out = Vec::new();
        for operand in &self.operands {
            match operand.handle(message).await {
                Ok(Some(text)) => out.push(text),
                Ok(None) => {}
                Err(e) => {
                    log_failure(operand.name(), &e);
                    out.push(e.notice());
                }
            }
        }
        out
    }
}

fn settle(workflow: &str, result: Result<Reply>) -> Reply {
    match result {
        Ok(reply) => reply,
        Err(e) => {
            log_failure(workflow, &e);
            Reply::Notice(e.notice())
        }
    }
}

fn log_failure(handler: &str, e: &FleetError) {
    if e.is_expected() {
        info!(handler, reason = %e, "request refused");
    } else {
        error!(handler, error = %e, "handling event");
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// One [`Guild`] per discovered tenant.
pub struct Fleet {
    catalog: Catalog,
    guilds: Mutex<HashMap<String, Arc<Guild>>>,
}

impl Fleet {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            guilds: Mutex::new(HashMap::new()),
        }
    }

    /// Set up `tenant` unless it already is. Returns whether this call did
    /// the setup. The lock covers only the membership check and insert.
    pub async fn discover(&self, tenant: &str, installer: &dyn CommandInstaller) -> bool {
        let guild = {
            let mut guilds = self.guilds.lock().unwrap_or_else(PoisonError::into_inner);
            if guilds.contains_key(tenant) {
                warn!(tenant, reason = "already exists", "skipping guild");
                return false;
            }
            let guild = Arc::new(self.catalog.instantiate(tenant));
            guilds.insert(tenant.to_string(), Arc::clone(&guild));
            guild
        };
        info!(tenant, "initializing guild");
        guild.install(installer).await;
        true
    }

    pub fn guild(&self, tenant: &str) -> Option<Arc<Guild>> {
        self.guilds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant)
            .cloned()
    }

    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .guilds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// What the chat adapter drives. Implemented by both registry shapes.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// The connection to the chat platform is up.
    async fn start(&self, installer: &dyn CommandInstaller);

    /// The bot can see `tenant` (joined, or reconnected and re-announced).
    async fn tenant_discovered(&self, tenant: &str, installer: &dyn CommandInstaller);

    async fn invocation(&self, invocation: &Invocation) -> Option<Reply>;

    async fn click(&self, click: &Click) -> Option<Reply>;

    async fn message(&self, message: &ChannelMessage) -> Vec<String>;
}

#[async_trait]
impl Dispatch for Guild {
    async fn start(&self, installer: &dyn CommandInstaller) {
        let count = self.install(installer).await;
        info!(tenant = %self.tenant, commands = count, "guild ready");
    }

    async fn tenant_discovered(&self, tenant: &str, _installer: &dyn CommandInstaller) {
        debug!(tenant, serving = %self.tenant, "tenant seen");
    }

    async fn invocation(&self, invocation: &Invocation) -> Option<Reply> {
        self.handle_invocation(invocation).await
    }

    async fn click(&self, click: &Click) -> Option<Reply> {
        self.handle_click(click).await
    }

    async fn message(&self, message: &ChannelMessage) -> Vec<String> {
        self.handle_message(message).await
    }
}

#[async_trait]
impl Dispatch for Fleet {
    async fn start(&self, _installer: &dyn CommandInstaller) {
        info!("waiting for guilds");
    }

    async fn tenant_discovered(&self, tenant: &str, installer: &dyn CommandInstaller) {
        self.discover(tenant, installer).await;
    }

    async fn invocation(&self, invocation: &Invocation) -> Option<Reply> {
        self.guild(&invocation.tenant)?
            .handle_invocation(invocation)
            .await
    }

    async fn click(&self, click: &Click) -> Option<Reply> {
        self.guild(&click.tenant)?.handle_click(click).await
    }

    async fn message(&self, message: &ChannelMessage) -> Vec<String> {
        match self.guild(&message.tenant) {
            Some(guild) => guild.handle_message(message).await,
            None => Vec::new(),
        }
    }
}
