use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use fleet_core::config::WarnLevel;
use fleet_core::registry::{Dispatch, Fleet};
use tracing::{error, info, warn};

use crate::{discord, wiring};

pub fn run(config_path: &Path, token: &str, rcon_password: Option<String>) -> anyhow::Result<()> {
    let mut config = super::load(config_path)?;
    if let Some(password) = rcon_password {
        match config.minecraft.as_mut() {
            Some(mc) => mc.rcon_password = password,
            None => warn!("rcon password given but minecraft is not configured"),
        }
    }
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => warn!("{}", warning.message),
            WarnLevel::Error => error!("{}", warning.message),
        }
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let services = if wiring::needs_cluster(&config) {
            let client = kube::Client::try_default()
                .await
                .context("connecting to the kubernetes api")?;
            wiring::build_catalog(&config, &wiring::kube_clusters(client))
        } else {
            wiring::build_catalog(&config, &wiring::detached)
        };

        if let Some(minecraft) = &services.minecraft {
            match minecraft.connect().await {
                Ok(()) => info!("rcon connected"),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "rcon unreachable; retrying on first command")
                }
            }
        }

        let relay_messages = services.catalog.has_operands();
        if !relay_messages {
            info!("no console relay configured; not requesting message content");
        }
        let intents = discord::intents(relay_messages);
        let dispatch: Arc<dyn Dispatch> = match &config.discord.guild_id {
            Some(guild) => {
                info!(guild = %guild, "serving a single guild");
                Arc::new(services.catalog.instantiate(guild))
            }
            None => {
                info!("serving every guild the bot joins");
                Arc::new(Fleet::new(services.catalog))
            }
        };
        discord::serve(token, dispatch, intents).await
    })
}
