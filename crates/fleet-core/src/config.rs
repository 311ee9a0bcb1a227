use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Install into this guild only. Absent: every guild the bot joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinecraftConfig {
    pub rcon_address: String,
    #[serde(default)]
    pub rcon_password: String,
    pub approver_role: String,
    /// Channel whose messages are relayed to the console.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcon_channel_id: Option<String>,
    #[serde(default = "default_rcon_timeout_ms")]
    pub rcon_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnects: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statefulset: Option<StatefulSetConfig>,
    #[serde(default)]
    pub restart: RestartMethod,
}

/// How `/restart` brings the Minecraft server down and up again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMethod {
    /// The server's own `restart` console command.
    #[default]
    Rcon,
    /// Stamp the statefulset's pod template and let it roll.
    Rollout,
}

fn default_rcon_timeout_ms() -> u64 {
    1_000
}

/// Where wind-down and wake-up scale the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatefulSetConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_field_manager() -> String {
    "fleetbot".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValheimConfig {
    pub query_address: String,
    pub approver_role: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_pod_label_key")]
    pub pod_label_key: String,
    #[serde(default = "default_pod_label_value")]
    pub pod_label_value: String,
}

fn default_pod_label_key() -> String {
    "app".to_string()
}

fn default_pod_label_value() -> String {
    "valheim".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

fn default_debounce_seconds() -> u64 {
    10
}

fn default_poll_interval_seconds() -> u64 {
    10
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

impl WorkflowConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

// ---------------------------------------------------------------------------
// FleetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft: Option<MinecraftConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valheim: Option<ValheimConfig>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: FleetConfig = serde_yaml::from_str(data)?;
        if config.minecraft.is_none() && config.valheim.is_none() {
            return Err(FleetError::InvalidConfig(
                "configure at least one of 'minecraft' or 'valheim'".to_string(),
            ));
        }
        Ok(config)
    }

    /// Suspicious but loadable settings.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(mc) = &self.minecraft {
            if mc.approver_role.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "minecraft.approver_role is empty; nobody can approve or override"
                        .to_string(),
                });
            }
            if mc.rcon_password.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "minecraft.rcon_password is empty".to_string(),
                });
            }
            if mc.statefulset.is_none() && mc.restart == RestartMethod::Rollout {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "minecraft.restart is 'rollout' but minecraft.statefulset is not set"
                        .to_string(),
                });
            }
            if mc.statefulset.is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "minecraft.statefulset not set; /winddown and /wakeup are disabled"
                        .to_string(),
                });
            }
        }

        if let Some(vh) = &self.valheim {
            if vh.approver_role.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "valheim.approver_role is empty; nobody can override".to_string(),
                });
            }
        }

        if self.minecraft.is_some() && self.valheim.is_some() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "both minecraft and valheim are configured; \
                          /restart and /players are registered for minecraft only"
                    .to_string(),
            });
        }

        if self.workflow.debounce_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "workflow.debounce_seconds is 0; retries are not rate limited".to_string(),
            });
        }

        warnings
    }
}
