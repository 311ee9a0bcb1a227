pub mod check;
pub mod run;

use std::path::Path;

use anyhow::Context;
use fleet_core::config::FleetConfig;

fn load(path: &Path) -> anyhow::Result<FleetConfig> {
    FleetConfig::load(path).with_context(|| format!("loading {}", path.display()))
}
