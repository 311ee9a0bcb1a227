use std::path::Path;

use fleet_core::config::WarnLevel;

use crate::wiring;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load(config_path)?;
    let warnings = config.validate();
    for warning in &warnings {
        match warning.level {
            WarnLevel::Warning => println!("warning: {}", warning.message),
            WarnLevel::Error => println!("error: {}", warning.message),
        }
    }

    let services = wiring::build_catalog(&config, &wiring::detached);
    let commands = services.catalog.instantiate("check").commands();
    println!("commands: {}", commands.join(", "));

    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("{errors} configuration error(s) in {}", config_path.display());
    }
    Ok(())
}
