//! Config file commands.

use std::path::Path;

use super::ConfigCommand;
use crate::config::{self, Config};

pub fn cmd_config(path: Option<&Path>, command: &ConfigCommand) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    match command {
        ConfigCommand::Path => println!("{}", path.display()),
        ConfigCommand::Show => {
            let mut config = config::load_from(&path);
            if config.credentials.client_secret.is_some() {
                config.credentials.client_secret = Some("********".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_to(&Config::default(), &path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
