use clap::Subcommand;
use studylamp_core::{Config, ConfigError};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one engine setting
    Get {
        /// Dotted key (e.g. "visibility.min_distraction_seconds", "store.backend")
        key: String,
    },
    /// Change one engine setting and save it
    Set {
        /// Dotted key
        key: String,
        /// New value, parsed as the setting's type
        value: String,
    },
    /// Print all settings as JSON
    List {
        /// Only this section: "visibility", "timer" or "store"
        section: Option<String>,
    },
    /// Print where the config file lives
    Path,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            tracing::debug!(%key, "config updated");
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List { section } => {
            let config = Config::load()?;
            let mut tree = serde_json::to_value(&config)?;
            if let Some(section) = section {
                tree = tree
                    .get_mut(&section)
                    .map(serde_json::Value::take)
                    .ok_or(ConfigError::UnknownKey(section))?;
            }
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
