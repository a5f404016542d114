use clap::Subcommand;
use hearlab_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file location
    Path,
    /// List all config values as JSON
    Show,
    /// Set a config value
    Set {
        /// Config key (e.g. "api.base_url", "participant.consent")
        key: String,
        /// New value
        value: String,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::default_path().display());
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            set_key(&mut config, &key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

fn set_key(config: &mut Config, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    match key {
        "api.base_url" => config.api.base_url = value.to_string(),
        "api.timeout_secs" => config.api.timeout_secs = value.parse()?,
        "participant.participant_id" => {
            config.participant.participant_id = Some(value.to_string())
        }
        "participant.consent" => config.participant.consent = value.parse()?,
        "playback.device_capable" => config.playback.device_capable = value.parse()?,
        other => {
            return Err(format!("unknown key: {other}").into());
        }
    }
    Ok(())
}
