use color_eyre::eyre::Result;

use crate::config::{config_path, UserConfig};
use crate::data::history_store::database_path;
use crate::logging::daemon_log_pattern;

pub fn run(path: bool, reset: bool) -> Result<()> {
    let config_file = config_path();

    if path {
        println!("Config:   {}", config_file.display());
        println!("Database: {}", database_path().display());
        println!("Logs:     {}", daemon_log_pattern().display());
        return Ok(());
    }

    if reset {
        let config = UserConfig::default();
        config.save()?;
        println!("Config reset to defaults at: {}", config_file.display());
        println!("Restart the daemon to apply: wattwise daemon restart");
        return Ok(());
    }

    let config = UserConfig::load();
    println!("Config file: {}", config_file.display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
