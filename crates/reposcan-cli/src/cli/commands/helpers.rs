use anyhow::Result;
use reposcan_core::config::Settings;

pub fn load_settings(config_path: Option<&std::path::Path>) -> Result<Settings> {
    let settings = Settings::load(config_path)?;
    settings.ensure_directories()?;
    Ok(settings)
}
