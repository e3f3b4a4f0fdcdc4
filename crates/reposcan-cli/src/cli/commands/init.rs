use anyhow::Result;

use super::helpers::load_settings;

pub async fn cmd_init(config_path: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config_path)?;
    println!("output directory tree ready at {}", settings.base_output_dir.display());
    Ok(())
}
