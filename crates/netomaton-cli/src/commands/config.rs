//! Config command implementation.

use anyhow::Result;

use crate::config::Config;

/// Show current configuration.
pub fn show(config: &Config) -> Result<()> {
    println!("Netomaton CLI Configuration");
    println!("{:-<40}", "");

    println!(
        "Output Directory:    {}",
        config
            .output_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "Seed:                {}",
        config
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("Execution:           {}", config.evolution_config()?.execution);

    if let Some(config_path) = Config::config_file_path() {
        println!("\nConfig file: {}", config_path.display());
    }

    Ok(())
}
