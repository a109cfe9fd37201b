use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use steady_core::pipeline::RegistrationConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Frame height in pixels
    #[arg(long)]
    pub ly: Option<usize>,

    /// Frame width in pixels
    #[arg(long)]
    pub lx: Option<usize>,

    /// Directory holding the binary streams
    #[arg(long)]
    pub save_path: Option<PathBuf>,

    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default RegistrationConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let defaults = RegistrationConfig::default();
    let config = RegistrationConfig {
        ly: args.ly.unwrap_or(defaults.ly),
        lx: args.lx.unwrap_or(defaults.lx),
        save_path: args.save_path.clone().unwrap_or(defaults.save_path.clone()),
        ..defaults
    };
    config.validate()?;
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
