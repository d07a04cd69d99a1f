//! Init command implementation
//!
//! Writes a starter configuration with the default rule set.

use crate::cli::args::{InitArgs, OutputFormat};
use crate::cli::output::{print_output, Message};
use crate::config::{Config, ConfigFile};
use crate::error::Result;
use std::path::Path;

/// Execute the init command
pub fn run_init(args: &InitArgs, format: OutputFormat) -> Result<()> {
    let path = args.path.clone().unwrap_or_else(ConfigFile::user_path);
    write_starter(&path, args.force)?;

    print_output(
        &Message {
            message: format!("Wrote starter configuration to {}", path.display()),
            success: true,
        },
        format,
    )?;
    Ok(())
}

fn write_starter(path: &Path, force: bool) -> Result<()> {
    let config = Config::starter();
    ConfigFile::save(path, &config, force)?;
    log::info!(
        "Saved {} rules and {} channels to {}",
        config.rules.len(),
        config.channels.len(),
        path.display()
    );
    Ok(())
}
