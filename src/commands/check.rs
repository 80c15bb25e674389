//! `dzkeeper check` - validate the configuration and show derived values.

use anyhow::Result;

use crate::config::{Config, ValidationResult};
use crate::mods;
use crate::process::LaunchSpec;

pub fn execute(config: &Config, validation: &ValidationResult) -> Result<()> {
    for warning in &validation.warnings {
        println!("warning: {warning}");
    }

    let mod_list = mods::read_mod_list(&config.server.mods_file)?;
    let spec = LaunchSpec::from_config(&config.server, &mod_list);
    println!("Configuration OK");
    println!("  launch:    {} {}", spec.program.display(), spec.args.join(" "));
    println!("  cwd:       {}", spec.cwd.display());
    println!(
        "  readiness: {}",
        config.readiness_endpoint().as_deref().unwrap_or("disabled")
    );
    println!("  logs:      {}/*.{}", config.killfeed.log_dir.display(), config.killfeed.log_extension);
    Ok(())
}
