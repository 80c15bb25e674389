//! `dzkeeper genmods` - rebuild the mod list.

use anyhow::Result;

use crate::config::Config;
use crate::mods;

pub fn execute(config: &Config) -> Result<()> {
    let list = mods::generate_mod_list(&config.mods, &config.server.mods_file)?;
    println!(
        "Wrote {} mods to {}",
        list.len(),
        config.server.mods_file.display()
    );
    for name in &list {
        println!("  {name}");
    }
    Ok(())
}
