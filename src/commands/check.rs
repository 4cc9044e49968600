//! Check command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::{example_yaml, Config};
use crate::rules::Extraction;

/// Run the check command
pub async fn run(config_path: &Path, example: bool) -> Result<()> {
    if example {
        print!("{}", example_yaml());
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let settings = config.compile()?;

    println!();
    println!("Configuration {} is valid", config_path.display());
    println!();
    println!("  Ban duration:   {}s", settings.engine.ban_duration.as_secs());
    println!("  Sweep interval: {}s", settings.engine.sweep_interval.as_secs());
    println!("  Firewall:       {:?}", settings.backend);
    println!(
        "  Dispatch:       {} worker(s), queue of {}",
        settings.dispatch.workers, settings.dispatch.queue_capacity
    );
    println!("  Whitelist:      {} entrie(s)", settings.whitelist.len());
    println!();
    println!("  Rules:");
    for rule in settings.matcher.rules() {
        let extraction = match &rule.extraction {
            Extraction::Position(n) => format!("IPv4 #{}", n),
            Extraction::Pattern(re) => format!("pattern {}", re.as_str()),
        };
        println!("    - {:<24} {} -> {}", rule.name, rule.pattern.as_str(), extraction);
    }
    println!();
    Ok(())
}
