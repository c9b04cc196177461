//! `advisor status` output.
//!
//! Builds the collaborators the same way `advisor serve` would and prints
//! one row per collaborator with its availability.

use anyhow::Result;

use crate::config::Config;
use crate::context::AppContext;

/// Print the collaborator table for `advisor status`.
pub fn print_status(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config.clone())?;

    let store_target = config.store.url.as_deref().unwrap_or("-");
    let completion_target = format!(
        "{} ({})",
        config.completion.model,
        config.completion.resolved_base_url()
    );

    println!("{:<12} {:<10} {:<44} STATUS", "COLLABORATOR", "PROVIDER", "TARGET");
    println!(
        "{:<12} {:<10} {:<44} {}",
        "store",
        "supabase",
        store_target,
        ctx.store.status()
    );
    println!(
        "{:<12} {:<10} {:<44} {}",
        "completion",
        config.completion.provider,
        completion_target,
        ctx.completion.status()
    );
    println!();
    println!("bind: {}", config.server.bind);
    println!(
        "default time range: {} days",
        config.analysis.default_time_range_days
    );

    Ok(())
}
