//! CLI command: `switchyard status`
//!
//! Displays circuit state, call statistics and quota level per provider.
//! Circuits and statistics are per process; quota comes from the shared store.

use crate::app::App;
use switchyard_llm::ProviderHealth;

/// Run the status subcommand.
pub async fn run(app: &App, json: bool) -> anyhow::Result<()> {
    let health = app.orchestrator.health_snapshot().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        print_table(&health);
    }
    Ok(())
}

fn print_table(health: &[ProviderHealth]) {
    println!();
    println!("  Provider Health");
    println!("  {}", "-".repeat(72));
    println!(
        "  {:<14} {:<18} {:<10} {:<10} {:<10} Quota",
        "Provider", "Kind", "Enabled", "Circuit", "Success"
    );
    println!("  {}", "-".repeat(72));

    if health.is_empty() {
        println!("  (no providers configured)");
    }
    for entry in health {
        let success = if entry.stats.total_requests == 0 {
            "-".to_string()
        } else {
            format!("{:.0}%", entry.stats.success_rate() * 100.0)
        };
        let quota = entry
            .quota
            .as_ref()
            .map_or_else(|| "unavailable".to_string(), |q| q.level.to_string());
        println!(
            "  {:<14} {:<18} {:<10} {:<10} {:<10} {}",
            entry.provider,
            entry.kind.to_string(),
            if entry.enabled { "yes" } else { "no" },
            entry.circuit.state.to_string(),
            success,
            quota
        );
    }
    println!();
}
