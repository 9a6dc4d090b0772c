//! CLI command: `switchyard quota`
//!
//! Displays per-provider spend against daily and monthly limits and the
//! current request window.

use crate::app::App;
use switchyard_llm::{QuotaLevel, QuotaStatus};

/// Run the quota subcommand.
pub async fn run(app: &App, json: bool, watch: bool) -> anyhow::Result<()> {
    if watch {
        run_watch(app).await
    } else if json {
        run_json(app).await
    } else {
        run_table(app).await
    }
}

/// Pretty-printed table output.
async fn run_table(app: &App) -> anyhow::Result<()> {
    let statuses = app.orchestrator.quota().quota_status().await?;

    println!();
    println!("  Provider Quota");
    println!("  {}", "-".repeat(76));
    println!(
        "  {:<14} {:<22} {:<22} {:<10} Level",
        "Provider", "Daily", "Monthly", "Requests"
    );
    println!("  {}", "-".repeat(76));

    if statuses.is_empty() {
        println!("  (no providers configured)");
    }
    for status in &statuses {
        println!("  {}", format_row(status));
    }
    println!();
    Ok(())
}

/// JSON output for scripting.
async fn run_json(app: &App) -> anyhow::Result<()> {
    let statuses = app.orchestrator.quota().quota_status().await?;
    let output = serde_json::json!({ "providers": statuses });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Watch mode: refresh display every two seconds.
async fn run_watch(app: &App) -> anyhow::Result<()> {
    loop {
        // Clear screen
        print!("\x1b[2J\x1b[H");
        run_table(app).await?;
        println!("  (refreshing every 2s, Ctrl+C to exit)");
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    }
}

// ── helpers ──────────────────────────────────────────────────────────────

fn format_spend(used: f64, limit: f64) -> String {
    format!("${used:.2} / ${limit:.2}")
}

fn format_row(status: &QuotaStatus) -> String {
    let level = if status.enabled {
        match status.level {
            QuotaLevel::Normal => status.level.to_string(),
            _ => format!("{} !!", status.level),
        }
    } else {
        "disabled".to_string()
    };
    format!(
        "{:<14} {:<22} {:<22} {:<10} {}",
        status.provider,
        format_spend(status.daily_used, status.daily_limit),
        format_spend(status.monthly_used, status.monthly_limit),
        format!("{}/{}", status.requests_this_minute, status.requests_per_minute),
        level
    )
}
