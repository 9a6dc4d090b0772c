//! CLI command: `switchyard providers`

use crate::app::App;

/// Run the providers subcommand.
pub fn run(app: &App) -> anyhow::Result<()> {
    let registry = app.orchestrator.registry();

    println!();
    println!("  Providers");
    println!("  {}", "-".repeat(72));
    if registry.is_empty() {
        println!("  (none; set DEEPSEEK_API_KEY, ZHIPU_API_KEY, ALI_API_KEY or MOONSHOT_API_KEY)");
    }
    for provider in registry.iter() {
        println!(
            "  {:<14} {:<18} {:<20} {}{}",
            provider.id,
            provider.kind.to_string(),
            provider.model,
            provider.base_url,
            if provider.enabled { "" } else { "  (disabled)" }
        );
    }
    println!();
    Ok(())
}
