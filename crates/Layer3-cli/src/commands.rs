//! Subcommand implementations

use serde::Serialize;
use stencil_core::{DiscoveryReport, PluginRegistry, PluginSummary};
use stencil_foundation::{JsonStore, RuntimeConfig, RUNTIME_CONFIG_FILE};
use tracing::warn;

/// stencil init
pub fn init(config: &RuntimeConfig, force: bool) -> anyhow::Result<()> {
    let store = JsonStore::current_project()?;
    if store.exists(RUNTIME_CONFIG_FILE) && !force {
        println!(
            "{} already exists. Use --force to overwrite.",
            store.file_path(RUNTIME_CONFIG_FILE).display()
        );
        return Ok(());
    }

    config.save_project()?;
    println!("✓ Wrote {}", store.file_path(RUNTIME_CONFIG_FILE).display());
    Ok(())
}

/// stencil list
pub async fn list(registry: &PluginRegistry, json: bool) -> anyhow::Result<()> {
    let plugins = registry.list_all().await;
    if json {
        return print_json(&plugins);
    }
    if plugins.is_empty() {
        println!("No plugins found.");
        println!("Add a directory with --plugin-path or pluginPaths in {}.", RUNTIME_CONFIG_FILE);
        return Ok(());
    }

    print_table(&plugins);
    Ok(())
}

/// stencil search <query>
pub async fn search(registry: &PluginRegistry, query: &str, json: bool) -> anyhow::Result<()> {
    let plugins = registry.search(query).await;
    if json {
        return print_json(&plugins);
    }
    if plugins.is_empty() {
        println!("No plugins match '{}'.", query);
        return Ok(());
    }

    print_table(&plugins);
    Ok(())
}

/// stencil info <id>
pub async fn info(registry: &PluginRegistry, id: &str, json: bool) -> anyhow::Result<()> {
    let summary = registry
        .info(id)
        .await
        .ok_or_else(|| anyhow::anyhow!("Plugin not found: {}", id))?;
    if json {
        return print_json(&summary);
    }

    println!("\n{} ({})", summary.name, summary.id);
    println!("{}", "-".repeat(60));
    println!("{:<14} {}", "Version", summary.version);
    println!("{:<14} {}", "State", summary.state);
    if let Some(author) = &summary.author {
        println!("{:<14} {}", "Author", author);
    }
    if !summary.description.is_empty() {
        println!("{:<14} {}", "Description", summary.description);
    }
    println!("{:<14} {}", "Source", summary.source);

    let capabilities: Vec<&str> = summary.capabilities.iter().map(|c| c.as_str()).collect();
    println!("{:<14} {}", "Capabilities", join_or_none(&capabilities));
    let dependencies: Vec<&str> = summary.dependencies.iter().map(String::as_str).collect();
    println!("{:<14} {}", "Depends on", join_or_none(&dependencies));

    if let Some(descriptor) = registry.descriptor(id).await {
        if let Some(schema) = &descriptor.config_schema {
            println!("\nConfig schema:\n{}", serde_json::to_string_pretty(schema)?);
        }
    }
    println!();
    Ok(())
}

/// stencil order [--reverse]
pub async fn order(registry: &PluginRegistry, reverse: bool, json: bool) -> anyhow::Result<()> {
    let mut order = match registry.load_order().await {
        Ok(order) => order,
        Err(_) => {
            let cycles = registry.cycles().await;
            if json {
                print_json(&serde_json::json!({ "cycles": cycles }))?;
            } else {
                eprintln!("Dependency cycles detected:");
                for cycle in &cycles {
                    eprintln!("  {}", cycle.join(" -> "));
                }
            }
            anyhow::bail!("cannot compute load order while {} cycle(s) exist", cycles.len());
        }
    };
    if reverse {
        order.reverse();
    }

    if json {
        return print_json(&order);
    }
    for (i, id) in order.iter().enumerate() {
        println!("{:>3}. {}", i + 1, id);
    }
    Ok(())
}

/// stencil check
pub async fn check(registry: &PluginRegistry, json: bool) -> anyhow::Result<()> {
    let checks = registry.check_all().await;
    let failing = checks.iter().filter(|c| !c.is_ok()).count();

    if json {
        print_json(&checks)?;
    } else {
        for check in &checks {
            if check.is_ok() {
                println!("✓ {}", check.id);
                continue;
            }
            println!("✗ {}", check.id);
            for failure in &check.compatibility.failures {
                println!("    - {}", failure);
            }
            for unmet in &check.unmet {
                println!("    - requires {}", unmet);
            }
            if let Some(cycle) = &check.cycle {
                println!("    - dependency cycle: {}", cycle.join(" -> "));
            }
        }
        println!(
            "\n{} plugin(s) checked against host {}, {} failing.",
            checks.len(),
            registry.config().host_version,
            failing
        );
    }

    if failing > 0 {
        anyhow::bail!("{} plugin(s) failed checks", failing);
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

/// 건너뛴 매니페스트를 경고로 남기고 개수 반환
pub fn warn_skipped(report: &DiscoveryReport) -> usize {
    for error in &report.errors {
        warn!(path = %error.source_path.display(), "Skipped manifest: {}", error.message);
    }
    report.errors.len()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(plugins: &[PluginSummary]) {
    println!("\n{:<28} {:<10} {:<12} {:<30}", "ID", "Version", "State", "Name");
    println!("{}", "-".repeat(80));
    for plugin in plugins {
        println!(
            "{:<28} {:<10} {:<12} {:<30}",
            truncate(&plugin.id, 28),
            truncate(&plugin.version, 10),
            plugin.state.as_str(),
            truncate(&plugin.name, 30)
        );
    }
    println!();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn join_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
