//! `harvest list` and `harvest get`: cache-aside reads.

use console::style;

use harvester::cache::{CatalogService, LookupSource};
use harvester::HarvestConfig;

use super::helpers::{cancel_on_ctrl_c, spinner};

fn report_degraded(source: LookupSource) {
    match source {
        LookupSource::Stale => eprintln!(
            "{} Upstream unavailable, showing cached data",
            style("!").yellow()
        ),
        LookupSource::Missing => eprintln!(
            "{} Upstream unavailable and nothing cached",
            style("✗").red()
        ),
        _ => {}
    }
}

pub async fn cmd_list(config: &HarvestConfig, refresh: bool, json: bool) -> anyhow::Result<()> {
    let service = CatalogService::from_config(config)?;
    cancel_on_ctrl_c(service.cancel_token());

    let pb = spinner("Loading catalog...");
    let lookup = service.lookup_collection(refresh).await;
    pb.finish_and_clear();
    report_degraded(lookup.source);

    let items = lookup.value.unwrap_or_default();
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("{} No items", style("!").yellow());
        return Ok(());
    }

    for item in &items {
        match &item.url {
            Some(url) => println!("{:<24} {}", item.id, style(url).dim()),
            None => println!("{}", item.id),
        }
    }
    println!(
        "\n{} items ({})",
        style(items.len()).bold(),
        lookup.source.as_str()
    );
    Ok(())
}

pub async fn cmd_get(config: &HarvestConfig, id: &str, refresh: bool) -> anyhow::Result<()> {
    let service = CatalogService::from_config(config)?;
    cancel_on_ctrl_c(service.cancel_token());

    let pb = spinner(&format!("Fetching {}...", id));
    let lookup = service.lookup_item(id, refresh).await;
    pb.finish_and_clear();

    match lookup.value {
        Some(item) => {
            report_degraded(lookup.source);
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }
        None => anyhow::bail!("Item '{}' not found", id),
    }
}
