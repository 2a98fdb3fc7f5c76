//! Catalog command implementation.

use anyhow::{Context as _, Result};
use colored::Colorize;
use sunprint_core::ProductTemplate;
use tracing::info;

use super::{resolve_catalog, Context};
use crate::utils;

/// Execute the catalog command.
///
/// Without flags it lists the built-in products and whether each one is
/// ready to order.
pub async fn execute(ctx: &Context, query: Option<String>, add: Option<u64>) -> Result<()> {
    let mut session = ctx.session()?;

    if let Some(query) = query {
        ctx.progress("Fetching the print catalog");
        let found = session
            .browse_catalog(&query)
            .await
            .context("Catalog browse failed")?;
        info!(query = %query, count = found.len(), "Catalog browsed");
        if found.is_empty() {
            println!("{}", "No matching products".yellow());
        }
        for blueprint in found {
            let brand = blueprint.brand.as_deref().unwrap_or("-");
            println!("{:>6}  {}  {}", blueprint.id, blueprint.title.bold(), brand.dimmed());
        }
        return Ok(());
    }

    if let Some(blueprint_id) = add {
        ctx.progress("Fetching the print catalog");
        session
            .browse_catalog("")
            .await
            .context("Catalog browse failed")?;
        let id = session.add_catalog_product(blueprint_id).await?;
        if let Some(template) = session.template(&id) {
            print_template(template);
        }
        return Ok(());
    }

    let resolved = resolve_catalog(ctx, &mut session).await;
    info!(resolved, "Catalog resolved");
    for template in session.templates() {
        print_template(template);
    }
    Ok(())
}

fn print_template(template: &ProductTemplate) {
    let status = match template.resolved() {
        Some(ids) => format!(
            "{}/{}/{}",
            ids.blueprint_id, ids.provider_id, ids.variant_id
        )
        .green(),
        None => "not ready".yellow(),
    };
    println!(
        "{:<22} {:<26} {:>8}  {:<16} {}",
        template.id,
        template.display_name.bold(),
        utils::format_price(template.unit_price_cents),
        status,
        template.aspect.to_string().dimmed()
    );
}
