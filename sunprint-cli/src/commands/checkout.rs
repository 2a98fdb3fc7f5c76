//! Checkout command implementation.

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use sunprint_core::{CheckoutSession, CheckoutStep, SunprintError};
use tracing::info;

use super::{apply_edits, load_hq, load_preview, resolve_catalog, Context};
use crate::{EditArgs, SelectionArgs};

/// Execute the checkout command.
pub async fn execute(
    ctx: &Context,
    selection: SelectionArgs,
    product: String,
    edits: EditArgs,
) -> Result<()> {
    let mut session = ctx.session()?;
    resolve_catalog(ctx, &mut session).await;
    if session.template(&product).is_none() {
        let known: Vec<&str> = session.templates().iter().map(|t| t.id.as_str()).collect();
        bail!(SunprintError::validation(format!(
            "Unknown product {product} (known: {})",
            known.join(", ")
        )));
    }

    load_preview(ctx, &mut session, &selection).await?;
    // HQ first, so a crop or burn-in reaches the print image too.
    load_hq(ctx, &mut session).await?;
    apply_edits(&mut session, &edits)?;

    let quiet = ctx.quiet;
    let task = session.begin_checkout(&product, move |progress: &CheckoutSession| {
        if !quiet && !progress.step.is_terminal() {
            eprintln!("{} {}", "::".cyan(), progress.message);
        }
    })?;
    let done = task.run().await;
    let result = session
        .finish_checkout(done)
        .context("Checkout failed")?
        .context("Checkout was superseded")?;

    match result.step {
        CheckoutStep::Done => {
            let url = result.storefront_url.as_deref().unwrap_or_default();
            info!(
                product = %result.template_id,
                fallback = result.used_fallback,
                "Checkout done"
            );
            println!("{} {}", "Ready:".green().bold(), result.display_name);
            println!("   {} {}", "Link:".dimmed(), url);
            if result.used_fallback {
                println!(
                    "   {}",
                    "The product page is still publishing; this link opens the shop.".yellow()
                );
            }
            Ok(())
        }
        _ => {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| SunprintError::validation(result.message.clone()));
            bail!(error)
        }
    }
}
