//! Mockups command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use sunprint_core::MockupEvent;
use tracing::info;

use super::{load_preview, resolve_catalog, Context};
use crate::{utils, SelectionArgs};

/// Execute the mockups command.
pub async fn execute(
    ctx: &Context,
    selection: SelectionArgs,
    input: Option<PathBuf>,
) -> Result<()> {
    let mut session = ctx.session()?;
    let resolved = resolve_catalog(ctx, &mut session).await;
    if resolved == 0 {
        bail!(sunprint_core::SunprintError::validation(
            "No products are ready for mockups"
        ));
    }

    match &input {
        Some(path) => {
            let bytes = utils::read_input(path)?;
            session.select(selection.date, selection.wavelength);
            session
                .load_source_bytes(&bytes)
                .with_context(|| format!("Failed to decode image: {}", path.display()))?;
        }
        None => load_preview(ctx, &mut session, &selection).await?,
    }

    let quiet = ctx.quiet;
    let on_event = move |event: MockupEvent| {
        if quiet {
            return;
        }
        match event {
            MockupEvent::Uploaded { asset_id } => {
                eprintln!("{} Uploaded design as {}", "::".cyan(), asset_id);
            }
            MockupEvent::Started {
                index,
                total,
                display_name,
            } => {
                eprintln!(
                    "{} Creating mockup {}/{}: {}",
                    "::".cyan(),
                    index,
                    total,
                    display_name
                );
            }
            MockupEvent::Created { .. } => {}
            MockupEvent::Failed { template_id, error } => {
                eprintln!(
                    "{} {} failed: {}",
                    "!!".yellow(),
                    template_id,
                    error.user_message()
                );
            }
        }
    };

    let Some(task) = session.begin_mockups(on_event)? else {
        println!("{}", "Every product already has a mockup".dimmed());
        return Ok(());
    };
    let report = session
        .finish_mockups(task.run().await)
        .context("Mockup generation failed")?
        .context("Mockups were superseded by a new image")?;
    info!(
        created = report.records.len(),
        failed = report.failures.len(),
        "Mockups finished"
    );

    for (template_id, record) in &report.records {
        let name = session
            .template(template_id)
            .map(|t| t.display_name.as_str())
            .unwrap_or(template_id);
        let url = record
            .default_image()
            .map(|img| img.url.as_str())
            .unwrap_or("-");
        println!("{} {:<26} {}", "ok".green().bold(), name, url);
    }
    for failure in &report.failures {
        println!(
            "{} {:<26} {}",
            "failed".red().bold(),
            failure.template_id,
            failure.error.user_message()
        );
    }
    Ok(())
}
