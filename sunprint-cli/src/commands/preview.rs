//! Preview command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use colored::Colorize;
use tracing::info;

use super::{load_hq, load_preview, Context};
use crate::{utils, SelectionArgs};

/// Execute the preview command.
pub async fn execute(
    ctx: &Context,
    selection: SelectionArgs,
    output: PathBuf,
    hq: bool,
) -> Result<()> {
    let mut session = ctx.session()?;
    load_preview(ctx, &mut session, &selection).await?;

    let image = if hq {
        load_hq(ctx, &mut session).await?;
        session.current_hq().context("HQ image missing after download")?
    } else {
        session.canvas().context("No image loaded")?
    };
    utils::write_png(image, &output)?;
    info!(path = %output.display(), hq, "Preview written");

    if !ctx.quiet {
        let kind = if hq { "HQ image" } else { "preview" };
        println!(
            "{} {} {} ({}x{})",
            "Saved".green(),
            kind,
            output.display(),
            image.width(),
            image.height()
        );
        if let Some(entry) = session
            .hq_cache()
            .get(selection.date, selection.wavelength)
        {
            println!("   {} {}", "Source:".dimmed(), entry.source_url);
        }
    }
    Ok(())
}
