//! Edit command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use colored::Colorize;
use tracing::info;

use super::{apply_edits, Context};
use crate::{utils, EditArgs};

/// Execute the edit command. Never touches the network.
pub fn execute(
    ctx: &Context,
    input: PathBuf,
    output: PathBuf,
    edits: EditArgs,
    print_state: bool,
) -> Result<()> {
    let bytes = utils::read_input(&input)?;
    let mut session = ctx.session()?;
    session
        .load_source_bytes(&bytes)
        .with_context(|| format!("Failed to decode image: {}", input.display()))?;

    apply_edits(&mut session, &edits)?;

    let canvas = session
        .canvas()
        .context("No image loaded")?;
    utils::write_png(canvas, &output)?;
    info!(
        path = %output.display(),
        width = canvas.width(),
        height = canvas.height(),
        "Edited image written"
    );

    if print_state {
        println!("{}", serde_json::to_string_pretty(session.edits())?);
    } else if !ctx.quiet {
        println!(
            "{} {} ({}x{})",
            "Wrote".green(),
            output.display(),
            canvas.width(),
            canvas.height()
        );
    }
    Ok(())
}
