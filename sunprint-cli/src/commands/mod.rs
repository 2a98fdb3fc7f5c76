//! Command implementations and the session steps they share.

pub mod catalog;
pub mod checkout;
pub mod edit;
pub mod health;
pub mod mockups;
pub mod preview;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use colored::Colorize;
use sunprint_core::{
    Backend, ClientConfig, Edit, HqStep, HttpBackend, MockBackend, Rotation, SessionState,
    TextEdit,
};
use tracing::{debug, info, warn};

use crate::{EditArgs, SelectionArgs};

/// Global flags.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub mock: bool,
    pub quiet: bool,
}

impl Context {
    /// Progress line on stderr, unless `--quiet`.
    pub fn progress(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{} {}", "::".cyan(), message.as_ref());
        }
    }

    /// Backend and config for this run.
    pub fn connect(&self) -> Result<(Arc<dyn Backend>, ClientConfig)> {
        let mut config = ClientConfig::from_env().context("Invalid configuration")?;
        // The resolver delay only matters for interactive sessions.
        config.resolver_delay = Duration::ZERO;

        if self.mock {
            warn!("Using the offline mock backend");
            return Ok((Arc::new(MockBackend::demo()), config));
        }
        let backend = HttpBackend::new(&config)?;
        info!(api_base = %config.api_base, "Using HTTP backend");
        Ok((Arc::new(backend), config))
    }

    pub fn session(&self) -> Result<SessionState> {
        let (backend, config) = self.connect()?;
        Ok(SessionState::new(backend, config))
    }
}

/// Apply every edit flag to the loaded image, in render order.
pub fn apply_edits(session: &mut SessionState, args: &EditArgs) -> Result<()> {
    let rotation = Rotation::try_from(args.rotate)?;
    let mut edits = vec![
        Edit::Rotation(rotation),
        Edit::FlipHorizontal(args.flip_h),
        Edit::FlipVertical(args.flip_v),
        Edit::Brightness(args.brightness),
        Edit::Contrast(args.contrast),
        Edit::Saturation(args.saturation),
        Edit::Invert(args.invert),
        Edit::VignetteStrength(args.vignette),
        Edit::VignetteFeather(args.feather),
        Edit::CropAspect(args.aspect),
    ];
    if let Some(fade) = args.fade {
        edits.push(Edit::VignetteFade(fade));
    }
    for edit in edits {
        session.apply_edit(edit)?;
    }

    if let Some(product) = &args.fit_product {
        let aspect = session.suggest_crop(product)?;
        debug!(%aspect, product = %product, "Crop aspect from product");
    }
    if let Some(rect) = args.crop {
        let applied = session.crop_to(rect)?;
        info!(?applied, "Cropped");
    }

    if let Some(text) = &args.text {
        apply_text(session, args, text)?;
    }
    Ok(())
}

fn apply_text(session: &mut SessionState, args: &EditArgs, text: &str) -> Result<()> {
    session.enter_text_mode()?;
    let mut edits = vec![TextEdit::Text(text.to_string())];

    if let Some(path) = &args.font {
        let family = session
            .fonts_mut()
            .load_file(path)
            .with_context(|| format!("Failed to read font: {}", path.display()))?;
        edits.push(TextEdit::FontFamily(family));
    }
    if let Some((x, y)) = args.text_at {
        edits.push(TextEdit::MoveTo { x, y });
    }
    if let Some(px) = args.font_size {
        edits.push(TextEdit::FontSize(px));
    }
    if let Some(color) = args.fill {
        edits.push(TextEdit::Fill(color));
    }
    if let Some(color) = args.stroke {
        edits.push(TextEdit::Stroke(color));
    }
    if let Some(width) = args.stroke_width {
        edits.push(TextEdit::StrokeWidth(width));
    }
    edits.push(TextEdit::Outlined(args.outlined));
    for edit in edits {
        session.apply_edit(Edit::Text(edit))?;
    }

    if args.burn_in {
        session.burn_in_text()?;
    }
    Ok(())
}

/// Fetch the preview for `selection` and make it the source image.
pub async fn load_preview(
    ctx: &Context,
    session: &mut SessionState,
    selection: &SelectionArgs,
) -> Result<()> {
    session.select(selection.date, selection.wavelength);
    ctx.progress(format!(
        "Generating {}\u{c5} preview for {}",
        selection.wavelength, selection.date
    ));
    let task = session.begin_preview()?;
    session
        .finish_preview(task.run().await)
        .context("Preview failed")?;
    Ok(())
}

/// Run both HQ phases for the current selection.
pub async fn load_hq(ctx: &Context, session: &mut SessionState) -> Result<()> {
    let download = match session.begin_hq()? {
        HqStep::Cached => return Ok(()),
        HqStep::Download(task) => task,
        HqStep::Generate(task) => {
            ctx.progress("Rendering the HQ image (this can take a minute)");
            let done = task.run().await;
            session
                .finish_hq_url(done)
                .context("HQ generation failed")?
                .context("HQ generation was superseded")?
        }
    };
    ctx.progress("Downloading the HQ image");
    session
        .finish_hq_image(download.run().await)
        .context("HQ download failed")?;
    Ok(())
}

/// Resolve product templates against the catalog.
pub async fn resolve_catalog(ctx: &Context, session: &mut SessionState) -> usize {
    let Some(task) = session.begin_catalog_resolution() else {
        return 0;
    };
    ctx.progress("Matching products against the catalog");
    session.finish_catalog_resolution(task.run().await)
}
