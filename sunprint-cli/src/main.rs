//! Sunprint CLI - edit solar images and turn them into merchandise.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage or configuration error
  65  Validation failed (bad edit value, product not ready, HQ image missing)
  66  Input file missing or unreadable
  69  Backend unreachable or request rejected
  74  Output file could not be written";

#[derive(Parser)]
#[command(name = "sunprint")]
#[command(author, version, about = "Solar image editing and print-on-demand checkout", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Use the built-in offline backend instead of SUNPRINT_API_BASE
    #[arg(long, global = true)]
    mock: bool,

    /// Show debug logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print results, no progress
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Date and wavelength to generate.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Observation date (YYYY-MM-DD)
    #[arg(long, value_parser = utils::parse_date)]
    pub date: chrono::NaiveDate,

    /// Wavelength in angstroms
    #[arg(long, default_value_t = 171)]
    pub wavelength: u32,
}

/// Edits applied to an image, in render order.
#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Rotation in degrees (0, 90, 180, 270)
    #[arg(long, default_value_t = 0)]
    pub rotate: u16,

    /// Mirror left to right
    #[arg(long)]
    pub flip_h: bool,

    /// Mirror top to bottom
    #[arg(long)]
    pub flip_v: bool,

    /// Brightness offset (-100..100)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub brightness: i32,

    /// Contrast (-100..100)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub contrast: i32,

    /// Saturation percentage (0..200)
    #[arg(long, default_value_t = 100)]
    pub saturation: i32,

    /// Invert colors
    #[arg(long)]
    pub invert: bool,

    /// Vignette strength (0..100)
    #[arg(long, default_value_t = 0)]
    pub vignette: u8,

    /// Vignette feather (0..100)
    #[arg(long, default_value_t = 0)]
    pub feather: u8,

    /// Vignette fade: black, white, transparent or #rrggbb
    #[arg(long, value_parser = utils::parse_fade)]
    pub fade: Option<sunprint_core::VignetteFade>,

    /// Crop to x,y,width,height (canvas pixels, after rotation)
    #[arg(long, value_parser = utils::parse_rect)]
    pub crop: Option<sunprint_core::CropRect>,

    /// Crop aspect: free or w:h
    #[arg(long, default_value = "free")]
    pub aspect: sunprint_core::CropAspect,

    /// Lock the crop aspect to a product's print area (e.g. poster_matte)
    #[arg(long, conflicts_with = "aspect")]
    pub fit_product: Option<String>,

    /// Text to draw over the image
    #[arg(long)]
    pub text: Option<String>,

    /// Text center as x,y (defaults to the image center)
    #[arg(long, value_parser = utils::parse_point)]
    pub text_at: Option<(f32, f32)>,

    /// Font size in pixels
    #[arg(long)]
    pub font_size: Option<f32>,

    /// TrueType/OpenType font file for the text
    #[arg(long, value_name = "FONT")]
    pub font: Option<PathBuf>,

    /// Text fill color (#rrggbb)
    #[arg(long)]
    pub fill: Option<sunprint_core::Color>,

    /// Text stroke color (#rrggbb)
    #[arg(long)]
    pub stroke: Option<sunprint_core::Color>,

    /// Text stroke width in pixels
    #[arg(long)]
    pub stroke_width: Option<f32>,

    /// Draw only the text outline
    #[arg(long)]
    pub outlined: bool,

    /// Make the text part of the image
    #[arg(long, requires = "text")]
    pub burn_in: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend is up and show the storefront domain
    Health,

    /// Apply edits to a local image and write the result as PNG
    Edit {
        /// Image to edit
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Where to write the rendered PNG
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        edits: EditArgs,

        /// Print the final edit state as JSON
        #[arg(long)]
        print_state: bool,
    },

    /// Fetch a generated preview (or the HQ render) and save it
    Preview {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Where to write the PNG
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Fetch the high-quality render instead of the preview
        #[arg(long)]
        hq: bool,
    },

    /// Resolve products against the catalog, or browse it
    Catalog {
        /// Only list blueprints whose title or id contains this
        #[arg(long)]
        query: Option<String>,

        /// Add a blueprint from the catalog as a product
        #[arg(long, value_name = "BLUEPRINT_ID")]
        add: Option<u64>,
    },

    /// Generate mockups for every ready product
    Mockups {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Use this image instead of the generated preview
        #[arg(long, value_name = "IMAGE")]
        input: Option<PathBuf>,
    },

    /// Order a product printed with the HQ render
    Checkout {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Product template id (see `sunprint catalog`)
        #[arg(long)]
        product: String,

        #[command(flatten)]
        edits: EditArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = commands::Context {
        mock: cli.mock,
        quiet: cli.quiet,
    };
    let result = match cli.command {
        Commands::Health => commands::health::execute(&ctx).await,
        Commands::Edit {
            input,
            output,
            edits,
            print_state,
        } => commands::edit::execute(&ctx, input, output, edits, print_state),
        Commands::Preview {
            selection,
            output,
            hq,
        } => commands::preview::execute(&ctx, selection, output, hq).await,
        Commands::Catalog { query, add } => commands::catalog::execute(&ctx, query, add).await,
        Commands::Mockups { selection, input } => {
            commands::mockups::execute(&ctx, selection, input).await
        }
        Commands::Checkout {
            selection,
            product,
            edits,
        } => commands::checkout::execute(&ctx, selection, product, edits).await,
    };

    match result {
        Ok(()) => ExitCode::success().into(),
        Err(err) => {
            let exit = ExitCode::from_anyhow(&err);
            exit.report();
            exit.into()
        }
    }
}
