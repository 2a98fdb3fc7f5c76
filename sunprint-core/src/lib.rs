//! Sunprint Core - raster editing and print-on-demand orchestration
//!
//! This crate turns a generated solar image into merchandise: it edits the
//! image on a raster canvas and drives the network pipeline that turns the
//! result into mockups and a published product.
//!
//! # Features
//!
//! - Deterministic render pipeline: rotation, flips, color pass, vignette, text overlay
//! - Destructive crop and text burn-in with a 10 px minimum crop
//! - Catalog resolution with a provider preference list
//! - Strictly sequential mockup queue with per-item failure isolation
//! - Checkout state machine with bounded polling and a fallback storefront link
//! - Per-kind request slots with cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use sunprint_core::{ClientConfig, Edit, MockBackend, Rotation, SessionState};
//!
//! # async fn example() -> sunprint_core::Result<()> {
//! let mut session = SessionState::new(Arc::new(MockBackend::demo()), ClientConfig::default());
//! session.select(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(), 171);
//!
//! // Fetch a preview and make it the source image
//! let task = session.begin_preview()?;
//! session.finish_preview(task.run().await)?;
//!
//! // Every edit re-renders the canvas
//! session.apply_edit(Edit::Rotation(Rotation::Deg90))?;
//! session.apply_edit(Edit::Brightness(20))?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod edit;
pub mod error;
pub mod generation;
pub mod health;
pub mod mockup;
pub mod pipeline;
pub mod raster;
pub mod retry;
pub mod session;

// Re-export main types for convenience
pub use backend::{Backend, MockBackend};
pub use cache::{HqCache, HqEntry};
pub use cancel::{CancelToken, Completed, RequestSlot, Task};
pub use catalog::{default_templates, CatalogResolver, ProductTemplate, ResolvedIds};
pub use checkout::{CheckoutOrchestrator, CheckoutSession, CheckoutStep};
pub use config::{CallClass, ClientConfig, Timeouts};
pub use edit::{
    Color, CropAspect, CropRect, Edit, EditState, Rotation, TextEdit, TextOverlay, VignetteFade,
};
pub use error::{Result, SunprintError};
pub use generation::{Generator, Selection};
pub use health::HealthStatus;
pub use mockup::{MockupEvent, MockupGenerator, MockupRecord, MockupReport, MockupStore};
pub use raster::{FontBook, RasterBuffer, MIN_CROP_PX};
pub use retry::{PollOutcome, RetryPolicy, Tick};
pub use session::{HqStep, SessionState};

// HTTP transport (enabled by default)
#[cfg(feature = "http")]
pub use backend::HttpBackend;
