//! Backend collaborators: the generation service and the print catalog.
//!
//! [`Backend`] covers every remote call the engine makes. Two
//! implementations ship with the crate:
//!
//! - [`HttpBackend`] talks JSON over HTTP with `reqwest` (feature `http`)
//! - [`MockBackend`] is scripted and deterministic, for tests and demos
//!
//! Implementations do not apply timeouts themselves; callers wrap each call
//! with [`Timeouts::guard`](crate::config::Timeouts::guard).

#[cfg(feature = "http")]
mod http;
mod mock;

#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use mock::MockBackend;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A product type in the print catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A size/color SKU of a blueprint and provider pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetUpload {
    pub file_name: String,
    pub contents_base64: String,
}

/// One image placed in a print area, in normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedImage {
    pub asset_id: String,
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub angle: f32,
}

impl PlacedImage {
    /// Centered, unscaled, unrotated.
    pub fn centered(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            x: 0.5,
            y: 0.5,
            scale: 1.0,
            angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub position: String,
    pub images: Vec<PlacedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariantPrice {
    pub id: u64,
    pub unit_price_cents: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockupRequest {
    pub title: String,
    pub blueprint_id: u64,
    pub provider_id: u64,
    pub variants: Vec<VariantPrice>,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockupImage {
    pub url: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupProduct {
    pub product_id: String,
    pub rendered_images: Vec<MockupImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub date: NaiveDate,
    pub wavelength: u32,
    pub mission: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewResponse {
    Ready { preview_url: String },
    /// Accepted but still rendering; ask again later.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HqRequest {
    pub date: NaiveDate,
    pub wavelength: u32,
    pub mission: String,
    pub detector: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HqTask {
    pub task_id: String,
    pub status_url: String,
}

/// HQ task state as reported by the status endpoint.
///
/// Anything other than `completed` or `failed` means the task is still
/// running, including states this client does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Queued, not picked up by a worker yet.
    Started,
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub image_url: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub image_base64: String,
    pub file_name: String,
    pub title: String,
    pub description: String,
    pub blueprint_id: u64,
    pub provider_id: u64,
    pub variant_id: u64,
    pub price_cents: u32,
    pub placement: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub remote_product_id: String,
    pub variant_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorefrontStatus {
    Pending,
    Ready { url: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub storefront_domain: Option<String>,
}

/// Remote calls used by the engine.
///
/// Implementations must be thread-safe (`Send + Sync`). Network failures map
/// to [`SunprintError::Unreachable`](crate::SunprintError::Unreachable) and
/// non-2xx answers to
/// [`SunprintError::RemoteRejected`](crate::SunprintError::RemoteRejected).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Succeeds on any HTTP answer.
    async fn health(&self) -> Result<()>;

    async fn store_config(&self) -> Result<StoreConfig>;

    async fn fetch_blueprints(&self) -> Result<Vec<Blueprint>>;

    /// Empty when the provider does not print this blueprint.
    async fn fetch_variants(&self, blueprint_id: u64, provider_id: u64) -> Result<Vec<Variant>>;

    /// Returns the asset id.
    async fn upload_asset(&self, upload: &AssetUpload) -> Result<String>;

    async fn create_mockup_product(&self, request: &MockupRequest) -> Result<MockupProduct>;

    async fn request_preview(&self, request: &GenerationRequest) -> Result<PreviewResponse>;

    async fn request_hq_generation(&self, request: &HqRequest) -> Result<HqTask>;

    async fn poll_task(&self, status_url: &str) -> Result<TaskStatus>;

    /// Uploads, creates and publishes the product in one request.
    async fn submit_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt>;

    async fn poll_storefront_url(&self, remote_product_id: &str) -> Result<StorefrontStatus>;

    /// Raw bytes of an image returned by another call.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}
