//! Scripted in-memory backend.
//!
//! WARNING: test and demo use only. Every answer comes from the script set up
//! through the builder methods; nothing touches the network.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use super::{
    AssetUpload, Backend, Blueprint, CheckoutReceipt, CheckoutRequest, GenerationRequest,
    HqRequest, HqTask, MockupImage, MockupProduct, MockupRequest, PreviewResponse,
    StoreConfig, StorefrontStatus, TaskState, TaskStatus, Variant,
};
use crate::error::{Result, SunprintError};
use crate::raster::export::encode_png;

#[derive(Debug, Default)]
struct Script {
    health_failures: u32,
    store_domain: Option<String>,
    blueprints: Vec<Blueprint>,
    catalog_error: Option<SunprintError>,
    variants: HashMap<(u64, u64), Vec<Variant>>,
    variant_errors: HashSet<(u64, u64)>,
    upload_error: Option<SunprintError>,
    mockup_failures: HashSet<u64>,
    preview_pending: u32,
    preview_error: Option<SunprintError>,
    hq_pending: u32,
    hq_failure: Option<String>,
    checkout_error: Option<SunprintError>,
    storefront_ready_after: Option<u32>,
    storefront_error: bool,
    images: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct Record {
    calls: Vec<String>,
    in_flight: u32,
    max_in_flight: u32,
    uploads: Vec<AssetUpload>,
    mockup_requests: Vec<MockupRequest>,
    checkouts: Vec<CheckoutRequest>,
    storefront_polls: u32,
    next_id: u64,
}

#[derive(Debug, Default)]
struct State {
    script: Script,
    record: Record,
}

/// Deterministic [`Backend`] for tests and offline demos.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<State>,
    latency: Duration,
}

/// Decrements the in-flight counter even if the call future is dropped.
struct InFlight<'a>(&'a MockBackend);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.record.in_flight = state.record.in_flight.saturating_sub(1);
    }
}

impl MockBackend {
    /// Image URL served for previews.
    pub const PREVIEW_URL: &'static str = "mock://preview.png";

    /// Image URL served for HQ renders.
    pub const HQ_URL: &'static str = "mock://hq.png";

    pub fn new() -> Self {
        Self::default()
    }

    /// A sun-like disc on black, used as the default mock image.
    pub fn sample_image(size: u32) -> RgbaImage {
        let c = size as f32 / 2.0;
        RgbaImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt() / c;
            if d < 0.8 {
                let glow = (1.0 - d / 0.8) * 80.0;
                Rgba([(175.0 + glow) as u8, (90.0 + glow) as u8, 20, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    /// Backend with a small catalog and images for every seed product.
    pub fn demo() -> Self {
        let mock = Self::new().with_latency(Duration::from_millis(20));
        let titles = [
            (5, "Unisex Jersey Short Sleeve Tee"),
            (77, "Unisex Heavy Blend Hooded Sweatshirt"),
            (68, "Ceramic Mug 11oz"),
            (425, "Ceramic Mug 15oz"),
            (282, "Matte Vertical Posters"),
            (50, "Spun Polyester Square Pillow"),
            (269, "Tough Phone Cases"),
            (582, "Mouse Pad"),
            (29, "Tote Bag"),
            (400, "Kiss-Cut Stickers"),
        ];
        let blueprints = titles
            .iter()
            .map(|&(id, title)| Blueprint {
                id,
                title: title.to_string(),
                brand: None,
                images: Vec::new(),
            })
            .collect();
        let mut mock = mock.with_blueprints(blueprints);
        for &(id, _) in &titles {
            // Preferred provider 16 never prints anything in the demo.
            mock = mock.with_variants(
                id,
                29,
                vec![Variant {
                    id: id * 100 + 1,
                    title: Some("Default".to_string()),
                    options: None,
                }],
            );
        }
        mock.storefront_ready_after(2)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn script(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.lock().script);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `n` health checks as unreachable.
    pub fn unreachable_for(self, n: u32) -> Self {
        self.script(|s| s.health_failures = n)
    }

    pub fn with_store_domain(self, domain: &str) -> Self {
        self.script(|s| s.store_domain = Some(domain.to_string()))
    }

    pub fn with_blueprints(self, blueprints: Vec<Blueprint>) -> Self {
        self.script(|s| s.blueprints = blueprints)
    }

    pub fn fail_catalog(self, err: SunprintError) -> Self {
        self.script(|s| s.catalog_error = Some(err))
    }

    pub fn with_variants(self, blueprint_id: u64, provider_id: u64, variants: Vec<Variant>) -> Self {
        self.script(|s| {
            s.variants.insert((blueprint_id, provider_id), variants);
        })
    }

    pub fn fail_variants(self, blueprint_id: u64, provider_id: u64) -> Self {
        self.script(|s| {
            s.variant_errors.insert((blueprint_id, provider_id));
        })
    }

    pub fn fail_upload(self, err: SunprintError) -> Self {
        self.script(|s| s.upload_error = Some(err))
    }

    /// Reject mockup creation for this blueprint.
    pub fn fail_mockups_for(self, blueprint_id: u64) -> Self {
        self.script(|s| {
            s.mockup_failures.insert(blueprint_id);
        })
    }

    /// Answer "pending" to the first `n` preview requests.
    pub fn preview_pending_for(self, n: u32) -> Self {
        self.script(|s| s.preview_pending = n)
    }

    pub fn fail_preview(self, err: SunprintError) -> Self {
        self.script(|s| s.preview_error = Some(err))
    }

    /// Report "processing" for the first `n` task polls.
    pub fn hq_pending_for(self, n: u32) -> Self {
        self.script(|s| s.hq_pending = n)
    }

    pub fn fail_hq(self, message: &str) -> Self {
        self.script(|s| s.hq_failure = Some(message.to_string()))
    }

    pub fn fail_checkout(self, err: SunprintError) -> Self {
        self.script(|s| s.checkout_error = Some(err))
    }

    /// Storefront URL becomes ready on poll number `n`.
    pub fn storefront_ready_after(self, n: u32) -> Self {
        self.script(|s| s.storefront_ready_after = Some(n))
    }

    pub fn storefront_never_ready(self) -> Self {
        self.script(|s| s.storefront_ready_after = None)
    }

    /// Every storefront poll fails.
    pub fn storefront_errors(self) -> Self {
        self.script(|s| s.storefront_error = true)
    }

    pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
        self.script(|s| {
            s.images.insert(url.to_string(), bytes);
        })
    }

    /// Names of every call made, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().record.calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().record.calls.iter().filter(|c| *c == name).count()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> u32 {
        self.lock().record.max_in_flight
    }

    pub fn uploads(&self) -> Vec<AssetUpload> {
        self.lock().record.uploads.clone()
    }

    pub fn mockup_requests(&self) -> Vec<MockupRequest> {
        self.lock().record.mockup_requests.clone()
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.lock().record.checkouts.clone()
    }

    async fn enter(&self, name: &str) -> InFlight<'_> {
        {
            let mut state = self.lock();
            let record = &mut state.record;
            record.calls.push(name.to_string());
            record.in_flight += 1;
            record.max_in_flight = record.max_in_flight.max(record.in_flight);
        }
        let guard = InFlight(self);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.lock();
        state.record.next_id += 1;
        format!("{prefix}_{}", state.record.next_id)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn health(&self) -> Result<()> {
        let _guard = self.enter("health").await;
        let mut state = self.lock();
        if state.script.health_failures > 0 {
            state.script.health_failures -= 1;
            return Err(SunprintError::unreachable("connection refused"));
        }
        Ok(())
    }

    async fn store_config(&self) -> Result<StoreConfig> {
        let _guard = self.enter("store_config").await;
        let storefront_domain = self.lock().script.store_domain.clone();
        Ok(StoreConfig { storefront_domain })
    }

    async fn fetch_blueprints(&self) -> Result<Vec<Blueprint>> {
        let _guard = self.enter("fetch_blueprints").await;
        let state = self.lock();
        match &state.script.catalog_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.script.blueprints.clone()),
        }
    }

    async fn fetch_variants(&self, blueprint_id: u64, provider_id: u64) -> Result<Vec<Variant>> {
        let _guard = self.enter("fetch_variants").await;
        let state = self.lock();
        let key = (blueprint_id, provider_id);
        if state.script.variant_errors.contains(&key) {
            return Err(SunprintError::rejected(404, "Provider not found"));
        }
        Ok(state.script.variants.get(&key).cloned().unwrap_or_default())
    }

    async fn upload_asset(&self, upload: &AssetUpload) -> Result<String> {
        let _guard = self.enter("upload_asset").await;
        if let Some(err) = self.lock().script.upload_error.clone() {
            return Err(err);
        }
        self.lock().record.uploads.push(upload.clone());
        Ok(self.next_id("asset"))
    }

    async fn create_mockup_product(&self, request: &MockupRequest) -> Result<MockupProduct> {
        let _guard = self.enter("create_mockup_product").await;
        let failing = {
            let mut state = self.lock();
            state.record.mockup_requests.push(request.clone());
            state.script.mockup_failures.contains(&request.blueprint_id)
        };
        if failing {
            return Err(SunprintError::rejected(
                400,
                format!("Blueprint {} cannot be printed", request.blueprint_id),
            ));
        }
        let product_id = self.next_id("product");
        Ok(MockupProduct {
            rendered_images: vec![
                MockupImage {
                    url: format!("mock://mockups/{product_id}/front.png"),
                    is_default: true,
                },
                MockupImage {
                    url: format!("mock://mockups/{product_id}/back.png"),
                    is_default: false,
                },
            ],
            product_id,
        })
    }

    async fn request_preview(&self, _request: &GenerationRequest) -> Result<PreviewResponse> {
        let _guard = self.enter("request_preview").await;
        let mut state = self.lock();
        if let Some(err) = &state.script.preview_error {
            return Err(err.clone());
        }
        if state.script.preview_pending > 0 {
            state.script.preview_pending -= 1;
            return Ok(PreviewResponse::Pending);
        }
        Ok(PreviewResponse::Ready {
            preview_url: Self::PREVIEW_URL.to_string(),
        })
    }

    async fn request_hq_generation(&self, _request: &HqRequest) -> Result<HqTask> {
        let _guard = self.enter("request_hq_generation").await;
        let task_id = self.next_id("task");
        Ok(HqTask {
            status_url: format!("mock://status/{task_id}"),
            task_id,
        })
    }

    async fn poll_task(&self, _status_url: &str) -> Result<TaskStatus> {
        let _guard = self.enter("poll_task").await;
        let mut state = self.lock();
        if state.script.hq_pending > 0 {
            state.script.hq_pending -= 1;
            // The first status read sees the task still queued.
            let polls = state.record.calls.iter().filter(|c| *c == "poll_task").count();
            return Ok(TaskStatus {
                state: if polls == 1 {
                    TaskState::Started
                } else {
                    TaskState::Processing
                },
                image_url: None,
                message: None,
            });
        }
        Ok(match &state.script.hq_failure {
            Some(message) => TaskStatus {
                state: TaskState::Failed,
                image_url: None,
                message: Some(message.clone()),
            },
            None => TaskStatus {
                state: TaskState::Completed,
                image_url: Some(Self::HQ_URL.to_string()),
                message: None,
            },
        })
    }

    async fn submit_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        let _guard = self.enter("submit_checkout").await;
        if let Some(err) = self.lock().script.checkout_error.clone() {
            return Err(err);
        }
        self.lock().record.checkouts.push(request.clone());
        Ok(CheckoutReceipt {
            remote_product_id: self.next_id("remote"),
            variant_count: Some(1),
        })
    }

    async fn poll_storefront_url(&self, remote_product_id: &str) -> Result<StorefrontStatus> {
        let _guard = self.enter("poll_storefront_url").await;
        let mut state = self.lock();
        state.record.storefront_polls += 1;
        if state.script.storefront_error {
            return Err(SunprintError::rejected(502, "Bad Gateway"));
        }
        match state.script.storefront_ready_after {
            Some(n) if state.record.storefront_polls >= n => Ok(StorefrontStatus::Ready {
                url: format!("https://shop.test/products/{remote_product_id}"),
            }),
            _ => Ok(StorefrontStatus::Pending),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let _guard = self.enter("fetch_image").await;
        if let Some(bytes) = self.lock().script.images.get(url) {
            return Ok(bytes.clone());
        }
        let size = if url == Self::HQ_URL { 256 } else { 96 };
        if url.starts_with("mock://") {
            return encode_png(&Self::sample_image(size));
        }
        Err(SunprintError::rejected(404, format!("No image at {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_failures_then_up() {
        let mock = MockBackend::new().unreachable_for(2);
        assert!(mock.health().await.unwrap_err().is_unreachable());
        assert!(mock.health().await.is_err());
        assert!(mock.health().await.is_ok());
        assert_eq!(mock.call_count("health"), 3);
    }

    #[tokio::test]
    async fn test_preview_pending_then_ready() {
        let mock = MockBackend::new().preview_pending_for(1);
        let req = GenerationRequest {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            wavelength: 171,
            mission: "SDO".into(),
        };
        assert_eq!(mock.request_preview(&req).await.unwrap(), PreviewResponse::Pending);
        assert!(matches!(
            mock.request_preview(&req).await.unwrap(),
            PreviewResponse::Ready { .. }
        ));
    }

    #[tokio::test]
    async fn test_default_images_decode() {
        let mock = MockBackend::new();
        let bytes = mock.fetch_image(MockBackend::HQ_URL).await.unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), 256);
        assert!(mock.fetch_image("https://elsewhere/x.png").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tracking() {
        let mock = MockBackend::new().with_latency(Duration::from_millis(100));
        let (a, b) = tokio::join!(mock.health(), mock.store_config());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(mock.max_in_flight(), 2);
    }
}
