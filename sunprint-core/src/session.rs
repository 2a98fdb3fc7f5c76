//! The session aggregate and its command handlers.
//!
//! [`SessionState`] owns everything a user session mutates: the edit state,
//! the raster, product templates, mockups, the HQ cache and the last
//! checkout. Synchronous handlers mutate it directly and always re-render.
//! Long-running work is split in two: a `begin_*` handler validates and
//! snapshots its inputs into a [`Task`], the caller awaits the task, and the
//! matching `finish_*` handler applies the result if it is still current.

use std::sync::Arc;

use chrono::NaiveDate;
use image::RgbaImage;
use tracing::{debug, info, instrument, warn};

use crate::backend::{AssetUpload, Backend, Blueprint};
use crate::cache::HqCache;
use crate::cancel::{Completed, RequestSlot, Task};
use crate::catalog::{
    self, default_templates, CatalogResolver, ProductTemplate, ProviderMatch, ResolutionReport,
};
use crate::checkout::{self, CheckoutOrchestrator, CheckoutSession};
use crate::config::ClientConfig;
use crate::edit::{CropAspect, CropRect, Edit, EditState, TextEdit};
use crate::error::{Result, SunprintError};
use crate::generation::{Generator, Selection};
use crate::health::{self, HealthStatus};
use crate::mockup::{
    AssetSource, MockupEvent, MockupGenerator, MockupJob, MockupReport, MockupStore,
};
use crate::pipeline;
use crate::raster::{crop, export, geometry, FontBook, RasterBuffer};

/// A decoded preview for a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub selection: Selection,
    pub image: RgbaImage,
}

/// Phase one of an HQ fetch: the finished render's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HqUrl {
    pub selection: Selection,
    pub url: String,
}

/// Phase two of an HQ fetch: the downloaded image.
#[derive(Debug, Clone, PartialEq)]
pub struct HqImage {
    pub selection: Selection,
    pub url: String,
    pub image: RgbaImage,
}

/// What [`SessionState::begin_hq`] decided to do.
#[derive(Debug)]
pub enum HqStep {
    /// The image is already cached and now current.
    Cached,
    /// Start a render, then pass the result to `finish_hq_url`.
    Generate(Task<HqUrl>),
    /// The URL is cached; download it and pass the result to `finish_hq_image`.
    Download(Task<HqImage>),
}

#[derive(Debug, Default)]
struct Slots {
    preview: RequestSlot,
    hq: RequestSlot,
    catalog: RequestSlot,
    mockups: RequestSlot,
    checkout: RequestSlot,
}

pub struct SessionState {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    fonts: FontBook,
    edits: EditState,
    raster: Option<RasterBuffer>,
    /// Bumped whenever the source image is replaced.
    source_generation: u64,
    selection: Option<Selection>,
    templates: Vec<ProductTemplate>,
    mockups: MockupStore,
    hq_cache: HqCache,
    /// HQ image for the selection, cropped and burned in along with the raster.
    current_hq: Option<Arc<RgbaImage>>,
    blueprints: Vec<Blueprint>,
    catalog_started: bool,
    last_checkout: Option<CheckoutSession>,
    slots: Slots,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("selection", &self.selection)
            .field("source_generation", &self.source_generation)
            .field("dimensions", &self.raster.as_ref().map(|r| r.dimensions()))
            .field("templates", &self.templates.len())
            .field("mockups", &self.mockups.len())
            .field("hq_cache", &self.hq_cache.len())
            .finish_non_exhaustive()
    }
}

fn no_image() -> SunprintError {
    SunprintError::validation("Load an image first")
}

impl SessionState {
    /// Fresh session with the default product templates.
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        Self {
            backend,
            config,
            fonts: FontBook::new(),
            edits: EditState::default(),
            raster: None,
            source_generation: 0,
            selection: None,
            templates: default_templates(),
            mockups: MockupStore::default(),
            hq_cache: HqCache::new(),
            current_hq: None,
            blueprints: Vec::new(),
            catalog_started: false,
            last_checkout: None,
            slots: Slots::default(),
        }
    }

    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = fonts;
        self
    }

    /// Fonts available to the text overlay.
    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn edits(&self) -> &EditState {
        &self.edits
    }

    pub fn raster(&self) -> Option<&RasterBuffer> {
        self.raster.as_ref()
    }

    /// The rendered canvas, if an image is loaded.
    pub fn canvas(&self) -> Option<&RgbaImage> {
        self.raster.as_ref().map(RasterBuffer::canvas)
    }

    pub fn source_generation(&self) -> u64 {
        self.source_generation
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn templates(&self) -> &[ProductTemplate] {
        &self.templates
    }

    pub fn template(&self, id: &str) -> Option<&ProductTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn mockups(&self) -> &MockupStore {
        &self.mockups
    }

    pub fn hq_cache(&self) -> &HqCache {
        &self.hq_cache
    }

    pub fn current_hq(&self) -> Option<&RgbaImage> {
        self.current_hq.as_deref()
    }

    pub fn blueprints(&self) -> &[Blueprint] {
        &self.blueprints
    }

    pub fn last_checkout(&self) -> Option<&CheckoutSession> {
        self.last_checkout.as_ref()
    }

    fn render(&mut self) {
        if let Some(raster) = &mut self.raster {
            raster.render(&self.edits, &self.fonts);
        }
    }

    fn bounds(&self) -> Result<(u32, u32)> {
        self.raster
            .as_ref()
            .map(RasterBuffer::dimensions)
            .ok_or_else(no_image)
    }

    fn require_selection(&self) -> Result<Selection> {
        self.selection
            .ok_or_else(|| SunprintError::validation("Choose a date and wavelength first"))
    }

    // ==================== Editing ====================

    /// Choose the date and wavelength that generation requests target.
    pub fn select(&mut self, date: NaiveDate, wavelength: u32) {
        let selection = Selection::new(date, wavelength);
        if self.selection == Some(selection) {
            return;
        }
        self.selection = Some(selection);
        self.current_hq = self
            .hq_cache
            .get(date, wavelength)
            .and_then(|entry| entry.image.clone());
    }

    /// Replace the source image. Resets every edit and invalidates mockups.
    pub fn load_source(&mut self, image: RgbaImage) {
        debug!(width = image.width(), height = image.height(), "Loading source image");
        match &mut self.raster {
            Some(raster) => raster.replace_source(image),
            None => self.raster = Some(RasterBuffer::new(image)),
        }
        self.edits = EditState::default();
        self.source_changed();
        self.render();
    }

    /// Decode and load an encoded image.
    pub fn load_source_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let raster = RasterBuffer::decode(bytes)?;
        self.raster = Some(raster);
        self.edits = EditState::default();
        self.source_changed();
        self.render();
        Ok(())
    }

    fn source_changed(&mut self) {
        self.source_generation += 1;
        self.mockups.invalidate();
        self.slots.mockups.cancel();
    }

    /// Apply one edit and re-render. Invalid values leave the state untouched.
    pub fn apply_edit(&mut self, edit: Edit) -> Result<()> {
        let bounds = self.bounds()?;
        self.edits.apply(edit, bounds)?;
        self.render();
        Ok(())
    }

    pub fn enter_text_mode(&mut self) -> Result<()> {
        self.apply_edit(Edit::Text(TextEdit::Enter))
    }

    pub fn exit_text_mode(&mut self) -> Result<()> {
        self.apply_edit(Edit::Text(TextEdit::Exit))
    }

    /// Lock the crop aspect to the ratio of a product's print area.
    pub fn suggest_crop(&mut self, template_id: &str) -> Result<CropAspect> {
        let aspect = self
            .template(template_id)
            .map(|t| t.aspect)
            .ok_or_else(|| SunprintError::validation(format!("Unknown product {template_id}")))?;
        self.edits.crop_aspect = aspect;
        Ok(aspect)
    }

    /// Crop the oriented image to the selection held in the edit state.
    ///
    /// The cropped pixels become the new source. Geometry and overlay are
    /// reset; color edits stay live. The HQ image, if any, is cropped to the
    /// same region.
    #[instrument(level = "debug", skip(self))]
    pub fn confirm_crop(&mut self) -> Result<CropRect> {
        let raster = self.raster.as_ref().ok_or_else(no_image)?;
        let selection = self
            .edits
            .crop_rect
            .ok_or_else(|| SunprintError::validation("Select a crop region first"))?;
        let canvas_size = raster.dimensions();
        let rect = crop::crop_bounds(selection, self.edits.crop_aspect, canvas_size)?;

        let e = &self.edits;
        let oriented = geometry::orient(raster.source(), e.rotation, e.flip_h, e.flip_v);
        let cropped = crop::extract(&oriented, rect);

        if let Some(hq) = &self.current_hq {
            let oriented_hq = geometry::orient(hq, e.rotation, e.flip_h, e.flip_v);
            let hq_rect = crop::scale_rect(rect, canvas_size, oriented_hq.dimensions());
            self.current_hq = Some(Arc::new(crop::extract(&oriented_hq, hq_rect)));
        }

        if let Some(raster) = &mut self.raster {
            raster.replace_source(cropped);
        }
        self.edits.reset_geometry();
        self.source_changed();
        self.render();
        info!(?rect, "Crop applied");
        Ok(rect)
    }

    /// Select `selection` (canvas pixels) and crop to it.
    pub fn crop_to(&mut self, selection: CropRect) -> Result<CropRect> {
        self.apply_edit(Edit::CropRect(Some(selection)))?;
        self.confirm_crop()
    }

    /// Make the text overlay part of the source image and leave text mode.
    pub fn burn_in_text(&mut self) -> Result<()> {
        let raster = self.raster.as_ref().ok_or_else(no_image)?;
        let overlay = match &self.edits.text_overlay {
            Some(overlay) if !overlay.text.trim().is_empty() => overlay,
            Some(_) => return Err(SunprintError::validation("Type some text first")),
            None => return Err(SunprintError::validation("Text mode is not active")),
        };
        self.fonts.require(&overlay.font_family)?;
        let canvas_width = raster.dimensions().0;
        let baked = pipeline::bake(raster.source(), &self.edits, &self.fonts);

        if let Some(hq) = &self.current_hq {
            let (hq_width, _) =
                geometry::oriented_dimensions(hq.width(), hq.height(), self.edits.rotation);
            let factor = hq_width as f32 / canvas_width.max(1) as f32;
            let mut hq_edits = self.edits.clone();
            hq_edits.text_overlay = Some(overlay.scaled(factor));
            self.current_hq = Some(Arc::new(pipeline::bake(hq, &hq_edits, &self.fonts)));
        }

        if let Some(raster) = &mut self.raster {
            raster.replace_source(baked);
        }
        self.edits.reset_geometry();
        self.source_changed();
        self.render();
        info!("Text burned in");
        Ok(())
    }

    // ==================== Health ====================

    /// Probe the backend and, once it answers, refresh the storefront domain.
    pub async fn check_health<N>(&mut self, on_retry: N) -> HealthStatus
    where
        N: FnMut(u32, &SunprintError),
    {
        let status = health::check_health(self.backend.as_ref(), &self.config, on_retry).await;
        if status.is_online() {
            let domain = health::fetch_store_domain(self.backend.as_ref(), &self.config).await;
            if let Some(domain) = domain {
                self.config.store_domain = domain;
            }
        }
        status
    }

    // ==================== Preview ====================

    /// Fetch a preview for the current selection, superseding any in flight.
    pub fn begin_preview(&mut self) -> Result<Task<PreviewImage>> {
        let selection = self.require_selection()?;
        let token = self.slots.preview.begin();
        let generator = Generator::new(self.backend.clone(), &self.config);
        Ok(Task::new(token, self.source_generation, async move {
            let image = generator.preview(selection).await?;
            Ok(PreviewImage { selection, image })
        }))
    }

    /// Load a finished preview. `Ok(false)` means it was superseded.
    pub fn finish_preview(&mut self, done: Completed<PreviewImage>) -> Result<bool> {
        if !self.slots.preview.complete(done.generation) {
            debug!(generation = done.generation, "Discarding stale preview");
            return Ok(false);
        }
        let preview = done.result?;
        self.load_source(preview.image);
        let Selection { date, wavelength } = preview.selection;
        self.current_hq = self
            .hq_cache
            .get(date, wavelength)
            .and_then(|entry| entry.image.clone());
        Ok(true)
    }

    // ==================== HQ ====================

    /// Fetch the HQ image for the current selection, skipping whatever is
    /// already cached.
    pub fn begin_hq(&mut self) -> Result<HqStep> {
        let selection = self.require_selection()?;
        let cached = self.hq_cache.get(selection.date, selection.wavelength).cloned();
        match cached {
            Some(entry) => match entry.image {
                Some(image) => {
                    debug!("HQ image cached");
                    self.current_hq = Some(image);
                    Ok(HqStep::Cached)
                }
                None => Ok(HqStep::Download(self.download_hq(selection, entry.source_url))),
            },
            None => {
                let token = self.slots.hq.begin();
                let generator = Generator::new(self.backend.clone(), &self.config);
                Ok(HqStep::Generate(Task::new(
                    token,
                    self.source_generation,
                    async move {
                        let url = generator.hq_url(selection).await?;
                        Ok(HqUrl { selection, url })
                    },
                )))
            }
        }
    }

    fn download_hq(&mut self, selection: Selection, url: String) -> Task<HqImage> {
        let token = self.slots.hq.begin();
        let generator = Generator::new(self.backend.clone(), &self.config);
        Task::new(token, self.source_generation, async move {
            let image = generator.download(&url).await?;
            Ok(HqImage {
                selection,
                url,
                image,
            })
        })
    }

    /// Cache a finished render's URL and hand back the download task.
    /// `Ok(None)` means the render was superseded.
    pub fn finish_hq_url(&mut self, done: Completed<HqUrl>) -> Result<Option<Task<HqImage>>> {
        if !self.slots.hq.complete(done.generation) {
            return Ok(None);
        }
        let HqUrl { selection, url } = done.result?;
        self.hq_cache
            .put(selection.date, selection.wavelength, url.clone(), None);
        Ok(Some(self.download_hq(selection, url)))
    }

    /// Attach a downloaded HQ image to the cache.
    pub fn finish_hq_image(&mut self, done: Completed<HqImage>) -> Result<bool> {
        if !self.slots.hq.complete(done.generation) {
            return Ok(false);
        }
        let HqImage {
            selection,
            url,
            image,
        } = done.result?;
        let image = Arc::new(image);
        let Selection { date, wavelength } = selection;
        if !self.hq_cache.attach_image(date, wavelength, &url, image.clone()) {
            debug!(%url, "HQ download no longer matches the cache, dropped");
            return Ok(false);
        }
        if self.selection == Some(selection) {
            self.current_hq = Some(image);
        }
        Ok(true)
    }

    // ==================== Catalog ====================

    /// The one-shot resolver run. `None` once it has been started.
    pub fn begin_catalog_resolution(&mut self) -> Option<Task<ResolutionReport>> {
        if self.catalog_started {
            return None;
        }
        self.catalog_started = true;
        let token = self.slots.catalog.begin();
        let resolver = CatalogResolver::new(self.backend.clone(), &self.config);
        let templates = self.templates.clone();
        let delay = self.config.resolver_delay;
        Some(Task::new(token, self.source_generation, async move {
            tokio::time::sleep(delay).await;
            resolver.resolve(&templates).await
        }))
    }

    /// Apply resolved ids. Failures are logged and leave templates
    /// unresolved; the resolver is not retried. Returns how many resolved.
    pub fn finish_catalog_resolution(&mut self, done: Completed<ResolutionReport>) -> usize {
        if !self.slots.catalog.complete(done.generation) {
            return 0;
        }
        match done.result {
            Ok(report) => {
                let applied = report.apply(&mut self.templates);
                self.blueprints = report.blueprints;
                applied
            }
            Err(e) => {
                warn!(error = %e, "Catalog resolution failed, products stay unavailable");
                0
            }
        }
    }

    /// Blueprints matching `query`, fetching the catalog on first use.
    pub async fn browse_catalog(&mut self, query: &str) -> Result<Vec<Blueprint>> {
        if self.blueprints.is_empty() {
            let resolver = CatalogResolver::new(self.backend.clone(), &self.config);
            self.blueprints = resolver.fetch_blueprints().await?;
        }
        Ok(catalog::browse(&self.blueprints, query)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn find_variants(&self, blueprint_id: u64) -> Option<ProviderMatch> {
        CatalogResolver::new(self.backend.clone(), &self.config)
            .find_variants(blueprint_id)
            .await
    }

    /// Add a browsed blueprint as a ready product. Returns the template id.
    pub async fn add_catalog_product(&mut self, blueprint_id: u64) -> Result<String> {
        let blueprint = self
            .blueprints
            .iter()
            .find(|b| b.id == blueprint_id)
            .cloned()
            .ok_or_else(|| {
                SunprintError::validation(format!("Blueprint {blueprint_id} is not in the catalog"))
            })?;
        if let Some(existing) = self
            .templates
            .iter()
            .find(|t| t.resolved_blueprint_id == Some(blueprint_id))
        {
            return Ok(existing.id.clone());
        }
        let found = self.find_variants(blueprint_id).await.ok_or_else(|| {
            SunprintError::validation(format!("No provider prints {}", blueprint.title))
        })?;
        let variant_id = found
            .variants
            .first()
            .map(|v| v.id)
            .ok_or_else(|| SunprintError::validation("Provider has no variants"))?;
        let template = ProductTemplate::from_catalog(&blueprint, found.provider_id, variant_id);
        let id = template.id.clone();
        info!(template = %id, "Catalog product added");
        self.templates.push(template);
        Ok(id)
    }

    // ==================== Mockups ====================

    /// Queue mockups for every ready product without one. `Ok(None)` when
    /// nothing is pending.
    pub fn begin_mockups<F>(&mut self, on_event: F) -> Result<Option<Task<MockupReport>>>
    where
        F: FnMut(MockupEvent) + Send + 'static,
    {
        let raster = self.raster.as_ref().ok_or_else(no_image)?;
        let jobs = MockupJob::pending(&self.templates, &self.mockups);
        if jobs.is_empty() {
            return Ok(None);
        }

        let asset = match self.mockups.asset_id() {
            Some(id) => AssetSource::Uploaded(id.to_string()),
            None => {
                let file_name = match self.selection {
                    Some(s) => export::file_name(s.date, s.wavelength, "mockup"),
                    None => "sunprint_mockup.png".to_string(),
                };
                AssetSource::Upload(AssetUpload {
                    file_name,
                    contents_base64: export::png_base64(
                        raster.canvas(),
                        self.config.export_max_dim,
                    )?,
                })
            }
        };

        let token = self.slots.mockups.begin();
        let generator = MockupGenerator::new(self.backend.clone(), &self.config);
        Ok(Some(Task::new(token, self.source_generation, async move {
            generator.run(asset, jobs, on_event).await
        })))
    }

    /// Store the mockups of a finished run. Runs for a replaced source image
    /// are discarded and return `Ok(None)`.
    pub fn finish_mockups(
        &mut self,
        done: Completed<MockupReport>,
    ) -> Result<Option<MockupReport>> {
        if !self.slots.mockups.complete(done.generation)
            || done.source_generation != self.source_generation
        {
            return Ok(None);
        }
        let report = done.result?;
        report.clone().apply(&mut self.mockups);
        Ok(Some(report))
    }

    // ==================== Checkout ====================

    /// Start a checkout. Preconditions are checked before any network call.
    pub fn begin_checkout<F>(
        &mut self,
        template_id: &str,
        on_progress: F,
    ) -> Result<Task<CheckoutSession>>
    where
        F: FnMut(&CheckoutSession) + Send + 'static,
    {
        let template = self
            .template(template_id)
            .cloned()
            .ok_or_else(|| SunprintError::validation(format!("Unknown product {template_id}")))?;
        let selection = self.require_selection()?;
        let hq = self.hq_cache.get(selection.date, selection.wavelength);
        let ids = checkout::validate(&template, hq)?;

        let image = self.checkout_image().ok_or_else(no_image)?;
        let image_base64 = export::png_base64(&image, self.config.export_max_dim)?;
        let request = checkout::build_request(&template, ids, selection, image_base64);

        self.last_checkout = None;
        let token = self.slots.checkout.begin();
        let orchestrator = CheckoutOrchestrator::new(self.backend.clone(), &self.config);
        Ok(Task::new(token, self.source_generation, async move {
            Ok(orchestrator.run(&template, request, on_progress).await)
        }))
    }

    /// HQ image with the current edits, or the raster canvas without one.
    fn checkout_image(&self) -> Option<RgbaImage> {
        let Some(hq) = &self.current_hq else {
            return self.raster.as_ref().map(|r| r.canvas().clone());
        };
        let mut edits = self.edits.clone();
        if let (Some(overlay), Some(raster)) = (&mut edits.text_overlay, &self.raster) {
            let (hq_width, _) =
                geometry::oriented_dimensions(hq.width(), hq.height(), edits.rotation);
            let factor = hq_width as f32 / raster.dimensions().0.max(1) as f32;
            *overlay = overlay.scaled(factor);
        }
        Some(pipeline::render(hq, &edits, &self.fonts))
    }

    /// Record a finished checkout. `Ok(None)` means it was superseded.
    pub fn finish_checkout(
        &mut self,
        done: Completed<CheckoutSession>,
    ) -> Result<Option<&CheckoutSession>> {
        if !self.slots.checkout.complete(done.generation) {
            return Ok(None);
        }
        let session: &CheckoutSession = self.last_checkout.insert(done.result?);
        Ok(Some(session))
    }

    /// Forget a terminal checkout, or abandon the one in flight.
    pub fn dismiss_checkout(&mut self) {
        self.slots.checkout.cancel();
        self.last_checkout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::checkout::CheckoutStep;
    use crate::edit::Rotation;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
    }

    fn session(mock: MockBackend) -> (Arc<MockBackend>, SessionState) {
        let mock = Arc::new(mock);
        let state = SessionState::new(mock.clone(), ClientConfig::default());
        (mock, state)
    }

    fn may_10() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_edits_need_an_image() {
        let (_, mut state) = session(MockBackend::new());
        let err = state.apply_edit(Edit::Brightness(10)).unwrap_err();
        assert!(matches!(err, SunprintError::ValidationFailed(_)));
    }

    #[test]
    fn test_apply_edit_rerenders() {
        let (_, mut state) = session(MockBackend::new());
        state.load_source(gradient(40, 20));
        state.apply_edit(Edit::Rotation(Rotation::Deg90)).unwrap();
        assert_eq!(state.canvas().unwrap().dimensions(), (20, 40));
        assert!(state.apply_edit(Edit::Contrast(101)).is_err());
        assert_eq!(state.edits().contrast, 0);
    }

    #[test]
    fn test_crop_resets_geometry_keeps_color() {
        let (_, mut state) = session(MockBackend::new());
        state.load_source(gradient(40, 20));
        let generation = state.source_generation();
        state.apply_edit(Edit::Rotation(Rotation::Deg90)).unwrap();
        state.apply_edit(Edit::Brightness(30)).unwrap();
        state.apply_edit(Edit::CropAspect(CropAspect::Free)).unwrap();

        let rect = state.crop_to(CropRect::new(2, 4, 12, 30)).unwrap();
        assert_eq!(rect, CropRect::new(2, 4, 12, 30));
        assert_eq!(state.raster().unwrap().source().dimensions(), (12, 30));
        assert_eq!(state.edits().rotation, Rotation::Deg0);
        assert_eq!(state.edits().crop_rect, None);
        assert_eq!(state.edits().brightness, 30);
        assert_eq!(state.source_generation(), generation + 1);

        assert!(state.crop_to(CropRect::new(0, 0, 9, 9)).is_err());
        assert_eq!(state.raster().unwrap().source().dimensions(), (12, 30));
    }

    #[test]
    fn test_confirm_crop_uses_the_stored_selection() {
        let (_, mut state) = session(MockBackend::new());
        state.load_source(gradient(100, 50));
        state.apply_edit(Edit::CropAspect(CropAspect::Free)).unwrap();
        assert!(state.confirm_crop().is_err());

        state
            .apply_edit(Edit::CropRect(Some(CropRect::new(60, 0, 40, 50))))
            .unwrap();
        // Turning the canvas invalidates the selection.
        state.apply_edit(Edit::Rotation(Rotation::Deg90)).unwrap();
        assert_eq!(state.canvas().unwrap().dimensions(), (50, 100));
        assert!(state.confirm_crop().is_err());
        assert_eq!(state.raster().unwrap().source().dimensions(), (100, 50));

        state
            .apply_edit(Edit::CropRect(Some(CropRect::new(0, 60, 50, 40))))
            .unwrap();
        assert_eq!(state.confirm_crop().unwrap(), CropRect::new(0, 60, 50, 40));
        assert_eq!(state.raster().unwrap().source().dimensions(), (50, 40));
    }

    #[test]
    fn test_suggest_crop_uses_product_aspect() {
        let (_, mut state) = session(MockBackend::new());
        let aspect = state.suggest_crop("poster_matte").unwrap();
        assert_eq!(aspect, CropAspect::Ratio { width: 11, height: 14 });
        assert_eq!(state.edits().crop_aspect, aspect);
        assert!(state.suggest_crop("yacht").is_err());
    }

    #[test]
    fn test_burn_in_requires_text() {
        let (_, mut state) = session(MockBackend::new());
        state.load_source(gradient(30, 30));
        assert!(state.burn_in_text().is_err());
        state.enter_text_mode().unwrap();
        state.apply_edit(Edit::Text(TextEdit::Text("  ".into()))).unwrap();
        assert!(state.burn_in_text().is_err());
        state.apply_edit(Edit::Text(TextEdit::Text("Sun".into()))).unwrap();
        state.burn_in_text().unwrap();
        assert!(!state.edits().text_mode());
    }

    #[test]
    fn test_burn_in_draws_into_the_source() {
        let (_, mut state) = session(MockBackend::new());
        let source = gradient(60, 60);
        state.load_source(source.clone());
        state.enter_text_mode().unwrap();
        state.apply_edit(Edit::Text(TextEdit::Text("SUN".into()))).unwrap();
        state.apply_edit(Edit::Text(TextEdit::FontSize(24.0))).unwrap();
        state.burn_in_text().unwrap();

        let baked = state.raster().unwrap().source();
        assert_eq!(baked.dimensions(), (60, 60));
        assert_ne!(baked, &source);
        assert_eq!(state.canvas().unwrap(), baked);
    }

    #[test]
    fn test_burn_in_without_fonts_is_an_error() {
        let (_, state) = session(MockBackend::new());
        let mut state = state.with_fonts(FontBook::empty());
        let source = gradient(60, 60);
        state.load_source(source.clone());
        state.enter_text_mode().unwrap();
        state.apply_edit(Edit::Text(TextEdit::Text("SUN".into()))).unwrap();

        let err = state.burn_in_text().unwrap_err();
        assert!(matches!(err, SunprintError::Font(_)));
        assert!(state.edits().text_mode());
        assert_eq!(state.raster().unwrap().source(), &source);
    }

    #[tokio::test]
    async fn test_preview_loads_source() {
        let (_, mut state) = session(MockBackend::new());
        assert!(state.begin_preview().is_err());
        state.select(may_10(), 171);
        let task = state.begin_preview().unwrap();
        assert!(state.finish_preview(task.run().await).unwrap());
        assert_eq!(state.canvas().unwrap().dimensions(), (96, 96));
        assert_eq!(state.source_generation(), 1);
    }

    #[tokio::test]
    async fn test_superseded_preview_is_discarded() {
        let (_, mut state) = session(MockBackend::new());
        state.select(may_10(), 171);
        let first = state.begin_preview().unwrap();
        let second = state.begin_preview().unwrap();

        let stale = first.run().await;
        assert_eq!(stale.result.as_ref().unwrap_err(), &SunprintError::Cancelled);
        assert!(!state.finish_preview(stale).unwrap());
        assert!(state.raster().is_none());

        assert!(state.finish_preview(second.run().await).unwrap());
        assert!(state.raster().is_some());
    }

    #[tokio::test]
    async fn test_hq_two_phase_cache() {
        let (mock, mut state) = session(MockBackend::new());
        state.select(may_10(), 193);

        let HqStep::Generate(task) = state.begin_hq().unwrap() else {
            panic!("expected a render");
        };
        let download = state.finish_hq_url(task.run().await).unwrap().unwrap();
        let entry = state.hq_cache().get(may_10(), 193).unwrap();
        assert_eq!(entry.source_url, MockBackend::HQ_URL);
        assert!(entry.image.is_none());

        // URL cached, image not yet: no second render.
        let HqStep::Download(again) = state.begin_hq().unwrap() else {
            panic!("expected a download");
        };
        assert!(!state.finish_hq_image(download.run().await).unwrap());
        assert!(state.finish_hq_image(again.run().await).unwrap());
        assert_eq!(state.current_hq().unwrap().width(), 256);

        assert!(matches!(state.begin_hq().unwrap(), HqStep::Cached));
        assert_eq!(mock.call_count("request_hq_generation"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_resolution_runs_once() {
        let (mock, mut state) = session(MockBackend::demo());
        let task = state.begin_catalog_resolution().unwrap();
        assert!(state.begin_catalog_resolution().is_none());
        let resolved = state.finish_catalog_resolution(task.run().await);
        assert_eq!(resolved, 9);
        assert!(!state.template("canvas_stretched").unwrap().is_resolved());
        assert_eq!(mock.call_count("fetch_blueprints"), 1);
        assert_eq!(state.blueprints().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_failure_is_not_fatal() {
        let (_, mut state) =
            session(MockBackend::new().fail_catalog(SunprintError::unreachable("down")));
        let task = state.begin_catalog_resolution().unwrap();
        assert_eq!(state.finish_catalog_resolution(task.run().await), 0);
        assert!(state.templates().iter().all(|t| !t.is_resolved()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_catalog_product() {
        let (_, mut state) = session(MockBackend::demo());
        let hits = state.browse_catalog("mug").await.unwrap();
        assert_eq!(hits.len(), 2);
        let id = state.add_catalog_product(68).await.unwrap();
        assert_eq!(id, "catalog_68_29");
        assert!(state.template(&id).unwrap().is_resolved());
        assert!(state.add_catalog_product(1).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mockups_invalidated_by_new_source() {
        let (mock, mut state) = session(MockBackend::demo());
        let resolution = state.begin_catalog_resolution().unwrap();
        state.finish_catalog_resolution(resolution.run().await);
        state.load_source(gradient(32, 32));

        let task = state.begin_mockups(|_| {}).unwrap().unwrap();
        let report = state.finish_mockups(task.run().await).unwrap().unwrap();
        assert_eq!(report.records.len(), 9);
        assert_eq!(state.mockups().len(), 9);
        assert!(state.begin_mockups(|_| {}).unwrap().is_none());

        // A result computed for the old source is dropped.
        state.load_source(gradient(16, 16));
        assert!(state.mockups().is_empty());
        assert!(state.mockups().asset_id().is_none());
        let task = state.begin_mockups(|_| {}).unwrap().unwrap();
        let done = task.run().await;
        state.load_source(gradient(8, 8));
        assert!(state.finish_mockups(done).unwrap().is_none());
        assert_eq!(mock.call_count("upload_asset"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_preconditions_then_success() {
        let (mock, mut state) = session(MockBackend::demo());
        let resolution = state.begin_catalog_resolution().unwrap();
        state.finish_catalog_resolution(resolution.run().await);
        state.select(may_10(), 171);
        state.load_source(gradient(32, 32));

        let err = state.begin_checkout("mug_15oz", |_| {}).unwrap_err();
        assert!(matches!(err, SunprintError::ValidationFailed(_)));
        let err = state.begin_checkout("canvas_stretched", |_| {}).unwrap_err();
        assert!(matches!(err, SunprintError::ValidationFailed(_)));
        assert_eq!(mock.call_count("submit_checkout"), 0);

        let HqStep::Generate(task) = state.begin_hq().unwrap() else {
            panic!("expected a render");
        };
        let download = state.finish_hq_url(task.run().await).unwrap().unwrap();
        state.finish_hq_image(download.run().await).unwrap();

        let task = state.begin_checkout("mug_15oz", |_| {}).unwrap();
        let session = state.finish_checkout(task.run().await).unwrap().unwrap();
        assert_eq!(session.step, CheckoutStep::Done);
        assert!(!session.used_fallback);
        assert_eq!(mock.checkouts()[0].file_name, "solar_2024-05-10_171_hq.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_refreshes_store_domain() {
        let (_, mut state) = session(MockBackend::new().with_store_domain("sun.example.com"));
        assert!(state.check_health(|_, _| {}).await.is_online());
        assert_eq!(
            state.config().fallback_storefront_url(),
            "https://sun.example.com/collections/all"
        );
    }
}
