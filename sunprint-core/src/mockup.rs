//! Product mockups.
//!
//! The current raster is uploaded once per source image; the asset id is
//! reused for every mockup until the source changes. Mockups are then
//! requested strictly one at a time. A failed item is recorded and the queue
//! moves on after a short pause.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::backend::{
    AssetUpload, Backend, MockupImage, MockupRequest, PlacedImage, Placement, VariantPrice,
};
use crate::catalog::{ProductTemplate, ResolvedIds};
use crate::config::{CallClass, ClientConfig, Timeouts};
use crate::error::{Result, SunprintError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupRecord {
    pub rendered_images: Vec<MockupImage>,
    pub remote_product_id: String,
}

impl MockupRecord {
    /// The image flagged default, else the first one.
    pub fn default_image(&self) -> Option<&MockupImage> {
        self.rendered_images
            .iter()
            .find(|img| img.is_default)
            .or_else(|| self.rendered_images.first())
    }
}

/// Mockups for the current source image, keyed by template id.
#[derive(Debug, Clone, Default)]
pub struct MockupStore {
    records: HashMap<String, MockupRecord>,
    asset_id: Option<String>,
}

impl MockupStore {
    pub fn get(&self, template_id: &str) -> Option<&MockupRecord> {
        self.records.get(template_id)
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.records.contains_key(template_id)
    }

    pub fn insert(&mut self, template_id: String, record: MockupRecord) {
        self.records.insert(template_id, record);
    }

    pub fn asset_id(&self) -> Option<&str> {
        self.asset_id.as_deref()
    }

    pub fn set_asset_id(&mut self, asset_id: String) {
        self.asset_id = Some(asset_id);
    }

    /// Drop every record and the uploaded asset id.
    pub fn invalidate(&mut self) {
        self.records.clear();
        self.asset_id = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One queued mockup, snapshotted from a resolved template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupJob {
    pub template_id: String,
    pub display_name: String,
    pub ids: ResolvedIds,
    pub unit_price_cents: u32,
    pub placement: String,
}

impl MockupJob {
    /// Resolved templates that have no mockup yet.
    pub fn pending(templates: &[ProductTemplate], store: &MockupStore) -> Vec<Self> {
        templates
            .iter()
            .filter(|t| !store.contains(&t.id))
            .filter_map(|t| {
                Some(Self {
                    template_id: t.id.clone(),
                    display_name: t.display_name.clone(),
                    ids: t.resolved()?,
                    unit_price_cents: t.unit_price_cents,
                    placement: t.placement.clone(),
                })
            })
            .collect()
    }

    fn request(&self, asset_id: &str) -> MockupRequest {
        MockupRequest {
            title: format!("[MOCKUP] Solar Preview \u{2014} {}", self.display_name),
            blueprint_id: self.ids.blueprint_id,
            provider_id: self.ids.provider_id,
            variants: vec![VariantPrice {
                id: self.ids.variant_id,
                unit_price_cents: self.unit_price_cents,
            }],
            placements: vec![Placement {
                position: self.placement.clone(),
                images: vec![PlacedImage::centered(asset_id)],
            }],
        }
    }
}

/// Where the mockup image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Already uploaded for this source image.
    Uploaded(String),
    Upload(AssetUpload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockupFailure {
    pub template_id: String,
    pub error: SunprintError,
}

/// Progress notifications from a generator run.
#[derive(Debug, Clone, PartialEq)]
pub enum MockupEvent {
    Uploaded { asset_id: String },
    Started { index: usize, total: usize, display_name: String },
    Created { template_id: String },
    Failed { template_id: String, error: SunprintError },
}

/// Outcome of a generator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockupReport {
    pub asset_id: String,
    pub records: Vec<(String, MockupRecord)>,
    pub failures: Vec<MockupFailure>,
}

impl MockupReport {
    /// Store the asset id and every record.
    pub fn apply(self, store: &mut MockupStore) {
        if !self.asset_id.is_empty() {
            store.set_asset_id(self.asset_id);
        }
        for (template_id, record) in self.records {
            store.insert(template_id, record);
        }
    }
}

/// Sequential mockup queue.
#[derive(Clone)]
pub struct MockupGenerator {
    backend: Arc<dyn Backend>,
    timeouts: Timeouts,
    failure_delay: Duration,
}

impl MockupGenerator {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            timeouts: config.timeouts.clone(),
            failure_delay: config.mockup_failure_delay,
        }
    }

    /// Upload if needed, then create each mockup in turn.
    ///
    /// Only an upload failure fails the run. At most one creation request is
    /// in flight at any time.
    #[instrument(level = "info", skip_all, fields(jobs = jobs.len()))]
    pub async fn run<F>(
        &self,
        asset: AssetSource,
        jobs: Vec<MockupJob>,
        mut on_event: F,
    ) -> Result<MockupReport>
    where
        F: FnMut(MockupEvent) + Send,
    {
        let start = Instant::now();
        let asset_id = match asset {
            AssetSource::Uploaded(id) => {
                debug!(asset_id = %id, "Reusing uploaded asset");
                id
            }
            AssetSource::Upload(upload) => {
                let id = self
                    .timeouts
                    .guard(CallClass::Generation, self.backend.upload_asset(&upload))
                    .await
                    .inspect_err(|e| warn!(error = %e, "Mockup upload failed"))?;
                info!(asset_id = %id, "Asset uploaded");
                on_event(MockupEvent::Uploaded {
                    asset_id: id.clone(),
                });
                id
            }
        };

        let mut report = MockupReport {
            asset_id: asset_id.clone(),
            ..MockupReport::default()
        };
        let total = jobs.len();
        for (index, job) in jobs.into_iter().enumerate() {
            on_event(MockupEvent::Started {
                index: index + 1,
                total,
                display_name: job.display_name.clone(),
            });

            let request = job.request(&asset_id);
            let call = self.backend.create_mockup_product(&request);
            let result = self.timeouts.guard(CallClass::Generation, call).await;
            let result = result.and_then(|product| {
                if product.rendered_images.is_empty() {
                    Err(SunprintError::rejected(200, "Mockup returned no images"))
                } else {
                    Ok(MockupRecord {
                        rendered_images: product.rendered_images,
                        remote_product_id: product.product_id,
                    })
                }
            });

            match result {
                Ok(record) => {
                    debug!(template = %job.template_id, "Mockup created");
                    on_event(MockupEvent::Created {
                        template_id: job.template_id.clone(),
                    });
                    report.records.push((job.template_id, record));
                }
                Err(error) => {
                    warn!(template = %job.template_id, error = %error, "Mockup failed");
                    on_event(MockupEvent::Failed {
                        template_id: job.template_id.clone(),
                        error: error.clone(),
                    });
                    report.failures.push(MockupFailure {
                        template_id: job.template_id,
                        error,
                    });
                    if index + 1 < total {
                        tokio::time::sleep(self.failure_delay).await;
                    }
                }
            }
        }

        info!(
            created = report.records.len(),
            failed = report.failures.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Mockup queue finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn resolved(id: &str, blueprint_id: u64) -> ProductTemplate {
        let mut t = ProductTemplate::new(id, id, 1500, &[id]);
        t.set_resolved(ResolvedIds {
            blueprint_id,
            provider_id: 29,
            variant_id: blueprint_id * 10,
        });
        t
    }

    fn upload() -> AssetSource {
        AssetSource::Upload(AssetUpload {
            file_name: "solar.png".into(),
            contents_base64: "aGk=".into(),
        })
    }

    #[test]
    fn test_pending_skips_unresolved_and_done() {
        let templates = vec![
            resolved("a", 1),
            ProductTemplate::new("b", "b", 100, &["b"]),
            resolved("c", 3),
        ];
        let mut store = MockupStore::default();
        store.insert(
            "c".into(),
            MockupRecord {
                rendered_images: vec![],
                remote_product_id: "p".into(),
            },
        );
        let jobs = MockupJob::pending(&templates, &store);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].template_id, "a");
    }

    #[test]
    fn test_request_payload() {
        let job = &MockupJob::pending(&[resolved("mug", 425)], &MockupStore::default())[0];
        let req = job.request("asset_1");
        assert_eq!(req.title, "[MOCKUP] Solar Preview \u{2014} mug");
        assert_eq!(req.variants[0].unit_price_cents, 1500);
        assert_eq!(req.placements[0].position, "front");
        assert_eq!(req.placements[0].images[0].asset_id, "asset_1");
    }

    #[test]
    fn test_default_image_fallback() {
        let record = MockupRecord {
            rendered_images: vec![MockupImage {
                url: "first".into(),
                is_default: false,
            }],
            remote_product_id: "p".into(),
        };
        assert_eq!(record.default_image().unwrap().url, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_and_failure_isolated() {
        let mock = Arc::new(
            MockBackend::new()
                .with_latency(Duration::from_millis(250))
                .fail_mockups_for(1),
        );
        let generator = MockupGenerator::new(mock.clone(), &ClientConfig::default());
        let templates = vec![resolved("a", 1), resolved("b", 2), resolved("c", 3)];
        let jobs = MockupJob::pending(&templates, &MockupStore::default());

        let mut events = Vec::new();
        let report = generator
            .run(upload(), jobs, |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(mock.call_count("create_mockup_product"), 3);
        assert_eq!(mock.call_count("upload_asset"), 1);
        assert_eq!(mock.max_in_flight(), 1);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures[0].template_id, "a");
        assert!(matches!(events[0], MockupEvent::Uploaded { .. }));

        let mut store = MockupStore::default();
        report.apply(&mut store);
        assert_eq!(store.len(), 2);
        assert!(store.asset_id().is_some());
    }

    #[tokio::test]
    async fn test_cached_asset_skips_upload() {
        let mock = Arc::new(MockBackend::new());
        let generator = MockupGenerator::new(mock.clone(), &ClientConfig::default());
        let jobs = MockupJob::pending(&[resolved("a", 1)], &MockupStore::default());
        let report = generator
            .run(AssetSource::Uploaded("asset_9".into()), jobs, |_| {})
            .await
            .unwrap();
        assert_eq!(mock.call_count("upload_asset"), 0);
        assert_eq!(report.asset_id, "asset_9");
        assert_eq!(mock.mockup_requests()[0].placements[0].images[0].asset_id, "asset_9");
    }

    #[tokio::test]
    async fn test_upload_failure_fails_batch() {
        let mock = Arc::new(MockBackend::new().fail_upload(SunprintError::rejected(413, "Too large")));
        let generator = MockupGenerator::new(mock.clone(), &ClientConfig::default());
        let jobs = MockupJob::pending(&[resolved("a", 1)], &MockupStore::default());
        let err = generator.run(upload(), jobs, |_| {}).await.unwrap_err();
        assert_eq!(err.user_message(), "Too large");
        assert_eq!(mock.call_count("create_mockup_product"), 0);
    }
}
