//! JSON-over-HTTP backend built on `reqwest`.
//!
//! Relative URLs in responses are resolved against the configured API base.
//! Transport failures become `Unreachable`; non-2xx answers become
//! `RemoteRejected` carrying the server's `detail` or `message` field, or the
//! raw body when it is not JSON.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    AssetUpload, Backend, Blueprint, CheckoutReceipt, CheckoutRequest, GenerationRequest,
    HqRequest, HqTask, MockupImage, MockupProduct, MockupRequest, PreviewResponse,
    StoreConfig, StorefrontStatus, TaskState, TaskStatus, Variant,
};
use crate::config::ClientConfig;
use crate::error::{Result, SunprintError};

/// Body of `/api/printify/store-config`.
#[derive(Debug, Deserialize)]
struct StoreConfigResponse {
    #[serde(default)]
    shopify_store_domain: Option<String>,
}

/// Variant lists arrive either wrapped or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VariantsResponse {
    Wrapped { variants: Vec<Variant> },
    Bare(Vec<Variant>),
}

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    file_name: &'a str,
    contents: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ProductVariantBody {
    id: u64,
    price: u32,
    is_enabled: bool,
}

#[derive(Debug, Serialize)]
struct PlaceholderImageBody<'a> {
    id: &'a str,
    x: f32,
    y: f32,
    scale: f32,
    angle: f32,
}

#[derive(Debug, Serialize)]
struct PlaceholderBody<'a> {
    position: &'a str,
    images: Vec<PlaceholderImageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct PrintAreaBody<'a> {
    variant_ids: Vec<u64>,
    placeholders: Vec<PlaceholderBody<'a>>,
}

#[derive(Debug, Serialize)]
struct ProductBody<'a> {
    title: &'a str,
    description: &'a str,
    blueprint_id: u64,
    print_provider_id: u64,
    variants: Vec<ProductVariantBody>,
    print_areas: Vec<PrintAreaBody<'a>>,
}

#[derive(Debug, Deserialize)]
struct ProductImage {
    src: String,
    #[serde(default)]
    is_default: bool,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    images: Vec<ProductImage>,
}

#[derive(Debug, Default, Deserialize)]
struct PreviewBody {
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HqTaskResponse {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: TaskState,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckoutBody<'a> {
    image_base64: &'a str,
    file_name: &'a str,
    title: &'a str,
    description: &'a str,
    blueprint_id: u64,
    print_provider_id: u64,
    variant_id: u64,
    price: u32,
    position: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    #[serde(default)]
    printify_product_id: Option<serde_json::Value>,
    #[serde(default)]
    variant_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StorefrontResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    shopify_url: Option<String>,
}

/// Ids come back as strings or numbers depending on the endpoint.
fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Server explanation from an error body.
fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            match json.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    body.trim().to_string()
}

fn transport_error(err: reqwest::Error) -> SunprintError {
    if err.is_timeout() {
        SunprintError::timed_out(err.to_string())
    } else {
        SunprintError::unreachable(err.to_string())
    }
}

/// HTTP implementation of [`Backend`].
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    #[instrument(level = "debug", skip_all, fields(api_base = %config.api_base))]
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&format!("{}/", config.api_base.trim_end_matches('/')))
            .map_err(|e| SunprintError::Config(format!("Invalid API base: {e}")))?;

        let client = Client::builder()
            .user_agent(concat!("sunprint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                SunprintError::Config(format!("Failed to create HTTP client: {e}"))
            })?;

        info!("HTTP backend created");
        Ok(Self { client, base })
    }

    /// Resolve `path` (absolute URL, or relative to the API base).
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .or_else(|_| Url::parse(path))
            .map_err(|e| SunprintError::Config(format!("Bad URL '{path}': {e}")))
    }

    async fn check(response: Response, start: Instant) -> Result<Response> {
        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(status = %status, latency_ms, "Received HTTP response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        warn!(status = %status, latency_ms, detail = %detail, "Request rejected");
        Err(SunprintError::rejected(status.as_u16(), detail))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse JSON response");
            SunprintError::rejected(status.as_u16(), format!("Malformed response: {e}"))
        })
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.resolve(path)?;
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response, start).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.resolve(path)?;
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response, start).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::decode(self.get(path).await?).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(level = "debug", skip(self))]
    async fn health(&self) -> Result<()> {
        let url = self.resolve("api/health")?;
        // Any HTTP answer means the server is up.
        self.client
            .get(url)
            .send()
            .await
            .map(|_| ())
            .map_err(transport_error)
    }

    #[instrument(level = "debug", skip(self))]
    async fn store_config(&self) -> Result<StoreConfig> {
        let body: StoreConfigResponse = self.get_json("api/printify/store-config").await?;
        Ok(StoreConfig {
            storefront_domain: body.shopify_store_domain.filter(|d| !d.is_empty()),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_blueprints(&self) -> Result<Vec<Blueprint>> {
        let blueprints: Vec<Blueprint> = self.get_json("api/printify/blueprints").await?;
        debug!(count = blueprints.len(), "Fetched blueprints");
        Ok(blueprints)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_variants(&self, blueprint_id: u64, provider_id: u64) -> Result<Vec<Variant>> {
        let path =
            format!("api/printify/blueprints/{blueprint_id}/providers/{provider_id}/variants");
        let body: VariantsResponse = self.get_json(&path).await?;
        Ok(match body {
            VariantsResponse::Wrapped { variants } | VariantsResponse::Bare(variants) => variants,
        })
    }

    #[instrument(level = "debug", skip_all, fields(file_name = %upload.file_name))]
    async fn upload_asset(&self, upload: &AssetUpload) -> Result<String> {
        let body = UploadBody {
            file_name: &upload.file_name,
            contents: &upload.contents_base64,
        };
        let response = self.post("api/printify/upload", &body).await?;
        let status = response.status().as_u16();
        let parsed: IdResponse = Self::decode(response).await?;
        id_string(parsed.id).ok_or_else(|| SunprintError::rejected(status, "No image ID returned"))
    }

    #[instrument(level = "debug", skip_all, fields(blueprint_id = request.blueprint_id))]
    async fn create_mockup_product(&self, request: &MockupRequest) -> Result<MockupProduct> {
        let variant_ids: Vec<u64> = request.variants.iter().map(|v| v.id).collect();
        let body = ProductBody {
            title: &request.title,
            description: "Auto-generated mockup preview",
            blueprint_id: request.blueprint_id,
            print_provider_id: request.provider_id,
            variants: request
                .variants
                .iter()
                .map(|v| ProductVariantBody {
                    id: v.id,
                    price: v.unit_price_cents,
                    is_enabled: true,
                })
                .collect(),
            print_areas: vec![PrintAreaBody {
                variant_ids,
                placeholders: request
                    .placements
                    .iter()
                    .map(|p| PlaceholderBody {
                        position: &p.position,
                        images: p
                            .images
                            .iter()
                            .map(|img| PlaceholderImageBody {
                                id: &img.asset_id,
                                x: img.x,
                                y: img.y,
                                scale: img.scale,
                                angle: img.angle,
                            })
                            .collect(),
                    })
                    .collect(),
            }],
        };
        let response = self.post("api/printify/product", &body).await?;
        let parsed: ProductResponse = Self::decode(response).await?;
        Ok(MockupProduct {
            product_id: id_string(parsed.id).unwrap_or_default(),
            rendered_images: parsed
                .images
                .into_iter()
                .map(|img| MockupImage {
                    url: img.src,
                    is_default: img.is_default,
                })
                .collect(),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn request_preview(&self, request: &GenerationRequest) -> Result<PreviewResponse> {
        let response = self.post("api/generate_preview", request).await?;
        let status = response.status();
        if status == StatusCode::ACCEPTED {
            debug!("Preview pending");
            return Ok(PreviewResponse::Pending);
        }
        let body: PreviewBody = Self::decode(response).await?;
        match body.preview_url {
            Some(path) => Ok(PreviewResponse::Ready {
                preview_url: self.resolve(&path)?.to_string(),
            }),
            None => Err(SunprintError::rejected(
                status.as_u16(),
                body.error
                    .or(body.detail)
                    .unwrap_or_else(|| "No preview_url".to_string()),
            )),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn request_hq_generation(&self, request: &HqRequest) -> Result<HqTask> {
        let response = self.post("api/generate", request).await?;
        let status = response.status().as_u16();
        let body: HqTaskResponse = Self::decode(response).await?;
        match (body.task_id, body.status_url) {
            (Some(task_id), Some(status_url)) => Ok(HqTask {
                task_id,
                status_url: self.resolve(&status_url)?.to_string(),
            }),
            _ => Err(SunprintError::rejected(status, "HQ task failed to start")),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn poll_task(&self, status_url: &str) -> Result<TaskStatus> {
        let body: TaskStatusResponse = self.get_json(status_url).await?;
        let image_url = match body.image_url {
            Some(path) => Some(self.resolve(&path)?.to_string()),
            None => None,
        };
        Ok(TaskStatus {
            state: body.status,
            image_url,
            message: body.message,
        })
    }

    #[instrument(level = "info", skip_all, fields(blueprint_id = request.blueprint_id))]
    async fn submit_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        let body = CheckoutBody {
            image_base64: &request.image_base64,
            file_name: &request.file_name,
            title: &request.title,
            description: &request.description,
            blueprint_id: request.blueprint_id,
            print_provider_id: request.provider_id,
            variant_id: request.variant_id,
            price: request.price_cents,
            position: &request.placement,
            tags: &request.tags,
        };
        let response = self.post("api/printify/checkout", &body).await?;
        let status = response.status().as_u16();
        let parsed: CheckoutResponse = Self::decode(response).await?;
        let remote_product_id = id_string(parsed.printify_product_id)
            .ok_or_else(|| SunprintError::rejected(status, "No product ID returned"))?;
        Ok(CheckoutReceipt {
            remote_product_id,
            variant_count: parsed.variant_count,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn poll_storefront_url(&self, remote_product_id: &str) -> Result<StorefrontStatus> {
        let path = format!("api/printify/product/{remote_product_id}/shopify-url");
        let body: StorefrontResponse = self.get_json(&path).await?;
        Ok(match (body.status.as_deref(), body.shopify_url) {
            (Some("ready"), Some(url)) if !url.is_empty() => StorefrontStatus::Ready { url },
            _ => StorefrontStatus::Pending,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(bytes = bytes.len(), "Image downloaded");
        Ok(bytes.to_vec())
    }
}
