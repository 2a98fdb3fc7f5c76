//! Preview and HQ image generation.
//!
//! Previews may answer "pending"; the request is then repeated on the
//! preview poll policy. HQ renders are asynchronous tasks whose status URL is
//! polled until the task completes or fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use image::RgbaImage;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, GenerationRequest, HqRequest, PreviewResponse, TaskState};
use crate::config::{CallClass, ClientConfig};
use crate::error::{Result, SunprintError};
use crate::retry::{PollOutcome, Tick};

/// A date and wavelength (in angstroms) to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub date: NaiveDate,
    pub wavelength: u32,
}

impl Selection {
    pub fn new(date: NaiveDate, wavelength: u32) -> Self {
        Self { date, wavelength }
    }
}

/// Drives generation calls against a [`Backend`].
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
}

impl Generator {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            config: config.clone(),
        }
    }

    /// URL of a ready preview.
    #[instrument(
        level = "info",
        skip(self),
        fields(date = %selection.date, wavelength = selection.wavelength)
    )]
    pub async fn preview_url(&self, selection: Selection) -> Result<String> {
        let start = Instant::now();
        let request = GenerationRequest {
            date: selection.date,
            wavelength: selection.wavelength,
            mission: self.config.mission.clone(),
        };
        let timeouts = &self.config.timeouts;

        // First answer is immediate; only a 202 enters the poll loop.
        let first = timeouts
            .guard(CallClass::Generation, self.backend.request_preview(&request))
            .await?;
        if let PreviewResponse::Ready { preview_url } = first {
            debug!(latency_ms = start.elapsed().as_millis() as u64, "Preview ready");
            return Ok(preview_url);
        }

        info!("Preview pending, polling");
        let outcome = self
            .config
            .preview_poll
            .poll(|attempt| {
                let request = &request;
                async move {
                    debug!(attempt, "Re-requesting preview");
                    let answer = timeouts
                        .guard(CallClass::PollTick, self.backend.request_preview(request))
                        .await?;
                    Ok(match answer {
                        PreviewResponse::Ready { preview_url } => Tick::Ready(preview_url),
                        PreviewResponse::Pending => Tick::Pending,
                    })
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                info!(
                    attempts,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Preview ready"
                );
                Ok(value)
            }
            PollOutcome::Exhausted { attempts } => {
                warn!(attempts, "Preview never became ready");
                Err(SunprintError::PollExhausted { attempts })
            }
        }
    }

    /// Start an HQ render and poll it to completion. Returns the image URL.
    #[instrument(
        level = "info",
        skip(self),
        fields(date = %selection.date, wavelength = selection.wavelength)
    )]
    pub async fn hq_url(&self, selection: Selection) -> Result<String> {
        let start = Instant::now();
        let request = HqRequest {
            date: selection.date,
            wavelength: selection.wavelength,
            mission: self.config.mission.clone(),
            detector: self.config.detector.clone(),
        };
        let timeouts = &self.config.timeouts;

        let task = timeouts
            .guard(
                CallClass::HqGeneration,
                self.backend.request_hq_generation(&request),
            )
            .await?;
        debug!(task_id = %task.task_id, "HQ task started");

        let status_url = task.status_url.as_str();
        let outcome = self
            .config
            .hq_poll
            .poll(|attempt| async move {
                let status = timeouts
                    .guard(CallClass::PollTick, self.backend.poll_task(status_url))
                    .await?;
                debug!(attempt, state = ?status.state, "HQ task status");
                match (status.state, status.image_url) {
                    (TaskState::Completed, Some(url)) => Ok(Tick::Ready(url)),
                    (TaskState::Completed, None) | (TaskState::Failed, _) => {
                        Err(SunprintError::rejected(
                            200,
                            status
                                .message
                                .unwrap_or_else(|| "HQ generation failed".to_string()),
                        ))
                    }
                    _ => Ok(Tick::Pending),
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                info!(
                    attempts,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "HQ render ready"
                );
                Ok(value)
            }
            PollOutcome::Exhausted { attempts } => {
                warn!(attempts, "HQ render did not finish in time");
                Err(SunprintError::PollExhausted { attempts })
            }
        }
    }

    /// Download and decode an image.
    #[instrument(level = "debug", skip(self))]
    pub async fn download(&self, url: &str) -> Result<RgbaImage> {
        let bytes = self
            .config
            .timeouts
            .guard(CallClass::Generation, self.backend.fetch_image(url))
            .await?;
        let img = image::load_from_memory(&bytes)?;
        debug!(width = img.width(), height = img.height(), "Image decoded");
        Ok(img.to_rgba8())
    }

    pub async fn preview(&self, selection: Selection) -> Result<RgbaImage> {
        let url = self.preview_url(selection).await?;
        self.download(&url).await
    }
}
