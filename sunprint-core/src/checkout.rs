//! Checkout state machine.
//!
//! `Uploading -> CreatingProduct -> Publishing -> AwaitingStorefrontUrl -> Done`,
//! with `Failed` reachable from every non-terminal step. The backend uploads
//! and creates the product in one request, so the middle steps are reported
//! back to back once it answers. A storefront link that never shows up is not
//! a failure: the session completes with the generic collection page.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, CheckoutRequest, StorefrontStatus};
use crate::cache::HqEntry;
use crate::catalog::{ProductTemplate, ResolvedIds};
use crate::config::{CallClass, ClientConfig, Timeouts};
use crate::error::{Result, SunprintError};
use crate::generation::Selection;
use crate::raster::export;
use crate::retry::{PollOutcome, RetryPolicy, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Uploading,
    CreatingProduct,
    Publishing,
    AwaitingStorefrontUrl,
    Done,
    Failed,
}

impl CheckoutStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One checkout attempt. Discarded once terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub template_id: String,
    pub display_name: String,
    pub step: CheckoutStep,
    pub remote_product_id: Option<String>,
    pub storefront_url: Option<String>,
    /// The storefront link never arrived; `storefront_url` is the collection page.
    pub used_fallback: bool,
    pub error: Option<SunprintError>,
    /// Human readable progress line.
    pub message: String,
}

impl CheckoutSession {
    fn new(template: &ProductTemplate) -> Self {
        Self {
            template_id: template.id.clone(),
            display_name: template.display_name.clone(),
            step: CheckoutStep::Uploading,
            remote_product_id: None,
            storefront_url: None,
            used_fallback: false,
            error: None,
            message: "Uploading your design".to_string(),
        }
    }

    fn advance(&mut self, step: CheckoutStep, message: impl Into<String>) {
        debug!(template = %self.template_id, ?step, "Checkout step");
        self.step = step;
        self.message = message.into();
    }

    fn fail(&mut self, error: SunprintError) {
        self.message = error.user_message();
        self.error = Some(error);
        self.step = CheckoutStep::Failed;
    }
}

/// Check that a checkout may start. Runs before any network call.
pub fn validate(template: &ProductTemplate, hq: Option<&HqEntry>) -> Result<ResolvedIds> {
    if hq.is_none() {
        return Err(SunprintError::validation(
            "Generate the HQ image before ordering",
        ));
    }
    template.resolved().ok_or_else(|| {
        SunprintError::validation(format!(
            "{} is not ready yet, try again in a moment",
            template.display_name
        ))
    })
}

/// Checkout payload for `template` with an already exported image.
pub fn build_request(
    template: &ProductTemplate,
    ids: ResolvedIds,
    selection: Selection,
    image_base64: String,
) -> CheckoutRequest {
    let Selection { date, wavelength } = selection;
    let name = &template.display_name;
    CheckoutRequest {
        image_base64,
        file_name: export::file_name(date, wavelength, "hq"),
        title: format!("Solar {wavelength}\u{c5} \u{2014} {date} \u{b7} {name}"),
        description: format!(
            "Custom {wavelength}\u{c5} solar image from {date}, printed on {name}. Created with Sunprint."
        ),
        blueprint_id: ids.blueprint_id,
        provider_id: ids.provider_id,
        variant_id: ids.variant_id,
        price_cents: template.unit_price_cents,
        placement: template.placement.clone(),
        tags: vec![
            "sunprint".to_string(),
            "custom".to_string(),
            "sun".to_string(),
            format!("{wavelength}\u{c5}"),
            name.to_lowercase(),
        ],
    }
}

/// Drives one [`CheckoutSession`] to a terminal step.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    backend: Arc<dyn Backend>,
    timeouts: Timeouts,
    storefront_poll: RetryPolicy,
    fallback_url: String,
}

impl CheckoutOrchestrator {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            timeouts: config.timeouts.clone(),
            storefront_poll: config.storefront_poll,
            fallback_url: config.fallback_storefront_url(),
        }
    }

    /// Replace the fallback page, e.g. after the store domain was fetched.
    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }

    /// Run the checkout. Failures end in [`CheckoutStep::Failed`] rather than
    /// an `Err`; `on_progress` sees the session after every change.
    #[instrument(
        level = "info",
        skip_all,
        fields(template = %template.id, blueprint_id = request.blueprint_id)
    )]
    pub async fn run<F>(
        &self,
        template: &ProductTemplate,
        request: CheckoutRequest,
        mut on_progress: F,
    ) -> CheckoutSession
    where
        F: FnMut(&CheckoutSession) + Send,
    {
        let start = Instant::now();
        let mut session = CheckoutSession::new(template);
        on_progress(&session);

        let submitted = self
            .timeouts
            .guard(CallClass::Checkout, self.backend.submit_checkout(&request))
            .await;
        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Checkout submission failed");
                session.fail(e);
                on_progress(&session);
                return session;
            }
        };
        info!(
            remote_product_id = %receipt.remote_product_id,
            variants = ?receipt.variant_count,
            "Product created"
        );

        session.remote_product_id = Some(receipt.remote_product_id.clone());
        session.advance(CheckoutStep::CreatingProduct, "Product created");
        on_progress(&session);
        session.advance(CheckoutStep::Publishing, "Publishing to the storefront");
        on_progress(&session);
        session.advance(
            CheckoutStep::AwaitingStorefrontUrl,
            "Waiting for the storefront link",
        );
        on_progress(&session);

        let remote_id = receipt.remote_product_id.as_str();
        let max_attempts = self.storefront_poll.max_attempts;
        let outcome = self
            .storefront_poll
            .poll(|attempt| {
                session.message = format!(
                    "Waiting for the storefront link (attempt {attempt}/{max_attempts})"
                );
                on_progress(&session);
                async move {
                    let call = self.backend.poll_storefront_url(remote_id);
                    match self.timeouts.guard(CallClass::PollTick, call).await {
                        Ok(StorefrontStatus::Ready { url }) => Ok(Tick::Ready(url)),
                        Ok(StorefrontStatus::Pending) => Ok(Tick::Pending),
                        Err(e) => {
                            debug!(attempt, error = %e, "Storefront poll failed, counting as pending");
                            Ok(Tick::Pending)
                        }
                    }
                }
            })
            .await;

        match outcome {
            Ok(PollOutcome::Ready { value, attempts }) => {
                info!(
                    attempts,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Storefront link ready"
                );
                session.storefront_url = Some(value);
                session.advance(CheckoutStep::Done, "Your product is live");
            }
            Ok(PollOutcome::Exhausted { attempts }) => {
                warn!(attempts, fallback = %self.fallback_url, "Storefront link never arrived");
                session.storefront_url = Some(self.fallback_url.clone());
                session.used_fallback = true;
                session.advance(
                    CheckoutStep::Done,
                    "Your product is being published, browse the store to find it",
                );
            }
            // Ticks never fail, but keep the state machine total.
            Err(e) => session.fail(e),
        }
        on_progress(&session);
        session
    }
}
