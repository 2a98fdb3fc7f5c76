//! Product templates and catalog resolution.
//!
//! Templates start out abstract: a display name, a price and a few match
//! terms. The [`CatalogResolver`] turns them into concrete
//! (blueprint, provider, variant) ids against the live catalog, once per
//! session. Templates that cannot be matched stay unresolved and are never
//! guessed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, Blueprint, Variant};
use crate::config::{CallClass, ClientConfig, Timeouts};
use crate::edit::CropAspect;
use crate::error::{Result, SunprintError};

/// Price for products added from the full catalog.
pub const CATALOG_PRODUCT_PRICE_CENTS: u32 = 2999;

/// Print area used when nothing more specific is known.
pub const DEFAULT_PLACEMENT: &str = "front";

/// Concrete catalog identifiers for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIds {
    pub blueprint_id: u64,
    pub provider_id: u64,
    pub variant_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTemplate {
    pub id: String,
    pub display_name: String,
    pub unit_price_cents: u32,
    pub match_terms: Vec<String>,
    pub resolved_blueprint_id: Option<u64>,
    pub resolved_provider_id: Option<u64>,
    pub resolved_variant_id: Option<u64>,
    pub placement: String,
    /// Crop ratio that fits the print area.
    pub aspect: CropAspect,
}

impl ProductTemplate {
    /// Unresolved template.
    pub fn new(id: &str, display_name: &str, unit_price_cents: u32, match_terms: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            unit_price_cents,
            match_terms: match_terms.iter().map(|t| t.to_string()).collect(),
            resolved_blueprint_id: None,
            resolved_provider_id: None,
            resolved_variant_id: None,
            placement: DEFAULT_PLACEMENT.to_string(),
            aspect: CropAspect::default(),
        }
    }

    pub fn with_aspect(mut self, width: u32, height: u32) -> Self {
        self.aspect = CropAspect::Ratio { width, height };
        self
    }

    /// All three ids, or `None` while any is missing.
    pub fn resolved(&self) -> Option<ResolvedIds> {
        Some(ResolvedIds {
            blueprint_id: self.resolved_blueprint_id?,
            provider_id: self.resolved_provider_id?,
            variant_id: self.resolved_variant_id?,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved().is_some()
    }

    pub fn set_resolved(&mut self, ids: ResolvedIds) {
        self.resolved_blueprint_id = Some(ids.blueprint_id);
        self.resolved_provider_id = Some(ids.provider_id);
        self.resolved_variant_id = Some(ids.variant_id);
    }

    /// Template for a blueprint picked from the full catalog.
    pub fn from_catalog(blueprint: &Blueprint, provider_id: u64, variant_id: u64) -> Self {
        let mut template = Self::new(
            &format!("catalog_{}_{provider_id}", blueprint.id),
            &blueprint.title,
            CATALOG_PRODUCT_PRICE_CENTS,
            &[],
        );
        template.set_resolved(ResolvedIds {
            blueprint_id: blueprint.id,
            provider_id,
            variant_id,
        });
        template
    }
}

/// Seed set loaded at session start.
pub fn default_templates() -> Vec<ProductTemplate> {
    vec![
        ProductTemplate::new("tshirt_unisex", "Unisex T-Shirt", 2499, &["unisex", "jersey", "tee"]),
        ProductTemplate::new(
            "hoodie_pullover",
            "Pullover Hoodie",
            3999,
            &["hooded", "sweatshirt", "heavy blend"],
        ),
        ProductTemplate::new("mug_15oz", "Ceramic Mug 15oz", 1499, &["mug", "15oz"])
            .with_aspect(2, 1),
        ProductTemplate::new("poster_matte", "Matte Poster", 999, &["matte", "poster"])
            .with_aspect(11, 14),
        ProductTemplate::new("throw_pillow", "Throw Pillow", 2299, &["pillow", "square"]),
        ProductTemplate::new("phone_case", "Phone Case", 1999, &["phone", "case"])
            .with_aspect(9, 19),
        ProductTemplate::new("mouse_pad", "Mouse Pad", 1199, &["mouse pad"]),
        ProductTemplate::new("tote_bag", "Tote Bag", 1999, &["tote"]),
        ProductTemplate::new("sticker_kiss", "Kiss-Cut Stickers", 299, &["kiss-cut", "sticker"]),
        ProductTemplate::new("canvas_stretched", "Stretched Canvas", 2999, &["canvas", "stretched"]),
    ]
}

/// Number of `terms` found in `title`, case-insensitively.
pub fn score(terms: &[String], title: &str) -> usize {
    let title = title.to_lowercase();
    terms
        .iter()
        .filter(|term| !term.is_empty() && title.contains(&term.to_lowercase()))
        .count()
}

/// Highest-scoring blueprint with a nonzero score. Ties go to the earlier one.
pub fn best_blueprint<'a>(terms: &[String], blueprints: &'a [Blueprint]) -> Option<&'a Blueprint> {
    let mut best: Option<(&Blueprint, usize)> = None;
    for blueprint in blueprints {
        let s = score(terms, &blueprint.title);
        match best {
            Some((_, top)) if s <= top => {}
            _ if s > 0 => best = Some((blueprint, s)),
            _ => {}
        }
    }
    best.map(|(b, _)| b)
}

/// Blueprints whose title or id contains `query`, case-insensitively.
pub fn browse<'a>(blueprints: &'a [Blueprint], query: &str) -> Vec<&'a Blueprint> {
    let query = query.trim().to_lowercase();
    blueprints
        .iter()
        .filter(|b| {
            query.is_empty()
                || b.title.to_lowercase().contains(&query)
                || b.id.to_string().contains(&query)
        })
        .collect()
}

/// Provider that prints a blueprint, with its variant list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMatch {
    pub provider_id: u64,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub template_id: String,
    pub ids: ResolvedIds,
}

/// Result of one resolver run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionReport {
    pub resolutions: Vec<Resolution>,
    /// Templates left without ids.
    pub unresolved: Vec<String>,
    /// The catalog as fetched, kept for browsing.
    pub blueprints: Vec<Blueprint>,
}

impl ResolutionReport {
    /// Write resolved ids into matching templates. Returns how many changed.
    pub fn apply(&self, templates: &mut [ProductTemplate]) -> usize {
        let mut applied = 0;
        for resolution in &self.resolutions {
            if let Some(t) = templates.iter_mut().find(|t| t.id == resolution.template_id) {
                t.set_resolved(resolution.ids);
                applied += 1;
            }
        }
        applied
    }
}

/// Maps templates to catalog ids.
#[derive(Clone)]
pub struct CatalogResolver {
    backend: Arc<dyn Backend>,
    timeouts: Timeouts,
    providers: Vec<u64>,
}

impl CatalogResolver {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            timeouts: config.timeouts.clone(),
            providers: config.provider_preference.clone(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_blueprints(&self) -> Result<Vec<Blueprint>> {
        self.timeouts
            .guard(CallClass::Catalog, self.backend.fetch_blueprints())
            .await
    }

    /// First provider, in preference order, with a nonempty variant list.
    ///
    /// Request failures count as "try the next provider".
    #[instrument(level = "debug", skip(self))]
    pub async fn find_variants(&self, blueprint_id: u64) -> Option<ProviderMatch> {
        for &provider_id in &self.providers {
            let call = self.backend.fetch_variants(blueprint_id, provider_id);
            match self.timeouts.guard(CallClass::VariantLookup, call).await {
                Ok(variants) if !variants.is_empty() => {
                    debug!(provider_id, count = variants.len(), "Provider has variants");
                    return Some(ProviderMatch {
                        provider_id,
                        variants,
                    });
                }
                Ok(_) => debug!(provider_id, "Provider has no variants"),
                Err(e) => debug!(provider_id, error = %e, "Variant lookup failed, trying next"),
            }
        }
        None
    }

    /// Resolve every template that is not resolved yet.
    ///
    /// Only the catalog fetch itself can fail the run; per-template misses
    /// are reported in [`ResolutionReport::unresolved`].
    #[instrument(level = "info", skip_all, fields(templates = templates.len()))]
    pub async fn resolve(&self, templates: &[ProductTemplate]) -> Result<ResolutionReport> {
        let blueprints = self.fetch_blueprints().await?;
        if blueprints.is_empty() {
            return Err(SunprintError::rejected(200, "Catalog returned no blueprints"));
        }

        let mut report = ResolutionReport::default();
        for template in templates.iter().filter(|t| !t.is_resolved()) {
            let Some(blueprint) = best_blueprint(&template.match_terms, &blueprints) else {
                debug!(template = %template.id, "No blueprint matches");
                report.unresolved.push(template.id.clone());
                continue;
            };
            match self.find_variants(blueprint.id).await {
                Some(found) => {
                    let ids = ResolvedIds {
                        blueprint_id: blueprint.id,
                        provider_id: found.provider_id,
                        variant_id: found.variants[0].id,
                    };
                    debug!(template = %template.id, ?ids, "Template resolved");
                    report.resolutions.push(Resolution {
                        template_id: template.id.clone(),
                        ids,
                    });
                }
                None => {
                    warn!(
                        template = %template.id,
                        blueprint_id = blueprint.id,
                        "No provider prints this blueprint"
                    );
                    report.unresolved.push(template.id.clone());
                }
            }
        }

        info!(
            resolved = report.resolutions.len(),
            unresolved = report.unresolved.len(),
            "Catalog resolution finished"
        );
        report.blueprints = blueprints;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::time::Duration;

    fn bp(id: u64, title: &str) -> Blueprint {
        Blueprint {
            id,
            title: title.to_string(),
            brand: None,
            images: Vec::new(),
        }
    }

    fn variant(id: u64) -> Variant {
        Variant {
            id,
            title: None,
            options: None,
        }
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_score_counts_terms() {
        let mug = terms(&["mug", "15oz"]);
        assert_eq!(score(&mug, "15oz Mug"), 2);
        assert_eq!(score(&mug, "Tote Bag"), 0);
    }

    #[test]
    fn test_best_blueprint_prefers_highest_then_first() {
        let blueprints = vec![
            bp(1, "Tote Bag"),
            bp(2, "Mug 11oz"),
            bp(3, "15oz Mug"),
            bp(4, "Mug 15oz"),
        ];
        let best = best_blueprint(&terms(&["mug", "15oz"]), &blueprints).unwrap();
        assert_eq!(best.id, 3);
        assert!(best_blueprint(&terms(&["blanket"]), &blueprints).is_none());
    }

    #[test]
    fn test_browse_matches_title_or_id() {
        let blueprints = vec![bp(12, "Unisex Tee"), bp(425, "Ceramic Mug")];
        assert_eq!(browse(&blueprints, "MUG")[0].id, 425);
        assert_eq!(browse(&blueprints, "12")[0].id, 12);
        assert_eq!(browse(&blueprints, "").len(), 2);
    }

    #[test]
    fn test_from_catalog_is_resolved() {
        let t = ProductTemplate::from_catalog(&bp(77, "Hoodie"), 29, 3001);
        assert_eq!(t.id, "catalog_77_29");
        assert_eq!(t.unit_price_cents, 2999);
        assert_eq!(t.placement, "front");
        assert!(t.is_resolved());
    }

    #[test]
    fn test_default_templates_start_unresolved() {
        let templates = default_templates();
        assert!(templates.iter().all(|t| !t.is_resolved()));
        assert!(templates.iter().all(|t| !t.match_terms.is_empty()));
    }

    #[tokio::test]
    async fn test_resolve_uses_provider_preference() {
        let mock = MockBackend::new()
            .with_blueprints(vec![bp(10, "Tote Bag"), bp(20, "15oz Mug")])
            .fail_variants(20, 16)
            .with_variants(20, 99, vec![variant(991), variant(992)])
            .with_variants(20, 1, vec![variant(11)]);
        let mock = Arc::new(mock);
        let resolver = CatalogResolver::new(mock.clone(), &ClientConfig::default());

        let templates = vec![
            ProductTemplate::new("mug", "Mug", 1499, &["mug", "15oz"]),
            ProductTemplate::new("blanket", "Blanket", 4499, &["blanket"]),
        ];
        let report = resolver.resolve(&templates).await.unwrap();

        assert_eq!(
            report.resolutions,
            vec![Resolution {
                template_id: "mug".into(),
                ids: ResolvedIds {
                    blueprint_id: 20,
                    provider_id: 99,
                    variant_id: 991
                }
            }]
        );
        assert_eq!(report.unresolved, vec!["blanket".to_string()]);
        // 16 errors, 29 is empty, 99 answers.
        assert_eq!(mock.call_count("fetch_variants"), 3);
    }

    #[tokio::test]
    async fn test_exhausted_providers_leave_template_unresolved() {
        let mock = Arc::new(MockBackend::new().with_blueprints(vec![bp(20, "15oz Mug")]));
        let resolver = CatalogResolver::new(mock.clone(), &ClientConfig::default());
        let mut templates = vec![ProductTemplate::new("mug", "Mug", 1499, &["mug"])];
        let report = resolver.resolve(&templates).await.unwrap();
        assert_eq!(report.apply(&mut templates), 0);
        assert!(!templates[0].is_resolved());
        assert_eq!(
            mock.call_count("fetch_variants"),
            ClientConfig::default().provider_preference.len()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_variant_lookup_times_out() {
        // Slow enough to miss the variant lookup limit but not the catalog one.
        let mock = MockBackend::new()
            .with_latency(Duration::from_secs(35))
            .with_blueprints(vec![bp(20, "15oz Mug")])
            .with_variants(20, 16, vec![variant(1601)]);
        let resolver = CatalogResolver::new(Arc::new(mock), &ClientConfig::default());
        assert_eq!(resolver.fetch_blueprints().await.unwrap().len(), 1);
        assert!(resolver.find_variants(20).await.is_none());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_an_error() {
        let mock = Arc::new(MockBackend::new().fail_catalog(SunprintError::unreachable("down")));
        let resolver = CatalogResolver::new(mock, &ClientConfig::default());
        assert!(resolver.resolve(&default_templates()).await.is_err());
    }
}
