use crate::extract::{ExtractionRule, ResponseBody, UrlRule, first_price, first_url, scan_price};
use crate::http::{Fetcher, jitter_pause};
use crate::metrics;
use crate::models::{ErrorKind, ProductIdentifier, SourceId, SourceQueryResult, TierId};
use crate::render::Renderer;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Resolves one identifier against one marketplace. The scheduler only
/// sees this trait, so tests drive it with scripted doubles.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    fn source(&self) -> SourceId;
    async fn resolve(&self, identifier: &ProductIdentifier) -> SourceQueryResult;
}

/// What a single tier produced. A URL without a price (or vice versa) is
/// still a success; the tier never discards a discovered URL because
/// price parsing failed.
#[derive(Debug, Clone)]
pub struct TierYield {
    pub price: Option<Decimal>,
    pub url: Option<String>,
}

#[derive(Debug)]
pub enum TierOutcome {
    Success(TierYield),
    /// Nothing usable in the response; `parse_failed` marks a price that
    /// matched a rule but did not survive normalization.
    NoMatch { parse_failed: bool },
    TransportFailure(ErrorKind),
}

/// How a tier talks to the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// GET the structured query endpoint, extract from the JSON payload.
    Structured,
    /// GET the product-search page, extract from that one body.
    SearchPage,
    /// Two-step: the search page yields the product URL, the product page
    /// yields the price.
    SearchThenProduct,
    /// Load the search page in a rendering environment and extract from
    /// the rendered DOM.
    Rendered,
}

pub struct TierSpec {
    pub tier: TierId,
    pub plan: FetchPlan,
    pub price_rules: Vec<ExtractionRule>,
    pub url_rules: Vec<UrlRule>,
}

/// Static description of one marketplace: where to ask and how to read
/// the answers, tier by tier. URL templates expand `{}` to the
/// percent-encoded identifier.
pub struct SourceProfile {
    pub id: SourceId,
    pub base: Url,
    pub referer: String,
    pub structured_query_url: Option<String>,
    pub search_page_url: String,
    pub tiers: Vec<TierSpec>,
}

impl SourceProfile {
    fn expand(template: &str, identifier: &ProductIdentifier) -> String {
        template.replace("{}", &urlencoding::encode(identifier.as_str()))
    }
}

/// Tiered fallback state machine over a [`SourceProfile`]: enter the
/// cheapest tier, escalate on transport failure or no-match, stop on the
/// first tier that yields anything.
pub struct MarketResolver {
    profile: SourceProfile,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    jitter: (Duration, Duration),
}

impl MarketResolver {
    pub fn new(
        profile: SourceProfile,
        fetcher: Arc<dyn Fetcher>,
        renderer: Option<Arc<dyn Renderer>>,
        jitter: (Duration, Duration),
    ) -> Self {
        Self {
            profile,
            fetcher,
            renderer,
            jitter,
        }
    }

    async fn run_tier(&self, spec: &TierSpec, identifier: &ProductIdentifier) -> TierOutcome {
        jitter_pause(self.jitter).await;
        let search_url = SourceProfile::expand(&self.profile.search_page_url, identifier);
        match spec.plan {
            FetchPlan::Structured => {
                let Some(template) = &self.profile.structured_query_url else {
                    return TierOutcome::NoMatch {
                        parse_failed: false,
                    };
                };
                let url = SourceProfile::expand(template, identifier);
                match self.fetcher.fetch_json(&url, &self.profile.referer).await {
                    Ok(payload) => self.harvest(spec, &ResponseBody::Json(payload)),
                    Err(err) => TierOutcome::TransportFailure(err.kind()),
                }
            }
            FetchPlan::SearchPage => {
                match self
                    .fetcher
                    .fetch_text(&search_url, &self.profile.referer)
                    .await
                {
                    Ok(body) => self.harvest(spec, &ResponseBody::Html(body)),
                    Err(err) => TierOutcome::TransportFailure(err.kind()),
                }
            }
            FetchPlan::SearchThenProduct => {
                let body = match self
                    .fetcher
                    .fetch_text(&search_url, &self.profile.referer)
                    .await
                {
                    Ok(body) => ResponseBody::Html(body),
                    Err(err) => return TierOutcome::TransportFailure(err.kind()),
                };
                let Some(product_url) = first_url(&spec.url_rules, &body, &self.profile.base)
                else {
                    return TierOutcome::NoMatch {
                        parse_failed: false,
                    };
                };
                jitter_pause(self.jitter).await;
                let price = match self
                    .fetcher
                    .fetch_text(&product_url, &self.profile.referer)
                    .await
                {
                    Ok(product_body) => {
                        first_price(&spec.price_rules, &ResponseBody::Html(product_body))
                    }
                    // The product page failing does not lose the URL the
                    // search already found.
                    Err(err) => {
                        debug!(
                            target = "pricescan.resolve",
                            source = self.profile.id.as_str(),
                            identifier = %identifier,
                            error = %err,
                            "product page fetch failed, keeping url"
                        );
                        None
                    }
                };
                TierOutcome::Success(TierYield {
                    price,
                    url: Some(product_url),
                })
            }
            FetchPlan::Rendered => {
                let Some(renderer) = &self.renderer else {
                    // Tier unavailable without a rendering capability.
                    return TierOutcome::NoMatch {
                        parse_failed: false,
                    };
                };
                match renderer.render(&search_url).await {
                    Ok(dom) => self.harvest(spec, &ResponseBody::Html(dom)),
                    Err(err) => {
                        warn!(
                            target = "pricescan.resolve",
                            source = self.profile.id.as_str(),
                            identifier = %identifier,
                            error = %err,
                            "rendered fetch failed"
                        );
                        TierOutcome::TransportFailure(ErrorKind::Transport)
                    }
                }
            }
        }
    }

    fn harvest(&self, spec: &TierSpec, body: &ResponseBody) -> TierOutcome {
        let scan = scan_price(&spec.price_rules, body);
        let url = first_url(&spec.url_rules, body, &self.profile.base);
        if scan.price.is_some() || url.is_some() {
            TierOutcome::Success(TierYield {
                price: scan.price,
                url,
            })
        } else {
            TierOutcome::NoMatch {
                parse_failed: scan.parse_failed,
            }
        }
    }
}

#[async_trait]
impl SourceResolver for MarketResolver {
    fn source(&self) -> SourceId {
        self.profile.id
    }

    async fn resolve(&self, identifier: &ProductIdentifier) -> SourceQueryResult {
        let started = Instant::now();
        let mut last_error: Option<ErrorKind> = None;
        let mut saw_parse_failure = false;
        for spec in &self.profile.tiers {
            match self.run_tier(spec, identifier).await {
                TierOutcome::Success(found) => {
                    info!(
                        target = "pricescan.resolve",
                        source = self.profile.id.as_str(),
                        identifier = %identifier,
                        tier = spec.tier.as_str(),
                        price = found.price.map(|p| p.to_string()),
                        "resolved"
                    );
                    metrics::source_resolved(
                        self.profile.id.as_str(),
                        spec.tier.as_str(),
                        started.elapsed().as_millis(),
                    );
                    return SourceQueryResult::resolved(
                        self.profile.id,
                        found.price,
                        found.url,
                        spec.tier,
                    );
                }
                TierOutcome::NoMatch { parse_failed } => {
                    if parse_failed {
                        saw_parse_failure = true;
                    }
                    debug!(
                        target = "pricescan.resolve",
                        source = self.profile.id.as_str(),
                        identifier = %identifier,
                        tier = spec.tier.as_str(),
                        "no match, escalating"
                    );
                    metrics::tier_escalated(self.profile.id.as_str(), spec.tier.as_str(), "no_match");
                }
                TierOutcome::TransportFailure(kind) => {
                    warn!(
                        target = "pricescan.resolve",
                        source = self.profile.id.as_str(),
                        identifier = %identifier,
                        tier = spec.tier.as_str(),
                        error = kind.as_str(),
                        "transport failure, escalating"
                    );
                    metrics::tier_escalated(
                        self.profile.id.as_str(),
                        spec.tier.as_str(),
                        "transport",
                    );
                    last_error = Some(kind);
                }
            }
        }
        let fallback = if saw_parse_failure {
            ErrorKind::Parse
        } else {
            ErrorKind::NotFound
        };
        SourceQueryResult::unresolved(self.profile.id, last_error.unwrap_or(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FetchError;
    use crate::render::RenderError;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Scripted {
        Text(String),
        Json(Value),
        Status(u16),
        Timeout,
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        responses: HashMap<String, Scripted>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn with(mut self, url: &str, response: Scripted) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn lookup(&self, url: &str) -> Result<&Scripted, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Scripted::Status(code)) => Err(FetchError::Status(*code)),
                Some(Scripted::Timeout) => Err(FetchError::Timeout),
                Some(other) => Ok(other),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_text(&self, url: &str, _referer: &str) -> Result<String, FetchError> {
            match self.lookup(url)? {
                Scripted::Text(body) => Ok(body.clone()),
                _ => Err(FetchError::Transport("wrong body kind".into())),
            }
        }

        async fn fetch_json(&self, url: &str, _referer: &str) -> Result<Value, FetchError> {
            match self.lookup(url)? {
                Scripted::Json(value) => Ok(value.clone()),
                _ => Err(FetchError::Transport("malformed envelope".into())),
            }
        }
    }

    struct CountingRenderer {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render(&self, _url: &str) -> Result<String, RenderError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Err(RenderError::Request("unreachable in tests".into()))
        }
    }

    const QUERY_URL: &str = "https://api.market.test/search?q={}";
    const SEARCH_URL: &str = "https://market.test/search?text={}";

    fn profile() -> SourceProfile {
        SourceProfile {
            id: SourceId::Ozon,
            base: Url::parse("https://market.test").unwrap(),
            referer: "https://market.test/".into(),
            structured_query_url: Some(QUERY_URL.into()),
            search_page_url: SEARCH_URL.into(),
            tiers: vec![
                TierSpec {
                    tier: TierId::StructuredQuery,
                    plan: FetchPlan::Structured,
                    price_rules: vec![ExtractionRule::json("items.0.price")],
                    url_rules: vec![UrlRule::templated(
                        ExtractionRule::json("items.0.id"),
                        "https://market.test/product/{}",
                    )],
                },
                TierSpec {
                    tier: TierId::DirectFetchMarkup,
                    plan: FetchPlan::SearchPage,
                    price_rules: vec![ExtractionRule::selector("span.price")],
                    url_rules: vec![UrlRule::direct(ExtractionRule::selector_attr(
                        "a.product",
                        "href",
                    ))],
                },
                TierSpec {
                    tier: TierId::RenderedFetch,
                    plan: FetchPlan::Rendered,
                    price_rules: vec![ExtractionRule::selector("span.price")],
                    url_rules: vec![],
                },
            ],
        }
    }

    fn no_jitter() -> (Duration, Duration) {
        (Duration::ZERO, Duration::ZERO)
    }

    fn identifier() -> ProductIdentifier {
        ProductIdentifier::new("GCS5261011").unwrap()
    }

    #[tokio::test]
    async fn escalation_stops_at_first_success() {
        let fetcher = ScriptedFetcher::default()
            .with(
                "https://api.market.test/search?q=GCS5261011",
                Scripted::Status(403),
            )
            .with(
                "https://market.test/search?text=GCS5261011",
                Scripted::Text(
                    r#"<a class="product" href="/product/77">x</a><span class="price">1 500</span>"#
                        .into(),
                ),
            );
        let renderer = Arc::new(CountingRenderer {
            invocations: AtomicUsize::new(0),
        });
        let resolver = MarketResolver::new(
            profile(),
            Arc::new(fetcher),
            Some(renderer.clone()),
            no_jitter(),
        );

        let result = resolver.resolve(&identifier()).await;
        assert_eq!(result.tier_used, Some(TierId::DirectFetchMarkup));
        assert_eq!(result.price, Some("1500".parse().unwrap()));
        assert_eq!(result.url.as_deref(), Some("https://market.test/product/77"));
        assert!(result.error.is_none());
        // The rendered tier must never have been entered.
        assert_eq!(renderer.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structured_tier_resolves_without_escalation() {
        let fetcher = ScriptedFetcher::default().with(
            "https://api.market.test/search?q=GCS5261011",
            Scripted::Json(json!({"items": [{"id": 42, "price": 12500}]})),
        );
        let fetcher = Arc::new(fetcher);
        let resolver = MarketResolver::new(profile(), fetcher.clone(), None, no_jitter());

        let result = resolver.resolve(&identifier()).await;
        assert_eq!(result.tier_used, Some(TierId::StructuredQuery));
        assert_eq!(result.price, Some("12500".parse().unwrap()));
        assert_eq!(result.url.as_deref(), Some("https://market.test/product/42"));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_tiers_report_last_transport_error() {
        let fetcher = ScriptedFetcher::default()
            .with(
                "https://api.market.test/search?q=GCS5261011",
                Scripted::Timeout,
            )
            .with(
                "https://market.test/search?text=GCS5261011",
                Scripted::Timeout,
            );
        let resolver = MarketResolver::new(profile(), Arc::new(fetcher), None, no_jitter());

        let result = resolver.resolve(&identifier()).await;
        assert!(!result.is_resolved());
        assert_eq!(result.error, Some(ErrorKind::Timeout));
        assert!(result.tier_used.is_none());
    }

    #[tokio::test]
    async fn clean_miss_reports_not_found() {
        let fetcher = ScriptedFetcher::default()
            .with(
                "https://api.market.test/search?q=GCS5261011",
                Scripted::Json(json!({"items": []})),
            )
            .with(
                "https://market.test/search?text=GCS5261011",
                Scripted::Text("<html><body>ничего не найдено</body></html>".into()),
            );
        let resolver = MarketResolver::new(profile(), Arc::new(fetcher), None, no_jitter());

        let result = resolver.resolve(&identifier()).await;
        assert_eq!(result.error, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn garbled_price_reports_parse_error() {
        // Both tiers match a price token that fails normalization and
        // surface no URL, so the terminal error distinguishes a garbled
        // price from a clean miss.
        let fetcher = ScriptedFetcher::default()
            .with(
                "https://api.market.test/search?q=GCS5261011",
                Scripted::Json(json!({"items": [{"price": "12.34.56"}]})),
            )
            .with(
                "https://market.test/search?text=GCS5261011",
                Scripted::Text(r#"<span class="price">12.34.56</span>"#.into()),
            );
        let resolver = MarketResolver::new(profile(), Arc::new(fetcher), None, no_jitter());

        let result = resolver.resolve(&identifier()).await;
        assert!(!result.is_resolved());
        assert_eq!(result.error, Some(ErrorKind::Parse));
    }

    #[tokio::test]
    async fn product_page_failure_keeps_discovered_url() {
        let mut two_step = profile();
        two_step.structured_query_url = None;
        two_step.tiers = vec![TierSpec {
            tier: TierId::DirectFetchRegex,
            plan: FetchPlan::SearchThenProduct,
            price_rules: vec![ExtractionRule::pattern(r#""price":\s*(\d+)"#)],
            url_rules: vec![UrlRule::direct(ExtractionRule::pattern(
                r#"href="(https://market\.test/product/[^"]+)""#,
            ))],
        }];
        let fetcher = ScriptedFetcher::default()
            .with(
                "https://market.test/search?text=GCS5261011",
                Scripted::Text(r#"<a href="https://market.test/product/99">x</a>"#.into()),
            )
            .with("https://market.test/product/99", Scripted::Status(502));
        let resolver = MarketResolver::new(two_step, Arc::new(fetcher), None, no_jitter());

        let result = resolver.resolve(&identifier()).await;
        assert_eq!(result.tier_used, Some(TierId::DirectFetchRegex));
        assert_eq!(result.url.as_deref(), Some("https://market.test/product/99"));
        assert!(result.price.is_none());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn identifier_is_percent_encoded_into_urls() {
        let expanded = SourceProfile::expand(
            SEARCH_URL,
            &ProductIdentifier::new("A B/1").unwrap(),
        );
        assert_eq!(expanded, "https://market.test/search?text=A%20B%2F1");
    }
}
