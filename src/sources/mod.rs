use crate::config::RunConfig;
use crate::http::Fetcher;
use crate::render::Renderer;
use crate::resolve::{MarketResolver, SourceProfile, SourceResolver};
use crate::models::SourceId;
use std::sync::Arc;

mod ozon;
mod wildberries;

pub use ozon::ozon_profile;
pub use wildberries::wildberries_profile;

pub fn profile_for(source: SourceId) -> SourceProfile {
    match source {
        SourceId::Ozon => ozon_profile(),
        SourceId::Wildberries => wildberries_profile(),
    }
}

/// One tiered resolver per configured source, all sharing the run's
/// session and optional renderer.
pub fn build_resolvers(
    config: &RunConfig,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
) -> Vec<Arc<dyn SourceResolver>> {
    config
        .sources
        .iter()
        .map(|source| {
            Arc::new(MarketResolver::new(
                profile_for(*source),
                fetcher.clone(),
                renderer.clone(),
                config.request_jitter,
            )) as Arc<dyn SourceResolver>
        })
        .collect()
}
