use crate::extract::{ExtractionRule, UrlRule};
use crate::models::{SourceId, TierId};
use crate::resolve::{FetchPlan, SourceProfile, TierSpec};
use url::Url;

/// Ozon hides prices behind scripted pages and has no public query
/// endpoint for article codes, so the machine starts with raw-body
/// pattern matching and escalates through parsed markup to a rendered
/// DOM. Both direct tiers are two-step: the search page surfaces the
/// product link, the product page surfaces the price.
pub fn ozon_profile() -> SourceProfile {
    SourceProfile {
        id: SourceId::Ozon,
        base: Url::parse("https://www.ozon.ru").expect("valid base url"),
        referer: "https://www.ozon.ru/".into(),
        structured_query_url: None,
        search_page_url: "https://www.ozon.ru/search/?text={}".into(),
        tiers: vec![
            TierSpec {
                tier: TierId::DirectFetchRegex,
                plan: FetchPlan::SearchThenProduct,
                price_rules: vec![
                    ExtractionRule::pattern(r#""originalPrice":\s*(\d+)"#),
                    ExtractionRule::pattern(r#""priceValue":\s*"([\d.,\s]+)""#),
                    ExtractionRule::pattern(r#""price":\s*(\d+)"#),
                    ExtractionRule::pattern(
                        r#"<meta property="product:price:amount"[^>]*content="([\d.]+)""#,
                    ),
                    ExtractionRule::pattern(r#""price-data"[^>]*data-price="(\d+)""#),
                ],
                url_rules: vec![
                    UrlRule::direct(ExtractionRule::pattern(
                        r#""(https://www\.ozon\.ru/product/[^"]+)""#,
                    )),
                    UrlRule::direct(ExtractionRule::pattern(
                        r#"href="(https://www\.ozon\.ru/product/[^"]+)""#,
                    )),
                    UrlRule::direct(ExtractionRule::pattern(r#"href="(/product/[^"]+)""#)),
                ],
            },
            TierSpec {
                tier: TierId::DirectFetchMarkup,
                plan: FetchPlan::SearchThenProduct,
                price_rules: vec![
                    ExtractionRule::selector(r#"[data-testid="price-container"]"#),
                    ExtractionRule::selector(".c-subtitle-price"),
                    ExtractionRule::selector(r#"[data-widget="pricesContainer"]"#),
                    ExtractionRule::selector(".display-price"),
                ],
                url_rules: vec![UrlRule::direct(ExtractionRule::selector_attr(
                    r#"a[href*="/product/"]"#,
                    "href",
                ))],
            },
            TierSpec {
                tier: TierId::RenderedFetch,
                plan: FetchPlan::Rendered,
                price_rules: vec![
                    ExtractionRule::selector(r#"[data-widget="searchResultsV2"] [class*="price"]"#),
                    ExtractionRule::selector(r#"[class*="tsHeadline"]"#),
                ],
                url_rules: vec![UrlRule::direct(ExtractionRule::selector_attr(
                    r#"a[href*="/product/"]"#,
                    "href",
                ))],
            },
        ],
    }
}
