use crate::extract::{ExtractionRule, UrlRule};
use crate::models::{SourceId, TierId};
use crate::resolve::{FetchPlan, SourceProfile, TierSpec};
use url::Url;

const CATALOG_URL: &str = "https://www.wildberries.ru/catalog/{}/detail.aspx";

/// Wildberries still answers its exact-match search endpoint with JSON,
/// so the cheapest tier is structured. Prices there are quoted in
/// kopecks (`salePriceU`/`priceU`), hence the scale of 2. The direct
/// tiers read the legacy search-result page, whose cards embed product
/// ids both in script payloads and in data attributes.
pub fn wildberries_profile() -> SourceProfile {
    SourceProfile {
        id: SourceId::Wildberries,
        base: Url::parse("https://www.wildberries.ru").expect("valid base url"),
        referer: "https://www.wildberries.ru/".into(),
        structured_query_url: Some("https://search.wb.ru/exactmatch/v2/header/q/{}".into()),
        search_page_url: "https://www.wildberries.ru/catalog/0/searchresult.aspx?search={}".into(),
        tiers: vec![
            TierSpec {
                tier: TierId::StructuredQuery,
                plan: FetchPlan::Structured,
                price_rules: vec![
                    ExtractionRule::json_scaled("data.products.0.salePriceU", 2),
                    ExtractionRule::json_scaled("data.products.0.priceU", 2),
                    ExtractionRule::json("data.products.0.prices.salePrice"),
                ],
                url_rules: vec![UrlRule::templated(
                    ExtractionRule::json("data.products.0.id"),
                    CATALOG_URL,
                )],
            },
            TierSpec {
                tier: TierId::DirectFetchRegex,
                plan: FetchPlan::SearchPage,
                price_rules: vec![
                    ExtractionRule::pattern(r#""salePrice":\s*([\d.]+)"#),
                    ExtractionRule::pattern(r#"data-price="([\d.]+)""#),
                ],
                url_rules: vec![
                    UrlRule::templated(
                        ExtractionRule::pattern(r#""productId":\s*(\d+)"#),
                        CATALOG_URL,
                    ),
                    UrlRule::templated(
                        ExtractionRule::pattern(r#"data-product-id="(\d+)""#),
                        CATALOG_URL,
                    ),
                ],
            },
            TierSpec {
                tier: TierId::DirectFetchMarkup,
                plan: FetchPlan::SearchPage,
                price_rules: vec![
                    ExtractionRule::selector("div.product-card ins.price"),
                    ExtractionRule::selector("div.product-card span.price-bold"),
                    ExtractionRule::selector("span.j-cur-price"),
                ],
                url_rules: vec![
                    UrlRule::direct(ExtractionRule::selector_attr(
                        "div.product-card a.product-card__link",
                        "href",
                    )),
                    UrlRule::direct(ExtractionRule::selector_attr("a.j-card-link", "href")),
                ],
            },
            TierSpec {
                tier: TierId::RenderedFetch,
                plan: FetchPlan::Rendered,
                price_rules: vec![
                    ExtractionRule::selector("ins.price-block__final-price"),
                    ExtractionRule::selector("div.product-card ins.price"),
                ],
                url_rules: vec![UrlRule::direct(ExtractionRule::selector_attr(
                    r#"a[href*="/catalog/"]"#,
                    "href",
                ))],
            },
        ],
    }
}
