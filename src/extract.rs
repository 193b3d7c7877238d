use crate::normalize::normalize_price;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// What a tier's network operation produced, ready for extraction.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Html(String),
}

/// One way of locating a value inside a response body.
#[derive(Debug, Clone)]
pub enum ExtractionRule {
    /// Dotted path into a structured payload; numeric segments index
    /// arrays (`data.products.0.salePriceU`). `scale` divides the matched
    /// number by 10^scale (marketplace APIs that quote minor units).
    JsonField { path: String, scale: u32 },
    /// Regex over the raw body text; `group` is the capture to take.
    Pattern { regex: Regex, group: usize },
    /// CSS selector over the parsed markup; takes the element text, or
    /// the named attribute when `attr` is set.
    Selector { css: String, attr: Option<String> },
}

impl ExtractionRule {
    pub fn json(path: &str) -> Self {
        Self::JsonField {
            path: path.to_string(),
            scale: 0,
        }
    }

    pub fn json_scaled(path: &str, scale: u32) -> Self {
        Self::JsonField {
            path: path.to_string(),
            scale,
        }
    }

    pub fn pattern(pattern: &str) -> Self {
        Self::Pattern {
            regex: Regex::new(pattern).expect("valid extraction pattern"),
            group: 1,
        }
    }

    pub fn selector(css: &str) -> Self {
        Self::Selector {
            css: css.to_string(),
            attr: None,
        }
    }

    pub fn selector_attr(css: &str, attr: &str) -> Self {
        Self::Selector {
            css: css.to_string(),
            attr: Some(attr.to_string()),
        }
    }

    fn scale(&self) -> u32 {
        match self {
            Self::JsonField { scale, .. } => *scale,
            _ => 0,
        }
    }

    /// Numeric value this rule yields from `body`. Structured numbers are
    /// already canonical decimal text and parse directly; only string and
    /// markup tokens go through the locale heuristic.
    fn price_value(&self, body: &ResponseBody) -> PriceToken {
        if let (Self::JsonField { path, .. }, ResponseBody::Json(value)) = (self, body)
            && let Some(Value::Number(number)) = json_walk(value, path)
        {
            return match parse_exact(&number.to_string()) {
                Some(value) => PriceToken::Value(value),
                None => PriceToken::Unparseable,
            };
        }
        match self.extract(body) {
            Some(token) => match normalize_price(&token) {
                Ok(value) => PriceToken::Value(value),
                Err(_) => PriceToken::Unparseable,
            },
            None => PriceToken::NoMatch,
        }
    }

    /// Raw token this rule matches in `body`, if any. A rule applied to a
    /// body kind it does not understand is simply a non-match.
    pub fn extract(&self, body: &ResponseBody) -> Option<String> {
        match (self, body) {
            (Self::JsonField { path, .. }, ResponseBody::Json(value)) => {
                json_lookup(value, path)
            }
            (Self::Pattern { regex, group }, ResponseBody::Html(text)) => {
                let matched = regex.captures(text)?.get(*group)?.as_str().trim();
                (!matched.is_empty()).then(|| matched.to_string())
            }
            (Self::Selector { css, attr }, ResponseBody::Html(text)) => {
                let selector = Selector::parse(css).ok()?;
                let document = Html::parse_document(text);
                let element = document.select(&selector).next()?;
                let token = match attr {
                    Some(name) => element.value().attr(name)?.trim().to_string(),
                    None => element.text().collect::<String>().trim().to_string(),
                };
                (!token.is_empty()).then_some(token)
            }
            _ => None,
        }
    }
}

/// URL extraction: a rule plus an optional template for sources whose
/// pages expose a product id rather than a full link; `{}` is replaced
/// with the matched token.
#[derive(Debug, Clone)]
pub struct UrlRule {
    pub rule: ExtractionRule,
    pub template: Option<String>,
}

impl UrlRule {
    pub fn direct(rule: ExtractionRule) -> Self {
        Self {
            rule,
            template: None,
        }
    }

    pub fn templated(rule: ExtractionRule, template: &str) -> Self {
        Self {
            rule,
            template: Some(template.to_string()),
        }
    }
}

enum PriceToken {
    Value(Decimal),
    Unparseable,
    NoMatch,
}

/// Outcome of running the price rules of one tier. `parse_failed` records
/// whether any rule matched a token that then failed normalization, so
/// the resolver can tell a garbled price apart from a clean miss.
pub struct PriceScan {
    pub price: Option<Decimal>,
    pub parse_failed: bool,
}

/// First rule whose match survives numeric normalization wins; a match
/// that fails to normalize is noted and the pipeline moves on. No rule
/// matching is an empty scan, not an error.
pub fn scan_price(rules: &[ExtractionRule], body: &ResponseBody) -> PriceScan {
    let mut parse_failed = false;
    for rule in rules {
        match rule.price_value(body) {
            PriceToken::Value(value) => {
                return PriceScan {
                    price: Some(descale(value, rule.scale())),
                    parse_failed,
                };
            }
            PriceToken::Unparseable => parse_failed = true,
            PriceToken::NoMatch => {}
        }
    }
    PriceScan {
        price: None,
        parse_failed,
    }
}

pub fn first_price(rules: &[ExtractionRule], body: &ResponseBody) -> Option<Decimal> {
    scan_price(rules, body).price
}

/// First rule yielding a non-empty token wins; relative links are joined
/// against `base`.
pub fn first_url(rules: &[UrlRule], body: &ResponseBody, base: &Url) -> Option<String> {
    for rule in rules {
        let Some(token) = rule.rule.extract(body) else {
            continue;
        };
        let candidate = match &rule.template {
            Some(template) => template.replace("{}", token.trim()),
            None => token.trim().to_string(),
        };
        if let Ok(joined) = base.join(&candidate) {
            return Some(joined.to_string());
        }
    }
    None
}

fn descale(value: Decimal, scale: u32) -> Decimal {
    if scale == 0 {
        value
    } else {
        value / Decimal::from(10u64.pow(scale))
    }
}

/// Exact decimal text straight from a structured payload; serde_json can
/// print large floats in scientific notation, hence the second attempt.
fn parse_exact(text: &str) -> Option<Decimal> {
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

fn json_walk<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn json_lookup(value: &Value, path: &str) -> Option<String> {
    match json_walk(value, path)? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    fn base() -> Url {
        Url::parse("https://market.example").unwrap()
    }

    #[test]
    fn json_path_walks_objects_and_arrays() {
        let body = ResponseBody::Json(json!({
            "data": { "products": [ { "salePriceU": 1250000 } ] }
        }));
        let rules = [ExtractionRule::json_scaled("data.products.0.salePriceU", 2)];
        assert_eq!(first_price(&rules, &body), Some(dec("12500")));
    }

    #[test]
    fn json_number_is_taken_verbatim() {
        // A structured 1234.567 must stay 1234.567; the three fractional
        // digits would read as a thousands group under the locale rules.
        let body = ResponseBody::Json(json!({"price": 1234.567}));
        let rules = [ExtractionRule::json("price")];
        assert_eq!(first_price(&rules, &body), Some(dec("1234.567")));

        let body = ResponseBody::Json(json!({"price": 1234}));
        assert_eq!(first_price(&rules, &body), Some(dec("1234")));
    }

    #[test]
    fn json_string_price_still_normalizes() {
        let body = ResponseBody::Json(json!({"price": "1 234,56 ₽"}));
        let rules = [ExtractionRule::json("price")];
        assert_eq!(first_price(&rules, &body), Some(dec("1234.56")));
    }

    #[test]
    fn scan_notes_matched_but_unparseable_price() {
        let body = ResponseBody::Html(r#"<span class="price">12.34.56</span>"#.into());
        let scan = scan_price(&[ExtractionRule::selector("span.price")], &body);
        assert!(scan.price.is_none());
        assert!(scan.parse_failed);

        let clean_miss = ResponseBody::Html("<html><body>sold out</body></html>".into());
        let scan = scan_price(&[ExtractionRule::selector("span.price")], &clean_miss);
        assert!(scan.price.is_none());
        assert!(!scan.parse_failed);
    }

    #[test]
    fn first_matching_rule_wins() {
        let body = ResponseBody::Html(r#"{"originalPrice": 9900, "price": 4500}"#.into());
        let rules = [
            ExtractionRule::pattern(r#""originalPrice":\s*(\d+)"#),
            ExtractionRule::pattern(r#""price":\s*(\d+)"#),
        ];
        assert_eq!(first_price(&rules, &body), Some(dec("9900")));
    }

    #[test]
    fn failed_normalization_falls_through_to_next_rule() {
        let body = ResponseBody::Html(
            r#"<span class="price">12.34.56</span><div data-price="799">"#.into(),
        );
        let rules = [
            ExtractionRule::selector("span.price"),
            ExtractionRule::pattern(r#"data-price="(\d+)""#),
        ];
        assert_eq!(first_price(&rules, &body), Some(dec("799")));
    }

    #[test]
    fn no_rule_matching_is_none() {
        let body = ResponseBody::Html("<html><body>sold out</body></html>".into());
        let rules = [ExtractionRule::pattern(r#""price":\s*(\d+)"#)];
        assert_eq!(first_price(&rules, &body), None);
    }

    #[test]
    fn selector_text_and_attribute() {
        let html = r#"<div class="card"><a class="link" href="/catalog/42/detail.aspx">item</a>
            <span class="final-price">1 299,50 ₽</span></div>"#;
        let body = ResponseBody::Html(html.into());
        assert_eq!(
            first_price(&[ExtractionRule::selector("span.final-price")], &body),
            Some(dec("1299.50"))
        );
        let urls = [UrlRule::direct(ExtractionRule::selector_attr("a.link", "href"))];
        assert_eq!(
            first_url(&urls, &body, &base()),
            Some("https://market.example/catalog/42/detail.aspx".to_string())
        );
    }

    #[test]
    fn url_template_expands_matched_id() {
        let body = ResponseBody::Json(json!({"data": {"products": [{"id": 987654}]}}));
        let rules = [UrlRule::templated(
            ExtractionRule::json("data.products.0.id"),
            "https://www.wildberries.ru/catalog/{}/detail.aspx",
        )];
        assert_eq!(
            first_url(&rules, &body, &base()),
            Some("https://www.wildberries.ru/catalog/987654/detail.aspx".to_string())
        );
    }

    #[test]
    fn absolute_urls_pass_through_join() {
        let body = ResponseBody::Html(
            r#"href="https://www.ozon.ru/product/chainsaw-123456/""#.into(),
        );
        let rules = [UrlRule::direct(ExtractionRule::pattern(
            r#"href="(https://www\.ozon\.ru/product/[^"]+)""#,
        ))];
        assert_eq!(
            first_url(&rules, &body, &base()),
            Some("https://www.ozon.ru/product/chainsaw-123456/".to_string())
        );
    }
}
