use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Catalog article code used to query the marketplaces.
///
/// Opaque and immutable; duplicates within a run are processed
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductIdentifier(String);

impl ProductIdentifier {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Ozon,
    Wildberries,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Ozon => "ozon",
            SourceId::Wildberries => "wildberries",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "ozon" => Some(SourceId::Ozon),
            "wildberries" | "wb" => Some(SourceId::Wildberries),
            _ => None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation levels of a source's resolution strategy, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    StructuredQuery,
    DirectFetchRegex,
    DirectFetchMarkup,
    RenderedFetch,
}

impl TierId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierId::StructuredQuery => "structured_query",
            TierId::DirectFetchRegex => "direct_fetch_regex",
            TierId::DirectFetchMarkup => "direct_fetch_markup",
            TierId::RenderedFetch => "rendered_fetch",
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Timeout,
    Parse,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Parse => "parse",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of querying one source for one identifier.
///
/// `error` is populated only when both `price` and `url` are absent; the
/// constructors are the only way to build one, which keeps that invariant
/// out of callers' hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQueryResult {
    pub source: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_used: Option<TierId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl SourceQueryResult {
    /// A tier produced at least one of price/url.
    pub fn resolved(
        source: SourceId,
        price: Option<Decimal>,
        url: Option<String>,
        tier_used: TierId,
    ) -> Self {
        debug_assert!(price.is_some() || url.is_some());
        Self {
            source,
            price,
            url,
            tier_used: Some(tier_used),
            error: None,
        }
    }

    /// All tiers exhausted or the task faulted; nothing was found.
    pub fn unresolved(source: SourceId, error: ErrorKind) -> Self {
        Self {
            source,
            price: None,
            url: None,
            tier_used: None,
            error: Some(error),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.price.is_some() || self.url.is_some()
    }
}

/// One record per input identifier; immutable once every configured
/// source has settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPriceRecord {
    pub identifier: ProductIdentifier,
    pub by_source: BTreeMap<SourceId, SourceQueryResult>,
    pub resolved_at: DateTime<Utc>,
}

impl ProductPriceRecord {
    pub fn new(
        identifier: ProductIdentifier,
        results: impl IntoIterator<Item = SourceQueryResult>,
    ) -> Self {
        let by_source = results
            .into_iter()
            .map(|result| (result.source, result))
            .collect();
        Self {
            identifier,
            by_source,
            resolved_at: Utc::now(),
        }
    }

    /// Record for an identifier whose task raised an unexpected fault.
    pub fn faulted(identifier: ProductIdentifier, sources: &[SourceId]) -> Self {
        Self::new(
            identifier,
            sources
                .iter()
                .map(|source| SourceQueryResult::unresolved(*source, ErrorKind::Internal)),
        )
    }
}
