//! Market definitions and the default market catalog
//!
//! Each market is one country's bestseller sheet, published as TSV. The
//! catalog maps a `MarketKey` to its primary source and an optional fallback.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::TableSchema;

/// Base of the published bestseller spreadsheet
const SHEET_BASE_URL: &str =
    "https://docs.google.com/spreadsheets/d/1GoeMU5HbM7g2jujoO5vBI6Z1BH_EjUtnVmV9zWAKpHs/export";

/// Cell range exported for every market sheet
const SHEET_RANGE: &str = "A1:AQ32";

/// Identifier of one localized data source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketKey(String);

impl MarketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Static description of a default market sheet
struct SheetSource {
    code: &'static str,
    name: &'static str,
    gid: &'static str,
}

/// Default markets in display order; the first one is the default active market
static SHEETS: [SheetSource; 8] = [
    SheetSource {
        code: "kr",
        name: "Korea",
        gid: "161667220",
    },
    SheetSource {
        code: "us",
        name: "United States",
        gid: "638692902",
    },
    SheetSource {
        code: "jp",
        name: "Japan",
        gid: "1994696482",
    },
    SheetSource {
        code: "uk",
        name: "United Kingdom",
        gid: "1872205236",
    },
    SheetSource {
        code: "cn",
        name: "China",
        gid: "225038494",
    },
    SheetSource {
        code: "tw",
        name: "Taiwan",
        gid: "287677657",
    },
    SheetSource {
        code: "fr",
        name: "France",
        gid: "460284331",
    },
    SheetSource {
        code: "es",
        name: "Spain",
        gid: "806262731",
    },
];

/// One market: where to fetch it and how its table is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub key: MarketKey,
    /// Human-readable market name
    pub name: String,
    pub primary_url: String,
    /// Fallback source tried when the primary fails
    pub secondary_url: Option<String>,
    pub schema: TableSchema,
}

/// Ordered set of markets known to the cache
#[derive(Debug, Clone, Default)]
pub struct MarketCatalog {
    markets: BTreeMap<MarketKey, Market>,
    order: Vec<MarketKey>,
}

impl MarketCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The eight published bestseller sheets
    pub fn default_markets() -> Self {
        let mut catalog = Self::new();
        for sheet in &SHEETS {
            catalog.insert(Market {
                key: MarketKey::new(sheet.code),
                name: sheet.name.to_string(),
                primary_url: format!(
                    "{}?format=tsv&gid={}&range={}",
                    SHEET_BASE_URL, sheet.gid, SHEET_RANGE
                ),
                secondary_url: None,
                schema: TableSchema::default(),
            });
        }
        catalog
    }

    /// Sets `{base}/{key}.tsv` as the fallback source of every market
    pub fn with_fallback_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        for market in self.markets.values_mut() {
            market.secondary_url = Some(format!("{}/{}.tsv", base, market.key));
        }
        self
    }

    /// Adds or replaces a market, keeping first-insertion order
    pub fn insert(&mut self, market: Market) {
        if !self.markets.contains_key(&market.key) {
            self.order.push(market.key.clone());
        }
        self.markets.insert(market.key.clone(), market);
    }

    pub fn get(&self, key: &MarketKey) -> Option<&Market> {
        self.markets.get(key)
    }

    /// Keys in catalog order
    pub fn keys(&self) -> Vec<MarketKey> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Market> {
        self.order.iter().filter_map(|key| self.markets.get(key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_has_8_markets() {
        assert_eq!(MarketCatalog::default_markets().len(), 8);
    }

    #[test]
    fn test_default_catalog_starts_with_korea() {
        let catalog = MarketCatalog::default_markets();
        assert_eq!(catalog.keys()[0], MarketKey::new("kr"));
    }

    #[test]
    fn test_default_urls_request_tsv_export() {
        for market in MarketCatalog::default_markets().iter() {
            assert!(market.primary_url.contains("format=tsv"));
            assert!(market.primary_url.contains("range=A1:AQ32"));
            assert!(market.secondary_url.is_none());
        }
    }

    #[test]
    fn test_all_markets_have_unique_urls() {
        let catalog = MarketCatalog::default_markets();
        let mut urls: Vec<_> = catalog.iter().map(|m| m.primary_url.clone()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), catalog.len());
    }

    #[test]
    fn test_with_fallback_base_sets_secondary() {
        let catalog = MarketCatalog::default_markets().with_fallback_base("http://mirror.local/");
        let us = catalog.get(&MarketKey::new("us")).unwrap();
        assert_eq!(us.secondary_url.as_deref(), Some("http://mirror.local/us.tsv"));
    }

    #[test]
    fn test_get_returns_none_for_unknown_market() {
        let catalog = MarketCatalog::default_markets();
        assert!(catalog.get(&MarketKey::new("atlantis")).is_none());
    }

    #[test]
    fn test_insert_replaces_without_duplicating_order() {
        let mut catalog = MarketCatalog::default_markets();
        let mut kr = catalog.get(&MarketKey::new("kr")).unwrap().clone();
        kr.name = "South Korea".to_string();
        catalog.insert(kr);

        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.get(&MarketKey::new("kr")).unwrap().name, "South Korea");
    }
}
