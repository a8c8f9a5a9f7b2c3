//! Plain-text rendering of a locale view

use std::fmt::Write;

use crate::data::{CacheState, LocaleView, Market, MarketCatalog};

/// Renders `view` as tab-separated lines, ranked from 1
///
/// A stale table gets a trailing note saying the data is past its TTL.
pub fn render_view(market: &Market, view: &LocaleView, state: CacheState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} ({})", market.name, market.key);
    let _ = writeln!(out, "#\t{}", view.headers.join("\t"));
    for (rank, row) in view.rows.iter().enumerate() {
        let _ = writeln!(out, "{}\t{}", rank + 1, row.join("\t"));
    }
    if state.is_stale() {
        out.push_str("# Showing cached data older than the refresh interval\n");
    }
    out
}

/// One line per market: key and name
pub fn render_catalog(catalog: &MarketCatalog) -> String {
    catalog
        .iter()
        .map(|market| format!("{}\t{}\n", market.key, market.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MarketKey, TableSchema};

    fn market() -> Market {
        Market {
            key: MarketKey::new("uk"),
            name: "United Kingdom".to_string(),
            primary_url: "http://primary/uk".to_string(),
            secondary_url: None,
            schema: TableSchema::default(),
        }
    }

    fn view() -> LocaleView {
        LocaleView {
            headers: vec!["Image".into(), "Link".into(), "Title".into()],
            rows: vec![
                vec!["i1".into(), "l1".into(), "First".into()],
                vec!["i2".into(), "l2".into(), "Second".into()],
            ],
        }
    }

    #[test]
    fn test_render_view_ranks_rows() {
        let text = render_view(&market(), &view(), CacheState::Fresh);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# United Kingdom (uk)");
        assert_eq!(lines[1], "#\tImage\tLink\tTitle");
        assert_eq!(lines[2], "1\ti1\tl1\tFirst");
        assert_eq!(lines[3], "2\ti2\tl2\tSecond");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_render_view_marks_stale_data() {
        let text = render_view(&market(), &view(), CacheState::StaleServing);
        assert!(text.ends_with("older than the refresh interval\n"));

        let fresh = render_view(&market(), &view(), CacheState::Fresh);
        assert!(!fresh.contains("older than"));
    }

    #[test]
    fn test_render_catalog_lists_all_markets() {
        let text = render_catalog(&MarketCatalog::default_markets());
        assert_eq!(text.lines().count(), 8);
        assert!(text.starts_with("kr\tKorea\n"));
    }
}
