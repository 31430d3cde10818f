//! HTML helpers shared by every extraction method: Readability markdown,
//! title lookup, and tabular/chart detection.

use std::sync::LazyLock;

use regex::Regex;
use research_common::ExtractedPage;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta[^>]+property\s*=\s*["']og:title["'][^>]*content\s*=\s*["']([^"']*)["']"#)
        .expect("valid regex")
});
static TABLE_CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<t[dh][\s>]").expect("valid regex"));
/// A markdown table separator row, e.g. `| --- | :---: |`.
static MD_TABLE_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)+\|?\s*$").expect("valid regex")
});

const CHART_MARKERS: &[&str] = &["<canvas", "highcharts", "chart.js", "tradingview", "plotly", "d3."];

/// Convert raw HTML bytes into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// `<title>`, falling back to `og:title`.
pub fn extract_title(html: &str) -> Option<String> {
    let from = |re: &Regex| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty())
    };
    from(&*TITLE_RE).or_else(|| from(&*OG_TITLE_RE))
}

fn decode_entities(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Tables with cells, canvases, or a known charting library in raw HTML.
pub fn has_tabular_html(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    if lower.contains("<table") && TABLE_CELL_RE.is_match(&lower) {
        return true;
    }
    CHART_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Pipe tables in markdown.
pub fn has_markdown_table(markdown: &str) -> bool {
    MD_TABLE_SEPARATOR_RE.is_match(markdown)
}

/// Build a page from raw HTML. The text may be empty; callers decide whether that fails.
pub fn page_from_html(html: &[u8], url: &str) -> ExtractedPage {
    let raw = String::from_utf8_lossy(html);
    let text = html_to_markdown(html, Some(url));
    let has_tabular_data = has_tabular_html(&raw) || has_markdown_table(&text);
    ExtractedPage {
        title: extract_title(&raw).unwrap_or_default(),
        text,
        has_tabular_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_title_tag_then_og() {
        let html = r#"<html><head><title>
            ACME Q3 &amp; Outlook </title></head></html>"#;
        assert_eq!(extract_title(html).as_deref(), Some("ACME Q3 & Outlook"));

        let og = r#"<meta property="og:title" content="Markets Wrap">"#;
        assert_eq!(extract_title(og).as_deref(), Some("Markets Wrap"));

        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn detects_tables_and_charts() {
        assert!(has_tabular_html("<TABLE><tr><TD>1</TD></tr></TABLE>"));
        assert!(!has_tabular_html("<table></table>"));
        assert!(has_tabular_html(r#"<script src="/js/highcharts.js"></script>"#));
        assert!(has_tabular_html("<canvas id=c></canvas>"));
        assert!(!has_tabular_html("<p>Just prose about tables.</p>"));
    }

    #[test]
    fn detects_markdown_pipe_tables() {
        let md = "| Ticker | Price |\n| --- | ---: |\n| ACME | 12.5 |";
        assert!(has_markdown_table(md));
        assert!(!has_markdown_table("A line with a | pipe\n---"));
    }
}
