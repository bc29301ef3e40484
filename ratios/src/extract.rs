//! Ratio extraction from the source page's inline scripts.
//!
//! The page publishes the three ratios as plain `let` declarations inside one
//! of its `<script>` blocks:
//!
//! ```text
//! let ndx_qqq_ratio = 41.10241216829076;
//! let nq_qqq_ratio = 41.29471200210854;
//! let es_spy_ratio = 10.072138887159946;
//! ```

use std::sync::LazyLock;

use indexswap_common::{RatioKey, RatioSet};
use regex::Regex;
use tracing::debug;

use crate::error::{RatioError, RatioResult};

macro_rules! re {
    ($pat:expr) => {
        LazyLock::new(|| Regex::new($pat).expect("static regex"))
    };
}

static RE_SCRIPT: LazyLock<Regex> = re!(r"(?is)<script\b[^>]*>(.*?)</script\s*>");
static RE_NDX_QQQ: LazyLock<Regex> = re!(r"\blet\s+ndx_qqq_ratio\s*=\s*(-?\d+(?:\.\d+)?)\s*;");
static RE_NQ_QQQ: LazyLock<Regex> = re!(r"\blet\s+nq_qqq_ratio\s*=\s*(-?\d+(?:\.\d+)?)\s*;");
static RE_ES_SPY: LazyLock<Regex> = re!(r"\blet\s+es_spy_ratio\s*=\s*(-?\d+(?:\.\d+)?)\s*;");

/// Message carried by [`RatioError::Parse`] when no block has all markers.
pub const SCRIPT_NOT_FOUND: &str = "script not found";

fn declaration(key: RatioKey) -> &'static Regex {
    match key {
        RatioKey::NdxQqq => &RE_NDX_QQQ,
        RatioKey::NqQqq => &RE_NQ_QQQ,
        RatioKey::EsSpy => &RE_ES_SPY,
    }
}

/// Return the text of the first script block mentioning every ratio marker.
pub fn find_ratio_script(html: &str) -> Option<&str> {
    RE_SCRIPT
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|body| RatioKey::ALL.iter().all(|key| body.contains(key.marker())))
}

/// Pull one ratio's `let` declaration out of a script body.
pub fn extract_value(script: &str, key: RatioKey) -> RatioResult<f64> {
    let raw = declaration(key)
        .captures(script)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| RatioError::Parse(key.marker().to_string()))?;

    raw.as_str()
        .parse::<f64>()
        .map_err(|_| RatioError::Parse(key.marker().to_string()))
}

/// Extract a full ratio set from the source page.
pub fn extract_ratios(html: &str) -> RatioResult<RatioSet> {
    let script = find_ratio_script(html)
        .ok_or_else(|| RatioError::Parse(SCRIPT_NOT_FOUND.to_string()))?;

    let ndx_qqq = extract_value(script, RatioKey::NdxQqq)?;
    let nq_qqq = extract_value(script, RatioKey::NqQqq)?;
    let es_spy = extract_value(script, RatioKey::EsSpy)?;
    debug!(ndx_qqq, nq_qqq, es_spy, "Extracted ratios from script");

    Ok(RatioSet::new(ndx_qqq, nq_qqq, es_spy)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<script src="/static/app.js"></script>
<script>window.dataLayer = [];</script>
</head><body>
<script type="text/javascript">
    let es_spy_ratio = 10.072138887159946;
    let nq_qqq_ratio = 41.29471200210854;
    let ndx_qqq_ratio = 41.10241216829076;
    document.getElementById("ratio").innerText = ndx_qqq_ratio;
</script>
</body></html>"#;

    #[test]
    fn test_extract_ratios() {
        let set = extract_ratios(PAGE).unwrap();
        assert_eq!(set, RatioSet::defaults());
    }

    #[test]
    fn test_script_not_found() {
        let html = "<html><script>let es_spy_ratio = 10.0;</script></html>";
        assert_eq!(
            extract_ratios(html),
            Err(RatioError::Parse(SCRIPT_NOT_FOUND.to_string()))
        );
    }

    #[test]
    fn test_marker_present_but_declaration_missing() {
        let html = r#"<script>
            let es_spy_ratio = 10.07;
            var nq_qqq_ratio = 41.29;
            let ndx_qqq_ratio = 41.10;
        </script>"#;
        assert_eq!(
            extract_ratios(html),
            Err(RatioError::Parse("nq_qqq_ratio".to_string()))
        );
    }

    #[test]
    fn test_first_matching_block_wins() {
        let html = r#"
            <script>let es_spy_ratio = 1.0;</script>
            <script>let es_spy_ratio = 2.0; let nq_qqq_ratio = 3.0; let ndx_qqq_ratio = 4.0;</script>
            <script>let es_spy_ratio = 5.0; let nq_qqq_ratio = 6.0; let ndx_qqq_ratio = 7.0;</script>
        "#;
        let set = extract_ratios(html).unwrap();
        assert_eq!(set.get(RatioKey::EsSpy), 2.0);
        assert_eq!(set.get(RatioKey::NqQqq), 3.0);
        assert_eq!(set.get(RatioKey::NdxQqq), 4.0);
    }

    #[test]
    fn test_integer_values_and_spacing() {
        let script = "let   ndx_qqq_ratio=41 ;";
        assert_eq!(extract_value(script, RatioKey::NdxQqq).unwrap(), 41.0);
    }

    #[test]
    fn test_zero_ratio_rejected() {
        let html = r#"<script>
            let es_spy_ratio = 0;
            let nq_qqq_ratio = 41.29;
            let ndx_qqq_ratio = 41.10;
        </script>"#;
        assert!(matches!(
            extract_ratios(html),
            Err(RatioError::InvalidRatio(_))
        ));
    }
}
