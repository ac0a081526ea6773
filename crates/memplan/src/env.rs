use std::env;
use std::sync::OnceLock;

static ANALYSIS_STATS: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// `MEMPLAN_ANALYSIS_STATS=1` prints the analysis stats to stderr after each
/// run.
pub(crate) fn analysis_stats_enabled() -> bool {
    *ANALYSIS_STATS.get_or_init(|| match env::var("MEMPLAN_ANALYSIS_STATS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
