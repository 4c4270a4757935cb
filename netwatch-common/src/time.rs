//! Epoch-millisecond timestamp helpers.

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// Kept as the single place that calls `Utc::now()` for I/O-adjacent code
/// (recording a probe result, refreshing a cache entry). Pure derivation and
/// aggregation logic should take `now_ms: i64` as a parameter instead of
/// calling this, so it stays deterministically testable.
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Render an epoch-millisecond timestamp as RFC3339 (ISO-8601), matching the
/// `lastChecked` field's wire format.
pub fn to_iso8601(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_roundtrip_shape() {
        let s = to_iso8601(1_700_000_000_000);
        assert!(s.starts_with("2023-11-14"));
        assert!(s.ends_with('Z'));
    }
}
