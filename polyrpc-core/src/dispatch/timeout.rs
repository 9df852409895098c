//! §4.3 timeout handling: `Connect-Timeout-Ms: N` and gRPC's
//! `grpc-timeout: <value><unit>` both resolve to a `Duration`.

use std::time::Duration;

use http::HeaderMap;

/// Parse `Connect-Timeout-Ms`, a plain millisecond integer.
pub fn connect_timeout(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("connect-timeout-ms")?.to_str().ok()?;
    let ms: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_millis(ms))
}

/// Parse `grpc-timeout`, `<value><unit>` with unit in
/// `{H, M, S, m, u, n}` (hours, minutes, seconds, milli/micro/nanoseconds).
pub fn grpc_timeout(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("grpc-timeout")?.to_str().ok()?.trim();
    let (digits, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(value * 3600)),
        "M" => Some(Duration::from_secs(value * 60)),
        "S" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_millis(value)),
        "u" => Some(Duration::from_micros(value)),
        "n" => Some(Duration::from_nanos(value)),
        _ => None,
    }
}
