//! Small helpers: WebSocket URL dissection, query-string encoding, bounded
//! number parsing, and speed formatting.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::rngs::SmallRng;
use rand::Rng;

/// Components extracted from a WebSocket URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    /// URL scheme (`ws` or `wss`).
    pub scheme: String,
    /// Host name or address literal.
    pub host: String,
    /// Port, either explicit or the default for the scheme.
    pub port: String,
    /// Resource path, including any query string.
    pub path: String,
}

/// Dissect a WebSocket URL into its components.
///
/// This is a total function: malformed inputs yield empty components rather
/// than an error, so callers can always inspect the parts they care about.
/// When the host part carries no explicit port, the scheme's default port
/// (`80` for `ws`, `443` for `wss`) is filled in.
pub fn parse_ws_url(url: &str) -> UrlParts {
    let mut parts = UrlParts::default();
    let colon = url.find(':');
    if let Some(c) = colon {
        parts.scheme = url[..c].to_string();
    }
    // The host starts right after "://"; degenerate inputs clamp to the end.
    let host_start = colon.map(|c| c + 3).unwrap_or(0).min(url.len());
    let slash = url[host_start..]
        .find('/')
        .map(|i| i + host_start)
        .unwrap_or(url.len());
    let host_part = &url[host_start..slash];
    if let Some(p) = host_part.find(':') {
        parts.host = host_part[..p].to_string();
        parts.port = host_part[p + 1..].to_string();
    } else {
        parts.host = host_part.to_string();
        parts.port = match parts.scheme.as_str() {
            "ws" => "80".to_string(),
            "wss" => "443".to_string(),
            _ => String::new(),
        };
    }
    parts.path = url[slash..].to_string();
    parts
}

// Everything except unreserved characters gets escaped, like curl's escaper.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// URL-encode a metadata map as `k1=v1&k2=v2&...` in key order.
pub fn format_http_params(params: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&utf8_percent_encode(key, QUERY_ENCODE_SET).to_string());
        out.push('=');
        out.push_str(&utf8_percent_encode(value, QUERY_ENCODE_SET).to_string());
    }
    out
}

/// Parse a number within `[min, max]`, with strtonum(3) semantics.
///
/// Returns the parsed value, or a static description of why the input was
/// rejected: `"invalid"` for non-numbers (and for `min > max`),
/// `"too small"` / `"too large"` for out-of-range values.
pub fn strtonum(s: &str, min: i64, max: i64) -> Result<i64, &'static str> {
    if min > max {
        return Err("invalid");
    }
    let value = match s.parse::<i64>() {
        Ok(v) => v,
        Err(e) => {
            return Err(match e.kind() {
                std::num::IntErrorKind::PosOverflow => "too large",
                std::num::IntErrorKind::NegOverflow => "too small",
                _ => "invalid",
            })
        }
    };
    if value < min {
        return Err("too small");
    }
    if value > max {
        return Err("too large");
    }
    Ok(value)
}

/// Compute a speed in kbit/s from a byte count and an elapsed time.
pub fn compute_speed_kbits(data_bytes: f64, elapsed_sec: f64) -> f64 {
    if elapsed_sec > 0.0 {
        (data_bytes * 8.0) / 1000.0 / elapsed_sec
    } else {
        0.0
    }
}

/// Format a speed expressed in kbit/s with a suitable measurement unit.
pub fn format_speed_from_kbits(speed_kbits: f64) -> String {
    let mut speed = speed_kbits;
    let mut unit = "kbit/s";
    if speed > 1000.0 {
        unit = "Mbit/s";
        speed /= 1000.0;
        if speed > 1000.0 {
            unit = "Gbit/s";
            speed /= 1000.0;
        }
    }
    format!("{:>6} {}", three_significant_digits(speed), unit)
}

/// Format the speed of a transfer given its size and duration.
pub fn format_speed(data_bytes: f64, elapsed_sec: f64) -> String {
    format_speed_from_kbits(compute_speed_kbits(data_bytes, elapsed_sec))
}

fn three_significant_digits(v: f64) -> String {
    if v >= 100.0 {
        format!("{v:.0}")
    } else if v >= 10.0 {
        format!("{v:.1}")
    } else if v >= 1.0 {
        format!("{v:.2}")
    } else {
        format!("{v:.3}")
    }
}

/// Fill a buffer with random printable ASCII bytes.
pub(crate) fn random_printable_fill(rng: &mut SmallRng, buffer: &mut [u8]) {
    for byte in buffer.iter_mut() {
        *byte = rng.random_range(b' '..=b'~');
    }
}
