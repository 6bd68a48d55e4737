//! Clock offset extraction from NTP query output

use regex::Regex;
use std::sync::OnceLock;

/// Offset reported by an NTP query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetReading {
    /// Magnitude of the offset in seconds
    pub offset: f64,
    /// False when the output held no offset and `offset` is the 0.0 default
    pub parsed: bool,
}

/// Parse the last signed decimal in `output` as the clock offset
///
/// Output such as `server 10.5.26.10, stratum 2, offset -0.000345` or
/// `+3.200 +/- 0.01` yields the unsigned magnitude. When nothing matches the
/// offset is taken to be zero.
pub fn parse_offset(output: &str) -> OffsetReading {
    static OFFSET: OnceLock<Regex> = OnceLock::new();
    let re = OFFSET.get_or_init(|| Regex::new(r"[+-](\d+\.\d+)").expect("static pattern"));

    re.captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|offset| OffsetReading {
            offset,
            parsed: true,
        })
        .unwrap_or(OffsetReading {
            offset: 0.0,
            parsed: false,
        })
}
