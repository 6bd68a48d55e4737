//! Guest kernel crash markers
//!
//! A crash test induces exactly one kernel crash (sysrq or NMI). Console text
//! with more than one `BUG:` marker means something else crashed as well.

use regex::Regex;
use std::sync::OnceLock;

use crate::scenario::StepError;

/// Substring the guest kernel prints for every crash
pub const CRASH_MARKER: &str = "BUG:";

/// Number of crash markers in `text`
pub fn count_markers(text: &str) -> usize {
    text.matches(CRASH_MARKER).count()
}

/// Whether the console shows the sysrq-triggered crash followed by a marker
pub fn induced_by_sysrq(text: &str) -> bool {
    static TRIGGER: OnceLock<Regex> = OnceLock::new();
    let re = TRIGGER
        .get_or_init(|| Regex::new(r"(?m)Trigger a crash\s.*BUG:").expect("static pattern"));
    re.is_match(text)
}

/// Accept console text showing at most the one intentional crash
///
/// Returns the marker count, or [`StepError::MultipleCrashes`] when there
/// is more than one.
pub fn check_single_crash(text: &str) -> Result<usize, StepError> {
    let count = count_markers(text);
    if count > 1 {
        return Err(StepError::MultipleCrashes {
            count,
            details: text.to_string(),
        });
    }
    Ok(count)
}
