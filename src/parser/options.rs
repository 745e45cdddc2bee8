//! Options threaded through every [`super::traits::Handler`] (§4.2, §6).

use crate::adaptive::AdaptiveList;
use crate::value::FieldPath;

/// Per-category ordered field lists plus the `detect_timestamp` toggle that
/// §4.2/§4.3 describe as "opts".
///
/// The field lists use the same move-to-front list as the time-layout list,
/// but scoped to whatever owns this `ParseOptions` (typically one per
/// [`crate::scanner::Scanner`]) rather than process-global — two scanners
/// reading differently-shaped streams shouldn't fight over field order.
pub struct ParseOptions {
    pub time_fields: AdaptiveList<FieldPath>,
    pub level_fields: AdaptiveList<FieldPath>,
    pub message_fields: AdaptiveList<FieldPath>,
    pub detect_timestamp: bool,
}

impl ParseOptions {
    pub fn new(
        time_fields: Vec<FieldPath>,
        level_fields: Vec<FieldPath>,
        message_fields: Vec<FieldPath>,
        detect_timestamp: bool,
    ) -> Self {
        Self {
            time_fields: AdaptiveList::new(time_fields),
            level_fields: AdaptiveList::new(level_fields),
            message_fields: AdaptiveList::new(message_fields),
            detect_timestamp,
        }
    }

    fn paths(names: &[&str]) -> Vec<FieldPath> {
        names.iter().map(|n| FieldPath::parse(n)).collect()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new(
            Self::paths(&["timestamp", "time", "ts", "@timestamp", "asctime"]),
            Self::paths(&["level", "lvl", "severity", "loglevel"]),
            Self::paths(&["message", "msg", "text"]),
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_field_lists_are_nonempty() {
        let opts = ParseOptions::default();
        assert!(!opts.time_fields.is_empty());
        assert!(!opts.level_fields.is_empty());
        assert!(!opts.message_fields.is_empty());
        assert!(opts.detect_timestamp);
    }
}
