//! The handler contract every format parser and prefix detector implements
//! (§4.2-§4.4).

use crate::parser::options::ParseOptions;
use crate::record::StructuredRecord;

/// A single candidate parser in the scanner's handler chain.
///
/// The upstream design passes a `bool` back through an out-parameter
/// (`try_parse(bytes, out_record, opts) -> bool`); here a match is just
/// `Some(record)`, which reads better against `?`-free call sites and keeps
/// "did it match" and "what did it produce" as one value instead of two.
pub trait Handler: Send + Sync {
    /// Attempt to parse `raw` into a structured record. `None` means "not my
    /// format" — the caller tries the next handler in the chain.
    fn try_parse(&self, raw: &[u8], opts: &ParseOptions) -> Option<StructuredRecord>;

    /// Stable identifier used in scanner diagnostics and default ordering.
    fn name(&self) -> &'static str;
}
