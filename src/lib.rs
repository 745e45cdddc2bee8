pub mod adaptive;
pub mod error;
pub mod parser;
pub mod record;
pub mod scanner;
pub mod sink;
pub mod time_parser;
pub mod value;

pub use error::{ScanError, SinkError, StoreError, TransportError};
pub use record::{LogEvent, SinkId, StructuredRecord};
pub use scanner::Scanner;
pub use value::{FieldPath, Kv, Value};
