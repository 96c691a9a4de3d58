//! Exception model: raw values, normalization, stringification
//!
//! ```text
//! RawException ──normalize──▶ Normalized ──stringify──▶ String (report text + dedup key)
//!   Text(s)                     Text(s)                   s
//!   Object{..}                  Record{sorted fields}     "key:\n  value\n"...
//!   Primitive(null)             Record{}                  ""
//! ```

pub mod normalize;
pub mod raw;
pub mod stringify;

pub use normalize::{normalize, Normalized, NormalizedRecord};
pub use raw::{ErrorKind, ExceptionObject, RawException};
pub use stringify::{render_value, stringify, stringify_raw, stringify_record};
