//! Schema subsystem for memdex
//!
//! Declares what can be stored and queried:
//!
//! - `Record`: the identified entity contract
//! - `Field`: ordinal-indexed, named attribute descriptor
//! - `Schema`: per-record-type ordinal allocator (0 is the identifier)
//! - `Value` / `ScalarValue`: dynamic operands and the ordered-value capability

mod errors;
mod field;
mod record;
mod value;

pub use errors::{ValueError, ValueResult};
pub use field::{Field, Schema, ID_ORDINAL};
pub use record::Record;
pub use value::{ScalarValue, Value};
