//! Wire protocol module: key-value frames and payload encodings.

pub mod constants;
pub mod frame;
pub mod payload;

pub use constants::*;
pub use frame::{Frame, encode_kv, now};
pub use payload::{PayloadError, dump_payload, unpack_hex_payload};
