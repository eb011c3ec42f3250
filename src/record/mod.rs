pub mod codec;
pub mod hash;

pub use codec::{decode, encode, encode_into, DecodeError, Event, Record};
pub use hash::{ContentHash, EventId};
