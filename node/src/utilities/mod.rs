pub mod encoding;
pub mod hash;

pub use encoding::{from_hex, to_hex};
pub use hash::Hasher;
