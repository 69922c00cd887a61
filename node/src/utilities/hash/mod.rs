pub(crate) mod hasher;

pub use hasher::Hasher;
