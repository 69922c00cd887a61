//! Cryptographic primitives used by keypers and the shuttermint application.
//!
//! Keypers are identified by secp256k1 keys ([`KeyperKeypair`]) and the
//! 20-byte [`Address`] derived from them. Validators of the consensus engine
//! are identified by raw ed25519 keys ([`ValidatorPubkey`]). Poly evals are
//! encrypted to a keyper's secp256k1 encryption key with [`ecies`].

pub mod address;
pub mod ecies;
pub mod secp256k1;
pub mod validator;

use thiserror::Error;

pub use address::{Address, AddressError};
pub use secp256k1::{recover_address, KeyperKeypair, SIGNATURE_LENGTH};
pub use validator::{ValidatorPubkey, NON_EXISTENT_VALIDATOR};

#[derive(Error, Debug)]
pub enum KeyPairError {
    #[error("Invalid key length")]
    SliceLength,
    #[error("Invalid signature")]
    Signature,
    #[error("Invalid private key")]
    PrivateKey,
    #[error("Invalid public key")]
    PublicKey,
}

pub trait KeyPair: Sized {
    type Signature: AsRef<[u8]>;

    fn verify<M: AsRef<[u8]>>(
        &self,
        message: M,
        signature: &Self::Signature,
    ) -> Result<(), KeyPairError>;

    fn sign<M: AsRef<[u8]>>(&self, message: M) -> Result<Self::Signature, KeyPairError>;

    fn generate() -> Result<Self, KeyPairError>;
}
