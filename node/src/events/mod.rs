//! Domain events emitted by the shuttermint application and replayed by keypers.
//!
//! Every event type has a `height` field that is *not* part of the ABCI
//! encoding. The observer fills it in with the height of the block the event
//! was found in.

pub(crate) mod marshal;

use std::fmt::Display;

use curve25519_dalek::scalar::Scalar;
use k256::PublicKey;
use thiserror::Error;

use crate::abci::{Event, EventAttribute};
use crate::crypto::Address;
use crate::dkg::{Gammas, GammasError};
use crate::events::marshal::{
    decode_address, decode_addresses, decode_byte_sequence, decode_gammas, decode_public_key,
    decode_scalars, decode_uint, encode_address, encode_addresses, encode_byte_sequence,
    encode_gammas, encode_public_key, encode_scalars, encode_uint,
};

pub mod evtype {
    pub const ACCUSATION: &str = "shutter.accusation";
    pub const APOLOGY: &str = "shutter.apology";
    pub const BATCH_CONFIG: &str = "shutter.batch-config";
    pub const BATCH_CONFIG_STARTED: &str = "shutter.batch-config-started";
    pub const CHECK_IN: &str = "shutter.check-in";
    pub const EON_STARTED: &str = "shutter.eon-started";
    pub const POLY_COMMITMENT: &str = "shutter.poly-commitment";
    pub const POLY_EVAL: &str = "shutter.poly-eval";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("cannot make event from type {0}")]
    UnknownType(String),
    #[error("event {kind}: expected at least {expected} attributes, got {got}")]
    MissingAttributes {
        kind: String,
        expected: usize,
        got: usize,
    },
    #[error("bad attribute, parsing event {kind}: expected {expected}, got {got} at position {position}")]
    UnexpectedAttribute {
        kind: String,
        expected: String,
        got: String,
        position: usize,
    },
    #[error("failed to parse integer {0:?}")]
    InvalidUint(String),
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("invalid hex value {0:?}")]
    InvalidHex(String),
    #[error("invalid encryption public key")]
    InvalidPublicKey,
    #[error("invalid gammas: {0}")]
    InvalidGammas(#[from] GammasError),
    #[error("invalid scalar")]
    InvalidScalar,
}

pub type Result<T> = std::result::Result<T, EventError>;

/// Conversion between a domain event and its ABCI representation.
pub trait AbciEvent: Sized {
    const TYPE: &'static str;

    fn make_abci_event(&self) -> Event;

    fn from_abci_event(event: &Event, height: i64) -> Result<Self>;
}

/// Checks that the first attributes carry exactly `names`, in order, and returns their values.
fn expect_attributes<'a>(event: &'a Event, names: &[&str]) -> Result<Vec<&'a str>> {
    if event.attributes.len() < names.len() {
        return Err(EventError::MissingAttributes {
            kind: event.kind.clone(),
            expected: names.len(),
            got: event.attributes.len(),
        });
    }
    names
        .iter()
        .zip(&event.attributes)
        .enumerate()
        .map(|(position, (name, attribute))| {
            if attribute.key != *name {
                return Err(EventError::UnexpectedAttribute {
                    kind: event.kind.clone(),
                    expected: name.to_string(),
                    got: attribute.key.clone(),
                    position,
                });
            }
            Ok(attribute.value.as_str())
        })
        .collect()
}

fn attribute<V: Into<String>>(key: &str, value: V) -> EventAttribute {
    Event::attribute(key, value)
}

/// A broadcasted accusation against one or more keypers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accusation {
    pub height: i64,
    pub eon: u64,
    pub sender: Address,
    pub accused: Vec<Address>,
}

impl AbciEvent for Accusation {
    const TYPE: &'static str = evtype::ACCUSATION;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Sender", encode_address(&self.sender)),
                attribute("Eon", encode_uint(self.eon)),
                attribute("Accused", encode_addresses(&self.accused)),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["Sender", "Eon", "Accused"])?;
        Ok(Accusation {
            height,
            sender: decode_address(values[0])?,
            eon: decode_uint(values[1])?,
            accused: decode_addresses(values[2])?,
        })
    }
}

/// Answer to prior accusations, revealing the accused dealer's evals for each accuser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apology {
    pub height: i64,
    pub eon: u64,
    pub sender: Address,
    pub accusers: Vec<Address>,
    pub poly_evals: Vec<Scalar>,
}

impl AbciEvent for Apology {
    const TYPE: &'static str = evtype::APOLOGY;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Sender", encode_address(&self.sender)),
                attribute("Eon", encode_uint(self.eon)),
                attribute("Accusers", encode_addresses(&self.accusers)),
                attribute("PolyEvals", encode_scalars(&self.poly_evals)),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["Sender", "Eon", "Accusers", "PolyEvals"])?;
        Ok(Apology {
            height,
            sender: decode_address(values[0])?,
            eon: decode_uint(values[1])?,
            accusers: decode_addresses(values[2])?,
            poly_evals: decode_scalars(values[3])?,
        })
    }
}

/// A keyper set adopted by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub height: i64,
    pub activation_block_number: u64,
    pub threshold: u64,
    pub keypers: Vec<Address>,
    pub keyper_config_index: u64,
}

impl AbciEvent for BatchConfig {
    const TYPE: &'static str = evtype::BATCH_CONFIG;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                Event::indexed_attribute(
                    "ActivationBlockNumber",
                    encode_uint(self.activation_block_number),
                ),
                attribute("Threshold", encode_uint(self.threshold)),
                attribute("Keypers", encode_addresses(&self.keypers)),
                attribute("KeyperConfigIndex", encode_uint(self.keyper_config_index)),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(
            event,
            &[
                "ActivationBlockNumber",
                "Threshold",
                "Keypers",
                "KeyperConfigIndex",
            ],
        )?;
        Ok(BatchConfig {
            height,
            activation_block_number: decode_uint(values[0])?,
            threshold: decode_uint(values[1])?,
            keypers: decode_addresses(values[2])?,
            keyper_config_index: decode_uint(values[3])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfigStarted {
    pub height: i64,
    pub keyper_config_index: u64,
}

impl AbciEvent for BatchConfigStarted {
    const TYPE: &'static str = evtype::BATCH_CONFIG_STARTED;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![attribute(
                "KeyperConfigIndex",
                encode_uint(self.keyper_config_index),
            )],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["KeyperConfigIndex"])?;
        Ok(BatchConfigStarted {
            height,
            keyper_config_index: decode_uint(values[0])?,
        })
    }
}

/// A keyper published its encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub height: i64,
    pub sender: Address,
    pub encryption_public_key: PublicKey,
}

impl AbciEvent for CheckIn {
    const TYPE: &'static str = evtype::CHECK_IN;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Sender", encode_address(&self.sender)),
                attribute(
                    "EncryptionPublicKey",
                    encode_public_key(&self.encryption_public_key),
                ),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["Sender", "EncryptionPublicKey"])?;
        Ok(CheckIn {
            height,
            sender: decode_address(values[0])?,
            encryption_public_key: decode_public_key(values[1])?,
        })
    }
}

/// A new eon has started. The activation block number identifies the main chain
/// block from which on the eon's key shall be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EonStarted {
    pub height: i64,
    pub eon: u64,
    pub activation_block_number: u64,
    pub keyper_config_index: u64,
}

impl AbciEvent for EonStarted {
    const TYPE: &'static str = evtype::EON_STARTED;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Eon", encode_uint(self.eon)),
                attribute(
                    "ActivationBlockNumber",
                    encode_uint(self.activation_block_number),
                ),
                attribute("KeyperConfigIndex", encode_uint(self.keyper_config_index)),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(
            event,
            &["Eon", "ActivationBlockNumber", "KeyperConfigIndex"],
        )?;
        Ok(EonStarted {
            height,
            eon: decode_uint(values[0])?,
            activation_block_number: decode_uint(values[1])?,
            keyper_config_index: decode_uint(values[2])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyCommitment {
    pub height: i64,
    pub eon: u64,
    pub sender: Address,
    pub gammas: Gammas,
}

impl AbciEvent for PolyCommitment {
    const TYPE: &'static str = evtype::POLY_COMMITMENT;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Sender", encode_address(&self.sender)),
                attribute("Eon", encode_uint(self.eon)),
                attribute("Gammas", encode_gammas(&self.gammas)),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["Sender", "Eon", "Gammas"])?;
        Ok(PolyCommitment {
            height,
            sender: decode_address(values[0])?,
            eon: decode_uint(values[1])?,
            gammas: decode_gammas(values[2])?,
        })
    }
}

/// Encrypted polynomial evaluations from one dealer to a list of receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyEval {
    pub height: i64,
    pub eon: u64,
    pub sender: Address,
    pub receivers: Vec<Address>,
    pub encrypted_evals: Vec<Vec<u8>>,
}

impl AbciEvent for PolyEval {
    const TYPE: &'static str = evtype::POLY_EVAL;

    fn make_abci_event(&self) -> Event {
        Event::new(
            Self::TYPE,
            vec![
                attribute("Sender", encode_address(&self.sender)),
                attribute("Eon", encode_uint(self.eon)),
                attribute("Receivers", encode_addresses(&self.receivers)),
                attribute(
                    "EncryptedEvals",
                    encode_byte_sequence(&self.encrypted_evals),
                ),
            ],
        )
    }

    fn from_abci_event(event: &Event, height: i64) -> Result<Self> {
        let values = expect_attributes(event, &["Sender", "Eon", "Receivers", "EncryptedEvals"])?;
        Ok(PolyEval {
            height,
            sender: decode_address(values[0])?,
            eon: decode_uint(values[1])?,
            receivers: decode_addresses(values[2])?,
            encrypted_evals: decode_byte_sequence(values[3])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutterEvent {
    Accusation(Accusation),
    Apology(Apology),
    BatchConfig(BatchConfig),
    BatchConfigStarted(BatchConfigStarted),
    CheckIn(CheckIn),
    EonStarted(EonStarted),
    PolyCommitment(PolyCommitment),
    PolyEval(PolyEval),
}

impl ShutterEvent {
    pub fn height(&self) -> i64 {
        match self {
            ShutterEvent::Accusation(e) => e.height,
            ShutterEvent::Apology(e) => e.height,
            ShutterEvent::BatchConfig(e) => e.height,
            ShutterEvent::BatchConfigStarted(e) => e.height,
            ShutterEvent::CheckIn(e) => e.height,
            ShutterEvent::EonStarted(e) => e.height,
            ShutterEvent::PolyCommitment(e) => e.height,
            ShutterEvent::PolyEval(e) => e.height,
        }
    }

    pub fn make_abci_event(&self) -> Event {
        match self {
            ShutterEvent::Accusation(e) => e.make_abci_event(),
            ShutterEvent::Apology(e) => e.make_abci_event(),
            ShutterEvent::BatchConfig(e) => e.make_abci_event(),
            ShutterEvent::BatchConfigStarted(e) => e.make_abci_event(),
            ShutterEvent::CheckIn(e) => e.make_abci_event(),
            ShutterEvent::EonStarted(e) => e.make_abci_event(),
            ShutterEvent::PolyCommitment(e) => e.make_abci_event(),
            ShutterEvent::PolyEval(e) => e.make_abci_event(),
        }
    }
}

impl Display for ShutterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutterEvent::Accusation(e) => write!(
                f,
                "Accusation{{height: {}, eon: {}, sender: {}, accused: {}}}",
                e.height,
                e.eon,
                e.sender,
                e.accused.len()
            ),
            ShutterEvent::Apology(e) => write!(
                f,
                "Apology{{height: {}, eon: {}, sender: {}, accusers: {}}}",
                e.height,
                e.eon,
                e.sender,
                e.accusers.len()
            ),
            ShutterEvent::BatchConfig(e) => write!(
                f,
                "BatchConfig{{height: {}, index: {}, activation: {}}}",
                e.height, e.keyper_config_index, e.activation_block_number
            ),
            ShutterEvent::BatchConfigStarted(e) => write!(
                f,
                "BatchConfigStarted{{height: {}, index: {}}}",
                e.height, e.keyper_config_index
            ),
            ShutterEvent::CheckIn(e) => {
                write!(f, "CheckIn{{height: {}, sender: {}}}", e.height, e.sender)
            }
            ShutterEvent::EonStarted(e) => write!(
                f,
                "EonStarted{{height: {}, eon: {}, index: {}}}",
                e.height, e.eon, e.keyper_config_index
            ),
            ShutterEvent::PolyCommitment(e) => write!(
                f,
                "PolyCommitment{{height: {}, eon: {}, sender: {}}}",
                e.height, e.eon, e.sender
            ),
            ShutterEvent::PolyEval(e) => write!(
                f,
                "PolyEval{{height: {}, eon: {}, sender: {}, receivers: {}}}",
                e.height,
                e.eon,
                e.sender,
                e.receivers.len()
            ),
        }
    }
}

/// Decodes a consensus engine event found at `height`.
pub fn make_event(event: &Event, height: i64) -> Result<ShutterEvent> {
    let decoded = match event.kind.as_str() {
        evtype::ACCUSATION => ShutterEvent::Accusation(Accusation::from_abci_event(event, height)?),
        evtype::APOLOGY => ShutterEvent::Apology(Apology::from_abci_event(event, height)?),
        evtype::BATCH_CONFIG => {
            ShutterEvent::BatchConfig(BatchConfig::from_abci_event(event, height)?)
        }
        evtype::BATCH_CONFIG_STARTED => {
            ShutterEvent::BatchConfigStarted(BatchConfigStarted::from_abci_event(event, height)?)
        }
        evtype::CHECK_IN => ShutterEvent::CheckIn(CheckIn::from_abci_event(event, height)?),
        evtype::EON_STARTED => {
            ShutterEvent::EonStarted(EonStarted::from_abci_event(event, height)?)
        }
        evtype::POLY_COMMITMENT => {
            ShutterEvent::PolyCommitment(PolyCommitment::from_abci_event(event, height)?)
        }
        evtype::POLY_EVAL => ShutterEvent::PolyEval(PolyEval::from_abci_event(event, height)?),
        other => return Err(EventError::UnknownType(other.to_string())),
    };
    Ok(decoded)
}
