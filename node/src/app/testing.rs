//! Helpers for driving a [`ShutterApp`] with signed transactions in tests.

use crate::abci::types::{RequestDeliverTx, RequestInitChain, ResponseDeliverTx};
use crate::abci::Application;
use crate::app::genesis::GenesisAppState;
use crate::app::ShutterApp;
use crate::crypto::{Address, KeyPair, KeyperKeypair, ValidatorPubkey};
use crate::shmsg::{encode_tx, sign_message, Message, MessageWithNonce};

pub(crate) const CHAIN_ID: &str = "shutter-test";

pub(crate) struct TestKeyper {
    pub(crate) keypair: KeyperKeypair,
    pub(crate) validator_key: ValidatorPubkey,
    pub(crate) encryption_key: k256::SecretKey,
}

impl TestKeyper {
    pub(crate) fn new() -> Self {
        TestKeyper {
            keypair: KeyperKeypair::generate().unwrap(),
            validator_key: ValidatorPubkey::new(&rand::random::<[u8; 32]>()).unwrap(),
            encryption_key: k256::SecretKey::random(&mut rand::thread_rng()),
        }
    }

    pub(crate) fn address(&self) -> Address {
        self.keypair.address()
    }

    pub(crate) fn check_in_message(&self) -> Message {
        Message::check_in(
            self.validator_key.as_bytes(),
            &self.encryption_key.public_key(),
        )
    }

    pub(crate) fn sign_tx(&self, msg: Message, chain_id: &str, nonce: u64) -> Vec<u8> {
        let msg = MessageWithNonce {
            msg: Some(msg),
            chain_id: chain_id.as_bytes().to_vec(),
            random_nonce: nonce,
        };
        encode_tx(&sign_message(&msg, &self.keypair).unwrap())
    }
}

pub(crate) fn genesis_request(keypers: &[Address], threshold: u64, initial_eon: u64) -> RequestInitChain {
    let genesis = GenesisAppState::new(keypers, threshold, initial_eon);
    RequestInitChain {
        chain_id: CHAIN_ID.to_string(),
        app_state_bytes: genesis.to_json_pretty().unwrap().into_bytes(),
        validators: vec![],
    }
}

/// Signs `msg` with a fresh random nonce and delivers it.
pub(crate) fn deliver(app: &mut ShutterApp, keyper: &TestKeyper, msg: Message) -> ResponseDeliverTx {
    let tx = keyper.sign_tx(msg, CHAIN_ID, rand::random());
    app.deliver_tx(RequestDeliverTx { tx })
}
