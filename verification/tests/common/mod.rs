//! Engine wired to nullable collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use affirm_nullables::{NullClock, NullIdentityStore, NullMailer, NullStore};
use affirm_store::ChallengeStore;
use affirm_types::{AddressValue, DeclaredAddress, FlowId, IdentityId, VerificationParams, Via};
use affirm_verification::{
    parse_verification_link, FlowCoordinator, LinkBuilder, VerificationEngine, VerificationHook,
};

pub const START: u64 = 1_700_000_000;

pub struct Harness {
    pub engine: Arc<VerificationEngine>,
    pub flows: FlowCoordinator,
    pub hook: VerificationHook,
    pub store: Arc<NullStore>,
    pub identities: Arc<NullIdentityStore>,
    pub mailer: Arc<NullMailer>,
    pub clock: Arc<NullClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(VerificationParams::default())
    }

    pub fn with_params(params: VerificationParams) -> Self {
        let store = Arc::new(NullStore::new());
        let identities = Arc::new(NullIdentityStore::new());
        let mailer = Arc::new(NullMailer::new());
        let clock = Arc::new(NullClock::new(START));
        let links = LinkBuilder::new("http://127.0.0.1:4455/").unwrap();
        let engine = Arc::new(VerificationEngine::new(
            store.clone(),
            identities.clone(),
            mailer.clone(),
            clock.clone(),
            links,
            params,
        ));
        let flows = FlowCoordinator::new(store.clone(), clock.clone());
        let hook = VerificationHook::new(engine.clone());
        Self {
            engine,
            flows,
            hook,
            store,
            identities,
            mailer,
            clock,
        }
    }

    pub fn register(&self, id: &str, email: &str) -> (IdentityId, DeclaredAddress) {
        let id = IdentityId::new(id).unwrap();
        let address = self.identities.register_email(&id, email_value(email));
        (id, address)
    }

    /// Flow id and token from the latest link mailed to `email`.
    pub fn link_for(&self, email: &str) -> (FlowId, String) {
        let link = self
            .mailer
            .last_link_to(&email_value(email))
            .expect("a verification link was mailed");
        parse_verification_link(&link).unwrap()
    }

    /// The code a user would read out of the mail.
    pub fn code_for(&self, flow: &FlowId) -> String {
        self.store.find_challenge(flow).unwrap().unwrap().code
    }
}

pub fn email_value(raw: &str) -> AddressValue {
    AddressValue::parse(Via::Email, raw).unwrap()
}

pub fn declared(raw: &str) -> DeclaredAddress {
    DeclaredAddress {
        via: Via::Email,
        value: email_value(raw),
    }
}
