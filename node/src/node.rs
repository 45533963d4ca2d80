//! The verification node: wires storage, engine, flows and outbox together.

use std::sync::Arc;

use affirm_store::{MessageStore, StoreError};
use affirm_store_lmdb::{LmdbEnvironment, LmdbIdentityStore, LmdbMessageStore};
use affirm_types::{
    AddressValue, Clock, DeclaredAddress, Identity, IdentityId, SystemClock, Traits, Via,
};
use affirm_verification::{
    FlowCoordinator, LinkBuilder, RequestOutcome, VerificationEngine, VerificationHook,
};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::outbox::{Courier, OutboxMailer};

pub struct AffirmNode {
    config: NodeConfig,
    env: LmdbEnvironment,
    engine: Arc<VerificationEngine>,
    flows: FlowCoordinator,
    hook: VerificationHook,
    identities: Arc<LmdbIdentityStore>,
    outbox: Arc<LmdbMessageStore>,
}

impl AffirmNode {
    /// Open the node's storage under `config.data_dir` with the system clock.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        let env = LmdbEnvironment::open(&config.data_dir, config.map_size())?;
        let store = Arc::new(env.verification_store());
        let identities = Arc::new(env.identity_store());
        let outbox = Arc::new(env.message_store());

        let mailer = Arc::new(OutboxMailer::new(outbox.clone(), clock.clone()));
        let links = LinkBuilder::new(&config.public_url)?;
        let engine = Arc::new(VerificationEngine::new(
            store.clone(),
            identities.clone(),
            mailer,
            clock.clone(),
            links,
            config.params(),
        ));
        let flows = FlowCoordinator::new(store, clock);
        let hook = VerificationHook::new(engine.clone());

        tracing::info!(
            data_dir = %config.data_dir.display(),
            public_url = %config.public_url,
            "verification node ready"
        );
        Ok(Self {
            config,
            env,
            engine,
            flows,
            hook,
            identities,
            outbox,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn env(&self) -> &LmdbEnvironment {
        &self.env
    }

    pub fn engine(&self) -> &VerificationEngine {
        &self.engine
    }

    pub fn flows(&self) -> &FlowCoordinator {
        &self.flows
    }

    pub fn identities(&self) -> &LmdbIdentityStore {
        &self.identities
    }

    pub fn outbox(&self) -> &dyn MessageStore {
        self.outbox.as_ref()
    }

    pub fn courier(&self) -> Courier {
        Courier::new(self.outbox.clone())
    }

    /// Create an identity declaring one email address, then run the
    /// post-registration hook.
    pub fn register(
        &self,
        identity: &IdentityId,
        email: &str,
    ) -> Result<Vec<RequestOutcome>, NodeError> {
        let value = AddressValue::parse(Via::Email, email)?;
        let record = Identity {
            id: identity.clone(),
            traits: Traits {
                addresses: vec![DeclaredAddress {
                    via: Via::Email,
                    value,
                }],
            },
        };
        match self.identities.create_identity(&record) {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                tracing::info!(identity = %identity, "identity already registered");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.hook.after_registration(identity)?)
    }

    /// Settings edit: declare a new email value for an identity.
    pub fn change_email(
        &self,
        identity: &IdentityId,
        email: &str,
    ) -> Result<RequestOutcome, NodeError> {
        let address = DeclaredAddress {
            via: Via::Email,
            value: AddressValue::parse(Via::Email, email)?,
        };
        Ok(self.engine.on_traits_changed(identity, &address)?)
    }
}
