//! Integration tests exercising the full verification pipeline:
//! registration → outbox → link → code → LMDB persistence → readback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use affirm_node::{AffirmNode, NodeConfig, NodeError};
use affirm_nullables::{NullClock, NullMailer};
use affirm_store::{MailTemplate, MessageStatus};
use affirm_types::{AddressStatus, AddressValue, ExpiredReason, FlowId, IdentityId, Via};
use affirm_verification::{
    parse_verification_link, FlowPhase, MailError, MailTransport, RequestOutcome, SubmitOutcome,
    VerificationError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const START: u64 = 1_700_000_000;

fn config(dir: &tempfile::TempDir) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().join("data"),
        map_size_mb: 32,
        public_url: "https://accounts.example.com/".into(),
        ..NodeConfig::default()
    }
}

fn open(dir: &tempfile::TempDir, clock: &Arc<NullClock>) -> AffirmNode {
    AffirmNode::open_with_clock(config(dir), clock.clone()).expect("open node")
}

fn email(raw: &str) -> AddressValue {
    AddressValue::parse(Via::Email, raw).unwrap()
}

/// Flow id, token and code from the newest verification mail queued for `to`.
fn queued_mail(node: &AffirmNode, to: &str) -> (FlowId, String, String) {
    let to = email(to);
    let (link, code) = node
        .outbox()
        .messages(None)
        .unwrap()
        .into_iter()
        .rev()
        .find_map(|m| match m.template {
            MailTemplate::VerificationValid {
                to: recipient,
                verification_url,
                code,
            } if recipient == to => Some((verification_url, code)),
            _ => None,
        })
        .expect("a verification mail was queued");
    assert!(link.starts_with("https://accounts.example.com/self-service/verification?"));
    let (flow, token) = parse_verification_link(&link).unwrap();
    (flow, token, code)
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn registration_to_verified_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let alice = IdentityId::new("alice").unwrap();

    let flow = {
        let node = open(&dir, &clock);
        let outcomes = node.register(&alice, "Alice@Example.com").unwrap();
        assert!(matches!(outcomes.as_slice(), [RequestOutcome::Issued(_)]));

        let (flow, token, code) = queued_mail(&node, "alice@example.com");
        assert_eq!(outcomes[0].flow_id(), Some(flow));

        clock.advance(30);
        let state = node.engine().start_flow_from_link(&flow, &token).unwrap();
        assert_eq!(state.phase, FlowPhase::AwaitingCode);

        let outcome = node.engine().submit_code(&flow, &code).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Verified(_)));
        flow
    };

    let node = open(&dir, &clock);
    let address = node
        .engine()
        .address(&alice, Via::Email)
        .unwrap()
        .expect("address persisted");
    assert!(address.verified);
    assert_eq!(address.status, AddressStatus::Completed);
    assert_eq!(node.flows().resume(&flow).unwrap().phase, FlowPhase::Completed);
}

#[test]
fn changing_email_expires_the_outstanding_link() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    let alice = IdentityId::new("alice").unwrap();

    node.register(&alice, "alice@example.com").unwrap();
    let (old_flow, old_token, old_code) = queued_mail(&node, "alice@example.com");

    let outcome = node.change_email(&alice, "alice@new.example.com").unwrap();
    assert!(matches!(outcome, RequestOutcome::Issued(f) if f != old_flow));

    let err = node
        .engine()
        .start_flow_from_link(&old_flow, &old_token)
        .unwrap_err();
    assert!(matches!(err, VerificationError::ExpiredFlow(_)));

    assert!(matches!(
        node.engine().submit_code(&old_flow, &old_code),
        Err(VerificationError::ExpiredFlow(_))
    ));

    let context = node.flows().render_expired_context(&old_flow).unwrap();
    assert_eq!(context.challenge_value, email("alice@example.com"));
    assert_eq!(context.address.value, email("alice@new.example.com"));

    let declared = node.engine().declared_addresses(&alice).unwrap();
    assert_eq!(declared[0].value, email("alice@new.example.com"));
}

#[test]
fn verified_link_stays_dead_after_edit_and_revert() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    let carol = IdentityId::new("carol").unwrap();

    node.register(&carol, "carol@example.com").unwrap();
    let (old_flow, old_token, old_code) = queued_mail(&node, "carol@example.com");
    node.engine().submit_code(&old_flow, &old_code).unwrap();

    clock.advance(10);
    node.change_email(&carol, "not-carol@example.com").unwrap();
    assert!(matches!(
        node.engine().start_flow_from_link(&old_flow, &old_token),
        Err(VerificationError::ExpiredFlow(c)) if c.reason == ExpiredReason::AddressChanged
    ));
    assert_eq!(
        node.flows().resume(&old_flow).unwrap().phase,
        FlowPhase::Expired(ExpiredReason::AddressChanged)
    );

    clock.advance(10);
    node.change_email(&carol, "carol@example.com").unwrap();
    assert!(matches!(
        node.engine().submit_code(&old_flow, &old_code),
        Err(VerificationError::ExpiredFlow(_))
    ));
    assert!(matches!(
        node.engine().start_flow_from_link(&old_flow, &old_token),
        Err(VerificationError::ExpiredFlow(_))
    ));
    let address = node.engine().address(&carol, Via::Email).unwrap().unwrap();
    assert_eq!(address.value, email("carol@example.com"));
    assert!(!address.verified);

    let (fresh, _, code) = queued_mail(&node, "carol@example.com");
    assert_ne!(fresh, old_flow);
    assert!(matches!(
        node.engine().submit_code(&fresh, &code),
        Ok(SubmitOutcome::Verified(_))
    ));
}

#[test]
fn registering_twice_resends_instead_of_reissuing() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    let alice = IdentityId::new("alice").unwrap();

    node.register(&alice, "alice@example.com").unwrap();
    let again = node.register(&alice, "alice@example.com").unwrap();
    assert!(matches!(again.as_slice(), [RequestOutcome::Resent(_)]));
    assert_eq!(node.identities().identity_count().unwrap(), 1);
    assert_eq!(node.outbox().messages(None).unwrap().len(), 2);
}

#[test]
fn sweep_expires_elapsed_challenges() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    let alice = IdentityId::new("alice").unwrap();

    node.register(&alice, "alice@example.com").unwrap();
    clock.advance(node.config().challenge_lifespan_secs + 1);
    assert_eq!(node.engine().sweep_expired().unwrap(), 1);
    assert_eq!(node.engine().sweep_expired().unwrap(), 0);

    let address = node.engine().address(&alice, Via::Email).unwrap().unwrap();
    assert_eq!(address.status, AddressStatus::ExpiredAttempt);
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[test]
fn courier_drains_queue_once() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);

    node.register(&IdentityId::new("alice").unwrap(), "alice@example.com")
        .unwrap();
    node.engine()
        .request_verification_by_value(Via::Email, "ghost@example.com")
        .unwrap();

    let transport = NullMailer::new();
    assert_eq!(node.courier().dispatch_queued(&transport).unwrap(), 2);
    assert_eq!(transport.sent().len(), 2);
    assert!(matches!(
        transport.sent()[1],
        MailTemplate::VerificationInvalid { .. }
    ));
    assert!(node
        .outbox()
        .messages(Some(MessageStatus::Queued))
        .unwrap()
        .is_empty());

    assert_eq!(node.courier().dispatch_queued(&transport).unwrap(), 0);
}

#[test]
fn failed_delivery_keeps_messages_queued() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    node.register(&IdentityId::new("alice").unwrap(), "alice@example.com")
        .unwrap();

    let transport = NullMailer::new();
    transport.set_failing(true);
    assert!(matches!(
        node.courier().dispatch_queued(&transport),
        Err(NodeError::Mail(_))
    ));
    assert_eq!(
        node.outbox()
            .messages(Some(MessageStatus::Queued))
            .unwrap()
            .len(),
        1
    );

    transport.set_failing(false);
    assert_eq!(node.courier().dispatch_queued(&transport).unwrap(), 1);
}

/// Accepts a fixed number of messages, then fails.
struct FlakyTransport {
    accepts: AtomicUsize,
}

impl MailTransport for FlakyTransport {
    fn send(&self, _template: &MailTemplate) -> Result<(), MailError> {
        self.accepts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| MailError::Transport("connection reset".into()))
    }
}

#[test]
fn partial_delivery_marks_only_sent_messages() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(START));
    let node = open(&dir, &clock);
    node.register(&IdentityId::new("alice").unwrap(), "alice@example.com")
        .unwrap();
    node.register(&IdentityId::new("bob").unwrap(), "bob@example.com")
        .unwrap();

    let transport = FlakyTransport {
        accepts: AtomicUsize::new(1),
    };
    assert!(matches!(
        node.courier().dispatch_queued(&transport),
        Err(NodeError::Mail(_))
    ));
    assert_eq!(
        node.outbox()
            .messages(Some(MessageStatus::Sent))
            .unwrap()
            .len(),
        1
    );
    let queued = node.outbox().messages(Some(MessageStatus::Queued)).unwrap();
    assert_eq!(queued.len(), 1);
    assert!(matches!(
        &queued[0].template,
        MailTemplate::VerificationValid { to, .. } if *to == email("bob@example.com")
    ));

    assert_eq!(node.courier().dispatch_queued(&NullMailer::new()).unwrap(), 1);
}

#[test]
fn invalid_public_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig {
        public_url: "not a url".into(),
        ..config(&dir)
    };
    assert!(matches!(
        AffirmNode::open(config),
        Err(NodeError::PublicUrl(_))
    ));
}
