use proptest::prelude::*;

use affirm_types::{AddressValue, FlowId, Timestamp, Via};

proptest! {
    /// Normalizing an already-normalized email is a no-op.
    #[test]
    fn email_normalization_is_idempotent(
        local in "[a-zA-Z][a-zA-Z0-9]{0,15}",
        domain in "[a-zA-Z]{1,12}",
    ) {
        let raw = format!("  {local}@{domain}.COM ");
        let once = AddressValue::parse(Via::Email, &raw).unwrap();
        let twice = AddressValue::parse(Via::Email, once.as_str()).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.as_str(), once.as_str().to_lowercase());
    }

    /// FlowId survives its hex form and its bincode encoding.
    #[test]
    fn flow_id_encodings(bytes in prop::array::uniform16(0u8..)) {
        let id = FlowId::new(bytes);
        prop_assert_eq!(FlowId::from_hex(&id.to_hex()).unwrap(), id);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: FlowId = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, id);
    }

    /// A deadline is reached exactly when `now >= deadline`.
    #[test]
    fn deadline_reached_matches_ordering(deadline in 0u64..u64::MAX, now in 0u64..u64::MAX) {
        prop_assert_eq!(Timestamp::new(deadline).is_reached(Timestamp::new(now)), now >= deadline);
    }

    /// `plus_secs` never moves a timestamp backwards.
    #[test]
    fn plus_secs_is_monotonic(base in 0u64..u64::MAX, secs in 0u64..u64::MAX) {
        let ts = Timestamp::new(base);
        prop_assert!(ts.plus_secs(secs) >= ts);
    }
}
