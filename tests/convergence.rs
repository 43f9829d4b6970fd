//! Order-independence of observation merging.
//!
//! Merging a fixed set of observations into an aggregate must produce the
//! same surviving observations and the same aggregated field values no
//! matter which order the observations arrive in.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Utc};
use coalesce::{
    Aggregate, ApplicationKind, DomainPrefix, EntityTag, FieldValue, Identifier, Observation,
    SourceKind,
};

fn observation(kind: SourceKind, confidence: f64, minute: u32, hosting: &str) -> Observation {
    let mut payload = BTreeMap::new();
    payload.insert("hosting".to_string(), FieldValue::from(hosting));
    payload.insert("vendor".to_string(), FieldValue::from("Salesforce"));
    Observation::builder()
        .source_kind(kind)
        .confidence(confidence)
        .evidence(format!("evidence at minute {minute}"))
        .extracted_at(Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap())
        .scope_id("deal-123")
        .entity(EntityTag::Target)
        .payload(payload)
        .build()
        .unwrap()
}

fn build_aggregate(observations: &[Observation]) -> Aggregate<ApplicationKind> {
    let id = Identifier::generate(
        "salesforce",
        Some("Salesforce"),
        EntityTag::Target,
        DomainPrefix::App,
    );
    let mut aggregate = Aggregate::<ApplicationKind>::new(
        id,
        "Salesforce",
        Some("Salesforce"),
        EntityTag::Target,
        "deal-123",
        vec![],
    )
    .unwrap();
    for obs in observations {
        aggregate.add_observation(obs.clone()).unwrap();
    }
    aggregate
}

/// Heap's algorithm, calling `visit` once per permutation of `items`.
fn for_each_permutation<T: Clone>(items: &[T], visit: &mut dyn FnMut(&[T])) {
    fn heap<T: Clone>(items: &mut Vec<T>, k: usize, visit: &mut dyn FnMut(&[T])) {
        if k <= 1 {
            visit(items);
            return;
        }
        for i in 0..k {
            heap(items, k - 1, visit);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
    }
    let mut scratch = items.to_vec();
    let len = scratch.len();
    heap(&mut scratch, len, visit);
}

#[test]
fn merge_outcome_is_identical_across_all_arrival_orders() {
    // Mixed priorities including a same-priority pair; the manual
    // observation must end up the sole survivor in every ordering.
    let observations = vec![
        observation(SourceKind::LlmAssumption, 0.4, 0, "unknown"),
        observation(SourceKind::LlmProse, 0.7, 1, "on-prem"),
        observation(SourceKind::Table, 0.9, 2, "cloud"),
        observation(SourceKind::Table, 0.9, 3, "hybrid"),
        observation(SourceKind::Manual, 0.95, 4, "cloud"),
    ];

    let reference = build_aggregate(&observations);
    let reference_ids: BTreeSet<_> = reference.observations.iter().map(|o| o.id).collect();
    let reference_payload = reference.aggregated_payload();

    let mut permutations = 0usize;
    for_each_permutation(&observations, &mut |order| {
        permutations += 1;
        let aggregate = build_aggregate(order);
        let ids: BTreeSet<_> = aggregate.observations.iter().map(|o| o.id).collect();
        assert_eq!(ids, reference_ids, "surviving observations diverged");
        assert_eq!(
            aggregate.aggregated_payload(),
            reference_payload,
            "aggregated payload diverged"
        );
        assert_eq!(aggregate.max_confidence(), reference.max_confidence());
    });
    assert_eq!(permutations, 120);

    // The manual observation outranks everything else.
    assert_eq!(
        reference_payload.get("hosting"),
        Some(&FieldValue::String("cloud".to_string()))
    );
}

#[test]
fn equal_priority_observations_coexist_in_any_order() {
    let observations = vec![
        observation(SourceKind::Table, 0.9, 0, "cloud"),
        observation(SourceKind::Table, 0.8, 1, "on-prem"),
        observation(SourceKind::Table, 0.7, 2, "hybrid"),
    ];

    for_each_permutation(&observations, &mut |order| {
        let aggregate = build_aggregate(order);
        // Equal priority never displaces; all three survive.
        assert_eq!(aggregate.observation_count(), 3);
        // The payload winner is the highest-confidence one.
        assert_eq!(
            aggregate.aggregated_payload().get("hosting"),
            Some(&FieldValue::String("cloud".to_string()))
        );
    });
}

#[test]
fn higher_priority_displaces_regardless_of_order() {
    let observations = vec![
        observation(SourceKind::LlmAssumption, 0.4, 0, "unknown"),
        observation(SourceKind::LlmProse, 0.7, 1, "on-prem"),
        observation(SourceKind::Manual, 1.0, 2, "cloud"),
    ];

    for_each_permutation(&observations, &mut |order| {
        let aggregate = build_aggregate(order);
        assert_eq!(aggregate.observation_count(), 1);
        assert_eq!(aggregate.observations[0].source_kind, SourceKind::Manual);
    });
}
