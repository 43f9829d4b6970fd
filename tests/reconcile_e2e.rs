use coalesce::{
    ApplicationKind, EntityTag, InfrastructureKind, Observation, Repository, SourceKind,
    MAX_RECONCILE_SIZE,
};

fn obs(evidence: &str) -> Observation {
    Observation::builder()
        .source_kind(SourceKind::Table)
        .evidence(evidence)
        .scope_id("deal-123")
        .entity(EntityTag::Target)
        .build()
        .unwrap()
}

#[test]
fn reconcile_merges_near_duplicates() {
    let repo = Repository::<ApplicationKind>::new();
    repo.find_or_create(
        "Salesforce",
        Some("Salesforce"),
        EntityTag::Target,
        "deal-123",
        vec![obs("inventory row 3")],
    )
    .unwrap();
    repo.find_or_create(
        "Salesforce Sales",
        Some("Salesforce"),
        EntityTag::Target,
        "deal-123",
        vec![obs("org chart annex")],
    )
    .unwrap();
    repo.find_or_create(
        "Workday",
        Some("Workday"),
        EntityTag::Target,
        "deal-123",
        vec![obs("HR systems list")],
    )
    .unwrap();
    assert_eq!(repo.len(), 3);

    let report = repo.reconcile_duplicates(0.95);
    assert_eq!(report.merged, 1);
    assert!(!report.skipped_oversize);
    assert_eq!(repo.len(), 2);

    // The survivor owns both observations.
    let merged = repo
        .find_all()
        .into_iter()
        .find(|a| a.observation_count() == 2)
        .expect("merged aggregate present");
    assert_eq!(merged.entity, EntityTag::Target);
}

#[test]
fn reconcile_is_idempotent() {
    let repo = Repository::<ApplicationKind>::new();
    repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();
    repo.find_or_create("Salesforce Sales", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();

    let first = repo.reconcile_duplicates(0.95);
    assert_eq!(first.merged, 1);
    let second = repo.reconcile_duplicates(0.95);
    assert_eq!(second.merged, 0);
    assert_eq!(repo.len(), 1);
}

#[test]
fn reconcile_never_crosses_entities() {
    let repo = Repository::<ApplicationKind>::new();
    repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();
    repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Buyer, "deal-123", vec![])
        .unwrap();

    let report = repo.reconcile_duplicates(0.1);
    assert_eq!(report.merged, 0);
    assert_eq!(repo.len(), 2);
}

#[test]
fn repository_refuses_second_scope() {
    // A repository serves one analysis run; resolving the same identity
    // under a different scope must fail loudly rather than merge.
    let repo = Repository::<ApplicationKind>::new();
    repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();
    let err = repo
        .find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-999", vec![])
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(repo.len(), 1);
}

#[test]
fn circuit_breaker_skips_oversized_population() {
    // Capture the warning the skip emits alongside the report.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let repo = Repository::<InfrastructureKind>::new();
    for i in 0..=MAX_RECONCILE_SIZE {
        repo.find_or_create(
            &format!("host-{i:04}"),
            None,
            EntityTag::Target,
            "deal-123",
            vec![],
        )
        .unwrap();
    }
    assert_eq!(repo.len(), MAX_RECONCILE_SIZE + 1);

    let report = repo.reconcile_duplicates(0.9);
    assert!(report.skipped_oversize);
    assert_eq!(report.merged, 0);
    // Deferred means no pairwise comparisons at all, verified by the
    // comparison counter rather than just the merge count.
    assert_eq!(report.examined, 0);
    assert_eq!(repo.len(), MAX_RECONCILE_SIZE + 1);
}

#[test]
fn circuit_breaker_allows_population_at_limit() {
    let repo = Repository::<InfrastructureKind>::new();
    for i in 0..MAX_RECONCILE_SIZE {
        repo.find_or_create(
            &format!("host-{i:04}"),
            None,
            EntityTag::Target,
            "deal-123",
            vec![],
        )
        .unwrap();
    }

    let report = repo.reconcile_duplicates(0.99);
    assert!(!report.skipped_oversize);
    assert!(report.examined > 0);
}

#[test]
fn reconcile_runs_from_background_task() {
    use std::sync::Arc;

    let repo = Arc::new(Repository::<ApplicationKind>::new());
    repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();
    repo.find_or_create("Salesforce Sales", Some("Salesforce"), EntityTag::Target, "deal-123", vec![])
        .unwrap();

    let worker = {
        let repo = Arc::clone(&repo);
        std::thread::spawn(move || repo.reconcile_duplicates(0.95))
    };
    let report = worker.join().unwrap();
    assert_eq!(report.merged, 1);
    assert_eq!(repo.len(), 1);
}
