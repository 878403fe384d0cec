//! End-to-end loan application scenarios through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use fieldstore::record::loan::{CUSTOMER_DATE_OF_BIRTH, CUSTOMER_EMAIL, IRD_NUMBER};
use fieldstore::record::{LoanApplication, LoanKind};
use fieldstore::{
    find_by_secondary_then_filter, rotate_repository, verify, DecryptAudit, DecryptEvent,
    DecryptFailure, EncryptedFieldStore, EncryptionKey, FailurePolicy, FieldError,
    InMemoryRepository, JsonFileRepository, RecordRepository,
};

fn dob() -> NaiveDate {
    NaiveDate::from_ymd_opt(1985, 6, 15).unwrap()
}

#[derive(Default)]
struct CountingAudit(AtomicUsize);

impl DecryptAudit for CountingAudit {
    fn on_decrypt(&self, _event: &DecryptEvent<'_>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn ird_number_survives_a_process_restart() {
    let encoded = EncryptionKey::generate().to_base64();

    let mut app = LoanApplication::new(LoanKind::Deposit, "aroha@example.com", "Aroha", "Ngata", 45_000_000);
    {
        let store = EncryptedFieldStore::from_base64(&encoded).unwrap();
        app.set_ird_number(&store, Some("123-456-789")).unwrap();
    }
    let json = serde_json::to_string(&app).unwrap();
    assert!(!json.contains("123-456-789"));

    let restored: LoanApplication = serde_json::from_str(&json).unwrap();
    let store = EncryptedFieldStore::from_base64(&encoded).unwrap();
    assert_eq!(
        restored.ird_number(&store, None).unwrap().as_deref(),
        Some("123-456-789")
    );
}

#[test]
fn date_of_birth_round_trips_as_a_date() {
    let store = EncryptedFieldStore::new(EncryptionKey::generate());
    let mut app = LoanApplication::new(LoanKind::Renovation, "a@example.com", "A", "B", 1);
    app.set_customer_date_of_birth(&store, Some(dob())).unwrap();
    assert_eq!(app.customer_date_of_birth(&store, None).unwrap(), Some(dob()));
}

#[test]
fn find_matches_one_of_three_shared_email_candidates() {
    let store = EncryptedFieldStore::new(EncryptionKey::generate());
    let dates = [
        NaiveDate::from_ymd_opt(1979, 2, 1),
        Some(dob()),
        NaiveDate::from_ymd_opt(1992, 11, 30),
    ];
    let mut repo = InMemoryRepository::new();
    for d in dates {
        let mut app = LoanApplication::new(LoanKind::Marketing, "john@example.com", "John", "Smith", 1);
        app.set_customer_date_of_birth(&store, d).unwrap();
        repo.insert(app);
    }
    let target = repo.records()[1].application_id;
    let audit = CountingAudit::default();

    let found = find_by_secondary_then_filter(
        &repo,
        &store,
        CUSTOMER_EMAIL,
        "john@example.com",
        CUSTOMER_DATE_OF_BIRTH,
        "1985-06-15",
        None,
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].application_id, target);

    let by_helper =
        LoanApplication::find_application(&repo, &store, "JOHN@example.com", dob(), Some(&audit)).unwrap();
    assert_eq!(by_helper.len(), 1);
    assert_eq!(audit.0.load(Ordering::SeqCst), 3);
}

#[test]
fn wrong_key_is_a_decryption_error() {
    let writer = EncryptedFieldStore::new(EncryptionKey::generate());
    let reader = EncryptedFieldStore::new(EncryptionKey::generate());
    let mut app = LoanApplication::new(LoanKind::Deposit, "a@example.com", "A", "B", 1);
    app.set_ird_number(&writer, Some("123456789")).unwrap();

    let err = app.ird_number(&reader, None).unwrap_err();
    assert!(matches!(err, FieldError::Decryption(DecryptFailure::KeyMismatch)));
    assert_eq!(err.code(), "decryption_error");
}

#[test]
fn audit_hook_counts_present_values_only() {
    let store = EncryptedFieldStore::new(EncryptionKey::generate());
    let audit = CountingAudit::default();
    let mut app = LoanApplication::new(LoanKind::Marketing, "a@example.com", "A", "B", 1);
    app.set_ird_number(&store, Some("123456789")).unwrap();

    app.ird_number(&store, Some(&audit)).unwrap();
    app.nzbn(&store, Some(&audit)).unwrap();
    app.customer_date_of_birth(&store, Some(&audit)).unwrap();
    assert_eq!(audit.0.load(Ordering::SeqCst), 1);
}

#[test]
fn rotate_then_verify_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("applications.json");
    let old = EncryptedFieldStore::new(EncryptionKey::generate());
    let new = EncryptedFieldStore::new(EncryptionKey::generate());

    let records: Vec<_> = (0..4)
        .map(|i| {
            let mut app = LoanApplication::new(LoanKind::Deposit, format!("c{i}@example.com"), "C", "D", 1);
            app.set_ird_number(&old, Some("123456789")).unwrap();
            app
        })
        .collect();
    let mut repo = JsonFileRepository::create(&path, records).unwrap();

    let report = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap();
    assert_eq!(report.attributes_rotated, 4);
    repo.flush().unwrap();

    let reopened: JsonFileRepository<LoanApplication> = JsonFileRepository::open(&path).unwrap();
    assert!(verify(&reopened, &new).unwrap().is_clean());
    assert_eq!(verify(&reopened, &old).unwrap().failures.len(), 4);
    for app in reopened.all().unwrap() {
        assert_eq!(app.ird_number(&new, None).unwrap().as_deref(), Some("123456789"));
    }
}

#[test]
fn encrypted_attributes_are_not_queryable() {
    let store = EncryptedFieldStore::new(EncryptionKey::generate());
    let repo: InMemoryRepository<LoanApplication> = InMemoryRepository::new();
    let err = find_by_secondary_then_filter(&repo, &store, IRD_NUMBER, "123456789", CUSTOMER_DATE_OF_BIRTH, "x", None)
        .unwrap_err();
    assert_eq!(err.code(), "repository_error");
}
