use std::time::Duration;

use serde_json::json;

use super::{AutosaveController, AutosaveError, DocumentObserver, Phase, SaveOutcome, SaveStatus};
use crate::clock::{Clock, ManualClock};
use crate::domain::form_data::FormData;
use crate::keys::Namespace;
use crate::repository::CaseRepository;
use crate::store::memory::MemoryStore;

const DOC_PREFIX: &str = "tfcbt_case_";

struct Harness {
    repo: CaseRepository<MemoryStore, ManualClock>,
    store: MemoryStore,
    clock: ManualClock,
    autosave: AutosaveController,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let repo = CaseRepository::new(store.clone(), Namespace::default(), clock.clone());
        Self {
            repo,
            store,
            clock,
            autosave: AutosaveController::new(Duration::from_millis(1000)),
        }
    }

    /// Creates a case with a stored blank document and starts watching it.
    fn open_case(&mut self) -> (String, FormData) {
        let id = self
            .repo
            .create_case(Some(&FormData::blank("pending")))
            .expect("create should succeed");
        let doc = self.repo.get_case(&id).expect("document exists");
        self.autosave
            .activate(&mut self.repo, &id, &doc)
            .expect("activate should succeed");
        (id, doc)
    }

    fn edit(&mut self, doc: &mut FormData, pointer: &str, value: serde_json::Value) {
        doc.set_field(pointer, value).expect("edit should apply");
        let now = self.clock.now();
        self.autosave.document_changed(doc, now);
    }

    fn advance_and_poll(&mut self, millis: u64) -> SaveOutcome {
        self.clock.advance(Duration::from_millis(millis));
        let now = self.clock.now();
        self.autosave
            .poll(now, &mut self.repo)
            .expect("poll should succeed")
    }

    fn doc_writes(&self) -> usize {
        self.store.write_count_with_prefix(DOC_PREFIX)
    }
}

#[test]
fn rapid_changes_coalesce_into_one_write_of_the_last_content() {
    let mut h = Harness::new();
    let (id, mut doc) = h.open_case();
    let baseline_writes = h.doc_writes();

    for (step, initials) in ["J", "JD", "JDX", "JD"].into_iter().enumerate() {
        h.edit(&mut doc, "/clientInitials", json!(initials));
        h.edit(&mut doc, "/demographics/age", json!(step));
        assert_eq!(h.advance_and_poll(300), SaveOutcome::NotDue);
    }
    assert_eq!(h.doc_writes(), baseline_writes);

    let outcome = h.advance_and_poll(700);
    assert!(matches!(outcome, SaveOutcome::Written { ref case_id, .. } if *case_id == id));
    assert_eq!(h.doc_writes(), baseline_writes + 1);

    let stored = h.repo.get_case(&id).expect("stored document");
    assert_eq!(stored.client_initials(), "JD");
    assert_eq!(stored.get_field("/demographics/age"), Some(&json!(3)));
    assert_eq!(h.autosave.status(), SaveStatus::Saved);
}

#[test]
fn each_change_restarts_the_quiescence_window() {
    let mut h = Harness::new();
    let (_, mut doc) = h.open_case();
    let start = h.clock.now();

    h.edit(&mut doc, "/clientInitials", json!("A"));
    h.clock.advance(Duration::from_millis(900));
    h.edit(&mut doc, "/clientInitials", json!("AB"));
    assert_eq!(
        h.autosave.next_deadline(),
        Some(start + Duration::from_millis(1900))
    );

    assert_eq!(h.advance_and_poll(100), SaveOutcome::NotDue);
    assert!(matches!(h.advance_and_poll(900), SaveOutcome::Written { .. }));
}

#[test]
fn activation_baseline_is_not_written() {
    let mut h = Harness::new();
    let (_, doc) = h.open_case();
    let writes = h.store.write_count();

    let now = h.clock.now();
    h.autosave.document_changed(&doc, now);
    assert_eq!(h.autosave.phase(), Phase::Idle);
    assert_eq!(h.advance_and_poll(60_000), SaveOutcome::NotDue);
    assert_eq!(
        h.autosave.flush(&mut h.repo).expect("flush"),
        SaveOutcome::Unchanged
    );
    assert_eq!(h.store.write_count(), writes);
}

#[test]
fn reverting_before_the_timer_fires_suppresses_the_write() {
    let mut h = Harness::new();
    let (_, mut doc) = h.open_case();
    let writes = h.store.write_count();

    h.edit(&mut doc, "/clientInitials", json!("ZZ"));
    h.edit(&mut doc, "/clientInitials", json!(""));
    assert_eq!(h.advance_and_poll(1000), SaveOutcome::Unchanged);
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.autosave.phase(), Phase::Idle);
}

#[test]
fn forced_save_twice_writes_once() {
    let mut h = Harness::new();
    let (_, mut doc) = h.open_case();
    let writes = h.doc_writes();

    h.edit(&mut doc, "/clientInitials", json!("JD"));
    assert!(matches!(
        h.autosave.flush(&mut h.repo).expect("first flush"),
        SaveOutcome::Written { .. }
    ));
    assert_eq!(
        h.autosave.flush(&mut h.repo).expect("second flush"),
        SaveOutcome::Unchanged
    );
    assert_eq!(h.doc_writes(), writes + 1);
    assert_eq!(h.autosave.next_deadline(), None);
    assert_eq!(h.advance_and_poll(5000), SaveOutcome::NotDue);
    assert_eq!(h.doc_writes(), writes + 1);
}

#[test]
fn failed_save_surfaces_and_does_not_retry_until_next_change() {
    let mut h = Harness::new();
    let (id, mut doc) = h.open_case();

    h.edit(&mut doc, "/clientInitials", json!("JD"));
    h.store.fail_writes(true);
    h.clock.advance(Duration::from_millis(1000));
    let now = h.clock.now();
    let err = h
        .autosave
        .poll(now, &mut h.repo)
        .expect_err("save should fail");
    assert!(matches!(err, AutosaveError::Save { ref case_id, .. } if *case_id == id));
    assert!(matches!(h.autosave.status(), SaveStatus::Failed(_)));

    h.store.fail_writes(false);
    assert_eq!(h.advance_and_poll(10_000), SaveOutcome::NotDue);
    assert!(matches!(h.autosave.status(), SaveStatus::Failed(_)));

    h.edit(&mut doc, "/demographics/gender", json!("F"));
    assert!(matches!(h.advance_and_poll(1000), SaveOutcome::Written { .. }));
    assert_eq!(h.autosave.status(), SaveStatus::Saved);
    assert_eq!(
        h.repo.get_case(&id).map(|d| d.client_initials().to_string()),
        Some("JD".to_string())
    );
}

#[test]
fn status_reports_unsaved_changes_while_pending() {
    let mut h = Harness::new();
    let (_, mut doc) = h.open_case();
    assert_eq!(h.autosave.status(), SaveStatus::Saved);
    h.edit(&mut doc, "/clientInitials", json!("Q"));
    assert_eq!(h.autosave.status(), SaveStatus::Unsaved);
    assert!(matches!(h.autosave.phase(), Phase::DirtyPending { .. }));
}

#[test]
fn switching_cases_writes_pending_change_to_the_previous_case() {
    let mut h = Harness::new();
    let (first, mut first_doc) = h.open_case();
    h.edit(&mut first_doc, "/clientInitials", json!("AA"));

    let second = h
        .repo
        .create_case(Some(&FormData::blank("pending")))
        .expect("second case");
    let second_doc = h.repo.get_case(&second).expect("second document");
    let outcome = h
        .autosave
        .activate(&mut h.repo, &second, &second_doc)
        .expect("switch should succeed");

    assert!(matches!(outcome, SaveOutcome::Written { ref case_id, .. } if *case_id == first));
    assert_eq!(h.autosave.active_case_id(), Some(second.as_str()));
    assert_eq!(h.autosave.next_deadline(), None);
    assert_eq!(
        h.repo.get_case(&first).map(|d| d.client_initials().to_string()),
        Some("AA".to_string())
    );
    assert_eq!(
        h.repo.get_case(&second).map(|d| d.client_initials().to_string()),
        Some(String::new())
    );
}

#[test]
fn failed_trailing_write_keeps_the_previous_case_active() {
    let mut h = Harness::new();
    let (first, mut doc) = h.open_case();
    h.edit(&mut doc, "/clientInitials", json!("AA"));

    h.store.fail_writes(true);
    let other = FormData::blank("case-other");
    assert!(h.autosave.activate(&mut h.repo, "case-other", &other).is_err());
    assert_eq!(h.autosave.active_case_id(), Some(first.as_str()));

    h.store.fail_writes(false);
    assert!(matches!(
        h.autosave.deactivate(&mut h.repo).expect("retry"),
        SaveOutcome::Written { .. }
    ));
    assert_eq!(h.autosave.active_case_id(), None);
}

#[test]
fn abandon_drops_pending_changes_without_writing() {
    let mut h = Harness::new();
    let (id, mut doc) = h.open_case();
    h.edit(&mut doc, "/clientInitials", json!("GONE"));
    let writes = h.store.write_count();

    assert_eq!(h.autosave.abandon(), Some(id));
    assert_eq!(h.autosave.active_case_id(), None);
    assert_eq!(h.advance_and_poll(5000), SaveOutcome::NotDue);
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.autosave.abandon(), None);
}

#[test]
fn changes_without_an_active_case_are_ignored() {
    let mut h = Harness::new();
    let doc = FormData::blank("nobody");
    let now = h.clock.now();
    h.autosave.document_changed(&doc, now);
    assert_eq!(h.autosave.phase(), Phase::Idle);
    assert_eq!(
        h.autosave.flush(&mut h.repo).expect("flush"),
        SaveOutcome::Unchanged
    );
    assert_eq!(h.store.write_count(), 0);
}

#[test]
fn autosave_refreshes_index_entry_after_quiescence() {
    let mut h = Harness::new();
    let (id, mut doc) = h.open_case();
    h.edit(&mut doc, "/clientInitials", json!("JD"));
    h.advance_and_poll(1500);

    let ids: Vec<String> = h
        .repo
        .get_index()
        .cases
        .iter()
        .map(|meta| meta.id.clone())
        .collect();
    assert_eq!(ids, vec![id.clone()]);
    let meta = h.repo.get_index().find(&id).cloned().expect("index entry");
    assert_eq!(meta.name, "JD");
    assert_eq!(meta.client_initials, "JD");
    assert_eq!(
        h.repo.get_case(&id).map(|d| d.client_initials().to_string()),
        Some("JD".to_string())
    );
}
