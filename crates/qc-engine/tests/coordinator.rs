//! Coordinator runs against an in-memory store with a scripted validator.
//!
//! The scripted validator decides pass/fail by file name and logs every file
//! it is asked to validate, so tests can assert which visits were validated.

use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use qc_config::{CoordinatorConfig, RecheckPolicy};
use qc_core::entities::{FailedVisit, Locator, QueuedVisit, QueuedVisits};
use qc_core::enums::{Dataset, QcState};
use qc_core::qc::{ErrorCode, QcResult, ValidationOutcome, empty_field_error};
use qc_core::traits::QcRecorder;
use qc_core::{FieldMap, FieldValue, keys};
use qc_engine::{
    CoordinatorError, FailureGate, GateError, QcCoordinator, ValidationRun, VisitStatus,
    VisitValidation,
};
use qc_store::{NewVisit, QcDb};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ScriptedValidation {
    failing: BTreeSet<String>,
    broken: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedValidation {
    fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| (*n).to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl VisitValidation for ScriptedValidation {
    async fn validate_visit(
        &self,
        _module: &str,
        locator: &Locator,
    ) -> Result<ValidationRun, CoordinatorError> {
        self.calls.lock().unwrap().push(locator.file_name.clone());
        if self.broken.contains(&locator.file_name) {
            return Ok(ValidationRun::SystemFailure("job failed".to_string()));
        }
        if self.failing.contains(&locator.file_name) {
            return Ok(ValidationRun::Completed(ValidationOutcome::fail(vec![
                empty_field_error("age", None),
            ])));
        }
        Ok(ValidationRun::Completed(ValidationOutcome::pass()))
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn locator(name: &str) -> Locator {
    Locator {
        file_name: name.to_string(),
        file_id: None,
        container_id: format!("acq-{name}"),
    }
}

/// Store `(file, visitdate, visitnum)` visits for P1/UDS.
async fn seeded(visits: &[(&str, &str, i64)]) -> QcDb {
    let db = QcDb::open_local(":memory:").await.unwrap();
    for (name, visitdate, visitnum) in visits {
        db.upsert_visit(&NewVisit {
            dataset: Dataset::Current,
            participant: "P1".to_string(),
            module: "UDS".to_string(),
            locator: locator(name),
            session_id: None,
            fields: FieldMap::from([
                (keys::PTID.to_string(), FieldValue::from("P1")),
                (keys::VISITDATE.to_string(), FieldValue::from(*visitdate)),
                (keys::VISITNUM.to_string(), FieldValue::Integer(*visitnum)),
            ]),
        })
        .await
        .unwrap();
    }
    db
}

fn queued(visits: &[(&str, &str)]) -> QueuedVisits {
    QueuedVisits {
        participant: "P1".to_string(),
        module: "UDS".to_string(),
        visits: visits
            .iter()
            .map(|(name, d)| QueuedVisit {
                file_name: (*name).to_string(),
                file_id: None,
                visit_date: date(d),
            })
            .collect(),
    }
}

fn statuses(report: &qc_engine::BatchReport) -> Vec<(String, VisitStatus)> {
    report
        .visits
        .iter()
        .map(|v| (v.file_name.clone(), v.status.clone()))
        .collect()
}

fn blocked_by(file: &str) -> VisitStatus {
    VisitStatus::Blocked {
        failed_file: file.to_string(),
    }
}

#[tokio::test]
async fn first_visit_fails_second_is_blocked() {
    let db = seeded(&[("p1-v1.json", "2024-01-10", 1), ("p1-v2.json", "2024-03-02", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::failing(&["p1-v1.json"]);
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(
            &queued(&[("p1-v1.json", "2024-01-10"), ("p1-v2.json", "2024-03-02")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        statuses(&report),
        vec![
            ("p1-v1.json".to_string(), VisitStatus::Failed),
            ("p1-v2.json".to_string(), blocked_by("p1-v1.json")),
        ]
    );
    assert_eq!(runner.calls(), vec!["p1-v1.json"]);
    assert_eq!(
        report.gate,
        Some(FailedVisit::new(&locator("p1-v1.json"), date("2024-01-10")))
    );

    let qc = db.qc_metadata(&locator("p1-v2.json")).await.unwrap();
    let result = &qc[keys::COORDINATOR_STAGE].validation;
    assert_eq!(result.state, QcState::Fail);
    assert!(result.data[0].is(ErrorCode::FailedPreviousVisit));
    assert_eq!(result.data[0].value.as_deref(), Some("p1-v1.json"));
    let tags = db.visit_tags(&locator("p1-v2.json")).await.unwrap();
    assert!(tags.contains(&format!("{}-FAIL", keys::COORDINATOR_STAGE)));
}

#[tokio::test]
async fn blocked_marker_survives_a_later_check_result() {
    let db = seeded(&[("p1-v1.json", "2024-01-10", 1), ("p1-v2.json", "2024-03-02", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::failing(&["p1-v1.json"]);
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);
    coordinator
        .run(&queued(&[("p1-v1.json", "2024-01-10")]), &CancellationToken::new())
        .await
        .unwrap();

    db.record_qc(
        &locator("p1-v2.json"),
        keys::QC_STAGE,
        &QcResult {
            state: QcState::Pass,
            data: Vec::new(),
        },
    )
    .await
    .unwrap();

    let qc = db.qc_metadata(&locator("p1-v2.json")).await.unwrap();
    assert_eq!(qc[keys::QC_STAGE].validation.state, QcState::Pass);
    let blocked = &qc[keys::COORDINATOR_STAGE].validation;
    assert_eq!(blocked.state, QcState::Fail);
    assert!(blocked.data[0].is(ErrorCode::FailedPreviousVisit));
}

#[tokio::test]
async fn nothing_after_a_failure_is_validated() {
    let db = seeded(&[
        ("v1.json", "2024-01-01", 1),
        ("v3.json", "2024-03-01", 3),
        ("v2.json", "2024-02-01", 2),
        ("v4.json", "2024-04-01", 4),
    ])
    .await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::failing(&["v3.json"]);
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("v1.json", "2024-01-01")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        statuses(&report),
        vec![
            ("v1.json".to_string(), VisitStatus::Passed),
            ("v2.json".to_string(), VisitStatus::Passed),
            ("v3.json".to_string(), VisitStatus::Failed),
            ("v4.json".to_string(), blocked_by("v3.json")),
        ]
    );
    assert_eq!(runner.calls(), vec!["v1.json", "v2.json", "v3.json"]);
    assert_eq!(report.validated(), 3);
}

#[tokio::test]
async fn rerunning_a_failed_batch_is_idempotent() {
    let db = seeded(&[("v1.json", "2024-01-01", 1), ("v2.json", "2024-02-01", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::failing(&["v1.json"]);
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);
    let batch = queued(&[("v1.json", "2024-01-01")]);

    let first = coordinator.run(&batch, &CancellationToken::new()).await.unwrap();
    let revision = db.gate("P1", "UDS").await.unwrap().revision;
    let second = coordinator.run(&batch, &CancellationToken::new()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(db.gate("P1", "UDS").await.unwrap().revision, revision);
}

#[tokio::test]
async fn later_upload_behind_a_failure_is_blocked_without_validation() {
    let db = seeded(&[("v1.json", "2024-01-01", 1), ("v2.json", "2024-02-01", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    gate.mark_failed(
        "P1",
        "UDS",
        FailedVisit::new(&locator("v1.json"), date("2024-01-01")),
    )
    .await
    .unwrap();
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("v2.json", "2024-02-01")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(statuses(&report), vec![("v2.json".to_string(), blocked_by("v1.json"))]);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn corrected_failure_clears_gate_and_unblocks() {
    let db = seeded(&[("v1.json", "2024-01-01", 1), ("v2.json", "2024-02-01", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    gate.mark_failed(
        "P1",
        "UDS",
        FailedVisit::new(&locator("v1.json"), date("2024-01-01")),
    )
    .await
    .unwrap();
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("v1.json", "2024-01-01")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.calls(), vec!["v1.json", "v2.json"]);
    assert_eq!(report.gate, None);
    assert_eq!(gate.current("P1", "UDS").await.unwrap(), None);
}

#[tokio::test]
async fn earlier_upload_than_failure_aborts_before_writing() {
    let db = seeded(&[("v1.json", "2024-01-01", 1), ("v2.json", "2024-02-01", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    gate.mark_failed(
        "P1",
        "UDS",
        FailedVisit::new(&locator("v2.json"), date("2024-02-01")),
    )
    .await
    .unwrap();
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let err = coordinator
        .run(&queued(&[("v1.json", "2024-01-01")]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Gate(GateError::OutOfOrder { .. })));
    assert!(runner.calls().is_empty());
    assert!(db.qc_metadata(&locator("v1.json")).await.unwrap().is_empty());
    assert!(db.qc_metadata(&locator("v2.json")).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_recheck_revalidates_earlier_visits() {
    let db = seeded(&[
        ("v1.json", "2024-01-01", 1),
        ("v2.json", "2024-02-01", 2),
        ("v3.json", "2024-03-01", 3),
    ])
    .await;
    let gate = FailureGate::new(&db, 3);
    gate.mark_failed(
        "P1",
        "UDS",
        FailedVisit::new(&locator("v2.json"), date("2024-02-01")),
    )
    .await
    .unwrap();
    let runner = ScriptedValidation::failing(&["v2.json"]);
    let config = CoordinatorConfig {
        check_all: true,
        recheck_policy: RecheckPolicy::All,
        ..CoordinatorConfig::default()
    };
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("v3.json", "2024-03-01")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        statuses(&report),
        vec![
            ("v1.json".to_string(), VisitStatus::Passed),
            ("v2.json".to_string(), VisitStatus::Failed),
            ("v3.json".to_string(), blocked_by("v2.json")),
        ]
    );
    assert_eq!(runner.calls(), vec!["v1.json", "v2.json"]);
}

#[tokio::test]
async fn system_failure_is_recorded_and_gates() {
    let db = seeded(&[("v1.json", "2024-01-01", 1), ("v2.json", "2024-02-01", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation {
        broken: BTreeSet::from(["v1.json".to_string()]),
        ..ScriptedValidation::default()
    };
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("v1.json", "2024-01-01")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.visits[0].status, VisitStatus::SystemError);
    assert_eq!(report.visits[1].status, blocked_by("v1.json"));
    let qc = db.qc_metadata(&locator("v1.json")).await.unwrap();
    assert!(qc[keys::COORDINATOR_STAGE].validation.data[0].is(ErrorCode::SystemError));
    assert!(!qc.contains_key(keys::QC_STAGE));
    assert!(gate.current("P1", "UDS").await.unwrap().is_some());
}

#[tokio::test]
async fn cancelled_before_first_visit() {
    let db = seeded(&[("v1.json", "2024-01-01", 1)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = coordinator
        .run(&queued(&[("v1.json", "2024-01-01")]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Cancelled));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn empty_batch_and_unknown_visits() {
    let db = seeded(&[("v1.json", "2024-01-01", 1)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);
    let cancel = CancellationToken::new();

    let err = coordinator.run(&queued(&[]), &cancel).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::EmptyBatch { .. }));

    let err = coordinator
        .run(&queued(&[("v9.json", "2025-01-01")]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NoVisits { .. }));
}

#[tokio::test]
async fn stored_us_layout_dates_are_fetched_by_date() {
    let db = seeded(&[("p1-v1.json", "01/10/2024", 1), ("p1-v2.json", "03/02/2024", 2)]).await;
    let gate = FailureGate::new(&db, 3);
    let runner = ScriptedValidation::default();
    let config = CoordinatorConfig::default();
    let coordinator = QcCoordinator::new(&db, &gate, &runner, &config);

    let report = coordinator
        .run(&queued(&[("p1-v2.json", "2024-03-02")]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.calls(), vec!["p1-v2.json".to_string()]);
    assert_eq!(
        statuses(&report),
        vec![("p1-v2.json".to_string(), VisitStatus::Passed)]
    );
    assert_eq!(report.visits[0].visit_date, date("2024-03-02"));
}
