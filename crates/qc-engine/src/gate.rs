//! Failure gate: per participant/module memory of the last failed visit.
//!
//! [`decide`] is the pure ordering rule. [`FailureGate`] wraps a
//! [`GateRepository`] and serializes read-modify-write per key: an in-process
//! async mutex keeps local writers in line, and a revision compare-and-swap
//! catches writers in other processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use qc_core::entities::{FailedVisit, GateEntry, Locator};
use qc_core::traits::GateRepository;

use crate::error::GateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Nothing blocks the visit.
    Proceed,
    /// The visit is the recorded failure itself; validate it again.
    ProceedNoRecheck,
    /// An earlier visit failed; the visit must not be validated.
    Blocked { failed: FailedVisit },
}

impl GateDecision {
    #[must_use]
    pub const fn may_validate(&self) -> bool {
        !matches!(self, Self::Blocked { .. })
    }

    /// The recorded failure blocking the visit, if any.
    #[must_use]
    pub const fn blocking(&self) -> Option<&FailedVisit> {
        match self {
            Self::Blocked { failed } => Some(failed),
            _ => None,
        }
    }
}

/// Decide whether the visit in `locator`, dated `visit_date`, may be
/// validated given the recorded failure.
///
/// # Errors
///
/// Returns `GateError::OutOfOrder` for a different file dated at or before the
/// recorded failure.
pub fn decide(
    prior: Option<&FailedVisit>,
    locator: &Locator,
    visit_date: NaiveDate,
) -> Result<GateDecision, GateError> {
    let Some(failed) = prior else {
        return Ok(GateDecision::Proceed);
    };

    if failed.is_file(locator) {
        if failed.visit_date == visit_date {
            return Ok(GateDecision::ProceedNoRecheck);
        }
        tracing::warn!(
            file = %locator.file_name,
            from = %failed.visit_date,
            to = %visit_date,
            "visit date updated on failed visit"
        );
        return Ok(GateDecision::Proceed);
    }

    if visit_date > failed.visit_date {
        return Ok(GateDecision::Blocked {
            failed: failed.clone(),
        });
    }

    Err(GateError::OutOfOrder {
        failed_file: failed.file_name.clone(),
        failed_date: failed.visit_date,
        file: locator.file_name.clone(),
        visit_date,
    })
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Gate store with per-key serialization.
pub struct FailureGate<'a, R> {
    repo: &'a R,
    locks: Mutex<HashMap<(String, String), KeyLock>>,
    retries: u32,
}

impl<'a, R: GateRepository> FailureGate<'a, R> {
    /// `retries` bounds the compare-and-swap attempts per write.
    #[must_use]
    pub fn new(repo: &'a R, retries: u32) -> Self {
        Self {
            repo,
            locks: Mutex::new(HashMap::new()),
            retries: retries.max(1),
        }
    }

    fn key_lock(&self, participant: &str, module: &str) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry((participant.to_string(), module.to_uppercase()))
                .or_default(),
        )
    }

    /// The recorded failure, if any.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Store` if the repository cannot be read.
    pub async fn current(
        &self,
        participant: &str,
        module: &str,
    ) -> Result<Option<FailedVisit>, GateError> {
        Ok(self.repo.load_gate(participant, module).await?.entry.failed)
    }

    /// Record `failed` as the last failed visit. Writing the entry already
    /// stored is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Contended` when every attempt lost the race and
    /// `GateError::Store` on repository failure.
    pub async fn mark_failed(
        &self,
        participant: &str,
        module: &str,
        failed: FailedVisit,
    ) -> Result<(), GateError> {
        let lock = self.key_lock(participant, module);
        let _guard = lock.lock().await;

        let entry = GateEntry::failed(failed);
        for attempt in 1..=self.retries {
            let snapshot = self.repo.load_gate(participant, module).await?;
            if snapshot.entry == entry {
                return Ok(());
            }
            if self
                .repo
                .store_gate(participant, module, &entry, snapshot.revision)
                .await?
            {
                tracing::info!(
                    participant,
                    module,
                    file = ?entry.failed.as_ref().map(|f| f.file_name.as_str()),
                    "recorded failed visit"
                );
                return Ok(());
            }
            tracing::debug!(participant, module, attempt, "gate write lost, retrying");
        }
        Err(self.contended(participant, module))
    }

    /// Clear the gate if it records the file in `locator`. Returns whether the
    /// gate was cleared.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Contended` when every attempt lost the race and
    /// `GateError::Store` on repository failure.
    pub async fn clear_if_matches(
        &self,
        participant: &str,
        module: &str,
        locator: &Locator,
    ) -> Result<bool, GateError> {
        let lock = self.key_lock(participant, module);
        let _guard = lock.lock().await;

        for attempt in 1..=self.retries {
            let snapshot = self.repo.load_gate(participant, module).await?;
            match &snapshot.entry.failed {
                Some(failed) if failed.is_file(locator) => {}
                _ => return Ok(false),
            }
            if self
                .repo
                .store_gate(participant, module, &GateEntry::default(), snapshot.revision)
                .await?
            {
                tracing::info!(participant, module, file = %locator.file_name, "cleared failed visit");
                return Ok(true);
            }
            tracing::debug!(participant, module, attempt, "gate clear lost, retrying");
        }
        Err(self.contended(participant, module))
    }

    fn contended(&self, participant: &str, module: &str) -> GateError {
        GateError::Contended {
            participant: participant.to_string(),
            module: module.to_string(),
            attempts: self.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qc_core::CoreError;
    use qc_core::entities::GateSnapshot;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn locator(name: &str) -> Locator {
        Locator {
            file_name: name.to_string(),
            file_id: None,
            container_id: "acq".to_string(),
        }
    }

    fn failed(name: &str, d: &str) -> FailedVisit {
        FailedVisit::new(&locator(name), date(d))
    }

    #[rstest]
    #[case("v1.json", "2023-01-01", GateDecision::ProceedNoRecheck)]
    #[case("v1.json", "2023-02-01", GateDecision::Proceed)]
    #[case("v1.json", "2022-12-01", GateDecision::Proceed)]
    #[case("v2.json", "2023-06-01", GateDecision::Blocked { failed: failed("v1.json", "2023-01-01") })]
    fn decisions(#[case] file: &str, #[case] d: &str, #[case] expected: GateDecision) {
        let prior = failed("v1.json", "2023-01-01");
        assert_eq!(decide(Some(&prior), &locator(file), date(d)).unwrap(), expected);
    }

    #[rstest]
    #[case("2023-01-01")]
    #[case("2022-06-01")]
    fn different_file_not_after_failure_is_fatal(#[case] d: &str) {
        let prior = failed("v1.json", "2023-01-01");
        let err = decide(Some(&prior), &locator("v0.json"), date(d)).unwrap_err();
        assert!(matches!(err, GateError::OutOfOrder { .. }));
    }

    #[test]
    fn no_failure_proceeds() {
        assert_eq!(
            decide(None, &locator("a.json"), date("2024-01-01")).unwrap(),
            GateDecision::Proceed
        );
    }

    /// In-memory repository that can reject the next `n` writes.
    #[derive(Default)]
    struct MemoryGates {
        state: Mutex<GateSnapshot>,
        reject: AtomicU32,
        writes: AtomicU32,
    }

    impl GateRepository for MemoryGates {
        async fn load_gate(&self, _: &str, _: &str) -> Result<GateSnapshot, CoreError> {
            Ok(self.state.lock().unwrap().clone())
        }

        async fn store_gate(
            &self,
            _: &str,
            _: &str,
            entry: &GateEntry,
            expected_revision: i64,
        ) -> Result<bool, CoreError> {
            let mut state = self.state.lock().unwrap();
            if self.reject.load(Ordering::SeqCst) > 0 {
                self.reject.fetch_sub(1, Ordering::SeqCst);
                state.revision += 1;
                return Ok(false);
            }
            if state.revision != expected_revision {
                return Ok(false);
            }
            state.entry = entry.clone();
            state.revision += 1;
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn mark_and_clear() {
        let repo = MemoryGates::default();
        let gate = FailureGate::new(&repo, 3);
        gate.mark_failed("P1", "UDS", failed("v1.json", "2023-01-01"))
            .await
            .unwrap();
        assert_eq!(
            gate.current("P1", "UDS").await.unwrap(),
            Some(failed("v1.json", "2023-01-01"))
        );

        assert!(!gate.clear_if_matches("P1", "UDS", &locator("v2.json")).await.unwrap());
        assert!(gate.clear_if_matches("P1", "UDS", &locator("v1.json")).await.unwrap());
        assert_eq!(gate.current("P1", "UDS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn marking_same_failure_twice_writes_once() {
        let repo = MemoryGates::default();
        let gate = FailureGate::new(&repo, 3);
        for _ in 0..2 {
            gate.mark_failed("P1", "UDS", failed("v1.json", "2023-01-01"))
                .await
                .unwrap();
        }
        assert_eq!(repo.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lost_writes_are_retried_then_give_up() {
        let repo = MemoryGates::default();
        repo.reject.store(2, Ordering::SeqCst);
        let gate = FailureGate::new(&repo, 3);
        gate.mark_failed("P1", "UDS", failed("v1.json", "2023-01-01"))
            .await
            .unwrap();

        repo.reject.store(5, Ordering::SeqCst);
        let err = gate
            .mark_failed("P1", "UDS", failed("v2.json", "2023-06-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Contended { attempts: 3, .. }));
    }
}
