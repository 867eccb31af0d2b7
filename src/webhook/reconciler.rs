use serde_json::Value;
use tracing::{debug, warn};

use super::payload::{CallbackFlow, CallbackPayload};
use crate::db::ProcessingLogRepository;
use crate::pipeline::{Applied, CanonicalEvent, PipelineError, ProcessingCoordinator};

/// What happened to a delivered callback.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Applied(Applied),
    /// The slot's latest log row already records this status.
    Duplicate,
}

impl ReconcileOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Turns raw automation callbacks into coordinator events, dropping
/// redeliveries.
#[derive(Clone)]
pub struct CallbackReconciler {
    coordinator: ProcessingCoordinator,
}

impl CallbackReconciler {
    pub fn new(coordinator: ProcessingCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &ProcessingCoordinator {
        &self.coordinator
    }

    /// Reconcile a callback of any shape.
    pub fn reconcile(&self, body: Value) -> Result<ReconcileOutcome, PipelineError> {
        self.reconcile_as(body, None)
    }

    /// Reconcile a callback, optionally requiring it to come from `expected`.
    pub fn reconcile_as(
        &self,
        body: Value,
        expected: Option<CallbackFlow>,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let payload = CallbackPayload::from_value(body).inspect_err(|e| {
            warn!("Rejected callback: {}", e);
        })?;

        if let Some(expected) = expected {
            if payload.flow != expected && payload.flow != CallbackFlow::Direct {
                let err = PipelineError::InvalidPayload(format!(
                    "expected a {} callback, got {}",
                    expected.as_str(),
                    payload.flow.as_str()
                ));
                warn!("Meeting {} callback rejected: {}", payload.event.meeting_id, err);
                return Err(err);
            }
        }

        self.reconcile_event(&payload.event)
    }

    /// Apply an already-normalized event with deduplication.
    pub fn reconcile_event(&self, event: &CanonicalEvent) -> Result<ReconcileOutcome, PipelineError> {
        if self.already_recorded(event)? {
            warn!(
                "Meeting {} duplicate {} -> {} callback ignored",
                event.meeting_id, event.step, event.target_status
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        match self.coordinator.apply_event(event) {
            Ok(applied) => Ok(ReconcileOutcome::Applied(applied)),
            Err(PipelineError::IllegalTransition { .. }) if self.already_recorded(event)? => {
                debug!(
                    "Meeting {} {} lost race to an identical delivery",
                    event.meeting_id, event.step
                );
                Ok(ReconcileOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    fn already_recorded(&self, event: &CanonicalEvent) -> Result<bool, PipelineError> {
        let latest = self.coordinator.store().with_conn(|conn| {
            ProcessingLogRepository::latest(conn, event.meeting_id, event.step)
        })?;
        Ok(latest.is_some_and(|entry| entry.status == event.target_status))
    }
}
