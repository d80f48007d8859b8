//! Generic batch runner.
//!
//! Every engine has the same skeleton: fetch candidates, then for each one in
//! order check eligibility, the messaging window, the duplicate log and the
//! phone, compose the text, send it, apply the domain mutation and log the
//! attempt. The per-domain parts live behind [`ReactivationStrategy`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DatabaseError;
use crate::gateway::MessagingGateway;
use crate::reactivation::guard::{DedupWindow, MessagingWindow, PhoneNumber};
use crate::store::ReactivationStore;
use crate::store::model::{LogStatus, NewLogEntry, ReactivationCategory};

/// Collaborators shared by every engine.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn ReactivationStore>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub clock: Arc<dyn Clock>,
    pub window: MessagingWindow,
    pub country_code: String,
    pub clinic_name: String,
}

/// Who a candidate message goes to and what it is about.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub customer_id: i64,
    pub pet_id: Option<i64>,
    pub source_id: i64,
    pub phone: &'a str,
}

/// Result of the domain eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(&'static str),
}

/// Per-domain behaviour plugged into [`BatchRunner`].
#[async_trait]
pub trait ReactivationStrategy: Send + Sync {
    type Candidate: Send + Sync;

    fn category(&self) -> ReactivationCategory;

    /// Load every candidate for this run, in processing order.
    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        now: NaiveDateTime,
    ) -> Result<Vec<Self::Candidate>, DatabaseError>;

    fn target<'a>(&self, candidate: &'a Self::Candidate) -> Target<'a>;

    async fn check(
        &self,
        store: &dyn ReactivationStore,
        candidate: &Self::Candidate,
        now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError>;

    fn dedup_window(&self, _candidate: &Self::Candidate) -> DedupWindow {
        DedupWindow::SameDay
    }

    async fn compose(
        &self,
        store: &dyn ReactivationStore,
        candidate: &Self::Candidate,
        now: NaiveDateTime,
        clinic_name: &str,
    ) -> Result<String, DatabaseError>;

    /// State change after a successful send.
    async fn on_success(
        &self,
        _store: &dyn ReactivationStore,
        _candidate: &Self::Candidate,
        _now: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Outcome counts for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub category: ReactivationCategory,
    pub candidates: usize,
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Candidates left untouched because the messaging window closed.
    pub abandoned: usize,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
}

impl BatchReport {
    fn new(run_id: Uuid, category: ReactivationCategory, started_at: NaiveDateTime) -> Self {
        Self {
            run_id,
            category,
            candidates: 0,
            success: 0,
            errors: 0,
            skipped: 0,
            abandoned: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

/// A runnable batch, independent of its candidate type.
#[async_trait]
pub trait BatchJob: Send + Sync {
    fn category(&self) -> ReactivationCategory;

    async fn run(&self) -> BatchReport;
}

enum Step {
    Sent,
    Failed,
    Skipped,
    /// Failed without reaching the gateway.
    Rejected,
    WindowClosed,
}

/// Runs one strategy over its candidates, strictly in order.
pub struct BatchRunner<S> {
    ctx: EngineContext,
    strategy: S,
    pacing: Duration,
}

impl<S: ReactivationStrategy> BatchRunner<S> {
    pub fn new(ctx: EngineContext, strategy: S, pacing: Duration) -> Self {
        Self {
            ctx,
            strategy,
            pacing,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    async fn run_batch(&self, run_id: Uuid) -> BatchReport {
        let category = self.strategy.category();
        let started_at = self.ctx.clock.now();
        let mut report = BatchReport::new(run_id, category, started_at);
        let store = self.ctx.store.as_ref();

        let candidates = match self.strategy.fetch(store, started_at).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load candidates, nothing to do");
                report.finished_at = self.ctx.clock.now();
                return report;
            }
        };
        report.candidates = candidates.len();
        tracing::info!(candidates = candidates.len(), "Batch started");

        for (index, candidate) in candidates.iter().enumerate() {
            let step = self.process(candidate).await;
            match step {
                Step::Sent => report.success += 1,
                Step::Failed | Step::Rejected => report.errors += 1,
                Step::Skipped => report.skipped += 1,
                Step::WindowClosed => {
                    report.abandoned = candidates.len() - index;
                    tracing::warn!(
                        abandoned = report.abandoned,
                        "Messaging window closed, stopping batch"
                    );
                    break;
                }
            }
            let attempted = matches!(step, Step::Sent | Step::Failed);
            if attempted && index + 1 < candidates.len() && !self.pacing.is_zero() {
                tracing::debug!(secs = self.pacing.as_secs(), "Pacing before next send");
                self.ctx.clock.sleep(self.pacing).await;
            }
        }

        report.finished_at = self.ctx.clock.now();
        tracing::info!(
            success = report.success,
            errors = report.errors,
            skipped = report.skipped,
            abandoned = report.abandoned,
            "Batch finished"
        );
        report
    }

    async fn process(&self, candidate: &S::Candidate) -> Step {
        let store = self.ctx.store.as_ref();
        let category = self.strategy.category();
        let target = self.strategy.target(candidate);
        let now = self.ctx.clock.now();

        match self.strategy.check(store, candidate, now).await {
            Ok(Eligibility::Eligible) => {}
            Ok(Eligibility::Skip(reason)) => {
                tracing::debug!(source_id = target.source_id, reason, "Skipped");
                return Step::Skipped;
            }
            Err(e) => return self.storage_failure(&target, now, "eligibility check", e).await,
        }

        if !self.ctx.window.is_open(now) {
            return Step::WindowClosed;
        }

        let (since, until) = self.strategy.dedup_window(candidate).range(now.date());
        match store
            .log_exists(target.customer_id, category, target.source_id, since, until)
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(
                    customer_id = target.customer_id,
                    source_id = target.source_id,
                    "Already messaged, skipping"
                );
                return Step::Skipped;
            }
            Err(e) => return self.storage_failure(&target, now, "duplicate check", e).await,
        }

        let phone = match PhoneNumber::parse(target.phone, &self.ctx.country_code) {
            Ok(phone) => phone,
            Err(e) => {
                tracing::warn!(customer_id = target.customer_id, error = %e, "Invalid phone");
                self.record(&target, String::new(), now, LogStatus::Error, Some("invalid phone"))
                    .await;
                return Step::Rejected;
            }
        };

        let text = match self
            .strategy
            .compose(store, candidate, now, &self.ctx.clinic_name)
            .await
        {
            Ok(text) => text,
            Err(e) => return self.storage_failure(&target, now, "compose", e).await,
        };

        let sent = match self.ctx.gateway.send_text(&phone, &text).await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(
                    customer_id = target.customer_id,
                    source_id = target.source_id,
                    gateway = self.ctx.gateway.name(),
                    error = %e,
                    "Send failed"
                );
                false
            }
        };
        let sent_at = self.ctx.clock.now();

        if !sent {
            self.record(&target, text, sent_at, LogStatus::Error, Some("send failed"))
                .await;
            return Step::Failed;
        }

        if let Err(e) = self.strategy.on_success(store, candidate, sent_at).await {
            tracing::error!(source_id = target.source_id, error = %e, "Failed to persist send");
        }
        self.record(&target, text, sent_at, LogStatus::Success, None)
            .await;
        tracing::info!(
            customer_id = target.customer_id,
            source_id = target.source_id,
            "Message sent"
        );
        Step::Sent
    }

    async fn storage_failure(
        &self,
        target: &Target<'_>,
        now: NaiveDateTime,
        stage: &str,
        error: DatabaseError,
    ) -> Step {
        tracing::error!(source_id = target.source_id, stage, error = %error, "Storage failure");
        let reason = format!("storage error during {stage}");
        self.record(target, String::new(), now, LogStatus::Error, Some(reason.as_str()))
            .await;
        Step::Rejected
    }

    async fn record(
        &self,
        target: &Target<'_>,
        message: String,
        sent_at: NaiveDateTime,
        status: LogStatus,
        error_message: Option<&str>,
    ) {
        let entry = NewLogEntry {
            customer_id: target.customer_id,
            pet_id: target.pet_id,
            category: self.strategy.category(),
            source_id: target.source_id,
            message,
            sent_at,
            status,
            error_message: error_message.map(str::to_string),
        };
        if let Err(e) = self.ctx.store.insert_log(&entry).await {
            tracing::error!(source_id = target.source_id, error = %e, "Failed to write reactivation log");
        }
    }
}

#[async_trait]
impl<S> BatchJob for BatchRunner<S>
where
    S: ReactivationStrategy + 'static,
{
    fn category(&self) -> ReactivationCategory {
        self.strategy.category()
    }

    async fn run(&self) -> BatchReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reactivation_batch",
            category = %self.strategy.category(),
            run_id = %run_id
        );
        self.run_batch(run_id).instrument(span).await
    }
}
