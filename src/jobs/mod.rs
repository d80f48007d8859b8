//! Jobs: the six schedulable units (master-data sync plus the five engines),
//! their single-flight registry and status tracking.

pub mod routes;
pub mod scheduler;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{JobError, SyncError};
use crate::gateway::MessagingGateway;
use crate::reactivation::guard::MessagingWindow;
use crate::reactivation::policy::VaccinePolicy;
use crate::reactivation::{
    AppointmentReactivation, BatchJob, BatchReport, BatchRunner, EngineContext,
    FinancialReactivation, GroomingReactivation, SatisfactionSurvey, VaccineReactivation,
};
use crate::store::ReactivationStore;
use crate::vetcare::{SyncReport, SyncService};

pub use scheduler::spawn_scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobName {
    VetcareSync,
    Vaccines,
    Financial,
    Grooming,
    Appointments,
    Satisfaction,
}

impl JobName {
    pub const ALL: [Self; 6] = [
        Self::VetcareSync,
        Self::Vaccines,
        Self::Financial,
        Self::Grooming,
        Self::Appointments,
        Self::Satisfaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VetcareSync => "vetcare_sync",
            Self::Vaccines => "vaccines",
            Self::Financial => "financial",
            Self::Grooming => "grooming",
            Self::Appointments => "appointments",
            Self::Satisfaction => "satisfaction",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| format!("Unknown job: {s}"))
    }
}

impl Serialize for JobName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobReport {
    Reactivation(BatchReport),
    Sync(SyncReport),
}

/// Work behind a job name.
pub enum JobRunner {
    Reactivation(Box<dyn BatchJob>),
    Sync(SyncService),
}

impl JobRunner {
    async fn run(&self) -> JobReport {
        match self {
            Self::Reactivation(job) => JobReport::Reactivation(job.run().await),
            Self::Sync(sync) => JobReport::Sync(sync.sync_all().await),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: JobName,
    pub running: bool,
    pub last_started_at: Option<NaiveDateTime>,
    pub last_finished_at: Option<NaiveDateTime>,
    pub last_report: Option<JobReport>,
}

impl JobStatus {
    fn idle(name: JobName) -> Self {
        Self {
            name,
            running: false,
            last_started_at: None,
            last_finished_at: None,
            last_report: None,
        }
    }
}

struct JobSlot {
    runner: JobRunner,
    /// Held for the whole run; a second caller fails instead of waiting.
    gate: tokio::sync::Mutex<()>,
    status: Mutex<JobStatus>,
}

/// Owns every job and serialises runs of the same job.
pub struct JobRegistry {
    slots: BTreeMap<JobName, JobSlot>,
    clock: Arc<dyn Clock>,
}

impl JobRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: BTreeMap::new(),
            clock,
        }
    }

    pub fn register(&mut self, name: JobName, runner: JobRunner) {
        self.slots.insert(
            name,
            JobSlot {
                runner,
                gate: tokio::sync::Mutex::new(()),
                status: Mutex::new(JobStatus::idle(name)),
            },
        );
    }

    /// Wire up all six jobs from configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn ReactivationStore>,
        gateway: Arc<dyn MessagingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SyncError> {
        let ctx = EngineContext {
            store: store.clone(),
            gateway,
            clock: clock.clone(),
            window: MessagingWindow::from(&config.messaging),
            country_code: config.messaging.country_code.clone(),
            clinic_name: config.messaging.clinic_name.clone(),
        };
        let paced = config.messaging.default_delay;

        let mut registry = Self::new(clock.clone());
        registry.register(
            JobName::VetcareSync,
            JobRunner::Sync(SyncService::new(&config.vetcare, store, clock)?),
        );
        registry.register(
            JobName::Vaccines,
            JobRunner::Reactivation(Box::new(BatchRunner::new(
                ctx.clone(),
                VaccineReactivation::new(VaccinePolicy::from(&config.vaccines)),
                config.messaging.vaccine_delay,
            ))),
        );
        registry.register(
            JobName::Financial,
            JobRunner::Reactivation(Box::new(BatchRunner::new(
                ctx.clone(),
                FinancialReactivation::new(&config.financial),
                paced,
            ))),
        );
        registry.register(
            JobName::Grooming,
            JobRunner::Reactivation(Box::new(BatchRunner::new(
                ctx.clone(),
                GroomingReactivation::new(&config.grooming),
                paced,
            ))),
        );
        registry.register(
            JobName::Appointments,
            JobRunner::Reactivation(Box::new(BatchRunner::new(
                ctx.clone(),
                AppointmentReactivation::new(&config.appointments),
                paced,
            ))),
        );
        registry.register(
            JobName::Satisfaction,
            JobRunner::Reactivation(Box::new(BatchRunner::new(
                ctx,
                SatisfactionSurvey::new(&config.satisfaction),
                paced,
            ))),
        );
        Ok(registry)
    }

    pub fn names(&self) -> impl Iterator<Item = JobName> + '_ {
        self.slots.keys().copied()
    }

    /// Run a job to completion.
    pub async fn run(&self, name: JobName) -> Result<JobReport, JobError> {
        let slot = self
            .slots
            .get(&name)
            .ok_or_else(|| JobError::Unknown(name.to_string()))?;
        let Ok(_guard) = slot.gate.try_lock() else {
            tracing::warn!(job = %name, "Job already running, not starting another");
            return Err(JobError::AlreadyRunning(name.to_string()));
        };

        let started_at = self.clock.now();
        self.update(slot, |status| {
            status.running = true;
            status.last_started_at = Some(started_at);
        });
        tracing::info!(job = %name, "Job started");

        let report = slot.runner.run().await;

        let finished_at = self.clock.now();
        self.update(slot, |status| {
            status.running = false;
            status.last_finished_at = Some(finished_at);
            status.last_report = Some(report.clone());
        });
        tracing::info!(
            job = %name,
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "Job finished"
        );
        Ok(report)
    }

    /// Run a job addressed by its wire name.
    pub async fn run_named(&self, name: &str) -> Result<JobReport, JobError> {
        let job = name.parse::<JobName>().map_err(|_| JobError::Unknown(name.to_string()))?;
        self.run(job).await
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.slots
            .values()
            .map(|slot| {
                slot.status
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone()
            })
            .collect()
    }

    fn update(&self, slot: &JobSlot, f: impl FnOnce(&mut JobStatus)) {
        f(&mut slot.status.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A job whose runs block until released.

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::store::model::ReactivationCategory;

    pub struct GatedJob {
        pub started: Arc<Notify>,
        pub release: Arc<Notify>,
        pub clock: Arc<dyn Clock>,
    }

    #[async_trait]
    impl BatchJob for GatedJob {
        fn category(&self) -> ReactivationCategory {
            ReactivationCategory::Vaccine
        }

        async fn run(&self) -> BatchReport {
            self.started.notify_one();
            self.release.notified().await;
            let now = self.clock.now();
            BatchReport {
                run_id: uuid::Uuid::new_v4(),
                category: ReactivationCategory::Vaccine,
                candidates: 0,
                success: 0,
                errors: 0,
                skipped: 0,
                abandoned: 0,
                started_at: now,
                finished_at: now,
            }
        }
    }
}
