//! `ReactivationStore` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::DatabaseError;
use crate::store::model::{
    Appointment, AppointmentCandidate, CompletedService, Customer, DailyCategoryStats,
    DashboardStats, DebtCandidate, FinancialDebt, GroomingCandidate, GroomingPlan, LogEntry, NewCompletedService, NewDebt,
    NewGroomingPlan, NewGroomingService, NewLogEntry, NewVaccine, Pet, ReactivationCategory,
    RecentMessage, SurveyCandidate, TopCustomer, VaccineCandidate,
};

/// Backend-agnostic storage used by the engines, the sync job and reporting.
///
/// "Today" and "now" are always passed in by the caller so every query is
/// evaluated against the same clock the engines use.
#[async_trait]
pub trait ReactivationStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Master data ─────────────────────────────────────────────────

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), DatabaseError>;

    async fn upsert_pet(&self, pet: &Pet) -> Result<(), DatabaseError>;

    async fn pet_exists(&self, pet_id: i64) -> Result<bool, DatabaseError>;

    async fn customer_exists(&self, customer_id: i64) -> Result<bool, DatabaseError>;

    async fn list_pet_ids(&self) -> Result<Vec<i64>, DatabaseError>;

    /// Insert or update by (pet, vaccine name, application date). Returns the row id.
    async fn upsert_vaccine(&self, vaccine: &NewVaccine) -> Result<i64, DatabaseError>;

    async fn upsert_appointment(&self, appointment: &Appointment) -> Result<(), DatabaseError>;

    /// Insert or update by (pet, service date). Returns the row id.
    async fn upsert_grooming_service(
        &self,
        service: &NewGroomingService,
    ) -> Result<i64, DatabaseError>;

    async fn insert_debt(&self, debt: &NewDebt) -> Result<i64, DatabaseError>;

    async fn mark_debt_paid(&self, debt_id: i64) -> Result<(), DatabaseError>;

    async fn get_debt(&self, debt_id: i64) -> Result<Option<FinancialDebt>, DatabaseError>;

    async fn insert_completed_service(
        &self,
        service: &NewCompletedService,
    ) -> Result<i64, DatabaseError>;

    async fn get_completed_service(
        &self,
        service_id: i64,
    ) -> Result<Option<CompletedService>, DatabaseError>;

    async fn insert_grooming_plan(&self, plan: &NewGroomingPlan) -> Result<i64, DatabaseError>;

    // ── Engine candidates ───────────────────────────────────────────

    /// Every vaccine whose owner has a phone on file, newest application first.
    async fn vaccine_candidates(&self) -> Result<Vec<VaccineCandidate>, DatabaseError>;

    /// Unpaid debts with a service date before `today`, oldest first.
    async fn overdue_debts(&self, today: NaiveDate) -> Result<Vec<DebtCandidate>, DatabaseError>;

    /// Every grooming record whose owner has a phone on file.
    async fn grooming_candidates(&self) -> Result<Vec<GroomingCandidate>, DatabaseError>;

    /// Scheduled (not yet confirmed) appointments falling on `day`.
    async fn appointments_on(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<AppointmentCandidate>, DatabaseError>;

    /// Whether the customer has another scheduled or confirmed consult/return
    /// after `now`, excluding `exclude_appointment_id`.
    async fn has_other_future_appointment(
        &self,
        customer_id: i64,
        exclude_appointment_id: i64,
        now: NaiveDateTime,
    ) -> Result<bool, DatabaseError>;

    /// Completed services in `[since, until]` without a survey yet, oldest first.
    async fn survey_candidates(
        &self,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<SurveyCandidate>, DatabaseError>;

    /// Breed-specific plans whose breed list mentions `breed`, cheapest first.
    async fn breed_plans(&self, breed: &str) -> Result<Vec<GroomingPlan>, DatabaseError>;

    /// Up to `limit` general plans, cheapest first.
    async fn general_plans(&self, limit: usize) -> Result<Vec<GroomingPlan>, DatabaseError>;

    // ── Engine mutations ────────────────────────────────────────────

    async fn mark_debt_charged(
        &self,
        debt_id: i64,
        at: NaiveDateTime,
    ) -> Result<(), DatabaseError>;

    async fn mark_survey_sent(
        &self,
        service_id: i64,
        at: NaiveDateTime,
    ) -> Result<(), DatabaseError>;

    // ── Reactivation log ────────────────────────────────────────────

    async fn insert_log(&self, entry: &NewLogEntry) -> Result<i64, DatabaseError>;

    /// Whether any attempt (success or error) for this source was logged in
    /// `[since, until)`.
    async fn log_exists(
        &self,
        customer_id: i64,
        category: ReactivationCategory,
        source_id: i64,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<bool, DatabaseError>;

    /// Log rows for one source, oldest first.
    async fn logs_for_source(
        &self,
        category: ReactivationCategory,
        source_id: i64,
    ) -> Result<Vec<LogEntry>, DatabaseError>;

    // ── Reporting ───────────────────────────────────────────────────

    async fn dashboard_stats(&self, now: NaiveDateTime) -> Result<DashboardStats, DatabaseError>;

    async fn recent_messages(&self, limit: usize) -> Result<Vec<RecentMessage>, DatabaseError>;

    async fn stats_by_day(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DailyCategoryStats>, DatabaseError>;

    async fn top_customers(&self, limit: usize) -> Result<Vec<TopCustomer>, DatabaseError>;
}
