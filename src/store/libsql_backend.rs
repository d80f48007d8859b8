//! libSQL backend: async `ReactivationStore` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! clinic-local `YYYY-MM-DD HH:MM:SS` text and dates as `YYYY-MM-DD`, so
//! calendar-day filters are plain string ranges.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{
    Appointment, AppointmentCandidate, CategoryCount, CompletedService, Contact, Customer,
    DATE_FORMAT, DATETIME_FORMAT, DailyCategoryStats, DashboardStats, DebtCandidate,
    FinancialDebt, GroomingCandidate, GroomingPlan, GroomingService, LogEntry,
    NewCompletedService, NewDebt, NewGroomingPlan, NewGroomingService, NewLogEntry, NewVaccine,
    Pet, ReactivationCategory, RecentMessage, SpeciesCount, SurveyCandidate, TopCustomer,
    VaccineCandidate, VaccineRecord,
};
use crate::store::traits::ReactivationStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a `SELECT COUNT(*)`-style query and return the first column.
    async fn count(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            Some(row) => Ok(row.get::<i64>(0).unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Run an `INSERT ... RETURNING id` and return the id.
    async fn insert_returning_id(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
            .ok_or_else(|| DatabaseError::Query(format!("{op}: no id returned")))?;
        row.get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn start_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(chrono::NaiveTime::MIN)
}

fn audit_now() -> String {
    fmt_datetime(Local::now().naive_local())
}

/// Parse a stored timestamp. Accepts our canonical format, ISO-8601 with
/// `T`/fractional seconds/offset, and bare dates (midnight).
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in [
        DATETIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok().map(start_of)
}

/// Parse a stored calendar date, tolerating a trailing time component.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| s.get(..10).and_then(|p| NaiveDate::parse_from_str(p, DATE_FORMAT).ok()))
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

fn flag(b: bool) -> i64 {
    i64::from(b)
}

fn col_err(idx: i32, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Serialization(format!("column {idx}: {e}"))
}

fn int_col(row: &libsql::Row, idx: i32) -> Result<i64, DatabaseError> {
    row.get::<i64>(idx).map_err(|e| col_err(idx, e))
}

fn text_col(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    row.get::<String>(idx).map_err(|e| col_err(idx, e))
}

fn opt_text_col(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn bool_col(row: &libsql::Row, idx: i32) -> bool {
    row.get::<i64>(idx).map(|v| v != 0).unwrap_or(false)
}

fn date_col(row: &libsql::Row, idx: i32) -> Result<NaiveDate, DatabaseError> {
    let raw = text_col(row, idx)?;
    parse_date(&raw).ok_or_else(|| col_err(idx, format!("bad date {raw:?}")))
}

fn opt_date_col(row: &libsql::Row, idx: i32) -> Option<NaiveDate> {
    opt_text_col(row, idx).and_then(|s| parse_date(&s))
}

fn datetime_col(row: &libsql::Row, idx: i32) -> Result<NaiveDateTime, DatabaseError> {
    let raw = text_col(row, idx)?;
    parse_datetime(&raw).ok_or_else(|| col_err(idx, format!("bad timestamp {raw:?}")))
}

fn opt_datetime_col(row: &libsql::Row, idx: i32) -> Option<NaiveDateTime> {
    opt_text_col(row, idx).and_then(|s| parse_datetime(&s))
}

fn decimal_col(row: &libsql::Row, idx: i32) -> Result<Decimal, DatabaseError> {
    let raw = text_col(row, idx)?;
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| col_err(idx, format!("bad amount {raw:?}: {e}")))
}

fn parsed_col<T>(row: &libsql::Row, idx: i32) -> Result<T, DatabaseError>
where
    T: std::str::FromStr<Err = String>,
{
    text_col(row, idx)?.parse().map_err(|e: String| col_err(idx, e))
}

fn contact_cols(row: &libsql::Row, start: i32) -> Result<Contact, DatabaseError> {
    Ok(Contact {
        customer_id: int_col(row, start)?,
        name: text_col(row, start + 1)?,
        phone: text_col(row, start + 2)?,
    })
}

/// Collect rows through a mapper. A row that fails to map fails the whole
/// query; callers never see a silently truncated list.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    what: &str,
    map: impl Fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("reading {what} rows: {e}")))?
    {
        let item = map(&row).map_err(|e| {
            error!(error = %e, "Malformed {what} row");
            DatabaseError::Serialization(format!("{what} row: {e}"))
        })?;
        out.push(item);
    }
    Ok(out)
}

const CONTACT_FILTER: &str = "c.phone IS NOT NULL AND TRIM(c.phone) != ''";

/// 0:id, 1:pet_id, 2:vaccine_name, 3:application_date, 4:next_dose_date,
/// 5:is_annual, 6:pet name, 7..9: contact
fn row_to_vaccine_candidate(row: &libsql::Row) -> Result<VaccineCandidate, DatabaseError> {
    Ok(VaccineCandidate {
        vaccine: VaccineRecord {
            id: int_col(row, 0)?,
            pet_id: int_col(row, 1)?,
            vaccine_name: text_col(row, 2)?,
            application_date: date_col(row, 3)?,
            next_dose_date: opt_date_col(row, 4),
            is_annual: bool_col(row, 5),
        },
        pet_name: text_col(row, 6)?,
        contact: contact_cols(row, 7)?,
    })
}

/// 0:id, 1:customer_id, 2:service_date, 3:amount, 4:description, 5:paid,
/// 6:last_charge_date
fn row_to_debt(row: &libsql::Row) -> Result<FinancialDebt, DatabaseError> {
    Ok(FinancialDebt {
        id: int_col(row, 0)?,
        customer_id: int_col(row, 1)?,
        service_date: date_col(row, 2)?,
        amount: decimal_col(row, 3)?,
        description: opt_text_col(row, 4).unwrap_or_default(),
        paid: bool_col(row, 5),
        last_charge_date: opt_datetime_col(row, 6),
    })
}

/// 0:id, 1:pet_id, 2:service_date, 3:service_type, 4:has_plan, 5:plan_type,
/// 6:pet name, 7:breed, 8..10: contact
fn row_to_grooming_candidate(row: &libsql::Row) -> Result<GroomingCandidate, DatabaseError> {
    Ok(GroomingCandidate {
        service: GroomingService {
            id: int_col(row, 0)?,
            pet_id: int_col(row, 1)?,
            service_date: date_col(row, 2)?,
            service_type: parsed_col(row, 3)?,
            has_plan: bool_col(row, 4),
            plan_type: opt_text_col(row, 5).and_then(|s| s.parse().ok()),
        },
        pet_name: text_col(row, 6)?,
        pet_breed: opt_text_col(row, 7).filter(|b| !b.trim().is_empty()),
        contact: contact_cols(row, 8)?,
    })
}

/// 0:id, 1:pet_id, 2:appointment_date, 3:type, 4:status, 5:notes, 6:amount,
/// 7:pet name, 8..10: contact
fn row_to_appointment_candidate(
    row: &libsql::Row,
) -> Result<AppointmentCandidate, DatabaseError> {
    Ok(AppointmentCandidate {
        appointment: Appointment {
            id: int_col(row, 0)?,
            pet_id: int_col(row, 1)?,
            scheduled_at: datetime_col(row, 2)?,
            kind: parsed_col(row, 3)?,
            status: parsed_col(row, 4)?,
            notes: opt_text_col(row, 5),
            amount: opt_text_col(row, 6).and_then(|s| s.parse().ok()),
        },
        pet_name: text_col(row, 7)?,
        contact: contact_cols(row, 8)?,
    })
}

/// 0:id, 1:pet_id, 2:service_date, 3:service_type, 4:has_grooming,
/// 5:has_tosa, 6:has_taxidog, 7:satisfaction_sent
fn row_to_completed_service(row: &libsql::Row) -> Result<CompletedService, DatabaseError> {
    Ok(CompletedService {
        id: int_col(row, 0)?,
        pet_id: int_col(row, 1)?,
        service_date: datetime_col(row, 2)?,
        service_type: opt_text_col(row, 3),
        has_grooming: bool_col(row, 4),
        has_tosa: bool_col(row, 5),
        has_taxidog: bool_col(row, 6),
        satisfaction_sent: bool_col(row, 7),
    })
}

fn row_to_plan(row: &libsql::Row) -> Result<GroomingPlan, DatabaseError> {
    Ok(GroomingPlan {
        id: int_col(row, 0)?,
        name: text_col(row, 1)?,
        description: opt_text_col(row, 2).filter(|d| !d.trim().is_empty()),
        monthly_price: decimal_col(row, 3)?,
        services_included: opt_text_col(row, 4),
    })
}

fn row_to_log(row: &libsql::Row) -> Result<LogEntry, DatabaseError> {
    Ok(LogEntry {
        id: int_col(row, 0)?,
        customer_id: int_col(row, 1)?,
        pet_id: row.get::<i64>(2).ok(),
        category: parsed_col(row, 3)?,
        source_id: int_col(row, 4)?,
        payload: text_col(row, 5)?,
        sent_at: datetime_col(row, 6)?,
        status: parsed_col(row, 7)?,
        error_message: opt_text_col(row, 8),
    })
}

const COMPLETED_COLUMNS: &str = "cs.id, cs.pet_id, cs.service_date, cs.service_type, \
     cs.has_grooming, cs.has_tosa, cs.has_taxidog, cs.satisfaction_sent";

const PLAN_COLUMNS: &str = "id, name, description, monthly_price, services_included";

const LOG_COLUMNS: &str =
    "id, customer_id, pet_id, category, source_id, payload, sent_at, status, error_message";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ReactivationStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Master data ─────────────────────────────────────────────────

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), DatabaseError> {
        let now = audit_now();
        self.conn()
            .execute(
                "INSERT INTO customers (id, name, phone, email, cpf, address, city, state,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, phone = excluded.phone, email = excluded.email,
                    cpf = excluded.cpf, address = excluded.address, city = excluded.city,
                    state = excluded.state, updated_at = excluded.updated_at",
                params![
                    customer.id,
                    customer.name.as_str(),
                    opt_text(customer.phone.as_deref()),
                    opt_text(customer.email.as_deref()),
                    opt_text(customer.cpf.as_deref()),
                    opt_text(customer.address.as_deref()),
                    opt_text(customer.city.as_deref()),
                    opt_text(customer.state.as_deref()),
                    now.clone(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_customer: {e}")))?;
        Ok(())
    }

    async fn upsert_pet(&self, pet: &Pet) -> Result<(), DatabaseError> {
        let now = audit_now();
        let weight = match pet.weight {
            Some(w) => libsql::Value::Real(w),
            None => libsql::Value::Null,
        };
        self.conn()
            .execute(
                "INSERT INTO pets (id, customer_id, name, species, breed, gender, birth_date,
                    weight, color, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    customer_id = excluded.customer_id, name = excluded.name,
                    species = excluded.species, breed = excluded.breed,
                    gender = excluded.gender, birth_date = excluded.birth_date,
                    weight = excluded.weight, color = excluded.color,
                    notes = excluded.notes, updated_at = excluded.updated_at",
                params![
                    pet.id,
                    pet.customer_id,
                    pet.name.as_str(),
                    opt_text(pet.species.as_deref()),
                    opt_text(pet.breed.as_deref()),
                    opt_text(pet.gender.as_deref()),
                    opt_text(pet.birth_date.as_deref()),
                    weight,
                    opt_text(pet.color.as_deref()),
                    opt_text(pet.notes.as_deref()),
                    now.clone(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_pet: {e}")))?;
        Ok(())
    }

    async fn pet_exists(&self, pet_id: i64) -> Result<bool, DatabaseError> {
        let n = self
            .count("pet_exists", "SELECT COUNT(*) FROM pets WHERE id = ?1", params![pet_id])
            .await?;
        Ok(n > 0)
    }

    async fn customer_exists(&self, customer_id: i64) -> Result<bool, DatabaseError> {
        let n = self
            .count(
                "customer_exists",
                "SELECT COUNT(*) FROM customers WHERE id = ?1",
                params![customer_id],
            )
            .await?;
        Ok(n > 0)
    }

    async fn list_pet_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let rows = self
            .conn()
            .query("SELECT id FROM pets ORDER BY id", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_pet_ids: {e}")))?;
        collect_rows(rows, "pet id", |row| int_col(row, 0)).await
    }

    async fn upsert_vaccine(&self, vaccine: &NewVaccine) -> Result<i64, DatabaseError> {
        let now = audit_now();
        let id = self
            .insert_returning_id(
                "upsert_vaccine",
                "INSERT INTO vaccines (pet_id, vaccine_name, application_date, next_dose_date,
                    is_annual, batch_number, veterinarian, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(pet_id, vaccine_name, application_date) DO UPDATE SET
                    next_dose_date = excluded.next_dose_date, is_annual = excluded.is_annual,
                    batch_number = excluded.batch_number,
                    veterinarian = excluded.veterinarian, notes = excluded.notes,
                    updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    vaccine.pet_id,
                    vaccine.vaccine_name.as_str(),
                    fmt_date(vaccine.application_date),
                    opt_text(vaccine.next_dose_date.map(fmt_date).as_deref()),
                    flag(vaccine.is_annual),
                    opt_text(vaccine.batch_number.as_deref()),
                    opt_text(vaccine.veterinarian.as_deref()),
                    opt_text(vaccine.notes.as_deref()),
                    now.clone(),
                    now,
                ],
            )
            .await?;
        debug!(id, pet_id = vaccine.pet_id, "Vaccine upserted");
        Ok(id)
    }

    async fn upsert_appointment(&self, appointment: &Appointment) -> Result<(), DatabaseError> {
        let now = audit_now();
        self.conn()
            .execute(
                "INSERT INTO appointments (id, pet_id, appointment_date, appointment_type,
                    status, notes, amount, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    pet_id = excluded.pet_id, appointment_date = excluded.appointment_date,
                    appointment_type = excluded.appointment_type, status = excluded.status,
                    notes = excluded.notes, amount = excluded.amount,
                    updated_at = excluded.updated_at",
                params![
                    appointment.id,
                    appointment.pet_id,
                    fmt_datetime(appointment.scheduled_at),
                    appointment.kind.as_str(),
                    appointment.status.as_str(),
                    opt_text(appointment.notes.as_deref()),
                    opt_text(appointment.amount.map(|a| a.to_string()).as_deref()),
                    now.clone(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_appointment: {e}")))?;
        Ok(())
    }

    async fn upsert_grooming_service(
        &self,
        service: &NewGroomingService,
    ) -> Result<i64, DatabaseError> {
        let now = audit_now();
        self.insert_returning_id(
            "upsert_grooming_service",
            "INSERT INTO grooming_services (pet_id, service_date, service_type, has_plan,
                plan_type, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(pet_id, service_date) DO UPDATE SET
                service_type = excluded.service_type, notes = excluded.notes,
                updated_at = excluded.updated_at
             RETURNING id",
            params![
                service.pet_id,
                fmt_date(service.service_date),
                service.service_type.as_str(),
                flag(service.has_plan),
                opt_text(service.plan_type.map(|p| p.as_str())),
                opt_text(service.notes.as_deref()),
                now.clone(),
                now,
            ],
        )
        .await
    }

    async fn insert_debt(&self, debt: &NewDebt) -> Result<i64, DatabaseError> {
        self.insert_returning_id(
            "insert_debt",
            "INSERT INTO financial_debts (customer_id, service_date, amount, description,
                paid, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)
             RETURNING id",
            params![
                debt.customer_id,
                fmt_date(debt.service_date),
                debt.amount.to_string(),
                debt.description.as_str(),
                audit_now(),
            ],
        )
        .await
    }

    async fn mark_debt_paid(&self, debt_id: i64) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE financial_debts SET paid = 1 WHERE id = ?1",
                params![debt_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_debt_paid: {e}")))?;
        Ok(())
    }

    async fn get_debt(&self, debt_id: i64) -> Result<Option<FinancialDebt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, customer_id, service_date, amount, description, paid,
                    last_charge_date
                 FROM financial_debts WHERE id = ?1",
                params![debt_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_debt: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_debt: {e}")))?
        {
            Some(row) => Ok(Some(row_to_debt(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_completed_service(
        &self,
        service: &NewCompletedService,
    ) -> Result<i64, DatabaseError> {
        self.insert_returning_id(
            "insert_completed_service",
            "INSERT INTO completed_services (pet_id, service_date, service_type, has_grooming,
                has_tosa, has_taxidog, satisfaction_sent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             RETURNING id",
            params![
                service.pet_id,
                fmt_datetime(service.service_date),
                opt_text(service.service_type.as_deref()),
                flag(service.has_grooming),
                flag(service.has_tosa),
                flag(service.has_taxidog),
                audit_now(),
            ],
        )
        .await
    }

    async fn get_completed_service(
        &self,
        service_id: i64,
    ) -> Result<Option<CompletedService>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMPLETED_COLUMNS} FROM completed_services cs WHERE cs.id = ?1"),
                params![service_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_completed_service: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_completed_service: {e}")))?
        {
            Some(row) => Ok(Some(row_to_completed_service(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_grooming_plan(&self, plan: &NewGroomingPlan) -> Result<i64, DatabaseError> {
        self.insert_returning_id(
            "insert_grooming_plan",
            "INSERT INTO grooming_plans (name, description, monthly_price, services_included,
                breed_specific, breeds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
            params![
                plan.name.as_str(),
                opt_text(plan.description.as_deref()),
                plan.monthly_price.to_string(),
                opt_text(plan.services_included.as_deref()),
                flag(plan.breed_specific),
                opt_text(plan.breeds.as_deref()),
            ],
        )
        .await
    }

    // ── Engine candidates ───────────────────────────────────────────

    async fn vaccine_candidates(&self) -> Result<Vec<VaccineCandidate>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT v.id, v.pet_id, v.vaccine_name, v.application_date, v.next_dose_date,
                        v.is_annual, p.name, c.id, c.name, c.phone
                     FROM vaccines v
                     INNER JOIN pets p ON v.pet_id = p.id
                     INNER JOIN customers c ON p.customer_id = c.id
                     WHERE {CONTACT_FILTER}
                     ORDER BY v.application_date DESC, v.id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("vaccine_candidates: {e}")))?;
        collect_rows(rows, "vaccine", row_to_vaccine_candidate).await
    }

    async fn overdue_debts(&self, today: NaiveDate) -> Result<Vec<DebtCandidate>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT fd.id, fd.customer_id, fd.service_date, fd.amount, fd.description,
                        fd.paid, fd.last_charge_date, c.id, c.name, c.phone
                     FROM financial_debts fd
                     INNER JOIN customers c ON fd.customer_id = c.id
                     WHERE fd.paid = 0
                       AND fd.service_date < ?1
                       AND {CONTACT_FILTER}
                     ORDER BY fd.service_date ASC, fd.id ASC"
                ),
                params![fmt_date(today)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("overdue_debts: {e}")))?;
        collect_rows(rows, "debt", |row| {
            Ok(DebtCandidate {
                debt: row_to_debt(row)?,
                contact: contact_cols(row, 7)?,
            })
        })
        .await
    }

    async fn grooming_candidates(&self) -> Result<Vec<GroomingCandidate>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT gs.id, gs.pet_id, gs.service_date, gs.service_type, gs.has_plan,
                        gs.plan_type, p.name, p.breed, c.id, c.name, c.phone
                     FROM grooming_services gs
                     INNER JOIN pets p ON gs.pet_id = p.id
                     INNER JOIN customers c ON p.customer_id = c.id
                     WHERE {CONTACT_FILTER}
                     ORDER BY gs.service_date DESC, gs.id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("grooming_candidates: {e}")))?;
        collect_rows(rows, "grooming", row_to_grooming_candidate).await
    }

    async fn appointments_on(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<AppointmentCandidate>, DatabaseError> {
        let from = start_of(day);
        let until = from + TimeDelta::days(1);
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT a.id, a.pet_id, a.appointment_date, a.appointment_type, a.status,
                        a.notes, a.amount, p.name, c.id, c.name, c.phone
                     FROM appointments a
                     INNER JOIN pets p ON a.pet_id = p.id
                     INNER JOIN customers c ON p.customer_id = c.id
                     WHERE a.status = 'agendado'
                       AND a.appointment_date >= ?1
                       AND a.appointment_date < ?2
                       AND {CONTACT_FILTER}
                     ORDER BY a.appointment_date ASC, a.id ASC"
                ),
                params![fmt_datetime(from), fmt_datetime(until)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("appointments_on: {e}")))?;
        collect_rows(rows, "appointment", row_to_appointment_candidate).await
    }

    async fn has_other_future_appointment(
        &self,
        customer_id: i64,
        exclude_appointment_id: i64,
        now: NaiveDateTime,
    ) -> Result<bool, DatabaseError> {
        let n = self
            .count(
                "has_other_future_appointment",
                "SELECT COUNT(*)
                 FROM appointments a
                 INNER JOIN pets p ON a.pet_id = p.id
                 WHERE p.customer_id = ?1
                   AND a.id != ?2
                   AND a.appointment_date > ?3
                   AND a.status IN ('agendado', 'confirmado')
                   AND a.appointment_type IN ('retorno', 'consulta')",
                params![customer_id, exclude_appointment_id, fmt_datetime(now)],
            )
            .await?;
        Ok(n > 0)
    }

    async fn survey_candidates(
        &self,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<SurveyCandidate>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMPLETED_COLUMNS}, p.name, c.id, c.name, c.phone
                     FROM completed_services cs
                     INNER JOIN pets p ON cs.pet_id = p.id
                     INNER JOIN customers c ON p.customer_id = c.id
                     WHERE cs.satisfaction_sent = 0
                       AND cs.service_date >= ?1
                       AND cs.service_date <= ?2
                       AND {CONTACT_FILTER}
                     ORDER BY cs.service_date ASC, cs.id ASC"
                ),
                params![fmt_datetime(since), fmt_datetime(until)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("survey_candidates: {e}")))?;
        collect_rows(rows, "completed service", |row| {
            Ok(SurveyCandidate {
                service: row_to_completed_service(row)?,
                pet_name: text_col(row, 8)?,
                contact: contact_cols(row, 9)?,
            })
        })
        .await
    }

    async fn breed_plans(&self, breed: &str) -> Result<Vec<GroomingPlan>, DatabaseError> {
        let pattern = format!("%{}%", breed.trim().to_lowercase());
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM grooming_plans
                     WHERE breed_specific = 1 AND LOWER(breeds) LIKE ?1
                     ORDER BY CAST(monthly_price AS REAL) ASC, id ASC"
                ),
                params![pattern],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("breed_plans: {e}")))?;
        collect_rows(rows, "grooming plan", row_to_plan).await
    }

    async fn general_plans(&self, limit: usize) -> Result<Vec<GroomingPlan>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM grooming_plans
                     WHERE breed_specific = 0
                     ORDER BY CAST(monthly_price AS REAL) ASC, id ASC
                     LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("general_plans: {e}")))?;
        collect_rows(rows, "grooming plan", row_to_plan).await
    }

    // ── Engine mutations ────────────────────────────────────────────

    async fn mark_debt_charged(
        &self,
        debt_id: i64,
        at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE financial_debts SET last_charge_date = ?1 WHERE id = ?2",
                params![fmt_datetime(at), debt_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_debt_charged: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "financial_debt".into(),
                id: debt_id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_survey_sent(
        &self,
        service_id: i64,
        at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE completed_services
                 SET satisfaction_sent = 1, satisfaction_sent_at = ?1
                 WHERE id = ?2",
                params![fmt_datetime(at), service_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_survey_sent: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "completed_service".into(),
                id: service_id.to_string(),
            });
        }
        Ok(())
    }

    // ── Reactivation log ────────────────────────────────────────────

    async fn insert_log(&self, entry: &NewLogEntry) -> Result<i64, DatabaseError> {
        let id = self
            .insert_returning_id(
                "insert_log",
                "INSERT INTO reactivation_logs (customer_id, pet_id, category, source_id,
                    payload, sent_at, status, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 RETURNING id",
                params![
                    entry.customer_id,
                    opt_int(entry.pet_id),
                    entry.category.as_str(),
                    entry.source_id,
                    entry.payload_json(),
                    fmt_datetime(entry.sent_at),
                    entry.status.as_str(),
                    opt_text(entry.error_message.as_deref()),
                ],
            )
            .await?;
        debug!(
            id,
            category = %entry.category,
            source_id = entry.source_id,
            status = entry.status.as_str(),
            "Reactivation log written"
        );
        Ok(id)
    }

    async fn log_exists(
        &self,
        customer_id: i64,
        category: ReactivationCategory,
        source_id: i64,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<bool, DatabaseError> {
        let n = self
            .count(
                "log_exists",
                "SELECT COUNT(*) FROM reactivation_logs
                 WHERE customer_id = ?1
                   AND category = ?2
                   AND source_id = ?3
                   AND sent_at >= ?4
                   AND sent_at < ?5",
                params![
                    customer_id,
                    category.as_str(),
                    source_id,
                    fmt_datetime(since),
                    fmt_datetime(until),
                ],
            )
            .await?;
        Ok(n > 0)
    }

    async fn logs_for_source(
        &self,
        category: ReactivationCategory,
        source_id: i64,
    ) -> Result<Vec<LogEntry>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM reactivation_logs
                     WHERE category = ?1 AND source_id = ?2
                     ORDER BY sent_at ASC, id ASC"
                ),
                params![category.as_str(), source_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("logs_for_source: {e}")))?;
        collect_rows(rows, "log", row_to_log).await
    }

    // ── Reporting ───────────────────────────────────────────────────

    async fn dashboard_stats(&self, now: NaiveDateTime) -> Result<DashboardStats, DatabaseError> {
        let today = now.date();
        let day_start = fmt_datetime(start_of(today));
        let day_end = fmt_datetime(start_of(today) + TimeDelta::days(1));
        let week_start = fmt_datetime(start_of(today) - TimeDelta::days(7));

        let customers = self
            .count("dashboard_stats", "SELECT COUNT(*) FROM customers", ())
            .await?;
        let pets = self
            .count("dashboard_stats", "SELECT COUNT(*) FROM pets", ())
            .await?;
        let messages_today = self
            .count(
                "dashboard_stats",
                "SELECT COUNT(*) FROM reactivation_logs WHERE sent_at >= ?1 AND sent_at < ?2",
                params![day_start.clone(), day_end.clone()],
            )
            .await?;
        let messages_week = self
            .count(
                "dashboard_stats",
                "SELECT COUNT(*) FROM reactivation_logs WHERE sent_at >= ?1",
                params![week_start],
            )
            .await?;
        let success_today = self
            .count(
                "dashboard_stats",
                "SELECT COUNT(*) FROM reactivation_logs
                 WHERE sent_at >= ?1 AND sent_at < ?2 AND status = 'success'",
                params![day_start.clone(), day_end.clone()],
            )
            .await?;
        let errors_today = messages_today - success_today;

        let rows = self
            .conn()
            .query(
                "SELECT category, COUNT(*) AS n FROM reactivation_logs
                 WHERE sent_at >= ?1 AND sent_at < ?2
                 GROUP BY category
                 ORDER BY n DESC, category ASC",
                params![day_start, day_end],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("dashboard_stats: {e}")))?;
        let messages_by_category = collect_rows(rows, "category count", |row| {
            Ok(CategoryCount {
                category: text_col(row, 0)?,
                count: int_col(row, 1)?,
            })
        })
        .await?;

        let upcoming_vaccines = self
            .count(
                "dashboard_stats",
                "SELECT COUNT(*) FROM vaccines
                 WHERE next_dose_date >= ?1 AND next_dose_date <= ?2",
                params![fmt_date(today), fmt_date(today + TimeDelta::days(30))],
            )
            .await?;
        let upcoming_appointments = self
            .count(
                "dashboard_stats",
                "SELECT COUNT(*) FROM appointments
                 WHERE appointment_date >= ?1 AND appointment_date <= ?2
                   AND status IN ('agendado', 'confirmado')",
                params![fmt_datetime(now), fmt_datetime(now + TimeDelta::days(7))],
            )
            .await?;

        let rows = self
            .conn()
            .query(
                "SELECT species, COUNT(*) AS n FROM pets
                 WHERE species IS NOT NULL AND species != ''
                 GROUP BY species
                 ORDER BY n DESC, species ASC
                 LIMIT 5",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("dashboard_stats: {e}")))?;
        let pets_by_species = collect_rows(rows, "species count", |row| {
            Ok(SpeciesCount {
                species: text_col(row, 0)?,
                count: int_col(row, 1)?,
            })
        })
        .await?;

        let mut rows = self
            .conn()
            .query("SELECT MAX(updated_at) FROM pets", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("dashboard_stats: {e}")))?;
        let last_sync = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("dashboard_stats: {e}")))?
            .and_then(|row| opt_datetime_col(&row, 0));

        Ok(DashboardStats {
            customers,
            pets,
            messages_today,
            messages_week,
            success_today,
            errors_today,
            messages_by_category,
            upcoming_vaccines,
            upcoming_appointments,
            pets_by_species,
            last_sync,
        })
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<RecentMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT rl.id, rl.category, c.name, c.phone, p.name, rl.sent_at, rl.status,
                    rl.error_message
                 FROM reactivation_logs rl
                 INNER JOIN customers c ON rl.customer_id = c.id
                 LEFT JOIN pets p ON rl.pet_id = p.id
                 ORDER BY rl.sent_at DESC, rl.id DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_messages: {e}")))?;
        collect_rows(rows, "recent message", |row| {
            Ok(RecentMessage {
                id: int_col(row, 0)?,
                category: text_col(row, 1)?,
                customer_name: text_col(row, 2)?,
                customer_phone: opt_text_col(row, 3),
                pet_name: opt_text_col(row, 4),
                sent_at: datetime_col(row, 5)?,
                status: parsed_col(row, 6)?,
                error_message: opt_text_col(row, 7),
            })
        })
        .await
    }

    async fn stats_by_day(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DailyCategoryStats>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT substr(sent_at, 1, 10) AS day, category, COUNT(*),
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END)
                 FROM reactivation_logs
                 WHERE sent_at >= ?1
                 GROUP BY day, category
                 ORDER BY day DESC, category ASC",
                params![fmt_datetime(start_of(since))],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stats_by_day: {e}")))?;
        collect_rows(rows, "daily stats", |row| {
            Ok(DailyCategoryStats {
                date: date_col(row, 0)?,
                category: text_col(row, 1)?,
                count: int_col(row, 2)?,
                success: int_col(row, 3)?,
            })
        })
        .await
    }

    async fn top_customers(&self, limit: usize) -> Result<Vec<TopCustomer>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT rl.customer_id, c.name, c.phone, COUNT(*) AS total, MAX(rl.sent_at)
                 FROM reactivation_logs rl
                 INNER JOIN customers c ON rl.customer_id = c.id
                 GROUP BY rl.customer_id, c.name, c.phone
                 ORDER BY total DESC, MAX(rl.sent_at) DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("top_customers: {e}")))?;
        collect_rows(rows, "top customer", |row| {
            Ok(TopCustomer {
                customer_id: int_col(row, 0)?,
                customer_name: text_col(row, 1)?,
                customer_phone: opt_text_col(row, 2),
                total_messages: int_col(row, 3)?,
                last_message: datetime_col(row, 4)?,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::model::{
        AppointmentStatus, AppointmentType, GroomingServiceType, LogStatus, PlanType,
    };

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        day(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    async fn seed_owner(db: &LibSqlBackend, customer_id: i64, pet_id: i64, phone: Option<&str>) {
        db.upsert_customer(&Customer::new(customer_id, "Maria", phone))
            .await
            .unwrap();
        db.upsert_pet(&Pet::new(pet_id, customer_id, "Rex").with_breed("Poodle"))
            .await
            .unwrap();
    }

    fn log(customer_id: i64, source_id: i64, sent_at: NaiveDateTime) -> NewLogEntry {
        NewLogEntry {
            customer_id,
            pet_id: Some(10),
            category: ReactivationCategory::Vaccine,
            source_id,
            message: "oi".into(),
            sent_at,
            status: LogStatus::Success,
            error_message: None,
        }
    }

    #[test]
    fn parse_datetime_accepts_common_shapes() {
        let expected = at(2024, 3, 10, 14, 30);
        assert_eq!(parse_datetime("2024-03-10 14:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-10T14:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-10T14:30:00.000"), Some(expected));
        assert_eq!(parse_datetime("2024-03-10"), Some(at(2024, 3, 10, 0, 0)));
        assert_eq!(parse_datetime("garbage"), None);
        assert_eq!(parse_date("2024-03-10 14:30:00"), Some(day(2024, 3, 10)));
    }

    #[tokio::test]
    async fn customer_upsert_updates_in_place() {
        let db = test_db().await;
        db.upsert_customer(&Customer::new(1, "Maria", Some("11999990000")))
            .await
            .unwrap();
        db.upsert_customer(&Customer::new(1, "Maria Silva", Some("11888880000")))
            .await
            .unwrap();
        assert!(db.customer_exists(1).await.unwrap());
        assert!(!db.customer_exists(2).await.unwrap());
        let stats = db.dashboard_stats(at(2024, 3, 10, 9, 0)).await.unwrap();
        assert_eq!(stats.customers, 1);
    }

    #[tokio::test]
    async fn pet_upsert_updates_in_place() {
        let db = test_db().await;
        db.upsert_customer(&Customer::new(1, "Maria", Some("11987654321")))
            .await
            .unwrap();
        db.upsert_pet(&Pet::new(10, 1, "Rex")).await.unwrap();
        let mut pet = Pet::new(10, 1, "Rex Junior").with_breed("Poodle");
        pet.weight = Some(7.5);
        db.upsert_pet(&pet).await.unwrap();

        assert_eq!(db.list_pet_ids().await.unwrap(), vec![10]);
        let mut rows = db
            .conn()
            .query(
                "SELECT name, breed, weight, created_at, updated_at FROM pets WHERE id = 10",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(text_col(&row, 0).unwrap(), "Rex Junior");
        assert_eq!(text_col(&row, 1).unwrap(), "Poodle");
        assert_eq!(row.get::<f64>(2).unwrap(), 7.5);
        assert!(parse_datetime(&text_col(&row, 3).unwrap()).is_some());
        assert!(parse_datetime(&text_col(&row, 4).unwrap()).is_some());
    }

    #[tokio::test]
    async fn malformed_row_fails_the_whole_query() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        db.insert_debt(&NewDebt {
            customer_id: 1,
            service_date: day(2024, 3, 1),
            amount: dec!(80),
            description: "Consulta".into(),
        })
        .await
        .unwrap();
        db.conn()
            .execute(
                "INSERT INTO financial_debts (customer_id, service_date, amount, description,
                    paid, created_at)
                 VALUES (1, '2024-03-02', 'oitenta', 'Banho', 0, '2024-03-02 10:00:00')",
                (),
            )
            .await
            .unwrap();

        let err = db.overdue_debts(day(2024, 3, 10)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(ref msg) if msg.contains("debt row")));
    }

    #[tokio::test]
    async fn vaccine_upsert_is_keyed_by_pet_name_and_date() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let mut vaccine = NewVaccine {
            pet_id: 10,
            vaccine_name: "V10".into(),
            application_date: day(2024, 1, 5),
            next_dose_date: None,
            is_annual: true,
            batch_number: None,
            veterinarian: None,
            notes: None,
        };
        let first = db.upsert_vaccine(&vaccine).await.unwrap();
        vaccine.next_dose_date = Some(day(2025, 1, 5));
        let second = db.upsert_vaccine(&vaccine).await.unwrap();
        assert_eq!(first, second);

        let candidates = db.vaccine_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].vaccine.next_dose_date, Some(day(2025, 1, 5)));
        assert_eq!(candidates[0].pet_name, "Rex");
        assert_eq!(candidates[0].contact.phone, "11987654321");
    }

    #[tokio::test]
    async fn candidates_require_a_phone() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, None).await;
        seed_owner(&db, 2, 20, Some("  ")).await;
        for pet_id in [10, 20] {
            db.upsert_vaccine(&NewVaccine {
                pet_id,
                vaccine_name: "Raiva".into(),
                application_date: day(2024, 1, 5),
                next_dose_date: None,
                is_annual: true,
                batch_number: None,
                veterinarian: None,
                notes: None,
            })
            .await
            .unwrap();
        }
        assert!(db.vaccine_candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overdue_debts_filters_paid_and_future() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let today = day(2024, 3, 10);
        let overdue = db
            .insert_debt(&NewDebt {
                customer_id: 1,
                service_date: day(2024, 3, 9),
                amount: dec!(500),
                description: "Cirurgia".into(),
            })
            .await
            .unwrap();
        let paid = db
            .insert_debt(&NewDebt {
                customer_id: 1,
                service_date: day(2024, 3, 1),
                amount: dec!(80),
                description: "Consulta".into(),
            })
            .await
            .unwrap();
        db.mark_debt_paid(paid).await.unwrap();
        db.insert_debt(&NewDebt {
            customer_id: 1,
            service_date: today,
            amount: dec!(120.50),
            description: "Banho".into(),
        })
        .await
        .unwrap();

        let debts = db.overdue_debts(today).await.unwrap();
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].debt.id, overdue);
        assert_eq!(debts[0].debt.amount, dec!(500));
        assert!(debts[0].debt.last_charge_date.is_none());

        db.mark_debt_charged(overdue, at(2024, 3, 10, 10, 0))
            .await
            .unwrap();
        let debt = db.get_debt(overdue).await.unwrap().unwrap();
        assert_eq!(debt.last_charge_date, Some(at(2024, 3, 10, 10, 0)));
    }

    #[tokio::test]
    async fn mark_debt_charged_unknown_id_is_not_found() {
        let db = test_db().await;
        let err = db
            .mark_debt_charged(99, at(2024, 3, 10, 10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn grooming_upsert_keeps_plan_on_update() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let mut record = NewGroomingService {
            pet_id: 10,
            service_date: day(2024, 3, 1),
            service_type: GroomingServiceType::Banho,
            has_plan: true,
            plan_type: Some(PlanType::Monthly),
            notes: None,
        };
        let id = db.upsert_grooming_service(&record).await.unwrap();
        record.service_type = GroomingServiceType::BanhoTosa;
        record.has_plan = false;
        record.plan_type = None;
        assert_eq!(db.upsert_grooming_service(&record).await.unwrap(), id);

        let candidates = db.grooming_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        let service = &candidates[0].service;
        assert_eq!(service.service_type, GroomingServiceType::BanhoTosa);
        assert!(service.has_plan);
        assert_eq!(service.plan_type, Some(PlanType::Monthly));
        assert_eq!(candidates[0].pet_breed.as_deref(), Some("Poodle"));
    }

    #[tokio::test]
    async fn appointments_on_returns_only_scheduled_for_that_day() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let mk = |id, when, status| Appointment {
            id,
            pet_id: 10,
            scheduled_at: when,
            kind: AppointmentType::Consult,
            status,
            notes: None,
            amount: None,
        };
        db.upsert_appointment(&mk(1, at(2024, 3, 11, 9, 0), AppointmentStatus::Scheduled))
            .await
            .unwrap();
        db.upsert_appointment(&mk(2, at(2024, 3, 11, 15, 0), AppointmentStatus::Confirmed))
            .await
            .unwrap();
        db.upsert_appointment(&mk(3, at(2024, 3, 12, 0, 0), AppointmentStatus::Scheduled))
            .await
            .unwrap();

        let found = db.appointments_on(day(2024, 3, 11)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].appointment.id, 1);

        let now = at(2024, 3, 10, 8, 0);
        assert!(db.has_other_future_appointment(1, 1, now).await.unwrap());
        assert!(!db.has_other_future_appointment(2, 1, now).await.unwrap());
    }

    #[tokio::test]
    async fn future_appointment_check_ignores_surgery_and_cancelled() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let base = Appointment {
            id: 1,
            pet_id: 10,
            scheduled_at: at(2024, 3, 11, 9, 0),
            kind: AppointmentType::Consult,
            status: AppointmentStatus::Scheduled,
            notes: None,
            amount: None,
        };
        db.upsert_appointment(&base).await.unwrap();
        db.upsert_appointment(&Appointment {
            id: 2,
            scheduled_at: at(2024, 3, 20, 9, 0),
            kind: AppointmentType::Surgery,
            ..base.clone()
        })
        .await
        .unwrap();
        db.upsert_appointment(&Appointment {
            id: 3,
            scheduled_at: at(2024, 3, 21, 9, 0),
            kind: AppointmentType::Return,
            status: AppointmentStatus::Cancelled,
            ..base.clone()
        })
        .await
        .unwrap();
        assert!(
            !db.has_other_future_appointment(1, 1, at(2024, 3, 10, 8, 0))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn survey_candidates_window_and_mark_sent() {
        let db = test_db().await;
        seed_owner(&db, 1, 10, Some("11987654321")).await;
        let now = at(2024, 3, 10, 12, 0);
        let recent = db
            .insert_completed_service(&NewCompletedService {
                pet_id: 10,
                service_date: at(2024, 3, 10, 9, 0),
                service_type: Some("banho".into()),
                has_grooming: true,
                has_tosa: false,
                has_taxidog: true,
            })
            .await
            .unwrap();
        db.insert_completed_service(&NewCompletedService {
            pet_id: 10,
            service_date: at(2024, 3, 8, 9, 0),
            service_type: None,
            has_grooming: true,
            has_tosa: false,
            has_taxidog: false,
        })
        .await
        .unwrap();

        let since = now - TimeDelta::hours(24);
        let found = db.survey_candidates(since, now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].service.id, recent);
        assert!(found[0].service.has_taxidog);

        db.mark_survey_sent(recent, now).await.unwrap();
        assert!(db.survey_candidates(since, now).await.unwrap().is_empty());
        let service = db.get_completed_service(recent).await.unwrap().unwrap();
        assert!(service.satisfaction_sent);
    }

    #[tokio::test]
    async fn plans_by_breed_then_general_cheapest_first() {
        let db = test_db().await;
        for (name, price, breed_specific, breeds) in [
            ("Poodle Premium", dec!(199.90), true, Some("poodle,maltês")),
            ("Poodle Básico", dec!(99.90), true, Some("Poodle")),
            ("Geral Ouro", dec!(150), false, None),
            ("Geral Prata", dec!(120), false, None),
            ("Geral Bronze", dec!(90), false, None),
            ("Geral Platina", dec!(250), false, None),
        ] {
            db.insert_grooming_plan(&NewGroomingPlan {
                name: name.into(),
                description: None,
                monthly_price: price,
                services_included: None,
                breed_specific,
                breeds: breeds.map(str::to_string),
            })
            .await
            .unwrap();
        }

        let breed = db.breed_plans("POODLE").await.unwrap();
        let names: Vec<_> = breed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Poodle Básico", "Poodle Premium"]);

        let general = db.general_plans(3).await.unwrap();
        let names: Vec<_> = general.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Geral Bronze", "Geral Prata", "Geral Ouro"]);

        assert!(db.breed_plans("Labrador").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_exists_respects_source_and_window() {
        let db = test_db().await;
        seed_owner(&db, 5, 10, Some("11987654321")).await;
        db.insert_log(&log(5, 42, at(2024, 3, 10, 9, 15))).await.unwrap();

        let day_start = at(2024, 3, 10, 0, 0);
        let day_end = at(2024, 3, 11, 0, 0);
        let v = ReactivationCategory::Vaccine;
        assert!(db.log_exists(5, v, 42, day_start, day_end).await.unwrap());
        assert!(!db.log_exists(5, v, 43, day_start, day_end).await.unwrap());
        assert!(!db.log_exists(6, v, 42, day_start, day_end).await.unwrap());
        assert!(
            !db.log_exists(5, ReactivationCategory::Appointment, 42, day_start, day_end)
                .await
                .unwrap()
        );
        assert!(
            !db.log_exists(5, v, 42, day_end, at(2024, 3, 12, 0, 0))
                .await
                .unwrap()
        );

        let rows = db.logs_for_source(v, 42).await.unwrap();
        assert_eq!(rows.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&rows[0].payload).unwrap();
        assert_eq!(payload["vaccineId"], 42);
    }

    #[tokio::test]
    async fn reporting_queries() {
        let db = test_db().await;
        seed_owner(&db, 5, 10, Some("11987654321")).await;
        seed_owner(&db, 6, 20, Some("11912345678")).await;
        db.insert_log(&log(5, 1, at(2024, 3, 10, 9, 0))).await.unwrap();
        db.insert_log(&log(5, 2, at(2024, 3, 10, 9, 5))).await.unwrap();
        let mut failed = log(6, 3, at(2024, 3, 9, 9, 0));
        failed.status = LogStatus::Error;
        failed.error_message = Some("send failed".into());
        db.insert_log(&failed).await.unwrap();

        let stats = db.dashboard_stats(at(2024, 3, 10, 12, 0)).await.unwrap();
        assert_eq!(stats.customers, 2);
        assert_eq!(stats.messages_today, 2);
        assert_eq!(stats.messages_week, 3);
        assert_eq!(stats.success_today, 2);
        assert_eq!(stats.success_rate(), 100.0);
        assert_eq!(stats.messages_by_category[0].category, "vaccine");

        let recent = db.recent_messages(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sent_at, at(2024, 3, 10, 9, 5));
        assert_eq!(recent[0].pet_name.as_deref(), Some("Rex"));

        let by_day = db.stats_by_day(day(2024, 3, 3)).await.unwrap();
        assert_eq!(by_day.len(), 2);
        assert_eq!(by_day[0].date, day(2024, 3, 10));
        assert_eq!(by_day[0].count, 2);
        assert_eq!(by_day[1].success, 0);

        let top = db.top_customers(10).await.unwrap();
        assert_eq!(top[0].customer_id, 5);
        assert_eq!(top[0].total_messages, 2);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vet.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_customer(&Customer::new(1, "Maria", None))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.customer_exists(1).await.unwrap());
    }
}
