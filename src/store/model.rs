//! Domain records persisted by the store.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Storage format for clinic-local timestamps.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Master data ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cpf: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl Customer {
    pub fn new(id: i64, name: impl Into<String>, phone: Option<&str>) -> Self {
        Self {
            id,
            name: name.into(),
            phone: phone.map(str::to_string),
            email: None,
            cpf: None,
            address: None,
            city: None,
            state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pet {
    pub id: i64,
    pub customer_id: i64,
    pub name: String,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub weight: Option<f64>,
    pub color: Option<String>,
    pub notes: Option<String>,
}

impl Pet {
    pub fn new(id: i64, customer_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            customer_id,
            name: name.into(),
            species: None,
            breed: None,
            gender: None,
            birth_date: None,
            weight: None,
            color: None,
            notes: None,
        }
    }

    pub fn with_breed(mut self, breed: &str) -> Self {
        self.breed = Some(breed.to_string());
        self
    }
}

// ── Vaccines ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaccineRecord {
    pub id: i64,
    pub pet_id: i64,
    pub vaccine_name: String,
    pub application_date: NaiveDate,
    pub next_dose_date: Option<NaiveDate>,
    /// Yearly booster with no explicit next dose.
    pub is_annual: bool,
}

/// Vaccine upsert keyed by (pet, name, application date).
#[derive(Debug, Clone)]
pub struct NewVaccine {
    pub pet_id: i64,
    pub vaccine_name: String,
    pub application_date: NaiveDate,
    pub next_dose_date: Option<NaiveDate>,
    pub is_annual: bool,
    pub batch_number: Option<String>,
    pub veterinarian: Option<String>,
    pub notes: Option<String>,
}

// ── Financial ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialDebt {
    pub id: i64,
    pub customer_id: i64,
    pub service_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub paid: bool,
    pub last_charge_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewDebt {
    pub customer_id: i64,
    pub service_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

// ── Grooming ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroomingServiceType {
    Banho,
    Tosa,
    BanhoTosa,
}

impl GroomingServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banho => "banho",
            Self::Tosa => "tosa",
            Self::BanhoTosa => "banho_tosa",
        }
    }

    /// Classify the free-text service list of a grooming sheet.
    pub fn from_services_text(text: &str) -> Self {
        let text = text.to_lowercase();
        match (text.contains("banho"), text.contains("tosa")) {
            (true, true) => Self::BanhoTosa,
            (false, true) => Self::Tosa,
            _ => Self::Banho,
        }
    }
}

impl std::str::FromStr for GroomingServiceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "banho" => Ok(Self::Banho),
            "tosa" => Ok(Self::Tosa),
            "banho_tosa" => Ok(Self::BanhoTosa),
            _ => Err(format!("Unknown grooming service type: {s}")),
        }
    }
}

/// Subscription plan cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    #[serde(rename = "mensal")]
    Monthly,
    #[serde(rename = "anual")]
    Annual,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "mensal",
            Self::Annual => "anual",
        }
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mensal" => Ok(Self::Monthly),
            "anual" => Ok(Self::Annual),
            _ => Err(format!("Unknown plan type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroomingService {
    pub id: i64,
    pub pet_id: i64,
    pub service_date: NaiveDate,
    pub service_type: GroomingServiceType,
    pub has_plan: bool,
    pub plan_type: Option<PlanType>,
}

/// Grooming record upsert keyed by (pet, service date). The plan fields are
/// only written on insert; an update keeps whatever plan is on file.
#[derive(Debug, Clone)]
pub struct NewGroomingService {
    pub pet_id: i64,
    pub service_date: NaiveDate,
    pub service_type: GroomingServiceType,
    pub has_plan: bool,
    pub plan_type: Option<PlanType>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroomingPlan {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Decimal,
    pub services_included: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewGroomingPlan {
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Decimal,
    pub services_included: Option<String>,
    pub breed_specific: bool,
    /// Comma-separated breed names, matched case-insensitively.
    pub breeds: Option<String>,
}

// ── Appointments ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentType {
    #[serde(rename = "consulta")]
    Consult,
    #[serde(rename = "retorno")]
    Return,
    #[serde(rename = "cirurgia")]
    Surgery,
    #[serde(rename = "exame")]
    Exam,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consult => "consulta",
            Self::Return => "retorno",
            Self::Surgery => "cirurgia",
            Self::Exam => "exame",
        }
    }

    /// Label used in customer-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Consult => "Consulta",
            Self::Return => "Retorno",
            Self::Surgery => "Cirurgia",
            Self::Exam => "Exame",
        }
    }

    /// Map a free-text type from the management system. Later keywords win.
    pub fn from_external(tipo: &str) -> Self {
        let tipo = tipo.to_lowercase();
        if tipo.contains("exame") {
            Self::Exam
        } else if tipo.contains("cirurgia") {
            Self::Surgery
        } else if tipo.contains("retorno") {
            Self::Return
        } else {
            Self::Consult
        }
    }
}

impl std::str::FromStr for AppointmentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consulta" => Ok(Self::Consult),
            "retorno" => Ok(Self::Return),
            "cirurgia" => Ok(Self::Surgery),
            "exame" => Ok(Self::Exam),
            _ => Err(format!("Unknown appointment type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "agendado")]
    Scheduled,
    #[serde(rename = "confirmado")]
    Confirmed,
    #[serde(rename = "realizado")]
    Done,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "agendado",
            Self::Confirmed => "confirmado",
            Self::Done => "realizado",
            Self::Cancelled => "cancelado",
        }
    }

    /// Map a free-text status from the management system. Later keywords win.
    pub fn from_external(status: &str) -> Self {
        let status = status.to_lowercase();
        if status.contains("cancelado") {
            Self::Cancelled
        } else if status.contains("concluído") || status.contains("concluido") {
            Self::Done
        } else if status.contains("confirmado") {
            Self::Confirmed
        } else {
            Self::Scheduled
        }
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agendado" => Ok(Self::Scheduled),
            "confirmado" => Ok(Self::Confirmed),
            "realizado" => Ok(Self::Done),
            "cancelado" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown appointment status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appointment {
    pub id: i64,
    pub pet_id: i64,
    pub scheduled_at: NaiveDateTime,
    pub kind: AppointmentType,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub amount: Option<Decimal>,
}

// ── Completed services ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedService {
    pub id: i64,
    pub pet_id: i64,
    pub service_date: NaiveDateTime,
    pub service_type: Option<String>,
    pub has_grooming: bool,
    pub has_tosa: bool,
    pub has_taxidog: bool,
    pub satisfaction_sent: bool,
}

#[derive(Debug, Clone)]
pub struct NewCompletedService {
    pub pet_id: i64,
    pub service_date: NaiveDateTime,
    pub service_type: Option<String>,
    pub has_grooming: bool,
    pub has_tosa: bool,
    pub has_taxidog: bool,
}

// ── Reactivation log ────────────────────────────────────────────────────

/// Reactivation domain, one per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactivationCategory {
    Vaccine,
    Financial,
    Grooming,
    Appointment,
    Satisfaction,
}

impl ReactivationCategory {
    pub const ALL: [Self; 5] = [
        Self::Vaccine,
        Self::Financial,
        Self::Grooming,
        Self::Appointment,
        Self::Satisfaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vaccine => "vaccine",
            Self::Financial => "financial",
            Self::Grooming => "grooming",
            Self::Appointment => "appointment",
            Self::Satisfaction => "satisfaction",
        }
    }

    /// Key of the source id inside the serialized payload.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Vaccine => "vaccineId",
            Self::Financial => "debtId",
            Self::Grooming | Self::Satisfaction => "serviceId",
            Self::Appointment => "appointmentId",
        }
    }
}

impl std::fmt::Display for ReactivationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReactivationCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown reactivation category: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log status: {s}")),
        }
    }
}

/// One send attempt, appended to the reactivation log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub customer_id: i64,
    pub pet_id: Option<i64>,
    pub category: ReactivationCategory,
    pub source_id: i64,
    /// Full message text; empty when the attempt failed before composing.
    pub message: String,
    pub sent_at: NaiveDateTime,
    pub status: LogStatus,
    pub error_message: Option<String>,
}

impl NewLogEntry {
    /// `{"<entity>Id": id, "message": text}`
    pub fn payload_json(&self) -> String {
        let mut map = serde_json::Map::new();
        map.insert(
            self.category.payload_key().to_string(),
            serde_json::Value::from(self.source_id),
        );
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        serde_json::Value::Object(map).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub customer_id: i64,
    pub pet_id: Option<i64>,
    pub category: ReactivationCategory,
    pub source_id: i64,
    pub payload: String,
    pub sent_at: NaiveDateTime,
    pub status: LogStatus,
    pub error_message: Option<String>,
}

// ── Engine candidates ───────────────────────────────────────────────────

/// Owning customer resolved by a candidate query.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub customer_id: i64,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VaccineCandidate {
    pub vaccine: VaccineRecord,
    pub pet_name: String,
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebtCandidate {
    pub debt: FinancialDebt,
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroomingCandidate {
    pub service: GroomingService,
    pub pet_name: String,
    pub pet_breed: Option<String>,
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentCandidate {
    pub appointment: Appointment,
    pub pet_name: String,
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyCandidate {
    pub service: CompletedService,
    pub pet_name: String,
    pub contact: Contact,
}

// ── Reporting ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesCount {
    pub species: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub customers: i64,
    pub pets: i64,
    pub messages_today: i64,
    pub messages_week: i64,
    pub success_today: i64,
    pub errors_today: i64,
    pub messages_by_category: Vec<CategoryCount>,
    pub upcoming_vaccines: i64,
    pub upcoming_appointments: i64,
    pub pets_by_species: Vec<SpeciesCount>,
    pub last_sync: Option<NaiveDateTime>,
}

impl DashboardStats {
    /// Percentage of today's attempts that succeeded, one decimal place.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_today + self.errors_today;
        if total == 0 {
            return 0.0;
        }
        let rate = self.success_today as f64 / total as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentMessage {
    pub id: i64,
    pub category: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub pet_name: Option<String>,
    pub sent_at: NaiveDateTime,
    pub status: LogStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCategoryStats {
    pub date: NaiveDate,
    pub category: String,
    pub count: i64,
    pub success: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCustomer {
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub total_messages: i64,
    pub last_message: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_embeds_source_id_under_category_key() {
        let entry = NewLogEntry {
            customer_id: 5,
            pet_id: Some(9),
            category: ReactivationCategory::Financial,
            source_id: 42,
            message: "Olá".into(),
            sent_at: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            status: LogStatus::Success,
            error_message: None,
        };
        let payload: serde_json::Value = serde_json::from_str(&entry.payload_json()).unwrap();
        assert_eq!(payload["debtId"], 42);
        assert_eq!(payload["message"], "Olá");
    }

    #[test]
    fn external_appointment_mapping() {
        assert_eq!(AppointmentType::from_external("Retorno"), AppointmentType::Return);
        assert_eq!(
            AppointmentType::from_external("Cirurgia eletiva"),
            AppointmentType::Surgery
        );
        assert_eq!(AppointmentType::from_external("Vacinação"), AppointmentType::Consult);
        assert_eq!(
            AppointmentStatus::from_external("Concluído"),
            AppointmentStatus::Done
        );
        assert_eq!(
            AppointmentStatus::from_external("CANCELADO"),
            AppointmentStatus::Cancelled
        );
        assert_eq!(
            AppointmentStatus::from_external("pendente"),
            AppointmentStatus::Scheduled
        );
    }

    #[test]
    fn grooming_type_from_services_text() {
        assert_eq!(
            GroomingServiceType::from_services_text("Banho + Tosa higiênica"),
            GroomingServiceType::BanhoTosa
        );
        assert_eq!(
            GroomingServiceType::from_services_text("tosa na tesoura"),
            GroomingServiceType::Tosa
        );
        assert_eq!(
            GroomingServiceType::from_services_text("hidratação"),
            GroomingServiceType::Banho
        );
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in ReactivationCategory::ALL {
            assert_eq!(category.as_str().parse::<ReactivationCategory>(), Ok(category));
        }
    }

    #[test]
    fn success_rate_rounds_to_one_decimal() {
        let stats = DashboardStats {
            customers: 0,
            pets: 0,
            messages_today: 3,
            messages_week: 3,
            success_today: 2,
            errors_today: 1,
            messages_by_category: vec![],
            upcoming_vaccines: 0,
            upcoming_appointments: 0,
            pets_by_species: vec![],
            last_sync: None,
        };
        assert_eq!(stats.success_rate(), 66.7);
    }
}
