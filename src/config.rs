//! Configuration types.
//!
//! Everything is read once at startup from environment variables. Each
//! sub-config has a `Default` matching the production defaults so tests can
//! build one without touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub vetcare: VetCareConfig,
    pub messaging: MessagingConfig,
    pub vaccines: VaccineConfig,
    pub financial: FinancialConfig,
    pub grooming: GroomingConfig,
    pub appointments: AppointmentConfig,
    pub satisfaction: SatisfactionConfig,
    pub schedules: ScheduleConfig,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let server = ServerConfig {
            port: env.parse("PORT", 2080)?,
            database_path: PathBuf::from(
                env.string("DATABASE_PATH", "./data/vet-reactivation.db"),
            ),
            log_dir: PathBuf::from(env.string("LOG_DIR", "./logs")),
        };

        let whatsapp = WhatsAppConfig {
            api_url: env.string("WHATSAPP_API_URL", "https://api.talkhub.me"),
            api_token: SecretString::from(env.string("WHATSAPP_API_TOKEN", "")),
            instance_id: env.string("WHATSAPP_INSTANCE_ID", ""),
            timeout: Duration::from_secs(env.parse("WHATSAPP_TIMEOUT_SECS", 30)?),
        };

        let vetcare = VetCareConfig {
            api_url: env.string("VETCARE_API_URL", "https://vet.talkhub.me/api"),
            ..VetCareConfig::default()
        };

        let messaging = MessagingConfig {
            start_hour: env.parse("MESSAGING_START_HOUR", 8)?,
            end_hour: env.parse("MESSAGING_END_HOUR", 19)?,
            vaccine_delay: Duration::from_secs(env.parse("MESSAGING_VACCINE_DELAY_SECS", 120)?),
            default_delay: Duration::from_secs(env.parse("MESSAGING_DEFAULT_DELAY_SECS", 2)?),
            country_code: env.string("PHONE_COUNTRY_CODE", "55"),
            clinic_name: env.string("CLINIC_NAME", "Clínica Veterinária"),
        };
        if messaging.start_hour >= messaging.end_hour || messaging.end_hour > 24 {
            return Err(ConfigError::InvalidValue {
                key: "MESSAGING_START_HOUR/MESSAGING_END_HOUR".into(),
                message: format!(
                    "window {}..{} is empty or exceeds 24h",
                    messaging.start_hour, messaging.end_hour
                ),
            });
        }

        let vaccines = VaccineConfig {
            days_before_next_dose: env.parse("VACCINE_REACTIVATION_DAYS_BEFORE", 21)?,
            alternative_days: env.parse("VACCINE_REACTIVATION_ALTERNATIVE_DAYS", 7)?,
            annual_days: env.parse("VACCINE_ANNUAL_REACTIVATION_DAYS", 30)?,
        };

        let financial = FinancialConfig {
            min_amount_for_charge: env.parse("FINANCIAL_MIN_AMOUNT_FOR_CHARGE", dec!(300))?,
            charge_interval_days: env.parse("FINANCIAL_CHARGE_INTERVAL_DAYS", 30)?,
        };

        let grooming = GroomingConfig {
            monthly_reminder_days: env.parse("GROOMING_MONTHLY_REMINDER_DAYS", 30)?,
            plan_dedup_days: env.parse("GROOMING_PLAN_DEDUP_DAYS", 7)?,
            no_plan_dedup_days: env.parse("GROOMING_NO_PLAN_DEDUP_DAYS", 30)?,
        };

        let appointments = AppointmentConfig {
            confirmation_days_before: env.parse("APPOINTMENT_CONFIRMATION_DAYS_BEFORE", 1)?,
        };

        let defaults = SatisfactionConfig::default();
        let satisfaction = SatisfactionConfig {
            banho_sem_taxidog: env.string("FORM_BANHO_SEM_TAXIDOG", &defaults.banho_sem_taxidog),
            banho_com_taxidog: env.string("FORM_BANHO_COM_TAXIDOG", &defaults.banho_com_taxidog),
            banho_tosa_com_taxidog: env
                .string("FORM_BANHO_TOSA_COM_TAXIDOG", &defaults.banho_tosa_com_taxidog),
            banho_tosa_sem_taxidog: env
                .string("FORM_BANHO_TOSA_SEM_TAXIDOG", &defaults.banho_tosa_sem_taxidog),
            google_review_url: env
                .lookup("GOOGLE_REVIEW_URL")
                .filter(|url| !url.trim().is_empty()),
        };

        let schedules = ScheduleConfig {
            vetcare_sync: env.string("CRON_VETCARE_SYNC", "0 */6 * * *"),
            vaccines: env.string("CRON_VACCINES", "0 9 * * *"),
            financial: env.string("CRON_FINANCIAL", "0 10 * * *"),
            grooming: env.string("CRON_GROOMING", "0 11 * * *"),
            appointments: env.string("CRON_APPOINTMENTS", "0 8 * * *"),
            satisfaction: env.string("CRON_SATISFACTION", "0 * * * *"),
        };

        Ok(Self {
            server,
            whatsapp,
            vetcare,
            messaging,
            vaccines,
            financial,
            grooming,
            appointments,
            satisfaction,
            schedules,
        })
    }
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
            None => Ok(default),
        }
    }
}

/// HTTP server and local storage.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
}

/// Evolution API credentials.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub api_token: SecretString,
    pub instance_id: String,
    pub timeout: Duration,
}

/// VetCare master-data API.
#[derive(Debug, Clone)]
pub struct VetCareConfig {
    pub api_url: String,
    pub timeout: Duration,
    /// Hard stop for paged endpoints.
    pub max_pages: u32,
    pub page_delay: Duration,
    pub per_pet_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for VetCareConfig {
    fn default() -> Self {
        Self {
            api_url: "https://vet.talkhub.me/api".to_string(),
            timeout: Duration::from_secs(30),
            max_pages: 500,
            page_delay: Duration::from_millis(200),
            per_pet_delay: Duration::from_millis(100),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Messaging guard settings shared by every engine.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// First allowed local hour (inclusive).
    pub start_hour: u32,
    /// Last allowed local hour (exclusive).
    pub end_hour: u32,
    pub vaccine_delay: Duration,
    pub default_delay: Duration,
    pub country_code: String,
    /// Signature used in every message template.
    pub clinic_name: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 19,
            vaccine_delay: Duration::from_secs(120),
            default_delay: Duration::from_secs(2),
            country_code: "55".to_string(),
            clinic_name: "Clínica Veterinária".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaccineConfig {
    pub days_before_next_dose: i64,
    pub alternative_days: i64,
    pub annual_days: i64,
}

impl Default for VaccineConfig {
    fn default() -> Self {
        Self {
            days_before_next_dose: 21,
            alternative_days: 7,
            annual_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinancialConfig {
    /// Debts at or above this amount get the formal notice.
    pub min_amount_for_charge: Decimal,
    pub charge_interval_days: i64,
}

impl Default for FinancialConfig {
    fn default() -> Self {
        Self {
            min_amount_for_charge: dec!(300),
            charge_interval_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroomingConfig {
    pub monthly_reminder_days: i64,
    pub plan_dedup_days: i64,
    pub no_plan_dedup_days: i64,
}

impl Default for GroomingConfig {
    fn default() -> Self {
        Self {
            monthly_reminder_days: 30,
            plan_dedup_days: 7,
            no_plan_dedup_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppointmentConfig {
    pub confirmation_days_before: i64,
}

impl Default for AppointmentConfig {
    fn default() -> Self {
        Self {
            confirmation_days_before: 1,
        }
    }
}

/// Satisfaction form links.
#[derive(Debug, Clone)]
pub struct SatisfactionConfig {
    pub banho_sem_taxidog: String,
    pub banho_com_taxidog: String,
    pub banho_tosa_com_taxidog: String,
    pub banho_tosa_sem_taxidog: String,
    /// When set, the survey message mentions the Google review redirect.
    pub google_review_url: Option<String>,
}

impl Default for SatisfactionConfig {
    fn default() -> Self {
        Self {
            banho_sem_taxidog: "https://form.talkhub.me/s/jlhjnwu8g1wumfddpdc0nilp".to_string(),
            banho_com_taxidog: "https://form.talkhub.me/s/sh6ead0tdtot8avbivitrygw".to_string(),
            banho_tosa_com_taxidog: "https://form.talkhub.me/s/lt4e0a8q7pkrdn0u9dhuy2jv"
                .to_string(),
            banho_tosa_sem_taxidog: "https://form.talkhub.me/s/cmgidazc6001hr740cj2c912l"
                .to_string(),
            google_review_url: None,
        }
    }
}

/// Cron expressions per job. Five-field expressions are accepted.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub vetcare_sync: String,
    pub vaccines: String,
    pub financial: String,
    pub grooming: String,
    pub appointments: String,
    pub satisfaction: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            vetcare_sync: "0 */6 * * *".to_string(),
            vaccines: "0 9 * * *".to_string(),
            financial: "0 10 * * *".to_string(),
            grooming: "0 11 * * *".to_string(),
            appointments: "0 8 * * *".to_string(),
            satisfaction: "0 * * * *".to_string(),
        }
    }
}
