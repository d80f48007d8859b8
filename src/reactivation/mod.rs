//! Reactivation engines: eligibility rules, messaging guard, the generic
//! batch runner and the five per-domain strategies.

pub mod appointment;
pub mod financial;
pub mod grooming;
pub mod guard;
pub mod policy;
pub mod runner;
pub mod satisfaction;
pub mod vaccine;

pub use appointment::AppointmentReactivation;
pub use financial::FinancialReactivation;
pub use grooming::GroomingReactivation;
pub use runner::{BatchJob, BatchReport, BatchRunner, EngineContext, ReactivationStrategy};
pub use satisfaction::SatisfactionSurvey;
pub use vaccine::VaccineReactivation;

/// Render a date the way customers read it (`dd/mm/yyyy`).
pub(crate) fn br_date(date: chrono::NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Render an amount with two decimals and a comma separator (`1234,50`).
pub(crate) fn br_amount(amount: rust_decimal::Decimal) -> String {
    format!("{:.2}", amount.round_dp(2)).replace('.', ",")
}
