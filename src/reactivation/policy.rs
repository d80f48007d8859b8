//! Eligibility rules: pure functions over calendar dates.
//!
//! Every rule takes "today" explicitly and compares whole calendar days, so
//! the outcome does not depend on the hour the job happens to run. All
//! rules are exact-day matches; the jobs must run daily.

use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::VaccineConfig;
use crate::store::model::PlanType;

/// Signed calendar-day difference `to - from` (positive when `to` is later).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Which vaccine message variant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaccineReactivationKind {
    NextDose,
    Alternative,
    Annual,
}

impl VaccineReactivationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextDose => "next_dose",
            Self::Alternative => "alternative",
            Self::Annual => "annual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaccineDecision {
    pub should_reactivate: bool,
    /// Lead time in days the matching rule fires at; 0 when ineligible.
    pub days_to_reactivate: i64,
    pub kind: Option<VaccineReactivationKind>,
}

impl VaccineDecision {
    const NONE: Self = Self {
        should_reactivate: false,
        days_to_reactivate: 0,
        kind: None,
    };

    fn fire(days: i64, kind: VaccineReactivationKind) -> Self {
        Self {
            should_reactivate: true,
            days_to_reactivate: days,
            kind: Some(kind),
        }
    }
}

/// Vaccine reminder thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaccinePolicy {
    pub days_before_next_dose: i64,
    pub alternative_days: i64,
    pub annual_days: i64,
}

impl Default for VaccinePolicy {
    fn default() -> Self {
        Self::from(&VaccineConfig::default())
    }
}

impl From<&VaccineConfig> for VaccinePolicy {
    fn from(config: &VaccineConfig) -> Self {
        Self {
            days_before_next_dose: config.days_before_next_dose,
            alternative_days: config.alternative_days,
            annual_days: config.annual_days,
        }
    }
}

impl VaccinePolicy {
    /// Decide whether a vaccine record is due for a reminder today.
    ///
    /// The alternative rule requires the day count to sit in `[14, 21]` and
    /// equal `alternative_days` at once; with the default of 7 it never fires.
    pub fn evaluate(
        &self,
        today: NaiveDate,
        next_dose: Option<NaiveDate>,
        application: NaiveDate,
        is_annual: bool,
    ) -> VaccineDecision {
        if let Some(next_dose) = next_dose {
            let days_until = days_between(today, next_dose);
            if days_until == self.days_before_next_dose {
                return VaccineDecision::fire(
                    self.days_before_next_dose,
                    VaccineReactivationKind::NextDose,
                );
            }
            if (14..=21).contains(&days_until) && days_until == self.alternative_days {
                return VaccineDecision::fire(
                    self.alternative_days,
                    VaccineReactivationKind::Alternative,
                );
            }
        } else if is_annual {
            let Some(booster) = annual_booster_date(application) else {
                return VaccineDecision::NONE;
            };
            if days_between(today, booster) == self.annual_days {
                return VaccineDecision::fire(self.annual_days, VaccineReactivationKind::Annual);
            }
        }
        VaccineDecision::NONE
    }
}

/// Same calendar day one year later (Feb 29 clamps to Feb 28).
pub fn annual_booster_date(application: NaiveDate) -> Option<NaiveDate> {
    application.checked_add_months(Months::new(12))
}

/// Grooming reminder: weekly for monthly-plan customers, once at
/// `reminder_days` otherwise.
pub fn should_send_grooming_reminder(
    today: NaiveDate,
    last_service: NaiveDate,
    has_plan: bool,
    plan_type: Option<PlanType>,
    reminder_days: i64,
) -> bool {
    let days_since = days_between(last_service, today);
    if has_plan && plan_type == Some(PlanType::Monthly) {
        days_since > 0 && days_since % 7 == 0
    } else {
        days_since == reminder_days
    }
}

/// Confirmation goes out exactly `days_before` calendar days ahead.
pub fn should_send_appointment_confirmation(
    today: NaiveDate,
    appointment_at: NaiveDateTime,
    days_before: i64,
) -> bool {
    days_between(today, appointment_at.date()) == days_before
}

/// A debt is charged the day after service, then at most every
/// `interval_days` calendar days.
pub fn can_send_financial_charge(
    today: NaiveDate,
    service_date: NaiveDate,
    last_charge: Option<NaiveDateTime>,
    interval_days: i64,
) -> bool {
    match last_charge {
        None => today > service_date,
        Some(charged_at) => days_between(charged_at.date(), today) >= interval_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn offset(base: NaiveDate, days: i64) -> NaiveDate {
        base + chrono::TimeDelta::days(days)
    }

    #[test]
    fn next_dose_fires_exactly_21_days_ahead() {
        let policy = VaccinePolicy::default();
        let today = day(2024, 3, 10);
        let application = day(2024, 2, 1);

        let hit = policy.evaluate(today, Some(offset(today, 21)), application, false);
        assert!(hit.should_reactivate);
        assert_eq!(hit.days_to_reactivate, 21);
        assert_eq!(hit.kind, Some(VaccineReactivationKind::NextDose));

        for days in [20, 22, 7, 14, 0, -1] {
            let miss = policy.evaluate(today, Some(offset(today, days)), application, true);
            assert_eq!(miss, VaccineDecision::NONE, "{days} days out");
        }
    }

    #[test]
    fn alternative_rule_needs_threshold_inside_window() {
        let today = day(2024, 3, 10);
        let application = day(2024, 2, 1);

        // Default threshold of 7 can never satisfy the 14..=21 guard.
        let policy = VaccinePolicy::default();
        for days in 0..=30 {
            let decision = policy.evaluate(today, Some(offset(today, days)), application, false);
            assert_ne!(decision.kind, Some(VaccineReactivationKind::Alternative));
        }

        let policy = VaccinePolicy {
            alternative_days: 14,
            ..VaccinePolicy::default()
        };
        let decision = policy.evaluate(today, Some(offset(today, 14)), application, false);
        assert_eq!(decision.kind, Some(VaccineReactivationKind::Alternative));
        assert_eq!(decision.days_to_reactivate, 14);
    }

    #[test]
    fn annual_fires_30_days_before_anniversary() {
        let policy = VaccinePolicy::default();
        let today = day(2025, 3, 10);
        let application = offset(today, -335);
        assert_eq!(annual_booster_date(application), Some(offset(today, 30)));

        let hit = policy.evaluate(today, None, application, true);
        assert!(hit.should_reactivate);
        assert_eq!(hit.kind, Some(VaccineReactivationKind::Annual));
        assert_eq!(hit.days_to_reactivate, 30);

        assert!(!policy.evaluate(today, None, application, false).should_reactivate);
        assert!(
            !policy
                .evaluate(today, None, offset(today, -334), true)
                .should_reactivate
        );
    }

    #[test]
    fn annual_is_ignored_when_next_dose_present() {
        let policy = VaccinePolicy::default();
        let today = day(2024, 3, 10);
        let decision = policy.evaluate(today, Some(offset(today, 60)), offset(today, -335), true);
        assert!(!decision.should_reactivate);
    }

    #[test]
    fn leap_day_application_clamps() {
        assert_eq!(annual_booster_date(day(2024, 2, 29)), Some(day(2025, 2, 28)));
    }

    #[test]
    fn monthly_plan_grooming_is_weekly() {
        let today = day(2024, 3, 30);
        let monthly = Some(PlanType::Monthly);
        assert!(should_send_grooming_reminder(today, offset(today, -14), true, monthly, 30));
        assert!(should_send_grooming_reminder(today, offset(today, -7), true, monthly, 30));
        assert!(!should_send_grooming_reminder(today, offset(today, -15), true, monthly, 30));
        assert!(!should_send_grooming_reminder(today, today, true, monthly, 30));
    }

    #[test]
    fn non_plan_grooming_is_one_shot_at_30_days() {
        let today = day(2024, 3, 30);
        assert!(should_send_grooming_reminder(today, offset(today, -30), false, None, 30));
        assert!(!should_send_grooming_reminder(today, offset(today, -29), false, None, 30));
        assert!(!should_send_grooming_reminder(today, offset(today, -31), false, None, 30));
        // An annual plan follows the one-shot rule.
        let annual = Some(PlanType::Annual);
        assert!(should_send_grooming_reminder(today, offset(today, -30), true, annual, 30));
        assert!(!should_send_grooming_reminder(today, offset(today, -14), true, annual, 30));
    }

    #[test]
    fn appointment_confirmation_is_day_before() {
        let today = day(2024, 3, 10);
        let tomorrow_late = day(2024, 3, 11).and_hms_opt(23, 30, 0).unwrap();
        let tomorrow_early = day(2024, 3, 11).and_hms_opt(0, 0, 0).unwrap();
        let today_later = day(2024, 3, 10).and_hms_opt(18, 0, 0).unwrap();
        assert!(should_send_appointment_confirmation(today, tomorrow_late, 1));
        assert!(should_send_appointment_confirmation(today, tomorrow_early, 1));
        assert!(!should_send_appointment_confirmation(today, today_later, 1));
    }

    #[test]
    fn financial_charge_cadence() {
        let service = day(2024, 1, 1);
        assert!(!can_send_financial_charge(service, service, None, 30));
        assert!(can_send_financial_charge(day(2024, 1, 2), service, None, 30));
        assert!(can_send_financial_charge(day(2024, 6, 1), service, None, 30));

        let charged_at = day(2024, 1, 2).and_hms_opt(10, 15, 0).unwrap();
        assert!(!can_send_financial_charge(day(2024, 1, 3), service, Some(charged_at), 30));
        assert!(!can_send_financial_charge(day(2024, 1, 31), service, Some(charged_at), 30));
        assert!(can_send_financial_charge(day(2024, 2, 1), service, Some(charged_at), 30));
    }
}
