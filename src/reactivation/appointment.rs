//! Next-day appointment confirmations.

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};

use crate::config::AppointmentConfig;
use crate::error::DatabaseError;
use crate::reactivation::br_date;
use crate::reactivation::policy::should_send_appointment_confirmation;
use crate::reactivation::runner::{Eligibility, ReactivationStrategy, Target};
use crate::store::ReactivationStore;
use crate::store::model::{AppointmentCandidate, AppointmentType, ReactivationCategory};

pub struct AppointmentReactivation {
    days_before: i64,
}

impl AppointmentReactivation {
    pub fn new(config: &AppointmentConfig) -> Self {
        Self {
            days_before: config.confirmation_days_before,
        }
    }

    pub fn message(candidate: &AppointmentCandidate, clinic_name: &str) -> String {
        let appointment = &candidate.appointment;
        let label = appointment.kind.label();
        format!(
            "Olá! 🐾\n\n\
             Aqui é da *{clinic_name}*!\n\n\
             Estamos entrando em contato para *confirmar* a {} do(a) *{}*:\n\n\
             📅 *Data:* {}\n\
             ⏰ *Horário:* {}\n\
             🏥 *Tipo:* {label}\n\n\
             Por favor, confirme a presença respondendo:\n\
             ✅ *SIM* - para confirmar\n\
             ❌ *NÃO* - caso precise remarcar\n\n\
             Se precisar de mais informações ou quiser remarcar, estamos à disposição! 😊\n\n\
             Aguardamos sua confirmação! 📞",
            label.to_lowercase(),
            candidate.pet_name,
            br_date(appointment.scheduled_at.date()),
            appointment.scheduled_at.format("%H:%M"),
        )
    }
}

#[async_trait]
impl ReactivationStrategy for AppointmentReactivation {
    type Candidate = AppointmentCandidate;

    fn category(&self) -> ReactivationCategory {
        ReactivationCategory::Appointment
    }

    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        now: NaiveDateTime,
    ) -> Result<Vec<AppointmentCandidate>, DatabaseError> {
        store
            .appointments_on(now.date() + TimeDelta::days(self.days_before))
            .await
    }

    fn target<'a>(&self, c: &'a AppointmentCandidate) -> Target<'a> {
        Target {
            customer_id: c.contact.customer_id,
            pet_id: Some(c.appointment.pet_id),
            source_id: c.appointment.id,
            phone: &c.contact.phone,
        }
    }

    async fn check(
        &self,
        store: &dyn ReactivationStore,
        c: &AppointmentCandidate,
        now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError> {
        let appointment = &c.appointment;
        if !should_send_appointment_confirmation(
            now.date(),
            appointment.scheduled_at,
            self.days_before,
        ) {
            return Ok(Eligibility::Skip("not the confirmation day"));
        }
        if appointment.kind == AppointmentType::Return {
            return Ok(Eligibility::Skip("return visit"));
        }
        if store
            .has_other_future_appointment(c.contact.customer_id, appointment.id, now)
            .await?
        {
            return Ok(Eligibility::Skip("customer has another upcoming appointment"));
        }
        Ok(Eligibility::Eligible)
    }

    async fn compose(
        &self,
        _store: &dyn ReactivationStore,
        c: &AppointmentCandidate,
        _now: NaiveDateTime,
        clinic_name: &str,
    ) -> Result<String, DatabaseError> {
        Ok(Self::message(c, clinic_name))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reactivation::runner::{BatchJob, BatchRunner};
    use crate::reactivation::testing::{at, harness, seed_owner};
    use crate::store::model::{Appointment, AppointmentStatus, LogStatus};

    fn appointment(
        id: i64,
        pet_id: i64,
        when: NaiveDateTime,
        kind: AppointmentType,
        status: AppointmentStatus,
    ) -> Appointment {
        Appointment {
            id,
            pet_id,
            scheduled_at: when,
            kind,
            status,
            notes: None,
            amount: None,
        }
    }

    fn engine() -> AppointmentReactivation {
        AppointmentReactivation::new(&AppointmentConfig::default())
    }

    #[tokio::test]
    async fn confirms_tomorrows_appointments_except_returns_and_repeat_visitors() {
        let now = at(2024, 3, 10, 10, 0);
        let h = harness(now).await;
        seed_owner(&h.store, 1, 10, "Maria", "Rex", "11987654321").await;
        seed_owner(&h.store, 2, 20, "João", "Mia", "11912345678").await;
        seed_owner(&h.store, 3, 30, "Ana", "Bolt", "11955554444").await;

        let scheduled = AppointmentStatus::Scheduled;
        for a in [
            appointment(1, 10, at(2024, 3, 11, 14, 30), AppointmentType::Surgery, scheduled),
            // Returns never get a confirmation.
            appointment(2, 30, at(2024, 3, 11, 9, 0), AppointmentType::Return, scheduled),
            // João already has a consult next week.
            appointment(3, 20, at(2024, 3, 11, 16, 0), AppointmentType::Exam, scheduled),
            appointment(4, 20, at(2024, 3, 18, 10, 0), AppointmentType::Consult, AppointmentStatus::Confirmed),
            // Day after tomorrow is not fetched.
            appointment(5, 10, at(2024, 3, 12, 8, 0), AppointmentType::Consult, scheduled),
        ] {
            h.store.upsert_appointment(&a).await.unwrap();
        }

        let runner = BatchRunner::new(h.ctx.clone(), engine(), Duration::from_secs(2));
        let report = runner.run().await;
        assert_eq!(report.candidates, 3);
        assert_eq!(report.success, 1);
        assert_eq!(report.skipped, 2);

        let sent = h.gateway.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5511987654321");
        let text = &sent[0].1;
        assert!(text.contains("*confirmar* a cirurgia do(a) *Rex*"));
        assert!(text.contains("📅 *Data:* 11/03/2024\n⏰ *Horário:* 14:30\n🏥 *Tipo:* Cirurgia"));

        let logs = h
            .store
            .logs_for_source(ReactivationCategory::Appointment, 1)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Success);
        let payload: serde_json::Value = serde_json::from_str(&logs[0].payload).unwrap();
        assert_eq!(payload["appointmentId"], 1);
    }

    #[tokio::test]
    async fn cancelled_future_appointment_does_not_block() {
        let now = at(2024, 3, 10, 10, 0);
        let h = harness(now).await;
        seed_owner(&h.store, 2, 20, "João", "Mia", "11912345678").await;
        for a in [
            appointment(3, 20, at(2024, 3, 11, 16, 0), AppointmentType::Consult, AppointmentStatus::Scheduled),
            appointment(4, 20, at(2024, 3, 18, 10, 0), AppointmentType::Consult, AppointmentStatus::Cancelled),
            appointment(6, 20, at(2024, 3, 19, 10, 0), AppointmentType::Surgery, AppointmentStatus::Scheduled),
        ] {
            h.store.upsert_appointment(&a).await.unwrap();
        }

        let runner = BatchRunner::new(h.ctx.clone(), engine(), Duration::from_secs(2));
        let report = runner.run().await;
        assert_eq!(report.success, 1);
        assert!(h.gateway.messages()[0].1.contains("a consulta do(a) *Mia*"));
    }
}
