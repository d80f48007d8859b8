//! Vaccine reminders: next dose, urgent alternative and annual booster.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::DatabaseError;
use crate::reactivation::br_date;
use crate::reactivation::policy::{
    VaccineDecision, VaccinePolicy, VaccineReactivationKind, annual_booster_date,
};
use crate::reactivation::runner::{Eligibility, ReactivationStrategy, Target};
use crate::store::ReactivationStore;
use crate::store::model::{ReactivationCategory, VaccineCandidate};

pub struct VaccineReactivation {
    policy: VaccinePolicy,
}

impl VaccineReactivation {
    pub fn new(policy: VaccinePolicy) -> Self {
        Self { policy }
    }

    fn decide(&self, candidate: &VaccineCandidate, now: NaiveDateTime) -> VaccineDecision {
        let vaccine = &candidate.vaccine;
        self.policy.evaluate(
            now.date(),
            vaccine.next_dose_date,
            vaccine.application_date,
            vaccine.is_annual,
        )
    }

    /// Message text for an eligible vaccine.
    pub fn message(
        &self,
        candidate: &VaccineCandidate,
        decision: &VaccineDecision,
        clinic_name: &str,
    ) -> String {
        let vaccine = &candidate.vaccine;
        let days = decision.days_to_reactivate;
        let mut msg = format!(
            "Olá! 🐾\n\nTudo bem? Aqui é da *{clinic_name}*!\n\n\
             Estamos entrando em contato para lembrar sobre a vacinação do(a) *{}*.\n\n",
            candidate.pet_name
        );

        let next_dose = vaccine.next_dose_date.map(br_date).unwrap_or_default();
        match decision.kind {
            Some(VaccineReactivationKind::NextDose) => {
                msg.push_str(&format!(
                    "📅 A próxima dose da vacina *{}* está agendada para *{next_dose}* (em {days} dias).\n\n\
                     É muito importante manter a carteirinha de vacinação em dia para garantir a saúde e proteção do seu pet! 💉\n\n",
                    vaccine.vaccine_name
                ));
            }
            Some(VaccineReactivationKind::Alternative) => {
                msg.push_str(&format!(
                    "⚠️ *ATENÇÃO:* A próxima dose da vacina *{}* está próxima: *{next_dose}* (em apenas {days} dias).\n\n\
                     Não perca o prazo! É essencial manter a imunização em dia. 💉\n\n",
                    vaccine.vaccine_name
                ));
            }
            Some(VaccineReactivationKind::Annual) => {
                let booster = annual_booster_date(vaccine.application_date)
                    .map(br_date)
                    .unwrap_or_default();
                msg.push_str(&format!(
                    "📅 Está chegando a hora do reforço anual da vacina *{}*!\n\n\
                     A última dose foi em {} e o próximo reforço deve ser feito por volta de *{booster}* (em {days} dias).\n\n\
                     Vacinas anuais como essa são fundamentais para manter a saúde do seu pet em dia! 🐶🐱\n\n",
                    vaccine.vaccine_name,
                    br_date(vaccine.application_date)
                ));
            }
            None => {}
        }

        msg.push_str(
            "Gostaria de agendar? Estamos à disposição para marcar um horário! 📞\n\n\
             Responda esta mensagem ou ligue para nós! 😊",
        );
        msg
    }
}

#[async_trait]
impl ReactivationStrategy for VaccineReactivation {
    type Candidate = VaccineCandidate;

    fn category(&self) -> ReactivationCategory {
        ReactivationCategory::Vaccine
    }

    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        _now: NaiveDateTime,
    ) -> Result<Vec<VaccineCandidate>, DatabaseError> {
        store.vaccine_candidates().await
    }

    fn target<'a>(&self, c: &'a VaccineCandidate) -> Target<'a> {
        Target {
            customer_id: c.contact.customer_id,
            pet_id: Some(c.vaccine.pet_id),
            source_id: c.vaccine.id,
            phone: &c.contact.phone,
        }
    }

    async fn check(
        &self,
        _store: &dyn ReactivationStore,
        candidate: &VaccineCandidate,
        now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError> {
        Ok(if self.decide(candidate, now).should_reactivate {
            Eligibility::Eligible
        } else {
            Eligibility::Skip("vaccine not due today")
        })
    }

    async fn compose(
        &self,
        _store: &dyn ReactivationStore,
        candidate: &VaccineCandidate,
        now: NaiveDateTime,
        clinic_name: &str,
    ) -> Result<String, DatabaseError> {
        let decision = self.decide(candidate, now);
        Ok(self.message(candidate, &decision, clinic_name))
    }
}
