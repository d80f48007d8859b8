//! Grooming reminders: weekly nudges for monthly-plan pets and a one-off
//! upsell with subscription plans for everyone else.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::config::GroomingConfig;
use crate::error::DatabaseError;
use crate::reactivation::guard::DedupWindow;
use crate::reactivation::policy::should_send_grooming_reminder;
use crate::reactivation::runner::{Eligibility, ReactivationStrategy, Target};
use crate::reactivation::{br_amount, br_date};
use crate::store::ReactivationStore;
use crate::store::model::{GroomingCandidate, GroomingPlan, PlanType, ReactivationCategory};

/// General plans offered when no breed-specific plan matches.
const GENERAL_PLAN_LIMIT: usize = 3;

pub struct GroomingReactivation {
    reminder_days: i64,
    plan_dedup_days: i64,
    no_plan_dedup_days: i64,
}

impl GroomingReactivation {
    pub fn new(config: &GroomingConfig) -> Self {
        Self {
            reminder_days: config.monthly_reminder_days,
            plan_dedup_days: config.plan_dedup_days,
            no_plan_dedup_days: config.no_plan_dedup_days,
        }
    }

    fn on_monthly_plan(candidate: &GroomingCandidate) -> bool {
        candidate.service.has_plan && candidate.service.plan_type == Some(PlanType::Monthly)
    }

    /// Breed plans first, falling back to the cheapest general plans.
    async fn offered_plans(
        &self,
        store: &dyn ReactivationStore,
        breed: Option<&str>,
    ) -> Vec<GroomingPlan> {
        if let Some(breed) = breed {
            match store.breed_plans(breed).await {
                Ok(plans) if !plans.is_empty() => return plans,
                Ok(_) => {}
                Err(e) => tracing::warn!(breed, error = %e, "Failed to load breed plans"),
            }
        }
        store
            .general_plans(GENERAL_PLAN_LIMIT)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load general plans");
                Vec::new()
            })
    }

    pub fn plan_message(candidate: &GroomingCandidate, clinic_name: &str) -> String {
        format!(
            "Olá! 🐾\n\n\
             Tudo bem? Aqui é da *{clinic_name}*!\n\n\
             Lembrando que *{}* está com o plano de banho mensal ativo! 🛁✨\n\n\
             Último banho: *{}*\n\n\
             Que tal agendar o próximo banho do seu pet? Estamos com horários disponíveis! 📅\n\n\
             Responda esta mensagem para agendar! 😊",
            candidate.pet_name,
            br_date(candidate.service.service_date)
        )
    }

    pub fn upsell_message(
        candidate: &GroomingCandidate,
        plans: &[GroomingPlan],
        clinic_name: &str,
    ) -> String {
        let mut msg = format!(
            "Olá! 🐾\n\n\
             Tudo bem? Aqui é da *{clinic_name}*!\n\n\
             Já faz um tempinho desde o último banho do(a) *{}* ({})! 🛁\n\n\
             Seu pet está precisando de um banho fresquinho? 😊\n\n",
            candidate.pet_name,
            br_date(candidate.service.service_date)
        );

        if !plans.is_empty() {
            msg.push_str("💰 *Temos planos com desconto especial para você:*\n\n");
            for plan in plans {
                msg.push_str(&format!("📦 *{}*\n", plan.name));
                msg.push_str(&format!("   💵 R$ {}/mês\n", br_amount(plan.monthly_price)));
                if let Some(description) = &plan.description {
                    msg.push_str(&format!("   📝 {description}\n"));
                }
                msg.push('\n');
            }
            msg.push_str("Com os planos, você economiza e seu pet fica sempre limpinho! 🐶🐱✨\n\n");
        }

        msg.push_str(
            "Gostaria de agendar um banho ou conhecer mais sobre nossos planos? 📞\n\n\
             Responda esta mensagem! Estamos à disposição! 😊",
        );
        msg
    }
}

#[async_trait]
impl ReactivationStrategy for GroomingReactivation {
    type Candidate = GroomingCandidate;

    fn category(&self) -> ReactivationCategory {
        ReactivationCategory::Grooming
    }

    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        _now: NaiveDateTime,
    ) -> Result<Vec<GroomingCandidate>, DatabaseError> {
        store.grooming_candidates().await
    }

    fn target<'a>(&self, c: &'a GroomingCandidate) -> Target<'a> {
        Target {
            customer_id: c.contact.customer_id,
            pet_id: Some(c.service.pet_id),
            source_id: c.service.id,
            phone: &c.contact.phone,
        }
    }

    async fn check(
        &self,
        _store: &dyn ReactivationStore,
        c: &GroomingCandidate,
        now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError> {
        let due = should_send_grooming_reminder(
            now.date(),
            c.service.service_date,
            c.service.has_plan,
            c.service.plan_type,
            self.reminder_days,
        );
        Ok(if due {
            Eligibility::Eligible
        } else {
            Eligibility::Skip("grooming reminder not due")
        })
    }

    fn dedup_window(&self, c: &GroomingCandidate) -> DedupWindow {
        if Self::on_monthly_plan(c) {
            DedupWindow::TrailingDays(self.plan_dedup_days)
        } else {
            DedupWindow::TrailingDays(self.no_plan_dedup_days)
        }
    }

    async fn compose(
        &self,
        store: &dyn ReactivationStore,
        c: &GroomingCandidate,
        _now: NaiveDateTime,
        clinic_name: &str,
    ) -> Result<String, DatabaseError> {
        if c.service.has_plan {
            return Ok(Self::plan_message(c, clinic_name));
        }
        let plans = self.offered_plans(store, c.pet_breed.as_deref()).await;
        Ok(Self::upsell_message(c, &plans, clinic_name))
    }
}
