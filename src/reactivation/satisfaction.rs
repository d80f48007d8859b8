//! Satisfaction surveys for services completed in the last 24 hours.

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};

use crate::config::SatisfactionConfig;
use crate::error::DatabaseError;
use crate::reactivation::runner::{Eligibility, ReactivationStrategy, Target};
use crate::store::ReactivationStore;
use crate::store::model::{CompletedService, ReactivationCategory, SurveyCandidate};

const LOOKBACK_HOURS: i64 = 24;

pub struct SatisfactionSurvey {
    forms: SatisfactionConfig,
}

impl SatisfactionSurvey {
    pub fn new(config: &SatisfactionConfig) -> Self {
        Self {
            forms: config.clone(),
        }
    }

    /// Survey form for the combination of services performed.
    pub fn form_url(&self, service: &CompletedService) -> &str {
        match (service.has_grooming, service.has_tosa, service.has_taxidog) {
            (true, true, true) => &self.forms.banho_tosa_com_taxidog,
            (true, true, false) => &self.forms.banho_tosa_sem_taxidog,
            (true, false, true) => &self.forms.banho_com_taxidog,
            _ => &self.forms.banho_sem_taxidog,
        }
    }

    /// Human description of what was done, e.g. "banho e tosa com taxidog".
    pub fn service_text(service: &CompletedService) -> String {
        let mut parts = Vec::new();
        if service.has_grooming {
            parts.push("banho");
        }
        if service.has_tosa {
            parts.push("tosa");
        }
        let mut text = if parts.is_empty() {
            "atendimento".to_string()
        } else {
            parts.join(" e ")
        };
        if service.has_taxidog {
            text.push_str(" com taxidog");
        }
        text
    }

    pub fn message(&self, candidate: &SurveyCandidate) -> String {
        let mut msg = format!(
            "Olá, *{}*! 🐾\n\n\
             Esperamos que *{}* tenha adorado o {}! 😊\n\n\
             Sua opinião é muito importante para nós! 💙\n\n\
             Gostaríamos de saber como foi sua experiência. Poderia dedicar 1 minuto para responder nossa pesquisa de satisfação?\n\n\
             📋 *Clique aqui para responder:*\n\
             {}\n\n\
             ✨ Sua avaliação nos ajuda a melhorar cada vez mais nossos serviços!\n\n",
            candidate.contact.name,
            candidate.pet_name,
            Self::service_text(&candidate.service),
            self.form_url(&candidate.service),
        );
        if self
            .forms
            .google_review_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
        {
            msg.push_str(
                "_Obs: Se você avaliar com 3 estrelas ou mais, vamos te direcionar para avaliar no Google também!_ ⭐⭐⭐\n\n",
            );
        }
        msg.push_str("Muito obrigado! 🙏");
        msg
    }
}

#[async_trait]
impl ReactivationStrategy for SatisfactionSurvey {
    type Candidate = SurveyCandidate;

    fn category(&self) -> ReactivationCategory {
        ReactivationCategory::Satisfaction
    }

    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        now: NaiveDateTime,
    ) -> Result<Vec<SurveyCandidate>, DatabaseError> {
        store
            .survey_candidates(now - TimeDelta::hours(LOOKBACK_HOURS), now)
            .await
    }

    fn target<'a>(&self, c: &'a SurveyCandidate) -> Target<'a> {
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
        c: &SurveyCandidate,
        _now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError> {
        Ok(if c.service.satisfaction_sent {
            Eligibility::Skip("survey already sent")
        } else {
            Eligibility::Eligible
        })
    }

    async fn compose(
        &self,
        _store: &dyn ReactivationStore,
        c: &SurveyCandidate,
        _now: NaiveDateTime,
        _clinic_name: &str,
    ) -> Result<String, DatabaseError> {
        Ok(self.message(c))
    }

    async fn on_success(
        &self,
        store: &dyn ReactivationStore,
        c: &SurveyCandidate,
        now: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        store.mark_survey_sent(c.service.id, now).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reactivation::runner::{BatchJob, BatchRunner};
    use crate::reactivation::testing::{at, harness, seed_owner, RecordingGateway, harness_with};
    use crate::store::model::NewCompletedService;

    fn service(flags: (bool, bool, bool)) -> CompletedService {
        CompletedService {
            id: 1,
            pet_id: 10,
            service_date: at(2024, 3, 10, 9, 0),
            service_type: None,
            has_grooming: flags.0,
            has_tosa: flags.1,
            has_taxidog: flags.2,
            satisfaction_sent: false,
        }
    }

    fn completed(pet_id: i64, when: NaiveDateTime, flags: (bool, bool, bool)) -> NewCompletedService {
        NewCompletedService {
            pet_id,
            service_date: when,
            service_type: None,
            has_grooming: flags.0,
            has_tosa: flags.1,
            has_taxidog: flags.2,
        }
    }

    #[test]
    fn form_follows_service_combination() {
        let forms = SatisfactionConfig::default();
        let survey = SatisfactionSurvey::new(&forms);
        assert_eq!(survey.form_url(&service((true, true, true))), forms.banho_tosa_com_taxidog);
        assert_eq!(survey.form_url(&service((true, true, false))), forms.banho_tosa_sem_taxidog);
        assert_eq!(survey.form_url(&service((true, false, true))), forms.banho_com_taxidog);
        assert_eq!(survey.form_url(&service((true, false, false))), forms.banho_sem_taxidog);
        assert_eq!(survey.form_url(&service((false, true, true))), forms.banho_sem_taxidog);
        assert_eq!(survey.form_url(&service((false, false, false))), forms.banho_sem_taxidog);
    }

    #[test]
    fn service_text_lists_active_flags() {
        let text = SatisfactionSurvey::service_text;
        assert_eq!(text(&service((true, true, true))), "banho e tosa com taxidog");
        assert_eq!(text(&service((true, false, false))), "banho");
        assert_eq!(text(&service((false, true, false))), "tosa");
        assert_eq!(text(&service((false, false, false))), "atendimento");
        assert_eq!(text(&service((false, false, true))), "atendimento com taxidog");
    }

    #[tokio::test]
    async fn surveys_recent_services_once() {
        let now = at(2024, 3, 10, 15, 0);
        let h = harness(now).await;
        seed_owner(&h.store, 1, 10, "Maria", "Rex", "11987654321").await;

        let recent = h
            .store
            .insert_completed_service(&completed(10, at(2024, 3, 10, 9, 0), (true, true, false)))
            .await
            .unwrap();
        let stale = h
            .store
            .insert_completed_service(&completed(10, at(2024, 3, 9, 14, 0), (true, false, false)))
            .await
            .unwrap();

        let runner = BatchRunner::new(
            h.ctx.clone(),
            SatisfactionSurvey::new(&SatisfactionConfig::default()),
            Duration::from_secs(2),
        );
        let report = runner.run().await;
        assert_eq!(report.candidates, 1);
        assert_eq!(report.success, 1);

        let text = &h.gateway.messages()[0].1;
        assert!(text.starts_with("Olá, *Maria*! 🐾\n\nEsperamos que *Rex* tenha adorado o banho e tosa! 😊"));
        assert!(text.contains("https://form.talkhub.me/s/cmgidazc6001hr740cj2c912l"));
        assert!(!text.contains("Google"));
        assert!(text.ends_with("Muito obrigado! 🙏"));

        let service = h.store.get_completed_service(recent).await.unwrap().unwrap();
        assert!(service.satisfaction_sent);
        let untouched = h.store.get_completed_service(stale).await.unwrap().unwrap();
        assert!(!untouched.satisfaction_sent);

        h.clock.set(at(2024, 3, 10, 16, 0));
        let again = runner.run().await;
        assert_eq!(again.candidates, 0);
        assert_eq!(h.gateway.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_survey_stays_pending_and_google_note_is_optional() {
        let now = at(2024, 3, 10, 15, 0);
        let h = harness_with(now, RecordingGateway::failing(&["5511987654321"])).await;
        seed_owner(&h.store, 1, 10, "Maria", "Rex", "11987654321").await;
        let id = h
            .store
            .insert_completed_service(&completed(10, at(2024, 3, 10, 9, 0), (true, false, true)))
            .await
            .unwrap();

        let config = SatisfactionConfig {
            google_review_url: Some("https://g.page/r/clinica/review".into()),
            ..SatisfactionConfig::default()
        };
        let runner = BatchRunner::new(h.ctx.clone(), SatisfactionSurvey::new(&config), Duration::from_secs(2));
        let report = runner.run().await;
        assert_eq!(report.errors, 1);

        let text = &h.gateway.messages()[0].1;
        assert!(text.contains("adorado o banho com taxidog!"));
        assert!(text.contains("avaliar no Google também!_ ⭐⭐⭐\n\nMuito obrigado! 🙏"));

        let service = h.store.get_completed_service(id).await.unwrap().unwrap();
        assert!(!service.satisfaction_sent);
    }
}
