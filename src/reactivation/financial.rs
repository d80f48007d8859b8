//! Payment reminders for unpaid services.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::config::FinancialConfig;
use crate::error::DatabaseError;
use crate::reactivation::policy::{can_send_financial_charge, days_between};
use crate::reactivation::runner::{Eligibility, ReactivationStrategy, Target};
use crate::reactivation::{br_amount, br_date};
use crate::store::ReactivationStore;
use crate::store::model::{DebtCandidate, ReactivationCategory};

pub struct FinancialReactivation {
    min_amount_for_charge: Decimal,
    charge_interval_days: i64,
}

impl FinancialReactivation {
    pub fn new(config: &FinancialConfig) -> Self {
        Self {
            min_amount_for_charge: config.min_amount_for_charge,
            charge_interval_days: config.charge_interval_days,
        }
    }

    /// Formal notice at or above the threshold, gentle reminder below it.
    pub fn message(&self, candidate: &DebtCandidate, now: NaiveDateTime, clinic_name: &str) -> String {
        let debt = &candidate.debt;
        let date = br_date(debt.service_date);
        let amount = br_amount(debt.amount);
        let name = &candidate.contact.name;
        let description = &debt.description;

        if debt.amount >= self.min_amount_for_charge {
            let days_overdue = days_between(debt.service_date, now.date());
            format!(
                "Olá, *{name}*! 😊\n\n\
                 Aqui é da *{clinic_name}*.\n\n\
                 Identificamos um débito em aberto referente ao serviço realizado em *{date}* (há {days_overdue} dias):\n\n\
                 📋 *Descrição:* {description}\n\
                 💰 *Valor:* R$ *{amount}*\n\n\
                 ⚠️ Para manter seus serviços em dia e evitar restrições futuras, pedimos a gentileza de regularizar este pagamento.\n\n\
                 Aceitamos:\n\
                 • 💳 Cartão de crédito/débito\n\
                 • 💵 Dinheiro\n\
                 • 📱 PIX\n\
                 • 🏦 Transferência bancária\n\n\
                 Caso já tenha efetuado o pagamento, por favor nos envie o comprovante! 🧾\n\n\
                 Estamos à disposição para ajudar! 📞"
            )
        } else {
            format!(
                "Olá, *{name}*! 😊\n\n\
                 Tudo bem? Aqui é da *{clinic_name}*!\n\n\
                 Estamos entrando em contato para lembrar sobre o serviço realizado em *{date}*:\n\n\
                 📋 *{description}*\n\
                 💰 Valor: R$ *{amount}*\n\n\
                 Caso já tenha realizado o pagamento, por favor, desconsidere esta mensagem! 🙏\n\n\
                 Se precisar de mais informações ou quiser regularizar, estamos à disposição! 😊\n\n\
                 Pode responder esta mensagem ou ligar para nós! 📞"
            )
        }
    }
}

#[async_trait]
impl ReactivationStrategy for FinancialReactivation {
    type Candidate = DebtCandidate;

    fn category(&self) -> ReactivationCategory {
        ReactivationCategory::Financial
    }

    async fn fetch(
        &self,
        store: &dyn ReactivationStore,
        now: NaiveDateTime,
    ) -> Result<Vec<DebtCandidate>, DatabaseError> {
        store.overdue_debts(now.date()).await
    }

    fn target<'a>(&self, c: &'a DebtCandidate) -> Target<'a> {
        Target {
            customer_id: c.contact.customer_id,
            pet_id: None,
            source_id: c.debt.id,
            phone: &c.contact.phone,
        }
    }

    async fn check(
        &self,
        _store: &dyn ReactivationStore,
        c: &DebtCandidate,
        now: NaiveDateTime,
    ) -> Result<Eligibility, DatabaseError> {
        let due = can_send_financial_charge(
            now.date(),
            c.debt.service_date,
            c.debt.last_charge_date,
            self.charge_interval_days,
        );
        Ok(if due {
            Eligibility::Eligible
        } else {
            Eligibility::Skip("charged recently")
        })
    }

    async fn compose(
        &self,
        _store: &dyn ReactivationStore,
        c: &DebtCandidate,
        now: NaiveDateTime,
        clinic_name: &str,
    ) -> Result<String, DatabaseError> {
        Ok(self.message(c, now, clinic_name))
    }

    async fn on_success(
        &self,
        store: &dyn ReactivationStore,
        c: &DebtCandidate,
        now: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        store.mark_debt_charged(c.debt.id, now).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::reactivation::runner::{BatchJob, BatchRunner};
    use crate::reactivation::testing::{at, harness, seed_owner};
    use crate::store::model::{LogStatus, NewDebt};

    fn engine() -> FinancialReactivation {
        FinancialReactivation::new(&FinancialConfig::default())
    }

    #[tokio::test]
    async fn large_debt_gets_formal_notice_and_is_marked_charged() {
        let now = at(2024, 3, 10, 10, 0);
        let h = harness(now).await;
        seed_owner(&h.store, 7, 70, "Carla", "Thor", "11987654321").await;
        let debt_id = h
            .store
            .insert_debt(&NewDebt {
                customer_id: 7,
                service_date: now.date() - TimeDelta::days(1),
                amount: dec!(500),
                description: "Cirurgia de castração".into(),
            })
            .await
            .unwrap();

        let runner = BatchRunner::new(h.ctx.clone(), engine(), Duration::from_secs(2));
        let report = runner.run().await;
        assert_eq!(report.success, 1);

        let sent = h.gateway.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5511987654321");
        let text = &sent[0].1;
        assert!(text.starts_with("Olá, *Carla*! 😊\n\nAqui é da *Clínica Veterinária*."));
        assert!(text.contains("realizado em *09/03/2024* (há 1 dias)"));
        assert!(text.contains("💰 *Valor:* R$ *500,00*"));
        assert!(text.contains("• 📱 PIX"));

        let debt = h.store.get_debt(debt_id).await.unwrap().unwrap();
        assert_eq!(debt.last_charge_date, Some(now));

        let logs = h
            .store
            .logs_for_source(ReactivationCategory::Financial, debt_id)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Success);
        let payload: serde_json::Value = serde_json::from_str(&logs[0].payload).unwrap();
        assert_eq!(payload["debtId"], debt_id);

        // Next day the interval blocks a new charge.
        h.clock.set(at(2024, 3, 11, 10, 0));
        let next = runner.run().await;
        assert_eq!(next.skipped, 1);
        assert_eq!(h.gateway.messages().len(), 1);

        // Thirty days after the charge it goes out again.
        h.clock.set(at(2024, 4, 9, 10, 0));
        let later = runner.run().await;
        assert_eq!(later.success, 1);
        assert_eq!(h.gateway.messages().len(), 2);
    }

    #[tokio::test]
    async fn small_debt_gets_subtle_reminder() {
        let now = at(2024, 3, 10, 10, 0);
        let h = harness(now).await;
        seed_owner(&h.store, 7, 70, "Carla", "Thor", "11987654321").await;
        h.store
            .insert_debt(&NewDebt {
                customer_id: 7,
                service_date: now.date() - TimeDelta::days(3),
                amount: dec!(120.5),
                description: "Banho".into(),
            })
            .await
            .unwrap();

        let runner = BatchRunner::new(h.ctx.clone(), engine(), Duration::from_secs(2));
        runner.run().await;

        let text = &h.gateway.messages()[0].1;
        assert!(text.contains("Tudo bem? Aqui é da *Clínica Veterinária*!"));
        assert!(text.contains("📋 *Banho*\n💰 Valor: R$ *120,50*"));
        assert!(text.contains("desconsidere esta mensagem"));
        assert!(!text.contains("PIX"));
    }

    #[tokio::test]
    async fn failed_send_leaves_debt_uncharged() {
        let now = at(2024, 3, 10, 10, 0);
        let h = crate::reactivation::testing::harness_with(
            now,
            crate::reactivation::testing::RecordingGateway::failing(&["5511987654321"]),
        )
        .await;
        seed_owner(&h.store, 7, 70, "Carla", "Thor", "11987654321").await;
        let debt_id = h
            .store
            .insert_debt(&NewDebt {
                customer_id: 7,
                service_date: now.date() - TimeDelta::days(1),
                amount: dec!(500),
                description: "Cirurgia".into(),
            })
            .await
            .unwrap();

        let runner = BatchRunner::new(h.ctx.clone(), engine(), Duration::from_secs(2));
        let report = runner.run().await;
        assert_eq!(report.errors, 1);
        let debt = h.store.get_debt(debt_id).await.unwrap().unwrap();
        assert!(debt.last_charge_date.is_none());
    }
}
