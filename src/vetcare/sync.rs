//! Master-data sync: VetCare → local store.
//!
//! Order matters: customers before pets, pets before the per-pet resources
//! and the appointments that reference them. Every failure is counted and
//! logged; nothing escapes [`SyncService::sync_all`].

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::VetCareConfig;
use crate::error::SyncError;
use crate::store::ReactivationStore;
use crate::vetcare::client::VetCareClient;

/// Outcome for one entity type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitySync {
    pub synced: usize,
    pub errors: usize,
}

impl EntitySync {
    fn add(&mut self, other: EntitySync) {
        self.synced += other.synced;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub customers: EntitySync,
    pub pets: EntitySync,
    pub vaccines: EntitySync,
    pub appointments: EntitySync,
    pub grooming: EntitySync,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
}

pub struct SyncService {
    store: Arc<dyn ReactivationStore>,
    client: VetCareClient,
    clock: Arc<dyn Clock>,
    max_pages: u32,
    page_delay: Duration,
    per_pet_delay: Duration,
}

impl SyncService {
    pub fn new(
        config: &VetCareConfig,
        store: Arc<dyn ReactivationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            client: VetCareClient::new(config, clock.clone())?,
            store,
            clock,
            max_pages: config.max_pages,
            page_delay: config.page_delay,
            per_pet_delay: config.per_pet_delay,
        })
    }

    pub async fn sync_all(&self) -> SyncReport {
        let started_at = self.clock.now();
        tracing::info!("VetCare sync started");

        let customers = self.sync_customers().await;
        let pets = self.sync_pets().await;
        let vaccines = self.sync_vaccines().await;
        let appointments = self.sync_appointments().await;
        let grooming = self.sync_grooming().await;

        let report = SyncReport {
            customers,
            pets,
            vaccines,
            appointments,
            grooming,
            started_at,
            finished_at: self.clock.now(),
        };
        tracing::info!(
            customers = ?report.customers,
            pets = ?report.pets,
            vaccines = ?report.vaccines,
            appointments = ?report.appointments,
            grooming = ?report.grooming,
            elapsed_secs = (report.finished_at - report.started_at).num_seconds(),
            "VetCare sync finished (receivables are not synced)"
        );
        report
    }

    pub async fn sync_customers(&self) -> EntitySync {
        let mut count = EntitySync::default();
        let page = match self.client.customers().await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch customers");
                count.errors += 1;
                return count;
            }
        };
        count.errors += page.rejected;
        tracing::info!(received = page.items.len(), "Customers received");

        for customer in &page.items {
            match self.store.upsert_customer(&customer.to_customer()).await {
                Ok(()) => count.synced += 1,
                Err(e) => {
                    tracing::error!(customer_id = customer.id, error = %e, "Failed to store customer");
                    count.errors += 1;
                }
            }
        }
        tracing::info!(synced = count.synced, errors = count.errors, "Customers synced");
        count
    }

    pub async fn sync_pets(&self) -> EntitySync {
        let mut count = EntitySync::default();
        let mut page_no = 1;
        loop {
            let page = match self.client.pets_page(page_no).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(page = page_no, error = %e, "Failed to fetch pets page");
                    count.errors += 1;
                    break;
                }
            };
            count.errors += page.rejected;

            for dto in &page.items {
                let Some(pet) = dto.to_pet() else {
                    tracing::warn!(pet_id = dto.id, name = %dto.nome, "Pet without owner, skipping");
                    count.errors += 1;
                    continue;
                };
                match self.store.upsert_pet(&pet).await {
                    Ok(()) => {
                        count.synced += 1;
                        if count.synced % 100 == 0 {
                            tracing::info!(synced = count.synced, "Pet sync progress");
                        }
                    }
                    Err(e) => {
                        tracing::error!(pet_id = dto.id, error = %e, "Failed to store pet");
                        count.errors += 1;
                    }
                }
            }

            if !self.next_page(&mut page_no, page.last, "pets").await {
                break;
            }
        }
        tracing::info!(synced = count.synced, errors = count.errors, "Pets synced");
        count
    }

    pub async fn sync_appointments(&self) -> EntitySync {
        let mut count = EntitySync::default();
        let mut page_no = 1;
        loop {
            let page = match self.client.appointments_page(page_no).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(page = page_no, error = %e, "Failed to fetch appointments page");
                    count.errors += 1;
                    break;
                }
            };
            count.errors += page.rejected;

            for dto in &page.items {
                let appointment = match dto.to_appointment() {
                    Ok(a) => a,
                    Err(reason) => {
                        tracing::warn!(appointment_id = dto.id, reason, "Skipping appointment");
                        count.errors += 1;
                        continue;
                    }
                };
                match self.store.pet_exists(appointment.pet_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            appointment_id = dto.id,
                            pet_id = appointment.pet_id,
                            "Appointment references unknown pet, skipping"
                        );
                        count.errors += 1;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(appointment_id = dto.id, error = %e, "Pet lookup failed");
                        count.errors += 1;
                        continue;
                    }
                }
                match self.store.upsert_appointment(&appointment).await {
                    Ok(()) => count.synced += 1,
                    Err(e) => {
                        tracing::error!(appointment_id = dto.id, error = %e, "Failed to store appointment");
                        count.errors += 1;
                    }
                }
            }

            if !self.next_page(&mut page_no, page.last, "agendamentos").await {
                break;
            }
        }
        tracing::info!(synced = count.synced, errors = count.errors, "Appointments synced");
        count
    }

    pub async fn sync_vaccines(&self) -> EntitySync {
        let mut total = EntitySync::default();
        let Some(pet_ids) = self.local_pets("vaccines").await else {
            total.errors += 1;
            return total;
        };
        for pet_id in pet_ids {
            total.add(self.sync_pet_vaccines(pet_id).await);
            self.clock.sleep(self.per_pet_delay).await;
        }
        tracing::info!(synced = total.synced, errors = total.errors, "Vaccines synced");
        total
    }

    async fn sync_pet_vaccines(&self, pet_id: i64) -> EntitySync {
        let mut count = EntitySync::default();
        let page = match self.client.pet_vaccinations(pet_id).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(pet_id, error = %e, "Failed to fetch vaccinations");
                count.errors += 1;
                return count;
            }
        };
        count.errors += page.rejected;

        for dto in &page.items {
            if dto.vaccine_name().is_none() {
                tracing::warn!(pet_id, "Vaccination without a name, skipping");
                continue;
            }
            let vaccine = match dto.to_vaccine(pet_id) {
                Ok(v) => v,
                Err(reason) => {
                    tracing::warn!(pet_id, vaccination_id = ?dto.id, reason, "Skipping vaccination");
                    count.errors += 1;
                    continue;
                }
            };
            match self.store.upsert_vaccine(&vaccine).await {
                Ok(_) => count.synced += 1,
                Err(e) => {
                    tracing::error!(pet_id, error = %e, "Failed to store vaccination");
                    count.errors += 1;
                }
            }
        }
        count
    }

    pub async fn sync_grooming(&self) -> EntitySync {
        let mut total = EntitySync::default();
        let Some(pet_ids) = self.local_pets("grooming").await else {
            total.errors += 1;
            return total;
        };
        for pet_id in pet_ids {
            total.add(self.sync_pet_grooming(pet_id).await);
            self.clock.sleep(self.per_pet_delay).await;
        }
        tracing::info!(synced = total.synced, errors = total.errors, "Grooming records synced");
        total
    }

    async fn sync_pet_grooming(&self, pet_id: i64) -> EntitySync {
        let mut count = EntitySync::default();
        let page = match self.client.pet_grooming_records(pet_id).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(pet_id, error = %e, "Failed to fetch grooming records");
                count.errors += 1;
                return count;
            }
        };
        count.errors += page.rejected;

        for dto in &page.items {
            let service = match dto.to_grooming_service(pet_id) {
                Ok(s) => s,
                Err(reason) => {
                    tracing::warn!(pet_id, record_id = ?dto.id, reason, "Skipping grooming record");
                    count.errors += 1;
                    continue;
                }
            };
            match self.store.upsert_grooming_service(&service).await {
                Ok(_) => count.synced += 1,
                Err(e) => {
                    tracing::error!(pet_id, error = %e, "Failed to store grooming record");
                    count.errors += 1;
                }
            }
        }
        count
    }

    async fn local_pets(&self, what: &str) -> Option<Vec<i64>> {
        match self.store.list_pet_ids().await {
            Ok(ids) => {
                tracing::info!(pets = ids.len(), what, "Syncing per-pet records");
                Some(ids)
            }
            Err(e) => {
                tracing::error!(what, error = %e, "Failed to list local pets");
                None
            }
        }
    }

    /// Advance to the next page, pausing between requests. `false` ends the loop.
    async fn next_page(&self, page_no: &mut u32, last: bool, resource: &str) -> bool {
        if last {
            return false;
        }
        if *page_no >= self.max_pages {
            tracing::warn!(resource, max_pages = self.max_pages, "Page cap reached, stopping");
            return false;
        }
        *page_no += 1;
        self.clock.sleep(self.page_delay).await;
        true
    }
}
