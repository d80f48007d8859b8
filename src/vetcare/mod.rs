//! VetCare integration: pulls customers, pets, vaccinations, appointments and
//! grooming sheets into the local store before the engines run.

pub mod client;
pub mod sync;
pub mod types;

pub use client::VetCareClient;
pub use sync::{EntitySync, SyncReport, SyncService};
