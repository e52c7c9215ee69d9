//! Records Service
//!
//! Data access for the clinical records application: users, doctors,
//! patients and their prescriptions, stored in MySQL.
//!
//! [`RecordsStore`] is constructed explicitly around a pool and handed to the
//! API layer; nothing here is a process-wide singleton.

pub mod account;
pub mod models;
pub mod mysql;
pub mod repository;
pub mod store;

pub use account::{Account, AccountFactory, Argon2AccountFactory, Role};
pub use models::{
    Doctor, InsertResult, Medication, NewAccount, NewPatient, NewPrescription, Patient, User,
};
pub use mysql::MySqlRepository;
pub use repository::{InMemoryRepository, RecordsRepository};
pub use store::RecordsStore;
