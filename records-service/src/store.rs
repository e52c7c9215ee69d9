//! Records store
//!
//! Entry point for the API layer. Runs account input through the account
//! factory, then persists through a [`RecordsRepository`].

use db::{DbConfig, DbPool};
use error::{AccountError, Result};

use crate::account::{normalize_email, AccountFactory, Argon2AccountFactory, Role};
use crate::models::{
    Doctor, InsertResult, Medication, NewAccount, NewPatient, NewPrescription, Patient, User,
};
use crate::mysql::MySqlRepository;
use crate::repository::{NewMemberRow, NewUserRow, RecordsRepository};

/// Facade over the clinical records tables.
pub struct RecordsStore<R = MySqlRepository, F = Argon2AccountFactory> {
    repository: R,
    accounts: F,
}

impl RecordsStore<MySqlRepository, Argon2AccountFactory> {
    /// Open a pool from `config` and build a store with Argon2 hashing.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self::new(MySqlRepository::new(pool), Argon2AccountFactory::new())
    }

    /// Shared pool handle.
    pub fn pool(&self) -> &DbPool {
        self.repository.pool()
    }
}

impl<R: RecordsRepository, F: AccountFactory> RecordsStore<R, F> {
    pub fn new(repository: R, accounts: F) -> Self {
        Self {
            repository,
            accounts,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Probe the database, returning the failure cause.
    pub async fn ping(&self) -> Result<()> {
        self.repository.ping().await
    }

    /// Probe the database. Failures are logged, never returned.
    pub async fn check_connectivity(&self) -> bool {
        match self.ping().await {
            Ok(()) => {
                tracing::info!("Database connection successful");
                true
            }
            Err(e) => {
                tracing::error!("Database connection failed: {}", e);
                false
            }
        }
    }

    /// Create a plain `users` row.
    pub async fn create_user(&self, data: &NewAccount) -> Result<InsertResult> {
        let result: Result<InsertResult> = async {
            let account = self.accounts.create(Role::User, data).await?;
            self.repository.insert_user(&NewUserRow::profile(&account)).await
        }
        .await;

        match result {
            Ok(inserted) => {
                tracing::info!("Created user {}", inserted.insert_id);
                Ok(inserted)
            }
            Err(e) => {
                tracing::error!("Error creating user: {}", e);
                Err(e)
            }
        }
    }

    /// Create a doctor and its login `users` row in one transaction.
    ///
    /// The returned `insert_id` is the new `doctor_id`.
    pub async fn create_doctor(&self, data: &NewAccount) -> Result<InsertResult> {
        let result: Result<InsertResult> = async {
            let account = self.accounts.create(Role::Doctor, data).await?;
            self.repository
                .insert_doctor(&NewUserRow::login(&account), &NewMemberRow::from(&account))
                .await
        }
        .await;

        match result {
            Ok(inserted) => {
                tracing::info!("Created doctor {}", inserted.insert_id);
                Ok(inserted)
            }
            Err(e) => {
                tracing::error!("Error creating doctor: {}", e);
                Err(e)
            }
        }
    }

    /// Create a patient and its login `users` row in one transaction.
    ///
    /// The returned `insert_id` is the new `patient_id`.
    pub async fn create_patient(&self, data: &NewPatient) -> Result<InsertResult> {
        let result: Result<InsertResult> = async {
            let account = self.accounts.create(Role::Patient, &data.account).await?;
            self.repository
                .insert_patient(
                    &NewUserRow::login(&account),
                    &NewMemberRow::from(&account),
                    data.primary_doctor_id,
                )
                .await
        }
        .await;

        match result {
            Ok(inserted) => {
                tracing::info!("Created patient {}", inserted.insert_id);
                Ok(inserted)
            }
            Err(e) => {
                tracing::error!("Error creating patient: {}", e);
                Err(e)
            }
        }
    }

    /// Patients whose primary doctor is `doctor_id`.
    pub async fn get_patient_list(&self, doctor_id: u64) -> Result<Vec<Patient>> {
        self.repository.list_patients_for_doctor(doctor_id).await
    }

    pub async fn get_doctor_list(&self) -> Result<Vec<Doctor>> {
        self.repository.list_doctors().await
    }

    pub async fn get_patient(&self, patient_id: u64) -> Result<Option<Patient>> {
        self.repository.find_patient(patient_id).await
    }

    pub async fn get_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        let email = lookup_key(email);
        self.repository
            .find_patient_by_email(&email)
            .await
            .map_err(|e| {
                tracing::error!("Error fetching patient by email: {}", e);
                e
            })
    }

    pub async fn get_doctor(&self, doctor_id: u64) -> Result<Option<Doctor>> {
        self.repository.find_doctor(doctor_id).await
    }

    /// Record a prescription for `patient_id`.
    pub async fn prescribe(
        &self,
        patient_id: u64,
        prescription: &NewPrescription,
    ) -> Result<InsertResult> {
        self.repository
            .insert_medication(patient_id, prescription)
            .await
    }

    pub async fn get_prescriptions(&self, patient_id: u64) -> Result<Vec<Medication>> {
        self.repository.list_medications(patient_id).await
    }

    /// Find a `users` row by email, or by username for doctor/patient logins.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.repository.find_user_by_email(&lookup_key(email)).await
    }

    /// Return the user when `password` matches the stored hash.
    ///
    /// An unknown email and a wrong password fail the same way.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .get_user_by_email(email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;
        if self.accounts.verify(password, &user.password)? {
            Ok(user)
        } else {
            Err(AccountError::InvalidCredentials.into())
        }
    }

    /// Shut down the underlying pool.
    pub async fn close(&self) {
        self.repository.close().await;
    }
}

/// Emails are stored normalized; anything that fails validation is looked up
/// as given and simply won't match.
fn lookup_key(email: &str) -> String {
    normalize_email(email).unwrap_or_else(|_| email.to_string())
}
