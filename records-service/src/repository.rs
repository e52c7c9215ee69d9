//! Records repository
//!
//! Persistence primitives behind the records store, plus an in-memory
//! implementation for tests and local development.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use error::{DatabaseError, Result};

use crate::account::Account;
use crate::models::{Doctor, InsertResult, Medication, NewPrescription, Patient, User};

/// Columns written to `users`.
#[derive(Debug, Clone, Default)]
pub struct NewUserRow {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: String,
    pub name: Option<String>,
}

impl NewUserRow {
    /// Plain user: names, email and password hash.
    pub fn profile(account: &Account) -> Self {
        Self {
            first_name: Some(account.first_name.clone()),
            last_name: Some(account.last_name.clone()),
            email: Some(account.email.clone()),
            password: account.password_hash.clone(),
            ..Self::default()
        }
    }

    /// Login row behind a doctor or patient: email as username plus the
    /// composite display name. `email` is written too, so the unique key on
    /// `users.email` also covers logins.
    pub fn login(account: &Account) -> Self {
        Self {
            email: Some(account.email.clone()),
            username: Some(account.email.clone()),
            password: account.password_hash.clone(),
            name: Some(account.display_name()),
            ..Self::default()
        }
    }
}

/// Columns shared by `doctors` and `patients`, apart from the keys.
#[derive(Debug, Clone)]
pub struct NewMemberRow {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Account> for NewMemberRow {
    fn from(account: &Account) -> Self {
        Self {
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            email: account.email.clone(),
        }
    }
}

/// Records repository trait for database operations
#[allow(async_fn_in_trait)]
pub trait RecordsRepository: Send + Sync {
    /// Run a trivial query against `doctors`
    async fn ping(&self) -> Result<()>;

    /// Insert one `users` row
    async fn insert_user(&self, user: &NewUserRow) -> Result<InsertResult>;

    /// Insert a `users` row and the linked `doctors` row atomically.
    /// Returns the doctors insert.
    async fn insert_doctor(&self, user: &NewUserRow, doctor: &NewMemberRow) -> Result<InsertResult>;

    /// Insert a `users` row and the linked `patients` row atomically.
    /// Returns the patients insert.
    async fn insert_patient(
        &self,
        user: &NewUserRow,
        patient: &NewMemberRow,
        primary_doctor_id: Option<u64>,
    ) -> Result<InsertResult>;

    /// Find a user by `email`
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn list_doctors(&self) -> Result<Vec<Doctor>>;

    async fn find_doctor(&self, doctor_id: u64) -> Result<Option<Doctor>>;

    async fn list_patients_for_doctor(&self, doctor_id: u64) -> Result<Vec<Patient>>;

    async fn find_patient(&self, patient_id: u64) -> Result<Option<Patient>>;

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>>;

    /// Insert one `medication` row
    async fn insert_medication(
        &self,
        patient_id: u64,
        prescription: &NewPrescription,
    ) -> Result<InsertResult>;

    /// Medication rows for a patient, oldest first
    async fn list_medications(&self, patient_id: u64) -> Result<Vec<Medication>>;

    /// Release underlying resources
    async fn close(&self);
}

/// Reduce a keyed lookup to a single row, treating more than one match as a
/// broken uniqueness constraint.
pub(crate) fn at_most_one<T>(mut rows: Vec<T>, what: &str) -> Result<Option<T>> {
    if rows.len() > 1 {
        return Err(DatabaseError::MultipleRows(what.to_string()).into());
    }
    Ok(rows.pop())
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    doctors: Vec<Doctor>,
    patients: Vec<Patient>,
    medications: Vec<Medication>,
    next_user_id: u64,
    next_doctor_id: u64,
    next_patient_id: u64,
    next_medication_id: u64,
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

fn inserted(insert_id: u64) -> InsertResult {
    InsertResult {
        insert_id,
        rows_affected: 1,
    }
}

impl Tables {
    fn insert_user(&mut self, row: &NewUserRow) -> Result<u64> {
        let email_taken = row.email.is_some()
            && self.users.iter().any(|u| u.email == row.email);
        if email_taken {
            return Err(DatabaseError::DuplicateEntry("users.email".into()).into());
        }
        let username_taken = row.username.is_some()
            && self.users.iter().any(|u| u.username == row.username);
        if username_taken {
            return Err(DatabaseError::DuplicateEntry("users.username".into()).into());
        }

        let user_id = next_id(&mut self.next_user_id);
        self.users.push(User {
            user_id,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            email: row.email.clone(),
            username: row.username.clone(),
            password: row.password.clone(),
            name: row.name.clone(),
        });
        Ok(user_id)
    }

    fn insert_doctor(&mut self, user_id: u64, row: &NewMemberRow) -> Result<u64> {
        if self.doctors.iter().any(|d| d.email == row.email) {
            return Err(DatabaseError::DuplicateEntry("doctors.email".into()).into());
        }
        let doctor_id = next_id(&mut self.next_doctor_id);
        self.doctors.push(Doctor {
            doctor_id,
            user_id,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            email: row.email.clone(),
        });
        Ok(doctor_id)
    }

    fn insert_patient(
        &mut self,
        user_id: u64,
        row: &NewMemberRow,
        primary_doctor_id: Option<u64>,
    ) -> Result<u64> {
        if self.patients.iter().any(|p| p.email == row.email) {
            return Err(DatabaseError::DuplicateEntry("patients.email".into()).into());
        }
        if let Some(doctor_id) = primary_doctor_id {
            if !self.doctors.iter().any(|d| d.doctor_id == doctor_id) {
                return Err(DatabaseError::ForeignKeyViolation(format!(
                    "patients.primary_doctor_id = {}",
                    doctor_id
                ))
                .into());
            }
        }
        let patient_id = next_id(&mut self.next_patient_id);
        self.patients.push(Patient {
            patient_id,
            user_id,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            email: row.email.clone(),
            primary_doctor_id,
        });
        Ok(patient_id)
    }

    fn remove_user(&mut self, user_id: u64) {
        self.users.retain(|u| u.user_id != user_id);
    }
}

/// In-memory repository for testing and development
///
/// Mirrors the MySQL schema's unique and foreign-key constraints. Like
/// AUTO_INCREMENT, ids consumed by a rolled-back insert are not reused.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    fail_next_role_insert: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            offline: AtomicBool::new(false),
            fail_next_role_insert: AtomicBool::new(false),
        }
    }

    /// Make every operation fail as if the server were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next doctors/patients insert after its users row is written.
    pub fn fail_next_role_insert(&self) {
        self.fail_next_role_insert.store(true, Ordering::SeqCst);
    }

    /// Number of rows in `users`.
    pub fn user_count(&self) -> usize {
        self.read().users.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionFailed("in-memory store is offline".into()).into());
        }
        Ok(())
    }

    fn injected_failure(&self) -> Result<()> {
        if self.fail_next_role_insert.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("injected role insert failure".into()).into());
        }
        Ok(())
    }

    /// Insert the users row, then run `insert_role`; undo the users row if
    /// the role insert fails.
    fn insert_with_user(
        &self,
        user: &NewUserRow,
        insert_role: impl FnOnce(&mut Tables, u64) -> Result<u64>,
    ) -> Result<InsertResult> {
        self.check_online()?;
        let mut tables = self.write();
        let user_id = tables.insert_user(user)?;
        let role_id = self
            .injected_failure()
            .and_then(|()| insert_role(&mut *tables, user_id));
        match role_id {
            Ok(id) => Ok(inserted(id)),
            Err(e) => {
                tables.remove_user(user_id);
                Err(e)
            }
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordsRepository for InMemoryRepository {
    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    async fn insert_user(&self, user: &NewUserRow) -> Result<InsertResult> {
        self.check_online()?;
        let user_id = self.write().insert_user(user)?;
        Ok(inserted(user_id))
    }

    async fn insert_doctor(&self, user: &NewUserRow, doctor: &NewMemberRow) -> Result<InsertResult> {
        self.insert_with_user(user, |tables, user_id| tables.insert_doctor(user_id, doctor))
    }

    async fn insert_patient(
        &self,
        user: &NewUserRow,
        patient: &NewMemberRow,
        primary_doctor_id: Option<u64>,
    ) -> Result<InsertResult> {
        self.insert_with_user(user, |tables, user_id| {
            tables.insert_patient(user_id, patient, primary_doctor_id)
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.check_online()?;
        let rows = self
            .read()
            .users
            .iter()
            .filter(|u| u.email.as_deref() == Some(email))
            .cloned()
            .collect();
        at_most_one(rows, "users.email")
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.check_online()?;
        Ok(self.read().doctors.clone())
    }

    async fn find_doctor(&self, doctor_id: u64) -> Result<Option<Doctor>> {
        self.check_online()?;
        Ok(self
            .read()
            .doctors
            .iter()
            .find(|d| d.doctor_id == doctor_id)
            .cloned())
    }

    async fn list_patients_for_doctor(&self, doctor_id: u64) -> Result<Vec<Patient>> {
        self.check_online()?;
        Ok(self
            .read()
            .patients
            .iter()
            .filter(|p| p.primary_doctor_id == Some(doctor_id))
            .cloned()
            .collect())
    }

    async fn find_patient(&self, patient_id: u64) -> Result<Option<Patient>> {
        self.check_online()?;
        Ok(self
            .read()
            .patients
            .iter()
            .find(|p| p.patient_id == patient_id)
            .cloned())
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        self.check_online()?;
        let rows = self
            .read()
            .patients
            .iter()
            .filter(|p| p.email == email)
            .cloned()
            .collect();
        at_most_one(rows, "patients.email")
    }

    async fn insert_medication(
        &self,
        patient_id: u64,
        prescription: &NewPrescription,
    ) -> Result<InsertResult> {
        self.check_online()?;
        let mut tables = self.write();
        if !tables.patients.iter().any(|p| p.patient_id == patient_id) {
            return Err(DatabaseError::ForeignKeyViolation(format!(
                "medication.patient_id = {}",
                patient_id
            ))
            .into());
        }
        let medication_id = next_id(&mut tables.next_medication_id);
        tables.medications.push(Medication {
            medication_id,
            patient_id,
            medication_name: prescription.medication_name.clone(),
            dosage: prescription.dose.clone(),
            frequency: prescription.frequency.clone(),
            start_date: prescription.start_date,
            end_date: prescription.end_date,
        });
        Ok(inserted(medication_id))
    }

    async fn list_medications(&self, patient_id: u64) -> Result<Vec<Medication>> {
        self.check_online()?;
        Ok(self
            .read()
            .medications
            .iter()
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn close(&self) {
        self.set_offline(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use error::AppError;

    fn account(email: &str) -> Account {
        Account {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
        }
    }

    #[tokio::test]
    async fn test_insert_doctor_links_user() {
        let repo = InMemoryRepository::new();
        let account = account("ann@x.com");

        let result = repo
            .insert_doctor(&NewUserRow::login(&account), &NewMemberRow::from(&account))
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);

        let doctor = repo.find_doctor(result.insert_id).await.unwrap().unwrap();
        let user = repo.find_user_by_email("ann@x.com").await.unwrap().unwrap();
        assert_eq!(doctor.user_id, user.user_id);
        assert_eq!(user.username.as_deref(), Some("ann@x.com"));
        assert_eq!(user.name.as_deref(), Some("Ann Lee"));
        assert_eq!(user.email.as_deref(), Some("ann@x.com"));
    }

    #[tokio::test]
    async fn test_duplicate_user_email_rejected() {
        let repo = InMemoryRepository::new();
        let row = NewUserRow::profile(&account("ann@x.com"));

        repo.insert_user(&row).await.unwrap();
        let err = repo.insert_user(&row).await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::DuplicateEntry(_))));
    }

    #[tokio::test]
    async fn test_role_failure_rolls_back_user() {
        let repo = InMemoryRepository::new();
        let account = account("sam@x.com");

        repo.fail_next_role_insert();
        let result = repo
            .insert_patient(&NewUserRow::login(&account), &NewMemberRow::from(&account), None)
            .await;
        assert!(result.is_err());
        assert_eq!(repo.user_count(), 0);

        // The switch is one-shot
        let result = repo
            .insert_patient(&NewUserRow::login(&account), &NewMemberRow::from(&account), None)
            .await;
        assert!(result.is_ok());
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_primary_doctor_rolls_back_user() {
        let repo = InMemoryRepository::new();
        let account = account("sam@x.com");

        let err = repo
            .insert_patient(&NewUserRow::login(&account), &NewMemberRow::from(&account), Some(42))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::ForeignKeyViolation(_))));
        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn test_medication_requires_patient() {
        let repo = InMemoryRepository::new();
        let prescription = NewPrescription {
            medication_name: "Ibuprofen".into(),
            dose: "200mg".into(),
            frequency: "as needed".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            end_date: None,
        };

        let err = repo.insert_medication(9, &prescription).await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::ForeignKeyViolation(_))));
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let repo = InMemoryRepository::new();
        repo.set_offline(true);

        assert!(repo.ping().await.is_err());
        assert!(repo.list_doctors().await.is_err());
        assert!(repo.find_patient(1).await.is_err());
    }

    #[test]
    fn test_at_most_one() {
        assert_eq!(at_most_one(Vec::<u8>::new(), "t").unwrap(), None);
        assert_eq!(at_most_one(vec![1u8], "t").unwrap(), Some(1));
        assert!(matches!(
            at_most_one(vec![1u8, 2], "t"),
            Err(AppError::Database(DatabaseError::MultipleRows(_)))
        ));
    }
}
