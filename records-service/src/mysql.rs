//! MySQL repository
//!
//! sqlx-backed implementation of [`RecordsRepository`]. Every statement binds
//! its parameters.

use db::{classify, DbPool};
use error::{DatabaseError, Result};
use sqlx::{Executor, MySql};

use crate::models::{Doctor, InsertResult, Medication, NewPrescription, Patient, User};
use crate::repository::{at_most_one, NewMemberRow, NewUserRow, RecordsRepository};

const USER_COLUMNS: &str = "user_id, first_name, last_name, email, username, password, name";
const DOCTOR_COLUMNS: &str = "doctor_id, user_id, first_name, last_name, email";
const PATIENT_COLUMNS: &str =
    "patient_id, user_id, first_name, last_name, email, primary_doctor_id";
const MEDICATION_COLUMNS: &str =
    "medication_id, patient_id, medication_name, dosage, frequency, start_date, end_date";

/// Repository over a MySQL connection pool.
#[derive(Clone)]
pub struct MySqlRepository {
    pool: DbPool,
}

impl MySqlRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn transaction_failed(e: sqlx::Error) -> DatabaseError {
    DatabaseError::TransactionFailed(e.to_string())
}

/// Works against the pool or an open transaction.
async fn insert_user_row<'e, E>(executor: E, user: &NewUserRow) -> Result<InsertResult>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO users
        (first_name, last_name, email, username, password, name)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password)
    .bind(&user.name)
    .execute(executor)
    .await
    .map_err(classify)?;
    Ok(result.into())
}

impl RecordsRepository for MySqlRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1 FROM doctors LIMIT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn insert_user(&self, user: &NewUserRow) -> Result<InsertResult> {
        insert_user_row(&self.pool, user).await
    }

    async fn insert_doctor(&self, user: &NewUserRow, doctor: &NewMemberRow) -> Result<InsertResult> {
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let user_id = insert_user_row(&mut *tx, user).await?.insert_id;
        tracing::debug!("Inserted users row {} for doctor", user_id);

        let result = sqlx::query(
            r#"
            INSERT INTO doctors
            (user_id, first_name, last_name, email)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&doctor.first_name)
        .bind(&doctor.last_name)
        .bind(&doctor.email)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(transaction_failed)?;
        Ok(result.into())
    }

    async fn insert_patient(
        &self,
        user: &NewUserRow,
        patient: &NewMemberRow,
        primary_doctor_id: Option<u64>,
    ) -> Result<InsertResult> {
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let user_id = insert_user_row(&mut *tx, user).await?.insert_id;
        tracing::debug!("Inserted users row {} for patient", user_id);

        let result = sqlx::query(
            r#"
            INSERT INTO patients
            (user_id, first_name, last_name, email, primary_doctor_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(&patient.email)
        .bind(primary_doctor_id)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(transaction_failed)?;
        Ok(result.into())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ? LIMIT 2",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        at_most_one(rows, "users.email")
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let rows = sqlx::query_as::<_, Doctor>(&format!(
            "SELECT {} FROM doctors ORDER BY doctor_id",
            DOCTOR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }

    async fn find_doctor(&self, doctor_id: u64) -> Result<Option<Doctor>> {
        let rows = sqlx::query_as::<_, Doctor>(&format!(
            "SELECT {} FROM doctors WHERE doctor_id = ? LIMIT 2",
            DOCTOR_COLUMNS
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        at_most_one(rows, "doctors.doctor_id")
    }

    async fn list_patients_for_doctor(&self, doctor_id: u64) -> Result<Vec<Patient>> {
        let rows = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {} FROM patients WHERE primary_doctor_id = ? ORDER BY patient_id",
            PATIENT_COLUMNS
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }

    async fn find_patient(&self, patient_id: u64) -> Result<Option<Patient>> {
        let rows = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {} FROM patients WHERE patient_id = ? LIMIT 2",
            PATIENT_COLUMNS
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        at_most_one(rows, "patients.patient_id")
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        let rows = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {} FROM patients WHERE email = ? LIMIT 2",
            PATIENT_COLUMNS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        at_most_one(rows, "patients.email")
    }

    async fn insert_medication(
        &self,
        patient_id: u64,
        prescription: &NewPrescription,
    ) -> Result<InsertResult> {
        let result = sqlx::query(
            r#"
            INSERT INTO medication
            (patient_id, medication_name, dosage, frequency, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patient_id)
        .bind(&prescription.medication_name)
        .bind(&prescription.dose)
        .bind(&prescription.frequency)
        .bind(prescription.start_date)
        .bind(prescription.end_date)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.into())
    }

    async fn list_medications(&self, patient_id: u64) -> Result<Vec<Medication>> {
        let rows = sqlx::query_as::<_, Medication>(&format!(
            "SELECT {} FROM medication WHERE patient_id = ? ORDER BY medication_id",
            MEDICATION_COLUMNS
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }

    async fn close(&self) {
        db::close_pool(&self.pool).await;
    }
}
