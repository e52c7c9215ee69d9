//! Records models
//!
//! Row types read from the database and the payloads used to create them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlQueryResult;
use sqlx::FromRow;

/// Registration payload for a user, doctor or patient.
///
/// The password is plaintext here; it is hashed before anything is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl NewAccount {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Registration payload for a patient, optionally assigned to a doctor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    #[serde(flatten)]
    pub account: NewAccount,
    #[serde(default)]
    pub primary_doctor_id: Option<u64>,
}

impl NewPatient {
    pub fn new(account: NewAccount) -> Self {
        Self {
            account,
            primary_doctor_id: None,
        }
    }

    /// Assign the patient's primary doctor.
    pub fn with_primary_doctor(mut self, doctor_id: u64) -> Self {
        self.primary_doctor_id = Some(doctor_id);
        self
    }
}

impl From<NewAccount> for NewPatient {
    fn from(account: NewAccount) -> Self {
        Self::new(account)
    }
}

/// Prescription payload as sent by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrescription {
    pub medication_name: String,
    pub dose: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    /// `None` for an open-ended prescription
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Metadata returned by an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertResult {
    /// Generated identifier of the inserted row
    pub insert_id: u64,
    pub rows_affected: u64,
}

impl From<MySqlQueryResult> for InsertResult {
    fn from(result: MySqlQueryResult) -> Self {
        Self {
            insert_id: result.last_insert_id(),
            rows_affected: result.rows_affected(),
        }
    }
}

/// Row in `users`.
///
/// Every row carries `email`. Rows created by `create_user` also carry names;
/// rows created for a doctor or patient carry `username` (their email) and the
/// display `name`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub user_id: u64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password: String,
    pub name: Option<String>,
}

/// Row in `doctors`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Doctor {
    pub doctor_id: u64,
    pub user_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Row in `patients`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Patient {
    pub patient_id: u64,
    pub user_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub primary_doctor_id: Option<u64>,
}

/// Row in `medication`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Medication {
    pub medication_id: u64,
    pub patient_id: u64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescription_uses_camel_case() {
        let json = r#"{
            "medicationName": "Amoxicillin",
            "dose": "500mg",
            "frequency": "3x daily",
            "startDate": "2024-01-15",
            "endDate": "2024-01-25"
        }"#;
        let prescription: NewPrescription = serde_json::from_str(json).unwrap();
        assert_eq!(prescription.medication_name, "Amoxicillin");
        assert_eq!(prescription.dose, "500mg");
        assert_eq!(
            prescription.end_date,
            NaiveDate::from_ymd_opt(2024, 1, 25)
        );
    }

    #[test]
    fn test_prescription_end_date_optional() {
        let json = r#"{
            "medicationName": "Metformin",
            "dose": "850mg",
            "frequency": "daily",
            "startDate": "2024-03-01"
        }"#;
        let prescription: NewPrescription = serde_json::from_str(json).unwrap();
        assert!(prescription.end_date.is_none());
    }

    #[test]
    fn test_patient_payload_flattens_account() {
        let json = r#"{
            "first_name": "Sam",
            "last_name": "Park",
            "email": "sam@x.com",
            "password": "pw",
            "primary_doctor_id": 7
        }"#;
        let patient: NewPatient = serde_json::from_str(json).unwrap();
        assert_eq!(patient.account.email, "sam@x.com");
        assert_eq!(patient.primary_doctor_id, Some(7));
    }

    #[test]
    fn test_user_password_not_serialized() {
        let user = User {
            user_id: 1,
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            email: Some("ann@x.com".into()),
            username: None,
            password: "$argon2id$v=19$...".into(),
            name: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "ann@x.com");
    }
}
