//! Account factory
//!
//! Validates registration input and hashes passwords before anything reaches
//! the database.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use error::{AccountError, AppError, Result};

use crate::models::NewAccount;

/// Kind of account being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Doctor,
    Patient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::User => "user",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        };
        f.write_str(name)
    }
}

/// Validated account ready to be persisted.
#[derive(Debug, Clone)]
pub struct Account {
    pub first_name: String,
    pub last_name: String,
    /// Trimmed and lower-cased
    pub email: String,
    pub password_hash: String,
}

impl Account {
    /// Composite display name stored on `users.name`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Builds accounts from registration input.
#[allow(async_fn_in_trait)]
pub trait AccountFactory: Send + Sync {
    /// Validate the input and hash its password.
    async fn create(&self, role: Role, input: &NewAccount) -> Result<Account>;

    /// Check a plaintext password against a stored hash.
    fn verify(&self, password: &str, password_hash: &str) -> Result<bool>;
}

/// Account factory hashing with Argon2id.
#[derive(Clone)]
pub struct Argon2AccountFactory {
    argon2: Argon2<'static>,
}

impl Argon2AccountFactory {
    /// Factory with the crate's default Argon2id parameters.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Factory with explicit memory cost (KiB) and iteration count.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::Validation(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2AccountFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountFactory for Argon2AccountFactory {
    async fn create(&self, role: Role, input: &NewAccount) -> Result<Account> {
        let first_name = required(&input.first_name, "first_name")?;
        let last_name = required(&input.last_name, "last_name")?;
        let email = normalize_email(&input.email)?;
        if input.password.is_empty() {
            return Err(AccountError::MissingField("password".into()).into());
        }

        let argon2 = self.argon2.clone();
        let password = input.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&argon2, &password))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;

        tracing::debug!("Prepared {} account", role);

        Ok(Account {
            first_name,
            last_name,
            email,
            password_hash,
        })
    }

    fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AccountError::HashingFailed(e.to_string()))?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AccountError::HashingFailed(e.to_string()).into()),
        }
    }
}

fn required(value: &str, field: &str) -> std::result::Result<String, AccountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountError::MissingField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Trim and lower-case an email, rejecting anything that is not `local@domain`.
pub fn normalize_email(email: &str) -> std::result::Result<String, AccountError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AccountError::MissingField("email".into()));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AccountError::InvalidEmail(email));
    }
    Ok(email)
}

fn hash_password(argon2: &Argon2<'_>, password: &str) -> std::result::Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::HashingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> Argon2AccountFactory {
        Argon2AccountFactory::with_cost(1024, 1).unwrap()
    }

    #[tokio::test]
    async fn test_create_hashes_password() {
        let factory = factory();
        let input = NewAccount::new("Ann", "Lee", "ann@x.com", "pw");

        let account = factory.create(Role::Doctor, &input).await.unwrap();
        assert_ne!(account.password_hash, "pw");
        assert!(account.password_hash.starts_with("$argon2id$"));
        assert!(factory.verify("pw", &account.password_hash).unwrap());
        assert!(!factory.verify("wrong", &account.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_same_password_gets_distinct_salts() {
        let factory = factory();
        let input = NewAccount::new("Ann", "Lee", "ann@x.com", "pw");

        let a = factory.create(Role::User, &input).await.unwrap();
        let b = factory.create(Role::User, &input).await.unwrap();
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[tokio::test]
    async fn test_create_normalizes_fields() {
        let input = NewAccount::new("  Ann ", "Lee", " Ann@X.com ", "pw");
        let account = factory().create(Role::Patient, &input).await.unwrap();
        assert_eq!(account.first_name, "Ann");
        assert_eq!(account.email, "ann@x.com");
        assert_eq!(account.display_name(), "Ann Lee");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let factory = factory();

        let err = factory
            .create(Role::User, &NewAccount::new("", "Lee", "ann@x.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Account(AccountError::MissingField(f)) if f == "first_name"));

        let err = factory
            .create(Role::User, &NewAccount::new("Ann", "Lee", "ann@x.com", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Account(AccountError::MissingField(f)) if f == "password"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("ANN@x.com").unwrap(), "ann@x.com");
        assert!(matches!(normalize_email("ann"), Err(AccountError::InvalidEmail(_))));
        assert!(matches!(normalize_email("@x.com"), Err(AccountError::InvalidEmail(_))));
        assert!(matches!(normalize_email("a@b@c"), Err(AccountError::InvalidEmail(_))));
        assert!(matches!(normalize_email("a b@c.com"), Err(AccountError::InvalidEmail(_))));
        assert!(matches!(normalize_email("  "), Err(AccountError::MissingField(_))));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        let err = factory().verify("pw", "not-a-hash").unwrap_err();
        assert!(matches!(err, AppError::Account(AccountError::HashingFailed(_))));
    }

    #[test]
    fn test_with_cost_rejects_bad_params() {
        assert!(Argon2AccountFactory::with_cost(1, 0).is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Doctor.to_string(), "doctor");
        assert_eq!(Role::Patient.to_string(), "patient");
    }
}
