use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use anyhow::Context;
use rand::rngs::OsRng;
use tracing::error;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Verified against when a login names no known user, so both branches do
/// the same argon2 work. Parameters match `Argon2::default()`.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$RAUqScBeHvT36lj3fhxdcw$LWhf2zqBfy84Tfo7+8nRzKPj/ZCH143Ri4Y5T8y97k0";

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password12", "password123", "passw0rd", "12345678",
    "123456789", "1234567890", "87654321", "11111111", "00000000", "qwerty123",
    "qwertyuiop", "iloveyou", "sunshine", "princess", "football", "baseball",
    "welcome1", "abc12345", "letmein1", "trustno1", "superman", "starwars",
    "admin123", "changeme", "whatever", "computer", "internet", "monkey123",
];

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// `hash_password` on the blocking pool.
pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task failed")?
}

/// `verify_password` on the blocking pool. With no stored hash it checks
/// against `DUMMY_HASH` and always yields `false`.
pub async fn verify_password_blocking(plain: String, hash: Option<String>) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&plain, &hash),
        None => verify_password(&plain, DUMMY_HASH).map(|_| false),
    })
    .await
    .context("password verification task failed")?
}

/// Strength rules applied to a new password. Returns every failed rule.
pub fn validate_strength(password: &str, username: &str, email: &str) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    let len = password.chars().count();

    if len < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }
    if len > MAX_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too long. It must contain at most {MAX_PASSWORD_LENGTH} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }

    let email_local = email.split('@').next().unwrap_or_default();
    for (attr, value) in [("username", username), ("email address", email_local)] {
        if too_similar(&lowered, &value.to_lowercase()) {
            problems.push(format!("The password is too similar to the {attr}."));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn too_similar(password: &str, attribute: &str) -> bool {
    if attribute.chars().count() < 3 || password.chars().count() < 3 {
        return false;
    }
    password.contains(attribute) || attribute.contains(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn dummy_hash_parses_with_default_params() {
        let parsed = PasswordHash::new(DUMMY_HASH).expect("dummy hash should parse");
        let fresh = hash_password("anything").unwrap();
        let fresh = PasswordHash::new(&fresh).unwrap();
        assert_eq!(parsed.algorithm.as_str(), fresh.algorithm.as_str());
        assert_eq!(parsed.params.to_string(), fresh.params.to_string());
    }

    #[tokio::test]
    async fn blocking_helpers_hash_and_verify() {
        let hash = hash_password_blocking("pw-on-pool".into()).await.unwrap();
        assert!(verify_password_blocking("pw-on-pool".into(), Some(hash.clone())).await.unwrap());
        assert!(!verify_password_blocking("other".into(), Some(hash)).await.unwrap());
    }

    #[tokio::test]
    async fn verify_without_stored_hash_is_false() {
        assert!(!verify_password_blocking("password123".into(), None).await.unwrap());
    }

    #[test]
    fn strength_accepts_reasonable_password() {
        assert!(validate_strength("new_password123", "testuser", "test@example.com").is_ok());
    }

    #[test]
    fn strength_reports_short_and_numeric() {
        let problems = validate_strength("1234", "alice", "").unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("too short"));
        assert!(problems[1].contains("entirely numeric"));
    }

    #[test]
    fn strength_rejects_common_password_case_insensitively() {
        let problems = validate_strength("PassWord123", "alice", "").unwrap_err();
        assert_eq!(problems, vec!["This password is too common.".to_string()]);
    }

    #[test]
    fn strength_rejects_password_containing_username_or_email() {
        let problems = validate_strength("xXalicewonderXx", "AliceWonder", "").unwrap_err();
        assert!(problems[0].contains("username"));

        let problems = validate_strength("mailbox-owner-9", "zed", "mailbox-owner@example.com")
            .unwrap_err();
        assert!(problems[0].contains("email address"));
    }

    #[test]
    fn short_attributes_do_not_trigger_similarity() {
        assert!(validate_strength("bo-river-stone", "bo", "").is_ok());
    }
}
