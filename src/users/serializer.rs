//! Field-level validation between the wire payloads and the store.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    auth::password::validate_strength,
    error::{ApiError, FieldErrors},
    users::{
        dto::{ChangePasswordRequest, UserPayload},
        repo_types::User,
    },
};

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match.";

const MAX_USERNAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Which write is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: username is required, omitted optional fields are kept.
    Replace,
    /// PATCH: omitted fields are left untouched.
    Partial,
}

/// Validated user fields. `None` means "leave unchanged"; the password is
/// still plain text here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub fn validate_user(payload: UserPayload, mode: WriteMode) -> Result<ValidatedUser, ApiError> {
    let mut errors = FieldErrors::new();
    let required = mode != WriteMode::Partial;

    let username = match payload.username.map(|u| u.trim().to_string()) {
        None if required => {
            errors.add("username", REQUIRED);
            None
        }
        None => None,
        Some(u) if u.is_empty() => {
            errors.add("username", BLANK);
            None
        }
        Some(u) => {
            if u.chars().count() > MAX_USERNAME_LENGTH {
                errors.add(
                    "username",
                    format!("Ensure this field has no more than {MAX_USERNAME_LENGTH} characters."),
                );
            } else if !USERNAME_RE.is_match(&u) {
                errors.add("username", INVALID_USERNAME);
            }
            Some(u)
        }
    };

    let email = match payload.email.map(|e| e.trim().to_string()) {
        None => None,
        Some(e) if e.is_empty() => Some(e),
        Some(e) => {
            if e.len() > MAX_EMAIL_LENGTH || !EMAIL_RE.is_match(&e) {
                errors.add("email", INVALID_EMAIL);
            }
            Some(normalize_email(&e))
        }
    };

    let password = match payload.password {
        None if mode == WriteMode::Create => {
            errors.add("password", REQUIRED);
            None
        }
        None => None,
        Some(p) if p.is_empty() => {
            errors.add("password", BLANK);
            None
        }
        Some(p) => Some(p),
    };

    errors.into_result()?;
    Ok(ValidatedUser {
        username,
        email,
        password,
    })
}

/// Lowercases the domain part, leaves the local part as given.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub current: String,
    pub new: String,
}

fn required_secret(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some(v) if v.is_empty() => {
            errors.add(field, BLANK);
            None
        }
        Some(v) => Some(v),
    }
}

/// Shape and strength checks only; the current password is verified by the
/// caller against the stored hash.
pub fn validate_password_change(
    payload: ChangePasswordRequest,
    user: &User,
) -> Result<PasswordChange, ApiError> {
    let mut errors = FieldErrors::new();
    let current = required_secret(&mut errors, "password", payload.password);
    let new = required_secret(&mut errors, "new_password", payload.new_password);
    let confirm = required_secret(&mut errors, "new_password_confirm", payload.new_password_confirm);

    if let (Some(new), Some(confirm)) = (&new, &confirm) {
        if new != confirm {
            errors.add("new_password_confirm", PASSWORDS_DO_NOT_MATCH);
        }
    }
    if let Some(new) = &new {
        if let Err(problems) = validate_strength(new, &user.username, &user.email) {
            errors.extend("new_password", problems);
        }
    }

    errors.into_result()?;
    match (current, new) {
        (Some(current), Some(new)) => Ok(PasswordChange { current, new }),
        _ => Err(ApiError::bad_request("Invalid password change request")),
    }
}
