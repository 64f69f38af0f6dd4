//! Access policies. Each view picks one policy value; handlers call
//! [`check_permission`] before loading the target and
//! [`check_object_permission`] once it is loaded.

use axum::http::Method;
use tracing::warn;

use crate::{error::ApiError, users::repo_types::User};

pub trait Permission: Send + Sync {
    /// View-level check, before any object is loaded.
    fn has_permission(&self, method: &Method, caller: Option<&User>) -> bool;

    /// Object-level check against the loaded target.
    fn has_object_permission(&self, method: &Method, caller: Option<&User>, target: &User)
        -> bool;
}

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAny;

impl Permission for AllowAny {
    fn has_permission(&self, _: &Method, _: Option<&User>) -> bool {
        true
    }

    fn has_object_permission(&self, _: &Method, _: Option<&User>, _: &User) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, _: &Method, caller: Option<&User>) -> bool {
        caller.is_some()
    }

    fn has_object_permission(&self, _: &Method, caller: Option<&User>, _: &User) -> bool {
        caller.is_some()
    }
}

/// Reads for everyone, writes only on one's own record.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsSelfOrReadOnly;

impl Permission for IsSelfOrReadOnly {
    fn has_permission(&self, method: &Method, caller: Option<&User>) -> bool {
        is_safe_method(method) || caller.is_some()
    }

    fn has_object_permission(&self, method: &Method, caller: Option<&User>, target: &User) -> bool {
        is_safe_method(method) || caller.is_some_and(|c| c.id == target.id)
    }
}

fn denied(caller: Option<&User>) -> ApiError {
    match caller {
        None => ApiError::unauthorized("Authentication credentials were not provided."),
        Some(_) => ApiError::forbidden("You do not have permission to perform this action."),
    }
}

pub fn check_permission(
    policy: &dyn Permission,
    method: &Method,
    caller: Option<&User>,
) -> Result<(), ApiError> {
    if policy.has_permission(method, caller) {
        Ok(())
    } else {
        Err(denied(caller))
    }
}

pub fn check_object_permission(
    policy: &dyn Permission,
    method: &Method,
    caller: Option<&User>,
    target: &User,
) -> Result<(), ApiError> {
    if policy.has_object_permission(method, caller, target) {
        return Ok(());
    }
    warn!(
        caller = ?caller.map(|c| c.id),
        target = %target.id,
        %method,
        "permission denied"
    );
    Err(denied(caller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user(name: &str) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: name.into(),
            email: String::new(),
            password_hash: String::new(),
            token_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    const WRITES: [Method; 3] = [Method::PUT, Method::PATCH, Method::DELETE];

    #[test]
    fn reads_are_always_allowed() {
        let target = user("target");
        let other = user("other");
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(IsSelfOrReadOnly.has_permission(&method, None));
            assert!(IsSelfOrReadOnly.has_object_permission(&method, None, &target));
            assert!(IsSelfOrReadOnly.has_object_permission(&method, Some(&other), &target));
        }
    }

    #[test]
    fn writes_need_owner() {
        let target = user("target");
        let other = user("other");
        for method in WRITES {
            assert!(!IsSelfOrReadOnly.has_permission(&method, None));
            assert!(IsSelfOrReadOnly.has_permission(&method, Some(&other)));
            assert!(IsSelfOrReadOnly.has_object_permission(&method, Some(&target), &target));
            assert!(!IsSelfOrReadOnly.has_object_permission(&method, Some(&other), &target));
        }
    }

    #[test]
    fn anonymous_write_is_401_and_non_owner_is_403() {
        let target = user("target");
        let other = user("other");

        let err = check_permission(&IsSelfOrReadOnly, &Method::PUT, None).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = check_object_permission(&IsSelfOrReadOnly, &Method::DELETE, Some(&other), &target)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn is_authenticated_rejects_anonymous_reads() {
        assert!(!IsAuthenticated.has_permission(&Method::GET, None));
        assert!(IsAuthenticated.has_permission(&Method::GET, Some(&user("a"))));
        assert!(AllowAny.has_permission(&Method::DELETE, None));
    }
}
