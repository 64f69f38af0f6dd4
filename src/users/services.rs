use tracing::{info, warn};

use crate::{
    auth::{
        jwt::{JwtKeys, TokenPair},
        password::{hash_password_blocking, verify_password_blocking},
    },
    error::ApiError,
    users::{
        dto::{ChangePasswordRequest, UserPayload},
        repo::UserStore,
        repo_types::{NewUser, User, UserChanges},
        serializer::{validate_password_change, validate_user, WriteMode},
    },
};

pub const OLD_PASSWORD_INCORRECT: &str = "Old password is not correct";

pub async fn create_user(store: &dyn UserStore, payload: UserPayload) -> Result<User, ApiError> {
    let fields = validate_user(payload, WriteMode::Create)?;
    let (Some(username), Some(password)) = (fields.username, fields.password) else {
        return Err(ApiError::bad_request("Invalid user payload"));
    };

    let password_hash = hash_password_blocking(password).await?;
    let user = store
        .create(NewUser {
            username,
            email: fields.email.unwrap_or_default(),
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Applies a PUT (`Replace`) or PATCH (`Partial`) to `target`.
pub async fn update_user(
    store: &dyn UserStore,
    target: &User,
    payload: UserPayload,
    mode: WriteMode,
) -> Result<User, ApiError> {
    let fields = validate_user(payload, mode)?;
    let password_hash = match fields.password {
        Some(password) => Some(hash_password_blocking(password).await?),
        None => None,
    };
    let changes = UserChanges {
        username: fields.username,
        email: fields.email,
        password_hash,
    };

    let updated = store
        .update(target.id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(user_id = %updated.id, ?mode, "user updated");
    Ok(updated)
}

pub async fn delete_user(store: &dyn UserStore, target: &User) -> Result<(), ApiError> {
    if !store.delete(target.id).await? {
        return Err(ApiError::NotFound);
    }
    info!(user_id = %target.id, "user deleted");
    Ok(())
}

/// Verifies the current password, stores the new one and revokes every
/// previously issued token. Returns a fresh pair for the caller's session.
pub async fn change_password(
    store: &dyn UserStore,
    keys: &JwtKeys,
    caller: &User,
    payload: ChangePasswordRequest,
) -> Result<(User, TokenPair), ApiError> {
    let change = validate_password_change(payload, caller)?;

    let current_ok =
        verify_password_blocking(change.current, Some(caller.password_hash.clone())).await?;
    if !current_ok {
        warn!(user_id = %caller.id, "password change with wrong current password");
        return Err(ApiError::bad_request(OLD_PASSWORD_INCORRECT));
    }

    let new_hash = hash_password_blocking(change.new).await?;
    let user = store
        .rotate_password(caller.id, &new_hash)
        .await?
        .ok_or(ApiError::NotFound)?;

    let tokens = keys.issue_pair(&user)?;
    info!(user_id = %user.id, "password changed");
    Ok((user, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::config::JwtConfig;
    use crate::users::memory::InMemoryUserStore;

    fn payload(username: &str, email: &str, password: &str) -> UserPayload {
        UserPayload {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn keys() -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    #[tokio::test]
    async fn create_hashes_password() {
        let store = InMemoryUserStore::new();
        let user = create_user(&store, payload("alice", "a@example.com", "password123"))
            .await
            .unwrap();
        assert_ne!(user.password_hash, "password123");
        assert!(verify_password("password123", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn duplicate_create_leaves_count_unchanged() {
        let store = InMemoryUserStore::new();
        create_user(&store, payload("alice", "", "pw")).await.unwrap();
        let err = create_user(&store, payload("alice", "", "pw")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let store = InMemoryUserStore::new();
        let user = create_user(&store, payload("alice", "a@example.com", "pw")).await.unwrap();
        let patch = UserPayload {
            username: Some("alicia".into()),
            ..Default::default()
        };
        let updated = update_user(&store, &user, patch, WriteMode::Partial).await.unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.email, "a@example.com");
        assert_eq!(updated.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn update_of_deleted_user_is_not_found() {
        let store = InMemoryUserStore::new();
        let user = create_user(&store, payload("alice", "", "pw")).await.unwrap();
        delete_user(&store, &user).await.unwrap();
        let err = update_user(&store, &user, UserPayload::default(), WriteMode::Partial)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert!(matches!(delete_user(&store, &user).await, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn change_password_rotates_hash_and_version() {
        let store = InMemoryUserStore::new();
        let user = create_user(&store, payload("testuser", "", "111")).await.unwrap();
        let req = ChangePasswordRequest {
            password: Some("111".into()),
            new_password: Some("new_password123".into()),
            new_password_confirm: Some("new_password123".into()),
        };
        let (updated, tokens) = change_password(&store, &keys(), &user, req).await.unwrap();
        assert!(verify_password("new_password123", &updated.password_hash).unwrap());
        assert_eq!(updated.token_version, user.token_version + 1);
        assert_eq!(keys().verify(&tokens.access_token).unwrap().ver, updated.token_version);
    }

    #[tokio::test]
    async fn change_password_with_wrong_current_is_bad_request() {
        let store = InMemoryUserStore::new();
        let user = create_user(&store, payload("testuser", "", "111")).await.unwrap();
        let req = ChangePasswordRequest {
            password: Some("222".into()),
            new_password: Some("new_password123".into()),
            new_password_confirm: Some("new_password123".into()),
        };
        match change_password(&store, &keys(), &user, req).await {
            Err(ApiError::BadRequest(detail)) => assert_eq!(detail, OLD_PASSWORD_INCORRECT),
            other => panic!("unexpected {other:?}"),
        }
        let stored = store.get(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, user.password_hash);
    }
}
