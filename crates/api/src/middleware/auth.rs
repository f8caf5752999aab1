//! Session authentication middleware.
//!
//! Usage: Add `AuthUser` as an extractor parameter to require a valid
//! session. The bearer token is digested with SHA-256 and looked up in the
//! sessions table, so the plaintext token never reaches storage.
//!
//! ```ignore
//! async fn my_handler(user: AuthUser, ...) -> ... {
//!     user.require_admin()?;
//! }
//! ```

use axum::{
    Json, RequestPartsExt,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{UserRole, UserStatus},
    state::AppState,
};

/// SHA-256 digest of a bearer token, hex-encoded.
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authenticated user extracted from a valid session token.
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
    /// Digest of the presented session token (logout deletes by this).
    pub token_hash: String,
}

impl AuthUser {
    /// Guard for user- and settings-management endpoints.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::External(
                StatusCode::FORBIDDEN,
                "Insufficient permissions",
            ))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken)?;

        let token_hash = digest_token(bearer.token());

        let user = state
            .repos
            .sessions
            .find_user_by_token_hash(&token_hash)
            .await
            .map_err(|e| {
                tracing::error!("session lookup failed: {:?}", e);
                AuthError::Internal
            })?
            .ok_or(AuthError::InvalidToken)?;

        // A suspension takes effect immediately, not at next login
        if user.status == UserStatus::Suspended {
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthUser {
            id: user.id,
            role: user.role,
            token_hash,
        })
    }
}

pub enum AuthError {
    MissingToken,
    InvalidToken,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = serde_json::json!({ "error": message });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::MockSessionRepo;
    use crate::test_utils::{mock_user, TestStateBuilder};
    use axum::http::Request;

    fn parts_with_bearer(token: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .uri("/")
            .header("authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn digest_is_stable_and_hex() {
        let a = digest_token("session-token");
        let b = digest_token("session-token");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, digest_token("other-token"));
    }

    #[test]
    fn only_admins_pass_the_admin_gate() {
        for (role, ok) in [
            (UserRole::Owner, true),
            (UserRole::Admin, true),
            (UserRole::Staff, false),
            (UserRole::Member, false),
        ] {
            let user = AuthUser {
                id: Uuid::new_v4(),
                role,
                token_hash: String::new(),
            };
            assert_eq!(user.require_admin().is_ok(), ok);
        }
    }

    #[tokio::test]
    async fn valid_session_resolves_user() {
        let user = mock_user("alice@example.com");
        let user_id = user.id;

        let mut sessions = MockSessionRepo::new();
        sessions
            .expect_find_user_by_token_hash()
            .returning(move |_| Ok(Some(user.clone())));

        let state = TestStateBuilder::new().with_session_repo(sessions).build();
        let mut parts = parts_with_bearer("some-token");

        let auth = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_or_else(|_| panic!("expected authenticated user"));

        assert_eq!(auth.id, user_id);
        assert_eq!(auth.token_hash, digest_token("some-token"));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let mut sessions = MockSessionRepo::new();
        sessions
            .expect_find_user_by_token_hash()
            .returning(|_| Ok(None));

        let state = TestStateBuilder::new().with_session_repo(sessions).build();
        let mut parts = parts_with_bearer("stale-token");

        let result = AuthUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn suspended_user_is_rejected() {
        let mut user = mock_user("alice@example.com");
        user.status = UserStatus::Suspended;

        let mut sessions = MockSessionRepo::new();
        sessions
            .expect_find_user_by_token_hash()
            .returning(move |_| Ok(Some(user.clone())));

        let state = TestStateBuilder::new().with_session_repo(sessions).build();
        let mut parts = parts_with_bearer("suspended-token");

        let result = AuthUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let state = TestStateBuilder::new().build();
        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }
}
