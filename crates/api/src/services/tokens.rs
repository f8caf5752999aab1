//! Token lifecycle: issuance, validation, and single-use consumption of
//! opaque tokens for email verification and password reset.
//!
//! Both purposes share the `verification_tokens` table; reset identifiers
//! carry a `reset_` prefix so the two populations cannot be confused.
//! Issuing deletes prior tokens for the subject first (supersession), so
//! at most one token per subject per purpose is live at a time.
//!
//! Security notes:
//! - Tokens are 32 random bytes, hex-encoded, with no decodable structure
//! - `validate` does not consume; "is this link still good" is safe to ask
//!   repeatedly before showing a form
//! - Missing, expired, and already-consumed tokens are indistinguishable
//!   to callers, so probing reveals nothing

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::repos::VerificationTokenRepo;

const RESET_IDENTIFIER_PREFIX: &str = "reset_";

/// What a token is for. Determines the identifier convention under which
/// it is stored and looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    /// Storage identifier for a subject email under this purpose.
    pub fn identifier(&self, email: &str) -> String {
        let email = email.to_lowercase();
        match self {
            TokenPurpose::EmailVerification => email,
            TokenPurpose::PasswordReset => format!("{RESET_IDENTIFIER_PREFIX}{email}"),
        }
    }

    fn matches(&self, identifier: &str) -> bool {
        let is_reset = identifier.starts_with(RESET_IDENTIFIER_PREFIX);
        match self {
            TokenPurpose::EmailVerification => !is_reset,
            TokenPurpose::PasswordReset => is_reset,
        }
    }

    fn subject(&self, identifier: &str) -> String {
        match self {
            TokenPurpose::EmailVerification => identifier.to_string(),
            TokenPurpose::PasswordReset => identifier
                .strip_prefix(RESET_IDENTIFIER_PREFIX)
                .unwrap_or(identifier)
                .to_string(),
        }
    }
}

/// A freshly issued token. The plaintext is delivered to the subject once
/// and never stored anywhere else.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// A token that passed validation. `identifier` is the storage key to
/// pass to [`TokenLifecycle::consume`]; `email` is the subject.
#[derive(Debug)]
pub struct ValidatedToken {
    pub identifier: String,
    pub email: String,
}

/// Issues, validates, and consumes verification tokens against the
/// durable token store.
#[derive(Clone)]
pub struct TokenLifecycle {
    tokens: Arc<dyn VerificationTokenRepo>,
}

impl TokenLifecycle {
    pub fn new(tokens: Arc<dyn VerificationTokenRepo>) -> Self {
        Self { tokens }
    }

    /// Generate and persist a token for the subject, superseding any
    /// previously issued token for the same `(subject, purpose)`.
    /// Persistence failures propagate; no token is half-created.
    pub async fn issue(
        &self,
        email: &str,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let identifier = purpose.identifier(email);

        // Supersession: only the most recently issued token stays valid.
        self.tokens.delete_for_identifier(&identifier).await?;

        let token = generate_token();
        let expires = Utc::now() + ttl;
        self.tokens.create(&identifier, &token, expires).await?;

        Ok(IssuedToken { token, expires })
    }

    /// Look up a non-expired token under the purpose's identifier
    /// convention. Does not consume; returns None for missing, expired,
    /// and wrong-purpose tokens alike.
    pub async fn validate(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<ValidatedToken>> {
        let Some(record) = self.tokens.find_valid(token).await? else {
            return Ok(None);
        };

        if !purpose.matches(&record.identifier) {
            return Ok(None);
        }

        Ok(Some(ValidatedToken {
            email: purpose.subject(&record.identifier),
            identifier: record.identifier,
        }))
    }

    /// Delete the exact `(identifier, token)` record, plus any other
    /// outstanding tokens for the identifier (a second token may have been
    /// issued concurrently). Returns false if the record no longer exists -
    /// already consumed or expired out from under the caller.
    pub async fn consume(&self, token: &str, identifier: &str) -> Result<bool> {
        let existed = self.tokens.delete(identifier, token).await?;

        if existed {
            self.tokens.delete_for_identifier(identifier).await?;
        }

        Ok(existed)
    }
}

/// 32 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryTokenRepo;

    fn lifecycle() -> (TokenLifecycle, Arc<InMemoryTokenRepo>) {
        let repo = Arc::new(InMemoryTokenRepo::default());
        (TokenLifecycle::new(repo.clone()), repo)
    }

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn reset_identifier_is_prefixed_and_lowercased() {
        assert_eq!(
            TokenPurpose::PasswordReset.identifier("Alice@Example.COM"),
            "reset_alice@example.com"
        );
        assert_eq!(
            TokenPurpose::EmailVerification.identifier("Alice@Example.COM"),
            "alice@example.com"
        );
    }

    #[tokio::test]
    async fn issue_then_validate_returns_subject() {
        let (lifecycle, _) = lifecycle();

        let issued = lifecycle
            .issue("alice@example.com", TokenPurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();

        let validated = lifecycle
            .validate(&issued.token, TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .expect("token should be valid");

        assert_eq!(validated.email, "alice@example.com");
        assert_eq!(validated.identifier, "reset_alice@example.com");
    }

    #[tokio::test]
    async fn validate_is_repeatable_without_consuming() {
        let (lifecycle, _) = lifecycle();

        let issued = lifecycle
            .issue("alice@example.com", TokenPurpose::EmailVerification, Duration::hours(24))
            .await
            .unwrap();

        for _ in 0..3 {
            assert!(lifecycle
                .validate(&issued.token, TokenPurpose::EmailVerification)
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn validate_rejects_wrong_purpose() {
        let (lifecycle, _) = lifecycle();

        let issued = lifecycle
            .issue("alice@example.com", TokenPurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();

        assert!(lifecycle
            .validate(&issued.token, TokenPurpose::EmailVerification)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn validate_rejects_expired_token() {
        let (lifecycle, repo) = lifecycle();

        repo.create(
            "alice@example.com",
            "deadbeef",
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();

        assert!(lifecycle
            .validate("deadbeef", TokenPurpose::EmailVerification)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn second_issue_supersedes_the_first() {
        let (lifecycle, _) = lifecycle();

        let first = lifecycle
            .issue("alice@example.com", TokenPurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();
        let second = lifecycle
            .issue("alice@example.com", TokenPurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();

        assert!(lifecycle
            .validate(&first.token, TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .is_none());
        assert!(lifecycle
            .validate(&second.token, TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let (lifecycle, _) = lifecycle();

        let issued = lifecycle
            .issue("alice@example.com", TokenPurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();
        let validated = lifecycle
            .validate(&issued.token, TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .unwrap();

        assert!(lifecycle
            .consume(&issued.token, &validated.identifier)
            .await
            .unwrap());

        // The token is gone: validation fails and a second consume fails
        assert!(lifecycle
            .validate(&issued.token, TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .is_none());
        assert!(!lifecycle
            .consume(&issued.token, &validated.identifier)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn consume_clears_concurrent_tokens_for_the_subject() {
        let (lifecycle, repo) = lifecycle();
        let expires = Utc::now() + Duration::hours(1);

        // Two live tokens for the same identifier, as if issued by racing
        // requests before supersession could run.
        repo.create("reset_alice@example.com", "token-one", expires)
            .await
            .unwrap();
        repo.create("reset_alice@example.com", "token-two", expires)
            .await
            .unwrap();

        assert!(lifecycle
            .consume("token-one", "reset_alice@example.com")
            .await
            .unwrap());

        assert!(lifecycle
            .validate("token-two", TokenPurpose::PasswordReset)
            .await
            .unwrap()
            .is_none());
    }
}
