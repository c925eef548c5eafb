//! Authentication lookup capability.
//!
//! The lobby never touches account storage directly; it asks an
//! [`AuthLookup`] whether a bearer token maps to an unexpired auth record.

use async_trait::async_trait;

use super::error::AuthError;

/// Authenticated account identifier (the player's netid)
pub type AccountId = String;

/// Resolves bearer tokens to account ids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthLookup: Send + Sync {
    /// Account owning `token`, if an auth record exists whose expiry is after `now` (epoch ms).
    async fn lookup(&self, token: &str, now: i64) -> Result<Option<AccountId>, AuthError>;
}

/// Blank tokens never reach storage.
pub fn is_placeholder_token(token: &str) -> bool {
    token.trim().is_empty()
}

/// Look `token` up, short-circuiting placeholder tokens as a miss.
pub async fn resolve_token(
    auth: &dyn AuthLookup,
    token: &str,
    now: i64,
) -> Result<Option<AccountId>, AuthError> {
    if is_placeholder_token(token) {
        return Ok(None);
    }
    auth.lookup(token, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_resolve_token_skips_storage_for_blank_token() {
        // テスト項目: 空のトークンはストレージに問い合わせずに不一致となる
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup().never();

        // when (操作):
        let empty = resolve_token(&auth, "", 0).await;
        let spaces = resolve_token(&auth, "   ", 0).await;

        // then (期待する結果):
        assert_eq!(empty, Ok(None));
        assert_eq!(spaces, Ok(None));
    }

    #[tokio::test]
    async fn test_resolve_token_delegates_to_lookup() {
        // テスト項目: 通常のトークンは現在時刻と共にルックアップへ渡される
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup()
            .with(eq("ABCDEF"), eq(5_000))
            .times(1)
            .returning(|_, _| Ok(Some("alice".to_string())));

        // when (操作):
        let result = resolve_token(&auth, "ABCDEF", 5_000).await;

        // then (期待する結果):
        assert_eq!(result, Ok(Some("alice".to_string())));
    }

    #[tokio::test]
    async fn test_resolve_token_propagates_storage_error() {
        // テスト項目: ストレージ障害はエラーとして呼び出し元に返る
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup()
            .returning(|_, _| Err(AuthError::Unavailable("db locked".to_string())));

        // when (操作):
        let result = resolve_token(&auth, "ABCDEF", 0).await;

        // then (期待する結果):
        assert_eq!(result, Err(AuthError::Unavailable("db locked".to_string())));
    }
}
