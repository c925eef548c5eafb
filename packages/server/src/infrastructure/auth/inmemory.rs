//! In-memory auth record store.
//!
//! Stands in for the `auth` table of the account database: each record maps
//! a bearer token to an account id and an expiry (epoch ms).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AccountId, AuthError, AuthLookup};

#[derive(Debug, Clone)]
struct AuthRecord {
    account_id: AccountId,
    expire: i64,
}

/// Token → account map
#[derive(Debug, Default)]
pub struct InMemoryAuthStore {
    records: Mutex<HashMap<String, AuthRecord>>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token` for `account_id`, valid until `expire` (exclusive)
    pub async fn add_auth(&self, account_id: &str, token: &str, expire: i64) {
        let mut records = self.records.lock().await;
        records.insert(
            token.to_string(),
            AuthRecord {
                account_id: account_id.to_string(),
                expire,
            },
        );
        tracing::debug!("Auth record added for '{}'", account_id);
    }
}

#[async_trait]
impl AuthLookup for InMemoryAuthStore {
    async fn lookup(&self, token: &str, now: i64) -> Result<Option<AccountId>, AuthError> {
        let records = self.records.lock().await;
        Ok(records
            .get(token)
            .filter(|record| record.expire > now)
            .map(|record| record.account_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_hit() {
        // テスト項目: 有効期限内のトークンはアカウント ID に解決される
        // given (前提条件):
        let store = InMemoryAuthStore::new();
        store.add_auth("alice", "ABCD", 2_000).await;

        // when (操作):
        let result = store.lookup("ABCD", 1_000).await;

        // then (期待する結果):
        assert_eq!(result, Ok(Some("alice".to_string())));
    }

    #[tokio::test]
    async fn test_lookup_expired_and_unknown() {
        // テスト項目: 期限切れ（期限ちょうどを含む）と未知のトークンは不一致
        // given (前提条件):
        let store = InMemoryAuthStore::new();
        store.add_auth("alice", "ABCD", 2_000).await;

        // when (操作):
        let at_expiry = store.lookup("ABCD", 2_000).await;
        let unknown = store.lookup("ZZZZ", 0).await;

        // then (期待する結果):
        assert_eq!(at_expiry, Ok(None));
        assert_eq!(unknown, Ok(None));
    }
}
