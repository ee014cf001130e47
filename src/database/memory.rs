//! In-memory Store
//!
//! Process-local implementation of the store traits. Enforces the same
//! uniqueness rules as the PostgreSQL schema, which makes it suitable for
//! tests and for running the service without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use super::store::{
    AccountStore, ResetRequestStore, SettingsStore, StoreError, StoreResult, SubscriptionStore,
};
use crate::models::{Account, AccountWithPassword, OAuthProvider, PasswordResetRequest, Role, Subscriber};

#[derive(Default)]
struct StoreData {
    accounts: HashMap<Uuid, AccountWithPassword>,
    resets: HashMap<Uuid, PasswordResetRequest>,
    settings: HashMap<Uuid, JsonValue>,
    subscribers: Vec<Subscriber>,
}

impl StoreData {
    /// Rejects `account` if another record already owns its email or a provider id
    fn check_unique(&self, account: &Account) -> StoreResult<()> {
        for other in self.accounts.values().map(|r| &r.account) {
            if other.id == account.id {
                continue;
            }
            if other.email == account.email {
                return Err(StoreError::UniqueViolation("email".into()));
            }
            for provider in OAuthProvider::ALL {
                let mine = account.provider_link(provider).map(|l| l.id.as_str());
                let theirs = other.provider_link(provider).map(|l| l.id.as_str());
                if mine.is_some() && mine == theirs {
                    return Err(StoreError::UniqueViolation(provider.as_str().into()));
                }
            }
        }
        Ok(())
    }
}

/// In-memory storage implementation (useful for testing)
#[derive(Default)]
pub struct MemoryStore {
    data: TokioMutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a subscription record; subscriptions are written by billing, not by this service
    pub async fn add_subscriber(&self, subscriber: Subscriber) {
        self.data.lock().await.subscribers.push(subscriber);
    }

    pub async fn account_count(&self) -> usize {
        self.data.lock().await.accounts.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AccountWithPassword>> {
        Ok(self.data.lock().await.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<AccountWithPassword>> {
        let data = self.data.lock().await;
        Ok(data
            .accounts
            .values()
            .find(|r| r.account.email == email)
            .cloned())
    }

    async fn find_by_any_email(
        &self,
        emails: &[String],
    ) -> StoreResult<Option<AccountWithPassword>> {
        let data = self.data.lock().await;
        Ok(emails.iter().find_map(|email| {
            data.accounts
                .values()
                .find(|r| &r.account.email == email)
                .cloned()
        }))
    }

    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> StoreResult<Option<AccountWithPassword>> {
        let data = self.data.lock().await;
        Ok(data
            .accounts
            .values()
            .find(|r| {
                r.account
                    .provider_link(provider)
                    .is_some_and(|link| link.id == provider_id)
            })
            .cloned())
    }

    async fn find_by_linkage_code(&self, code: &str, role: Role) -> StoreResult<Vec<Account>> {
        let data = self.data.lock().await;
        let mut matches: Vec<Account> = data
            .accounts
            .values()
            .filter(|r| r.account.role == role && r.account.linkage_code.as_deref() == Some(code))
            .map(|r| r.account.clone())
            .collect();
        matches.sort_by_key(|a| a.created_at);
        Ok(matches)
    }

    async fn search(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Account>, u64)> {
        let needle = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let data = self.data.lock().await;
        let mut matches: Vec<Account> = data
            .accounts
            .values()
            .map(|r| &r.account)
            .filter(|a| match &needle {
                Some(n) => a.name.to_lowercase().contains(n) || a.email.contains(n),
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert(&self, record: &AccountWithPassword) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.accounts.contains_key(&record.account.id) {
            return Err(StoreError::UniqueViolation("id".into()));
        }
        data.check_unique(&record.account)?;
        data.accounts.insert(record.account.id, record.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        data.check_unique(account)?;
        let record = data
            .accounts
            .get_mut(&account.id)
            .ok_or(StoreError::NotFound)?;
        record.account = account.clone();
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let record = data.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.password_hash = Some(password_hash.to_string());
        record.account.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut data = self.data.lock().await;
        let removed = data.accounts.remove(&id).is_some();
        if removed {
            data.resets.retain(|_, r| r.account_id != id);
            data.settings.remove(&id);
            data.subscribers.retain(|s| s.account_id != id);
        }
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ResetRequestStore for MemoryStore {
    async fn find_unconsumed_by_account(
        &self,
        account_id: Uuid,
    ) -> StoreResult<Option<PasswordResetRequest>> {
        let data = self.data.lock().await;
        Ok(data
            .resets
            .values()
            .filter(|r| r.account_id == account_id && !r.consumed)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert(&self, request: &PasswordResetRequest) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let open_exists = data
            .resets
            .values()
            .any(|r| r.account_id == request.account_id && !r.consumed);
        if open_exists && !request.consumed {
            return Err(StoreError::UniqueViolation("password_reset".into()));
        }
        data.resets.insert(request.id, request.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.data.lock().await.resets.remove(&id);
        Ok(())
    }

    async fn mark_consumed(&self, id: Uuid) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        match data.resets.get_mut(&id) {
            Some(request) if !request.consumed => {
                request.consumed = true;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_or_create(&self, account_id: Uuid) -> StoreResult<JsonValue> {
        let mut data = self.data.lock().await;
        Ok(data
            .settings
            .entry(account_id)
            .or_insert_with(|| JsonValue::Object(Default::default()))
            .clone())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<Subscriber>> {
        let data = self.data.lock().await;
        Ok(data
            .subscribers
            .iter()
            .rev()
            .find(|s| s.account_id == account_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderLink;

    fn record(email: &str) -> AccountWithPassword {
        AccountWithPassword {
            account: Account::new(email.into(), "Test".into(), Role::Patient),
            password_hash: None,
        }
    }

    fn google(id: &str) -> Option<ProviderLink> {
        Some(ProviderLink {
            id: id.into(),
            access_token: None,
            display_name: None,
            photo_url: None,
        })
    }

    #[tokio::test]
    async fn test_email_uniqueness() {
        let store = MemoryStore::new();
        AccountStore::insert(&store, &record("a@x.com")).await.unwrap();

        let err = AccountStore::insert(&store, &record("a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(ref f) if f == "email"));
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_provider_id_uniqueness_on_update() {
        let store = MemoryStore::new();
        let mut first = record("a@x.com");
        first.account.google = google("g-1");
        AccountStore::insert(&store, &first).await.unwrap();

        let mut second = record("b@x.com");
        AccountStore::insert(&store, &second).await.unwrap();

        second.account.google = google("g-1");
        let err = store.update(&second.account).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(ref f) if f == "google"));

        let found = store
            .find_by_provider_id(OAuthProvider::Google, "g-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.account.id, first.account.id);
    }

    #[tokio::test]
    async fn test_find_by_any_email_prefers_earlier_entries() {
        let store = MemoryStore::new();
        let a = record("a@x.com");
        let b = record("b@x.com");
        AccountStore::insert(&store, &a).await.unwrap();
        AccountStore::insert(&store, &b).await.unwrap();

        let found = store
            .find_by_any_email(&["zzz@x.com".into(), "b@x.com".into(), "a@x.com".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.account.id, b.account.id);
        assert!(store.find_by_any_email(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_and_pagination() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut r = record(&format!("user{}@x.com", i));
            r.account.name = format!("Name {}", i);
            AccountStore::insert(&store, &r).await.unwrap();
        }

        let (page, total) = store.search(None, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (page, total) = store.search(Some("USER3"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].email, "user3@x.com");
    }

    #[tokio::test]
    async fn test_single_open_reset_request() {
        let store = MemoryStore::new();
        let account_id = Uuid::new_v4();
        let first = PasswordResetRequest::new(account_id, "h1".into(), chrono::Duration::hours(1));
        ResetRequestStore::insert(&store, &first).await.unwrap();

        let second = PasswordResetRequest::new(account_id, "h2".into(), chrono::Duration::hours(1));
        assert!(ResetRequestStore::insert(&store, &second).await.is_err());

        store.mark_consumed(first.id).await.unwrap();
        assert!(matches!(
            store.mark_consumed(first.id).await,
            Err(StoreError::NotFound)
        ));
        ResetRequestStore::insert(&store, &second).await.unwrap();
        let open = store.find_unconsumed_by_account(account_id).await.unwrap();
        assert_eq!(open.map(|r| r.id), Some(second.id));
    }

    #[tokio::test]
    async fn test_settings_created_once() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get_or_create(id).await.unwrap(), serde_json::json!({}));
        assert_eq!(store.get_or_create(id).await.unwrap(), serde_json::json!({}));
    }
}
