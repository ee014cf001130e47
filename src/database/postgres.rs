//! PostgreSQL Store
//!
//! Implements every store trait over a single connection pool. Each query is
//! bounded by the configured timeout and unique violations are translated to
//! the field they protect.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::connection::DatabasePool;
use super::store::{
    AccountStore, ResetRequestStore, SettingsStore, StoreError, StoreResult, SubscriptionStore,
};
use crate::models::{
    Account, AccountWithPassword, Location, OAuthProvider, PasswordResetRequest, Product,
    ProviderLink, Role, Subscriber,
};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, name, birthdate, role, matricule, \
     locale, location, is_first_login, is_admin, facebook, google, apple, created_at, updated_at";

/// Provider slot as persisted; unlike the API model it keeps the access token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProviderLink {
    id: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl From<&ProviderLink> for StoredProviderLink {
    fn from(link: &ProviderLink) -> Self {
        Self {
            id: link.id.clone(),
            access_token: link.access_token.clone(),
            display_name: link.display_name.clone(),
            photo_url: link.photo_url.clone(),
        }
    }
}

impl From<StoredProviderLink> for ProviderLink {
    fn from(link: StoredProviderLink) -> Self {
        Self {
            id: link.id,
            access_token: link.access_token,
            display_name: link.display_name,
            photo_url: link.photo_url,
        }
    }
}

fn stored_link(link: &Option<ProviderLink>) -> Option<Json<StoredProviderLink>> {
    link.as_ref().map(|l| Json(StoredProviderLink::from(l)))
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: Option<String>,
    name: String,
    birthdate: Option<NaiveDate>,
    role: String,
    matricule: Option<String>,
    locale: Option<String>,
    location: Option<Json<Location>>,
    is_first_login: bool,
    is_admin: bool,
    facebook: Option<Json<StoredProviderLink>>,
    google: Option<Json<StoredProviderLink>>,
    apple: Option<Json<StoredProviderLink>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for AccountWithPassword {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(StoreError::Corrupt)?;

        Ok(AccountWithPassword {
            account: Account {
                id: row.id,
                email: row.email,
                name: row.name,
                birthdate: row.birthdate,
                role,
                linkage_code: row.matricule,
                locale: row.locale,
                location: row.location.map(|l| l.0),
                is_first_login: row.is_first_login,
                is_admin: row.is_admin,
                facebook: row.facebook.map(|l| l.0.into()),
                google: row.google.map(|l| l.0.into()),
                apple: row.apple.map(|l| l.0.into()),
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            password_hash: row.password_hash,
        })
    }
}

#[derive(Debug, FromRow)]
struct SubscriberRow {
    id: Uuid,
    account_id: Uuid,
    status: String,
    expiry_date: Option<DateTime<Utc>>,
    product_title: Option<String>,
    product_billing_period: Option<String>,
    product_price: Option<f64>,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        let has_product = row.product_title.is_some()
            || row.product_billing_period.is_some()
            || row.product_price.is_some();

        Subscriber {
            id: row.id,
            account_id: row.account_id,
            status: row.status,
            expiry_date: row.expiry_date,
            product: has_product.then_some(Product {
                title: row.product_title,
                billing_period: row.product_billing_period,
                price: row.product_price,
            }),
        }
    }
}

/// Maps a named unique constraint to the field it guards
fn constraint_field(constraint: &str) -> &'static str {
    match constraint {
        "accounts_email_key" => "email",
        "accounts_facebook_id_key" => "facebook",
        "accounts_google_id_key" => "google",
        "accounts_apple_id_key" => "apple",
        "password_resets_one_open_idx" => "password_reset",
        _ => "record",
    }
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
            let field = db_error.constraint().map(constraint_field).unwrap_or("record");
            StoreError::UniqueViolation(field.to_string())
        }
        other => StoreError::Database(other),
    }
}

/// Escapes LIKE metacharacters so the search term matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// PostgreSQL implementation of all store traits
#[derive(Clone)]
pub struct PgStore {
    pool: DatabasePool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: DatabasePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    async fn timed<T, F>(&self, query: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }

    async fn fetch_one_account<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, sqlx::Postgres, AccountRow, sqlx::postgres::PgArguments>,
    ) -> StoreResult<Option<AccountWithPassword>> {
        let row = self.timed(query.fetch_optional(&self.pool)).await?;
        row.map(AccountWithPassword::try_from).transpose()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AccountWithPassword>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        self.fetch_one_account(sqlx::query_as(&sql).bind(id)).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<AccountWithPassword>> {
        let sql = format!("SELECT {} FROM accounts WHERE email = $1", ACCOUNT_COLUMNS);
        self.fetch_one_account(sqlx::query_as(&sql).bind(email)).await
    }

    async fn find_by_any_email(
        &self,
        emails: &[String],
    ) -> StoreResult<Option<AccountWithPassword>> {
        if emails.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM accounts WHERE email = ANY($1) \
             ORDER BY array_position($1, email) LIMIT 1",
            ACCOUNT_COLUMNS
        );
        self.fetch_one_account(sqlx::query_as(&sql).bind(emails.to_vec()))
            .await
    }

    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> StoreResult<Option<AccountWithPassword>> {
        // Column names come from the closed provider enum, never from input
        let sql = format!(
            "SELECT {} FROM accounts WHERE {}_id = $1",
            ACCOUNT_COLUMNS,
            provider.as_str()
        );
        self.fetch_one_account(sqlx::query_as(&sql).bind(provider_id)).await
    }

    async fn find_by_linkage_code(&self, code: &str, role: Role) -> StoreResult<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE matricule = $1 AND role = $2 ORDER BY created_at",
            ACCOUNT_COLUMNS
        );
        let rows = self
            .timed(
                sqlx::query_as::<_, AccountRow>(&sql)
                    .bind(code)
                    .bind(role.as_str())
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.into_iter()
            .map(|row| AccountWithPassword::try_from(row).map(Account::from))
            .collect()
    }

    async fn search(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Account>, u64)> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let total: i64 = self
            .timed(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM accounts \
                     WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1",
                )
                .bind(pattern.clone())
                .fetch_one(&self.pool),
            )
            .await?;

        let sql = format!(
            "SELECT {} FROM accounts \
             WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            ACCOUNT_COLUMNS
        );
        let rows = self
            .timed(
                sqlx::query_as::<_, AccountRow>(&sql)
                    .bind(pattern)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool),
            )
            .await?;

        let accounts = rows
            .into_iter()
            .map(|row| AccountWithPassword::try_from(row).map(Account::from))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((accounts, total.max(0) as u64))
    }

    async fn insert(&self, record: &AccountWithPassword) -> StoreResult<()> {
        let account = &record.account;
        self.timed(
            sqlx::query(
                r#"
                INSERT INTO accounts (id, email, password_hash, name, birthdate, role, matricule,
                                      locale, location, is_first_login, is_admin,
                                      facebook, google, apple, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(account.id)
            .bind(&account.email)
            .bind(&record.password_hash)
            .bind(&account.name)
            .bind(account.birthdate)
            .bind(account.role.as_str())
            .bind(&account.linkage_code)
            .bind(&account.locale)
            .bind(account.location.clone().map(Json))
            .bind(account.is_first_login)
            .bind(account.is_admin)
            .bind(stored_link(&account.facebook))
            .bind(stored_link(&account.google))
            .bind(stored_link(&account.apple))
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn update(&self, account: &Account) -> StoreResult<()> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE accounts
                    SET email = $2, name = $3, birthdate = $4, role = $5, matricule = $6,
                        locale = $7, location = $8, is_first_login = $9, is_admin = $10,
                        facebook = $11, google = $12, apple = $13, updated_at = $14
                    WHERE id = $1
                    "#,
                )
                .bind(account.id)
                .bind(&account.email)
                .bind(&account.name)
                .bind(account.birthdate)
                .bind(account.role.as_str())
                .bind(&account.linkage_code)
                .bind(&account.locale)
                .bind(account.location.clone().map(Json))
                .bind(account.is_first_login)
                .bind(account.is_admin)
                .bind(stored_link(&account.facebook))
                .bind(stored_link(&account.google))
                .bind(stored_link(&account.apple))
                .bind(account.updated_at)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let result = self
            .timed(
                sqlx::query(
                    "UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = self
            .timed(
                sqlx::query("DELETE FROM accounts WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.timed(sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResetRequestStore for PgStore {
    async fn find_unconsumed_by_account(
        &self,
        account_id: Uuid,
    ) -> StoreResult<Option<PasswordResetRequest>> {
        self.timed(
            sqlx::query_as::<_, PasswordResetRequest>(
                r#"
                SELECT id, account_id, token_hash, expires_at, consumed, created_at
                FROM password_resets
                WHERE account_id = $1 AND consumed = FALSE
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(account_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn insert(&self, request: &PasswordResetRequest) -> StoreResult<()> {
        self.timed(
            sqlx::query(
                r#"
                INSERT INTO password_resets (id, account_id, token_hash, expires_at, consumed, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(request.id)
            .bind(request.account_id)
            .bind(&request.token_hash)
            .bind(request.expires_at)
            .bind(request.consumed)
            .bind(request.created_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.timed(
            sqlx::query("DELETE FROM password_resets WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn mark_consumed(&self, id: Uuid) -> StoreResult<()> {
        let result = self
            .timed(
                sqlx::query(
                    "UPDATE password_resets SET consumed = TRUE WHERE id = $1 AND consumed = FALSE",
                )
                .bind(id)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get_or_create(&self, account_id: Uuid) -> StoreResult<JsonValue> {
        self.timed(
            sqlx::query_scalar::<_, JsonValue>(
                r#"
                INSERT INTO settings (account_id) VALUES ($1)
                ON CONFLICT (account_id) DO UPDATE SET account_id = EXCLUDED.account_id
                RETURNING data
                "#,
            )
            .bind(account_id)
            .fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<Subscriber>> {
        let row = self
            .timed(
                sqlx::query_as::<_, SubscriberRow>(
                    r#"
                    SELECT id, account_id, status, expiry_date,
                           product_title, product_billing_period, product_price
                    FROM subscribers
                    WHERE account_id = $1
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(account_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.map(Subscriber::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_field_mapping() {
        assert_eq!(constraint_field("accounts_email_key"), "email");
        assert_eq!(constraint_field("accounts_google_id_key"), "google");
        assert_eq!(constraint_field("accounts_apple_id_key"), "apple");
        assert_eq!(constraint_field("something_else"), "record");
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }

    #[test]
    fn test_stored_link_keeps_access_token() {
        let link = ProviderLink {
            id: "fb-1".into(),
            access_token: Some("tok".into()),
            display_name: None,
            photo_url: None,
        };

        let stored = serde_json::to_value(StoredProviderLink::from(&link)).unwrap();
        assert_eq!(stored["access_token"], "tok");

        let back: ProviderLink = serde_json::from_value::<StoredProviderLink>(stored)
            .unwrap()
            .into();
        assert_eq!(back, link);
    }
}
