//! Account Service
//!
//! Reads, updates and removal of accounts, plus the practitioner/patient
//! lookups keyed by linkage code.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;
use validator::Validate;

use super::enrichment::Enricher;
use super::error::{IdentityError, IdentityResult};
use super::identity::{ensure_practitioner_code, parse_role};
use super::Collaborators;
use crate::database::{AccountStore, Pagination};
use crate::models::{
    Account, AccountResponse, ListAccountsQuery, Page, Role, SessionContext, UpdateAccountRequest,
};
use crate::utils::validation::{normalize_email, normalize_linkage_code};

const DEFAULT_PER_PAGE: u32 = 20;

const LINKAGE_CODE_REQUIRED: &str = "Matricule is required.";

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    enricher: Enricher,
}

impl AccountService {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            accounts: collaborators.accounts.clone(),
            enricher: Enricher::new(collaborators),
        }
    }

    async fn load(&self, id: Uuid) -> IdentityResult<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .map(Account::from)
            .ok_or_else(|| IdentityError::NotFound("Account not found".into()))
    }

    /// Fails with `Forbidden` unless the caller is an administrator
    async fn require_admin(&self, actor: &SessionContext) -> IdentityResult<Account> {
        let forbidden = || IdentityError::Forbidden("Administrator access required".into());
        let account = self
            .accounts
            .find_by_id(actor.account_id)
            .await?
            .ok_or_else(forbidden)?
            .account;
        if !account.is_admin {
            return Err(forbidden());
        }
        Ok(account)
    }

    pub async fn get_account(&self, id: Uuid) -> IdentityResult<AccountResponse> {
        let account = self.load(id).await?;
        let settings = self.enricher.settings_for(account.id).await;
        Ok(AccountResponse { account, settings })
    }

    /// Paginated listing, filtered by a substring of name or email
    pub async fn list_accounts(
        &self,
        actor: &SessionContext,
        query: ListAccountsQuery,
    ) -> IdentityResult<Page<Account>> {
        self.require_admin(actor).await?;

        let pagination = Pagination::new(
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(DEFAULT_PER_PAGE),
        );
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let (items, total) = self
            .accounts
            .search(search, pagination.limit, pagination.offset)
            .await?;

        Ok(Page {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }

    /// Applies a partial update; the caller must own the account or be an admin
    pub async fn update_account(
        &self,
        actor: &SessionContext,
        id: Uuid,
        request: UpdateAccountRequest,
        client_ip: Option<IpAddr>,
    ) -> IdentityResult<Account> {
        if actor.account_id != id {
            self.require_admin(actor).await?;
        }
        request.validate()?;

        let mut account = self.load(id).await?;

        if let Some(email) = request.email.as_deref() {
            let email = normalize_email(email);
            if email != account.email {
                if let Some(other) = self.accounts.find_by_email(&email).await? {
                    if other.account.id != account.id {
                        return Err(IdentityError::Conflict(
                            "This email address is already in use.".into(),
                        ));
                    }
                }
                account.email = email;
            }
        }

        let previous_role = account.role;
        let previous_code = account.linkage_code.clone();

        if request.role.is_some() {
            account.role = parse_role(request.role.as_deref())?;
        }
        if request.linkage_code.is_some() {
            account.linkage_code = normalize_linkage_code(request.linkage_code.as_deref());
        }

        // A patient must point at some other account holding the practitioner role
        let linkage_changed =
            account.role != previous_role || account.linkage_code != previous_code;
        if linkage_changed && account.role.is_dependent() {
            if let Some(code) = account.linkage_code.as_deref() {
                ensure_practitioner_code(self.accounts.as_ref(), code, Some(account.id)).await?;
            }
        }

        if let Some(name) = request.name {
            account.name = name.trim().to_string();
        }
        if let Some(birthdate) = request.birthdate {
            account.birthdate = Some(birthdate);
        }
        if let Some(locale) = request.locale {
            account.locale = Some(locale);
        }
        if let Some(is_first_login) = request.is_first_login {
            account.is_first_login = is_first_login;
        }

        // The submitted location is ignored; its presence asks for a lookup
        if request.location.is_some() && account.needs_location() {
            if let Some(location) = self.enricher.lookup_location(client_ip).await {
                account.location = Some(location);
            }
        }

        account.updated_at = Utc::now();
        self.accounts.update(&account).await?;
        info!("Updated account {}", account.id);
        Ok(account)
    }

    /// Deletes an account; administrators only
    pub async fn remove_account(&self, actor: &SessionContext, id: Uuid) -> IdentityResult<()> {
        let admin = self.require_admin(actor).await?;

        if !self.accounts.delete(id).await? {
            return Err(IdentityError::NotFound("Account not found".into()));
        }
        info!("Account {} removed by {}", id, admin.id);
        Ok(())
    }

    /// Patients linked to the practitioner owning `code`
    pub async fn patients_by_linkage_code(&self, code: Option<&str>) -> IdentityResult<Vec<Account>> {
        self.by_linkage_code(code, Role::Patient, "No patient found for this matricule.")
            .await
    }

    /// Practitioners owning `code`
    pub async fn practitioners_by_linkage_code(
        &self,
        code: Option<&str>,
    ) -> IdentityResult<Vec<Account>> {
        self.by_linkage_code(
            code,
            Role::Practitioner,
            "No practitioner found for this matricule.",
        )
        .await
    }

    async fn by_linkage_code(
        &self,
        code: Option<&str>,
        role: Role,
        missing: &str,
    ) -> IdentityResult<Vec<Account>> {
        let code = normalize_linkage_code(code)
            .ok_or_else(|| IdentityError::Validation(LINKAGE_CODE_REQUIRED.into()))?;

        let accounts = self.accounts.find_by_linkage_code(&code, role).await?;

        if accounts.is_empty() {
            return Err(IdentityError::NotFound(missing.into()));
        }
        Ok(accounts)
    }
}
