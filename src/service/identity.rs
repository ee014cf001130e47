//! Identity Service
//!
//! Local registration, credential checks, provider identity resolution and
//! session issuance.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::email_service::Mailer;
use super::enrichment::Enricher;
use super::error::{IdentityError, IdentityResult};
use super::jwt::TokenSigner;
use super::Collaborators;
use crate::config::PolicyConfig;
use crate::database::{AccountStore, StoreError};
use crate::models::{
    Account, AccountResponse, AccountWithPassword, OAuthProfile, OAuthProvider, ProviderLink,
    RegisterRequest, Role, SessionClaims, SessionContext, SessionResponse,
};
use crate::utils::security::{hash_password_with_cost, verify_password};
use crate::utils::validation::{normalize_email, normalize_linkage_code};

/// Public message for every failed local sign-in
pub const WRONG_CREDENTIALS: &str = "Wrong email or password.";

const ROLE_REQUIRED: &str =
    "Profession is required and must be either \"orthophoniste\" or \"patient\".";

pub(crate) const UNKNOWN_LINKAGE_CODE: &str =
    "The provided matricule does not correspond to any existing practitioner.";

/// Parses the role tag of a request; absent or unknown values are rejected
pub(crate) fn parse_role(raw: Option<&str>) -> IdentityResult<Role> {
    raw.map(str::trim)
        .filter(|r| !r.is_empty())
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| IdentityError::Validation(ROLE_REQUIRED.into()))
}

/// Fails unless some practitioner other than `linked` owns `code`
pub(crate) async fn ensure_practitioner_code(
    accounts: &dyn AccountStore,
    code: &str,
    linked: Option<Uuid>,
) -> IdentityResult<()> {
    let practitioners = accounts
        .find_by_linkage_code(code, Role::Practitioner)
        .await?;
    if !practitioners.iter().any(|p| Some(p.id) != linked) {
        return Err(IdentityError::Validation(UNKNOWN_LINKAGE_CODE.into()));
    }
    Ok(())
}

/// Keeps previously known display data when the provider omits it
fn merge_link(existing: Option<&ProviderLink>, fresh: ProviderLink) -> ProviderLink {
    match existing {
        Some(old) => ProviderLink {
            id: fresh.id,
            access_token: fresh.access_token.or_else(|| old.access_token.clone()),
            display_name: fresh.display_name.or_else(|| old.display_name.clone()),
            photo_url: fresh.photo_url.or_else(|| old.photo_url.clone()),
        },
        None => fresh,
    }
}

#[derive(Clone)]
pub struct IdentityService {
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    signer: Arc<dyn TokenSigner>,
    enricher: Enricher,
    policy: PolicyConfig,
}

impl IdentityService {
    pub fn new(collaborators: &Collaborators, policy: PolicyConfig) -> Self {
        Self {
            accounts: collaborators.accounts.clone(),
            mailer: collaborators.mailer.clone(),
            signer: collaborators.signer.clone(),
            enricher: Enricher::new(collaborators),
            policy,
        }
    }

    /// Creates an account with a local password
    pub async fn register_local(
        &self,
        request: RegisterRequest,
        client_ip: Option<IpAddr>,
    ) -> IdentityResult<Account> {
        request.validate()?;
        let role = parse_role(request.role.as_deref())?;
        let linkage_code = normalize_linkage_code(request.linkage_code.as_deref());

        if role.is_dependent() {
            if let Some(code) = linkage_code.as_deref() {
                ensure_practitioner_code(self.accounts.as_ref(), code, None).await?;
            }
        }

        let email = normalize_email(&request.email);
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::Conflict(
                "You have already signed up. Did you forget your password?".into(),
            ));
        }

        let name = request.name.as_deref().map(str::trim).unwrap_or_default();
        let mut account = Account::new(email, name.to_string(), role);
        account.birthdate = request.birthdate;
        account.linkage_code = linkage_code;
        account.locale = request.locale;
        account.location = self.enricher.lookup_location(client_ip).await;

        let password_hash = hash_password_with_cost(&request.password, self.policy.bcrypt_cost)?;
        let record = AccountWithPassword {
            account,
            password_hash: Some(password_hash),
        };
        self.accounts.insert(&record).await?;
        info!("Registered account {} ({})", record.account.id, role);

        if let Err(e) = self.mailer.send_confirmation(&record.account.email).await {
            warn!(
                "Confirmation mail for {} not delivered: {}",
                record.account.email, e
            );
        }

        Ok(record.account)
    }

    /// Finds, merges into, or creates the account behind a provider identity
    /// and opens a session for it
    pub async fn resolve_oauth_identity(
        &self,
        provider: OAuthProvider,
        profile: OAuthProfile,
        access_token: Option<String>,
        client_ip: Option<IpAddr>,
    ) -> IdentityResult<SessionResponse> {
        let provider_id = profile.id.trim().to_string();
        if provider_id.is_empty() {
            return Err(IdentityError::Validation(
                "Provider profile has no identifier".into(),
            ));
        }

        let link = ProviderLink {
            id: provider_id.clone(),
            access_token,
            display_name: profile.full_name(),
            photo_url: profile.photo_url(),
        };

        let account = match self
            .accounts
            .find_by_provider_id(provider, &provider_id)
            .await?
        {
            Some(record) => self.refresh_link(record.account, provider, link).await?,
            None => self.merge_or_create(provider, &profile, link).await?,
        };

        self.open_session(account, client_ip).await
    }

    async fn refresh_link(
        &self,
        mut account: Account,
        provider: OAuthProvider,
        link: ProviderLink,
    ) -> IdentityResult<Account> {
        let slot = account.provider_link_mut(provider);
        *slot = Some(merge_link(slot.as_ref(), link));
        account.updated_at = Utc::now();
        self.accounts.update(&account).await?;
        Ok(account)
    }

    async fn merge_or_create(
        &self,
        provider: OAuthProvider,
        profile: &OAuthProfile,
        link: ProviderLink,
    ) -> IdentityResult<Account> {
        let emails = profile.email_addresses();

        if let Some(record) = self.accounts.find_by_any_email(&emails).await? {
            let mut account = record.account;
            if let Some(existing) = account.provider_link(provider) {
                if existing.id != link.id {
                    warn!(
                        "Refusing to relink {} identity of account {}",
                        provider, account.id
                    );
                    return Err(IdentityError::Conflict(format!(
                        "This account is already linked to a different {} identity",
                        provider
                    )));
                }
            }

            if account.name.trim().is_empty() {
                if let Some(name) = profile.full_name() {
                    account.name = name;
                }
            }
            let slot = account.provider_link_mut(provider);
            *slot = Some(merge_link(slot.as_ref(), link));
            account.updated_at = Utc::now();
            self.accounts.update(&account).await?;
            info!("Linked {} identity to account {}", provider, account.id);
            return Ok(account);
        }

        let email = emails.into_iter().next().ok_or_else(|| {
            IdentityError::Validation("The identity provider did not share an email address".into())
        })?;

        let mut account = Account::new(
            email,
            profile.full_name().unwrap_or_default(),
            self.policy.default_oauth_role,
        );
        *account.provider_link_mut(provider) = Some(link);

        let record = AccountWithPassword {
            account,
            password_hash: None,
        };
        match self.accounts.insert(&record).await {
            Ok(()) => {
                info!(
                    "Created account {} from {} identity",
                    record.account.id, provider
                );
                Ok(record.account)
            }
            // A concurrent login for the same identity won the insert
            Err(StoreError::UniqueViolation(field)) if field == provider.as_str() => self
                .accounts
                .find_by_provider_id(provider, profile.id.trim())
                .await?
                .map(Account::from)
                .ok_or_else(|| {
                    IdentityError::Conflict(format!("Duplicate {} identity", provider))
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks a local email/password pair and opens a session
    pub async fn authenticate_local(
        &self,
        email: &str,
        password: &str,
        client_ip: Option<IpAddr>,
    ) -> IdentityResult<SessionResponse> {
        let wrong = || IdentityError::Authentication(WRONG_CREDENTIALS.into());

        let record = self
            .accounts
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(wrong)?;
        let hash = record.password_hash.as_deref().ok_or_else(wrong)?;

        let valid = verify_password(password, hash).unwrap_or_else(|e| {
            warn!("Unreadable password hash on account {}: {}", record.account.id, e);
            false
        });
        if !valid {
            return Err(wrong());
        }

        self.open_session(record.account, client_ip).await
    }

    /// Signs a session token for `account`
    pub fn issue_session(&self, account: &Account) -> IdentityResult<String> {
        let now = Utc::now();
        let claims = SessionClaims::new(
            account.id,
            &account.email,
            now,
            now + self.signer.expires_in(),
        );
        Ok(self.signer.issue(&claims)?)
    }

    /// Verifies a bearer token
    pub fn verify_session(&self, token: &str) -> IdentityResult<SessionContext> {
        let claims = self.signer.verify(token)?;
        SessionContext::from_claims(&claims)
            .map_err(|_| IdentityError::Authentication("Invalid account id in token".into()))
    }

    /// Account behind a verified session, with settings
    pub async fn current_account(&self, session: &SessionContext) -> IdentityResult<AccountResponse> {
        let account: Account = self
            .accounts
            .find_by_id(session.account_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound("Account not found".into()))?
            .into();
        let settings = self.enricher.settings_for(account.id).await;

        Ok(AccountResponse { account, settings })
    }

    async fn open_session(
        &self,
        mut account: Account,
        client_ip: Option<IpAddr>,
    ) -> IdentityResult<SessionResponse> {
        self.enricher.backfill_location(&mut account, client_ip).await;

        let auth_token = self.issue_session(&account)?;
        let settings = self.enricher.settings_for(account.id).await;
        let subscriber = self.enricher.subscriber_for(account.id).await;

        Ok(SessionResponse {
            account,
            settings,
            subscriber,
            auth_token,
        })
    }
}
