use crate::session::{LoginMethod, Session, SessionManager};
use crate::storage::StorageManager;
use crate::validation::{
    validate_email, validate_login_password, validate_password, validate_password_confirmation,
    validate_required, ValidationError,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Failure categories reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidEmail,
    UserDisabled,
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    WeakPassword,
    OperationNotAllowed,
    TooManyRequests,
    NetworkFailure,
    InvalidCredential,
    AccountExistsWithDifferentCredential,
    CredentialAlreadyInUse,
    TokenExpired,
    InvalidUserToken,
    RequiresRecentLogin,
    Unknown,
}

impl AuthErrorKind {
    /// Maps both SDK style (`ERROR_WRONG_PASSWORD`) and REST style (`INVALID_PASSWORD`) codes.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "ERROR_INVALID_EMAIL" | "INVALID_EMAIL" => AuthErrorKind::InvalidEmail,
            "ERROR_USER_DISABLED" | "USER_DISABLED" => AuthErrorKind::UserDisabled,
            "ERROR_USER_NOT_FOUND" | "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthErrorKind::UserNotFound,
            "ERROR_WRONG_PASSWORD" | "INVALID_PASSWORD" => AuthErrorKind::WrongPassword,
            "ERROR_EMAIL_ALREADY_IN_USE" | "EMAIL_EXISTS" => AuthErrorKind::EmailAlreadyInUse,
            "ERROR_WEAK_PASSWORD" | "WEAK_PASSWORD" => AuthErrorKind::WeakPassword,
            "ERROR_OPERATION_NOT_ALLOWED" | "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => {
                AuthErrorKind::OperationNotAllowed
            }
            "ERROR_TOO_MANY_REQUESTS" | "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthErrorKind::TooManyRequests,
            "ERROR_NETWORK_REQUEST_FAILED" => AuthErrorKind::NetworkFailure,
            "ERROR_INVALID_CREDENTIAL" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE" => {
                AuthErrorKind::InvalidCredential
            }
            "ERROR_ACCOUNT_EXISTS_WITH_DIFFERENT_CREDENTIAL" => AuthErrorKind::AccountExistsWithDifferentCredential,
            "ERROR_CREDENTIAL_ALREADY_IN_USE" => AuthErrorKind::CredentialAlreadyInUse,
            "ERROR_USER_TOKEN_EXPIRED" | "TOKEN_EXPIRED" => AuthErrorKind::TokenExpired,
            "ERROR_INVALID_USER_TOKEN" | "INVALID_ID_TOKEN" => AuthErrorKind::InvalidUserToken,
            "ERROR_REQUIRES_RECENT_LOGIN" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => AuthErrorKind::RequiresRecentLogin,
            _ => AuthErrorKind::Unknown,
        }
    }

    pub fn user_message(&self) -> Option<&'static str> {
        let message = match self {
            AuthErrorKind::InvalidEmail => "The email address is not valid.",
            AuthErrorKind::UserDisabled => "This account has been disabled.",
            AuthErrorKind::UserNotFound => "No account found with this email address.",
            AuthErrorKind::WrongPassword => "The password is incorrect.",
            AuthErrorKind::EmailAlreadyInUse => "An account with this email already exists.",
            AuthErrorKind::WeakPassword => "The password is too weak. Please choose a stronger password.",
            AuthErrorKind::OperationNotAllowed => "Email/password accounts are not enabled.",
            AuthErrorKind::TooManyRequests => "Too many unsuccessful attempts. Please try again later.",
            AuthErrorKind::NetworkFailure => "Network error. Please check your connection and try again.",
            AuthErrorKind::InvalidCredential => "The authentication credential is invalid.",
            AuthErrorKind::AccountExistsWithDifferentCredential => {
                "An account already exists with the same email but different sign-in credentials."
            }
            AuthErrorKind::CredentialAlreadyInUse => {
                "This credential is already associated with a different user account."
            }
            AuthErrorKind::TokenExpired => "Your session has expired. Please sign in again.",
            AuthErrorKind::InvalidUserToken => "Your authentication token is invalid. Please sign in again.",
            AuthErrorKind::RequiresRecentLogin => {
                "This operation requires recent authentication. Please sign in again."
            }
            AuthErrorKind::Unknown => return None,
        };
        Some(message)
    }
}

/// Provider failure. `Display` is the user-facing message; `detail` keeps the raw
/// provider text for logs.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct IdentityError {
    pub kind: AuthErrorKind,
    pub detail: String,
    message: String,
}

impl IdentityError {
    pub fn new(kind: AuthErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = match kind.user_message() {
            Some(m) => m.to_string(),
            None => format!("Authentication failed: {}", detail),
        };
        Self { kind, detail, message }
    }

    /// Replaces the user-facing text while keeping the kind and provider detail.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Input rejected before the provider was contacted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Account returned by a successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

// The external identity service. Implementations only talk to the provider;
// sessions and local profiles are handled by AuthManager.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    // Exchanges a Google ID token obtained by the platform sign-in flow.
    async fn sign_in_with_google(&self, id_token: &str) -> Result<Identity, IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    // Re-authenticates with the current password, then sets the new one.
    async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;
}

// --- Identity Toolkit REST binding ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: &'static str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePasswordRequest<'a> {
    id_token: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: String,
}

impl From<AccountResponse> for Identity {
    fn from(r: AccountResponse) -> Self {
        Identity {
            user_id: r.local_id,
            email: r.email,
            display_name: r.display_name.filter(|n| !n.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct FirebaseIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FirebaseIdentityProvider {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build identity HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T, IdentityError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        log::debug!("Identity request accounts:{}", method);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                log::error!("Identity request failed to send: {}", e);
                IdentityError::new(AuthErrorKind::NetworkFailure, e.to_string())
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IdentityError::new(AuthErrorKind::NetworkFailure, e.to_string()))?;

        if !status.is_success() {
            // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters".
            let raw = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            let code = raw.split(':').next().unwrap_or_default().trim();
            log::warn!("Identity provider rejected accounts:{}: {}", method, raw);
            return Err(IdentityError::new(AuthErrorKind::from_code(code), raw));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| IdentityError::new(AuthErrorKind::Unknown, format!("invalid provider response: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        self.call::<_, AccountResponse>("signUp", &body).await.map(Identity::from)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        self.call::<_, AccountResponse>("signInWithPassword", &body)
            .await
            .map(Identity::from)
    }

    async fn sign_in_with_google(&self, id_token: &str) -> Result<Identity, IdentityError> {
        let body = IdpRequest {
            post_body: format!("id_token={}&providerId=google.com", id_token),
            request_uri: "http://localhost",
            return_idp_credential: true,
            return_secure_token: true,
        };
        self.call::<_, AccountResponse>("signInWithIdp", &body)
            .await
            .map(Identity::from)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let body = OobRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        self.call::<_, serde_json::Value>("sendOobCode", &body).await.map(|_| ())
    }

    async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let reauth = PasswordRequest {
            email,
            password: current_password,
            return_secure_token: true,
        };
        let account = self
            .call::<_, AccountResponse>("signInWithPassword", &reauth)
            .await?;

        let body = UpdatePasswordRequest {
            id_token: &account.id_token,
            password: new_password,
            return_secure_token: true,
        };
        self.call::<_, serde_json::Value>("update", &body).await.map(|_| ())
    }
}

// --- Auth manager ---

/// First screen to show at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Onboarding,
}

pub struct AuthManager {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<SessionManager>,
    storage: Arc<StorageManager>,
}

impl AuthManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, sessions: Arc<SessionManager>, storage: Arc<StorageManager>) -> Self {
        Self {
            provider,
            sessions,
            storage,
        }
    }

    // Local bookkeeping after the provider accepted the user. Failures here are
    // logged; the user is signed in either way.
    async fn establish(&self, identity: &Identity, method: LoginMethod, remember_me: bool) {
        if let Err(e) = self.storage.get_or_create_user(&identity.user_id, &identity.email).await {
            log::error!("Failed to create local profile for {}: {:#}", identity.user_id, e);
        }
        if let Err(e) = self
            .sessions
            .create_session(
                &identity.user_id,
                &identity.email,
                identity.display_name.as_deref(),
                method,
                remember_me,
            )
            .await
        {
            log::error!("Failed to persist session for {}: {:#}", identity.user_id, e);
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
        remember_me: bool,
    ) -> Result<Identity, AuthError> {
        validate_email(email)?;
        validate_password(password)?;
        validate_password_confirmation(password, confirmation)?;

        let identity = self.provider.sign_up(email.trim(), password).await?;
        log::info!("Registered user {}", identity.user_id);
        self.establish(&identity, LoginMethod::Email, remember_me).await;
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str, remember_me: bool) -> Result<Identity, AuthError> {
        validate_email(email)?;
        validate_login_password(password)?;

        let identity = self.provider.sign_in(email.trim(), password).await?;
        log::info!("Signed in user {}", identity.user_id);
        self.establish(&identity, LoginMethod::Email, remember_me).await;
        Ok(identity)
    }

    pub async fn sign_in_with_google(&self, id_token: &str, remember_me: bool) -> Result<Identity, AuthError> {
        validate_required(id_token, "Google sign in failed: no ID token received")?;

        let identity = self.provider.sign_in_with_google(id_token).await?;
        log::info!("Signed in user {} with Google", identity.user_id);
        self.establish(&identity, LoginMethod::Google, remember_me).await;
        Ok(identity)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        self.provider.send_password_reset(email.trim()).await?;
        log::info!("Password reset email requested");
        Ok(())
    }

    /// Changes the signed-in user's password. All three fields are checked before
    /// the provider is contacted; a rejected current password gets its own message.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        for field in [current_password, new_password, confirmation] {
            validate_required(field, "Please fill in all fields")?;
        }
        validate_password(new_password)?;
        validate_password_confirmation(new_password, confirmation)?;

        let session = self
            .sessions
            .user_details()
            .await
            .ok_or_else(|| IdentityError::new(AuthErrorKind::InvalidUserToken, "no signed-in user"))?;

        match self
            .provider
            .change_password(&session.email, current_password, new_password)
            .await
        {
            Ok(()) => {
                log::info!("Password changed for user {}", session.user_id);
                Ok(())
            }
            Err(e) if matches!(e.kind, AuthErrorKind::WrongPassword | AuthErrorKind::InvalidCredential) => {
                log::warn!("Password change for {} rejected: {}", session.user_id, e.detail);
                Err(e.with_message("Current password is incorrect").into())
            }
            Err(e) => {
                log::error!("Password change for {} failed: {}", session.user_id, e.detail);
                Err(e.into())
            }
        }
    }

    pub async fn sign_out(&self) {
        if let Err(e) = self.sessions.logout().await {
            log::error!("Failed to clear session on sign out: {:#}", e);
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.sessions.is_logged_in().await
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.sessions.user_details().await
    }

    pub async fn extend_session(&self) -> bool {
        match self.sessions.extend_session().await {
            Ok(extended) => extended,
            Err(e) => {
                log::error!("Failed to extend session: {:#}", e);
                false
            }
        }
    }

    pub async fn complete_onboarding(&self) -> Result<(), anyhow::Error> {
        self.sessions
            .update_preferences(|p| p.onboarding_completed = true)
            .await?;
        Ok(())
    }

    /// A valid session goes straight home (and is extended); otherwise users who
    /// finished onboarding see the login screen.
    pub async fn startup_route(&self) -> Route {
        if self.sessions.is_logged_in().await {
            self.extend_session().await;
            return Route::Home;
        }
        if self.sessions.preferences().await.onboarding_completed {
            Route::Login
        } else {
            Route::Onboarding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_TIMEOUT_MS;
    use crate::test_utils::{FakeIdentityProvider, ManualClock};

    struct Harness {
        provider: Arc<FakeIdentityProvider>,
        clock: Arc<ManualClock>,
        storage: Arc<StorageManager>,
        auth: AuthManager,
    }

    async fn harness() -> Harness {
        let provider = Arc::new(FakeIdentityProvider::default());
        let clock = Arc::new(ManualClock::new(0));
        let sessions = Arc::new(SessionManager::in_memory(clock.clone()));
        let storage = Arc::new(StorageManager::in_memory().await.unwrap());
        let auth = AuthManager::new(provider.clone(), sessions, storage.clone());
        Harness {
            provider,
            clock,
            storage,
            auth,
        }
    }

    #[test]
    fn provider_codes_map_to_fixed_messages() {
        let err = IdentityError::new(AuthErrorKind::from_code("EMAIL_EXISTS"), "EMAIL_EXISTS");
        assert_eq!(err.to_string(), "An account with this email already exists.");
        assert_eq!(
            AuthErrorKind::from_code("ERROR_WRONG_PASSWORD"),
            AuthErrorKind::from_code("INVALID_PASSWORD")
        );

        let unknown = IdentityError::new(AuthErrorKind::from_code("QUOTA_EXCEEDED"), "QUOTA_EXCEEDED");
        assert_eq!(unknown.kind, AuthErrorKind::Unknown);
        assert_eq!(unknown.to_string(), "Authentication failed: QUOTA_EXCEEDED");
    }

    #[tokio::test]
    async fn register_validates_before_calling_provider() {
        let h = harness().await;
        let err = h
            .auth
            .register("owner@shelter.org", "Kibble7!Xz", "Kibble7!Xy", true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(h.provider.calls("sign_up"), 0);
    }

    #[tokio::test]
    async fn register_creates_profile_and_session() {
        let h = harness().await;
        let identity = h
            .auth
            .register("owner@shelter.org", "Kibble7!Xz", "Kibble7!Xz", true)
            .await
            .unwrap();

        let profile = h.storage.get_user(&identity.user_id).await.unwrap().unwrap();
        assert_eq!(profile.email, "owner@shelter.org");
        let session = h.auth.current_session().await.unwrap();
        assert_eq!(session.login_method, LoginMethod::Email);
        assert_eq!(h.auth.startup_route().await, Route::Home);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_mapped_message() {
        let h = harness().await;
        h.provider.fail_with(AuthErrorKind::WrongPassword);
        let err = h.auth.sign_in("owner@shelter.org", "secret1", true).await.unwrap_err();
        assert_eq!(err.to_string(), "The password is incorrect.");
        assert!(!h.auth.is_signed_in().await);
    }

    #[tokio::test]
    async fn google_sign_in_records_method_and_name() {
        let h = harness().await;
        assert!(h.auth.sign_in_with_google("  ", true).await.is_err());
        assert_eq!(h.provider.calls("sign_in_with_google"), 0);

        h.auth.sign_in_with_google("token", false).await.unwrap();
        let session = h.auth.current_session().await.unwrap();
        assert_eq!(session.login_method, LoginMethod::Google);
        assert_eq!(session.display_name.as_deref(), Some("Pet Owner"));
    }

    #[tokio::test]
    async fn startup_routes_by_session_then_onboarding() {
        let h = harness().await;
        assert_eq!(h.auth.startup_route().await, Route::Onboarding);

        h.auth.complete_onboarding().await.unwrap();
        assert_eq!(h.auth.startup_route().await, Route::Login);

        h.auth.sign_in("owner@shelter.org", "secret1", true).await.unwrap();
        h.clock.advance(SESSION_TIMEOUT_MS - 1);
        // Routing home extends the session.
        assert_eq!(h.auth.startup_route().await, Route::Home);
        h.clock.advance(SESSION_TIMEOUT_MS - 1);
        assert!(h.auth.is_signed_in().await);

        h.auth.sign_out().await;
        assert_eq!(h.auth.startup_route().await, Route::Login);
    }

    #[tokio::test]
    async fn change_password_validates_then_calls_provider() {
        let h = harness().await;
        let err = h
            .auth
            .change_password("secret1", "NewKibble8!", "NewKibble8!")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Identity(IdentityError {
                kind: AuthErrorKind::InvalidUserToken,
                ..
            })
        ));

        h.auth.sign_in("owner@shelter.org", "secret1", true).await.unwrap();
        let err = h.auth.change_password("", "NewKibble8!", "NewKibble8!").await.unwrap_err();
        assert_eq!(err.to_string(), "Please fill in all fields");
        let err = h
            .auth
            .change_password("secret1", "NewKibble8!", "NewKibble9!")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(matches!(
            h.auth.change_password("secret1", "short", "short").await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(h.provider.calls("change_password"), 0);

        h.auth
            .change_password("secret1", "NewKibble8!", "NewKibble8!")
            .await
            .unwrap();
        assert_eq!(h.provider.calls("change_password"), 1);
    }

    #[tokio::test]
    async fn change_password_reports_wrong_current_password() {
        let h = harness().await;
        h.auth.sign_in("owner@shelter.org", "secret1", true).await.unwrap();

        h.provider.fail_with(AuthErrorKind::InvalidCredential);
        let err = h
            .auth
            .change_password("wrong-one", "NewKibble8!", "NewKibble8!")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Current password is incorrect");

        h.provider.fail_with(AuthErrorKind::RequiresRecentLogin);
        let err = h
            .auth
            .change_password("secret1", "NewKibble8!", "NewKibble8!")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "This operation requires recent authentication. Please sign in again."
        );
        // Still signed in after a failed change.
        assert!(h.auth.is_signed_in().await);
    }

    #[tokio::test]
    async fn password_reset_requires_valid_email() {
        let h = harness().await;
        assert!(h.auth.send_password_reset("not-an-email").await.is_err());
        assert_eq!(h.provider.calls("send_password_reset"), 0);
        h.auth.send_password_reset("owner@shelter.org").await.unwrap();
        assert_eq!(h.provider.calls("send_password_reset"), 1);
    }
}
