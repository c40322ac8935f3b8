#[cfg(test)]
pub mod fake;
#[cfg(windows)]
pub mod wam;

use std::fmt;

use thiserror::Error;

use crate::auth::request::TokenRequest;
use crate::window::WindowHandle;

// -- Well-known identifiers ---------------------------------------------------

/// Microsoft account & Entra ID provider.
pub const PROVIDER_ID: &str = "https://login.microsoft.com";
pub const AUTHORITY_ORGANIZATIONS: &str = "organizations";

/// Microsoft Office first-party client.
pub const DEFAULT_CLIENT_ID: &str = "d3590ed6-52b3-4102-aeff-aad2292ab01c";

// Space-delimited, case-sensitive scope tokens (RFC 6749 section 3.3).
pub const DEFAULT_SCOPES: &str =
    "https://outlook.office365.com//.default offline_access openid profile";

pub const WAM_COMPAT_KEY: &str = "wam_compat";
pub const WAM_COMPAT_VALUE: &str = "2.0";

/// Claims challenge advertising the CP1 client capability.
pub const CLAIMS_KEY: &str = "claims";
pub const CLAIMS_CP1: &str = r#"{"access_token":{"xms_cc":{"values":["CP1"]}}}"#;

// -- Domain types -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    None,
    Connected,
    Error,
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountState::None => "None",
            AccountState::Connected => "Connected",
            AccountState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// A web account previously registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub state: AccountState,
    /// In the order the provider reported them.
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindAccountsStatus {
    Success,
    NotAllowedByProvider,
    NotSupportedByProvider,
    ProviderError,
}

impl fmt::Display for FindAccountsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindAccountsStatus::Success => "Success",
            FindAccountsStatus::NotAllowedByProvider => "NotAllowedByProvider",
            FindAccountsStatus::NotSupportedByProvider => "NotSupportedByProvider",
            FindAccountsStatus::ProviderError => "ProviderError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindAccountsResult {
    pub status: FindAccountsStatus,
    pub accounts: Vec<Account>,
    pub provider_error: Option<ProviderError>,
}

/// Error reported inline by the provider (not thrown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Success,
    UserCancel,
    AccountSwitch,
    UserInteractionRequired,
    AccountProviderNotAvailable,
    ProviderError,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenStatus::Success => "Success",
            TokenStatus::UserCancel => "UserCancel",
            TokenStatus::AccountSwitch => "AccountSwitch",
            TokenStatus::UserInteractionRequired => "UserInteractionRequired",
            TokenStatus::AccountProviderNotAvailable => "AccountProviderNotAvailable",
            TokenStatus::ProviderError => "ProviderError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub account_id: Option<String>,
    pub token: String,
    pub properties: Vec<(String, String)>,
    pub provider_error: Option<ProviderError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResult {
    pub status: TokenStatus,
    pub responses: Vec<TokenResponse>,
    /// May be absent even when the status is not `Success`.
    pub provider_error: Option<ProviderError>,
}

impl TokenResult {
    pub fn response(&self) -> Option<&TokenResponse> {
        self.responses.first()
    }
}

/// A failure thrown by a platform call, as opposed to a status it returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("code:{code:#x}, message:{message}")]
pub struct PlatformError {
    pub code: u32,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// -- Platform collaborator ----------------------------------------------------

/// The Web Account Manager operations the token flow depends on.
///
/// Every call blocks until the underlying asynchronous operation completes or
/// fails. Implementations are driven from a single orchestration thread.
pub trait WebAccountManager {
    fn find_provider(
        &self,
        provider_id: &str,
        authority: &str,
    ) -> Result<Option<Provider>, PlatformError>;

    fn find_all_accounts(
        &self,
        provider: &Provider,
        client_id: &str,
    ) -> Result<FindAccountsResult, PlatformError>;

    fn sign_out(&self, account: &Account) -> Result<(), PlatformError>;

    fn get_token_silently(
        &self,
        request: &TokenRequest,
        account: Option<&Account>,
    ) -> Result<TokenResult, PlatformError>;

    fn request_token_interactive(
        &self,
        request: &TokenRequest,
        window: WindowHandle,
    ) -> Result<TokenResult, PlatformError>;
}

/// HRESULT `E_NOTIMPL`.
pub const E_NOTIMPL: u32 = 0x8000_4001;

/// Stand-in manager for hosts without the Web Account Manager.
pub struct Unsupported;

impl Unsupported {
    fn error() -> PlatformError {
        PlatformError::new(E_NOTIMPL, "Web Account Manager is only available on Windows")
    }
}

impl WebAccountManager for Unsupported {
    fn find_provider(&self, _: &str, _: &str) -> Result<Option<Provider>, PlatformError> {
        Err(Self::error())
    }

    fn find_all_accounts(&self, _: &Provider, _: &str) -> Result<FindAccountsResult, PlatformError> {
        Err(Self::error())
    }

    fn sign_out(&self, _: &Account) -> Result<(), PlatformError> {
        Err(Self::error())
    }

    fn get_token_silently(
        &self,
        _: &TokenRequest,
        _: Option<&Account>,
    ) -> Result<TokenResult, PlatformError> {
        Err(Self::error())
    }

    fn request_token_interactive(
        &self,
        _: &TokenRequest,
        _: WindowHandle,
    ) -> Result<TokenResult, PlatformError> {
        Err(Self::error())
    }
}
