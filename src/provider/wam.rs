//! Web Account Manager adapter over the Windows Runtime.
//!
//! Every asynchronous platform operation is waited on from the orchestration
//! thread. The main thread keeps pumping the anchor window's messages, which
//! is what lets the interactive request show its UI and complete.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

use windows::core::{factory, IInspectable, Interface, HSTRING};
use windows::Foundation::Collections::{IIterable, IKeyValuePair};
use windows::Foundation::IAsyncOperation;
use windows::Security::Authentication::Web::Core::{
    FindAllWebAccountsStatus, WebAuthenticationCoreManager, WebProviderError, WebTokenRequest,
    WebTokenRequestPromptType, WebTokenRequestResult, WebTokenRequestStatus, WebTokenResponse,
};
use windows::Security::Credentials::{WebAccount, WebAccountProvider, WebAccountState};
use windows::Win32::Foundation::{E_ILLEGAL_METHOD_CALL, HWND};
use windows::Win32::System::WinRT::{
    IWebAuthenticationCoreManagerInterop, RoInitialize, RoUninitialize, RO_INIT_MULTITHREADED,
};

use super::*;
use crate::auth::request::PromptType;

/// HRESULT_FROM_WIN32(ERROR_NOT_FOUND)
const E_NOT_FOUND: u32 = 0x8007_0490;

type StringPairs = IIterable<IKeyValuePair<HSTRING, HSTRING>>;

impl From<windows::core::Error> for PlatformError {
    fn from(e: windows::core::Error) -> Self {
        PlatformError::new(e.code().0 as u32, e.message().to_string())
    }
}

/// Multithreaded Windows Runtime apartment for the current thread.
struct Apartment {
    _not_send: PhantomData<*const ()>,
}

impl Apartment {
    fn multithreaded() -> Result<Self, PlatformError> {
        // SAFETY: balanced by `RoUninitialize` on drop, on this same thread.
        unsafe { RoInitialize(RO_INIT_MULTITHREADED)? };
        Ok(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        // SAFETY: paired with the successful `RoInitialize` above.
        unsafe { RoUninitialize() };
    }
}

pub struct WamClient {
    provider: RefCell<Option<WebAccountProvider>>,
    accounts: RefCell<HashMap<String, WebAccount>>,
    // Dropped last, after every runtime object above.
    _apartment: Apartment,
}

impl WamClient {
    /// Joins the multithreaded apartment on the calling thread.
    pub fn new() -> Result<Self, PlatformError> {
        let apartment = Apartment::multithreaded()?;

        Ok(Self {
            provider: RefCell::new(None),
            accounts: RefCell::default(),
            _apartment: apartment,
        })
    }

    fn native_provider(&self) -> Result<WebAccountProvider, PlatformError> {
        self.provider
            .borrow()
            .clone()
            .ok_or_else(|| windows::core::Error::from(E_ILLEGAL_METHOD_CALL).into())
    }

    fn native_account(&self, account: &Account) -> Result<WebAccount, PlatformError> {
        self.accounts
            .borrow()
            .get(&account.id)
            .cloned()
            .ok_or_else(|| PlatformError::new(E_NOT_FOUND, format!("Unknown web account {}", account.id)))
    }

    fn native_request(&self, request: &TokenRequest) -> Result<WebTokenRequest, PlatformError> {
        let prompt_type = match request.prompt_type() {
            PromptType::Default => WebTokenRequestPromptType::Default,
            PromptType::ForceAuthentication => WebTokenRequestPromptType::ForceAuthentication,
        };

        let native = WebTokenRequest::CreateWithPromptType(
            &self.native_provider()?,
            &HSTRING::from(request.scopes()),
            &HSTRING::from(request.client_id()),
            prompt_type,
        )?;

        let properties = native.Properties()?;
        for (key, value) in request.properties() {
            properties.Insert(&HSTRING::from(key.as_str()), &HSTRING::from(value.as_str()))?;
        }

        Ok(native)
    }
}

impl WebAccountManager for WamClient {
    fn find_provider(
        &self,
        provider_id: &str,
        authority: &str,
    ) -> Result<Option<Provider>, PlatformError> {
        let operation = WebAuthenticationCoreManager::FindAccountProviderWithAuthorityAsync(
            &HSTRING::from(provider_id),
            &HSTRING::from(authority),
        )?;

        let native = match operation.get() {
            Ok(native) => native,
            // A null provider surfaces as an error without a failure code.
            Err(e) if e.code().is_ok() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let provider = Provider {
            id: native.Id()?.to_string(),
            display_name: native.DisplayName()?.to_string(),
        };
        *self.provider.borrow_mut() = Some(native);

        Ok(Some(provider))
    }

    fn find_all_accounts(
        &self,
        _provider: &Provider,
        client_id: &str,
    ) -> Result<FindAccountsResult, PlatformError> {
        let found = WebAuthenticationCoreManager::FindAllAccountsWithClientIdAsync(
            &self.native_provider()?,
            &HSTRING::from(client_id),
        )?
        .get()?;

        let status = match found.Status()? {
            FindAllWebAccountsStatus::Success => FindAccountsStatus::Success,
            FindAllWebAccountsStatus::NotAllowedByProvider => FindAccountsStatus::NotAllowedByProvider,
            FindAllWebAccountsStatus::NotSupportedByProvider => {
                FindAccountsStatus::NotSupportedByProvider
            }
            _ => FindAccountsStatus::ProviderError,
        };

        let mut accounts = Vec::new();
        if status == FindAccountsStatus::Success {
            let natives = found.Accounts()?;
            let mut cache = self.accounts.borrow_mut();

            for index in 0..natives.Size()? {
                let native = natives.GetAt(index)?;
                let account = Account {
                    id: native.Id()?.to_string(),
                    state: account_state(native.State()?),
                    properties: string_pairs(&native.Properties()?.cast()?)?,
                };
                cache.insert(account.id.clone(), native);
                accounts.push(account);
            }
        }

        Ok(FindAccountsResult {
            status,
            accounts,
            provider_error: found.ProviderError().ok().and_then(|e| provider_error(&e)),
        })
    }

    fn sign_out(&self, account: &Account) -> Result<(), PlatformError> {
        self.native_account(account)?.SignOutAsync()?.get()?;
        self.accounts.borrow_mut().remove(&account.id);
        Ok(())
    }

    fn get_token_silently(
        &self,
        request: &TokenRequest,
        account: Option<&Account>,
    ) -> Result<TokenResult, PlatformError> {
        let native = self.native_request(request)?;

        let operation = match account {
            Some(account) => WebAuthenticationCoreManager::GetTokenSilentlyWithWebAccountAsync(
                &native,
                &self.native_account(account)?,
            )?,
            None => WebAuthenticationCoreManager::GetTokenSilentlyAsync(&native)?,
        };

        Ok(token_result(&operation.get()?)?)
    }

    fn request_token_interactive(
        &self,
        request: &TokenRequest,
        window: WindowHandle,
    ) -> Result<TokenResult, PlatformError> {
        let native: IInspectable = self.native_request(request)?.cast()?;
        let interop =
            factory::<WebAuthenticationCoreManager, IWebAuthenticationCoreManagerInterop>()?;

        // SAFETY: `window` is the anchor window, alive until this flow completes.
        let operation: IAsyncOperation<WebTokenRequestResult> = unsafe {
            interop.RequestTokenForWindowAsync(HWND(window.0 as *mut _), &native)?
        };

        Ok(token_result(&operation.get()?)?)
    }
}

fn account_state(state: WebAccountState) -> AccountState {
    match state {
        WebAccountState::Connected => AccountState::Connected,
        WebAccountState::Error => AccountState::Error,
        _ => AccountState::None,
    }
}

fn string_pairs(iterable: &StringPairs) -> windows::core::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let iter = iterable.First()?;

    while iter.HasCurrent()? {
        let pair = iter.Current()?;
        pairs.push((pair.Key()?.to_string(), pair.Value()?.to_string()));
        iter.MoveNext()?;
    }

    Ok(pairs)
}

fn provider_error(error: &WebProviderError) -> Option<ProviderError> {
    Some(ProviderError {
        code: error.ErrorCode().ok()?,
        message: error.ErrorMessage().ok()?.to_string(),
    })
}

fn token_result(result: &WebTokenRequestResult) -> windows::core::Result<TokenResult> {
    let status = match result.ResponseStatus()? {
        WebTokenRequestStatus::Success => TokenStatus::Success,
        WebTokenRequestStatus::UserCancel => TokenStatus::UserCancel,
        WebTokenRequestStatus::AccountSwitch => TokenStatus::AccountSwitch,
        WebTokenRequestStatus::UserInteractionRequired => TokenStatus::UserInteractionRequired,
        WebTokenRequestStatus::AccountProviderNotAvailable => {
            TokenStatus::AccountProviderNotAvailable
        }
        _ => TokenStatus::ProviderError,
    };

    let mut responses = Vec::new();
    if let Ok(data) = result.ResponseData() {
        for index in 0..data.Size()? {
            responses.push(token_response(&data.GetAt(index)?)?);
        }
    }

    Ok(TokenResult {
        status,
        responses,
        provider_error: result.ResponseError().ok().and_then(|e| provider_error(&e)),
    })
}

fn token_response(response: &WebTokenResponse) -> windows::core::Result<TokenResponse> {
    Ok(TokenResponse {
        account_id: response
            .WebAccount()
            .and_then(|account| account.Id())
            .ok()
            .map(|id| id.to_string()),
        token: response.Token()?.to_string(),
        properties: string_pairs(&response.Properties()?.cast()?)?,
        provider_error: response.ProviderError().ok().and_then(|e| provider_error(&e)),
    })
}
