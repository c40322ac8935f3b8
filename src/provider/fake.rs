//! Scripted [`WebAccountManager`] that records every call it receives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::*;
use crate::auth::request::PromptType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindProvider,
    FindAllAccounts { client_id: String },
    SignOut { account_id: String },
    Silent { account_id: Option<String> },
    Interactive { window: WindowHandle, prompt_type: PromptType },
}

pub struct FakeManager {
    pub provider: Result<Option<Provider>, PlatformError>,
    pub accounts: Result<FindAccountsResult, PlatformError>,
    pub silent: TokenResult,
    pub throwing_accounts: HashSet<String>,
    pub interactive: Result<TokenResult, PlatformError>,
    calls: Arc<Mutex<Vec<Call>>>,
    requests: Arc<Mutex<Vec<TokenRequest>>>,
}

pub fn provider() -> Provider {
    Provider {
        id: PROVIDER_ID.to_string(),
        display_name: "Microsoft".to_string(),
    }
}

pub fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        state: AccountState::Connected,
        properties: vec![("UserName".to_string(), format!("{}@example.com", id))],
    }
}

pub fn success(token: &str) -> TokenResult {
    TokenResult {
        status: TokenStatus::Success,
        responses: vec![TokenResponse {
            account_id: Some("account".to_string()),
            token: token.to_string(),
            properties: Vec::new(),
            provider_error: None,
        }],
        provider_error: None,
    }
}

pub fn failure(status: TokenStatus, error: Option<ProviderError>) -> TokenResult {
    TokenResult {
        status,
        responses: Vec::new(),
        provider_error: error,
    }
}

impl FakeManager {
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            provider: Ok(Some(provider())),
            accounts: Ok(FindAccountsResult {
                status: FindAccountsStatus::Success,
                accounts,
                provider_error: None,
            }),
            silent: success("silent-token"),
            throwing_accounts: HashSet::new(),
            interactive: Ok(success("interactive-token")),
            calls: Arc::default(),
            requests: Arc::default(),
        }
    }

    /// Shared view of the call log, usable after the manager moved away.
    pub fn call_log(&self) -> Arc<Mutex<Vec<Call>>> {
        self.calls.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<TokenRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WebAccountManager for FakeManager {
    fn find_provider(&self, _: &str, _: &str) -> Result<Option<Provider>, PlatformError> {
        self.record(Call::FindProvider);
        self.provider.clone()
    }

    fn find_all_accounts(
        &self,
        _: &Provider,
        client_id: &str,
    ) -> Result<FindAccountsResult, PlatformError> {
        self.record(Call::FindAllAccounts {
            client_id: client_id.to_string(),
        });
        self.accounts.clone()
    }

    fn sign_out(&self, account: &Account) -> Result<(), PlatformError> {
        self.record(Call::SignOut {
            account_id: account.id.clone(),
        });
        Ok(())
    }

    fn get_token_silently(
        &self,
        request: &TokenRequest,
        account: Option<&Account>,
    ) -> Result<TokenResult, PlatformError> {
        let account_id = account.map(|a| a.id.clone());
        self.record(Call::Silent {
            account_id: account_id.clone(),
        });
        self.requests.lock().unwrap().push(request.clone());

        match account_id {
            Some(id) if self.throwing_accounts.contains(&id) => {
                Err(PlatformError::new(0x8000_4005, format!("silent request for {} failed", id)))
            }
            _ => Ok(self.silent.clone()),
        }
    }

    fn request_token_interactive(
        &self,
        request: &TokenRequest,
        window: WindowHandle,
    ) -> Result<TokenResult, PlatformError> {
        self.record(Call::Interactive {
            window,
            prompt_type: request.prompt_type(),
        });
        self.requests.lock().unwrap().push(request.clone());
        self.interactive.clone()
    }
}
