//! The token flow of a single run.
//!
//! Steps run strictly in order and each platform call completes before the
//! next one starts. Only a missing provider ends the run early with a
//! failure; everything later is reported and the flow moves on.

use tracing::debug;

use super::request::{build_request, PromptType, TokenRequest};
use crate::cli::Options;
use crate::present::Presenter;
use crate::provider::{
    Account, FindAccountsStatus, Provider, TokenResult, TokenStatus, WebAccountManager,
    AUTHORITY_ORGANIZATIONS, PROVIDER_ID,
};
use crate::window::WindowHandle;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

pub struct Orchestrator<'a, M> {
    manager: &'a M,
    options: &'a Options,
    presenter: &'a Presenter,
}

impl<'a, M: WebAccountManager> Orchestrator<'a, M> {
    pub fn new(manager: &'a M, options: &'a Options, presenter: &'a Presenter) -> Self {
        Self {
            manager,
            options,
            presenter,
        }
    }

    /// Runs the whole flow and returns the process exit code.
    pub fn run(&self, window: WindowHandle) -> i32 {
        debug!("Looking up provider {}", PROVIDER_ID);
        let Some(provider) = self.find_provider() else {
            return EXIT_FAILURE;
        };

        debug!("Enumerating accounts");
        let accounts = self.find_accounts(&provider);
        self.presenter.blank();

        if self.options.show_accounts_only {
            debug!("Accounts only; skipping token requests");
            return EXIT_SUCCESS;
        }

        debug!("Requesting tokens silently for {} account(s)", accounts.len());
        self.acquire_silently(&provider, &accounts);
        self.presenter.blank();

        debug!("Requesting a token interactively");
        self.acquire_interactively(&provider, window);

        EXIT_SUCCESS
    }

    fn find_provider(&self) -> Option<Provider> {
        match self.manager.find_provider(PROVIDER_ID, AUTHORITY_ORGANIZATIONS) {
            Ok(Some(provider)) => {
                self.presenter.print_provider(&provider);
                Some(provider)
            }
            Ok(None) => {
                self.presenter.error(&format!(
                    "FindAccountProviderAsync failed to find Provider \"{}\"",
                    PROVIDER_ID
                ));
                None
            }
            Err(e) => {
                self.presenter.error(&format!(
                    "FindAccountProviderAsync failed with an exception. {}",
                    e
                ));
                None
            }
        }
    }

    /// Returns the accounts kept for silent requests. Failures yield none.
    fn find_accounts(&self, provider: &Provider) -> Vec<Account> {
        let found = match self
            .manager
            .find_all_accounts(provider, self.options.client_id())
        {
            Ok(found) => found,
            Err(e) => {
                self.presenter.error(&format!(
                    "FindAllAccountsAsync failed with an exception. {}",
                    e
                ));
                return Vec::new();
            }
        };

        if found.status != FindAccountsStatus::Success {
            self.presenter
                .error(&format!("FindAllAccountsAsync failed with {}", found.status));
            self.presenter
                .print_provider_error(found.provider_error.as_ref());
            return Vec::new();
        }

        self.presenter.print_account_count(found.accounts.len());

        let mut retained = Vec::with_capacity(found.accounts.len());
        for account in found.accounts {
            self.presenter.print_account(&account);

            if self.options.sign_out {
                self.sign_out(&account);
            } else {
                retained.push(account);
            }
        }

        retained
    }

    fn sign_out(&self, account: &Account) {
        self.presenter.warning("  Signing out from this account ...");
        self.presenter
            .trace()
            .write(format!("Signing out of account {}", account.id));

        if let Err(e) = self.manager.sign_out(account) {
            self.presenter
                .error(&format!("SignOutAsync failed with an exception. {}", e));
        }
    }

    fn acquire_silently(&self, provider: &Provider, accounts: &[Account]) {
        self.presenter
            .verbose("Invoking WebAuthenticationCoreManager::GetTokenSilentlyAsync ...");
        let request = build_request(provider, PromptType::Default, self.options, self.presenter.trace());

        if accounts.is_empty() {
            self.request_silently(&request, None);
            return;
        }

        for account in accounts {
            self.request_silently(&request, Some(account));
        }
    }

    fn request_silently(&self, request: &TokenRequest, account: Option<&Account>) {
        if let Some(account) = account {
            self.presenter
                .info(&format!("GetTokenSilentlyAsync with account {}", account.id));
        }

        match self.manager.get_token_silently(request, account) {
            Ok(result) => {
                self.presenter
                    .info(&format!("GetTokenSilentlyAsync returned {}", result.status));

                if result.status == TokenStatus::Success {
                    self.present_success(&result);
                } else {
                    self.presenter
                        .print_provider_error(result.provider_error.as_ref());
                }
            }
            Err(e) => self.presenter.error(&format!(
                "GetTokenSilentlyAsync failed with an exception. {}",
                e
            )),
        }
    }

    fn acquire_interactively(&self, provider: &Provider, window: WindowHandle) {
        self.presenter
            .verbose("Invoking WebAuthenticationCoreManager::RequestTokenAsync ...");
        let request = build_request(
            provider,
            PromptType::ForceAuthentication,
            self.options,
            self.presenter.trace(),
        );

        match self.manager.request_token_interactive(&request, window) {
            Ok(result) => {
                self.presenter
                    .info(&format!("RequestTokenAsync returned {}", result.status));

                match result.status {
                    TokenStatus::Success => self.present_success(&result),
                    TokenStatus::UserCancel => self.presenter.warning("User canceled the request"),
                    _ => self
                        .presenter
                        .print_provider_error(result.provider_error.as_ref()),
                }
            }
            Err(e) => self.presenter.error(&format!(
                "RequestTokenAsync failed with an exception. {}",
                e
            )),
        }
    }

    fn present_success(&self, result: &TokenResult) {
        match result.response() {
            Some(response) => self.presenter.print_token_response(response),
            None => self.presenter.warning("The result carries no token response"),
        }
    }
}
