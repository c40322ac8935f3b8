//! Rendering of accounts, token responses and provider errors.
//!
//! Everything shown goes to the console and is mirrored into the trace,
//! except the raw token, which only reaches the console and only on request.

use crate::auth::jwt::{self, Base64UrlError};
use crate::console::{Console, Style};
use crate::provider::{Account, Provider, ProviderError, TokenResponse};
use crate::trace::TraceSink;

/// What [`Presenter::print_jwt`] made of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwtDisplay {
    NotJwt,
    Decoded { header: String, payload: String },
    Malformed(Base64UrlError),
}

pub struct Presenter {
    console: Console,
    trace: TraceSink,
    show_token: bool,
}

impl Presenter {
    pub fn new(console: Console, trace: TraceSink, show_token: bool) -> Self {
        Self {
            console,
            trace,
            show_token,
        }
    }

    pub fn trace(&self) -> &TraceSink {
        &self.trace
    }

    fn emit(&self, style: Style, text: &str) {
        self.console.write_line(style, text);
        self.trace.write(text);
    }

    pub fn info(&self, text: &str) {
        self.emit(Style::Plain, text);
    }

    pub fn verbose(&self, text: &str) {
        self.emit(Style::Verbose, text);
    }

    pub fn warning(&self, text: &str) {
        self.console.warning(text);
        self.trace.write(text);
    }

    pub fn error(&self, text: &str) {
        self.emit(Style::Error, text);
    }

    /// Console-only spacing.
    pub fn blank(&self) {
        self.console.line("");
    }

    pub fn print_provider(&self, provider: &Provider) {
        self.console.line("Provider:");
        self.console.line(&format!("  ID: {}", provider.id));
        self.console.line(&format!("  DisplayName: \"{}\"", provider.display_name));
        self.console.line("");
        self.trace.write(format!(
            "Provider: {}; DisplayName: \"{}\"",
            provider.id, provider.display_name
        ));
    }

    pub fn print_account_count(&self, count: usize) {
        if count == 0 {
            self.info("No accounts were found");
        } else {
            self.info(&format!("Found {} web account(s):", count));
        }
    }

    pub fn print_account(&self, account: &Account) {
        self.console.line("");
        self.console.line(&format!("  ID: {}", account.id));
        self.console.line(&format!("  State: {}", account.state));
        self.console.line("  Properties:");
        self.trace.write(format!(
            "Account Id: {}, State: {}",
            account.id, account.state
        ));

        for (key, value) in &account.properties {
            self.emit(Style::Plain, &format!("  [{},{}]", key, value));
        }
    }

    pub fn print_token_response(&self, response: &TokenResponse) {
        let account_id = response.account_id.as_deref().unwrap_or("<none>");
        self.emit(Style::Plain, &format!("  WebAccount Id: {}", account_id));

        if self.show_token {
            self.console.line(&format!("  Token: {}", response.token));
        }
        self.print_jwt(&response.token);

        self.emit(Style::Plain, "  WebTokenResponse Properties:");
        for (key, value) in &response.properties {
            self.emit(Style::Plain, &format!("  [{},{}]", key, value));
        }

        self.print_provider_error(response.provider_error.as_ref());
    }

    /// Decodes header and payload for display. Never fails the caller.
    pub fn print_jwt(&self, token: &str) -> JwtDisplay {
        let Some(parts) = jwt::split_jwt(token) else {
            self.emit(Style::Plain, "  The token does not look like a JWT");
            return JwtDisplay::NotJwt;
        };

        let decoded = jwt::decode_segment(parts.header)
            .and_then(|header| Ok((header, jwt::decode_segment(parts.payload)?)));

        match decoded {
            Ok((header, payload)) => {
                self.emit(Style::Plain, &format!("  JWT Header:\n{}", header));
                self.emit(Style::Plain, &format!("  JWT Payload:\n{}", payload));
                JwtDisplay::Decoded { header, payload }
            }
            Err(e) => {
                self.emit(Style::Warning, &format!("  Failed to decode the token as a JWT: {}", e));
                JwtDisplay::Malformed(e)
            }
        }
    }

    pub fn print_provider_error(&self, error: Option<&ProviderError>) {
        if let Some(error) = error {
            self.emit(
                Style::Error,
                &format!("ErrorCode: {:#x}, ErrorMessage: {}", error.code, error.message),
            );
        }
    }
}
