use std::collections::BTreeMap;
use std::fmt;

use crate::cli::Options;
use crate::provider::{
    Provider, CLAIMS_CP1, CLAIMS_KEY, DEFAULT_SCOPES, WAM_COMPAT_KEY, WAM_COMPAT_VALUE,
};
use crate::trace::TraceSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptType {
    Default,
    /// Always shows UI, whatever the cached sign-in state.
    ForceAuthentication,
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptType::Default => "Default",
            PromptType::ForceAuthentication => "ForceAuthentication",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of one token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    provider: Provider,
    scopes: String,
    client_id: String,
    prompt_type: PromptType,
    properties: BTreeMap<String, String>,
}

impl TokenRequest {
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn scopes(&self) -> &str {
        &self.scopes
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn prompt_type(&self) -> PromptType {
        self.prompt_type
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

/// Builds a request from the run options and records it in the trace.
///
/// Properties are inserted as compat marker, claims capability, then the
/// user's `--property` values in command-line order, later keys winning.
pub fn build_request(
    provider: &Provider,
    prompt_type: PromptType,
    options: &Options,
    trace: &TraceSink,
) -> TokenRequest {
    let mut properties = BTreeMap::new();

    if options.wam_compat {
        properties.insert(WAM_COMPAT_KEY.to_string(), WAM_COMPAT_VALUE.to_string());
    }
    if options.claim_capability {
        properties.insert(CLAIMS_KEY.to_string(), CLAIMS_CP1.to_string());
    }
    for (key, value) in &options.properties {
        properties.insert(key.clone(), value.clone());
    }

    let request = TokenRequest {
        provider: provider.clone(),
        scopes: options
            .scopes
            .clone()
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
        client_id: options.client_id().to_string(),
        prompt_type,
        properties,
    };

    trace.write(format!(
        "WebTokenRequest: Provider: {}, ClientId: {}, PromptType: {}",
        request.provider.id, request.client_id, request.prompt_type
    ));
    trace.write(format!("  Scopes: {}", request.scopes));
    for (key, value) in &request.properties {
        trace.write(format!("  Property: [{},{}]", key, value));
    }

    request
}
