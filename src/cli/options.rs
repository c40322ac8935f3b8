use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser};

use crate::provider::{DEFAULT_CLIENT_ID, DEFAULT_SCOPES};

const EXAMPLES: &str = r#"Examples:
  gettoken
      Run with default configurations

  gettoken --property login_hint=user01@example.com --property prompt=login
      Add the given properties to the request

  gettoken -p login_hint=user01@example.com -p prompt=login
      Same as above, using the short option name -p

  gettoken --scopes "openid profile"
      Use the given scopes for the token

  gettoken --signout
      Sign out from all web accounts before making token requests"#;

#[derive(Parser, Debug)]
#[command(
    name = "gettoken",
    version,
    about = "Acquire tokens from the Windows Web Account Manager",
    disable_help_flag = true,
    disable_version_flag = true,
    after_help = EXAMPLES
)]
pub struct Cli {
    /// Show this help message
    #[arg(short = 'h', long, visible_short_alias = '?', action = ArgAction::Help)]
    help: Option<bool>,

    /// Show version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Client ID [default: d3590ed6-52b3-4102-aeff-aad2292ab01c]
    #[arg(short = 'c', long = "clientid", value_name = "ID")]
    client_id: Option<String>,

    /// Space-delimited scopes of the token [default: "https://outlook.office365.com//.default offline_access openid profile"]
    #[arg(long, value_name = "SCOPES")]
    scopes: Option<String>,

    /// Request property, repeatable (e.g. login_hint=user01@example.com)
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Enumerate web accounts and exit
    #[arg(long = "showaccountsonly")]
    show_accounts_only: bool,

    /// Print the raw token to the console
    #[arg(long = "showtoken")]
    show_token: bool,

    /// Sign out of every web account instead of using it
    #[arg(long = "signout")]
    sign_out: bool,

    /// Disable the trace file
    #[arg(short = 'n', long = "notrace")]
    no_trace: bool,

    /// Folder for the trace file [default: the executable's folder]
    #[arg(short = 't', long = "tracepath", value_name = "DIR")]
    trace_path: Option<PathBuf>,

    /// Wait for Enter before starting
    #[arg(short = 'w', long)]
    wait: bool,

    /// Add the WAM compatibility property
    #[arg(long = "wamcompat")]
    wam_compat: bool,

    /// Add a claims challenge enabling the CP1 client capability
    #[arg(long = "claimcapability")]
    claim_capability: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Resolved configuration of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub client_id: Option<String>,
    pub scopes: Option<String>,
    /// In command-line order; later duplicates win.
    pub properties: Vec<(String, String)>,
    pub show_accounts_only: bool,
    pub show_token: bool,
    pub sign_out: bool,
    pub trace: bool,
    pub trace_path: Option<PathBuf>,
    pub wait: bool,
    pub wam_compat: bool,
    pub claim_capability: bool,
}

impl Options {
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID)
    }

    pub fn scopes(&self) -> &str {
        self.scopes.as_deref().unwrap_or(DEFAULT_SCOPES)
    }
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        Self {
            client_id: cli.client_id,
            scopes: cli.scopes,
            properties: cli.properties,
            show_accounts_only: cli.show_accounts_only,
            show_token: cli.show_token,
            sign_out: cli.sign_out,
            trace: !cli.no_trace,
            trace_path: cli.trace_path,
            wait: cli.wait,
            wam_compat: cli.wam_compat,
            claim_capability: cli.claim_capability,
        }
    }
}

/// Every token in `args` (program name first) that names no known option.
pub fn unknown_options<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let command = Cli::command();
    let mut longs = HashSet::new();
    let mut shorts = HashSet::new();
    let mut long_values = HashSet::new();
    let mut short_values = HashSet::new();

    for arg in command.get_arguments() {
        let takes_value = arg.get_action().takes_values();
        for long in arg.get_long_and_visible_aliases().unwrap_or_default() {
            longs.insert(long.to_string());
            if takes_value {
                long_values.insert(long.to_string());
            }
        }
        for short in arg.get_short_and_visible_aliases().unwrap_or_default() {
            shorts.insert(short);
            if takes_value {
                short_values.insert(short);
            }
        }
    }

    let mut unknown = Vec::new();
    let mut expect_value = false;

    for token in args.into_iter().skip(1) {
        let token = token.into().to_string_lossy().into_owned();

        if expect_value {
            expect_value = false;
            continue;
        }
        if token == "--" {
            break;
        }

        if let Some(long) = token.strip_prefix("--") {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            if !longs.contains(name) {
                unknown.push(token.clone());
            } else if long_values.contains(name) && !inline_value {
                expect_value = true;
            }
        } else if let Some(cluster) = token.strip_prefix('-').filter(|c| !c.is_empty()) {
            for (i, short) in cluster.char_indices() {
                if !shorts.contains(&short) {
                    unknown.push(token.clone());
                    break;
                }
                if short_values.contains(&short) {
                    // The rest of the cluster, if any, is the value.
                    expect_value = i + short.len_utf8() == cluster.len();
                    break;
                }
            }
        } else {
            unknown.push(token);
        }
    }

    unknown
}

/// Console text for an argv that failed to parse.
///
/// Unrecognized tokens are all listed; any other failure shows clap's
/// rendering of `error`.
pub fn parse_failure_message<I, T>(args: I, error: &clap::Error) -> String
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let unknown = unknown_options(args);

    if unknown.is_empty() {
        format!(
            "Failed to parse the input options.\n{}\nPlease check the available options with -h or -?",
            error.render().to_string().trim_end()
        )
    } else {
        format!(
            "Unknown options are found:\n{}\n\nPlease check the available options with --help (-h or -?)",
            unknown.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Options {
        Cli::try_parse_from(args).unwrap().into()
    }

    #[test]
    fn defaults() {
        let options = parse(&["gettoken"]);

        assert!(options.trace);
        assert!(!options.sign_out);
        assert_eq!(options.client_id(), DEFAULT_CLIENT_ID);
        assert_eq!(options.scopes(), DEFAULT_SCOPES);
        assert!(options.properties.is_empty());
    }

    #[test]
    fn all_flags() {
        let options = parse(&[
            "gettoken",
            "-c",
            "my-client",
            "--scopes",
            "openid profile",
            "-p",
            "login_hint=user01@example.com",
            "--property",
            "prompt=login",
            "--showaccountsonly",
            "--showtoken",
            "--signout",
            "-n",
            "--tracepath",
            "C:\\traces",
            "-w",
            "--wamcompat",
            "--claimcapability",
        ]);

        assert_eq!(options.client_id(), "my-client");
        assert_eq!(options.scopes(), "openid profile");
        assert_eq!(
            options.properties,
            vec![
                ("login_hint".to_string(), "user01@example.com".to_string()),
                ("prompt".to_string(), "login".to_string()),
            ]
        );
        assert!(options.show_accounts_only);
        assert!(options.show_token);
        assert!(options.sign_out);
        assert!(!options.trace);
        assert_eq!(options.trace_path, Some(PathBuf::from("C:\\traces")));
        assert!(options.wait);
        assert!(options.wam_compat);
        assert!(options.claim_capability);
    }

    #[test]
    fn property_value_may_contain_equals() {
        let options = parse(&["gettoken", "-p", "claims={\"a\":\"b=c\"}"]);
        assert_eq!(
            options.properties,
            vec![("claims".to_string(), "{\"a\":\"b=c\"}".to_string())]
        );
    }

    #[test]
    fn property_without_equals_is_rejected() {
        let err = Cli::try_parse_from(["gettoken", "-p", "login_hint"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn help_and_version_requests() {
        for flag in ["-h", "--help", "-?"] {
            let err = Cli::try_parse_from(["gettoken", flag]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DisplayHelp, "{}", flag);
        }
        for flag in ["-v", "--version"] {
            let err = Cli::try_parse_from(["gettoken", flag]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DisplayVersion, "{}", flag);
        }
    }

    #[test]
    fn unknown_option_fails_parsing() {
        let err = Cli::try_parse_from(["gettoken", "--bogus"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn every_unknown_token_is_listed() {
        let unknown = unknown_options([
            "gettoken",
            "--bogus",
            "-c",
            "-client-looking-value",
            "-x",
            "--scopes=openid",
            "stray",
            "--tracepath",
            "dir",
            "-nz",
        ]);

        assert_eq!(unknown, vec!["--bogus", "-x", "stray", "-nz"]);
    }

    #[test]
    fn known_tokens_are_not_listed() {
        let unknown = unknown_options([
            "gettoken",
            "-?",
            "-pkey=value",
            "--property",
            "a=b",
            "-nw",
            "--claimcapability",
        ]);

        assert!(unknown.is_empty(), "{:?}", unknown);
    }

    fn failure_message(args: &[&str]) -> String {
        let err = Cli::try_parse_from(args).unwrap_err();
        parse_failure_message(args, &err)
    }

    #[test]
    fn unknown_options_message_lists_each_token() {
        let message = failure_message(&["gettoken", "--bogus", "-n", "stray", "-x"]);

        assert_eq!(
            message,
            "Unknown options are found:\n--bogus\nstray\n-x\n\n\
             Please check the available options with --help (-h or -?)"
        );
    }

    #[test]
    fn invalid_value_message_carries_clap_rendering() {
        let message = failure_message(&["gettoken", "-p", "login_hint"]);

        assert!(message.starts_with("Failed to parse the input options.\n"));
        assert!(message.contains("expected KEY=VALUE, got 'login_hint'"));
        assert!(message.ends_with("Please check the available options with -h or -?"));
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
