pub mod chain;

use crate::cli::Args;
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub enum ConfigError {
    MissingServingEndpoint,
    MissingSetting(&'static str),
    InvalidInvocationMode(String),
    Chain(chain::ChainError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingServingEndpoint =>
                write!(f, "SERVING_ENDPOINT must be set in the environment"),
            ConfigError::MissingSetting(name) => write!(f, "{} must be set", name),
            ConfigError::InvalidInvocationMode(mode) =>
                write!(f, "Invalid invocation mode: '{}' (expected chat or raw)", mode),
            ConfigError::Chain(e) => write!(f, "Chain configuration error: {}", e),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Chain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<chain::ChainError> for ConfigError {
    fn from(err: chain::ChainError) -> Self {
        ConfigError::Chain(err)
    }
}

/// Which request/response shape the serving endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// `{messages, max_tokens}` in, `choices[0].message.content` out.
    Chat,
    /// `{messages}` in, JSON array out with the reply at index 0.
    Raw,
}

impl FromStr for InvocationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(InvocationMode::Chat),
            "raw" => Ok(InvocationMode::Raw),
            _ => Err(ConfigError::InvalidInvocationMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMethod {
    Dbsql,
    HostedTable,
}

impl LogMethod {
    /// Only the exact value `dbsql` selects the SQL warehouse; everything else goes to the hosted table.
    pub fn parse(value: &str) -> Self {
        if value == "dbsql" { LogMethod::Dbsql } else { LogMethod::HostedTable }
    }
}

impl fmt::Display for LogMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMethod::Dbsql => write!(f, "dbsql"),
            LogMethod::HostedTable => write!(f, "hosted table"),
        }
    }
}

/// Settings the chat front-end needs to reach its serving endpoint.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub serving_endpoint: String,
    pub workspace_url: String,
    pub token: String,
    pub invocation_mode: InvocationMode,
    pub send_history: bool,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl FrontendConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let serving_endpoint = args.serving_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingServingEndpoint)?
            .to_string();

        let workspace_url = workspace_url(
            args.full_databricks_host.as_deref(),
            args.databricks_host.as_deref()
        ).ok_or(ConfigError::MissingSetting("DATABRICKS_HOST or FULL_DATABRICKS_HOST"))?;

        Ok(Self {
            serving_endpoint,
            workspace_url,
            token: args.databricks_token.clone(),
            invocation_mode: args.invocation_mode.parse()?,
            send_history: args.send_history,
            max_tokens: args.max_tokens,
            system_prompt: args.system_prompt.clone(),
        })
    }
}

/// Resolves the workspace base URL. The full URL wins; a bare host is given `https://`.
pub fn workspace_url(full_host: Option<&str>, host: Option<&str>) -> Option<String> {
    fn non_empty(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(full) = non_empty(full_host) {
        return Some(full.trim_end_matches('/').to_string());
    }
    non_empty(host).map(|h| {
        let h = h.trim_end_matches('/');
        if h.starts_with("http://") || h.starts_with("https://") {
            h.to_string()
        } else {
            format!("https://{}", h)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["brand-tone-chat"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn full_host_takes_precedence() {
        assert_eq!(
            workspace_url(Some("https://full.example.com/"), Some("bare.example.com")),
            Some("https://full.example.com".to_string())
        );
    }

    #[test]
    fn bare_host_gets_https() {
        assert_eq!(
            workspace_url(None, Some("adb-1.2.azuredatabricks.net")),
            Some("https://adb-1.2.azuredatabricks.net".to_string())
        );
        assert_eq!(workspace_url(Some(""), None), None);
    }

    #[test]
    fn blank_full_host_falls_back_to_trimmed_host() {
        assert_eq!(
            workspace_url(Some("   "), Some("  ws.example.com/ ")),
            Some("https://ws.example.com".to_string())
        );
    }

    #[test]
    fn log_method_is_exact_match() {
        assert_eq!(LogMethod::parse("dbsql"), LogMethod::Dbsql);
        assert_eq!(LogMethod::parse("DBSQL"), LogMethod::HostedTable);
        assert_eq!(LogMethod::parse("supabase"), LogMethod::HostedTable);
    }

    #[test]
    fn invocation_mode_parses() {
        assert_eq!("Raw".parse::<InvocationMode>().unwrap(), InvocationMode::Raw);
        assert!("grpc".parse::<InvocationMode>().is_err());
    }

    #[test]
    fn empty_serving_endpoint_is_fatal() {
        let parsed = args(&["--serving-endpoint", "  ", "--databricks-host", "h"]);
        assert!(matches!(
            FrontendConfig::from_args(&parsed),
            Err(ConfigError::MissingServingEndpoint)
        ));
    }

    #[test]
    fn frontend_config_resolves() {
        let parsed = args(&[
            "--serving-endpoint",
            "brand-tone-bot",
            "--databricks-host",
            "ws.example.com",
            "--invocation-mode",
            "raw",
        ]);
        let config = FrontendConfig::from_args(&parsed).unwrap();
        assert_eq!(config.serving_endpoint, "brand-tone-bot");
        assert_eq!(config.workspace_url, "https://ws.example.com");
        assert_eq!(config.invocation_mode, InvocationMode::Raw);
        assert_eq!(config.max_tokens, 400);
    }
}
