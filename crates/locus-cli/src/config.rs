use std::fmt;
use std::time::Duration;

use exn::ResultExt;
use is_terminal::IsTerminal;

use crate::cli::Cli;

/// Errors returned while building a [`Config`].
#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub endpoint: String,
    pub timeout: Duration,
    pub max_results: usize,
    pub output: Output,
    pub broadcast: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> exn::Result<Self, Error> {
        let output = if cli.json || !std::io::stdout().is_terminal() {
            Output::Json
        } else {
            Output::Text
        };
        Self::build(cli, output)
    }

    fn build(cli: &Cli, output: Output) -> exn::Result<Self, Error> {
        let Some(api_key) = cli
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        else {
            exn::bail!(Error(
                "missing maps.co API key, pass --api-key or set LOCUS_MAPSCO_API_KEY".into()
            ));
        };

        let endpoint = cli.endpoint.trim().trim_end_matches('/');
        let uri = endpoint
            .parse::<isahc::http::Uri>()
            .or_raise(|| Error(format!("invalid endpoint {endpoint}")))?;
        if !matches!(uri.scheme_str(), Some("http" | "https")) {
            exn::bail!(Error(format!("endpoint {endpoint} must be http or https")));
        }

        if cli.timeout_secs == 0 {
            exn::bail!(Error("timeout must be at least one second".into()));
        }
        if cli.max_results == 0 {
            exn::bail!(Error("max results must be at least one".into()));
        }

        Ok(Self {
            api_key: api_key.to_owned(),
            endpoint: endpoint.to_owned(),
            timeout: Duration::from_secs(cli.timeout_secs),
            max_results: cli.max_results,
            output,
            broadcast: cli.broadcast,
        })
    }
}
