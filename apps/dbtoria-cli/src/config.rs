use std::time::Duration;

use anyhow::{Context, Result};
use dbtoria_table::ModelConfig;
use url::Url;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: Url,
    pub service: String,
    pub timeout: Option<Duration>,
    pub log_filter: String,
    pub model: ModelConfig,
}

impl AppConfig {
    /// Endpoint settings come from the command line (which falls back to
    /// `DBTORIA_*`); cache sizing and logging only from the environment.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let endpoint = Url::parse(&cli.url)
            .with_context(|| format!("invalid DbToRia endpoint {}", cli.url))?;
        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,dbtoria=info".into());
        Ok(Self {
            endpoint,
            service: cli.service.clone(),
            timeout: cli.timeout_ms.map(Duration::from_millis),
            log_filter,
            model: ModelConfig::from_env(),
        })
    }
}
