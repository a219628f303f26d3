//! Runtime configuration resolved from the command line and environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::cli::Cli;
use crate::models::SlotNumber;

/// How long a single mirror request may take.
const MIRROR_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote mirror settings.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub url: String,
    pub auth: Option<String>,
    pub timeout: Duration,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_path: PathBuf,
    pub max_slots: SlotNumber,
    pub mirror: Option<MirrorConfig>,
    pub capture_cmd: Option<String>,
    pub recognize_cmd: Option<String>,
    pub provider_timeout: Duration,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.slots == 0 {
            bail!("The lot needs at least one slot");
        }
        if cli.provider_timeout == 0 {
            bail!("Provider timeout must be at least one second");
        }

        let mirror = match non_empty(cli.mirror_url.as_deref()) {
            Some(url) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("Mirror URL must start with http:// or https://: {url}");
                }
                Some(MirrorConfig {
                    url: url.to_string(),
                    auth: non_empty(cli.mirror_auth.as_deref()).map(String::from),
                    timeout: MIRROR_TIMEOUT,
                })
            }
            None => None,
        };

        Ok(Self {
            ledger_path: cli.ledger.clone(),
            max_slots: cli.slots,
            mirror,
            capture_cmd: non_empty(cli.capture_cmd.as_deref()).map(String::from),
            recognize_cmd: non_empty(cli.recognize_cmd.as_deref()).map(String::from),
            provider_timeout: Duration::from_secs(cli.provider_timeout),
        })
    }
}

/// Treat blank settings (e.g. an exported but empty env var) as unset.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
