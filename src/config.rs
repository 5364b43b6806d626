//! Harness configuration.
//!
//! Values come from an optional `e2e.toml` next to the test binary's working
//! directory and from the environment, the environment taking precedence:
//!
//! | Variable             | Default                 |
//! |----------------------|-------------------------|
//! | `API_URL`            | `ws://127.0.0.1:9944`   |
//! | `TEST_SUDO_NAME`     | required                |
//! | `NONCE_SERVICE_ADDR` | unset (in-process)      |
//! | `TX_DURABILITY`      | `finalized`             |
//! | `WAIT_BLOCKS`        | `10`                    |
//! | `KEYS_DIR`           | unset                   |

use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
    account::TestAccount,
    error::{Error, Result},
    poller::WaitBudget,
    submit::Durability,
};

pub const DEFAULT_API_URL: &str = "ws://127.0.0.1:9944";
const CONFIG_FILE: &str = "e2e";

// ============================================================================
// HarnessConfig
// ============================================================================

/// Environment of a test run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub api_url: String,
    /// Secret URI of the sudo key
    pub sudo_uri: String,
    /// Address of a shared sequence service, if tests run in several processes
    pub nonce_service: Option<String>,
    pub client: ClientConfig,
    pub keys_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    api_url: Option<String>,
    test_sudo_name: Option<String>,
    nonce_service_addr: Option<String>,
    tx_durability: Option<Durability>,
    wait_blocks: Option<u32>,
    keys_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Load from `e2e.toml` (if present) and the process environment.
    ///
    /// Fails with [`Error::MissingEnvVar`] if `TEST_SUDO_NAME` is not set.
    pub fn from_env() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::default().try_parsing(true));
        Self::build(builder)
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self> {
        let builder = Config::builder()
            .add_source(Environment::default().try_parsing(true).source(Some(vars)));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let raw: RawConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        let sudo_uri = raw
            .test_sudo_name
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingEnvVar("TEST_SUDO_NAME"))?;

        let mut client = ClientConfig::default();
        if let Some(durability) = raw.tx_durability {
            client = client.with_durability(durability);
        }
        if let Some(blocks) = raw.wait_blocks {
            client = client.with_wait_budget(WaitBudget::blocks(blocks));
        }

        Ok(Self {
            api_url: raw.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            sudo_uri,
            nonce_service: raw.nonce_service_addr.filter(|s| !s.is_empty()),
            client,
            keys_dir: raw.keys_dir,
        })
    }

    pub fn sudo(&self) -> Result<TestAccount> {
        TestAccount::from_uri("sudo", &self.sudo_uri)
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Submission and wait behaviour of a [`NodeClient`](crate::ext::NodeClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub durability: Durability,
    /// Budget for event waits that do not pass their own
    pub wait_budget: WaitBudget,
    /// Wall-clock bound on inclusion; `None` waits as long as the node reports progress
    pub inclusion_timeout: Option<Duration>,
    /// Log every event of each included extrinsic at debug level
    pub log_events: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            durability: Durability::Finalized,
            wait_budget: WaitBudget::default(),
            inclusion_timeout: None,
            log_events: true,
        }
    }
}

impl ClientConfig {
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_wait_budget(mut self, budget: WaitBudget) -> Self {
        self.wait_budget = budget;
        self
    }

    pub fn with_inclusion_timeout(mut self, timeout: Duration) -> Self {
        self.inclusion_timeout = Some(timeout);
        self
    }

    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}
