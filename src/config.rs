//! Configuration management for the gateway
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::account::NonceStrategy;
use crate::utxo::FeeDeductionPolicy;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "NODEGATE_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    pub bitcoin: BitcoinConfig,
    pub ethereum: EthereumConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitcoinConfig {
    pub endpoint_test: String,
    pub endpoint_main: String,
    pub rpc_user: String,
    pub rpc_password: String,
    #[serde(default)]
    pub fee_policy: FeeDeductionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub endpoint_test: String,
    pub endpoint_main: String,
    #[serde(default)]
    pub nonce_strategy: NonceStrategy,
}

impl Settings {
    /// Load settings from the file named by `NODEGATE_CONFIG`, or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::from_file(&config_path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be greater than zero");
        }

        for (ledger, test, main) in [
            ("bitcoin", &self.bitcoin.endpoint_test, &self.bitcoin.endpoint_main),
            ("ethereum", &self.ethereum.endpoint_test, &self.ethereum.endpoint_main),
        ] {
            if test.trim().is_empty() || main.trim().is_empty() {
                anyhow::bail!("{} needs both endpoint_test and endpoint_main", ledger);
            }
        }

        if self.bitcoin.rpc_user.is_empty() || self.bitcoin.rpc_password.is_empty() {
            anyhow::bail!("bitcoin rpc_user and rpc_password must be set");
        }

        if self.ethereum.nonce_strategy == NonceStrategy::Node {
            tracing::warn!(
                "ethereum.nonce_strategy = \"node\": concurrent transfers from one sender may reuse a nonce"
            );
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    let result = re.replace_all(input, |cap: &regex::Captures| {
        env::var(&cap[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[rpc]
timeout_secs = 10

[bitcoin]
endpoint_test = "http://127.0.0.1:18332"
endpoint_main = "http://127.0.0.1:8332"
rpc_user = "user"
rpc_password = "${NODEGATE_TEST_BTC_PASSWORD}"
fee_policy = "sender"

[ethereum]
endpoint_test = "http://127.0.0.1:8545"
endpoint_main = "http://127.0.0.1:8546"
nonce_strategy = "local"
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("NODEGATE_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${NODEGATE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");

        let missing = substitute_env_vars("a = \"${NODEGATE_TEST_UNSET_VAR}\"").unwrap();
        assert_eq!(missing, "a = \"\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("NODEGATE_TEST_BTC_PASSWORD", "secret");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.api.port, 8080);
        assert_eq!(settings.rpc.timeout(), Duration::from_secs(10));
        assert_eq!(settings.bitcoin.rpc_password, "secret");
        assert_eq!(settings.bitcoin.fee_policy, FeeDeductionPolicy::SenderBears);
        assert_eq!(settings.ethereum.nonce_strategy, NonceStrategy::Local);
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let trimmed = SAMPLE
            .replace("[rpc]\ntimeout_secs = 10\n", "")
            .replace("fee_policy = \"sender\"\n", "")
            .replace("nonce_strategy = \"local\"\n", "")
            .replace("${NODEGATE_TEST_BTC_PASSWORD}", "pw");

        let settings = Settings::from_toml(&trimmed).unwrap();
        assert_eq!(settings.rpc.timeout_secs, 30);
        assert_eq!(settings.bitcoin.fee_policy, FeeDeductionPolicy::DestinationBears);
        assert_eq!(settings.ethereum.nonce_strategy, NonceStrategy::Node);
    }

    #[test]
    fn test_validation_rejects_missing_endpoint() {
        let broken = SAMPLE
            .replace("endpoint_main = \"http://127.0.0.1:8546\"", "endpoint_main = \"\"")
            .replace("${NODEGATE_TEST_BTC_PASSWORD}", "pw");
        let err = Settings::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("ethereum"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let broken = SAMPLE
            .replace("timeout_secs = 10", "timeout_secs = 0")
            .replace("${NODEGATE_TEST_BTC_PASSWORD}", "pw");
        assert!(Settings::from_toml(&broken).is_err());
    }
}
