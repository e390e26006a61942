use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. Absent means the in-memory store.
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub mochi_pay: MochiPayConfig,
    pub mochi_profile: MochiProfileConfig,
    pub icy_backend: IcyBackendConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub swap: SwapConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    /// hourly, daily or never
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "icy_swap.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for `/internal` routes. Empty disables them.
    #[serde(default)]
    pub internal_secret: String,
}

/// Custodial vault (MochiPay application)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MochiPayConfig {
    pub base_url: String,
    pub application_id: String,
    pub application_owner_id: String,
    pub application_vault_id: String,
    pub application_name: String,
    /// Hex ed25519 key: 32-byte seed or 64-byte keypair
    #[serde(default)]
    pub application_private_key: String,
    pub icy_pool_public_key: String,
    #[serde(default = "default_vault_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MochiProfileConfig {
    pub base_url: String,
    #[serde(default = "default_profile_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IcyBackendConfig {
    pub base_url: String,
    /// Executes signed swaps and token transfers on-chain
    pub relayer_url: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiscordConfig {
    pub api_base: String,
    #[serde(default)]
    pub bot_token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v10".to_string(),
            bot_token: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SwapConfig {
    pub token_decimals: u32,
    pub token_symbol: String,
    pub explorer_base_url: String,
    pub workers: usize,
    pub queue_size: usize,
    /// 0 disables the limit
    pub max_requests_per_profile_per_day: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            token_decimals: 18,
            token_symbol: "ICY".to_string(),
            explorer_base_url: "https://basescan.org".to_string(),
            workers: 4,
            queue_size: 256,
            max_requests_per_profile_per_day: 0,
        }
    }
}

fn default_vault_timeout() -> u64 {
    60
}

fn default_profile_timeout() -> u64 {
    10
}

fn default_backend_timeout() -> u64 {
    20
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            self.postgres_url = Some(url);
        }
        if let Some(key) = lookup("MOCHI_PAY_APPLICATION_PRIVATE_KEY") {
            self.mochi_pay.application_private_key = key;
        }
        if let Some(token) = lookup("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = token;
        }
        if let Some(secret) = lookup("ICY_SWAP_INTERNAL_SECRET") {
            self.gateway.internal_secret = secret;
        }
    }
}
