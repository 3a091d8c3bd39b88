use std::env;

use abg_common::Secret;
use log::*;
use paypal_tools::PaypalConfig;

const DEFAULT_ABG_HOST: &str = "127.0.0.1";
const DEFAULT_ABG_PORT: u16 = 8360;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub paypal: PaypalConfig,
    pub twocheckout: TwocheckoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ABG_HOST.to_string(),
            port: DEFAULT_ABG_PORT,
            database_url: String::default(),
            paypal: PaypalConfig::default(),
            twocheckout: TwocheckoutConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ABG_HOST").ok().unwrap_or_else(|| DEFAULT_ABG_HOST.into());
        let port = env::var("ABG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ABG_PORT. {e} Using the default, {DEFAULT_ABG_PORT}, instead."
                    );
                    DEFAULT_ABG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ABG_PORT);
        let database_url = env::var("ABG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ABG_DATABASE_URL is not set. Please set it to the URL for the billing database.");
            String::default()
        });
        let paypal = PaypalConfig::new_from_env_or_default();
        let twocheckout = TwocheckoutConfig::from_env_or_default();
        Self { host, port, database_url, paypal, twocheckout }
    }
}

//----------------------------------------  TwocheckoutConfig  --------------------------------------------------------
/// Configuration for the 2Checkout INS integration. The secret word is the only credential; notifications
/// are authenticated with an MD5 hash over (sale id, vendor id, invoice id, secret).
#[derive(Clone, Debug, Default)]
pub struct TwocheckoutConfig {
    pub secret: Secret<String>,
}

impl TwocheckoutConfig {
    pub fn from_env_or_default() -> Self {
        let secret = Secret::new(env::var("ABG_TWOCHECKOUT_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ ABG_TWOCHECKOUT_SECRET is not set. 2Checkout notifications cannot be verified.");
            String::default()
        }));
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret.reveal().is_empty()
    }
}
