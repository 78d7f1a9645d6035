use std::fmt;

pub const SIGNING_SECRET_VAR: &str = "SLACK_SIGNING_SECRET";
pub const BOT_TOKEN_VAR: &str = "SLACK_BOT_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{} must be set in .env file", name),
            ConfigError::Invalid(name, value) => write!(f, "{} has invalid value: {}", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Signing secret and bot token for one Slack app.
///
/// Built once at startup and handed to the verifier and the web client.
/// Neither value is ever printed: `Debug` is redacted and there is no
/// `Serialize` impl.
#[derive(Clone)]
pub struct Credentials {
    signing_secret: Vec<u8>,
    bot_token: String,
}

impl Credentials {
    pub fn new(signing_secret: impl Into<Vec<u8>>, bot_token: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Reads `SLACK_SIGNING_SECRET` and `SLACK_BOT_TOKEN` from the process environment.
    ///
    /// `.env` is not loaded here; the binary calls `dotenvy::dotenv()` once at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_secret = required(&lookup, SIGNING_SECRET_VAR)?;
        let bot_token = required(&lookup, BOT_TOKEN_VAR)?;
        Ok(Self::new(signing_secret, bot_token))
    }

    pub fn signing_secret(&self) -> &[u8] {
        &self.signing_secret
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("signing_secret", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

/// Settings for the bundled HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub dry_run: bool,
    pub api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            dry_run: false,
            api_base: crate::slack::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            None => defaults.port,
        };

        // Anything unparseable counts as "off", same as an unset flag
        let dry_run = lookup("DRY_RUN")
            .and_then(|raw| raw.parse::<bool>().ok())
            .unwrap_or(defaults.dry_run);

        let api_base = lookup("SLACK_API_BASE")
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        Ok(Self {
            port,
            dry_run,
            api_base,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}
