use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub poap: PoapConfig,
    pub email: EmailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct PoapConfig {
    /// Static API key sent on every issuance request. Absent key puts
    /// the issuer in mock mode (synthesized claim links only).
    pub api_key: Option<SecretString>,
    /// OAuth client-credentials pair for the bearer token exchange.
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub auth_url: String,
    pub audience: String,
    pub api_url: String,
    /// Base for synthesized fallback/mock claim links.
    pub claim_base_url: String,
    /// Provider-side bearer token lifetime. The cache refreshes at 23/24
    /// of this value to stay clear of the exact expiry.
    pub token_lifetime_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub from_address: Option<String>,
}

impl EmailConfig {
    /// The transport is real only when every piece is present; anything
    /// less runs the notifier in mock mode.
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some() && self.from_address.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub poap_api_key: Option<String>,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from_address: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://poapbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
            },
            poap: PoapConfig {
                api_key: None,
                client_id: None,
                client_secret: None,
                auth_url: "https://auth.accounts.poap.xyz/oauth/token".to_string(),
                audience: "https://api.poap.tech".to_string(),
                api_url: "https://api.poap.xyz".to_string(),
                claim_base_url: "https://poap.xyz".to_string(),
                token_lifetime_secs: 24 * 60 * 60,
            },
            email: EmailConfig { api_url: None, api_key: None, from_address: None },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("poapbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token_value);
            }
            if let Some(signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret_value);
            }
        }

        if let Some(poap) = patch.poap {
            if let Some(api_key_value) = poap.api_key {
                self.poap.api_key = Some(secret_value(api_key_value));
            }
            if let Some(client_id) = poap.client_id {
                self.poap.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = poap.client_secret {
                self.poap.client_secret = Some(secret_value(client_secret_value));
            }
            if let Some(auth_url) = poap.auth_url {
                self.poap.auth_url = auth_url;
            }
            if let Some(audience) = poap.audience {
                self.poap.audience = audience;
            }
            if let Some(api_url) = poap.api_url {
                self.poap.api_url = api_url;
            }
            if let Some(claim_base_url) = poap.claim_base_url {
                self.poap.claim_base_url = claim_base_url;
            }
            if let Some(token_lifetime_secs) = poap.token_lifetime_secs {
                self.poap.token_lifetime_secs = token_lifetime_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(api_url) = email.api_url {
                self.email.api_url = Some(api_url);
            }
            if let Some(api_key_value) = email.api_key {
                self.email.api_key = Some(secret_value(api_key_value));
            }
            if let Some(from_address) = email.from_address {
                self.email.from_address = Some(from_address);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("POAPBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("POAPBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("POAPBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("POAPBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("POAPBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("POAPBOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("POAPBOT_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }

        if let Some(value) = read_env("POAPBOT_POAP_API_KEY") {
            self.poap.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("POAPBOT_POAP_CLIENT_ID") {
            self.poap.client_id = Some(value);
        }
        if let Some(value) = read_env("POAPBOT_POAP_CLIENT_SECRET") {
            self.poap.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("POAPBOT_POAP_AUTH_URL") {
            self.poap.auth_url = value;
        }
        if let Some(value) = read_env("POAPBOT_POAP_AUDIENCE") {
            self.poap.audience = value;
        }
        if let Some(value) = read_env("POAPBOT_POAP_API_URL") {
            self.poap.api_url = value;
        }
        if let Some(value) = read_env("POAPBOT_POAP_CLAIM_BASE_URL") {
            self.poap.claim_base_url = value;
        }
        if let Some(value) = read_env("POAPBOT_POAP_TOKEN_LIFETIME_SECS") {
            self.poap.token_lifetime_secs =
                parse_u64("POAPBOT_POAP_TOKEN_LIFETIME_SECS", &value)?;
        }

        if let Some(value) = read_env("POAPBOT_EMAIL_API_URL") {
            self.email.api_url = Some(value);
        }
        if let Some(value) = read_env("POAPBOT_EMAIL_API_KEY") {
            self.email.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("POAPBOT_EMAIL_FROM_ADDRESS") {
            self.email.from_address = Some(value);
        }

        if let Some(value) = read_env("POAPBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("POAPBOT_SERVER_PORT") {
            self.server.port = parse_u16("POAPBOT_SERVER_PORT", &value)?;
        }

        let log_level = read_env("POAPBOT_LOGGING_LEVEL").or_else(|| read_env("POAPBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("POAPBOT_LOGGING_FORMAT").or_else(|| read_env("POAPBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(api_key) = overrides.poap_api_key {
            self.poap.api_key = Some(secret_value(api_key));
        }
        if let Some(api_url) = overrides.email_api_url {
            self.email.api_url = Some(api_url);
        }
        if let Some(api_key) = overrides.email_api_key {
            self.email.api_key = Some(secret_value(api_key));
        }
        if let Some(from_address) = overrides.email_from_address {
            self.email.from_address = Some(from_address);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_poap(&self.poap)?;
        validate_email(&self.email)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("poapbot.toml"), PathBuf::from("config/poapbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps"
                .to_string(),
        ));
    }

    if slack.signing_secret.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required to verify inbound event requests. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
        ));
    }

    Ok(())
}

fn validate_poap(poap: &PoapConfig) -> Result<(), ConfigError> {
    if poap.client_id.is_some() != poap.client_secret.is_some() {
        return Err(ConfigError::Validation(
            "poap.client_id and poap.client_secret must be configured together".to_string(),
        ));
    }

    if poap.api_key.is_some() && poap.client_id.is_none() {
        return Err(ConfigError::Validation(
            "poap.api_key is set but the OAuth client credentials are missing; issuance would always fall back".to_string(),
        ));
    }

    if poap.token_lifetime_secs < 60 {
        return Err(ConfigError::Validation(
            "poap.token_lifetime_secs must be at least 60".to_string(),
        ));
    }

    for (field, url) in [
        ("poap.auth_url", &poap.auth_url),
        ("poap.api_url", &poap.api_url),
        ("poap.claim_base_url", &poap.claim_base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    let any_set =
        email.api_url.is_some() || email.api_key.is_some() || email.from_address.is_some();
    if any_set && !email.is_configured() {
        return Err(ConfigError::Validation(
            "email transport requires api_url, api_key and from_address together (leave all unset for mock mode)".to_string(),
        ));
    }

    if let Some(api_url) = &email.api_url {
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "email.api_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some(from_address) = &email.from_address {
        if !from_address.contains('@') {
            return Err(ConfigError::Validation(
                "email.from_address must be an email address".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    poap: Option<PoapPatch>,
    email: Option<EmailPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PoapPatch {
    api_key: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_url: Option<String>,
    audience: Option<String>,
    api_url: Option<String>,
    claim_base_url: Option<String>,
    token_lifetime_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    api_url: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
