use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EscalationPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
    pub negotiation: NegotiationConfig,
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
pub struct EmailConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub send_domain: String,
    pub parse_domain: String,
    pub sender_label: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct VoiceConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub agent_phone_number_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub sender_phone_id: Option<String>,
    pub dashboard_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub follow_up_delay_secs: i64,
    pub worker_poll_secs: u64,
    pub max_follow_ups: u32,
}

#[derive(Clone, Debug)]
pub struct NegotiationConfig {
    pub escalation_policy: EscalationPolicyKind,
    pub max_escalations: u32,
}

impl NegotiationConfig {
    pub fn policy(&self) -> EscalationPolicy {
        match self.escalation_policy {
            EscalationPolicyKind::ActivityCounter => EscalationPolicy::ActivityCounter,
            EscalationPolicyKind::HardCap => {
                EscalationPolicy::HardCap { max_escalations: self.max_escalations }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Groq,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicyKind {
    ActivityCounter,
    HardCap,
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
    pub llm_model: Option<String>,
    pub email_api_key: Option<String>,
    pub send_domain: Option<String>,
    pub parse_domain: Option<String>,
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
                url: "sqlite://parley.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            email: EmailConfig {
                api_key: None,
                base_url: "https://api.sendgrid.com/v3".to_string(),
                send_domain: "mail.parley.dev".to_string(),
                parse_domain: "parse.mail.parley.dev".to_string(),
                sender_label: "via Parley".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            voice: VoiceConfig {
                api_key: None,
                base_url: "https://api.elevenlabs.io/v1/convai".to_string(),
                agent_phone_number_id: None,
            },
            notify: NotifyConfig {
                enabled: false,
                api_key: None,
                base_url: "https://graph.facebook.com/v19.0".to_string(),
                sender_phone_id: None,
                dashboard_base_url: None,
            },
            scheduler: SchedulerConfig {
                follow_up_delay_secs: 86_400,
                worker_poll_secs: 30,
                max_follow_ups: 3,
            },
            negotiation: NegotiationConfig {
                escalation_policy: EscalationPolicyKind::ActivityCounter,
                max_escalations: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|groq|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for EscalationPolicyKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "activity_counter" => Ok(Self::ActivityCounter),
            "hard_cap" => Ok(Self::HardCap),
            other => Err(ConfigError::Validation(format!(
                "unsupported escalation policy `{other}` (expected activity_counter|hard_cap)"
            ))),
        }
    }
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    email: Option<EmailPatch>,
    llm: Option<LlmPatch>,
    voice: Option<VoicePatch>,
    notify: Option<NotifyPatch>,
    scheduler: Option<SchedulerPatch>,
    negotiation: Option<NegotiationPatch>,
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
struct EmailPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    send_domain: Option<String>,
    parse_domain: Option<String>,
    sender_label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct VoicePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    agent_phone_number_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifyPatch {
    enabled: Option<bool>,
    api_key: Option<String>,
    base_url: Option<String>,
    sender_phone_id: Option<String>,
    dashboard_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    follow_up_delay_secs: Option<i64>,
    worker_poll_secs: Option<u64>,
    max_follow_ups: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationPatch {
    escalation_policy: Option<EscalationPolicyKind>,
    max_escalations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
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

        if let Some(email) = patch.email {
            if let Some(api_key) = email.api_key {
                self.email.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = email.base_url {
                self.email.base_url = base_url;
            }
            if let Some(send_domain) = email.send_domain {
                self.email.send_domain = send_domain;
            }
            if let Some(parse_domain) = email.parse_domain {
                self.email.parse_domain = parse_domain;
            }
            if let Some(sender_label) = email.sender_label {
                self.email.sender_label = sender_label;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(voice) = patch.voice {
            if let Some(api_key) = voice.api_key {
                self.voice.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = voice.base_url {
                self.voice.base_url = base_url;
            }
            if let Some(agent_phone_number_id) = voice.agent_phone_number_id {
                self.voice.agent_phone_number_id = Some(agent_phone_number_id);
            }
        }

        if let Some(notify) = patch.notify {
            if let Some(enabled) = notify.enabled {
                self.notify.enabled = enabled;
            }
            if let Some(api_key) = notify.api_key {
                self.notify.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = notify.base_url {
                self.notify.base_url = base_url;
            }
            if let Some(sender_phone_id) = notify.sender_phone_id {
                self.notify.sender_phone_id = Some(sender_phone_id);
            }
            if let Some(dashboard_base_url) = notify.dashboard_base_url {
                self.notify.dashboard_base_url = Some(dashboard_base_url);
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(follow_up_delay_secs) = scheduler.follow_up_delay_secs {
                self.scheduler.follow_up_delay_secs = follow_up_delay_secs;
            }
            if let Some(worker_poll_secs) = scheduler.worker_poll_secs {
                self.scheduler.worker_poll_secs = worker_poll_secs;
            }
            if let Some(max_follow_ups) = scheduler.max_follow_ups {
                self.scheduler.max_follow_ups = max_follow_ups;
            }
        }

        if let Some(negotiation) = patch.negotiation {
            if let Some(escalation_policy) = negotiation.escalation_policy {
                self.negotiation.escalation_policy = escalation_policy;
            }
            if let Some(max_escalations) = negotiation.max_escalations {
                self.negotiation.max_escalations = max_escalations;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("PARLEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PARLEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARLEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_EMAIL_API_KEY") {
            self.email.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_EMAIL_BASE_URL") {
            self.email.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_EMAIL_SEND_DOMAIN") {
            self.email.send_domain = value;
        }
        if let Some(value) = read_env("PARLEY_EMAIL_PARSE_DOMAIN") {
            self.email.parse_domain = value;
        }
        if let Some(value) = read_env("PARLEY_EMAIL_SENDER_LABEL") {
            self.email.sender_label = value;
        }

        if let Some(value) = read_env("PARLEY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PARLEY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PARLEY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PARLEY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PARLEY_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PARLEY_VOICE_API_KEY") {
            self.voice.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_VOICE_BASE_URL") {
            self.voice.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_VOICE_AGENT_PHONE_NUMBER_ID") {
            self.voice.agent_phone_number_id = Some(value);
        }

        if let Some(value) = read_env("PARLEY_NOTIFY_ENABLED") {
            self.notify.enabled = parse_bool("PARLEY_NOTIFY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NOTIFY_API_KEY") {
            self.notify.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_NOTIFY_BASE_URL") {
            self.notify.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_NOTIFY_SENDER_PHONE_ID") {
            self.notify.sender_phone_id = Some(value);
        }
        if let Some(value) = read_env("PARLEY_NOTIFY_DASHBOARD_BASE_URL") {
            self.notify.dashboard_base_url = Some(value);
        }

        if let Some(value) = read_env("PARLEY_SCHEDULER_FOLLOW_UP_DELAY_SECS") {
            self.scheduler.follow_up_delay_secs =
                parse_i64("PARLEY_SCHEDULER_FOLLOW_UP_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SCHEDULER_WORKER_POLL_SECS") {
            self.scheduler.worker_poll_secs =
                parse_u64("PARLEY_SCHEDULER_WORKER_POLL_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SCHEDULER_MAX_FOLLOW_UPS") {
            self.scheduler.max_follow_ups = parse_u32("PARLEY_SCHEDULER_MAX_FOLLOW_UPS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_NEGOTIATION_ESCALATION_POLICY") {
            self.negotiation.escalation_policy = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_MAX_ESCALATIONS") {
            self.negotiation.max_escalations =
                parse_u32("PARLEY_NEGOTIATION_MAX_ESCALATIONS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_PORT") {
            self.server.port = parse_u16("PARLEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
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
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(email_api_key) = overrides.email_api_key {
            self.email.api_key = Some(secret_value(email_api_key));
        }
        if let Some(send_domain) = overrides.send_domain {
            self.email.send_domain = send_domain;
        }
        if let Some(parse_domain) = overrides.parse_domain {
            self.email.parse_domain = parse_domain;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_email(&self.email)?;
        validate_scheduler(&self.scheduler)?;
        validate_negotiation(&self.negotiation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.send_domain.trim().is_empty() || email.parse_domain.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.send_domain and email.parse_domain must be set".to_string(),
        ));
    }
    if email.send_domain == email.parse_domain {
        return Err(ConfigError::Validation(
            "email.parse_domain must differ from email.send_domain so reply traffic \
             routes into the inbound webhook"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.follow_up_delay_secs <= 0 {
        return Err(ConfigError::Validation(
            "scheduler.follow_up_delay_secs must be greater than zero".to_string(),
        ));
    }
    if scheduler.worker_poll_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler.worker_poll_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_negotiation(negotiation: &NegotiationConfig) -> Result<(), ConfigError> {
    if negotiation.escalation_policy == EscalationPolicyKind::HardCap
        && negotiation.max_escalations == 0
    {
        return Err(ConfigError::Validation(
            "negotiation.max_escalations must be greater than zero under the hard_cap policy"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "unsupported logging.level `{other}` (expected trace|debug|info|warn|error)"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() }),
    }
}
