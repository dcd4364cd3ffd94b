use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub timeout_secs: u64,
    /// Serves MEDIUM and above.
    pub primary: ProviderConfig,
    /// Serves LOW complexity and is the alternate when the primary fails.
    pub fallback: ProviderConfig,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub sample_matches_on_empty_catalog: bool,
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
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
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
    pub primary_provider: Option<LlmProvider>,
    pub primary_model: Option<String>,
    pub fallback_provider: Option<LlmProvider>,
    pub fallback_model: Option<String>,
    pub max_retries: Option<u32>,
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
                url: "sqlite://rfpflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                timeout_secs: 60,
                primary: ProviderConfig {
                    provider: LlmProvider::Ollama,
                    model: "llama3.1".to_string(),
                    api_key: None,
                    base_url: Some("http://localhost:11434".to_string()),
                },
                fallback: ProviderConfig {
                    provider: LlmProvider::Ollama,
                    model: "llama3.2:3b".to_string(),
                    api_key: None,
                    base_url: Some("http://localhost:11434".to_string()),
                },
            },
            workflow: WorkflowConfig {
                max_retries: 3,
                backoff_base_secs: 1,
                sample_matches_on_empty_catalog: false,
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
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rfpflow.toml"));
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

        if let Some(llm) = patch.llm {
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(primary) = llm.primary {
                primary.apply_to(&mut self.llm.primary);
            }
            if let Some(fallback) = llm.fallback {
                fallback.apply_to(&mut self.llm.fallback);
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(max_retries) = workflow.max_retries {
                self.workflow.max_retries = max_retries;
            }
            if let Some(backoff_base_secs) = workflow.backoff_base_secs {
                self.workflow.backoff_base_secs = backoff_base_secs;
            }
            if let Some(sample_matches) = workflow.sample_matches_on_empty_catalog {
                self.workflow.sample_matches_on_empty_catalog = sample_matches;
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
        if let Some(value) = read_env("RFPFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RFPFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RFPFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RFPFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RFPFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RFPFLOW_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RFPFLOW_LLM_TIMEOUT_SECS", &value)?;
        }
        apply_provider_env("RFPFLOW_LLM_PRIMARY", &mut self.llm.primary)?;
        apply_provider_env("RFPFLOW_LLM_FALLBACK", &mut self.llm.fallback)?;

        if let Some(value) = read_env("RFPFLOW_WORKFLOW_MAX_RETRIES") {
            self.workflow.max_retries = parse_u32("RFPFLOW_WORKFLOW_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("RFPFLOW_WORKFLOW_BACKOFF_BASE_SECS") {
            self.workflow.backoff_base_secs =
                parse_u64("RFPFLOW_WORKFLOW_BACKOFF_BASE_SECS", &value)?;
        }
        if let Some(value) = read_env("RFPFLOW_WORKFLOW_SAMPLE_MATCHES_ON_EMPTY_CATALOG") {
            self.workflow.sample_matches_on_empty_catalog =
                parse_bool("RFPFLOW_WORKFLOW_SAMPLE_MATCHES_ON_EMPTY_CATALOG", &value)?;
        }

        let log_level =
            read_env("RFPFLOW_LOGGING_LEVEL").or_else(|| read_env("RFPFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RFPFLOW_LOGGING_FORMAT").or_else(|| read_env("RFPFLOW_LOG_FORMAT"));
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
        if let Some(provider) = overrides.primary_provider {
            self.llm.primary.provider = provider;
        }
        if let Some(model) = overrides.primary_model {
            self.llm.primary.model = model;
        }
        if let Some(provider) = overrides.fallback_provider {
            self.llm.fallback.provider = provider;
        }
        if let Some(model) = overrides.fallback_model {
            self.llm.fallback.model = model;
        }
        if let Some(max_retries) = overrides.max_retries {
            self.workflow.max_retries = max_retries;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_provider_env(prefix: &str, provider: &mut ProviderConfig) -> Result<(), ConfigError> {
    if let Some(value) = read_env(&format!("{prefix}_PROVIDER")) {
        provider.provider = value.parse()?;
    }
    if let Some(value) = read_env(&format!("{prefix}_MODEL")) {
        provider.model = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_API_KEY")) {
        provider.api_key = Some(secret_value(value));
    }
    if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
        provider.base_url = Some(value);
    }
    Ok(())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rfpflow.toml"), PathBuf::from("config/rfpflow.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    validate_provider("llm.primary", &llm.primary)?;
    validate_provider("llm.fallback", &llm.fallback)?;
    Ok(())
}

fn validate_provider(section: &str, provider: &ProviderConfig) -> Result<(), ConfigError> {
    if provider.model.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{section}.model must not be empty")));
    }

    match provider.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = provider
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(format!(
                    "{section}.api_key is required for openai/anthropic providers"
                )));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                provider.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(format!(
                    "{section}.base_url is required for ollama provider"
                )));
            }
        }
    }

    if let Some(base_url) = &provider.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{section}.base_url must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_retries > 10 {
        return Err(ConfigError::Validation(
            "workflow.max_retries must be in range 0..=10".to_string(),
        ));
    }

    if workflow.backoff_base_secs > 60 {
        return Err(ConfigError::Validation(
            "workflow.backoff_base_secs must be in range 0..=60".to_string(),
        ));
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    timeout_secs: Option<u64>,
    primary: Option<ProviderPatch>,
    fallback: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    provider: Option<LlmProvider>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl ProviderPatch {
    fn apply_to(self, target: &mut ProviderConfig) {
        if let Some(provider) = self.provider {
            target.provider = provider;
        }
        if let Some(model) = self.model {
            target.model = model;
        }
        if let Some(api_key) = self.api_key {
            target.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = self.base_url {
            target.base_url = Some(base_url);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    max_retries: Option<u32>,
    backoff_base_secs: Option<u64>,
    sample_matches_on_empty_catalog: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.workflow.max_retries == 3, "default max retries should be 3")?;
        ensure(config.workflow.backoff_base_secs == 1, "default backoff base should be 1s")?;
        ensure(
            !config.workflow.sample_matches_on_empty_catalog,
            "sample matches should be disabled by default",
        )?;
        ensure(
            config.llm.primary.model != config.llm.fallback.model,
            "primary and fallback tiers should use distinct models",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfpflow.toml");
            fs::write(
                &path,
                r#"
[llm.primary]
provider = "openai"
model = "gpt-4o"
api_key = "${TEST_OPENAI_KEY}"
base_url = "https://api.openai.com/v1"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.primary.provider == LlmProvider::OpenAi,
                "primary provider should come from the file",
            )?;
            ensure(
                config
                    .llm
                    .primary
                    .api_key
                    .as_ref()
                    .is_some_and(|key| key.expose_secret() == "sk-from-env"),
                "api key should be interpolated from the environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPFLOW_LOG_LEVEL", "warn");
        env::set_var("RFPFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["RFPFLOW_LOG_LEVEL", "RFPFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("RFPFLOW_WORKFLOW_MAX_RETRIES", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfpflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
max_retries = 2
backoff_base_secs = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.workflow.max_retries == 5, "env max retries should win over file")?;
            ensure(config.workflow.backoff_base_secs == 2, "file backoff should win over default")?;
            Ok(())
        })();

        clear_vars(&["RFPFLOW_DATABASE_URL", "RFPFLOW_WORKFLOW_MAX_RETRIES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPFLOW_LLM_FALLBACK_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.fallback.api_key")
            );
            ensure(has_message, "validation failure should mention llm.fallback.api_key")
        })();

        clear_vars(&["RFPFLOW_LLM_FALLBACK_PROVIDER"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPFLOW_LLM_PRIMARY_PROVIDER", "anthropic");
        env::set_var("RFPFLOW_LLM_PRIMARY_API_KEY", "sk-ant-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("sk-ant-secret-value"),
                "debug output should not contain the provider api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["RFPFLOW_LLM_PRIMARY_PROVIDER", "RFPFLOW_LLM_PRIMARY_API_KEY"]);
        result
    }
}
