use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rfpflow_core::config::{AppConfig, ProviderConfig};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// Renders the effective configuration with the source of every value. Secrets are redacted.
pub fn run(config: &AppConfig, explicit_path: Option<&Path>) -> CommandResult {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries(config) {
        let source = field_source(
            &key,
            env_key.as_deref(),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&key, &value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

type Entry = (String, String, Option<String>);

fn entries(config: &AppConfig) -> Vec<Entry> {
    let entry = |key: &str, value: String, env_suffix: &str| {
        (key.to_string(), value, Some(format!("RFPFLOW_{env_suffix}")))
    };
    let mut entries = vec![
        entry("database.url", config.database.url.clone(), "DATABASE_URL"),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "DATABASE_MAX_CONNECTIONS",
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "DATABASE_TIMEOUT_SECS",
        ),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), "LLM_TIMEOUT_SECS"),
    ];
    entries.extend(provider_entries("primary", &config.llm.primary));
    entries.extend(provider_entries("fallback", &config.llm.fallback));
    entries.extend([
        entry("workflow.max_retries", config.workflow.max_retries.to_string(), "WORKFLOW_MAX_RETRIES"),
        entry(
            "workflow.backoff_base_secs",
            config.workflow.backoff_base_secs.to_string(),
            "WORKFLOW_BACKOFF_BASE_SECS",
        ),
        entry(
            "workflow.sample_matches_on_empty_catalog",
            config.workflow.sample_matches_on_empty_catalog.to_string(),
            "WORKFLOW_SAMPLE_MATCHES_ON_EMPTY_CATALOG",
        ),
        entry("logging.level", config.logging.level.clone(), "LOGGING_LEVEL"),
        entry("logging.format", format!("{:?}", config.logging.format), "LOGGING_FORMAT"),
    ]);
    entries
}

fn provider_entries(tier: &str, provider: &ProviderConfig) -> Vec<Entry> {
    let entry = |field: &str, value: String| {
        (
            format!("llm.{tier}.{field}"),
            value,
            Some(format!("RFPFLOW_LLM_{}_{}", tier.to_ascii_uppercase(), field.to_ascii_uppercase())),
        )
    };

    vec![
        entry("provider", provider.provider.as_str().to_string()),
        entry("model", provider.model.clone()),
        entry("base_url", provider.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        entry("api_key", redact_api_key(provider)),
    ]
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("rfpflow.toml"), PathBuf::from("config/rfpflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_api_key(provider: &ProviderConfig) -> String {
    match &provider.api_key {
        None => "<unset>".to_string(),
        Some(key) if key.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
