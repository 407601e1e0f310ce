use super::{Config, ProviderEndpoint};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const HOSTED_KEY_ENV: &str = "GITHUB_TOKEN";
pub const FAST_KEY_ENV: &str = "GROQ_API_KEY";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL_ENV: &str = "CHATRELAY_DEFAULT_MODEL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    finalize(config, |name| std::env::var(name).ok())
}

/// Built-in defaults completed from the environment.
pub fn config_from_env() -> Result<Config> {
    finalize(Config::default(), |name| std::env::var(name).ok())
}

pub(crate) fn finalize<F>(config: Config, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let config = substitute_env_vars(config, &env);
    let config = apply_env_fallbacks(config, &env);
    validate_config(&config)?;
    Ok(config)
}

fn substitute_env_vars<F>(mut config: Config, env: &F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    for provider in [
        &mut config.providers.hosted,
        &mut config.providers.fast,
        &mut config.providers.gemini,
    ] {
        substitute_key(provider, env);
    }

    config
}

fn substitute_key<F>(provider: &mut ProviderEndpoint, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = &provider.api_key {
        if key.starts_with("${") && key.ends_with('}') {
            let var_name = &key[2..key.len() - 1];
            provider.api_key = env(var_name);
        }
    }
}

fn apply_env_fallbacks<F>(mut config: Config, env: &F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let fallbacks = [
        (&mut config.providers.hosted, HOSTED_KEY_ENV),
        (&mut config.providers.fast, FAST_KEY_ENV),
        (&mut config.providers.gemini, GEMINI_KEY_ENV),
    ];
    for (provider, var) in fallbacks {
        if provider.credential().is_none() {
            provider.api_key = env(var);
        }
    }

    if let Some(model) = env(DEFAULT_MODEL_ENV).filter(|m| !m.trim().is_empty()) {
        config.models.default = model;
    }

    config
}

fn validate_config(config: &Config) -> Result<()> {
    if config.models.default.trim().is_empty() {
        anyhow::bail!("Default model must be specified");
    }

    if config.rate_limit.limit == 0 {
        anyhow::bail!("rate_limit.limit must be greater than zero");
    }

    if config.rate_limit.window_secs == 0 {
        anyhow::bail!("rate_limit.window_secs must be greater than zero");
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be greater than zero");
    }

    if config.providers.retry.initial_backoff_ms > config.providers.retry.max_backoff_ms {
        anyhow::bail!("providers.retry.initial_backoff_ms exceeds max_backoff_ms");
    }

    Ok(())
}
