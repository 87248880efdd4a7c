use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::llm::Provider;
use crate::state::ensure_kvitto_home;

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AuthState {
    /// Key for `provider`. The environment wins over `auth.json`.
    pub fn key_for(&self, provider: Provider) -> Option<String> {
        let (env, stored) = match provider {
            Provider::OpenAI => (OPENAI_KEY_ENV, &self.openai_api_key),
            Provider::Anthropic => (ANTHROPIC_KEY_ENV, &self.anthropic_api_key),
        };
        pick_key(std::env::var(env).ok(), stored.clone())
    }
}

fn pick_key(from_env: Option<String>, stored: Option<String>) -> Option<String> {
    from_env
        .filter(|k| !k.trim().is_empty())
        .or(stored.filter(|k| !k.trim().is_empty()))
}

fn auth_path() -> Result<std::path::PathBuf> {
    Ok(ensure_kvitto_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn paste_key(provider: Provider) -> Result<()> {
    let mut auth = load_auth()?;
    match provider {
        Provider::OpenAI => {
            let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
            if !key.starts_with("sk-") {
                bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
            }
            auth.openai_api_key = Some(key);
        }
        Provider::Anthropic => {
            let key = prompt_secret("Paste Anthropic API key (starts with sk-ant-)")?;
            if !key.starts_with("sk-ant-") {
                bail!("key didn't look like an Anthropic API key (expected prefix sk-ant-)");
            }
            auth.anthropic_api_key = Some(key);
        }
    }
    save_auth(&auth)?;
    println!("Saved {} key to {}", provider.as_str(), auth_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_wins() {
        assert_eq!(
            pick_key(Some("sk-env".into()), Some("sk-file".into())).as_deref(),
            Some("sk-env")
        );
        assert_eq!(
            pick_key(None, Some("sk-file".into())).as_deref(),
            Some("sk-file")
        );
        assert_eq!(
            pick_key(Some("  ".into()), Some("sk-file".into())).as_deref(),
            Some("sk-file")
        );
        assert_eq!(pick_key(None, None), None);
    }

    #[test]
    fn test_auth_json_fields_optional() {
        let auth: AuthState = serde_json::from_str(r#"{"openai_api_key":"sk-x"}"#).unwrap();
        assert_eq!(auth.openai_api_key.as_deref(), Some("sk-x"));
        assert!(auth.anthropic_api_key.is_none());
    }
}
