//! Process configuration from environment variables.
//!
//! A `.env` file in the working directory is loaded first, if present.
//! Only `BOT_API_KEY` is required.

use std::net::SocketAddr;
use std::path::PathBuf;

use announce_core::compose::IntroTemplate;
use announce_core::coordinator::DEFAULT_FANOUT_CONCURRENCY;
use announce_core::{Action, Audience, BroadcastSettings};
use thiserror::Error;
use url::Url;

pub const DEFAULT_DATABASE_PATH: &str = "./users.db";
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PARSE_MODE: &str = "HTML";

pub const DEFAULT_INTRO: &str =
    "Привет, {first_name}! Новый анонс от «Дамы в потоке» для Тебя ❤️";

const DEFAULT_LINKS: [(&str, &str); 2] = [
    ("Дамы в потоке ❤️", "https://t.me/damy_v_potoke"),
    ("Написать Анастасиюшке ❤️", "https://t.me/anastasia3742"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Operator API settings. Present only when `ADMIN_BIND` is set.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub bind: SocketAddr,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_url: Url,
    pub database_path: PathBuf,
    pub poll_timeout_secs: u64,
    /// Formatting mode for broadcasts; `None` sends plain text.
    pub parse_mode: Option<String>,
    pub broadcast: BroadcastSettings,
    pub admin: Option<AdminConfig>,
}

impl Config {
    /// Read configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bot_token = var("BOT_API_KEY").ok_or(ConfigError::Missing("BOT_API_KEY"))?;

        let api_url = parse_url(
            "TELEGRAM_API_URL",
            &var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;

        let database_path = var("DATABASE_PATH")
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
            .into();

        let poll_timeout_secs = match var("POLL_TIMEOUT_SECS") {
            Some(v) => parse_number("POLL_TIMEOUT_SECS", &v)?,
            None => DEFAULT_POLL_TIMEOUT_SECS,
        };

        // Set but empty disables formatting.
        let parse_mode = match lookup("PARSE_MODE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_PARSE_MODE.to_string()),
        };

        let html = parse_mode.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("HTML"));
        let intro = IntroTemplate::new(var("INTRO_TEMPLATE").unwrap_or_else(|| DEFAULT_INTRO.to_string()))
            .escaping_html(html);

        let mut links = Vec::with_capacity(DEFAULT_LINKS.len());
        for (i, (default_label, default_url)) in DEFAULT_LINKS.iter().enumerate() {
            let label_var = format!("LINK_{}_LABEL", i + 1);
            let url_var = format!("LINK_{}_URL", i + 1);
            let label = var(&label_var).unwrap_or_else(|| default_label.to_string());
            let url = var(&url_var).unwrap_or_else(|| default_url.to_string());
            let url = parse_url(&url_var, &url)?;
            links.push(Action::Link { label, url: url.to_string() });
        }

        let mut broadcast = BroadcastSettings::new(intro, links);
        if let Some(v) = var("BROADCAST_AUDIENCE") {
            broadcast.audience = v
                .parse::<Audience>()
                .map_err(|reason| invalid("BROADCAST_AUDIENCE", reason))?;
        }
        broadcast.fanout_concurrency = match var("FANOUT_CONCURRENCY") {
            Some(v) => {
                let n: usize = parse_number("FANOUT_CONCURRENCY", &v)?;
                if n == 0 {
                    return Err(invalid("FANOUT_CONCURRENCY", "must be at least 1"));
                }
                n
            }
            None => DEFAULT_FANOUT_CONCURRENCY,
        };

        let admin = match var("ADMIN_BIND") {
            Some(bind) => {
                let bind = bind
                    .trim()
                    .parse::<SocketAddr>()
                    .map_err(|e| invalid("ADMIN_BIND", e.to_string()))?;
                let token = var("ADMIN_TOKEN").ok_or(ConfigError::Missing("ADMIN_TOKEN"))?;
                Some(AdminConfig { bind, token })
            }
            None => None,
        };

        Ok(Self {
            bot_token,
            api_url,
            database_path,
            poll_timeout_secs,
            parse_mode,
            broadcast,
            admin,
        })
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { name: name.to_string(), reason: reason.into() }
}

fn parse_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| invalid(name, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(name, format!("unsupported scheme '{other}'"))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| invalid(name, e.to_string()))
}
