use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use texcache_core::CacheSettings;

/// Environment variable naming a TOML or JSON config file.
pub const CONFIG_PATH_ENV: &str = "TEXCACHE_CONFIG_PATH";
/// Environment variable carrying the whole config as inline JSON.
pub const CONFIG_JSON_ENV: &str = "TEXCACHE_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "texcache.toml",
    "texcache.json",
    "config/texcache.toml",
    "config/texcache.json",
];

fn default_log_filter() -> String {
    "info".to_string()
}

/// Where the texture cache configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Built-in defaults.
    #[default]
    Default,
    /// File named by `$TEXCACHE_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// Inline JSON from `$TEXCACHE_CONFIG_JSON`.
    EnvInline,
    /// A default file found under the base directory.
    File(PathBuf),
}

/// Settings for a texture cache plus the logging defaults of the tools that
/// host it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TextureCacheConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Search roots, loader thread name, in-flight dedup, drain interval and
    /// the context-recovery switch.
    pub cache: CacheSettings,
}

impl Default for TextureCacheConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            cache: CacheSettings::default(),
        }
    }
}

impl TextureCacheConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$TEXCACHE_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$TEXCACHE_CONFIG_JSON` (inline JSON),
    /// 3) `texcache.{toml,json}` or `config/texcache.{toml,json}` in the
    ///    working directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        Self::load_with(|name| env::var(name).ok(), Path::new("."))
    }

    /// [`load_from_env`](Self::load_from_env) with an explicit variable
    /// lookup and base directory for the default files.
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        base: &Path,
    ) -> anyhow::Result<(Self, ConfigSource)> {
        if let Some(path_str) = lookup(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    /// Read a config file. `.json` and `.toml` pick the parser; anything else
    /// tries TOML, then JSON.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read texcache config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid texcache config {}", path.display())
            }),
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| {
                    anyhow!(
                        "invalid texcache config {}: {}",
                        path.display(),
                        err
                    )
                })
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Parse `contents` as TOML or JSON. `origin` names the input in errors.
    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // TOML first, JSON as a fallback.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse texcache config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    /// Parse an inline JSON config.
    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid texcache config json: {err}"))
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to render config as TOML")
    }

    fn find_default_file(base: &Path) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }
}
