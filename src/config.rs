//! TOML configuration parsing.
//!
//! A single file describes where the content store lives, where the cache
//! document and image derivatives are written, how derivatives are sized,
//! and how the read endpoint pages results. Only `[source]` and `[cache]`
//! are mandatory; every other section has defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub articles: ArticlesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub category: i64,
    #[serde(default = "default_published_state")]
    pub published_state: i64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_published_state() -> i64 {
    1
}
fn default_query_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Path of the JSON cache document.
    pub document: PathBuf,
    /// Directory holding the resized image derivatives.
    pub image_dir: PathBuf,
    /// URL prefix under which `image_dir` is served.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

fn default_public_prefix() -> String {
    "/media/blog".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost/".to_string()
}
fn default_width() -> u32 {
    870
}
fn default_height() -> u32 {
    491
}
fn default_quality() -> u8 {
    85
}
fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArticlesConfig {
    #[serde(default = "default_author")]
    pub default_author: String,
    #[serde(default = "default_intro_max_chars")]
    pub intro_max_chars: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for ArticlesConfig {
    fn default() -> Self {
        Self {
            default_author: default_author(),
            intro_max_chars: default_intro_max_chars(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_author() -> String {
    "Editorial".to_string()
}
fn default_intro_max_chars() -> usize {
    350
}
fn default_page_size() -> usize {
    6
}
fn default_max_page_size() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Include internal error messages in 500 responses. Local debugging only.
    #[serde(default)]
    pub expose_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            expose_errors: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Validate images
        if self.images.width == 0 || self.images.height == 0 {
            bail!("images.width and images.height must be > 0");
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            bail!("images.quality must be in [1, 100]");
        }
        let base = url::Url::parse(&self.images.base_url)
            .with_context(|| format!("images.base_url is not a valid URL: {}", self.images.base_url))?;
        if base.cannot_be_a_base() {
            bail!("images.base_url must be an absolute http(s) URL");
        }

        // Validate cache
        if !self.cache.public_prefix.starts_with('/')
            || self.cache.public_prefix.trim_end_matches('/').is_empty()
        {
            bail!("cache.public_prefix must start with '/' and name a path below the root");
        }

        // Validate articles
        if self.articles.intro_max_chars == 0 {
            bail!("articles.intro_max_chars must be > 0");
        }
        if self.articles.max_page_size == 0 {
            bail!("articles.max_page_size must be > 0");
        }
        if self.articles.default_page_size == 0
            || self.articles.default_page_size > self.articles.max_page_size
        {
            bail!("articles.default_page_size must be in [1, articles.max_page_size]");
        }

        Ok(())
    }
}
