use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};

pub const MIN_JWT_SECRET_LEN: usize = 32;

/// S3/MinIO connection; present only when `S3_ENDPOINT` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub prefix: String,
}

impl S3Settings {
    fn from_env() -> Option<Self> {
        let endpoint = var("S3_ENDPOINT")?;
        Some(Self {
            endpoint: endpoint.trim().to_string(),
            bucket: var("S3_BUCKET").unwrap_or_else(|| "duck-pictures".into()),
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            access_key: var("S3_ACCESS_KEY"),
            secret_key: var("S3_SECRET_KEY"),
            prefix: var("S3_PREFIX").map(|p| p.trim_matches('/').to_string()).unwrap_or_else(|| "media".into()),
        })
    }
}

/// Runtime settings, read from the environment at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub bind_addr: String,
    pub port: u16,
    pub frontend_url: String,
    /// Prefix for public image URLs; `/media` serves them from this process.
    pub media_public_url: String,
    pub media_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// In-memory store snapshot directory; `None` keeps state in memory only.
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub enable_hsts: bool,
    /// Media goes to S3 when set, otherwise under `media_dir`.
    pub s3: Option<S3Settings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            frontend_url: "http://localhost:5173".into(),
            media_public_url: "/media".into(),
            media_dir: PathBuf::from("data/media"),
            max_upload_bytes: 5 * 1024 * 1024,
            default_page_size: 12,
            max_page_size: 50,
            data_dir: None,
            database_url: None,
            enable_hsts: false,
            s3: None,
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {name}: '{raw}'")),
        None => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let cfg = Self {
            jwt_secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            token_ttl_hours: parsed("TOKEN_TTL_HOURS", d.token_ttl_hours)?,
            bcrypt_cost: parsed("BCRYPT_COST", d.bcrypt_cost)?,
            bind_addr: var("BIND_ADDR").unwrap_or(d.bind_addr),
            port: parsed("PORT", d.port)?,
            frontend_url: var("FRONTEND_URL").unwrap_or(d.frontend_url),
            media_public_url: var("MEDIA_PUBLIC_URL").unwrap_or(d.media_public_url),
            media_dir: var("MEDIA_DIR").map(PathBuf::from).unwrap_or(d.media_dir),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", d.max_upload_bytes)?,
            default_page_size: parsed("DEFAULT_PAGE_SIZE", d.default_page_size)?,
            max_page_size: parsed("MAX_PAGE_SIZE", d.max_page_size)?,
            data_dir: var("DATA_DIR").map(PathBuf::from),
            database_url: var("DATABASE_URL"),
            enable_hsts: flag("ENABLE_HSTS"),
            s3: S3Settings::from_env(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long");
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31");
        }
        if self.token_ttl_hours <= 0 {
            bail!("TOKEN_TTL_HOURS must be positive");
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            bail!("page sizes must be positive");
        }
        if self.default_page_size > self.max_page_size {
            bail!("DEFAULT_PAGE_SIZE must not exceed MAX_PAGE_SIZE");
        }
        if self.max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be positive");
        }
        if let Some(s3) = &self.s3 {
            if !s3.endpoint.contains("://") {
                bail!("S3_ENDPOINT must be an absolute URL, got '{}'", s3.endpoint);
            }
            if s3.access_key.is_some() != s3.secret_key.is_some() {
                bail!("S3_ACCESS_KEY and S3_SECRET_KEY must be set together");
            }
        }
        Ok(())
    }

    /// Public URL for a stored media key.
    pub fn media_url(&self, key: &str) -> String {
        format!("{}/{}", self.media_public_url.trim_end_matches('/'), key)
    }

    /// Inverse of [`media_url`](Self::media_url); `None` for URLs we did not issue.
    pub fn media_key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let base = self.media_public_url.trim_end_matches('/');
        url.strip_prefix(base)?.strip_prefix('/').filter(|k| !k.is_empty())
    }

    /// Clamps user-supplied paging to `(page >= 1, 1 <= limit <= max_page_size)`.
    pub fn page_window(&self, page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(self.default_page_size).clamp(1, self.max_page_size);
        (page, limit)
    }
}
