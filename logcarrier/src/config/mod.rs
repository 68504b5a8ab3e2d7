//! # Configuration
//!
//! The daemon reads one TOML file. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! listen = "0.0.0.0:1466"
//! wait_timeout = "60s"
//! key = "key"
//!
//! [files]
//! root = "./logs"
//! name = "{dir}/{name}"
//! rotation = "{dir}/{name}-{time}"
//!
//! [compression]
//! method = "zstd"
//! level = 6
//!
//! [buffers]
//! input = "128Kb"
//! framing = "256Kb"
//!
//! [workers]
//! flusher_sleep = "30s"
//!
//! [logrotate]
//! method = "both"
//! schedule = "0 0 * * * *"
//! ```
//!
//! Sizes take an optional `Kb`, `Mb` or `Gb` suffix. Durations are
//! humantime strings such as `500ms`, `30s` or `1m`.

mod __test__;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::chain::ChainConfig;
use crate::compress::{Codec, Method};
use crate::file::DEFAULT_FILE_MODE;
use crate::header_worker::RouteSettings;
use crate::paths::{LinkScheme, PathScheme, Template, TemplateError};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot read configuration file `{path}`: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse configuration: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("failed to render configuration: {0}")]
  Render(#[from] toml::ser::Error),

  #[error("invalid `{field}` template: {source}")]
  Template {
    field: &'static str,
    #[source]
    source: TemplateError,
  },

  #[error("invalid value for `{field}`: {reason}")]
  InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    ConfigError::InvalidValue {
      field,
      reason: reason.into(),
    }
  }
}

/// A byte count written as `1024`, `"1024"`, `"128Kb"`, `"4Mb"` or `"1Gb"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SizeRepr", into = "SizeRepr")]
pub struct Size(pub u64);

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

impl Size {
  pub fn kb(n: u64) -> Self {
    Size(n * KB)
  }

  pub fn bytes(&self) -> u64 {
    self.0
  }

  pub fn as_usize(&self) -> usize {
    usize::try_from(self.0).unwrap_or(usize::MAX)
  }
}

impl FromStr for Size {
  type Err = String;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let split = text
      .find(|c: char| !c.is_ascii_digit())
      .unwrap_or(text.len());
    if split == 0 {
      return Err(format!("digits must come first in size `{}`", text));
    }
    let (digits, suffix) = text.split_at(split);
    let factor = match suffix {
      "" => 1,
      "Kb" => KB,
      "Mb" => MB,
      "Gb" => GB,
      other => {
        return Err(format!(
          "unknown unit `{}` in size `{}`, only Kb, Mb and Gb are supported",
          other, text
        ))
      },
    };
    let value: u64 = digits
      .parse()
      .map_err(|e| format!("bad size `{}`: {}", text, e))?;
    value
      .checked_mul(factor)
      .map(Size)
      .ok_or_else(|| format!("size `{}` overflows", text))
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let n = self.0;
    match n {
      0 => write!(f, "0"),
      _ if n % GB == 0 => write!(f, "{}Gb", n / GB),
      _ if n % MB == 0 => write!(f, "{}Mb", n / MB),
      _ if n % KB == 0 => write!(f, "{}Kb", n / KB),
      _ => write!(f, "{}", n),
    }
  }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SizeRepr {
  Bytes(u64),
  Text(String),
}

impl TryFrom<SizeRepr> for Size {
  type Error = String;

  fn try_from(repr: SizeRepr) -> Result<Self, Self::Error> {
    match repr {
      SizeRepr::Bytes(n) => Ok(Size(n)),
      SizeRepr::Text(text) => text.parse(),
    }
  }
}

impl From<Size> for SizeRepr {
  fn from(size: Size) -> Self {
    SizeRepr::Text(size.to_string())
  }
}

/// Which rotation triggers are honoured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMethod {
  /// Only the cron schedule rotates files.
  Periodic,
  /// Only `ROTATE` requests do.
  Guided,
  #[default]
  Both,
}

impl RotationMethod {
  pub fn periodic(&self) -> bool {
    matches!(self, RotationMethod::Periodic | RotationMethod::Both)
  }

  pub fn guided(&self) -> bool {
    matches!(self, RotationMethod::Guided | RotationMethod::Both)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub listen: SocketAddr,
  /// Deadline of every single read or write on a connection.
  #[serde(with = "humantime_serde")]
  pub wait_timeout: Duration,
  /// Shared secret every request must carry.
  pub key: String,
  /// Write the daemon's own log here instead of stdout.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub logfile: Option<PathBuf>,
  pub log_level: String,

  pub files: FilesConfig,
  pub links: LinksConfig,
  pub compression: CompressionConfig,
  pub buffers: BuffersConfig,
  pub workers: WorkersConfig,
  pub logrotate: LogrotateConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      listen: SocketAddr::from(([0, 0, 0, 0], 1466)),
      wait_timeout: Duration::from_secs(60),
      key: "key".to_string(),
      logfile: None,
      log_level: "info".to_string(),
      files: FilesConfig::default(),
      links: LinksConfig::default(),
      compression: CompressionConfig::default(),
      buffers: BuffersConfig::default(),
      workers: WorkersConfig::default(),
      logrotate: LogrotateConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
  pub root: PathBuf,
  /// Permission bits of directories created under `root`.
  pub root_mode: u32,
  pub file_mode: u32,
  pub name: String,
  pub rotation: String,
}

impl Default for FilesConfig {
  fn default() -> Self {
    Self {
      root: PathBuf::from("./logs"),
      root_mode: 0o755,
      file_mode: DEFAULT_FILE_MODE,
      name: "{dir}/{name}".to_string(),
      rotation: "{dir}/{name}-{time}".to_string(),
    }
  }
}

/// Symlinks to the file currently being written. Disabled without a `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub root: Option<PathBuf>,
  pub name: String,
}

impl Default for LinksConfig {
  fn default() -> Self {
    Self {
      root: None,
      name: "{dir}/{name}".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
  pub method: Method,
  pub level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffersConfig {
  pub input: Size,
  pub framing: Size,
  /// Queue lengths in front of each pool.
  pub connections: usize,
  pub dumps: usize,
  pub logrotates: usize,
}

impl Default for BuffersConfig {
  fn default() -> Self {
    Self {
      input: Size::kb(128),
      framing: Size::kb(256),
      connections: 1024,
      dumps: 512,
      logrotates: 512,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
  pub route: usize,
  pub dumper: usize,
  pub logrotater: usize,
  #[serde(with = "humantime_serde")]
  pub flusher_sleep: Duration,
}

impl Default for WorkersConfig {
  fn default() -> Self {
    Self {
      route: 1024,
      dumper: 24,
      logrotater: 48,
      flusher_sleep: Duration::from_secs(30),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogrotateConfig {
  pub method: RotationMethod,
  /// Cron expression with a seconds field.
  pub schedule: String,
}

impl Default for LogrotateConfig {
  fn default() -> Self {
    Self {
      method: RotationMethod::Both,
      schedule: "0 0 * * * *".to_string(),
    }
  }
}

impl Config {
  /// Reads and validates the file at `path`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    text.parse()
  }

  pub fn to_toml(&self) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(self)?)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.wait_timeout.is_zero() {
      return Err(ConfigError::invalid("wait_timeout", "must be positive"));
    }
    if self.workers.flusher_sleep.is_zero() {
      return Err(ConfigError::invalid("workers.flusher_sleep", "must be positive"));
    }
    for (field, value) in [
      ("buffers.input", self.buffers.input.bytes() as usize),
      ("buffers.framing", self.buffers.framing.bytes() as usize),
      ("buffers.connections", self.buffers.connections),
      ("buffers.dumps", self.buffers.dumps),
      ("buffers.logrotates", self.buffers.logrotates),
      ("workers.route", self.workers.route),
      ("workers.dumper", self.workers.dumper),
      ("workers.logrotater", self.workers.logrotater),
    ] {
      if value == 0 {
        return Err(ConfigError::invalid(field, "must be positive"));
      }
    }
    tracing::Level::from_str(&self.log_level)
      .map_err(|_| ConfigError::invalid("log_level", format!("unknown level `{}`", self.log_level)))?;
    if self.logrotate.method.periodic() {
      cron::Schedule::from_str(&self.logrotate.schedule)
        .map_err(|e| ConfigError::invalid("logrotate.schedule", e.to_string()))?;
    }
    self.scheme().map(|_| ())
  }

  /// Where files, rotated files and links go.
  pub fn scheme(&self) -> Result<PathScheme, ConfigError> {
    let template = |field, raw: &str| {
      Template::parse(raw).map_err(|source| ConfigError::Template { field, source })
    };
    let scheme = PathScheme::new(
      &self.files.root,
      template("files.name", &self.files.name)?,
      template("files.rotation", &self.files.rotation)?,
    );
    match &self.links.root {
      Some(root) => Ok(scheme.with_link(LinkScheme {
        root: root.clone(),
        name: template("links.name", &self.links.name)?,
      })),
      None => Ok(scheme),
    }
  }

  pub fn chain_config(&self) -> ChainConfig {
    ChainConfig {
      input: self.buffers.input.as_usize(),
      framing: self.buffers.framing.as_usize(),
      codec: Codec::new(self.compression.method, self.compression.level),
      file_mode: self.files.file_mode,
      dir_mode: self.files.root_mode,
    }
  }

  pub fn route_settings(&self, scheme: Arc<PathScheme>) -> RouteSettings {
    RouteSettings {
      key: self.key.clone(),
      scheme,
      dir_mode: self.files.root_mode,
      wait_timeout: self.wait_timeout,
      guided_rotation: self.logrotate.method.guided(),
    }
  }
}

impl FromStr for Config {
  type Err = ConfigError;

  /// Parses and validates TOML text.
  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let config: Config = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }
}
