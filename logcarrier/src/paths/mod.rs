//! Destination keys and file naming.
//!
//! File names are produced from small templates:
//!
//! ```text
//! {dir}/{name}                    -> nginx/access
//! {dir}/{name}-{time}             -> nginx/access-20240102150405
//! {dir}/{group}/{name}.{time:%F}  -> nginx/web-1/access.2024-01-02
//! ```
//!
//! `{time}` uses `%Y%m%d%H%M%S`. Rendered paths are lexically cleaned and
//! always joined under a root directory; leading `/` and `..` cannot escape it.


use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

const PLACEHOLDER: &str = r"\{([^{}:]*)(?::([^{}]*))?\}";

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("unknown placeholder `{{{0}}}` in `{1}`")]
  UnknownPlaceholder(String, String),

  #[error("invalid time format `{0}` in `{1}`")]
  InvalidTimeFormat(String, String),

  #[error("template `{0}` renders an empty path")]
  Empty(String),

  #[error("placeholder pattern: {0}")]
  Pattern(#[from] regex::Error),
}

/// Identifies one logical output stream.
///
/// Only the directory is cleaned; name and group are compared verbatim, so
/// no component can reach into its neighbour.
#[derive(Clone, Debug)]
pub struct DestinationKey {
  dir: String,
  name: String,
  group: String,
  clean_dir: String,
  canonical: String,
}

impl DestinationKey {
  pub fn new(dir: &str, name: &str, group: &str) -> Self {
    let clean_dir = clean(dir);
    let canonical = format!("{}/{}/{}", clean_dir, name, group);
    Self {
      dir: dir.to_string(),
      name: name.to_string(),
      group: group.to_string(),
      clean_dir,
      canonical,
    }
  }

  fn identity(&self) -> (&str, &str, &str) {
    (&self.clean_dir, &self.name, &self.group)
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn group(&self) -> &str {
    &self.group
  }

  pub fn as_str(&self) -> &str {
    &self.canonical
  }
}

impl PartialEq for DestinationKey {
  fn eq(&self, other: &Self) -> bool {
    self.identity() == other.identity()
  }
}

impl Eq for DestinationKey {}

impl Hash for DestinationKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.identity().hash(state);
  }
}

impl fmt::Display for DestinationKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Dir,
  Name,
  Group,
  Time(String),
}

/// A parsed naming template.
#[derive(Clone, Debug)]
pub struct Template {
  raw: String,
  segments: Vec<Segment>,
}

impl Template {
  pub fn parse(raw: &str) -> Result<Self, TemplateError> {
    let re = Regex::new(PLACEHOLDER)?;
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in re.captures_iter(raw) {
      let Some(whole) = caps.get(0) else { continue };
      if whole.start() > last {
        segments.push(Segment::Literal(raw[last..whole.start()].to_string()));
      }
      last = whole.end();

      let name = caps.get(1).map_or("", |m| m.as_str());
      let arg = caps.get(2).map(|m| m.as_str());
      let segment = match (name, arg) {
        ("dir", None) => Segment::Dir,
        ("name", None) => Segment::Name,
        ("group", None) => Segment::Group,
        ("time", None) => Segment::Time(DEFAULT_TIME_FORMAT.to_string()),
        ("time", Some(format)) => {
          if format.is_empty() || StrftimeItems::new(format).any(|i| matches!(i, Item::Error)) {
            return Err(TemplateError::InvalidTimeFormat(format.to_string(), raw.to_string()));
          }
          Segment::Time(format.to_string())
        },
        _ => {
          return Err(TemplateError::UnknownPlaceholder(
            whole.as_str().trim_matches(|c| c == '{' || c == '}').to_string(),
            raw.to_string(),
          ))
        },
      };
      segments.push(segment);
    }
    if last < raw.len() {
      segments.push(Segment::Literal(raw[last..].to_string()));
    }
    if clean(raw).is_empty() {
      return Err(TemplateError::Empty(raw.to_string()));
    }

    Ok(Self {
      raw: raw.to_string(),
      segments,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// True if rendering depends on the current time.
  pub fn is_timed(&self) -> bool {
    self.segments.iter().any(|s| matches!(s, Segment::Time(_)))
  }

  pub fn render(&self, key: &DestinationKey, now: DateTime<Local>) -> String {
    let mut out = String::with_capacity(self.raw.len() + 32);
    for segment in &self.segments {
      match segment {
        Segment::Literal(s) => out.push_str(s),
        Segment::Dir => out.push_str(key.dir()),
        Segment::Name => out.push_str(key.name()),
        Segment::Group => out.push_str(key.group()),
        Segment::Time(format) => {
          let _ = write!(out, "{}", now.format(format));
        },
      }
    }
    out
  }
}

/// Where the files of every destination live.
#[derive(Clone, Debug)]
pub struct PathScheme {
  root: PathBuf,
  name: Template,
  rotation: Template,
  link: Option<LinkScheme>,
}

/// Where the "current file" symlinks live.
#[derive(Clone, Debug)]
pub struct LinkScheme {
  pub root: PathBuf,
  pub name: Template,
}

impl PathScheme {
  pub fn new(root: impl Into<PathBuf>, name: Template, rotation: Template) -> Self {
    Self {
      root: root.into(),
      name,
      rotation,
      link: None,
    }
  }

  pub fn with_link(mut self, link: LinkScheme) -> Self {
    self.link = Some(link);
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path of the live file for `key`.
  pub fn current(&self, key: &DestinationKey, now: DateTime<Local>) -> PathBuf {
    under(&self.root, &self.name.render(key, now))
  }

  /// Historical name the live file is renamed to. An explicit name replaces
  /// the template and lands in the destination's directory.
  pub fn rotated(&self, key: &DestinationKey, explicit: Option<&str>, now: DateTime<Local>) -> PathBuf {
    match explicit {
      Some(name) => under(&self.root, &format!("{}/{}", key.dir(), name)),
      None => under(&self.root, &self.rotation.render(key, now)),
    }
  }

  pub fn link(&self, key: &DestinationKey, now: DateTime<Local>) -> Option<PathBuf> {
    self
      .link
      .as_ref()
      .map(|l| under(&l.root, &l.name.render(key, now)))
  }

  /// Directory under the root that holds files of `dir`.
  pub fn directory(&self, dir: &str) -> PathBuf {
    under(&self.root, dir)
  }
}

fn under(root: &Path, rendered: &str) -> PathBuf {
  let cleaned = clean(rendered);
  if cleaned.is_empty() {
    root.to_path_buf()
  } else {
    root.join(cleaned)
  }
}

/// Lexical path cleaning: drops empty and `.` components, resolves `..`
/// against earlier components and discards any that would climb above the
/// start. The result is always relative.
pub fn clean(path: &str) -> String {
  let mut parts: Vec<&str> = Vec::new();
  for part in path.split('/') {
    match part {
      "" | "." => {},
      ".." => {
        parts.pop();
      },
      other => parts.push(other),
    }
  }
  parts.join("/")
}

/// A directory coming from the wire: relative, without `..` components.
pub fn is_safe_dir(dir: &str) -> bool {
  !dir.is_empty()
    && !dir.starts_with('/')
    && dir.split('/').all(|c| c != "..")
    && !dir.contains('\0')
}

/// A single file name coming from the wire.
pub fn is_safe_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}
