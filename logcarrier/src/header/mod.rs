//! Control line parser.
//!
//! ```text
//! DATA <key> <group> <dir> <logname> [<size>]
//! ROTATE <key> <group> <dir> <logname> [<newname>]
//! ```
//!
//! Fields are separated by single spaces; the parsed [`Header`] borrows from
//! the line. A trailing field on any other command is ignored, and so is an
//! empty one. The key is returned as is; comparing it is up to the caller.

mod __test__;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeaderError {
  #[error("no {field} parameter was found in `{line}`")]
  Missing { field: &'static str, line: String },

  #[error("malformed size `{size}` in `{line}`")]
  MalformedSize { size: String, line: String },

  #[error("header line is not valid UTF-8")]
  NotUtf8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
  Data,
  Rotate,
  Other(&'a str),
}

/// How the payload of a DATA request is framed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
  /// Protocol 1: lines until a lone `.`.
  Lines,
  /// Protocol 2: exactly this many raw bytes.
  Sized(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header<'a> {
  pub command: Command<'a>,
  pub key: &'a str,
  pub group: &'a str,
  pub dir: &'a str,
  pub name: &'a str,
  pub size: Option<u64>,
  pub new_name: Option<&'a str>,
}

impl<'a> Header<'a> {
  pub fn protocol(&self) -> Protocol {
    match self.size {
      Some(n) if n > 0 => Protocol::Sized(n),
      _ => Protocol::Lines,
    }
  }
}

pub fn parse(line: &[u8]) -> Result<Header<'_>, HeaderError> {
  let line = line.strip_suffix(b"\n").unwrap_or(line);
  let line = line.strip_suffix(b"\r").unwrap_or(line);
  let line = std::str::from_utf8(line).map_err(|_| HeaderError::NotUtf8)?;

  let mut rest = line;
  let command = next_field(&mut rest, "command", line)?;
  let key = next_field(&mut rest, "key", line)?;
  let group = next_field(&mut rest, "group", line)?;
  let dir = next_field(&mut rest, "dirname", line)?;

  let (name, trailer) = match rest.split_once(' ') {
    Some((name, trailer)) => (name, trailer),
    None => (rest, ""),
  };

  let command = match command {
    "DATA" => Command::Data,
    "ROTATE" => Command::Rotate,
    other => Command::Other(other),
  };

  let mut header = Header {
    command,
    key,
    group,
    dir,
    name,
    size: None,
    new_name: None,
  };
  if trailer.is_empty() {
    return Ok(header);
  }

  match command {
    Command::Data => {
      let size = trailer.parse::<u64>().map_err(|_| HeaderError::MalformedSize {
        size: trailer.to_string(),
        line: line.to_string(),
      })?;
      header.size = Some(size);
    },
    Command::Rotate => header.new_name = Some(trailer),
    Command::Other(_) => {},
  }
  Ok(header)
}

fn next_field<'a>(rest: &mut &'a str, field: &'static str, line: &str) -> Result<&'a str, HeaderError> {
  match rest.split_once(' ') {
    Some((head, tail)) => {
      *rest = tail;
      Ok(head)
    },
    None => Err(HeaderError::Missing {
      field,
      line: line.to_string(),
    }),
  }
}
