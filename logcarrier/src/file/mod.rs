//! # Rotation-Safe File
//!
//! Append-only file handle that tolerates being renamed away.
//!
//! ## Lifecycle
//!
//! ```text
//!   closed --write--> open --close--> closed --rotate--> closed (new path)
//!                      ^                                   |
//!                      +---------------write---------------+
//! ```
//!
//! - The descriptor is opened lazily by the first write after construction or
//!   rotation, with `create | append` and the configured mode. Missing parent
//!   directories are created with the directory mode.
//! - `rotate` requires the file to be closed and does nothing when no byte was
//!   written since the previous rotation.
//! - An optional symlink names the file holding the freshest data: the live
//!   file once it is opened, the rotated file right after a rotation. The
//!   link is replaced atomically (symlink to a temporary name, then rename).
//! - The current end offset and the bytes-since-rotation counter are part of
//!   the chain state dump; restoring truncates the file back.


use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::binenc::{StateDecoder, StateEncoder};
use crate::snapshot::{RestoreError, StateDump};

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

#[derive(Debug)]
pub struct RotatingFile {
  path: PathBuf,
  link: Option<PathBuf>,
  mode: u32,
  dir_mode: u32,
  file: Option<File>,
  written: u64,
  offset: u64,
}

impl RotatingFile {
  pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
    Self {
      path: path.into(),
      link: None,
      mode,
      dir_mode: DEFAULT_DIR_MODE,
      file: None,
      written: 0,
      offset: 0,
    }
  }

  pub fn with_link(mut self, link: Option<PathBuf>) -> Self {
    self.link = link;
    self
  }

  /// Mode of the parent directories this file creates.
  pub fn with_dir_mode(mut self, mode: u32) -> Self {
    self.dir_mode = mode;
    self
  }

  fn make_dirs(&self, dir: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).mode(self.dir_mode).create(dir)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn link(&self) -> Option<&Path> {
    self.link.as_deref()
  }

  pub fn is_open(&self) -> bool {
    self.file.is_some()
  }

  /// Bytes written since construction or the last rotation.
  pub fn written(&self) -> u64 {
    self.written
  }

  fn open(&mut self) -> io::Result<&mut File> {
    if self.file.is_none() {
      if let Some(parent) = self.path.parent() {
        self.make_dirs(parent)?;
      }
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(self.mode)
        .open(&self.path)?;
      self.offset = file.metadata()?.len();
      let path = self.path.clone();
      self.point_link(&path)?;
      self.file = Some(file);
    }
    match self.file.as_mut() {
      Some(file) => Ok(file),
      None => Err(io::Error::new(io::ErrorKind::NotFound, "file is not open")),
    }
  }

  /// Syncs and releases the descriptor. Closing a closed file is a no-op.
  pub fn close(&mut self) -> io::Result<()> {
    match self.file.take() {
      Some(file) => file.sync_data(),
      None => Ok(()),
    }
  }

  /// Renames the file to `to` and makes `next` the live path.
  ///
  /// Returns `Ok(false)` without touching the filesystem when nothing was
  /// written since the last rotation. An existing `to` is never overwritten.
  ///
  /// # Panics
  ///
  /// Panics if the file is open: the owner must close it first.
  pub fn rotate(&mut self, to: &Path, next: PathBuf) -> io::Result<bool> {
    if self.file.is_some() {
      panic!("rotate of {} while it is still open", self.path.display());
    }
    if self.written == 0 {
      return Ok(false);
    }
    if fs::symlink_metadata(to).is_ok() {
      return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("rotation target {} already exists", to.display()),
      ));
    }
    if let Some(parent) = to.parent() {
      self.make_dirs(parent)?;
    }
    fs::rename(&self.path, to)?;

    self.written = 0;
    self.offset = 0;
    self.path = next;
    if let Err(e) = self.point_link(to) {
      tracing::warn!(link = ?self.link, error = %e, "failed to re-point link after rotation");
    }
    Ok(true)
  }

  /// Current end of file, looking at the disk when the file is closed.
  pub fn offset(&self) -> io::Result<u64> {
    if self.file.is_some() {
      return Ok(self.offset);
    }
    match fs::metadata(&self.path) {
      Ok(meta) => Ok(meta.len()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
      Err(e) => Err(e),
    }
  }

  fn truncate(&mut self, offset: u64) -> io::Result<()> {
    if self.offset()? <= offset {
      return Ok(());
    }
    match self.file.as_ref() {
      Some(file) => file.set_len(offset)?,
      None => OpenOptions::new()
        .write(true)
        .open(&self.path)?
        .set_len(offset)?,
    }
    self.offset = offset;
    Ok(())
  }

  fn point_link(&self, target: &Path) -> io::Result<()> {
    let Some(link) = self.link.as_ref() else {
      return Ok(());
    };
    let target = if target.is_absolute() {
      target.to_path_buf()
    } else {
      std::env::current_dir()?.join(target)
    };
    if let Some(parent) = link.parent() {
      self.make_dirs(parent)?;
    }

    let file_name = link
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let tmp = link.with_file_name(format!(".{}.tmp", file_name));
    match fs::remove_file(&tmp) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
      _ => {},
    }
    symlink(&target, &tmp)?;
    fs::rename(&tmp, link)
  }
}

impl Write for RotatingFile {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let n = self.open()?.write(buf)?;
    self.offset += n as u64;
    self.written += n as u64;
    Ok(n)
  }

  fn flush(&mut self) -> io::Result<()> {
    match self.file.as_mut() {
      Some(file) => file.flush(),
      None => Ok(()),
    }
  }
}

impl StateDump for RotatingFile {
  fn dump_state(&self, enc: &mut StateEncoder<'_>) -> io::Result<()> {
    enc.i64(self.offset()? as i64);
    enc.u64(self.written);
    Ok(())
  }

  fn restore_state(&mut self, dec: &mut StateDecoder<'_>) -> Result<(), RestoreError> {
    let offset = dec.i64("file offset")?;
    let written = dec.u64("bytes since rotation")?;
    if offset < 0 {
      return Err(RestoreError::Corrupt(crate::binenc::CodecError::OutOfRange("file offset")));
    }

    self.truncate(offset as u64)?;
    self.written = written;
    Ok(())
  }
}
