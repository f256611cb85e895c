//! Scoped filesystem access for build ops.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::solver::types::{ExecError, Mountable};

/// Maximum number of symlinks followed while resolving one path.
const MAX_SYMLINKS: usize = 255;

/// Owns a prepared mount and guarantees it is unmounted exactly once.
///
/// Call [`MountGuard::unmount`] on the success path to observe unmount
/// errors; otherwise the mount is released when the guard drops.
pub struct MountGuard {
  mountable: Box<dyn Mountable>,
  mounted: bool,
}

impl MountGuard {
  pub fn new(mountable: Box<dyn Mountable>) -> Self {
    Self {
      mountable,
      mounted: false,
    }
  }

  /// Attach the filesystem and return its root.
  pub fn mount(&mut self) -> Result<PathBuf, ExecError> {
    let root = self.mountable.mount()?;
    self.mounted = true;
    Ok(root)
  }

  pub fn unmount(mut self) -> Result<(), ExecError> {
    self.release()
  }

  fn release(&mut self) -> Result<(), ExecError> {
    if !self.mounted {
      return Ok(());
    }
    self.mounted = false;
    self.mountable.unmount()
  }
}

impl Drop for MountGuard {
  fn drop(&mut self) {
    if let Err(err) = self.release() {
      warn!(error = %err, "failed to unmount");
    }
  }
}

/// Resolve `path` beneath `root` as if `root` were the filesystem root.
///
/// `..` never climbs above `root` and symlinks are followed relative to
/// `root`, so the result always lies inside it. Missing components are kept
/// as is.
pub fn root_path(root: &Path, path: &str) -> Result<PathBuf, ExecError> {
  let invalid = |source: io::Error| ExecError::InvalidPath {
    path: path.to_string(),
    source,
  };

  let mut resolved: Vec<OsString> = Vec::new();
  let mut pending: Vec<OsString> = components(Path::new(path));
  pending.reverse();
  let mut links = 0;

  while let Some(part) = pending.pop() {
    if part == ".." {
      resolved.pop();
      continue;
    }
    resolved.push(part);

    let candidate = join(root, &resolved);
    let meta = match std::fs::symlink_metadata(&candidate) {
      Ok(meta) => meta,
      Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
      Err(err) => return Err(invalid(err)),
    };
    if !meta.file_type().is_symlink() {
      continue;
    }

    links += 1;
    if links > MAX_SYMLINKS {
      return Err(invalid(io::Error::other("too many levels of symbolic links")));
    }

    let target = std::fs::read_link(&candidate).map_err(invalid)?;
    resolved.pop();
    if target.is_absolute() {
      resolved.clear();
    }
    let mut next = components(&target);
    next.reverse();
    pending.extend(next);
  }

  Ok(join(root, &resolved))
}

fn components(path: &Path) -> Vec<OsString> {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(name) => Some(name.to_os_string()),
      Component::ParentDir => Some(OsString::from("..")),
      Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
    })
    .collect()
}

fn join(root: &Path, parts: &[OsString]) -> PathBuf {
  let mut path = root.to_path_buf();
  path.extend(parts);
  path
}
