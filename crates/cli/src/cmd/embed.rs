//! Implementation of the `nestbuild embed` command.
//!
//! Writes a definition whose principal output is a nested build: solve the
//! definition stored in the filesystem of `source`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use nestbuild_lib::llb::{BuildInfo, Constraints, Definition, build, source};
use nestbuild_lib::platform::Platform;

fn embed(source_id: &str, filename: Option<&str>, platform: Option<&str>) -> Result<Definition> {
  let mut info = BuildInfo::new();
  if let Some(filename) = filename {
    info = info.with_filename(filename);
  }

  let mut constraints = Constraints::new();
  if let Some(spec) = platform {
    let platform = Platform::parse(spec).ok_or_else(|| anyhow!("Invalid platform: {}", spec))?;
    constraints = constraints.with_platform(platform);
  }

  build(&source(source_id), info)
    .marshal(&constraints)
    .with_context(|| format!("Failed to marshal build of {}", source_id))
}

pub fn cmd_embed(source_id: &str, filename: Option<&str>, platform: Option<&str>, output: Option<&Path>) -> Result<()> {
  let def = embed(source_id, filename, platform)?;
  info!(records = def.len(), last = ?def.last(), "marshalled nested build");

  match output {
    Some(path) => {
      let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
      def
        .write_to(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    None => {
      let stdout = std::io::stdout();
      let mut lock = stdout.lock();
      def.write_to(&mut lock).context("Failed to write definition")?;
      writeln!(lock)?;
    }
  }
  Ok(())
}
