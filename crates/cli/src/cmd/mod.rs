mod embed;
mod info;
mod inspect;
mod verify;

pub use embed::cmd_embed;
pub use info::cmd_info;
pub use inspect::cmd_inspect;
pub use verify::cmd_verify;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use nestbuild_lib::llb::Definition;

/// Read a definition file.
pub(crate) fn load_definition(file: &Path) -> Result<Definition> {
  let reader = File::open(file).with_context(|| format!("Failed to open definition: {}", file.display()))?;
  Definition::read_from(BufReader::new(reader))
    .with_context(|| format!("Failed to parse definition: {}", file.display()))
}
