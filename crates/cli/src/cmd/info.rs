use anyhow::Result;
use serde::Serialize;

use nestbuild_lib::consts::{CAP_BUILD_OP_DEFINITION_FILENAME, CAP_CONSTRAINTS, CAP_META_IGNORE_CACHE, CAP_PLATFORM};
use nestbuild_lib::platform::Platform;
use nestbuild_lib::solver::ExecConfig;

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct Info {
  version: &'static str,
  platform: String,
  definition_filename: String,
  capabilities: Vec<&'static str>,
}

pub fn cmd_info(format: OutputFormat) -> Result<()> {
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform: Platform::host().to_string(),
    definition_filename: ExecConfig::from_env().definition_filename,
    capabilities: vec![
      CAP_BUILD_OP_DEFINITION_FILENAME,
      CAP_CONSTRAINTS,
      CAP_META_IGNORE_CACHE,
      CAP_PLATFORM,
    ],
  };

  if format.is_json() {
    return print_json(&info);
  }

  println!("nestbuild {}", info.version);
  print_stat("platform", &info.platform);
  print_stat("definition", &info.definition_filename);
  print_stat("capabilities", &info.capabilities.join(", "));
  Ok(())
}
