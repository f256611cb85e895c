//! Implementation of the `nestbuild inspect` command.
//!
//! Lists every record of a definition file in file order with its kind,
//! inputs and capabilities, followed by the principal output.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use nestbuild_lib::consts::DESCRIPTION_CUSTOM_NAME;
use nestbuild_lib::llb::{Definition, Input, Op};
use nestbuild_lib::util::hash::Digest;

use crate::cmd::load_definition;
use crate::output::{OutputFormat, print_info, print_json, print_stat, short_digest, symbols};

#[derive(Debug, Serialize)]
struct RecordSummary {
  digest: Digest,
  kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  name: Option<String>,
  inputs: Vec<Input>,
  #[serde(skip_serializing_if = "Option::is_none")]
  platform: Option<String>,
  caps: Vec<String>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  ignore_cache: bool,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
  records: Vec<RecordSummary>,
  #[serde(skip_serializing_if = "Option::is_none")]
  entry: Option<Input>,
}

fn summarize(def: &Definition) -> Result<InspectOutput> {
  let mut records = Vec::with_capacity(def.len());
  for bytes in &def.def {
    let digest = Digest::from_bytes(bytes);
    let op = Op::from_bytes(bytes).with_context(|| format!("Failed to decode record {}", digest))?;
    let metadata = def.metadata.get(&digest).cloned().unwrap_or_default();
    records.push(RecordSummary {
      kind: op.kind(),
      name: metadata.description.get(DESCRIPTION_CUSTOM_NAME).cloned(),
      inputs: op.inputs,
      platform: op.platform.map(|p| p.to_string()),
      caps: metadata.caps.into_keys().collect(),
      ignore_cache: metadata.ignore_cache,
      digest,
    });
  }

  let entry = def.head().context("Failed to read principal output")?;
  Ok(InspectOutput { records, entry })
}

pub fn cmd_inspect(file: &Path, format: OutputFormat) -> Result<()> {
  let def = load_definition(file)?;
  let summary = summarize(&def)?;

  if format.is_json() {
    return print_json(&summary);
  }

  print_info(&format!("{} ({} records)", file.display(), summary.records.len()));
  for record in &summary.records {
    match &record.name {
      Some(name) => println!("  {}  {} ({})", short_digest(record.digest.as_str()), record.kind, name),
      None => println!("  {}  {}", short_digest(record.digest.as_str()), record.kind),
    }
    for input in &record.inputs {
      println!("      {} {}[{}]", symbols::ARROW, short_digest(input.digest.as_str()), input.index);
    }
    if let Some(platform) = &record.platform {
      print_stat("platform", platform);
    }
    if !record.caps.is_empty() {
      print_stat("caps", &record.caps.join(", "));
    }
  }

  match &summary.entry {
    Some(entry) => print_stat("entry", &format!("{}[{}]", entry.digest, entry.index)),
    None => print_stat("entry", "none"),
  }
  Ok(())
}
