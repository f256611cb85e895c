//! Target platform descriptors.
//!
//! Every marshalled op records the platform it targets. When neither the
//! caller nor the node specifies one, the host platform is used.

pub mod arch;
pub mod os;

use std::fmt;

use serde::{Deserialize, Serialize};

use arch::Arch;
use os::Os;

/// An OCI-style platform (e.g. `linux/arm64/v8`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
  pub os: String,
  pub architecture: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variant: Option<String>,
}

impl Platform {
  pub fn new(os: &str, architecture: &str) -> Self {
    Self {
      os: os.to_string(),
      architecture: architecture.to_string(),
      variant: None,
    }
  }

  pub fn with_variant(mut self, variant: &str) -> Self {
    self.variant = Some(variant.to_string());
    self
  }

  /// The platform of the running host.
  ///
  /// Unknown OS or architecture names are passed through verbatim so that a
  /// default platform always exists.
  pub fn host() -> Self {
    let os = Os::current()
      .map(|os| os.as_str().to_string())
      .unwrap_or_else(|| std::env::consts::OS.to_string());
    let architecture = Arch::current()
      .map(|arch| arch.as_str().to_string())
      .unwrap_or_else(|| std::env::consts::ARCH.to_string());
    let variant = match Arch::current() {
      Some(Arch::Arm64) => Some("v8".to_string()),
      _ => None,
    };
    Self {
      os,
      architecture,
      variant,
    }
  }

  /// Parse `os/arch[/variant]`.
  pub fn parse(spec: &str) -> Option<Self> {
    let mut parts = spec.split('/');
    let os = parts.next().filter(|s| !s.is_empty())?;
    let architecture = parts.next().filter(|s| !s.is_empty())?;
    let variant = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    if parts.next().is_some() {
      return None;
    }
    Some(Self {
      os: os.to_string(),
      architecture: architecture.to_string(),
      variant,
    })
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.variant {
      Some(variant) => write!(f, "{}/{}/{}", self.os, self.architecture, variant),
      None => write!(f, "{}/{}", self.os, self.architecture),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_format() {
    assert_eq!(Platform::new("linux", "amd64").to_string(), "linux/amd64");
    assert_eq!(
      Platform::new("linux", "arm64").with_variant("v8").to_string(),
      "linux/arm64/v8"
    );
  }

  #[test]
  fn parse_accepts_two_and_three_parts() {
    assert_eq!(Platform::parse("linux/amd64"), Some(Platform::new("linux", "amd64")));
    assert_eq!(
      Platform::parse("linux/arm/v7"),
      Some(Platform::new("linux", "arm").with_variant("v7"))
    );
  }

  #[test]
  fn parse_rejects_malformed() {
    assert_eq!(Platform::parse("linux"), None);
    assert_eq!(Platform::parse("/amd64"), None);
    assert_eq!(Platform::parse("a/b/c/d"), None);
  }

  #[test]
  fn host_is_never_empty() {
    let host = Platform::host();
    assert!(!host.os.is_empty());
    assert!(!host.architecture.is_empty());
  }

  #[test]
  fn variant_is_omitted_from_json_when_unset() {
    let json = serde_json::to_string(&Platform::new("linux", "amd64")).unwrap();
    assert_eq!(json, r#"{"os":"linux","architecture":"amd64"}"#);
  }
}
