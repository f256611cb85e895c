use std::fmt;

/// CPU architectures with a well-known OCI name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  Amd64,
  Arm64,
  Arm,
  I386,
  Riscv64,
  Ppc64le,
  S390x,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    Self::from_rust(std::env::consts::ARCH)
  }

  /// Map a Rust `target_arch` name to its OCI counterpart.
  pub fn from_rust(arch: &str) -> Option<Self> {
    match arch {
      "x86_64" => Some(Self::Amd64),
      "aarch64" => Some(Self::Arm64),
      "arm" => Some(Self::Arm),
      "x86" => Some(Self::I386),
      "riscv64" => Some(Self::Riscv64),
      "powerpc64" => Some(Self::Ppc64le),
      "s390x" => Some(Self::S390x),
      _ => None,
    }
  }

  /// Returns the OCI identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
      Self::Arm => "arm",
      Self::I386 => "386",
      Self::Riscv64 => "riscv64",
      Self::Ppc64le => "ppc64le",
      Self::S390x => "s390x",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
