//! Well-known names shared by the construction and execution sides.

/// Where a build-definition op looks for the embedded definition when no
/// filename attribute is recorded on the node.
pub const DEFAULT_DEFINITION_FILENAME: &str = "/nestbuild.llb.definition";

/// Attribute carrying a non-default definition filename.
pub const ATTR_DEFINITION_FILENAME: &str = "llb.definitionfilename";

/// Environment variable overriding the default definition filename at execution time.
pub const DEFINITION_FILENAME_ENV: &str = "NESTBUILD_DEFINITION_FILENAME";

/// Capability declared by every build op: custom definition filenames are understood.
pub const CAP_BUILD_OP_DEFINITION_FILENAME: &str = "build.op.definition-filename";

/// Capabilities declared on the terminal node of every marshalled definition.
pub const CAP_CONSTRAINTS: &str = "constraints";
pub const CAP_PLATFORM: &str = "platform";
pub const CAP_META_IGNORE_CACHE: &str = "meta.ignorecache";

/// Type tag mixed into build op cache keys.
pub const BUILD_CACHE_TYPE: &str = "nestbuild.build.v0";

/// Description key used for human-readable node names.
pub const DESCRIPTION_CUSTOM_NAME: &str = "llb.customname";
