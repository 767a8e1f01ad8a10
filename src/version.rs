//! Version strings for `--version`.
//!
//! Release builds may set `DKNAP_GIT_REV` at compile time to stamp the
//! revision into the long version.

use std::sync::LazyLock;

/// The package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git revision baked in at build time (empty string if not set).
pub const GIT_REV: &str = match option_env!("DKNAP_GIT_REV") {
    Some(rev) => rev,
    None => "",
};

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    let mut version = full_version();
    version.push_str("\nwire protocol: json-lines v1");
    version
});

/// `"X.Y.Z"`, or `"X.Y.Z (rev)"` when built with a revision.
///
/// ```
/// use dknap::version::full_version;
///
/// assert!(full_version().starts_with(env!("CARGO_PKG_VERSION")));
/// ```
pub fn full_version() -> String {
    if GIT_REV.is_empty() {
        PKG_VERSION.to_string()
    } else {
        format!("{} ({})", PKG_VERSION, GIT_REV)
    }
}

/// Long version for clap's `long_version`.
pub fn long_version() -> &'static str {
    LONG_VERSION.as_str()
}
