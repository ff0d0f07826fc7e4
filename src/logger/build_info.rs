//! Build metadata attached to every log record.

use once_cell::sync::Lazy;

static BUILD_INFO: Lazy<BuildInfo> = Lazy::new(BuildInfo::capture);

/// Source revision and toolchain of the running binary.
///
/// Captured once per process on first access; every later access returns
/// the same instance.
#[derive(Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub git_revision: String,
    pub runtime_version: String,
}

impl BuildInfo {
    pub fn current() -> &'static BuildInfo {
        &BUILD_INFO
    }

    fn capture() -> Self {
        let git_revision = option_env!("KEEL_GIT_REVISION")
            .map(str::to_owned)
            .or_else(|| std::env::var("GIT_REVISION").ok().filter(|r| !r.is_empty()))
            .unwrap_or_else(|| "unknown".to_owned());

        let toolchain = option_env!("KEEL_RUSTC_VERSION").unwrap_or("rustc unknown");
        let runtime_version = format!(
            "{toolchain} ({}-{})",
            std::env::consts::ARCH,
            std::env::consts::OS,
        );

        Self { git_revision, runtime_version }
    }
}
