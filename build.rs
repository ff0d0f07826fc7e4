//! Captures build metadata for log enrichment.
//!
//! Sets `KEEL_GIT_REVISION` and `KEEL_RUSTC_VERSION` for the crate when they
//! can be determined. Both are optional; `logger::BuildInfo` falls back to
//! runtime values.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=GIT_REVISION");

    let revision = std::env::var("GIT_REVISION")
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| capture("git", &["rev-parse", "--short=12", "HEAD"]));
    if let Some(revision) = revision {
        println!("cargo:rustc-env=KEEL_GIT_REVISION={revision}");
    }

    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_owned());
    if let Some(version) = capture(&rustc, &["--version"]) {
        println!("cargo:rustc-env=KEEL_RUSTC_VERSION={version}");
    }
}

fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}
