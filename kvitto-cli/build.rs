//! Stamps `kvitto --version` with the commit it was built from.
//!
//! `KVITTO_BUILD_SHA` in the build environment wins (release tarballs have
//! no `.git`); otherwise ask git, and fall back to `dev`.

use std::env;
use std::path::Path;
use std::process::Command;

const SHA_ENV: &str = "KVITTO_BUILD_SHA";

fn git_short_sha(workspace: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(workspace)
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?;
    let sha = sha.trim();
    (!sha.is_empty()).then(|| sha.to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed={SHA_ENV}");

    let manifest = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    let workspace = Path::new(&manifest).join("..");
    if workspace.join(".git").exists() {
        println!("cargo:rerun-if-changed=../.git/HEAD");
    }

    let sha = env::var(SHA_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| git_short_sha(&workspace))
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env={SHA_ENV}={sha}");
}
