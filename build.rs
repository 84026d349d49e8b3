use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn main() {
    let git_commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());

    let git_state = Command::new("git")
        .args(["diff", "--quiet"])
        .status()
        .ok()
        .map(|s| if s.success() { "clean" } else { "dirty" })
        .unwrap_or("unknown");

    println!("cargo:rustc-env=GIT_COMMIT={}", git_commit);
    println!("cargo:rustc-env=GIT_STATE={}", git_state);
    println!("cargo:rustc-env=BUILD_TIME={}", chrono::Utc::now().to_rfc3339());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
