use std::process::Command;

fn main() {
    // Release builds from a tarball have no .git; packagers pass the hash in.
    println!("cargo:rerun-if-env-changed=BURROW_GIT_SHA");
    if let Some(sha) = std::env::var("BURROW_GIT_SHA").ok().filter(|s| !s.is_empty()) {
        println!("cargo:rustc-env=BURROW_GIT_SHA={sha}");
        return;
    }

    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        println!("cargo:rerun-if-changed={git_dir}/refs/heads");
    }
    let sha = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=BURROW_GIT_SHA={sha}");
}

fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}
