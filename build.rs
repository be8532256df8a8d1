// UlpFlacPlayer - Build Script
//
// Emits ESP-IDF link settings and resolves the embedded clip for firmware builds.

use std::process::Command;

fn main() {
    // Host builds (tests, simulator) need none of the ESP-IDF environment
    if std::env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    // ESP-IDF environment setup (MUST be first!)
    embuild::espidf::sysenv::output();

    // Get git version info
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=VERSION_STRING=UlpFlacPlayer v{}-g{}", version, git_hash);

    // The clip is linked into flash; its path comes from the environment
    let clip = match std::env::var("PLAYER_CLIP") {
        Ok(path) => path,
        Err(_) => panic!("PLAYER_CLIP must point at the FLAC file to embed in the firmware image"),
    };
    println!("cargo:rustc-env=PLAYER_CLIP={}", clip);
    println!("cargo:rerun-if-env-changed=PLAYER_CLIP");
    println!("cargo:rerun-if-changed={}", clip);

    // Rebuild if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
}
