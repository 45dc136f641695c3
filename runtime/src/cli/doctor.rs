//! Environment readiness check.

use crate::config::PipelineConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

use super::output;

/// Check browser availability, writable directories, and available memory.
pub async fn run() -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let chromium = find_chromium(config.chromium_path.as_deref());
    let output_ok = is_writable(&config.output_dir);
    let temp_dir = std::env::temp_dir();
    let temp_ok = is_writable(&temp_dir);
    let mem_mb = get_available_memory_mb();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "output_dir": config.output_dir.display().to_string(),
            "output_dir_writable": output_ok,
            "temp_dir_writable": temp_ok,
            "available_memory_mb": mem_mb,
            "interactive_ready": chromium.is_some(),
        }));
        return Ok(());
    }

    println!("flipbook-dl doctor");
    println!("==================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set FLIPBOOK_DL_CHROMIUM_PATH."
        ),
    }

    if output_ok {
        println!("[OK] Output directory writable: {}", config.output_dir.display());
    } else {
        println!("[!!] Output directory not writable: {}", config.output_dir.display());
    }
    if temp_ok {
        println!("[OK] Temp directory writable: {}", temp_dir.display());
    } else {
        println!("[!!] Temp directory not writable: {}", temp_dir.display());
    }

    match mem_mb {
        Some(mb) if mb >= 1024 => println!("[OK] Available memory: {mb}MB"),
        Some(mb) => println!("[!!] Available memory: {mb}MB (interactive capture may be unstable)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY (images and interactive capture)");
    } else {
        println!("Status: READY (images only; --interactive needs a browser)");
    }

    Ok(())
}

/// Probe a directory by creating and removing a marker file.
fn is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".flipbook-dl-probe");
    let ok = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|v| v.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
