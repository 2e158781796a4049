//! Check system capabilities.

use barpath_common::config::config_file_path;
use barpath_tracking_engine::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("barpath System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for (binary, purpose) in [("ffmpeg", "frame decoding"), ("ffprobe", "duration probing")] {
        if command_exists(binary) {
            println!("[OK] {binary} ({purpose})");
        } else {
            println!("[MISSING] {binary} ({purpose})");
            ready = false;
        }
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!(
            "[INFO] Config: {} (not present, defaults in use)",
            config_path.display()
        );
    }

    println!();
    if ready {
        println!("All required tools are available. barpath is ready.");
    } else {
        println!("Install ffmpeg (which provides ffprobe) and run the check again.");
    }

    Ok(())
}
