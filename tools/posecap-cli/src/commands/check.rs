//! Check encoder availability.

use posecap_capture_engine::pipeline::{self, REQUIRED_ELEMENTS};

pub fn run() -> anyhow::Result<()> {
    println!("Posecap System Check");
    println!("{}", "=".repeat(50));

    if let Err(e) = pipeline::init_gstreamer() {
        println!("[FAIL] GStreamer: {e}");
        println!();
        println!("Use `posecap replay --sink raw` to record without an encoder.");
        return Ok(());
    }
    println!("[OK] GStreamer initialized");

    let missing = pipeline::missing_elements()?;
    for element in REQUIRED_ELEMENTS {
        if missing.contains(&element) {
            println!("[MISSING] {element}");
        } else {
            println!("[OK] {element}");
        }
    }

    println!();
    if missing.is_empty() {
        println!("All required elements are available. Posecap is ready.");
    } else {
        println!("Some elements are missing; install the GStreamer good/base plugin sets.");
    }

    Ok(())
}
