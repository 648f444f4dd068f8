//! Check encoder capabilities.

use clipforge_common::config::config_file_path;
use clipforge_media_model::OperationKind;
use clipforge_render_engine::ffmpeg::{command_exists, FfmpegCapability};
use clipforge_render_engine::host::EncodeCapability;
use clipforge_render_engine::negotiate::candidate_ladder;

pub fn run() -> anyhow::Result<()> {
    println!("Clipforge System Check");
    println!("{}", "=".repeat(50));

    let mut tools_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found in PATH");
        } else {
            println!("[MISSING] {binary} not found in PATH");
            tools_ok = false;
        }
    }

    let capability = FfmpegCapability::probe();
    let ladders = [
        ("burn-in / trim (with audio)", candidate_ladder(OperationKind::Trim, None, true)),
        ("burn-in / trim (silent)", candidate_ladder(OperationKind::Trim, None, false)),
        ("convert to .weba", candidate_ladder(OperationKind::Convert, Some("weba"), false)),
        ("convert to .mkv", candidate_ladder(OperationKind::Convert, Some("mkv"), true)),
    ];

    let mut all_ok = tools_ok;
    for (label, ladder) in &ladders {
        println!();
        println!("{label}:");
        let mut picked = false;
        for candidate in ladder {
            let supported = capability.can_encode(candidate);
            let marker = match (supported, picked) {
                (true, false) => "[PICK]",
                (true, true) => "[OK]  ",
                (false, _) => "[--]  ",
            };
            println!("  {marker} {}", candidate.mime_type());
            picked |= supported;
        }
        if !picked {
            println!("  No supported format for this operation.");
            all_ok = false;
        }
    }

    println!();
    println!("Config: {}", config_file_path().display());
    if all_ok {
        println!("All operations have a supported output format. Clipforge is ready.");
    } else {
        println!("Some operations have no supported output format. Install ffmpeg with libx264, libvpx and libopus.");
    }
    Ok(())
}
