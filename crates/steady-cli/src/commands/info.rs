use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use steady_core::consts::{BYTES_PER_PIXEL, MIN_FRAMES, RECOMMENDED_MIN_FRAMES};
use steady_core::io::binary::frames_in_file;
use steady_core::io::record::load_record;

use crate::summary::print_record_summary;

#[derive(Args)]
pub struct InfoArgs {
    /// Binary movie (.bin) or session record (.json)
    pub file: PathBuf,

    /// Frame height in pixels (binary movies)
    #[arg(long, default_value = "512")]
    pub ly: usize,

    /// Frame width in pixels (binary movies)
    #[arg(long, default_value = "512")]
    pub lx: usize,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    if args.file.extension().and_then(|e| e.to_str()) == Some("json") {
        let record = load_record(&args.file)
            .with_context(|| format!("Failed to read record {}", args.file.display()))?;
        print_record_summary(&record);
        return Ok(());
    }

    let frames = frames_in_file(&args.file, args.ly, args.lx)?;
    let bytes = std::fs::metadata(&args.file)?.len();
    let frame_bytes = (args.ly * args.lx * BYTES_PER_PIXEL) as u64;

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {}x{}", args.lx, args.ly);
    println!("Frames:      {}", frames);
    println!("Data size:   {:.1} MB", bytes as f64 / (1024.0 * 1024.0));
    if bytes % frame_bytes != 0 {
        println!("Trailing:    {} bytes (partial frame)", bytes % frame_bytes);
    }
    if frames < MIN_FRAMES {
        println!("Too few frames to register (need {})", MIN_FRAMES);
    } else if frames < RECOMMENDED_MIN_FRAMES {
        println!("Fewer than {} frames; results may be unreliable", RECOMMENDED_MIN_FRAMES);
    }

    Ok(())
}
