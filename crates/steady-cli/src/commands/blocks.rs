use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use steady_core::align::blocks::make_blocks;

#[derive(Args)]
pub struct BlocksArgs {
    /// Session config file (TOML)
    pub config: PathBuf,

    /// List every block's pixel range
    #[arg(long)]
    pub list: bool,
}

pub fn run(args: &BlocksArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    if !config.nonrigid {
        bail!("{} registers rigidly; no block grid is used", args.config.display());
    }
    let grid = make_blocks(config.ly, config.lx, config.block_size)?;

    println!("Frame:       {}x{}", config.ly, config.lx);
    println!("Block size:  {}x{}", grid.block_size[0], grid.block_size[1]);
    println!("Grid:        {}x{} ({} blocks)", grid.ny, grid.nx, grid.len());
    println!("Max shift:   {} px residual", config.maxregshift_nr);

    if args.list {
        println!();
        for (i, block) in grid.blocks.iter().enumerate() {
            let (cy, cx) = block.center();
            println!(
                "  {:>3}  y {:>4}..{:<4} x {:>4}..{:<4} centre ({:.1}, {:.1})",
                i, block.y0, block.y1, block.x0, block.x1, cy, cx
            );
        }
    }
    Ok(())
}
