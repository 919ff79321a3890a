use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Disk image path
    pub image: PathBuf,

    /// Image size in blocks; the image file is created or truncated
    #[arg(long, short)]
    pub blocks: Option<usize>,

    /// Print the on-disk structure without formatting
    #[arg(long)]
    pub dump_only: bool,
}
