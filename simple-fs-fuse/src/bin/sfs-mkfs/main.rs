mod cli;

use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use clap::Parser;
use cli::Cli;
use simple_fs::{BLOCK_SIZE, SimpleFileSystem};
use simple_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(!cli.dump_only)
        .open(&cli.image)?;
    if let Some(blocks) = cli.blocks {
        fd.set_len((blocks * BLOCK_SIZE) as u64)?;
    }

    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile(Mutex::new(fd)));

    if !cli.dump_only {
        SimpleFileSystem::format(&device).map_err(|e| io::Error::other(e.to_string()))?;
    }

    let dump = SimpleFileSystem::dump(&device).map_err(|e| io::Error::other(e.to_string()))?;
    print!("{dump}");

    Ok(())
}
