use clap::Parser;
use std::path::PathBuf;

/// LC-3 virtual machine.
#[derive(Debug, Parser)]
#[clap(name = "lc3vm")]
pub struct Cli {
    /// Runs the built-in test suite instead of an image and exits 0/1.
    #[clap(long)]
    pub test: bool,

    /// Object image files to load, in the order given. Later images
    /// overwrite earlier ones at overlapping addresses.
    #[clap(name = "IMAGE")]
    pub images: Vec<PathBuf>,
}
