use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bsp-readout")]
#[command(bin_name = "bsp-readout")]
#[command(about = "Decode GoldSrc and Source maps and report what they contain")]
pub struct ReadoutCli {
    /// Map files. Base64 text files are decoded first.
    #[arg(required = true)]
    pub maps: Vec<PathBuf>,

    /// Ini file with a [bsp] section.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Print the summary of each map as JSON on stdout.
    #[arg(long, short = 'j', default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Write every lightmap page as raw RGBA8 into this directory.
    #[arg(long, short = 'a')]
    pub atlas: Option<PathBuf>,
}
