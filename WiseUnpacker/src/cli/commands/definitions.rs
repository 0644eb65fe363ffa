//! CLI command definitions

use std::path::PathBuf;

use clap::Subcommand;

fn parse_offset(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the files of a Wise installer
    Extract {
        /// Installer executable (first volume of a spanned set)
        #[arg(short, long)]
        source: PathBuf,

        /// Output directory
        #[arg(short, long)]
        destination: PathBuf,

        /// Overlay offset to use instead of reading the executable headers
        /// (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_offset)]
        overlay_offset: Option<u64>,

        /// Value of the INST variable while the script runs
        #[arg(long)]
        inst: Option<String>,

        /// Extract the header files only; do not replay the script
        #[arg(long)]
        no_script: bool,

        /// Ignore the overlay header and recover the data offset heuristically
        #[arg(long)]
        legacy: bool,

        /// Do not look for .W01/.001 continuation volumes
        #[arg(long)]
        no_volumes: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show what an installer contains without extracting it
    Info {
        /// Installer executable (first volume of a spanned set)
        #[arg(short, long)]
        source: PathBuf,

        /// Overlay offset to use instead of reading the executable headers
        #[arg(long, value_parser = parse_offset)]
        overlay_offset: Option<u64>,

        /// List every script state
        #[arg(long)]
        states: bool,
    },
}
