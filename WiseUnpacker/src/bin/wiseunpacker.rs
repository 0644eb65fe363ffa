//! WiseUnpacker command-line entry point

fn main() -> anyhow::Result<()> {
    wiseunpacker::cli::run_cli()
}
