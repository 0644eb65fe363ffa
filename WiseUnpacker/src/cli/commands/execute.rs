//! Command execution implementations

use super::Commands;
use super::{extract, info};
use crate::unpacker::ExtractionOptions;

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying command fails.
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Extract {
                source,
                destination,
                overlay_offset,
                inst,
                no_script,
                legacy,
                no_volumes,
                quiet,
            } => {
                let options = ExtractionOptions::new()
                    .with_overlay_offset(*overlay_offset)
                    .with_source_directory(inst.clone())
                    .with_run_script(!no_script)
                    .with_force_legacy(*legacy)
                    .with_discover_volumes(!no_volumes);
                extract::execute(source, destination, &options, !quiet)
            }
            Commands::Info {
                source,
                overlay_offset,
                states,
            } => {
                let options = ExtractionOptions::new().with_overlay_offset(*overlay_offset);
                info::execute(source, &options, *states)
            }
        }
    }
}
