//! CLI command for installer extraction

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use indicatif::ProgressBar;

use crate::cli::progress::{GEAR, LOOKING_GLASS, PACKAGE, print_done, print_step, simple_bar};
use crate::unpacker::{ExtractPhase, ExtractionOptions, ExtractionPath, WiseUnpacker};

pub fn execute(
    source: &Path,
    destination: &Path,
    options: &ExtractionOptions,
    progress: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();

    if !progress {
        let report = WiseUnpacker::extract_with_progress(source, destination, options, &|_| {})?;
        println!(
            "Extracted {} files to {}",
            report.written_files().count(),
            destination.display()
        );
        return Ok(());
    }

    print_step(1, 3, LOOKING_GLASS, &format!("Reading {}...", source.display()));

    // One bar per phase; replaced whenever the phase changes.
    let bar: Mutex<Option<(ExtractPhase, ProgressBar)>> = Mutex::new(None);
    let report = WiseUnpacker::extract_with_progress(source, destination, options, &|update| {
        let Ok(mut slot) = bar.lock() else {
            return;
        };
        let phase_changed = slot.as_ref().is_none_or(|(phase, _)| *phase != update.phase);
        if phase_changed {
            if let Some((_, old)) = slot.take() {
                old.finish_and_clear();
            }
            match update.phase {
                ExtractPhase::ExtractingHeaderFiles | ExtractPhase::ExtractingRecords => {
                    print_step(2, 3, PACKAGE, update.phase.as_str());
                }
                ExtractPhase::RunningScript => print_step(3, 3, GEAR, update.phase.as_str()),
                _ => {}
            }
            if update.total > 0 {
                *slot = Some((update.phase, simple_bar(update.total as u64, update.phase.as_str())));
            }
        }
        if let Some((_, pb)) = slot.as_ref() {
            pb.set_position(update.current as u64);
            if let Some(name) = &update.current_file {
                pb.set_message(name.clone());
            }
        }
    });

    if let Ok(mut slot) = bar.lock() {
        if let Some((_, pb)) = slot.take() {
            pb.finish_and_clear();
        }
    }
    let report = report?;

    let path = match report.path {
        ExtractionPath::Header => "overlay header",
        ExtractionPath::Legacy => "offset recovery",
    };
    println!(
        "Extracted {} files via {path} (data at {:#x})",
        report.written_files().count(),
        report.data_start
    );
    if let Some(summary) = &report.script {
        println!(
            "Script: {} states, {} directories created",
            summary.states_executed,
            summary.directories.len()
        );
    }
    print_done(started.elapsed());
    Ok(())
}
