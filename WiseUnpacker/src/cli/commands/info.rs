//! CLI command for describing an installer

use std::path::Path;

use indexmap::IndexMap;

use crate::cli::progress::simple_spinner;
use crate::script::OperationCode;
use crate::unpacker::{ExtractionOptions, WiseUnpacker};

/// Format byte size for human-readable output
fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1}M", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}")
    }
}

pub fn execute(source: &Path, options: &ExtractionOptions, list_states: bool) -> anyhow::Result<()> {
    let spinner = simple_spinner(&format!("Reading {}...", source.display()));
    let info = WiseUnpacker::inspect(source, options);
    spinner.finish_and_clear();
    let info = info?;

    println!("Installer:   {}", source.display());
    if let Some(container) = &info.container {
        println!("Executable:  {}", container.kind);
    }
    println!("Size:        {} in {} volume(s)", format_size(info.total_len), info.volumes);
    println!("Overlay:     {:#x}", info.overlay_offset);

    if let Some(header) = &info.header {
        println!("Header:      {} bytes", header.encoded_len());
        println!("Records:     {}", if header.is_pkzip() { "PKZIP" } else { "raw" });
        if let Some(dll) = header.dll_name_lossy() {
            println!("DLL:         {dll}");
        }
        if !header.init_text.is_empty() {
            println!("Init text:   {}", header.init_text_lossy());
        }
        for item in header.items() {
            if let Some(size) = item.expectation.input_size {
                println!("  {:<16} {:>8}", item.name, format_size(size));
            }
        }
    }
    if let Some(data_start) = info.data_start {
        println!("Data start:  {data_start:#x}");
    }
    if let Some(start) = &info.legacy_start {
        println!("Data start:  {:#x} ({:?}, recovered)", start.offset, start.framing);
    }

    if let Some(script) = &info.script {
        println!(
            "Script:      {:?} layout, {} language(s), {} states",
            script.header.layout,
            script.header.languages(),
            script.len()
        );
        if !script.header.log_pathname.is_empty() {
            println!("Install log: {}", script.header.log_pathname);
        }
        let mut histogram: IndexMap<OperationCode, usize> = IndexMap::new();
        for state in &script.states {
            *histogram.entry(state.opcode).or_default() += 1;
        }
        histogram.sort_by(|_, a, _, b| b.cmp(a));
        for (opcode, count) in &histogram {
            println!("  {count:>5}  {opcode}");
        }
        if list_states {
            println!("States:");
            for (index, state) in script.states.iter().enumerate() {
                println!("  {index:>5}  {}", state.opcode);
            }
        }
    }

    Ok(())
}
