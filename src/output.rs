use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::pipeline::{ProgressEvent, ProgressSink, RunReport};
use crate::pool::PoolSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Forwards pipeline phase events to the tracing subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub fn print_run_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-GB summary{reset}");
    println!("{green}Accessions: {}{reset}", report.accessions);
    print_phase(&report.fetch, green, yellow, red, reset);
    print_phase(&report.unpack, green, yellow, red, reset);
    println!("{cyan}Accession list: {}{reset}", report.accession_list);
    println!("{cyan}Manifest: {}{reset}", report.manifest);
}

fn print_phase(summary: &PoolSummary, green: &str, yellow: &str, red: &str, reset: &str) {
    println!(
        "{green}{}: {} done, {yellow}{} skipped{green}, {} total{reset}",
        summary.phase, summary.completed, summary.skipped, summary.total
    );
    for accession in &summary.failures {
        println!("{red}   failed: {accession}{reset}");
    }
}
