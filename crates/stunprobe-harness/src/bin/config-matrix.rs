//! Run the STUN configuration matrix against the in-process server.
//!
//! Prints the run report as JSON on stdout and exits non-zero if any case
//! did not get the outcome it expects.

use anyhow::{Context, bail};
use stunprobe_core::{CaseExecutor, CaseGenerator, stun_table::stun_field_table};
use stunprobe_harness::{SimServer, logging};

fn main() -> anyhow::Result<()> {
    logging::init()?;

    let table = stun_field_table().context("STUN field table is malformed")?;
    let generator = CaseGenerator::new(&table);
    tracing::info!(
        fields = table.len(),
        expected_without_rules = table.expected_case_count(),
        "generating cases"
    );

    let mut executor = CaseExecutor::new(SimServer::default());
    let report = executor.run(&generator);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        bail!("{} of {} cases did not match their expected outcome", report.failed(), report.total);
    }
    Ok(())
}
