//! Start several listening STUN instances on disjoint ports, probe each with
//! the client, then stop them all.
//!
//! Settings come from `STUN_NUMBER` (or `stun_number`), `STUN_BASEPORT` (or
//! `baseport`), `STUN_CLIENT`, `STUN_PROBE_HOST` and `STUN_PROBE_TIMEOUT_MS`.

use anyhow::Context;
use stunprobe_config::{OptionMap, StaticInterfaces};
use stunprobe_harness::{
    ClientProbe, Orchestrator, OrchestratorSettings, PortRegistry, SimInstance, logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    let settings = OrchestratorSettings::from_env().context("invalid environment")?;
    tracing::info!(
        instances = settings.instance_count,
        base_port = settings.base_port,
        client = %settings.client.display(),
        "starting instances"
    );

    let host = StaticInterfaces::dual_homed();
    let registry = PortRegistry::new();
    let factory = move |options: &OptionMap| {
        SimInstance::new(options, &host, registry.clone()).map(SimInstance::listening)
    };
    let probe = ClientProbe::new(settings.client.clone());

    let report = Orchestrator::new(settings, factory, probe)?.run().await;

    for outcome in &report.instances {
        if let Some(stdout) = &outcome.probe_output {
            println!("{}", stdout.trim_end());
        }
    }
    tracing::info!(
        started = report.started(),
        probed = report.probes_completed,
        stopped = report.stopped(),
        "run complete"
    );

    report.result()?;
    Ok(())
}
