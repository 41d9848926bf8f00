//! Multi-instance orchestration.
//!
//! Builds N independently configured instances on disjoint port pairs, starts
//! them, probes each running instance with a client concurrently, and stops
//! every started instance once all probes have finished:
//!
//! ```text
//! create+start (sequential) → probe (JoinSet, concurrent) → join all → stop
//! ```
//!
//! Failures are recorded per instance and never abort the other instances.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use stunprobe_config::{OptionMap, keys};
use stunprobe_core::{ServiceError, ServiceInstance};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::probe::{Probe, ProbeError};

/// Instance count variable.
pub const ENV_INSTANCE_COUNT: &str = "STUN_NUMBER";
/// Lowercase instance count variable of the legacy harness, read when
/// [`ENV_INSTANCE_COUNT`] is unset.
pub const LEGACY_ENV_INSTANCE_COUNT: &str = "stun_number";
/// Base port variable.
pub const ENV_BASE_PORT: &str = "STUN_BASEPORT";
/// Legacy base port variable, read when [`ENV_BASE_PORT`] is unset.
pub const LEGACY_ENV_BASE_PORT: &str = "baseport";
/// Client executable variable.
pub const ENV_CLIENT: &str = "STUN_CLIENT";
/// Probe host variable.
pub const ENV_PROBE_HOST: &str = "STUN_PROBE_HOST";
/// Probe timeout variable, in milliseconds.
pub const ENV_PROBE_TIMEOUT_MS: &str = "STUN_PROBE_TIMEOUT_MS";

const DEFAULT_INSTANCE_COUNT: usize = 5;
const DEFAULT_BASE_PORT: u16 = 3000;
const DEFAULT_CLIENT: &str = "stunclient";
const DEFAULT_PROBE_HOST: &str = "localhost";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Invalid orchestrator settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A numeric variable did not parse
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidInteger {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// The port pairs would run past 65535
    #[error("{instance_count} instances starting at port {base_port} exceed the port range")]
    PortRangeOverflow {
        /// Base port
        base_port: u16,
        /// Instance count
        instance_count: usize,
    },
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Number of instances
    pub instance_count: usize,
    /// First primary port; instance `i` uses `base + 2i` and `base + 2i + 1`
    pub base_port: u16,
    /// Client executable used by [`ClientProbe`](crate::ClientProbe)
    pub client: PathBuf,
    /// Host the client is pointed at
    pub probe_host: String,
    /// Per-probe time limit
    pub probe_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            instance_count: DEFAULT_INSTANCE_COUNT,
            base_port: DEFAULT_BASE_PORT,
            client: PathBuf::from(DEFAULT_CLIENT),
            probe_host: DEFAULT_PROBE_HOST.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl OrchestratorSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// See [`OrchestratorSettings::from_lookup`].
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through `lookup`; unset variables take their defaults.
    ///
    /// The instance count and base port also answer to their legacy names,
    /// [`LEGACY_ENV_INSTANCE_COUNT`] and [`LEGACY_ENV_BASE_PORT`].
    ///
    /// # Errors
    ///
    /// - [`SettingsError::InvalidInteger`] for a numeric variable that does
    ///   not parse
    /// - [`SettingsError::PortRangeOverflow`] if the last port pair does not
    ///   fit below 65536
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let instance_count = parse(&lookup, &[ENV_INSTANCE_COUNT, LEGACY_ENV_INSTANCE_COUNT])?
            .unwrap_or(defaults.instance_count);
        let base_port = parse(&lookup, &[ENV_BASE_PORT, LEGACY_ENV_BASE_PORT])?
            .unwrap_or(defaults.base_port);
        let client = lookup(ENV_CLIENT).map(PathBuf::from).unwrap_or(defaults.client);
        let probe_host = lookup(ENV_PROBE_HOST).unwrap_or(defaults.probe_host);
        let probe_timeout = parse(&lookup, &[ENV_PROBE_TIMEOUT_MS])?
            .map(Duration::from_millis)
            .unwrap_or(defaults.probe_timeout);

        let settings = Self { instance_count, base_port, client, probe_host, probe_timeout };
        settings.port_pairs()?;
        Ok(settings)
    }

    /// `(primary, alternate)` port pair of every instance, in instance order.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PortRangeOverflow`] if a pair exceeds 65535.
    pub fn port_pairs(&self) -> Result<Vec<(u16, u16)>, SettingsError> {
        let overflow = || SettingsError::PortRangeOverflow {
            base_port: self.base_port,
            instance_count: self.instance_count,
        };

        (0..self.instance_count)
            .map(|i| {
                let primary = i
                    .checked_mul(2)
                    .and_then(|offset| offset.checked_add(usize::from(self.base_port)))
                    .and_then(|port| u16::try_from(port).ok())
                    .ok_or_else(overflow)?;
                let alternate = primary.checked_add(1).ok_or_else(overflow)?;
                Ok((primary, alternate))
            })
            .collect()
    }
}

// First variable that is set wins, even if it does not parse.
fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    vars: &[&'static str],
) -> Result<Option<T>, SettingsError> {
    vars.iter()
        .find_map(|&var| lookup(var).map(|value| (var, value)))
        .map(|(var, value)| {
            let parsed = value.trim().parse();
            parsed.map_err(|_| SettingsError::InvalidInteger { var, value })
        })
        .transpose()
}

/// Option object given to the instance on `(primary, alternate)`.
pub fn instance_options(primary_port: u16, alternate_port: u16) -> OptionMap {
    OptionMap::new()
        .with(keys::PROTOCOL, "tcp")
        .with(keys::MODE, "basic")
        .with(keys::PRIMARY_PORT, primary_port)
        .with(keys::ALTERNATE_PORT, alternate_port)
}

/// Creates instances from option maps.
///
/// Implemented for any `Fn(&OptionMap) -> Result<I, ServiceError>`.
pub trait InstanceFactory {
    /// Instance type produced.
    type Instance: ServiceInstance;

    /// Create an instance for `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance rejects its configuration.
    fn create(&self, options: &OptionMap) -> Result<Self::Instance, ServiceError>;
}

impl<F, I> InstanceFactory for F
where
    F: Fn(&OptionMap) -> Result<I, ServiceError>,
    I: ServiceInstance,
{
    type Instance = I;

    fn create(&self, options: &OptionMap) -> Result<I, ServiceError> {
        self(options)
    }
}

/// A failure of one instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// The factory rejected the configuration
    #[error("instance {index}: creation failed: {source}")]
    Create {
        /// Instance index
        index: usize,
        /// Factory error
        source: ServiceError,
    },

    /// `start` returned an error
    #[error("instance {index}: start failed: {source}")]
    Start {
        /// Instance index
        index: usize,
        /// Start error
        source: ServiceError,
    },

    /// `start` returned `false`
    #[error("instance {index}: start returned false")]
    StartDeclined {
        /// Instance index
        index: usize,
    },

    /// The client probe failed
    #[error("instance {index}: probe of port {port} failed: {source}")]
    Probe {
        /// Instance index
        index: usize,
        /// Probed port
        port: u16,
        /// Probe error
        source: ProbeError,
    },

    /// `stop` returned an error
    #[error("instance {index}: stop failed: {source}")]
    Stop {
        /// Instance index
        index: usize,
        /// Stop error
        source: ServiceError,
    },
}

/// What happened to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceOutcome {
    /// Instance index
    pub index: usize,
    /// Primary port
    pub primary_port: u16,
    /// Alternate port
    pub alternate_port: u16,
    /// Whether `start` succeeded
    pub started: bool,
    /// Client stdout, if the probe succeeded
    pub probe_output: Option<String>,
    /// Whether `stop` succeeded
    pub stopped: bool,
    /// Failures in the order they happened
    pub errors: Vec<OrchestrationError>,
}

impl InstanceOutcome {
    fn new(index: usize, (primary_port, alternate_port): (u16, u16)) -> Self {
        Self {
            index,
            primary_port,
            alternate_port,
            started: false,
            probe_output: None,
            stopped: false,
            errors: Vec::new(),
        }
    }
}

/// Per-instance outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestrationReport {
    /// Outcomes in instance order
    pub instances: Vec<InstanceOutcome>,
    /// Probes that ran to completion, successfully or not
    pub probes_completed: usize,
}

impl OrchestrationReport {
    /// First failure in instance order.
    pub fn first_error(&self) -> Option<&OrchestrationError> {
        self.errors().next()
    }

    /// Every failure, in instance order.
    pub fn errors(&self) -> impl Iterator<Item = &OrchestrationError> {
        self.instances.iter().flat_map(|outcome| outcome.errors.iter())
    }

    /// Whether every instance started, passed its probe and stopped.
    pub fn is_success(&self) -> bool {
        self.first_error().is_none()
    }

    /// Instances that started.
    pub fn started(&self) -> usize {
        self.instances.iter().filter(|outcome| outcome.started).count()
    }

    /// Instances that stopped cleanly.
    pub fn stopped(&self) -> usize {
        self.instances.iter().filter(|outcome| outcome.stopped).count()
    }

    /// `Ok` if every instance succeeded, otherwise the first failure.
    ///
    /// # Errors
    ///
    /// Returns a copy of [`OrchestrationReport::first_error`].
    pub fn result(&self) -> Result<(), OrchestrationError> {
        match self.first_error() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Runs a batch of instances through start, probe and stop.
#[derive(Debug)]
pub struct Orchestrator<F, P> {
    settings: OrchestratorSettings,
    pairs: Vec<(u16, u16)>,
    factory: F,
    probe: Arc<P>,
}

impl<F: InstanceFactory, P: Probe> Orchestrator<F, P> {
    /// Create an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PortRangeOverflow`] if the settings' port
    /// pairs do not fit.
    pub fn new(settings: OrchestratorSettings, factory: F, probe: P) -> Result<Self, SettingsError> {
        let pairs = settings.port_pairs()?;
        Ok(Self { settings, pairs, factory, probe: Arc::new(probe) })
    }

    /// Settings in use.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Create, start, probe and stop every instance.
    pub async fn run(&self) -> OrchestrationReport {
        let mut outcomes: Vec<_> = self
            .pairs
            .iter()
            .enumerate()
            .map(|(index, &pair)| InstanceOutcome::new(index, pair))
            .collect();

        let mut running = Vec::with_capacity(outcomes.len());
        for outcome in &mut outcomes {
            if let Some(instance) = self.start_instance(outcome) {
                running.push((outcome.index, instance));
            }
        }
        tracing::info!(created = outcomes.len(), started = running.len(), "instances started");

        let probes_completed = self.probe_all(&running, &mut outcomes).await;
        tracing::info!(probes_completed, "instances probed");

        for (index, mut instance) in running {
            match instance.stop() {
                Ok(()) => outcomes[index].stopped = true,
                Err(source) => {
                    tracing::error!(index, error = %source, "stop failed");
                    outcomes[index].errors.push(OrchestrationError::Stop { index, source });
                },
            }
        }

        let report = OrchestrationReport { instances: outcomes, probes_completed };
        tracing::info!(
            stopped = report.stopped(),
            failures = report.errors().count(),
            "instances stopped"
        );
        report
    }

    fn start_instance(&self, outcome: &mut InstanceOutcome) -> Option<F::Instance> {
        let index = outcome.index;
        let options = instance_options(outcome.primary_port, outcome.alternate_port);

        let mut instance = match self.factory.create(&options) {
            Ok(instance) => instance,
            Err(source) => {
                tracing::warn!(index, config = %options, error = %source, "instance rejected");
                outcome.errors.push(OrchestrationError::Create { index, source });
                return None;
            },
        };

        match instance.start() {
            Ok(true) => {
                tracing::debug!(index, port = outcome.primary_port, "instance running");
                outcome.started = true;
                Some(instance)
            },
            Ok(false) => {
                tracing::warn!(index, "start returned false");
                outcome.errors.push(OrchestrationError::StartDeclined { index });
                None
            },
            Err(source) => {
                tracing::warn!(index, error = %source, "start failed");
                outcome.errors.push(OrchestrationError::Start { index, source });
                None
            },
        }
    }

    // Returns once every spawned probe has finished.
    async fn probe_all(
        &self,
        running: &[(usize, F::Instance)],
        outcomes: &mut [InstanceOutcome],
    ) -> usize {
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(running.len());

        for &(index, _) in running {
            let probe = Arc::clone(&self.probe);
            let host = self.settings.probe_host.clone();
            let port = outcomes[index].primary_port;
            let limit = self.settings.probe_timeout;

            let handle = tasks.spawn(async move {
                match tokio::time::timeout(limit, probe.probe(&host, port)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(limit)),
                }
            });
            task_index.insert(handle.id(), index);
        }

        let mut completed = 0;
        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;

            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(ProbeError::Aborted(e.to_string()))),
            };
            let Some(&index) = task_index.get(&id) else {
                continue;
            };
            let outcome = &mut outcomes[index];

            match result {
                Ok(output) => {
                    tracing::info!(index, port = outcome.primary_port, stdout = %output.stdout.trim_end(), "probe passed");
                    outcome.probe_output = Some(output.stdout);
                },
                Err(source) => {
                    tracing::warn!(index, port = outcome.primary_port, error = %source, "probe failed");
                    outcome.errors.push(OrchestrationError::Probe {
                        index,
                        port: outcome.primary_port,
                        source,
                    });
                },
            }
        }
        completed
    }
}
