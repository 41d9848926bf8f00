//! Singleton-style target backed by the reference configuration model.

use serde_json::Value;
use stunprobe_config::{HostInterfaces, OptionMap, ServerConfig, StaticInterfaces, from_positional};
use stunprobe_core::{ServiceError, StunService};

/// In-process server with the singleton `start(config)` / `stop()` lifecycle.
///
/// `start` validates the options with [`ServerConfig::from_options`] against
/// the host's interfaces and keeps the resulting configuration while running.
/// A second `start` without a `stop` in between fails with
/// [`ServiceError::AlreadyRunning`]. `stop` is idempotent.
#[derive(Debug)]
pub struct SimServer<H = StaticInterfaces> {
    host: H,
    running: Option<ServerConfig>,
    starts: usize,
    stops: usize,
}

impl Default for SimServer<StaticInterfaces> {
    fn default() -> Self {
        Self::new(StaticInterfaces::dual_homed())
    }
}

impl<H: HostInterfaces> SimServer<H> {
    /// Create a stopped server on `host`.
    pub fn new(host: H) -> Self {
        Self { host, running: None, starts: 0, stops: 0 }
    }

    /// Whether a configuration is currently running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Running configuration, if any.
    pub fn config(&self) -> Option<&ServerConfig> {
        self.running.as_ref()
    }

    /// Successful starts so far.
    pub fn start_count(&self) -> usize {
        self.starts
    }

    /// Stops that tore down a running configuration.
    pub fn stop_count(&self) -> usize {
        self.stops
    }

    /// Start from the legacy `(primary, alternate, extras)` argument form.
    ///
    /// # Errors
    ///
    /// Malformed arguments fail with [`ServiceError::InvalidConfig`] before
    /// the options are validated; otherwise as [`StunService::start`].
    pub fn start_positional(&mut self, args: &[Option<Value>]) -> Result<bool, ServiceError> {
        let options = from_positional(args)?;
        self.start(Some(&options))
    }
}

impl<H: HostInterfaces> StunService for SimServer<H> {
    fn start(&mut self, config: Option<&OptionMap>) -> Result<bool, ServiceError> {
        if self.running.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        let empty = OptionMap::new();
        let config = ServerConfig::from_options(config.unwrap_or(&empty), &self.host)?;

        tracing::debug!(
            protocol = ?config.protocol,
            mode = ?config.mode,
            primary = %config.endpoints.pp,
            "server started"
        );

        self.running = Some(config);
        self.starts += 1;
        Ok(true)
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        if self.running.take().is_some() {
            self.stops += 1;
            tracing::debug!("server stopped");
        }
        Ok(())
    }
}
