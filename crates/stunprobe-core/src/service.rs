//! Lifecycle contracts consumed from the STUN server.
//!
//! The server is reachable in two shapes:
//!
//! - [`StunService`]: a single implicit server. `start(config)` configures and
//!   starts it, `stop()` tears it down. Only one configuration can be live at
//!   a time, which is why the executor runs cases strictly one after another.
//! - [`ServiceInstance`]: an object created with its configuration, exposing
//!   `start()`/`stop()`. Instances are independent and can run side by side.
//!
//! Both report a failed start either as an error or as `Ok(false)`. The
//! executor folds the two into a single rejected outcome.

use stunprobe_config::OptionMap;

use crate::error::ServiceError;

/// Singleton-style server lifecycle.
pub trait StunService {
    /// Configure and start the server.
    ///
    /// `None` is the same as a configuration with every field omitted.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is rejected or the server
    /// fails to start. `Ok(false)` is also a failed start.
    fn start(&mut self, config: Option<&OptionMap>) -> Result<bool, ServiceError>;

    /// Stop the running server.
    ///
    /// # Errors
    ///
    /// Implementation defined; the executor only calls this after a
    /// successful start.
    fn stop(&mut self) -> Result<(), ServiceError>;
}

impl<S: StunService + ?Sized> StunService for &mut S {
    fn start(&mut self, config: Option<&OptionMap>) -> Result<bool, ServiceError> {
        (**self).start(config)
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        (**self).stop()
    }
}

/// Independently instantiable server.
pub trait ServiceInstance {
    /// Start this instance with the configuration it was created with.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is already running or cannot
    /// acquire its resources. `Ok(false)` is also a failed start.
    fn start(&mut self) -> Result<bool, ServiceError>;

    /// Stop this instance.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotRunning`] if the instance is not running.
    fn stop(&mut self) -> Result<(), ServiceError>;
}
