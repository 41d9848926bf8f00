//! # stunprobe configuration model
//!
//! This crate describes the configuration surface of the STUN server lifecycle
//! API and the rules the server applies when it decides whether to accept a
//! configuration.
//!
//! ## Layers
//!
//! - [`OptionMap`]: the untyped option object handed to `start()`. Keys may be
//!   absent; an absent key is the only way to express "omitted". `0`, `false`
//!   and `null` are ordinary values.
//! - [`ServerConfig`]: the typed configuration produced by
//!   [`ServerConfig::from_options`]. Conversion either yields a complete
//!   config or the first [`ConfigError`] encountered, checked in a fixed order.
//! - [`positional`]: the legacy `(primary, alternate, extras)` argument form,
//!   normalized into an [`OptionMap`].
//!
//! Interface resolution goes through the [`HostInterfaces`] trait so the rules
//! can run without touching the host network stack.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod interfaces;
pub mod options;
pub mod positional;
pub mod server_config;

pub use error::{ConfigError, Result};
pub use interfaces::{HostInterfaces, Interface, StaticInterfaces};
pub use options::{OptionMap, keys};
pub use positional::from_positional;
pub use server_config::{
    DEFAULT_ALTERNATE_PORT, DEFAULT_STUN_PORT, Endpoints, Family, Mode, Protocol, ServerConfig,
};
