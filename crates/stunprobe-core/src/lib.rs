//! stunprobe core: configuration-acceptance engine
//!
//! This crate turns a declarative description of a service's configuration
//! fields into the complete set of test cases for its acceptance contract,
//! and checks a service against those cases.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   ┌──────────────┐
//!  │ FieldTable   │ + │ RuleSet      │
//!  │ (per-key     │   │ (cross-field │
//!  │  domains)    │   │  skips)      │
//!  └──────────────┘   └──────────────┘
//!          ↓                  ↓
//!       ┌──────────────────────────┐
//!       │ CaseGenerator            │
//!       │ depth-first, one case at │
//!       │ a time                   │
//!       └──────────────────────────┘
//!                    ↓ TestCase
//!       ┌──────────────────────────┐      ┌─────────────────┐
//!       │ CaseExecutor (oracle)    │─────>│ StunService     │
//!       │ start → compare → stop   │<─────│ (injected)      │
//!       └──────────────────────────┘      └─────────────────┘
//!                    ↓
//!                RunReport
//! ```
//!
//! # Key Principles
//!
//! - No I/O: the target is reached only through [`service::StunService`]
//! - Sequential: one case owns the target at a time, start/stop balanced
//! - Construction-time validation: a malformed table never reaches execution
//!
//! # Modules
//!
//! - [`field`]: field domains and the validated table
//! - [`rules`]: dependency rules
//! - [`generator`]: recursive case generation
//! - [`case`]: test cases and expected outcomes
//! - [`service`]: lifecycle contracts consumed from the target
//! - [`executor`]: oracle and run report
//! - [`stun_table`]: the field table for the STUN server
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod case;
pub mod error;
pub mod executor;
pub mod field;
pub mod generator;
pub mod rules;
pub mod service;
pub mod stun_table;

pub use case::{CaseKind, ExpectedOutcome, SkipAnnotation, TestCase};
pub use error::{ServiceError, TableError};
pub use executor::{CaseExecutor, ExecutionResult, Observed, RunReport};
pub use field::{FieldSpec, FieldTable};
pub use generator::CaseGenerator;
pub use rules::{Condition, DependencyRule, RuleAction, RuleSet};
pub use service::{ServiceInstance, StunService};
