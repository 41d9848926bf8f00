//! Case executor and oracle.
//!
//! For each case the executor calls `start` with the case's configuration,
//! compares what happened with what the case expects, and calls `stop` if and
//! only if `start` succeeded:
//!
//! | expected | start succeeded | start failed |
//! |----------|-----------------|--------------|
//! | Accept   | pass, stop      | fail         |
//! | Reject   | fail, stop      | pass         |
//!
//! Mismatches are collected into the [`RunReport`]; the run always continues
//! to the last case.

use serde::Serialize;

use crate::{
    case::{ExpectedOutcome, SkipAnnotation, TestCase},
    generator::CaseGenerator,
    service::StunService,
};

/// What the target did with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Observed {
    /// `start` returned `Ok(true)`
    Accepted,
    /// `start` returned an error or `Ok(false)`
    Rejected {
        /// Error text, or a note that `start` returned false
        reason: String,
    },
}

impl Observed {
    fn matches(&self, expected: ExpectedOutcome) -> bool {
        matches!(
            (self, expected),
            (Observed::Accepted, ExpectedOutcome::Accept)
                | (Observed::Rejected { .. }, ExpectedOutcome::Reject)
        )
    }
}

/// Outcome of one executed case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Case ordinal
    pub ordinal: usize,
    /// Expected outcome
    pub expected: ExpectedOutcome,
    /// Observed outcome
    pub observed: Observed,
    /// Whether `stop` was called for this case
    pub stopped: bool,
    /// Error returned by `stop`, if any
    pub stop_error: Option<String>,
    /// Whether the case passed
    pub matched: bool,
    /// Full case, kept only for failed cases
    pub payload: Option<TestCase>,
}

impl ExecutionResult {
    /// Error captured from `start`, if the target rejected the case.
    pub fn error(&self) -> Option<&str> {
        match &self.observed {
            Observed::Rejected { reason } => Some(reason),
            Observed::Accepted => None,
        }
    }

    /// Short description of why the case failed.
    pub fn failure(&self) -> Option<&'static str> {
        match (&self.observed, self.expected) {
            (Observed::Accepted, ExpectedOutcome::Reject) => {
                Some("did not reject an invalid configuration")
            },
            (Observed::Rejected { .. }, ExpectedOutcome::Accept) => {
                Some("rejected a valid configuration")
            },
            _ if self.stop_error.is_some() => Some("stop failed after a successful start"),
            _ => None,
        }
    }
}

/// Totals and failures of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Cases executed
    pub total: usize,
    /// Cases that matched their expectation
    pub passed: usize,
    /// Cases the target accepted
    pub accepted: usize,
    /// Cases the target rejected
    pub rejected: usize,
    /// Cases expected to be accepted
    pub expected_accept: usize,
    /// Cases that passed through at least one dependency skip
    pub annotated: usize,
    /// `stop` calls made
    pub stop_calls: usize,
    /// Failed cases with their payloads
    pub failures: Vec<ExecutionResult>,
}

impl RunReport {
    /// Whether every case matched.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed cases.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, result: ExecutionResult, annotated: bool) {
        self.total += 1;
        match result.observed {
            Observed::Accepted => self.accepted += 1,
            Observed::Rejected { .. } => self.rejected += 1,
        }
        if result.expected == ExpectedOutcome::Accept {
            self.expected_accept += 1;
        }
        if annotated {
            self.annotated += 1;
        }
        if result.stopped {
            self.stop_calls += 1;
        }
        if result.matched {
            self.passed += 1;
        } else {
            self.failures.push(result);
        }
    }
}

/// Runs cases against an injected service, one at a time.
#[derive(Debug)]
pub struct CaseExecutor<S> {
    service: S,
}

impl<S: StunService> CaseExecutor<S> {
    /// Wrap a service handle.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Borrow the service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Release the service.
    pub fn into_inner(self) -> S {
        self.service
    }

    /// Execute one case: start, compare, stop if started.
    pub fn execute(&mut self, case: TestCase) -> ExecutionResult {
        let observed = match self.service.start(Some(&case.config)) {
            Ok(true) => Observed::Accepted,
            Ok(false) => Observed::Rejected { reason: "start returned false".to_string() },
            // Lifecycle errors count too; the reason text tells them apart.
            Err(e) => Observed::Rejected { reason: e.to_string() },
        };

        let (stopped, stop_error) = match observed {
            Observed::Accepted => match self.service.stop() {
                Ok(()) => (true, None),
                Err(e) => {
                    tracing::error!(ordinal = case.ordinal, error = %e, "stop failed");
                    (true, Some(e.to_string()))
                },
            },
            Observed::Rejected { .. } => (false, None),
        };

        let matched = observed.matches(case.expected) && stop_error.is_none();

        tracing::info!(
            ordinal = case.ordinal,
            config = %case.config,
            expected = %case.expected,
            observed = ?observed,
            skipped = %render_notes(&case.annotations),
            matched,
            "case executed"
        );

        let mut result = ExecutionResult {
            ordinal: case.ordinal,
            expected: case.expected,
            observed,
            stopped,
            stop_error,
            matched,
            payload: None,
        };

        if !matched {
            tracing::warn!(
                ordinal = case.ordinal,
                config = %case.config,
                failure = result.failure().unwrap_or("mismatch"),
                "case failed"
            );
            result.payload = Some(case);
        }

        result
    }

    /// Generate and execute every case of the generator's table.
    pub fn run(&mut self, generator: &CaseGenerator<'_>) -> RunReport {
        let mut report = RunReport::default();
        generator.generate(|case| {
            let annotated = !case.annotations.is_empty();
            let result = self.execute(case);
            report.record(result, annotated);
        });

        tracing::info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed(),
            stop_calls = report.stop_calls,
            "run complete"
        );
        report
    }
}

fn render_notes(notes: &[SkipAnnotation]) -> String {
    notes.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use stunprobe_config::OptionMap;

    use super::*;
    use crate::{
        case::CaseKind,
        error::ServiceError,
    };

    /// Accepts configs whose `protocol` is `tcp` (or absent), counts calls.
    #[derive(Default)]
    struct ScriptedService {
        starts: usize,
        stops: usize,
        accept_everything: bool,
        falsy_rejections: bool,
        fail_stop: bool,
    }

    impl StunService for ScriptedService {
        fn start(&mut self, config: Option<&OptionMap>) -> Result<bool, ServiceError> {
            self.starts += 1;
            let valid = config
                .and_then(|c| c.get("protocol"))
                .is_none_or(|v| v.as_str() == Some("tcp"));
            if valid || self.accept_everything {
                Ok(true)
            } else if self.falsy_rejections {
                Ok(false)
            } else {
                Err(ServiceError::StartFailed("bad protocol".to_string()))
            }
        }

        fn stop(&mut self) -> Result<(), ServiceError> {
            self.stops += 1;
            if self.fail_stop { Err(ServiceError::NotRunning) } else { Ok(()) }
        }
    }

    fn case(config: OptionMap, expected: ExpectedOutcome) -> TestCase {
        TestCase { ordinal: 0, config, expected, kind: CaseKind::Valid, annotations: Vec::new() }
    }

    #[test]
    fn accepted_valid_case_passes_and_stops() {
        let mut executor = CaseExecutor::new(ScriptedService::default());
        let result = executor
            .execute(case(OptionMap::new().with("protocol", "tcp"), ExpectedOutcome::Accept));

        assert!(result.matched);
        assert!(result.stopped);
        assert!(result.payload.is_none());
        assert_eq!(executor.service().stops, 1);
    }

    #[test]
    fn rejected_invalid_case_passes_without_stop() {
        let mut executor = CaseExecutor::new(ScriptedService::default());
        let result = executor
            .execute(case(OptionMap::new().with("protocol", "tls"), ExpectedOutcome::Reject));

        assert!(result.matched);
        assert!(!result.stopped);
        assert_eq!(result.error(), Some("server did not start: bad protocol"));
        assert_eq!(executor.service().stops, 0);
    }

    #[test]
    fn falsy_start_counts_as_rejection() {
        let service = ScriptedService { falsy_rejections: true, ..Default::default() };
        let mut executor = CaseExecutor::new(service);
        let result = executor
            .execute(case(OptionMap::new().with("protocol", "tls"), ExpectedOutcome::Reject));

        assert!(result.matched);
        assert_eq!(result.error(), Some("start returned false"));
        assert_eq!(executor.service().stops, 0);
    }

    #[test]
    fn accepting_invalid_config_fails_but_still_stops() {
        let service = ScriptedService { accept_everything: true, ..Default::default() };
        let mut executor = CaseExecutor::new(service);
        let result = executor
            .execute(case(OptionMap::new().with("protocol", "tls"), ExpectedOutcome::Reject));

        assert!(!result.matched);
        assert!(result.stopped);
        assert_eq!(result.failure(), Some("did not reject an invalid configuration"));
        assert!(result.payload.is_some());
        assert_eq!(executor.service().stops, 1);
    }

    #[test]
    fn rejecting_valid_config_fails() {
        let mut executor = CaseExecutor::new(ScriptedService::default());
        let result = executor
            .execute(case(OptionMap::new().with("protocol", "udp"), ExpectedOutcome::Accept));

        assert!(!result.matched);
        assert!(!result.stopped);
        assert_eq!(result.failure(), Some("rejected a valid configuration"));
        assert_eq!(
            result.payload.map(|c| c.config),
            Some(OptionMap::new().with("protocol", "udp"))
        );
    }

    #[test]
    fn stop_failure_fails_the_case() {
        let service = ScriptedService { fail_stop: true, ..Default::default() };
        let mut executor = CaseExecutor::new(service);
        let result = executor.execute(case(OptionMap::new(), ExpectedOutcome::Accept));

        assert!(!result.matched);
        assert_eq!(result.failure(), Some("stop failed after a successful start"));
    }

    /// Never stops, so every start after the first finds it running.
    struct StuckService;

    impl StunService for StuckService {
        fn start(&mut self, _: Option<&OptionMap>) -> Result<bool, ServiceError> {
            Err(ServiceError::AlreadyRunning)
        }

        fn stop(&mut self) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[test]
    fn lifecycle_errors_are_observed_as_rejections() {
        let mut executor = CaseExecutor::new(StuckService);

        let result = executor.execute(case(OptionMap::new(), ExpectedOutcome::Accept));
        assert!(!result.matched);
        assert!(!result.stopped);
        assert_eq!(result.error(), Some("server is already running"));
        assert_eq!(result.failure(), Some("rejected a valid configuration"));

        let result = executor.execute(case(OptionMap::new(), ExpectedOutcome::Reject));
        assert!(result.matched);
    }

    #[test]
    fn borrowed_service_can_be_inspected_after_run() {
        let mut service = ScriptedService::default();
        {
            let mut executor = CaseExecutor::new(&mut service);
            executor.execute(case(OptionMap::new(), ExpectedOutcome::Accept));
        }
        assert_eq!(service.starts, 1);
        assert_eq!(service.stops, 1);
    }
}
