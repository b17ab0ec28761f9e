//! Event callbacks and the default log sink.
//!
//! The client reports everything it does through the [`EventHandler`] trait:
//! log lines at three severities, periodic performance samples, raw ndt7
//! results, and server-busy notifications. The default implementation writes
//! human-readable lines to stderr; embedders override the hooks they care
//! about.

use crate::settings::{Settings, Verbosity};
use crate::spec::TestKind;
use crate::util::format_speed;

/// Hooks invoked while a test runs.
///
/// All methods take `&self` and may be called from whichever thread currently
/// owns the [`Client`](crate::client::Client).
pub trait EventHandler {
    /// Called when a warning message is emitted.
    fn on_warning(&self, msg: &str);

    /// Called when an informational message is emitted.
    fn on_info(&self, msg: &str);

    /// Called when a debug message is emitted.
    fn on_debug(&self, msg: &str);

    /// Called with a periodic progress sample. `measured_bytes` counts bytes
    /// moved since the subtest began, `elapsed_sec` the seconds since then;
    /// dividing `elapsed_sec` by `max_runtime` yields the completion ratio.
    fn on_performance(
        &self,
        test: TestKind,
        nflows: u8,
        measured_bytes: f64,
        elapsed_sec: f64,
        max_runtime: f64,
    );

    /// Called with a raw ndt7 result. `scope` is `"ndt7"`, `name` the subtest
    /// name, and `value` the serialized JSON exchanged with the server.
    fn on_result(&self, scope: &str, name: &str, value: &str);

    /// Called when a server reports it is out of capacity. With discovered
    /// servers this may fire once per busy candidate.
    fn on_server_busy(&self, msg: &str);
}

/// Default [`EventHandler`] writing human-readable lines to stderr.
pub struct LogHandler {
    verbosity: Verbosity,
}

impl LogHandler {
    /// Create a handler rendering at the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        LogHandler { verbosity }
    }
}

impl EventHandler for LogHandler {
    fn on_warning(&self, msg: &str) {
        eprintln!("[!] {msg}");
    }

    fn on_info(&self, msg: &str) {
        eprintln!("{msg}");
    }

    fn on_debug(&self, msg: &str) {
        eprintln!("[D] {msg}");
    }

    fn on_performance(
        &self,
        test: TestKind,
        nflows: u8,
        measured_bytes: f64,
        elapsed_sec: f64,
        max_runtime: f64,
    ) {
        let percent = if max_runtime > 0.0 {
            elapsed_sec * 100.0 / max_runtime
        } else {
            0.0
        };
        if self.verbosity >= Verbosity::Info {
            eprintln!(
                "  [{percent:>2.0}%] speed: {}",
                format_speed(measured_bytes, elapsed_sec)
            );
        }
        if self.verbosity >= Verbosity::Debug {
            eprintln!(
                "[D]   [{percent:>2.0}%] elapsed: {elapsed_sec:>6.3} s; \
                 test: {test:?}; num_flows: {nflows}; measured_bytes: {measured_bytes}"
            );
        }
    }

    fn on_result(&self, scope: &str, name: &str, value: &str) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("  - [{scope}] {name}: {value}");
        }
    }

    fn on_server_busy(&self, msg: &str) {
        if self.verbosity >= Verbosity::Warning {
            eprintln!("[!] server is busy: {msg}");
        }
    }
}

/// Verbosity-gated front door to an [`EventHandler`], shared by the layers.
pub(crate) struct Reporter<'a> {
    pub(crate) settings: &'a Settings,
    handler: &'a (dyn EventHandler + Send + Sync),
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(
        settings: &'a Settings,
        handler: &'a (dyn EventHandler + Send + Sync),
    ) -> Self {
        Reporter { settings, handler }
    }

    pub(crate) fn warn(&self, msg: &str) {
        if self.settings.verbosity >= Verbosity::Warning {
            self.handler.on_warning(msg);
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        if self.settings.verbosity >= Verbosity::Info {
            self.handler.on_info(msg);
        }
    }

    pub(crate) fn debug(&self, msg: &str) {
        if self.settings.verbosity >= Verbosity::Debug {
            self.handler.on_debug(msg);
        }
    }

    pub(crate) fn performance(
        &self,
        test: TestKind,
        nflows: u8,
        measured_bytes: f64,
        elapsed_sec: f64,
        max_runtime: f64,
    ) {
        if !self.settings.summary_only {
            self.handler
                .on_performance(test, nflows, measured_bytes, elapsed_sec, max_runtime);
        }
    }

    pub(crate) fn result(&self, scope: &str, name: &str, value: &str) {
        if self.settings.verbosity == Verbosity::Debug {
            self.handler.on_result(scope, name, value);
        }
    }

    pub(crate) fn server_busy(&self, msg: &str) {
        self.handler.on_server_busy(msg);
    }
}
