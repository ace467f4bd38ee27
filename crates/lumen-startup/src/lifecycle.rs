use std::backtrace::Backtrace;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Ordered startup milestones.
///
/// Ordinals strictly increase in declaration order; the lifecycle cursor only
/// ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LoadingPhase {
    Bootstrap = 0,
    LafInitialized = 1,
    ComponentsRegistered = 2,
    ConfigurationStoreInitialized = 3,
    ComponentsLoaded = 4,
    ProjectOpened = 5,
    IndexingFinished = 6,
}

impl LoadingPhase {
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            LoadingPhase::Bootstrap => "Bootstrap",
            LoadingPhase::LafInitialized => "LafInitialized",
            LoadingPhase::ComponentsRegistered => "ComponentsRegistered",
            LoadingPhase::ConfigurationStoreInitialized => "ConfigurationStoreInitialized",
            LoadingPhase::ComponentsLoaded => "ComponentsLoaded",
            LoadingPhase::ProjectOpened => "ProjectOpened",
            LoadingPhase::IndexingFinished => "IndexingFinished",
        }
    }

    fn from_ordinal(ordinal: u8) -> LoadingPhase {
        match ordinal {
            0 => LoadingPhase::Bootstrap,
            1 => LoadingPhase::LafInitialized,
            2 => LoadingPhase::ComponentsRegistered,
            3 => LoadingPhase::ConfigurationStoreInitialized,
            4 => LoadingPhase::ComponentsLoaded,
            5 => LoadingPhase::ProjectOpened,
            _ => LoadingPhase::IndexingFinished,
        }
    }
}

/// Configuration for a [`Lifecycle`].
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// When enabled, [`Lifecycle::check_reached`] logs sequencing violations.
    /// Off by default; development builds turn it on via the
    /// `LUMEN_STRICT_LIFECYCLE` environment variable.
    pub strict: bool,
    /// Known legacy call sites exempted from the check, matched by substring
    /// against the violator's stack frame names.
    pub allowed_violators: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            strict: env_flag("LUMEN_STRICT_LIFECYCLE"),
            allowed_violators: Vec::new(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true")
    )
}

/// Forward-only cursor over the startup [`LoadingPhase`]s.
///
/// An explicit shared object rather than a process-wide static, so tests and
/// embedded instances don't leak phase progress into each other. Clones share
/// the same cursor.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    current: AtomicU8,
    strict: bool,
    allowed_violators: Vec<String>,
    violations: Mutex<ViolationLog>,
}

#[derive(Default)]
struct ViolationLog {
    seen: HashSet<StackSignature>,
    count: u64,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// A lifecycle with strict checking enabled, for development builds and
    /// tests.
    pub fn strict() -> Self {
        Self::with_config(LifecycleConfig {
            strict: true,
            ..LifecycleConfig::default()
        })
    }

    pub fn with_config(config: LifecycleConfig) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                current: AtomicU8::new(LoadingPhase::Bootstrap.ordinal()),
                strict: config.strict,
                allowed_violators: config.allowed_violators,
                violations: Mutex::new(ViolationLog::default()),
            }),
        }
    }

    pub fn current_phase(&self) -> LoadingPhase {
        LoadingPhase::from_ordinal(self.inner.current.load(Ordering::Acquire))
    }

    /// Advances the cursor to `phase`. Moving backwards is ignored.
    pub fn advance_to(&self, phase: LoadingPhase) {
        let previous = self.inner.current.fetch_max(phase.ordinal(), Ordering::AcqRel);
        if previous > phase.ordinal() {
            tracing::debug!(
                target = "lumen.startup",
                requested = phase.name(),
                current = LoadingPhase::from_ordinal(previous).name(),
                "ignoring backwards lifecycle transition"
            );
        }
    }

    /// Whether the cursor has reached `phase`.
    pub fn is_reached(&self, phase: LoadingPhase) -> bool {
        self.inner.current.load(Ordering::Acquire) >= phase.ordinal()
    }

    /// Diagnostic assertion that `phase` has been reached.
    ///
    /// Never alters state and never fails: when strict mode is enabled and the
    /// cursor is behind `phase`, the violation is logged exactly once per
    /// distinct call-stack signature (so a hot path cannot flood the log),
    /// unless the stack matches an allow-listed legacy call site.
    pub fn check_reached(&self, phase: LoadingPhase) {
        if !self.inner.strict || self.is_reached(phase) {
            return;
        }

        let rendered = format!("{}", Backtrace::force_capture());
        let signature = StackSignature::parse(&rendered);
        if signature.matches_any(&self.inner.allowed_violators) {
            return;
        }
        self.record_violation(phase, signature, &rendered);
    }

    /// Total sequencing violations observed so far (allow-listed calls
    /// excluded, duplicates included).
    pub fn violation_count(&self) -> u64 {
        self.inner.violations.lock().count
    }

    fn record_violation(&self, phase: LoadingPhase, signature: StackSignature, rendered: &str) {
        let current = self.current_phase();
        let mut log = self.inner.violations.lock();
        log.count += 1;
        let count = log.count;
        if log.seen.insert(signature) {
            tracing::error!(
                target = "lumen.startup",
                required = phase.name(),
                current = current.name(),
                violations = count,
                stack = rendered,
                "code ran before its startup phase was reached"
            );
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of a call stack, keyed by frame symbol names only.
///
/// Addresses, file paths and line numbers are stripped so two violations from
/// the same call path hash identically across runs. In builds without symbols
/// the frame list is empty and every violation dedups to one log line, which
/// only weakens diagnostics, never correctness.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StackSignature {
    frames: Vec<String>,
}

impl StackSignature {
    /// Parses the `Display` rendering of a [`Backtrace`].
    ///
    /// Frame lines look like `  4: crate::module::function`, sometimes with a
    /// trailing `::h<16 hex>` hash suffix; location lines (`at src/..`) are
    /// skipped.
    fn parse(rendered: &str) -> Self {
        let mut frames = Vec::new();
        for line in rendered.lines() {
            let trimmed = line.trim_start();
            let Some((index, symbol)) = trimmed.split_once(": ") else {
                continue;
            };
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            frames.push(strip_hash_suffix(symbol.trim()).to_owned());
        }
        Self { frames }
    }

    fn matches_any(&self, allowed: &[String]) -> bool {
        allowed
            .iter()
            .any(|entry| self.frames.iter().any(|frame| frame.contains(entry)))
    }
}

fn strip_hash_suffix(symbol: &str) -> &str {
    if let Some(position) = symbol.rfind("::h") {
        let suffix = &symbol[position + 3..];
        if suffix.len() == 16 && suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return &symbol[..position];
        }
    }
    symbol
}
