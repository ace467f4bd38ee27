//! Startup measurement and phase gating for the Lumen platform.
//!
//! Two loosely related mechanisms live here:
//!
//! - [`ActivityTracker`] records named, optionally nested timing spans while
//!   the platform boots, so slow startup phases can be attributed to a
//!   subsystem or plugin.
//! - [`Lifecycle`] is an ordered cursor over the startup milestones
//!   ([`LoadingPhase`]). Code that must not run before a phase has been
//!   reached can assert that with [`Lifecycle::check_reached`], which logs
//!   (rather than crashes) on violation.
//!
//! Both are explicit shared objects, not process globals, so tests can run
//! isolated instances side by side.

mod activity;
mod lifecycle;
mod report;

pub use activity::{Activity, ActivitySpan, ActivityTracker};
pub use lifecycle::{Lifecycle, LifecycleConfig, LoadingPhase};
pub use report::{StartupTraceReport, TraceSpanEntry};
