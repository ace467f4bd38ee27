//! Task scheduling primitives for the Lumen platform runtime.
//!
//! The only scheduler this subsystem needs is the [`Invoker`]: a single
//! dedicated thread that executes submitted tasks strictly in submission
//! order, with support for delayed submission. Consumers that must never run
//! concurrently with themselves (like the VFS tree updater) serialize all of
//! their work through one invoker.

mod invoker;

pub use invoker::Invoker;
