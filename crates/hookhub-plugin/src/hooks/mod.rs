//! Hook system: typed hook points, the context bag, and the dispatcher.

pub mod definitions;
pub mod dispatcher;

pub use definitions::{HookContext, HookPoint, ValueKind};
pub use dispatcher::{DispatchOutcome, HookDispatcher, HookFailure, SkipReason, SkippedPlugin};
