//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod instance_log;

pub(crate) use circular::StackGuard;
pub(crate) use instance_log::{InstanceLog, TrackedInstance};
