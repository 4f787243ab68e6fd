//! Core traits for the service-lifetime container.

mod dispose;
mod resolver;

pub use dispose::{AsyncDispose, Dispose};
pub use resolver::{AnyArc, Resolver, ResolverCore};
