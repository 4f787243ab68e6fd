//! Resolution-in-progress tracking for recursion and cycle detection.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::provider::ScopeId;

// Thread-local stack of (scope, service) pairs currently being constructed
thread_local! {
    static RESOLUTION_TLS: RefCell<SmallVec<[(ScopeId, Key); 16]>> = RefCell::new(SmallVec::new());
}

/// Marks `(scope, key)` as in progress for as long as the guard lives.
///
/// Entering a pair that is already on this thread's stack fails with
/// [`DiError::Circular`] carrying the display path of the cycle; a stack deeper
/// than `max_depth` fails with [`DiError::DepthExceeded`]. Nothing is pushed on
/// failure, so the stack stays balanced.
pub(crate) struct StackGuard {
    scope: ScopeId,
    key: Key,
}

impl StackGuard {
    pub(crate) fn enter(scope: ScopeId, key: Key, max_depth: usize) -> DiResult<Self> {
        RESOLUTION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();

            if let Some(start) = stack.iter().position(|(s, k)| *s == scope && *k == key) {
                let mut path: Vec<&'static str> = stack[start..]
                    .iter()
                    .map(|(_, k)| k.display_name())
                    .collect();
                path.push(key.display_name());
                return Err(DiError::Circular(path));
            }

            if stack.len() >= max_depth {
                return Err(DiError::DepthExceeded(stack.len()));
            }

            stack.push((scope, key));
            Ok(Self { scope, key })
        })
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        RESOLUTION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();
            if let Some(last) = stack.pop() {
                debug_assert!(last.0 == self.scope && last.1 == self.key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentry_reports_cycle_path() {
        let scope = ScopeId::new();
        let a = Key::token("A");
        let b = Key::token("B");

        let _ga = StackGuard::enter(scope, a, 16).unwrap();
        let _gb = StackGuard::enter(scope, b, 16).unwrap();
        match StackGuard::enter(scope, a, 16) {
            Err(DiError::Circular(path)) => assert_eq!(path, vec!["A", "B", "A"]),
            _ => panic!("expected cycle"),
        }
    }

    #[test]
    fn test_same_key_in_other_scope_is_not_a_cycle() {
        let key = Key::token("Shared");
        let _outer = StackGuard::enter(ScopeId::new(), key, 16).unwrap();
        assert!(StackGuard::enter(ScopeId::new(), key, 16).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let scope = ScopeId::new();
        let _g1 = StackGuard::enter(scope, Key::token("one"), 2).unwrap();
        let _g2 = StackGuard::enter(scope, Key::token("two"), 2).unwrap();
        assert!(matches!(
            StackGuard::enter(scope, Key::token("three"), 2),
            Err(DiError::DepthExceeded(2))
        ));
    }

    #[test]
    fn test_guard_pops_on_drop() {
        let scope = ScopeId::new();
        let key = Key::token("Again");
        drop(StackGuard::enter(scope, key, 16).unwrap());
        assert!(StackGuard::enter(scope, key, 16).is_ok());
    }
}
