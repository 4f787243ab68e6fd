//! Ordered record of cached instances awaiting teardown.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::descriptors::{SyncTeardown, Teardown, TeardownFuture};
use crate::key::Key;
use crate::traits::AnyArc;

pub(crate) struct TrackedInstance {
    pub(crate) key: Key,
    pub(crate) instance: AnyArc,
    pub(crate) teardown: Option<Teardown>,
}

impl TrackedInstance {
    /// Runs the instance's teardown, if any, converting panics into errors.
    pub(crate) async fn teardown(&self) -> anyhow::Result<()> {
        match &self.teardown {
            None => Ok(()),
            Some(Teardown::Sync(run)) => catch_sync(run, &self.instance),
            Some(Teardown::Async(run)) => CatchUnwind(run(self.instance.clone())).await,
        }
    }

    /// Teardown for an instance that finished building after its log was
    /// sealed. Sync teardown runs in place; async teardown cannot be awaited
    /// from a resolution and is reported as an error instead.
    pub(crate) fn teardown_late(&self) -> anyhow::Result<()> {
        match &self.teardown {
            None => Ok(()),
            Some(Teardown::Sync(run)) => catch_sync(run, &self.instance),
            Some(Teardown::Async(_)) => Err(anyhow::anyhow!(
                "instance created after disposal; async teardown skipped"
            )),
        }
    }
}

/// Instances in the order they were cached.
///
/// Once sealed the log accepts nothing more: disposal seals it when a drain
/// comes back empty, and later pushes are handed back to the caller.
#[derive(Default)]
pub(crate) struct InstanceLog {
    entries: Vec<TrackedInstance>,
    sealed: bool,
}

impl InstanceLog {
    pub(crate) fn push(&mut self, entry: TrackedInstance) -> Result<(), TrackedInstance> {
        if self.sealed {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Empties the log, returning entries newest first.
    pub(crate) fn drain_reverse(&mut self) -> Vec<TrackedInstance> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.reverse();
        entries
    }

    /// Like [`drain_reverse`](Self::drain_reverse), but seals the log when
    /// nothing was left to drain.
    pub(crate) fn drain_or_seal(&mut self) -> Vec<TrackedInstance> {
        let entries = self.drain_reverse();
        if entries.is_empty() {
            self.sealed = true;
        }
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries that still owe a teardown call.
    pub(crate) fn pending_teardowns(&self) -> usize {
        self.entries.iter().filter(|e| e.teardown.is_some()).count()
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|e| &e.key)
    }
}

fn catch_sync(run: &SyncTeardown, instance: &AnyArc) -> anyhow::Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| run(instance))) {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}

struct CatchUnwind(TeardownFuture);

impl Future for CatchUnwind {
    type Output = anyhow::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.0;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(panic_error(payload))),
        }
    }
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("teardown panicked: {message}")
}
