//! The fetcher: a black-box sync/async URL loader, modeled as a
//! request API with a response callback (`spec.md` §1, §4 component
//! table).

use purc_variant::Variant;

use crate::error::DomResult;

/// Either terminal outcome of a fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success { content_type: String, body: Variant },
    Failed { message: String },
}

/// A pending fetch's eventual result, delivered out-of-band (through
/// whatever the caller wired `on_complete` to — typically a message
/// posted back into a coroutine's inbox, never returned synchronously
/// from `fetch_async`: `spec.md` §5 forbids blocking I/O inside a step).
pub type FetchCallback = Box<dyn FnOnce(FetchOutcome) + Send>;

/// Unique id of a fetch in flight, used by `notify_to_stop` (`spec.md`
/// §4.6) to request cancellation of the specific wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchId(pub u64);

/// Wraps both synchronous and asynchronous URL loads behind one
/// request-id-bearing, non-blocking interface.
pub trait Fetcher: Send + Sync {
    /// Starts a fetch; `on_complete` runs once, from whatever thread
    /// the fetcher's own I/O completes on, with the final outcome.
    fn fetch_async(&self, url: &str, on_complete: FetchCallback) -> DomResult<FetchId>;

    /// Best-effort cancellation of an in-flight fetch; a fetcher may
    /// decline, matching the advisory cancellation semantics `spec.md`
    /// §5 describes for coroutine cancel hooks in general.
    fn cancel(&self, id: FetchId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ImmediateFetcher {
        next_id: std::sync::atomic::AtomicU64,
    }

    impl Fetcher for ImmediateFetcher {
        fn fetch_async(&self, url: &str, on_complete: FetchCallback) -> DomResult<FetchId> {
            let id = FetchId(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
            on_complete(FetchOutcome::Success {
                content_type: "text/plain".to_string(),
                body: Variant::make_string(url.to_string()),
            });
            Ok(id)
        }

        fn cancel(&self, _id: FetchId) {}
    }

    #[test]
    fn immediate_fetcher_invokes_callback_synchronously() {
        let fetcher = ImmediateFetcher {
            next_id: std::sync::atomic::AtomicU64::new(1),
        };
        let captured = Arc::new(Mutex::new(None));
        let captured2 = captured.clone();
        fetcher
            .fetch_async("https://example.test/x", Box::new(move |outcome| {
                *captured2.lock().unwrap() = Some(outcome);
            }))
            .unwrap();
        match captured.lock().unwrap().take().unwrap() {
            FetchOutcome::Success { body, .. } => {
                assert_eq!(body, Variant::make_string("https://example.test/x"))
            }
            FetchOutcome::Failed { .. } => panic!("expected success"),
        }
    }
}
