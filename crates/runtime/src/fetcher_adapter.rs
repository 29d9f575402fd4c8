//! Wraps a [`purc_dom::Fetcher`] so its out-of-band callback becomes a
//! `Response` message waiting in the originating coroutine's inbox,
//! never a value returned synchronously from inside a step
//! (`spec.md` §5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use purc_dom::{FetchCallback, FetchId, FetchOutcome, Fetcher};
use purc_variant::Variant;

use crate::atom::msg_atom;
use crate::error::RuntimeResult;
use crate::message::{Message, MessageType, Target};

/// One pending fetch's delivery address: which coroutine asked, and
/// the request id it should see on the reply.
#[derive(Debug, Clone, Copy)]
struct PendingFetch {
    coroutine_numeric_id: u64,
    request_id: u64,
}

pub struct FetcherAdapter {
    fetcher: Arc<dyn Fetcher>,
    completed: Arc<Mutex<VecDeque<Message>>>,
    next_request_id: AtomicU64,
}

impl FetcherAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            completed: Arc::new(Mutex::new(VecDeque::new())),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Starts a fetch on behalf of `coroutine_numeric_id`, assigning
    /// its own request id. Used by the `request` verb, which has no
    /// other source of request ids to correlate the reply against.
    pub fn start(&self, url: &str, coroutine_numeric_id: u64) -> RuntimeResult<u64> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.fetch(url, coroutine_numeric_id, request_id)?;
        Ok(request_id)
    }

    /// Starts a fetch on behalf of `coroutine_numeric_id`; the result
    /// lands in `drain_completed` as a `Response` message once the
    /// fetcher's own I/O finishes, tagged with `request_id` so the
    /// waiting `request`/`load` verb can correlate it.
    pub fn fetch(&self, url: &str, coroutine_numeric_id: u64, request_id: u64) -> RuntimeResult<FetchId> {
        let pending = PendingFetch {
            coroutine_numeric_id,
            request_id,
        };
        let completed = self.completed.clone();
        let callback: FetchCallback = Box::new(move |outcome| {
            let msg = outcome_to_message(pending, outcome);
            completed.lock().push_back(msg);
        });
        Ok(self.fetcher.fetch_async(url, callback)?)
    }

    pub fn cancel(&self, id: FetchId) {
        self.fetcher.cancel(id);
    }

    /// Drains every fetch result that has completed since the last
    /// call. The scheduler routes each into its target coroutine's
    /// inbox on its own tick, matching the "no blocking inside a step"
    /// rule `spec.md` §5 states.
    pub fn drain_completed(&self) -> Vec<Message> {
        let mut queue = self.completed.lock();
        queue.drain(..).collect()
    }
}

fn outcome_to_message(pending: PendingFetch, outcome: FetchOutcome) -> Message {
    let (event_type_name, data) = match outcome {
        FetchOutcome::Success { content_type, body } => (
            "fetchState",
            Variant::make_object([
                (Arc::from("contentType"), Variant::make_string(content_type)),
                (Arc::from("body"), body),
            ]),
        ),
        FetchOutcome::Failed { message } => ("fetchState", Variant::make_string(message)),
    };
    Message {
        msg_type: MessageType::Response,
        target: Target::Coroutine,
        target_value: pending.coroutine_numeric_id,
        source_uri: Arc::from(""),
        event_type: msg_atom(event_type_name, None),
        sub_type: Some(Arc::from("complete")),
        request_id: pending.request_id,
        element_value: Variant::Null,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ImmediateFetcher {
        next_id: AtomicU64,
    }

    impl Fetcher for ImmediateFetcher {
        fn fetch_async(&self, url: &str, on_complete: FetchCallback) -> purc_dom::DomResult<FetchId> {
            let id = FetchId(self.next_id.fetch_add(1, Ordering::Relaxed));
            on_complete(FetchOutcome::Success {
                content_type: "text/plain".to_string(),
                body: Variant::make_string(url.to_string()),
            });
            Ok(id)
        }

        fn cancel(&self, _id: FetchId) {}
    }

    #[test]
    fn a_completed_fetch_becomes_a_response_message_for_its_coroutine() {
        let adapter = FetcherAdapter::new(Arc::new(ImmediateFetcher {
            next_id: AtomicU64::new(1),
        }));
        adapter.fetch("https://example.test/x", 7, 42).unwrap();
        let drained = adapter.drain_completed();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].target_value, 7);
        assert_eq!(drained[0].request_id, 42);
        assert_eq!(drained[0].msg_type, MessageType::Response);
    }
}
