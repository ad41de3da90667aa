//! Fan-out/fan-in completion barrier.
//!
//! A [`CompletionBarrier`] is created for a fixed number of operations and
//! hands out exactly that many one-shot [`Completion`] tokens. Each token
//! counts once, whether it is completed explicitly or dropped (a task that
//! fails, times out or panics still releases its token), so the barrier
//! cannot miss a completion or count one twice. Once every token has been
//! accounted for, waiters are released and the registered continuation runs
//! exactly once.
//!
//! ```
//! use docmirror_sync::CompletionBarrier;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (barrier, tokens) = CompletionBarrier::new(3);
//! for token in tokens {
//!     tokio::spawn(async move {
//!         // ... perform one read ...
//!         token.complete();
//!     });
//! }
//! barrier.wait().await;
//! assert!(barrier.is_complete());
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Continuation = Box<dyn FnOnce() + Send>;

struct FireState {
    fired: bool,
    continuation: Option<Continuation>,
}

struct Shared {
    remaining: AtomicUsize,
    state: Mutex<FireState>,
    done: watch::Sender<bool>,
}

impl Shared {
    fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let continuation = {
            let mut state = self.state.lock().unwrap();
            state.fired = true;
            state.continuation.take()
        };
        self.done.send_replace(true);
        if let Some(continuation) = continuation {
            continuation();
        }
    }
}

/// Resolves once a fixed number of operations have all completed.
#[derive(Clone)]
pub struct CompletionBarrier {
    shared: Arc<Shared>,
}

impl CompletionBarrier {
    /// Creates a barrier for `pending` operations and returns one token per
    /// operation. With `pending == 0` the barrier is complete immediately.
    #[must_use]
    pub fn new(pending: usize) -> (Self, Vec<Completion>) {
        let (done, _) = watch::channel(pending == 0);
        let shared = Arc::new(Shared {
            remaining: AtomicUsize::new(pending),
            state: Mutex::new(FireState {
                fired: pending == 0,
                continuation: None,
            }),
            done,
        });
        let tokens = (0..pending)
            .map(|_| Completion {
                shared: Arc::clone(&shared),
            })
            .collect();
        (Self { shared }, tokens)
    }

    /// Returns how many operations are still outstanding.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.shared.remaining.load(Ordering::Acquire)
    }

    /// Returns true once every operation has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Registers the continuation to run once all operations completed.
    ///
    /// Runs `f` immediately if the barrier is already complete. Only one
    /// continuation is kept; registering another replaces a pending one.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        if !state.fired {
            state.continuation = Some(Box::new(f));
            return;
        }
        drop(state);
        f();
    }

    /// Waits until every operation has completed.
    pub async fn wait(&self) {
        let mut rx = self.shared.done.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// One outstanding operation of a [`CompletionBarrier`].
///
/// Completing or dropping the token accounts for the operation.
#[must_use = "dropping a Completion immediately counts the operation as done"]
pub struct Completion {
    shared: Arc<Shared>,
}

impl Completion {
    /// Marks the operation as done.
    pub fn complete(self) {}
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.shared.complete_one();
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
