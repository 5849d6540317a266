//! The per-call state machine (§4.5): `Created -> SendingHeaders ->
//! Streaming -> TrailersRead -> Finished`, with at-most-once terminal
//! completion across racing signal sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::metadata::Metadata;
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    SendingHeaders,
    Streaming,
    TrailersRead,
    Finished,
}

impl CallState {
    /// Whether advancing from `self` to `next` is a legal forward
    /// transition. `Finished` accepts no further transitions — it is a
    /// true terminal, enforced by [`CallShared::try_finish`] separately
    /// from this ordering check.
    pub fn can_advance_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Created, SendingHeaders)
                | (Created, Finished) // past-deadline fast path
                | (SendingHeaders, Streaming)
                | (SendingHeaders, Finished)
                | (Streaming, TrailersRead)
                | (Streaming, Finished)
                | (TrailersRead, Finished)
        )
    }
}

/// The frozen outcome of a finished call: status plus whatever trailers
/// were parsed (empty if the call never reached `TrailersRead`).
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    pub status: Status,
    pub trailers: Metadata,
}

/// The single owning record for a call's shared state (§9: "a single
/// owning call record with weak/back-references from readers/writers").
/// Reader, writer, and deadline tasks each hold only a clone of the `Arc`.
pub struct CallShared {
    claimed: AtomicBool,
    state: std::sync::Mutex<CallState>,
    terminal_tx: watch::Sender<Option<Arc<TerminalOutcome>>>,
    terminal_rx: watch::Receiver<Option<Arc<TerminalOutcome>>>,
    headers_tx: watch::Sender<Option<Arc<Metadata>>>,
    headers_rx: watch::Receiver<Option<Arc<Metadata>>>,
}

impl CallShared {
    pub fn new() -> Arc<Self> {
        let (terminal_tx, terminal_rx) = watch::channel(None);
        let (headers_tx, headers_rx) = watch::channel(None);
        Arc::new(CallShared {
            claimed: AtomicBool::new(false),
            state: std::sync::Mutex::new(CallState::Created),
            terminal_tx,
            terminal_rx,
            headers_tx,
            headers_rx,
        })
    }

    pub fn state(&self) -> CallState {
        *self.state.lock().unwrap()
    }

    /// Advances the state if the transition is legal and the call isn't
    /// already terminal. Returns whether the advance actually happened.
    pub fn advance(&self, next: CallState) -> bool {
        let mut guard = self.state.lock().unwrap();
        if guard.can_advance_to(next) {
            *guard = next;
            true
        } else {
            false
        }
    }

    pub fn is_finished(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    /// Sets the terminal outcome exactly once; later callers (racing
    /// cancel/deadline/transport-error/trailers/dispose) see `false` and
    /// must treat their own signal as a no-op, per §4.5's "whichever
    /// source triggers first wins".
    pub fn try_finish(&self, outcome: TerminalOutcome) -> bool {
        if self.claimed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            *self.state.lock().unwrap() = CallState::Finished;
            let _ = self.terminal_tx.send(Some(Arc::new(outcome)));
            true
        } else {
            false
        }
    }

    pub fn terminal_outcome(&self) -> Option<Arc<TerminalOutcome>> {
        self.terminal_rx.borrow().clone()
    }

    pub async fn wait_terminal(&self) -> Arc<TerminalOutcome> {
        let mut rx = self.terminal_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // sender dropped without ever finishing: treat as an
                // internal bug rather than hang forever.
                return Arc::new(TerminalOutcome {
                    status: Status::internal("call driver dropped without a terminal status"),
                    trailers: Metadata::new(),
                });
            }
        }
    }

    pub fn set_response_headers(&self, headers: Metadata) {
        let _ = self.headers_tx.send(Some(Arc::new(headers)));
    }

    pub fn response_headers(&self) -> Option<Arc<Metadata>> {
        self.headers_rx.borrow().clone()
    }

    pub async fn wait_response_headers(&self) -> Arc<Metadata> {
        let mut rx = self.headers_rx.clone();
        loop {
            if let Some(headers) = rx.borrow().clone() {
                return headers;
            }
            if rx.changed().await.is_err() {
                return Arc::new(Metadata::new());
            }
        }
    }
}
