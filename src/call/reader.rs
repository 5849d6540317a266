//! The response stream reader (§4.6): a lazy, at-most-one-outstanding-read
//! sequence of typed messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::call::state::CallShared;
use crate::error::{CallError, RpcError};
use crate::status::Status;

/// One already-deserialized response message, or the terminal status that
/// ended the stream instead of a message.
pub type ReaderItem<Resp> = Result<Resp, Status>;

/// Lazy, at-most-one-outstanding-read sequence of response messages.
/// `move_next`/`current` mirror §4.6's reader contract directly; `read_all`
/// wraps them as a `Stream` for ergonomic consumption.
pub struct ResponseStreamReader<Resp> {
    receiver: AsyncMutex<mpsc::UnboundedReceiver<ReaderItem<Resp>>>,
    current: std::sync::Mutex<Option<Resp>>,
    reading: AtomicBool,
    shared: Arc<CallShared>,
}

impl<Resp: Send + 'static> ResponseStreamReader<Resp> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<ReaderItem<Resp>>, shared: Arc<CallShared>) -> Self {
        ResponseStreamReader {
            receiver: AsyncMutex::new(receiver),
            current: std::sync::Mutex::new(None),
            reading: AtomicBool::new(false),
            shared,
        }
    }

    /// Awaits the next message. `Ok(true)` means [`Self::take_current`]
    /// will return it; `Ok(false)` means end-of-stream. A second call
    /// overlapping one already in progress fails with
    /// [`RpcError::ConcurrentRead`] and logs `ReadMessageError`.
    pub async fn move_next(&self, cancellation_token: &CancellationToken) -> Result<bool, CallError> {
        if self.reading.swap(true, Ordering::SeqCst) {
            tracing::warn!(name: "ReadMessageError", "overlapping move_next call");
            return Err(CallError::Local(RpcError::ConcurrentRead));
        }

        let outcome = self.do_move_next(cancellation_token).await;
        self.reading.store(false, Ordering::SeqCst);
        outcome
    }

    async fn do_move_next(&self, cancellation_token: &CancellationToken) -> Result<bool, CallError> {
        if cancellation_token.is_cancelled() {
            return Err(CallError::Status(Status::cancelled("gRPC call disposed.")));
        }

        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                Err(CallError::Status(Status::cancelled("gRPC call disposed.")))
            }
            item = receiver.recv() => match item {
                Some(Ok(message)) => {
                    *self.current.lock().unwrap() = Some(message);
                    Ok(true)
                }
                Some(Err(status)) => Err(CallError::Status(status)),
                None => {
                    *self.current.lock().unwrap() = None;
                    match self.shared.terminal_outcome() {
                        Some(outcome) if !outcome.status.is_ok() => {
                            Err(CallError::Status(outcome.status.clone()))
                        }
                        _ => Ok(false),
                    }
                }
            },
        }
    }

    /// Takes ownership of the message populated by the last successful
    /// `move_next`.
    pub fn take_current(&self) -> Option<Resp> {
        self.current.lock().unwrap().take()
    }

    /// A finite, non-restartable stream built on `move_next`.
    pub fn read_all<'a>(
        &'a self,
        cancellation_token: CancellationToken,
    ) -> impl Stream<Item = Result<Resp, CallError>> + 'a {
        futures_util::stream::unfold((self, cancellation_token, false), |(reader, token, done)| async move {
            if done {
                return None;
            }
            match reader.move_next(&token).await {
                Ok(true) => {
                    let message = reader.take_current().expect("move_next returned true");
                    Some((Ok(message), (reader, token, false)))
                }
                Ok(false) => None,
                Err(err) => Some((Err(err), (reader, token, true))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::state::TerminalOutcome;
    use crate::status::StatusCode;
    use futures_util::StreamExt;

    fn reader_with(
        items: Vec<ReaderItem<&'static str>>,
    ) -> (ResponseStreamReader<&'static str>, Arc<CallShared>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            tx.send(item).unwrap();
        }
        let shared = CallShared::new();
        (ResponseStreamReader::new(rx, shared.clone()), shared)
    }

    #[tokio::test]
    async fn move_next_populates_current_then_ends() {
        let (reader, shared) = reader_with(vec![Ok("one"), Ok("two")]);
        shared.try_finish(TerminalOutcome { status: Status::ok(), trailers: Default::default() });
        let token = CancellationToken::new();

        assert!(reader.move_next(&token).await.unwrap());
        assert_eq!(reader.take_current(), Some("one"));
        assert!(reader.move_next(&token).await.unwrap());
        assert_eq!(reader.take_current(), Some("two"));
        assert!(!reader.move_next(&token).await.unwrap());
    }

    #[tokio::test]
    async fn overlapping_move_next_fails_with_concurrent_read() {
        let (reader, _shared) = reader_with(vec![]);
        let reader = Arc::new(reader);
        let token = CancellationToken::new();

        let reader2 = reader.clone();
        let token2 = token.clone();
        let first = tokio::spawn(async move { reader2.move_next(&token2).await });
        tokio::task::yield_now().await;

        let second = reader.move_next(&token).await;
        assert!(matches!(second, Err(CallError::Local(RpcError::ConcurrentRead))));
        drop(first);
    }

    #[tokio::test]
    async fn cancellation_before_start_completes_with_cancelled() {
        let (reader, _shared) = reader_with(vec![]);
        let token = CancellationToken::new();
        token.cancel();
        let err = reader.move_next(&token).await.unwrap_err();
        match err {
            CallError::Status(status) => assert_eq!(status.code(), StatusCode::Cancelled),
            CallError::Local(_) => panic!("expected status error"),
        }
    }

    #[tokio::test]
    async fn read_all_yields_every_message_then_stops() {
        let (reader, shared) = reader_with(vec![Ok("a"), Ok("b")]);
        shared.try_finish(TerminalOutcome { status: Status::ok(), trailers: Default::default() });
        let items: Vec<_> = reader
            .read_all(CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn end_of_stream_with_error_outcome_surfaces_status() {
        let (reader, shared) = reader_with(vec![]);
        shared.try_finish(TerminalOutcome {
            status: Status::internal("Error reading next message. Exception: Boom"),
            trailers: Default::default(),
        });
        let token = CancellationToken::new();
        let err = reader.move_next(&token).await.unwrap_err();
        match err {
            CallError::Status(status) => assert_eq!(status.code(), StatusCode::Internal),
            CallError::Local(_) => panic!("expected status error"),
        }
    }
}
