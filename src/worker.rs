//! Background execution of engine calls

use std::any::Any;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};

/// One engine call running on its own OS thread.
///
/// Dropping a job without joining detaches the thread; it still runs to its
/// next cancellation checkpoint unless [`Job::cancel`] was called.
pub struct Job<T> {
    cancel: CancelToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Job<T> {
    /// Start `call` on a new thread. The closure receives the job's
    /// [`CancelToken`] and should pass it to the `*_with_cancel` engine calls.
    pub fn spawn<F>(name: &str, call: F) -> Result<Self>
    where
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("stoop-{name}"))
            .spawn(move || call(&token))
            .map_err(|e| {
                StoopError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to spawn worker thread",
                    e,
                )
            })?;
        debug!(job = name, "spawned");
        Ok(Self { cancel, handle })
    }

    /// Request cancellation. The call stops at its next checkpoint and
    /// [`Job::join`] then returns `ErrorKind::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this job, for handing to another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the call to finish.
    pub fn join(self) -> Result<T> {
        self.handle.join().map_err(|payload| {
            let msg = panic_message(&*payload);
            warn!("worker thread panicked: {msg}");
            StoopError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!("worker thread panicked: {msg}"),
            )
        })?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::kdf::tests::fast_params;
    use bson::Document;
    use std::sync::mpsc;

    fn engine() -> Engine {
        Engine::init(EngineConfig {
            argon2: fast_params(),
            pbkdf2_rounds: 1000,
        })
        .unwrap()
    }

    #[test]
    fn test_job_returns_value() {
        let e = engine();
        let job = Job::spawn("encrypt", move |cancel| {
            e.encrypt_with_cancel(b"payload", b"pw", Document::new(), cancel)
        })
        .unwrap();
        let outcome = job.join().unwrap();
        assert_eq!(engine().decrypt(&outcome.package, b"pw").unwrap(), b"payload");
    }

    #[test]
    fn test_cancel_before_checkpoint() {
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let e = engine();
        let job = Job::spawn("encrypt", move |cancel| {
            go_rx.recv().ok();
            e.encrypt_with_cancel(b"payload", b"pw", Document::new(), cancel)
        })
        .unwrap();

        job.cancel();
        go_tx.send(()).unwrap();
        let err = job.join().expect_err("cancelled");
        assert_eq!(err.kind, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_cancel_token_from_elsewhere() {
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let job = Job::spawn("wait", move |cancel| {
            go_rx.recv().ok();
            cancel.checkpoint()
        })
        .unwrap();

        let token = job.cancel_token();
        thread::spawn(move || token.cancel()).join().unwrap();
        go_tx.send(()).unwrap();
        assert!(job.join().unwrap_err().is(ErrorKind::Cancelled));
    }

    #[test]
    fn test_panic_becomes_error() {
        let job: Job<()> = Job::spawn("boom", |_| panic!("boom")).unwrap();
        let err = job.join().expect_err("panicked");
        assert_eq!(err.kind, Some(ErrorKind::InternalInvariant));
        assert!(err.to_string().contains("boom"));
    }
}
