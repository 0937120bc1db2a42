//! Cancellable async effects.
//!
//! An effect is an asynchronous task tied to a [`CancellationToken`]. The task is
//! written as a chain of [`Abortable`] stages joined with [`Bind::bind`]:
//!
//! 1. If a stage aborted, later stages are skipped and the abort propagates.
//! 2. If the token fired before the next stage runs, the chain aborts without an
//!    error: cancellation wins over a late result.
//! 3. Otherwise the next stage runs. An error it returns becomes an abort that
//!    carries the error.
//!
//! Each stage may register [`Cleanup`] callbacks. They accumulate along the chain
//! and run in reverse registration order when the effect is torn down, whatever
//! stage the chain stopped at.
//!
//! # Example
//!
//! ```rust
//! use std::convert::Infallible;
//! use tasklist::effect::{Abortable, AsyncEffect};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let effect = AsyncEffect::spawn(CancellationToken::new(), |bind, _token| async move {
//!     let opened = Abortable::<_, Infallible>::from_value("connection")
//!         .with_cleanup(|| println!("closed"));
//!     bind.then(opened, |conn| async move { Ok(conn.len()) }).await
//! });
//!
//! // Signals the token, waits for the chain, then runs the cleanups.
//! effect.teardown().await;
//! # }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::{Future, IntoFuture, Ready, ready};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A deferred action run on teardown.
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can tell whether they were caused by cancellation.
///
/// Abort-kind errors are expected during teardown and are not logged.
pub trait AbortError: fmt::Display {
    fn is_abort(&self) -> bool;
}

impl<E: AbortError + ?Sized> AbortError for Arc<E> {
    fn is_abort(&self) -> bool {
        (**self).is_abort()
    }
}

impl<E: AbortError + ?Sized> AbortError for Box<E> {
    fn is_abort(&self) -> bool {
        (**self).is_abort()
    }
}

impl AbortError for Infallible {
    fn is_abort(&self) -> bool {
        match *self {}
    }
}

/// The outcome of one stage of an effect chain.
#[must_use]
pub enum Abortable<T, E> {
    /// The chain stopped, either by cancellation (`err` is `None`) or by an error.
    Aborted {
        cleanups: Vec<Cleanup>,
        err: Option<E>,
    },
    /// The stage produced a value.
    Completed { value: T, cleanups: Vec<Cleanup> },
}

impl<T, E> Abortable<T, E> {
    pub fn from_value(value: T) -> Self {
        Self::Completed {
            value,
            cleanups: Vec::new(),
        }
    }

    pub fn from_error(err: E) -> Self {
        Self::Aborted {
            cleanups: Vec::new(),
            err: Some(err),
        }
    }

    /// An abort with no error, as produced by cancellation.
    pub fn cancelled() -> Self {
        Self::Aborted {
            cleanups: Vec::new(),
            err: None,
        }
    }

    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::from_value(value),
            Err(err) => Self::from_error(err),
        }
    }

    /// Awaits a fallible future and lifts its outcome into a stage.
    pub async fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>>,
    {
        Self::from_result(future.await)
    }

    /// Registers a cleanup after the ones already carried by this stage.
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanups_mut().push(Box::new(cleanup));
        self
    }

    #[must_use]
    pub fn cleanups(&self) -> &[Cleanup] {
        match self {
            Self::Aborted { cleanups, .. } | Self::Completed { cleanups, .. } => cleanups,
        }
    }

    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Aborted { .. } => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Aborted { err, .. } => err.as_ref(),
            Self::Completed { .. } => None,
        }
    }

    fn cleanups_mut(&mut self) -> &mut Vec<Cleanup> {
        match self {
            Self::Aborted { cleanups, .. } | Self::Completed { cleanups, .. } => cleanups,
        }
    }

    /// Puts `prior` in front of this stage's own cleanups.
    fn after(mut self, mut prior: Vec<Cleanup>) -> Self {
        let own = self.cleanups_mut();
        prior.append(own);
        *own = prior;
        self
    }
}

impl<T, E: AbortError> Abortable<T, E> {
    /// Finishes a chain: logs a non-abort error, then runs every cleanup,
    /// last registered first.
    pub fn settle(self) {
        let (cleanups, err) = match self {
            Self::Aborted { cleanups, err } => (cleanups, err),
            Self::Completed { cleanups, .. } => (cleanups, None),
        };

        if let Some(err) = err {
            if err.is_abort() {
                debug!(error = %err, "effect aborted");
            } else {
                error!(error = %err, "effect failed");
            }
        }

        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

impl<T, E> IntoFuture for Abortable<T, E> {
    type Output = Self;
    type IntoFuture = Ready<Self>;

    fn into_future(self) -> Self::IntoFuture {
        ready(self)
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Abortable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { cleanups, err } => f
                .debug_struct("Aborted")
                .field("cleanups", &cleanups.len())
                .field("err", err)
                .finish(),
            Self::Completed { value, cleanups } => f
                .debug_struct("Completed")
                .field("value", value)
                .field("cleanups", &cleanups.len())
                .finish(),
        }
    }
}

/// Sequences [`Abortable`] stages under a cancellation token.
#[derive(Debug, Clone)]
pub struct Bind {
    token: CancellationToken,
}

impl Bind {
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Runs `f` on the value of `stage`, unless the stage aborted or the token
    /// has fired in the meantime.
    ///
    /// The cleanups of `stage` are kept in front of the ones `f` registers, whether
    /// `f` completes, aborts or fails. An `Err` from `f` becomes
    /// [`Abortable::Aborted`] carrying that error.
    pub async fn bind<A, B, E, S, F, Fut>(&self, stage: S, f: F) -> Abortable<B, E>
    where
        S: IntoFuture<Output = Abortable<A, E>>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<Abortable<B, E>, E>>,
    {
        let (value, prior) = match stage.await {
            Abortable::Aborted { cleanups, err } => return Abortable::Aborted { cleanups, err },
            Abortable::Completed { value, cleanups } => (value, cleanups),
        };

        if self.token.is_cancelled() {
            return Abortable::Aborted {
                cleanups: prior,
                err: None,
            };
        }

        f(value)
            .await
            .unwrap_or_else(Abortable::from_error)
            .after(prior)
    }

    /// Like [`Bind::bind`], for a step that registers no cleanups of its own.
    pub async fn then<A, B, E, S, F, Fut>(&self, stage: S, f: F) -> Abortable<B, E>
    where
        S: IntoFuture<Output = Abortable<A, E>>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<B, E>>,
    {
        self.bind(stage, |value| async move { f(value).await.map(Abortable::from_value) })
            .await
    }
}

/// A running effect.
///
/// The chain runs on the tokio runtime. Once it settles, the effect waits for its
/// token; teardown then logs any error that is not an abort and runs the collected
/// cleanups in reverse order. Errors are never returned to the owner.
///
/// Dropping the handle detaches the effect: it keeps running until its token is
/// signaled.
#[derive(Debug)]
pub struct AsyncEffect {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl AsyncEffect {
    /// Starts an effect built from a [`Bind`] and the effect's token.
    pub fn spawn<T, E, F, Fut>(token: CancellationToken, f: F) -> Self
    where
        F: FnOnce(Bind, CancellationToken) -> Fut,
        Fut: Future<Output = Abortable<T, E>> + Send + 'static,
        T: Send + 'static,
        E: AbortError + Send + 'static,
    {
        let chain = f(Bind::new(token.clone()), token.clone());
        let teardown = token.clone();

        let join = tokio::spawn(async move {
            let outcome = chain.await;
            teardown.cancelled().await;
            outcome.settle();
        });

        Self { token, join }
    }

    /// Starts an effect from a plain fallible task.
    ///
    /// A cleanup returned by the task is registered and runs on teardown.
    pub fn from_task<E, F, Fut>(token: CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Option<Cleanup>, E>> + Send + 'static,
        E: AbortError + Send + 'static,
    {
        let task = f(token.clone());
        Self::spawn(token, move |_bind, _token| async move {
            match task.await {
                Ok(Some(cleanup)) => Abortable::from_value(()).with_cleanup(cleanup),
                Ok(None) => Abortable::from_value(()),
                Err(err) => Abortable::from_error(err),
            }
        })
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signals the effect without waiting for its cleanups.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Signals the effect and waits until its cleanups have run.
    pub async fn teardown(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            if err.is_panic() {
                error!(error = %err, "effect panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError {
        abort: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.abort {
                f.write_str("aborted")
            } else {
                f.write_str("boom")
            }
        }
    }

    impl AbortError for TestError {
        fn is_abort(&self) -> bool {
            self.abort
        }
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str) -> impl FnOnce() + Send + 'static {
        let log = Arc::clone(log);
        move || log.lock().expect("log lock").push(name)
    }

    fn entries(log: &Log) -> Vec<&'static str> {
        log.lock().expect("log lock").clone()
    }

    #[tokio::test]
    async fn test_bind_runs_on_completed_value() {
        let bind = Bind::new(CancellationToken::new());
        let stage = Abortable::<_, TestError>::from_value(20);

        let result = bind.then(stage, |n| async move { Ok(n + 22) }).await;

        assert_eq!(result.value(), Some(&42));
        assert!(!result.is_aborted());
    }

    #[tokio::test]
    async fn test_bind_propagates_abort_unchanged() {
        let bind = Bind::new(CancellationToken::new());
        let stage = Abortable::<i32, _>::from_error(TestError { abort: false }).with_cleanup(|| {});
        let called = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&called);
        let result = bind
            .then(stage, |n| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(n)
            })
            .await;

        assert!(!called.load(Ordering::SeqCst));
        assert!(result.is_aborted());
        assert!(result.error().is_some_and(|e| !e.abort));
        assert_eq!(result.cleanups().len(), 1);
    }

    #[tokio::test]
    async fn test_bind_short_circuits_when_cancelled() {
        let token = CancellationToken::new();
        let bind = Bind::new(token.clone());
        let stage = Abortable::<_, TestError>::from_value(1)
            .with_cleanup(|| {})
            .with_cleanup(|| {});

        token.cancel();
        let result = bind.then(stage, |n| async move { Ok(n + 1) }).await;

        assert!(result.is_aborted());
        assert!(result.error().is_none());
        assert_eq!(result.cleanups().len(), 2);
    }

    #[tokio::test]
    async fn test_bind_captures_error_and_keeps_cleanups() {
        let log = Log::default();
        let bind = Bind::new(CancellationToken::new());
        let stage = Abortable::<_, TestError>::from_value(()).with_cleanup(recorder(&log, "first"));

        let result: Abortable<(), _> = bind
            .then(stage, |()| async { Err(TestError { abort: false }) })
            .await;

        assert!(result.is_aborted());
        assert_eq!(result.cleanups().len(), 1);
        result.settle();
        assert_eq!(entries(&log), vec!["first"]);
    }

    #[tokio::test]
    async fn test_cleanups_merge_prior_first() {
        let log = Log::default();
        let bind = Bind::new(CancellationToken::new());
        let stage = Abortable::<_, TestError>::from_value(())
            .with_cleanup(recorder(&log, "a"))
            .with_cleanup(recorder(&log, "b"));

        let log_c = Arc::clone(&log);
        let result = bind
            .bind(stage, |()| async move {
                Ok(Abortable::from_value(()).with_cleanup(recorder(&log_c, "c")))
            })
            .await;

        assert_eq!(result.cleanups().len(), 3);
        result.settle();
        assert_eq!(entries(&log), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_teardown_runs_cleanups_in_reverse() {
        let log = Log::default();
        let steps = Arc::clone(&log);

        let effect = AsyncEffect::spawn(CancellationToken::new(), move |bind, _token| async move {
            let first = Abortable::<_, TestError>::from_value(1).with_cleanup(recorder(&steps, "one"));
            let l = Arc::clone(&steps);
            let second = bind
                .bind(first, |n| async move {
                    Ok(Abortable::from_value(n + 1).with_cleanup(recorder(&l, "two")))
                })
                .await;
            let l = Arc::clone(&steps);
            bind.bind(second, |n| async move {
                Ok(Abortable::from_value(n + 1).with_cleanup(recorder(&l, "three")))
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(entries(&log).is_empty(), "cleanups wait for teardown");

        effect.teardown().await;
        assert_eq!(entries(&log), vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_teardown_order_when_middle_step_fails() {
        let log = Log::default();
        let steps = Arc::clone(&log);

        let effect = AsyncEffect::spawn(CancellationToken::new(), move |bind, _token| async move {
            let first = Abortable::<_, TestError>::from_value(()).with_cleanup(recorder(&steps, "one"));
            let l = Arc::clone(&steps);
            let second = bind
                .bind(first, |()| async move {
                    Ok(Abortable::from_value(()).with_cleanup(recorder(&l, "two")))
                })
                .await;
            let failed: Abortable<(), _> = bind
                .then(second, |()| async { Err(TestError { abort: false }) })
                .await;
            bind.then(failed, |()| async { Ok(()) }).await
        });

        effect.teardown().await;
        assert_eq!(entries(&log), vec!["two", "one"]);
    }

    #[tokio::test]
    async fn test_cancel_before_settle_never_completes() {
        let completed = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&completed);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let effect = AsyncEffect::spawn(CancellationToken::new(), move |bind, _token| async move {
            let slow = Abortable::<_, TestError>::from_future(async move {
                let _ = release_rx.await;
                Ok(5)
            })
            .await;
            bind.then(slow, |n| async move {
                observed.store(true, Ordering::SeqCst);
                Ok(n)
            })
            .await
        });

        effect.cancel();
        let _ = release_tx.send(());
        effect.teardown().await;

        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_from_task_registers_returned_cleanup() {
        let log = Log::default();
        let cleanup = recorder(&log, "task");

        let effect = AsyncEffect::from_task(CancellationToken::new(), move |_token| async move {
            Ok::<_, TestError>(Some(Box::new(cleanup) as Cleanup))
        });

        effect.teardown().await;
        assert_eq!(entries(&log), vec!["task"]);
    }

    #[tokio::test]
    async fn test_from_task_error_is_swallowed() {
        let effect = AsyncEffect::from_task(CancellationToken::new(), |_token| async {
            Err::<Option<Cleanup>, _>(TestError { abort: true })
        });

        // Teardown completes without surfacing the error.
        effect.teardown().await;
    }

    #[test]
    fn test_abortable_debug_hides_cleanups() {
        let stage = Abortable::<u8, TestError>::from_value(3).with_cleanup(|| {});
        assert_eq!(format!("{stage:?}"), "Completed { value: 3, cleanups: 1 }");
    }

    #[test]
    fn test_arc_error_is_abort() {
        let err = Arc::new(TestError { abort: true });
        assert!(err.is_abort());
        assert!(!Arc::new(TestError { abort: false }).is_abort());
    }
}
