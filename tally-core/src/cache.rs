//! Single-flight cached value.
//!
//! All state lives in an owned actor task; handles talk to it over a command
//! channel and receive answers on oneshot channels. Callers that ask for the
//! value while a fetch is running are queued on that fetch instead of
//! starting another one.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fetching,
    Fresh,
    Stale,
}

/// When a fresh value stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Fetched on first demand, then kept until invalidated.
    OnInvalidate,
    /// Like `OnInvalidate`, but also goes stale this long after it was stored.
    Periodic(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError<E> {
    #[error("fetch failed: {0}")]
    Fetch(E),
    #[error("fetch task aborted before completing")]
    Aborted,
    #[error("cache actor has shut down")]
    Closed,
}

type Fetcher<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type Reply<T, E> = oneshot::Sender<Result<T, CacheError<E>>>;

/// Commands that can be sent to the cache actor
enum CacheCommand<T, E> {
    Get { force: bool, respond_to: Reply<T, E> },
    Peek { respond_to: oneshot::Sender<Option<T>> },
    State { respond_to: oneshot::Sender<CacheState> },
    Set { value: T },
    Invalidate,
    Clear,
}

/// Handle to a cached value owned by a dedicated task
pub struct SingleFlightCache<T, E> {
    command_tx: mpsc::UnboundedSender<CacheCommand<T, E>>,
}

impl<T, E> Clone for SingleFlightCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
        }
    }
}

impl<T, E> SingleFlightCache<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Spawn the actor on the current Tokio runtime.
    ///
    /// The actor stops once every handle has been dropped.
    pub fn spawn<F, Fut>(name: &'static str, policy: RefreshPolicy, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetcher: Fetcher<T, E> = Arc::new(move || fetch().boxed());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_cache_loop(Entry::new(name, policy), fetcher, command_rx));
        Self { command_tx }
    }

    /// Return the value if it is fresh, otherwise join (or start) the fetch.
    pub async fn get(&self) -> Result<T, CacheError<E>> {
        self.request(false).await
    }

    /// Refresh regardless of freshness. Joins a fetch that is already running.
    pub async fn fetch(&self) -> Result<T, CacheError<E>> {
        self.request(true).await
    }

    async fn request(&self, force: bool) -> Result<T, CacheError<E>> {
        let (respond_to, response_rx) = oneshot::channel();

        self.command_tx
            .send(CacheCommand::Get { force, respond_to })
            .map_err(|_| CacheError::Closed)?;

        response_rx.await.map_err(|_| CacheError::Closed)?
    }

    /// Last stored value, fresh or not. Never fetches.
    pub async fn peek(&self) -> Option<T> {
        let (respond_to, response_rx) = oneshot::channel();
        self.command_tx
            .send(CacheCommand::Peek { respond_to })
            .ok()?;
        response_rx.await.ok().flatten()
    }

    pub async fn state(&self) -> Result<CacheState, CacheError<E>> {
        let (respond_to, response_rx) = oneshot::channel();

        self.command_tx
            .send(CacheCommand::State { respond_to })
            .map_err(|_| CacheError::Closed)?;

        response_rx.await.map_err(|_| CacheError::Closed)
    }

    /// Store a value known to be current. Callers waiting on a fetch get it
    /// immediately.
    pub fn set(&self, value: T) {
        let _ = self.command_tx.send(CacheCommand::Set { value });
    }

    pub fn invalidate(&self) {
        let _ = self.command_tx.send(CacheCommand::Invalidate);
    }

    /// Forget the stored value entirely.
    pub fn clear(&self) {
        let _ = self.command_tx.send(CacheCommand::Clear);
    }
}

struct Entry<T, E> {
    name: &'static str,
    policy: RefreshPolicy,
    value: Option<T>,
    state: CacheState,
    stored_at: Option<Instant>,
    /// Callers answered by the running fetch.
    waiters: Vec<Reply<T, E>>,
    /// Callers that arrived after the running fetch was superseded. They get
    /// the next fetch instead.
    queued: Vec<Reply<T, E>>,
    // Bumped by set/invalidate/clear. A fetch started under an older
    // generation never stores its result.
    generation: u64,
}

impl<T: Clone, E: Clone> Entry<T, E> {
    fn new(name: &'static str, policy: RefreshPolicy) -> Self {
        Self {
            name,
            policy,
            value: None,
            state: CacheState::Empty,
            stored_at: None,
            waiters: Vec::new(),
            queued: Vec::new(),
            generation: 0,
        }
    }

    fn expire(&mut self) {
        if self.state != CacheState::Fresh {
            return;
        }
        if let RefreshPolicy::Periodic(ttl) = self.policy {
            let expired = self
                .stored_at
                .map(|stored_at| stored_at.elapsed() >= ttl)
                .unwrap_or(true);
            if expired {
                tracing::debug!(cache = self.name, "Cached value expired");
                self.state = CacheState::Stale;
            }
        }
    }

    fn store(&mut self, value: T) {
        self.value = Some(value);
        self.state = CacheState::Fresh;
        self.stored_at = Some(Instant::now());
    }

    fn settle(&mut self) {
        if self.state == CacheState::Fetching {
            self.state = if self.value.is_some() {
                CacheState::Stale
            } else {
                CacheState::Empty
            };
        }
    }

    /// Apply a command. `running` is the generation of the fetch in flight.
    /// Returns true when a fetch must be started.
    fn handle(&mut self, command: CacheCommand<T, E>, running: Option<u64>) -> bool {
        match command {
            CacheCommand::Get { force, respond_to } => {
                self.expire();
                if !force && self.state == CacheState::Fresh {
                    if let Some(value) = &self.value {
                        let _ = respond_to.send(Ok(value.clone()));
                        return false;
                    }
                }
                self.state = CacheState::Fetching;
                match running {
                    Some(generation) if generation != self.generation => {
                        tracing::debug!(cache = self.name, "Running fetch is superseded, queueing");
                        self.queued.push(respond_to);
                        false
                    }
                    Some(_) => {
                        self.waiters.push(respond_to);
                        false
                    }
                    None => {
                        self.waiters.push(respond_to);
                        true
                    }
                }
            }
            CacheCommand::Peek { respond_to } => {
                let _ = respond_to.send(self.value.clone());
                false
            }
            CacheCommand::State { respond_to } => {
                self.expire();
                let _ = respond_to.send(self.state);
                false
            }
            CacheCommand::Set { value } => {
                self.generation += 1;
                self.store(value.clone());
                for waiter in self.waiters.drain(..).chain(self.queued.drain(..)) {
                    let _ = waiter.send(Ok(value.clone()));
                }
                tracing::debug!(cache = self.name, "Value pushed into cache");
                false
            }
            CacheCommand::Invalidate => {
                self.generation += 1;
                if self.state == CacheState::Fresh {
                    self.state = CacheState::Stale;
                }
                tracing::debug!(cache = self.name, state = ?self.state, "Cache invalidated");
                false
            }
            CacheCommand::Clear => {
                self.generation += 1;
                self.value = None;
                self.stored_at = None;
                if self.state != CacheState::Fetching {
                    self.state = CacheState::Empty;
                }
                false
            }
        }
    }

    /// Deliver a finished fetch. Returns true when queued callers need a new
    /// fetch.
    fn complete(&mut self, generation: u64, joined: Result<Result<T, E>, JoinError>) -> bool {
        let outcome = match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CacheError::Fetch(error)),
            Err(join_error) => {
                tracing::error!(cache = self.name, error = %join_error, "Fetch task aborted");
                Err(CacheError::Aborted)
            }
        };

        let current = generation == self.generation;
        match &outcome {
            Ok(value) if current => self.store(value.clone()),
            Ok(_) => tracing::debug!(cache = self.name, "Discarding superseded fetch result"),
            Err(_) => {}
        }

        tracing::debug!(
            cache = self.name,
            ok = outcome.is_ok(),
            current,
            waiters = self.waiters.len(),
            queued = self.queued.len(),
            "Fetch completed"
        );

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }

        if self.queued.is_empty() {
            self.settle();
            return false;
        }
        self.waiters = std::mem::take(&mut self.queued);
        self.state = CacheState::Fetching;
        true
    }
}

/// Main event loop for the cache actor
async fn run_cache_loop<T, E>(
    mut entry: Entry<T, E>,
    fetcher: Fetcher<T, E>,
    mut command_rx: mpsc::UnboundedReceiver<CacheCommand<T, E>>,
) where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut in_flight: Option<(u64, JoinHandle<Result<T, E>>)> = None;

    loop {
        let start = tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                let running = in_flight.as_ref().map(|(generation, _)| *generation);
                entry.handle(command, running)
            }
            (generation, joined) = join_in_flight(&mut in_flight) => {
                in_flight = None;
                entry.complete(generation, joined)
            }
        };

        if start && in_flight.is_none() {
            tracing::debug!(cache = entry.name, generation = entry.generation, "Starting fetch");
            in_flight = Some((entry.generation, tokio::spawn(fetcher())));
        }
    }

    if let Some((_, handle)) = in_flight {
        handle.abort();
    }
}

async fn join_in_flight<T>(
    in_flight: &mut Option<(u64, JoinHandle<T>)>,
) -> (u64, Result<T, JoinError>) {
    match in_flight {
        Some((generation, handle)) => (*generation, handle.await),
        None => std::future::pending().await,
    }
}
