//! The dispatcher: ordered handler groups, control signals, fault isolation.
//!
//! For every inner update the dispatcher walks groups in ascending order
//! and, inside a group, handlers in registration order. What happens next
//! is decided by the [`Signal`] each handler returns.
//!
//! # Example
//! ```rust,no_run
//! use layer_dispatch::{Dispatcher, Signal, handlers::Command};
//! use layer_storage::PeerStorage;
//!
//! # async fn run(rx: tokio::sync::mpsc::Receiver<layer_dispatch::raw::Envelope>) {
//! let dp = Dispatcher::new(PeerStorage::in_memory());
//! dp.add_handler(Command::new("start", |_ctx, update| async move {
//!     println!("start from {}", update.user_id());
//!     Ok(Signal::EndGroups)
//! }));
//! dp.run(rx).await;
//! # }
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt as _;
use layer_storage::{PeerStorage, PeerType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::entities::{self, Entities};
use crate::raw::{Envelope, RawUpdate, User};
use crate::update::{Message, Update};
use crate::upstream::Upstream;

// ─── Signals ──────────────────────────────────────────────────────────────────

/// What the dispatcher does after a handler ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Go on with the next handler.
    Continue,
    /// Stop handling this update altogether.
    EndGroups,
    /// Skip the rest of the current group and go on with the next group.
    SkipCurrentGroup,
    /// Stop the owning client and this update's walk.
    StopClient,
}

/// Error type handlers may return; anything implementing `Error` converts.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Result of [`Handler::check_update`].
pub type HandlerResult = Result<Signal, HandlerError>;

/// How the walk over one update ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every group was visited.
    Completed,
    /// A handler returned [`Signal::EndGroups`].
    Ended,
    /// A handler returned [`Signal::StopClient`].
    Stopped,
    /// A handler panicked.
    Panicked,
}

// ─── Handler ──────────────────────────────────────────────────────────────────

/// Something that can react to an update.
///
/// Implementations decide themselves whether the update applies and return
/// [`Signal::Continue`] when it does not.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn check_update(&self, ctx: &Context, update: &Arc<Update>) -> HandlerResult;
}

/// Called with every error a handler returns. The returned signal is applied
/// as if the handler had returned it.
pub type ErrorHandler = Arc<dyn Fn(&Context, &Update, &HandlerError) -> Signal + Send + Sync>;

/// Called with the panicking update and a formatted trace.
pub type PanicHandler = Arc<dyn Fn(&Context, &Update, &str) + Send + Sync>;

// ─── DispatcherConfig ─────────────────────────────────────────────────────────

/// Tunables of a [`Dispatcher`].
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Bound of each network call the dispatcher makes on its own
    /// (the missing-entity `getDifference` and reply fetches).
    pub difference_timeout:       Duration,
    /// Fetch the message a new message replies to before handlers run.
    pub auto_fetch_reply:         bool,
    /// With `auto_fetch_reply`, follow the reply chain up to
    /// `reply_chain_limit` messages instead of one.
    pub fetch_entire_reply_chain: bool,
    pub reply_chain_limit:        usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            difference_timeout:       Duration::from_secs(5),
            auto_fetch_reply:         false,
            fetch_entire_reply_chain: false,
            reply_chain_limit:        16,
        }
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Binding {
    client: Option<Arc<dyn Upstream>>,
    me:     Option<Arc<User>>,
    cancel: CancellationToken,
}

type Groups = BTreeMap<i32, Vec<Arc<dyn Handler>>>;

/// Routes updates through grouped handlers.
///
/// Handlers can be added at any time, also while [`Dispatcher::run`] is
/// active; each update walks the handlers registered when it arrived.
pub struct Dispatcher {
    groups:   RwLock<Groups>,
    on_error: RwLock<Option<ErrorHandler>>,
    on_panic: RwLock<Option<PanicHandler>>,
    binding:  RwLock<Binding>,
    peers:    PeerStorage,
    config:   DispatcherConfig,
}

impl Dispatcher {
    pub fn new(peers: PeerStorage) -> Self {
        Self::with_config(peers, DispatcherConfig::default())
    }

    pub fn with_config(peers: PeerStorage, config: DispatcherConfig) -> Self {
        Self {
            groups:   RwLock::new(BTreeMap::new()),
            on_error: RwLock::new(None),
            on_panic: RwLock::new(None),
            binding:  RwLock::new(Binding { client: None, me: None, cancel: CancellationToken::new() }),
            peers,
            config,
        }
    }

    pub fn peers(&self) -> &PeerStorage {
        &self.peers
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Add `handler` to group 0.
    pub fn add_handler(&self, handler: impl Handler + 'static) {
        self.add_handler_to_group(handler, 0);
    }

    /// Append `handler` to `group`. Lower groups run first.
    pub fn add_handler_to_group(&self, handler: impl Handler + 'static, group: i32) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Install the callback for handler errors.
    ///
    /// Without one, errors are logged and the walk continues.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&Context, &Update, &HandlerError) -> Signal + Send + Sync + 'static,
    {
        *self.on_error.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Install the callback for handler panics.
    ///
    /// Without one, the panic and its trace are logged.
    pub fn on_panic<F>(&self, f: F)
    where
        F: Fn(&Context, &Update, &str) + Send + Sync + 'static,
    {
        *self.on_panic.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Bind to a live client.
    ///
    /// `cancel` is the client's lifecycle token: [`Signal::StopClient`]
    /// cancels it and [`Dispatcher::run`] returns once it fires. `me` is the
    /// logged-in account; it is also saved to the peer store.
    pub fn initialize(&self, client: Arc<dyn Upstream>, me: User, cancel: CancellationToken) {
        if let Some(hash) = me.access_hash {
            self.peers.add_peer(me.id, hash, PeerType::User, me.username.as_deref().unwrap_or_default());
        }
        tracing::info!("[layer] dispatcher bound to client as user {}", me.id);
        *self.binding.write().unwrap_or_else(PoisonError::into_inner) = Binding {
            client: Some(client),
            me:     Some(Arc::new(me)),
            cancel,
        };
    }

    /// The token [`Signal::StopClient`] cancels.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.binding().cancel
    }

    fn binding(&self) -> Binding {
        self.binding.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn snapshot(&self) -> Vec<Vec<Arc<dyn Handler>>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    // ── dispatch ──────────────────────────────────────────────────────────

    /// Extract entities from `envelope`, then walk the handlers once per
    /// inner update. Returns one [`Outcome`] per update that was walked.
    pub async fn handle(&self, envelope: Envelope) -> Vec<Outcome> {
        let binding = self.binding();
        let Some(extracted) = entities::extract(
            envelope,
            &self.peers,
            binding.client.as_deref(),
            self.config.difference_timeout,
        )
        .await
        else {
            return Vec::new();
        };

        let entities = Arc::new(extracted.entities);
        let mut outcomes = Vec::with_capacity(extracted.updates.len());
        for raw in extracted.updates {
            if binding.cancel.is_cancelled() {
                tracing::debug!("[layer] client stopped; dropping the rest of the envelope");
                break;
            }
            outcomes.push(self.dispatch(&binding, Arc::clone(&entities), raw).await);
        }
        outcomes
    }

    async fn dispatch(&self, binding: &Binding, entities: Arc<Entities>, raw: RawUpdate) -> Outcome {
        let self_id = binding.me.as_ref().map_or(0, |u| u.id);
        let ctx = Context::new(
            binding.client.clone(),
            self.peers.clone(),
            binding.me.clone(),
            Arc::clone(&entities),
            binding.cancel.clone(),
            self.config.difference_timeout,
        );
        let mut update = Update::new(raw, entities, self_id);
        if self.config.auto_fetch_reply && binding.client.is_some() {
            if let Some(msg) = update.effective_message_mut() {
                let depth = if self.config.fetch_entire_reply_chain { self.config.reply_chain_limit } else { 1 };
                fill_reply_chain(&ctx, msg, depth).await;
            }
        }
        let update = Arc::new(update);

        let groups = self.snapshot();
        match AssertUnwindSafe(self.walk(&ctx, &update, &groups)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let trace = format!("{}\n{}", panic_message(&*payload), Backtrace::force_capture());
                let hook = self.on_panic.read().unwrap_or_else(PoisonError::into_inner).clone();
                match hook {
                    Some(hook) => hook(&ctx, &update, trace.as_str()),
                    None => tracing::error!("[layer] handler panicked: {trace}"),
                }
                Outcome::Panicked
            }
        }
    }

    async fn walk(&self, ctx: &Context, update: &Arc<Update>, groups: &[Vec<Arc<dyn Handler>>]) -> Outcome {
        'groups: for handlers in groups {
            for handler in handlers {
                let signal = match handler.check_update(ctx, update).await {
                    Ok(signal) => signal,
                    Err(e) => self.handler_error(ctx, update, &e),
                };
                match signal {
                    Signal::Continue         => {}
                    Signal::SkipCurrentGroup => continue 'groups,
                    Signal::EndGroups        => return Outcome::Ended,
                    Signal::StopClient       => {
                        tracing::info!("[layer] handler requested client stop");
                        ctx.stop_client();
                        return Outcome::Stopped;
                    }
                }
            }
        }
        Outcome::Completed
    }

    fn handler_error(&self, ctx: &Context, update: &Update, e: &HandlerError) -> Signal {
        let hook = self.on_error.read().unwrap_or_else(PoisonError::into_inner).clone();
        match hook {
            Some(hook) => hook(ctx, update, e),
            None => {
                tracing::warn!("[layer] handler error: {e}");
                Signal::Continue
            }
        }
    }

    // ── run loop ──────────────────────────────────────────────────────────

    /// Handle envelopes from `rx` one at a time until the channel closes or
    /// the client is stopped.
    pub async fn run(&self, mut rx: mpsc::Receiver<Envelope>) {
        let cancel = self.cancellation_token();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("[layer] client stopped; dispatcher exiting");
                    break;
                }
                envelope = rx.recv() => match envelope {
                    Some(envelope) => { self.handle(envelope).await; }
                    None => {
                        tracing::debug!("[layer] update channel closed; dispatcher exiting");
                        break;
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<(i32, usize)> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(g, h)| (*g, h.len()))
            .collect();
        f.debug_struct("Dispatcher").field("groups", &groups).field("config", &self.config).finish()
    }
}

/// Populate `msg.reply_to_message` up to `depth` levels. Failures end the
/// chain quietly.
async fn fill_reply_chain(ctx: &Context, msg: &mut Message, depth: usize) {
    let mut current = msg;
    for _ in 0..depth {
        let reply = match ctx.fetch_reply(current).await {
            Ok(Some(reply)) => reply,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("[layer] fetching reply of message {} failed: {e}", current.id());
                break;
            }
        };
        current.reply_to_message = Some(Box::new(reply));
        match current.reply_to_message.as_deref_mut() {
            Some(next) => current = next,
            None => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
