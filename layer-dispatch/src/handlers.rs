//! Built-in [`Handler`] implementations.
//!
//! Each wraps an async callback and decides whether an update applies.
//! Updates that do not apply yield [`Signal::Continue`] without calling the
//! callback, so the walk moves on to the next handler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::dispatcher::{Handler, HandlerResult, Signal};
use crate::filters::Filter;
use crate::raw::{CallbackQuery, InlineQuery};
use crate::update::{ChatJoinRequest, ChatMemberChange, Message, Update};

/// A boxed handler callback.
pub type Callback = Box<dyn Fn(Context, Arc<Update>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Box any `async` closure taking `(Context, Arc<Update>)`.
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |ctx, update| Box::pin(f(ctx, update)))
}

async fn call(cb: &Callback, ctx: &Context, update: &Arc<Update>) -> HandlerResult {
    cb(ctx.clone(), Arc::clone(update)).await
}

// ─── AnyUpdate ────────────────────────────────────────────────────────────────

/// Runs for every update.
pub struct AnyUpdate {
    cb: Callback,
}

impl AnyUpdate {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { cb: callback(f) }
    }
}

#[async_trait]
impl Handler for AnyUpdate {
    async fn check_update(&self, ctx: &Context, update: &Arc<Update>) -> HandlerResult {
        call(&self.cb, ctx, update).await
    }
}

// ─── MessageHandler ───────────────────────────────────────────────────────────

/// New and edited messages.
pub struct MessageHandler {
    cb:            Callback,
    filter:        Option<Filter<Message>>,
    update_filter: Option<Filter<Update>>,
    outgoing:      bool,
}

impl MessageHandler {
    /// Every message, outgoing included.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { cb: callback(f), filter: None, update_filter: None, outgoing: true }
    }

    /// Messages matching `filter`.
    pub fn with_filter<F, Fut>(filter: Filter<Message>, f: F) -> Self
    where
        F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { filter: Some(filter), ..Self::new(f) }
    }

    /// Additionally require `filter` on the whole update.
    pub fn update_filter(mut self, filter: Filter<Update>) -> Self {
        self.update_filter = Some(filter);
        self
    }

    /// Whether messages sent by the logged-in account are handled.
    pub fn outgoing(mut self, yes: bool) -> Self {
        self.outgoing = yes;
        self
    }
}

#[async_trait]
impl Handler for MessageHandler {
    async fn check_update(&self, ctx: &Context, update: &Arc<Update>) -> HandlerResult {
        let Some(msg) = update.effective_message() else {
            return Ok(Signal::Continue);
        };
        if !self.outgoing && msg.outgoing() {
            return Ok(Signal::Continue);
        }
        if self.filter.as_ref().is_some_and(|f| !f.matches(msg)) {
            return Ok(Signal::Continue);
        }
        if self.update_filter.as_ref().is_some_and(|f| !f.matches(update)) {
            return Ok(Signal::Continue);
        }
        call(&self.cb, ctx, update).await
    }
}

// ─── Command ──────────────────────────────────────────────────────────────────

/// `/name args…` style commands.
///
/// Matching is case-insensitive. A `name@username` form only matches when
/// `username` is the bound account's username.
pub struct Command {
    cb:            Callback,
    name:          String,
    prefixes:      Vec<char>,
    outgoing:      bool,
    update_filter: Option<Filter<Update>>,
}

impl Command {
    pub const DEFAULT_PREFIXES: [char; 2] = ['/', '!'];

    pub fn new<F, Fut>(name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            cb:            callback(f),
            name:          name.as_ref().to_lowercase(),
            prefixes:      Self::DEFAULT_PREFIXES.to_vec(),
            outgoing:      false,
            update_filter: None,
        }
    }

    /// Replace the accepted prefix characters.
    pub fn prefixes(mut self, prefixes: impl IntoIterator<Item = char>) -> Self {
        self.prefixes = prefixes.into_iter().collect();
        self
    }

    /// Also react to commands sent by the logged-in account.
    pub fn outgoing(mut self, yes: bool) -> Self {
        self.outgoing = yes;
        self
    }

    /// Only react in chats `filter` accepts.
    pub fn update_filter(mut self, filter: Filter<Update>) -> Self {
        self.update_filter = Some(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `text` invokes this command for the account `me`.
    pub fn matches(&self, text: &str, me: Option<&str>) -> bool {
        let Some(word) = text.split_whitespace().next() else {
            return false;
        };
        let mut chars = word.chars();
        if !chars.next().is_some_and(|c| self.prefixes.contains(&c)) {
            return false;
        }
        let (name, target) = match chars.as_str().split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (chars.as_str(), None),
        };
        if name.to_lowercase() != self.name {
            return false;
        }
        match target {
            None => true,
            Some(target) => me.is_some_and(|me| me.eq_ignore_ascii_case(target)),
        }
    }
}

#[async_trait]
impl Handler for Command {
    async fn check_update(&self, ctx: &Context, update: &Arc<Update>) -> HandlerResult {
        let Some(msg) = update.effective_message() else {
            return Ok(Signal::Continue);
        };
        if (msg.outgoing() && !self.outgoing) || msg.text.is_empty() {
            return Ok(Signal::Continue);
        }
        let me = ctx.me().and_then(|u| u.username.as_deref());
        if !self.matches(&msg.text, me) {
            return Ok(Signal::Continue);
        }
        if self.update_filter.as_ref().is_some_and(|f| !f.matches(update)) {
            return Ok(Signal::Continue);
        }
        tracing::debug!("[layer] command /{} matched message {}", self.name, msg.id());
        call(&self.cb, ctx, update).await
    }
}

// ─── Filtered handlers ────────────────────────────────────────────────────────

macro_rules! filtered_handler {
    ($(#[$meta:meta])* $name:ident, $item:ty, $accessor:ident) => {
        $(#[$meta])*
        pub struct $name {
            cb:     Callback,
            filter: Filter<$item>,
        }

        impl $name {
            pub fn new<F, Fut>(filter: Filter<$item>, f: F) -> Self
            where
                F: Fn(Context, Arc<Update>) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                Self { cb: callback(f), filter }
            }
        }

        #[async_trait]
        impl Handler for $name {
            async fn check_update(&self, ctx: &Context, update: &Arc<Update>) -> HandlerResult {
                match update.$accessor() {
                    Some(item) if self.filter.matches(item) => call(&self.cb, ctx, update).await,
                    _ => Ok(Signal::Continue),
                }
            }
        }
    };
}

filtered_handler!(
    /// Inline keyboard button presses.
    CallbackQueryHandler, CallbackQuery, callback_query
);
filtered_handler!(
    /// Inline queries typed to the bot.
    InlineQueryHandler, InlineQuery, inline_query
);
filtered_handler!(
    /// Pending join requests.
    ChatJoinRequestHandler, ChatJoinRequest, chat_join_request
);
filtered_handler!(
    /// Participant changes in groups and channels.
    ChatMemberUpdatedHandler, ChatMemberChange, chat_member
);

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Command {
        Command::new("Start", |_, _| async { Ok(Signal::Continue) })
    }

    #[test]
    fn command_parsing() {
        let c = noop();
        assert_eq!(c.name(), "start");
        assert!(c.matches("/start", None));
        assert!(c.matches("!START now", None));
        assert!(c.matches("/start@MyBot", Some("mybot")));
        assert!(!c.matches("/start@OtherBot", Some("mybot")));
        assert!(!c.matches("/start@MyBot", None));
        assert!(!c.matches("/starter", None));
        assert!(!c.matches("start", None));
        assert!(!c.matches("", None));
    }

    #[test]
    fn custom_prefixes() {
        let c = noop().prefixes(['.']);
        assert!(c.matches(".start", None));
        assert!(!c.matches("/start", None));
    }
}
