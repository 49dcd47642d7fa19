//! # layer-dispatch
//!
//! Update dispatch engine for Telegram clients.
//!
//! ## Features
//! - Entity extraction: users, groups and channels carried by every update
//!   envelope are mapped per envelope and saved to the [`PeerStorage`]
//! - Missing-entity recovery through one bounded `getDifference` call
//! - Typed updates: messages, callback and inline queries, join requests,
//!   participant changes; acting user and effective chat resolved once
//! - Ordered handler groups with explicit control signals
//!   ([`Signal::Continue`], [`Signal::EndGroups`], [`Signal::SkipCurrentGroup`],
//!   [`Signal::StopClient`])
//! - Handler errors routed to an error callback, panics caught and reported
//! - Built-in handlers (commands, messages, callback queries, …) and
//!   composable [`filters`]
//! - Optional reply-chain fetching before handlers run
//!
//! The dispatcher does not own a connection. The client feeds it decoded
//! [`raw::Envelope`]s and implements [`Upstream`] for the few calls the
//! dispatcher makes on its own.

#![deny(unsafe_code)]

mod context;
mod dispatcher;
mod entities;
mod errors;
pub mod filters;
pub mod handlers;
pub mod raw;
pub mod update;
pub mod upstream;

pub use context::Context;
pub use dispatcher::{
    Dispatcher, DispatcherConfig, ErrorHandler, Handler, HandlerError, HandlerResult, Outcome, PanicHandler, Signal,
};
pub use entities::Entities;
pub use errors::{InvocationError, RpcError};
pub use update::{ChatJoinRequest, ChatMemberChange, EffectiveChat, Message, Update, UpdateKind};
pub use upstream::{Difference, DifferenceData, DifferenceRequest, Upstream, UpdatesState};

pub use layer_storage::{InputPeer, Peer, PeerStorage, PeerType, Session, StorageConfig, StorageError};
