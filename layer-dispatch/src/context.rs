//! Per-update context handed to handlers.

use std::sync::Arc;
use std::time::Duration;

use layer_storage::{InputPeer, PeerStorage, StorageError};
use tokio_util::sync::CancellationToken;

use crate::entities::Entities;
use crate::errors::InvocationError;
use crate::raw::{RawMessage, RawPeer, User};
use crate::update::Message;
use crate::upstream::Upstream;

/// Everything a handler may need besides the update itself.
///
/// Cheap to clone; callbacks receive their own copy.
#[derive(Clone)]
pub struct Context {
    client:        Option<Arc<dyn Upstream>>,
    peers:         PeerStorage,
    me:            Option<Arc<User>>,
    entities:      Arc<Entities>,
    cancel:        CancellationToken,
    fetch_timeout: Duration,
}

impl Context {
    pub(crate) fn new(
        client:        Option<Arc<dyn Upstream>>,
        peers:         PeerStorage,
        me:            Option<Arc<User>>,
        entities:      Arc<Entities>,
        cancel:        CancellationToken,
        fetch_timeout: Duration,
    ) -> Self {
        Self { client, peers, me, entities, cancel, fetch_timeout }
    }

    /// The bound client, if [`crate::Dispatcher::initialize`] was called.
    pub fn client(&self) -> Option<&Arc<dyn Upstream>> {
        self.client.as_ref()
    }

    pub fn peers(&self) -> &PeerStorage {
        &self.peers
    }

    /// The logged-in account.
    pub fn me(&self) -> Option<&User> {
        self.me.as_deref()
    }

    /// Entities of the envelope the current update came in.
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Stop the owning client. The run loop exits after the current envelope.
    pub fn stop_client(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Addressing for `id`: the peer store first, then the current entities.
    pub fn resolve_input_peer(&self, id: i64) -> InputPeer {
        let stored = self.peers.get_input_peer_by_id(id);
        if !stored.is_empty() {
            return stored;
        }
        if let Some(hash) = self.entities.user(id).and_then(|u| u.access_hash) {
            return InputPeer::User { user_id: id, access_hash: hash };
        }
        if self.entities.chat(id).is_some() {
            return InputPeer::Chat { chat_id: id };
        }
        if let Some(hash) = self.entities.channel(id).and_then(|c| c.access_hash) {
            return InputPeer::Channel { channel_id: id, access_hash: hash };
        }
        InputPeer::Empty
    }

    /// Fetch the message `msg` replies to.
    ///
    /// `Ok(None)` when `msg` is not a reply or the target no longer exists.
    pub async fn fetch_reply(&self, msg: &Message) -> Result<Option<Message>, InvocationError> {
        let Some(reply_id) = msg.reply_to_msg_id() else {
            return Ok(None);
        };
        let peer: Option<RawPeer> = msg
            .reply_to()
            .and_then(|r| r.reply_to_peer_id)
            .or_else(|| msg.peer_id());
        let Some(peer) = peer else {
            return Ok(None);
        };
        let client = self.client.as_ref().ok_or(InvocationError::NotBound)?;

        let input = self.resolve_input_peer(peer.id());
        if input.is_empty() {
            return Err(InvocationError::PeerNotFound(peer.id()));
        }

        let messages = tokio::time::timeout(self.fetch_timeout, client.get_messages(input, &[reply_id])).await??;
        Ok(messages.into_iter().next().and_then(|m| match m {
            RawMessage::Empty { .. } => None,
            m => Some(Message::from_raw(m)),
        }))
    }

    /// Export the session stored under `phone` as a portable string.
    pub fn export_session_string(&self, phone: &str) -> Result<String, StorageError> {
        self.peers.get_session(phone)?.encode_string()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bound", &self.client.is_some())
            .field("me", &self.me.as_ref().map(|u| u.id))
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
