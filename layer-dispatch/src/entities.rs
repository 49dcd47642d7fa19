//! Per-envelope entity maps and the extraction step that fills them.
//!
//! Every envelope is classified once:
//!
//! - bundles (`Updates`, `Combined`) carry users and chats inline; they are
//!   mapped and handed to the peer store
//! - short forms (`Short`, `ShortMessage`, `ShortChatMessage`) carry none;
//!   the two short message forms are expanded into a full `NewMessage`
//! - `TooLong` and `ShortSentMessage` are not dispatched
//!
//! A new message that references a user or chat the envelope did not carry
//! triggers one bounded `getDifference` call to recover them.

use std::collections::HashMap;
use std::time::Duration;

use layer_storage::{DEFAULT_ACCESS_HASH, PeerStorage, PeerType};

use crate::raw::{
    Channel, Chat, Envelope, Message, RawChat, RawMessage, RawPeer, RawUpdate, RawUser, ShortChatMessage,
    ShortMessage, User,
};
use crate::upstream::{DifferenceRequest, Upstream};

// ─── Entities ─────────────────────────────────────────────────────────────────

/// Users, basic groups and channels mentioned by one envelope.
#[derive(Clone, Debug, Default)]
pub struct Entities {
    /// The envelope was a short form and carried no entities.
    pub short:    bool,
    pub users:    HashMap<i64, User>,
    pub chats:    HashMap<i64, Chat>,
    pub channels: HashMap<i64, Channel>,
}

impl Entities {
    pub(crate) fn short() -> Self {
        Self { short: true, ..Default::default() }
    }

    fn from_lists(users: &[RawUser], chats: &[RawChat]) -> Self {
        let mut e = Self::default();
        e.merge(users, chats);
        e
    }

    /// Add non-empty users, chats and channels, replacing older copies.
    pub(crate) fn merge(&mut self, users: &[RawUser], chats: &[RawChat]) {
        for u in users.iter().filter_map(RawUser::as_user) {
            self.users.insert(u.id, u.clone());
        }
        for c in chats {
            match c {
                RawChat::Chat(chat)       => { self.chats.insert(chat.id, chat.clone()); }
                RawChat::Channel(channel) => { self.channels.insert(channel.id, channel.clone()); }
                _ => {}
            }
        }
    }

    /// Whether `peer` can be resolved from this envelope alone.
    pub fn contains(&self, peer: &RawPeer) -> bool {
        match *peer {
            RawPeer::User(id)    => self.users.contains_key(&id),
            RawPeer::Chat(id)    => self.chats.contains_key(&id),
            RawPeer::Channel(id) => self.channels.contains_key(&id),
        }
    }

    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn chat(&self, id: i64) -> Option<&Chat> {
        self.chats.get(&id)
    }

    pub fn channel(&self, id: i64) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.chats.is_empty() && self.channels.is_empty()
    }
}

// ─── Peer persistence ─────────────────────────────────────────────────────────

/// Hand every addressable entity to the peer store.
///
/// Users and channels without an access hash ("min" constructors) are
/// skipped so they cannot clobber a stored hash.
pub(crate) fn save_peers(peers: &PeerStorage, users: &[RawUser], chats: &[RawChat]) {
    for u in users.iter().filter_map(RawUser::as_user) {
        if let Some(hash) = u.access_hash {
            peers.add_peer(u.id, hash, PeerType::User, u.username.as_deref().unwrap_or_default());
        }
    }
    for c in chats {
        match c {
            RawChat::Chat(chat) => {
                peers.add_peer(chat.id, DEFAULT_ACCESS_HASH, PeerType::Chat, "");
            }
            RawChat::Forbidden { id, .. } => {
                peers.add_peer(*id, DEFAULT_ACCESS_HASH, PeerType::Chat, "");
            }
            RawChat::Channel(channel) => {
                if let Some(hash) = channel.access_hash {
                    peers.add_peer(channel.id, hash, PeerType::Channel, channel.username.as_deref().unwrap_or_default());
                }
            }
            RawChat::ChannelForbidden { id, access_hash, .. } => {
                peers.add_peer(*id, *access_hash, PeerType::Channel, "");
            }
            RawChat::Empty { .. } => {}
        }
    }
}

// ─── Extraction ───────────────────────────────────────────────────────────────

/// Output of [`extract`]: the inner updates and the entities they share.
pub(crate) struct Extracted {
    pub(crate) entities: Entities,
    pub(crate) updates:  Vec<RawUpdate>,
}

/// Classify `envelope`, build its entity map and persist what it carries.
///
/// Returns `None` for envelopes that are not dispatched.
pub(crate) async fn extract(
    envelope:  Envelope,
    peers:     &PeerStorage,
    upstream:  Option<&dyn Upstream>,
    timeout:   Duration,
) -> Option<Extracted> {
    let (mut entities, updates) = match envelope {
        Envelope::Updates(b) | Envelope::Combined(b) => {
            save_peers(peers, &b.users, &b.chats);
            (Entities::from_lists(&b.users, &b.chats), b.updates)
        }
        Envelope::Short { update, .. }  => (Entities::short(), vec![update]),
        Envelope::ShortMessage(m)       => (Entities::short(), vec![expand_short_message(m)]),
        Envelope::ShortChatMessage(m)   => (Entities::short(), vec![expand_short_chat_message(m)]),
        Envelope::TooLong => {
            tracing::warn!("[layer] updatesTooLong received; some updates may be missed until the next getDifference");
            return None;
        }
        Envelope::ShortSentMessage { id, .. } => {
            tracing::debug!("[layer] ignoring updateShortSentMessage for message {id}");
            return None;
        }
    };

    if let Some(client) = upstream {
        for update in &updates {
            if let RawUpdate::NewMessage { message, pts, .. } = update {
                if *pts > 0 && references_missing(&entities, message) {
                    recover_entities(client, peers, &mut entities, *pts, timeout).await;
                }
            }
        }
    }

    Some(Extracted { entities, updates })
}

fn references_missing(entities: &Entities, message: &RawMessage) -> bool {
    message
        .from_id()
        .into_iter()
        .chain(message.peer_id())
        .any(|p| !entities.contains(&p))
}

/// Best-effort `getDifference(pts - 1)`; every failure is ignored.
async fn recover_entities(
    client:   &dyn Upstream,
    peers:    &PeerStorage,
    entities: &mut Entities,
    pts:      i32,
    timeout:  Duration,
) {
    let req = DifferenceRequest {
        pts:  pts - 1,
        date: chrono::Utc::now().timestamp() as i32,
        qts:  0,
    };
    let diff = match tokio::time::timeout(timeout, client.get_difference(req)).await {
        Ok(Ok(diff)) => diff,
        Ok(Err(e)) => {
            tracing::debug!("[layer] getDifference for missing entities failed: {e}");
            return;
        }
        Err(_) => {
            tracing::debug!("[layer] getDifference for missing entities timed out after {timeout:?}");
            return;
        }
    };
    if let Some((users, chats)) = diff.entities() {
        tracing::debug!("[layer] getDifference recovered {} users, {} chats", users.len(), chats.len());
        entities.merge(users, chats);
        save_peers(peers, users, chats);
    }
}

// ─── Short message helpers ────────────────────────────────────────────────────

fn expand_short_message(m: ShortMessage) -> RawUpdate {
    let msg = Message {
        id:         m.id,
        out:        m.out,
        mentioned:  m.mentioned,
        silent:     m.silent,
        post:       false,
        // Outgoing short messages are sent by us to `user_id`; the sender is
        // resolved from the bound self user later.
        from_id:    if m.out { None } else { Some(RawPeer::User(m.user_id)) },
        peer_id:    RawPeer::User(m.user_id),
        reply_to:   m.reply_to,
        via_bot_id: m.via_bot_id,
        date:       m.date,
        message:    m.message,
        media:      None,
        edit_date:  None,
    };
    RawUpdate::NewMessage { message: RawMessage::Message(msg), pts: m.pts, pts_count: m.pts_count }
}

fn expand_short_chat_message(m: ShortChatMessage) -> RawUpdate {
    let msg = Message {
        id:         m.id,
        out:        m.out,
        mentioned:  m.mentioned,
        silent:     m.silent,
        post:       false,
        from_id:    Some(RawPeer::User(m.from_id)),
        peer_id:    RawPeer::Chat(m.chat_id),
        reply_to:   m.reply_to,
        via_bot_id: m.via_bot_id,
        date:       m.date,
        message:    m.message,
        media:      None,
        edit_date:  None,
    };
    RawUpdate::NewMessage { message: RawMessage::Message(msg), pts: m.pts, pts_count: m.pts_count }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, hash: Option<i64>, username: Option<&str>) -> RawUser {
        RawUser::User(User { id, access_hash: hash, username: username.map(str::to_string), ..Default::default() })
    }

    #[test]
    fn min_users_are_mapped_but_not_persisted() {
        let peers = PeerStorage::in_memory();
        let users = [user(1, Some(10), Some("a")), user(2, None, None), RawUser::Empty { id: 3 }];
        let chats = [
            RawChat::Chat(Chat { id: 4, ..Default::default() }),
            RawChat::Channel(Channel { id: 5, access_hash: Some(50), ..Default::default() }),
            RawChat::ChannelForbidden { id: 6, access_hash: 60, title: String::new(), megagroup: false },
        ];
        save_peers(&peers, &users, &chats);
        let e = Entities::from_lists(&users, &chats);

        assert_eq!(e.users.len(), 2);
        assert!(e.contains(&RawPeer::Chat(4)));
        assert!(e.contains(&RawPeer::Channel(5)));
        assert!(!e.contains(&RawPeer::Channel(6)));

        assert_eq!(peers.get_peer_by_id(1).access_hash, 10);
        assert!(peers.get_peer_by_id(2).is_empty());
        assert_eq!(peers.get_peer_by_id(4).peer_type, PeerType::Chat);
        assert_eq!(peers.get_peer_by_id(6).access_hash, 60);
    }

    #[test]
    fn short_dm_expands_to_new_message() {
        let update = expand_short_message(ShortMessage {
            id: 7, user_id: 42, message: "hi".into(), pts: 3, pts_count: 1, ..Default::default()
        });
        let RawUpdate::NewMessage { message: RawMessage::Message(m), pts, .. } = update else {
            panic!("expected NewMessage");
        };
        assert_eq!(pts, 3);
        assert_eq!(m.peer_id, RawPeer::User(42));
        assert_eq!(m.from_id, Some(RawPeer::User(42)));
        assert_eq!(m.message, "hi");
    }

    #[test]
    fn short_chat_message_keeps_sender_and_chat() {
        let update = expand_short_chat_message(ShortChatMessage {
            id: 1, from_id: 9, chat_id: 100, ..Default::default()
        });
        let msg = update.message().unwrap();
        assert_eq!(msg.from_id(), Some(RawPeer::User(9)));
        assert_eq!(msg.peer_id(), Some(RawPeer::Chat(100)));
    }
}
