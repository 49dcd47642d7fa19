//! Typed updates handed to handlers.
//!
//! Every inner update of an envelope is classified exactly once into an
//! [`UpdateKind`]. The raw update and the envelope's [`Entities`] travel
//! with it, together with the id of the user who caused it.

use std::sync::Arc;

use crate::entities::Entities;
use crate::raw::{
    CallbackQuery, Channel, ChannelParticipant, Chat, ChatParticipant, InlineQuery, Media,
    MessageAction, RawMessage, RawPeer, RawUpdate, ReplyHeader, User,
};

// ─── Message ──────────────────────────────────────────────────────────────────

/// A new or edited message, regular or service.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The underlying message object.
    pub raw:              RawMessage,
    /// Text (or caption); empty for service and empty messages.
    pub text:             String,
    pub is_service:       bool,
    /// Present on service messages.
    pub action:           Option<MessageAction>,
    /// The message this one replies to, when it was fetched.
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    pub fn from_raw(raw: RawMessage) -> Self {
        let (text, is_service, action) = match &raw {
            RawMessage::Message(m) => (m.message.clone(), false, None),
            RawMessage::Service(m) => (String::new(), true, Some(m.action.clone())),
            RawMessage::Empty { .. } => (String::new(), false, None),
        };
        Self { raw, text, is_service, action, reply_to_message: None }
    }

    /// Unique message ID within the chat.
    pub fn id(&self) -> i32 {
        self.raw.id()
    }

    /// The chat this message was sent in.
    pub fn peer_id(&self) -> Option<RawPeer> {
        self.raw.peer_id()
    }

    /// The sender, if available (not set for channel posts).
    pub fn from_id(&self) -> Option<RawPeer> {
        self.raw.from_id()
    }

    /// Bare id of the chat, 0 if unknown.
    pub fn chat_id(&self) -> i64 {
        self.peer_id().map_or(0, |p| p.id())
    }

    /// `true` if the message was sent by the logged-in account.
    pub fn outgoing(&self) -> bool {
        self.raw.out()
    }

    pub fn date(&self) -> i32 {
        match &self.raw {
            RawMessage::Message(m)   => m.date,
            RawMessage::Service(m)   => m.date,
            RawMessage::Empty { .. } => 0,
        }
    }

    pub fn media(&self) -> Option<&Media> {
        match &self.raw {
            RawMessage::Message(m) => m.media.as_ref(),
            _ => None,
        }
    }

    pub fn edit_date(&self) -> Option<i32> {
        match &self.raw {
            RawMessage::Message(m) => m.edit_date,
            _ => None,
        }
    }

    pub fn reply_to(&self) -> Option<&ReplyHeader> {
        match &self.raw {
            RawMessage::Message(m) => m.reply_to.as_ref(),
            RawMessage::Service(m) => m.reply_to.as_ref(),
            RawMessage::Empty { .. } => None,
        }
    }

    /// Id of the replied-to message, if this is a reply to a message.
    pub fn reply_to_msg_id(&self) -> Option<i32> {
        self.reply_to().map(|r| r.reply_to_msg_id).filter(|&id| id != 0)
    }
}

// ─── Join requests and membership ─────────────────────────────────────────────

/// Pending requests to join a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatJoinRequest {
    pub peer:              RawPeer,
    pub requests_pending:  i32,
    /// Most recent first.
    pub recent_requesters: Vec<i64>,
    /// The requester's note, when delivered to a bot.
    pub about:             Option<String>,
}

/// A participant of a basic group or a channel changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatMemberChange {
    Chat(ChatParticipant),
    Channel(ChannelParticipant),
}

impl ChatMemberChange {
    pub fn user_id(&self) -> i64 {
        match self {
            Self::Chat(p)    => p.user_id,
            Self::Channel(p) => p.user_id,
        }
    }

    pub fn actor_id(&self) -> i64 {
        match self {
            Self::Chat(p)    => p.actor_id,
            Self::Channel(p) => p.actor_id,
        }
    }

    /// Id of the group or channel.
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Chat(p)    => p.chat_id,
            Self::Channel(p) => p.channel_id,
        }
    }

    fn peer(&self) -> RawPeer {
        match self {
            Self::Chat(p)    => RawPeer::Chat(p.chat_id),
            Self::Channel(p) => RawPeer::Channel(p.channel_id),
        }
    }
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// What an update is about.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateKind {
    /// A new or edited message.
    Message(Message),
    /// An inline keyboard button was pressed.
    CallbackQuery(CallbackQuery),
    /// A user typed an inline query for the bot.
    InlineQuery(InlineQuery),
    ChatJoinRequest(ChatJoinRequest),
    ChatMemberChange(ChatMemberChange),
    /// Anything else; the raw update is still available.
    None,
}

/// The chat an update happened in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectiveChat<'a> {
    Channel(&'a Channel),
    Chat(&'a Chat),
    User(&'a User),
    Empty,
}

impl EffectiveChat<'_> {
    /// Bare id, 0 for [`EffectiveChat::Empty`].
    pub fn id(&self) -> i64 {
        match self {
            Self::Channel(c) => c.id,
            Self::Chat(c)    => c.id,
            Self::User(u)    => u.id,
            Self::Empty      => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// One normalized update.
#[derive(Clone, Debug)]
pub struct Update {
    pub kind:     UpdateKind,
    /// The update as it arrived.
    pub raw:      RawUpdate,
    pub entities: Arc<Entities>,
    user_id:      i64,
}

impl Update {
    /// Classify `raw` and resolve the acting user.
    ///
    /// `self_id` is the logged-in account, used for outgoing private
    /// messages that carry no sender.
    pub fn new(raw: RawUpdate, entities: Arc<Entities>, self_id: i64) -> Self {
        let kind = match &raw {
            RawUpdate::NewMessage { message, .. }
            | RawUpdate::NewChannelMessage { message, .. }
            | RawUpdate::EditMessage { message, .. }
            | RawUpdate::EditChannelMessage { message, .. } => UpdateKind::Message(Message::from_raw(message.clone())),
            RawUpdate::BotCallbackQuery(q) | RawUpdate::InlineBotCallbackQuery(q) => {
                UpdateKind::CallbackQuery(q.clone())
            }
            RawUpdate::BotInlineQuery(q) => UpdateKind::InlineQuery(q.clone()),
            RawUpdate::PendingJoinRequests { peer, requests_pending, recent_requesters } => {
                UpdateKind::ChatJoinRequest(ChatJoinRequest {
                    peer:              *peer,
                    requests_pending:  *requests_pending,
                    recent_requesters: recent_requesters.clone(),
                    about:             None,
                })
            }
            RawUpdate::BotChatInviteRequester { peer, user_id, about, .. } => {
                UpdateKind::ChatJoinRequest(ChatJoinRequest {
                    peer:              *peer,
                    requests_pending:  1,
                    recent_requesters: vec![*user_id],
                    about:             Some(about.clone()).filter(|a| !a.is_empty()),
                })
            }
            RawUpdate::ChatParticipant(p)    => UpdateKind::ChatMemberChange(ChatMemberChange::Chat(p.clone())),
            RawUpdate::ChannelParticipant(p) => UpdateKind::ChatMemberChange(ChatMemberChange::Channel(p.clone())),
            RawUpdate::Other { .. } => UpdateKind::None,
        };
        let user_id = acting_user(&kind, self_id);
        Self { kind, raw, entities, user_id }
    }

    /// Id of the user responsible for the update, 0 if unknown.
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn effective_message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn effective_message_mut(&mut self) -> Option<&mut Message> {
        match &mut self.kind {
            UpdateKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.kind {
            UpdateKind::CallbackQuery(q) => Some(q),
            _ => None,
        }
    }

    pub fn inline_query(&self) -> Option<&InlineQuery> {
        match &self.kind {
            UpdateKind::InlineQuery(q) => Some(q),
            _ => None,
        }
    }

    pub fn chat_join_request(&self) -> Option<&ChatJoinRequest> {
        match &self.kind {
            UpdateKind::ChatJoinRequest(r) => Some(r),
            _ => None,
        }
    }

    pub fn chat_member(&self) -> Option<&ChatMemberChange> {
        match &self.kind {
            UpdateKind::ChatMemberChange(c) => Some(c),
            _ => None,
        }
    }

    /// `true` for `EditMessage` / `EditChannelMessage`.
    pub fn is_edit(&self) -> bool {
        matches!(self.raw, RawUpdate::EditMessage { .. } | RawUpdate::EditChannelMessage { .. })
    }

    /// Whitespace-separated words of the message text, callback data or
    /// inline query. Empty for everything else.
    pub fn args(&self) -> Vec<String> {
        let text: std::borrow::Cow<'_, str> = match &self.kind {
            UpdateKind::Message(m)       => m.text.as_str().into(),
            UpdateKind::CallbackQuery(q) => String::from_utf8_lossy(q.data.as_deref().unwrap_or_default()),
            UpdateKind::InlineQuery(q)   => q.query.as_str().into(),
            _ => return Vec::new(),
        };
        text.split_whitespace().map(str::to_string).collect()
    }

    /// The user responsible for the update, if the envelope carried them.
    pub fn effective_user(&self) -> Option<&User> {
        if self.user_id == 0 {
            return None;
        }
        self.entities.user(self.user_id)
    }

    /// The chat the update happened in.
    pub(crate) fn peer(&self) -> Option<RawPeer> {
        match &self.kind {
            UpdateKind::Message(m)          => m.peer_id(),
            UpdateKind::CallbackQuery(q)    => q.peer,
            UpdateKind::ChatJoinRequest(r)  => Some(r.peer),
            UpdateKind::ChatMemberChange(c) => Some(c.peer()),
            UpdateKind::InlineQuery(_) | UpdateKind::None => None,
        }
    }

    /// The basic group the update happened in.
    pub fn get_chat(&self) -> Option<&Chat> {
        match self.peer()? {
            RawPeer::Chat(id) => self.entities.chat(id),
            _ => None,
        }
    }

    /// The channel or supergroup the update happened in.
    pub fn get_channel(&self) -> Option<&Channel> {
        match self.peer()? {
            RawPeer::Channel(id) => self.entities.channel(id),
            _ => None,
        }
    }

    /// The other side of a private chat.
    pub fn get_user_chat(&self) -> Option<&User> {
        match self.peer()? {
            RawPeer::User(id) => self.entities.user(id),
            _ => None,
        }
    }

    /// Channel, then basic group, then private chat.
    pub fn effective_chat(&self) -> EffectiveChat<'_> {
        if let Some(c) = self.get_channel() {
            EffectiveChat::Channel(c)
        } else if let Some(c) = self.get_chat() {
            EffectiveChat::Chat(c)
        } else if let Some(u) = self.get_user_chat() {
            EffectiveChat::User(u)
        } else {
            EffectiveChat::Empty
        }
    }
}

fn acting_user(kind: &UpdateKind, self_id: i64) -> i64 {
    match kind {
        UpdateKind::Message(m) => match (m.from_id(), m.peer_id()) {
            (Some(RawPeer::User(id)), _) => id,
            (None, Some(RawPeer::User(id))) => {
                if m.outgoing() { self_id } else { id }
            }
            _ => 0,
        },
        UpdateKind::CallbackQuery(q)    => q.user_id,
        UpdateKind::InlineQuery(q)      => q.user_id,
        UpdateKind::ChatJoinRequest(r)  => r.recent_requesters.first().copied().unwrap_or(0),
        UpdateKind::ChatMemberChange(c) => c.user_id(),
        UpdateKind::None => 0,
    }
}

/// A plain text message with every optional field unset.
#[cfg(test)]
pub(crate) fn text_message(id: i32, peer: RawPeer, from: Option<RawPeer>, text: &str) -> crate::raw::Message {
    crate::raw::Message {
        id,
        out:        false,
        mentioned:  false,
        silent:     false,
        post:       false,
        from_id:    from,
        peer_id:    peer,
        reply_to:   None,
        via_bot_id: None,
        date:       0,
        message:    text.to_string(),
        media:      None,
        edit_date:  None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(m: crate::raw::Message) -> RawUpdate {
        RawUpdate::NewMessage { message: RawMessage::Message(m), pts: 1, pts_count: 1 }
    }

    #[test]
    fn sender_is_acting_user() {
        let raw = new_message(text_message(1, RawPeer::Chat(5), Some(RawPeer::User(9)), "hi there"));
        let u = Update::new(raw, Arc::default(), 0);
        assert_eq!(u.user_id(), 9);
        assert_eq!(u.args(), ["hi", "there"]);
    }

    #[test]
    fn private_chat_without_sender() {
        let mut m = text_message(1, RawPeer::User(9), None, "");
        assert_eq!(Update::new(new_message(m.clone()), Arc::default(), 77).user_id(), 9);
        m.out = true;
        assert_eq!(Update::new(new_message(m), Arc::default(), 77).user_id(), 77);
    }

    #[test]
    fn channel_post_has_no_acting_user() {
        let raw = new_message(text_message(1, RawPeer::Channel(3), Some(RawPeer::Channel(3)), "post"));
        assert_eq!(Update::new(raw, Arc::default(), 1).user_id(), 0);
    }

    #[test]
    fn effective_chat_prefers_entities() {
        let mut e = Entities::default();
        e.channels.insert(3, Channel { id: 3, megagroup: true, ..Default::default() });
        e.users.insert(9, User { id: 9, ..Default::default() });
        let raw = new_message(text_message(1, RawPeer::Channel(3), Some(RawPeer::User(9)), ""));
        let u = Update::new(raw, Arc::new(e), 0);
        assert!(matches!(u.effective_chat(), EffectiveChat::Channel(c) if c.megagroup));
        assert_eq!(u.effective_user().map(|u| u.id), Some(9));
        assert!(u.get_chat().is_none());
    }

    #[test]
    fn join_request_uses_most_recent_requester() {
        let raw = RawUpdate::PendingJoinRequests {
            peer:              RawPeer::Channel(4),
            requests_pending:  2,
            recent_requesters: vec![11, 12],
        };
        let u = Update::new(raw, Arc::default(), 0);
        assert_eq!(u.user_id(), 11);
        assert!(u.args().is_empty());
    }

    #[test]
    fn unknown_update_is_none() {
        let u = Update::new(RawUpdate::Other { constructor_id: 0x1bfbd823 }, Arc::default(), 0);
        assert_eq!(u.kind, UpdateKind::None);
        assert_eq!(u.effective_chat(), EffectiveChat::Empty);
    }
}
