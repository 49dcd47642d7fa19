//! Raw update model handed over by the protocol client.
//!
//! These mirror the MTProto constructors the dispatcher cares about, already
//! decoded. Everything else arrives as [`RawUpdate::Other`] with its
//! constructor id so nothing is silently lost.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ─── Peers ────────────────────────────────────────────────────────────────────

/// Reference to a user, basic group or channel by bare id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawPeer {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl RawPeer {
    pub fn id(&self) -> i64 {
        match *self {
            Self::User(id) | Self::Chat(id) | Self::Channel(id) => id,
        }
    }
}

// ─── Users ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct User {
    pub id:          i64,
    /// Absent on "min" constructors, which must not overwrite a known hash.
    pub access_hash: Option<i64>,
    pub first_name:  Option<String>,
    pub last_name:   Option<String>,
    pub username:    Option<String>,
    pub bot:         bool,
    /// The logged-in account itself.
    pub is_self:     bool,
}

impl User {
    /// First and last name joined by a space.
    pub fn full_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None)    => f.to_string(),
            (None, Some(l))    => l.to_string(),
            (None, None)       => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawUser {
    Empty { id: i64 },
    User(User),
}

impl RawUser {
    pub fn id(&self) -> i64 {
        match self {
            Self::Empty { id } => *id,
            Self::User(u)      => u.id,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            Self::Empty { .. } => None,
        }
    }
}

// ─── Chats ────────────────────────────────────────────────────────────────────

/// A basic group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chat {
    pub id:                 i64,
    pub title:              String,
    pub participants_count: i32,
}

/// A broadcast channel or a supergroup (`megagroup`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Channel {
    pub id:          i64,
    pub access_hash: Option<i64>,
    pub title:       String,
    pub username:    Option<String>,
    pub megagroup:   bool,
    pub broadcast:   bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawChat {
    Empty { id: i64 },
    Chat(Chat),
    Forbidden { id: i64, title: String },
    Channel(Channel),
    ChannelForbidden { id: i64, access_hash: i64, title: String, megagroup: bool },
}

impl RawChat {
    pub fn id(&self) -> i64 {
        match self {
            Self::Empty { id } | Self::Forbidden { id, .. } | Self::ChannelForbidden { id, .. } => *id,
            Self::Chat(c)    => c.id,
            Self::Channel(c) => c.id,
        }
    }
}

// ─── Media ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DocumentAttribute {
    Video { duration: i32, w: i32, h: i32, round_message: bool },
    Animated,
    Sticker { alt: String },
    Audio { duration: i32, voice: bool, title: Option<String>, performer: Option<String> },
    Filename(String),
    ImageSize { w: i32, h: i32 },
    Other { constructor_id: u32 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Document {
    pub id:         i64,
    pub mime_type:  String,
    pub size:       i64,
    pub attributes: Vec<DocumentAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Media {
    Photo { id: i64 },
    /// `None` when the document was deleted or is unavailable.
    Document(Option<Document>),
    Other { constructor_id: u32 },
}

impl Media {
    pub fn document(&self) -> Option<&Document> {
        match self {
            Self::Document(d) => d.as_ref(),
            _ => None,
        }
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplyHeader {
    /// 0 when the reply targets a story rather than a message.
    pub reply_to_msg_id:  i32,
    /// Set when the replied-to message lives in another chat.
    pub reply_to_peer_id: Option<RawPeer>,
    pub reply_to_top_id:  Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
    pub id:         i32,
    pub out:        bool,
    pub mentioned:  bool,
    pub silent:     bool,
    pub post:       bool,
    pub from_id:    Option<RawPeer>,
    pub peer_id:    RawPeer,
    pub reply_to:   Option<ReplyHeader>,
    pub via_bot_id: Option<i64>,
    pub date:       i32,
    pub message:    String,
    pub media:      Option<Media>,
    pub edit_date:  Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MessageAction {
    ChatCreate { title: String, users: Vec<i64> },
    ChatEditTitle { title: String },
    ChatAddUser { users: Vec<i64> },
    ChatDeleteUser { user_id: i64 },
    ChatJoinedByLink { inviter_id: i64 },
    ChatJoinedByRequest,
    PinMessage,
    Other { constructor_id: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageService {
    pub id:       i32,
    pub out:      bool,
    pub post:     bool,
    pub from_id:  Option<RawPeer>,
    pub peer_id:  RawPeer,
    pub reply_to: Option<ReplyHeader>,
    pub date:     i32,
    pub action:   MessageAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawMessage {
    Empty { id: i32, peer_id: Option<RawPeer> },
    Message(Message),
    Service(MessageService),
}

impl RawMessage {
    pub fn id(&self) -> i32 {
        match self {
            Self::Empty { id, .. } => *id,
            Self::Message(m)       => m.id,
            Self::Service(m)       => m.id,
        }
    }

    pub fn peer_id(&self) -> Option<RawPeer> {
        match self {
            Self::Empty { peer_id, .. } => *peer_id,
            Self::Message(m)            => Some(m.peer_id),
            Self::Service(m)            => Some(m.peer_id),
        }
    }

    pub fn from_id(&self) -> Option<RawPeer> {
        match self {
            Self::Empty { .. } => None,
            Self::Message(m)   => m.from_id,
            Self::Service(m)   => m.from_id,
        }
    }

    pub fn out(&self) -> bool {
        match self {
            Self::Empty { .. } => false,
            Self::Message(m)   => m.out,
            Self::Service(m)   => m.out,
        }
    }
}

// ─── Updates ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CallbackQuery {
    pub query_id:        i64,
    pub user_id:         i64,
    /// Chat of the message carrying the button; `None` for inline messages.
    pub peer:            Option<RawPeer>,
    pub msg_id:          Option<i32>,
    pub chat_instance:   i64,
    pub data:            Option<Vec<u8>>,
    pub game_short_name: Option<String>,
}

impl CallbackQuery {
    /// Button data as UTF-8, if valid.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_deref().and_then(|d| std::str::from_utf8(d).ok())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InlineQuery {
    pub query_id: i64,
    pub user_id:  i64,
    pub query:    String,
    pub offset:   String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParticipantRole {
    Member,
    Admin,
    Creator,
    Banned,
    Left,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChatParticipant {
    pub chat_id:  i64,
    pub date:     i32,
    pub actor_id: i64,
    pub user_id:  i64,
    pub prev:     Option<ParticipantRole>,
    pub new:      Option<ParticipantRole>,
    pub qts:      i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelParticipant {
    pub channel_id: i64,
    pub date:       i32,
    pub actor_id:   i64,
    pub user_id:    i64,
    pub prev:       Option<ParticipantRole>,
    pub new:        Option<ParticipantRole>,
    pub qts:        i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawUpdate {
    NewMessage { message: RawMessage, pts: i32, pts_count: i32 },
    NewChannelMessage { message: RawMessage, pts: i32, pts_count: i32 },
    EditMessage { message: RawMessage, pts: i32, pts_count: i32 },
    EditChannelMessage { message: RawMessage, pts: i32, pts_count: i32 },
    BotCallbackQuery(CallbackQuery),
    InlineBotCallbackQuery(CallbackQuery),
    BotInlineQuery(InlineQuery),
    PendingJoinRequests { peer: RawPeer, requests_pending: i32, recent_requesters: Vec<i64> },
    BotChatInviteRequester { peer: RawPeer, date: i32, user_id: i64, about: String, qts: i32 },
    ChatParticipant(ChatParticipant),
    ChannelParticipant(ChannelParticipant),
    /// Any constructor without a dedicated variant.
    Other { constructor_id: u32 },
}

impl RawUpdate {
    /// The carried message for the four message updates.
    pub fn message(&self) -> Option<&RawMessage> {
        match self {
            Self::NewMessage { message, .. }
            | Self::NewChannelMessage { message, .. }
            | Self::EditMessage { message, .. }
            | Self::EditChannelMessage { message, .. } => Some(message),
            _ => None,
        }
    }
}

// ─── Envelopes ────────────────────────────────────────────────────────────────

/// A private message delivered without entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShortMessage {
    pub id:         i32,
    pub user_id:    i64,
    pub out:        bool,
    pub mentioned:  bool,
    pub silent:     bool,
    pub message:    String,
    pub pts:        i32,
    pub pts_count:  i32,
    pub date:       i32,
    pub via_bot_id: Option<i64>,
    pub reply_to:   Option<ReplyHeader>,
}

/// A basic-group message delivered without entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShortChatMessage {
    pub id:         i32,
    pub from_id:    i64,
    pub chat_id:    i64,
    pub out:        bool,
    pub mentioned:  bool,
    pub silent:     bool,
    pub message:    String,
    pub pts:        i32,
    pub pts_count:  i32,
    pub date:       i32,
    pub via_bot_id: Option<i64>,
    pub reply_to:   Option<ReplyHeader>,
}

/// Updates bundled with the users and chats they mention.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UpdatesBundle {
    pub updates:   Vec<RawUpdate>,
    pub users:     Vec<RawUser>,
    pub chats:     Vec<RawChat>,
    pub date:      i32,
    pub seq_start: i32,
    pub seq:       i32,
}

/// One delivery from the server: the `Updates` type family.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Envelope {
    TooLong,
    ShortMessage(ShortMessage),
    ShortChatMessage(ShortChatMessage),
    Short { update: RawUpdate, date: i32 },
    Combined(UpdatesBundle),
    Updates(UpdatesBundle),
    ShortSentMessage { id: i32, pts: i32, pts_count: i32, date: i32 },
}
