//! Peer records and their projection into request addressing.

// ─── PeerType ─────────────────────────────────────────────────────────────────

/// Kind of an addressable entity. Stored as an integer in the `type` column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PeerType {
    /// Not a known kind; projects to [`InputPeer::Empty`].
    #[default]
    Unknown,
    User,
    Chat,
    Channel,
}

impl PeerType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::User    => 1,
            Self::Chat    => 2,
            Self::Channel => 3,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::User,
            2 => Self::Chat,
            3 => Self::Channel,
            _ => Self::Unknown,
        }
    }
}

/// Access hash stored for peers that have none (basic groups).
pub const DEFAULT_ACCESS_HASH: i64 = 0;

// ─── Peer ─────────────────────────────────────────────────────────────────────

/// One directory row: everything needed to address a user, chat or channel.
///
/// The zero value (`id == 0`) means "not found".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Peer {
    pub id:          i64,
    pub access_hash: i64,
    pub peer_type:   PeerType,
    /// Empty for peers without a public username; never an absence marker.
    pub username:    String,
}

impl Peer {
    /// `true` for the not-found sentinel.
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// The addressing envelope for this peer.
    pub fn input_peer(&self) -> InputPeer {
        if self.is_empty() {
            return InputPeer::Empty;
        }
        match self.peer_type {
            PeerType::User    => InputPeer::User { user_id: self.id, access_hash: self.access_hash },
            PeerType::Chat    => InputPeer::Chat { chat_id: self.id },
            PeerType::Channel => InputPeer::Channel { channel_id: self.id, access_hash: self.access_hash },
            PeerType::Unknown => InputPeer::Empty,
        }
    }
}

// ─── InputPeer ────────────────────────────────────────────────────────────────

/// Addressing shape a protocol request needs for a peer.
///
/// Users and channels need their access hash; basic groups are addressed by
/// id alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputPeer {
    #[default]
    Empty,
    User    { user_id: i64, access_hash: i64 },
    Chat    { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl InputPeer {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The bare id of the addressed entity (0 for [`InputPeer::Empty`]).
    pub fn id(&self) -> i64 {
        match *self {
            Self::Empty                     => 0,
            Self::User { user_id, .. }      => user_id,
            Self::Chat { chat_id }          => chat_id,
            Self::Channel { channel_id, .. } => channel_id,
        }
    }
}
