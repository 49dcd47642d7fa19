//! The seam between the dispatcher and the protocol client.
//!
//! The dispatcher never speaks MTProto itself. Whatever owns the connection
//! implements [`Upstream`] and is bound with [`crate::Dispatcher::initialize`];
//! the dispatcher uses it for the differential fetch and for reply lookups.

use async_trait::async_trait;
use layer_storage::InputPeer;

use crate::errors::InvocationError;
use crate::raw::{RawChat, RawMessage, RawUpdate, RawUser};

/// Arguments of `updates.getDifference`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DifferenceRequest {
    pub pts:  i32,
    pub date: i32,
    pub qts:  i32,
}

/// `updates.state`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdatesState {
    pub pts:          i32,
    pub qts:          i32,
    pub date:         i32,
    pub seq:          i32,
    pub unread_count: i32,
}

/// Body shared by `updates.difference` and `updates.differenceSlice`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DifferenceData {
    pub new_messages:  Vec<RawMessage>,
    pub other_updates: Vec<RawUpdate>,
    pub users:         Vec<RawUser>,
    pub chats:         Vec<RawChat>,
    pub state:         UpdatesState,
}

/// Result of `updates.getDifference`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Difference {
    Empty { date: i32, seq: i32 },
    Difference(DifferenceData),
    /// Partial result; `state` is intermediate.
    Slice(DifferenceData),
    TooLong { pts: i32 },
}

impl Difference {
    /// Users and chats carried by the result, if any.
    pub fn entities(&self) -> Option<(&[RawUser], &[RawChat])> {
        match self {
            Self::Difference(d) | Self::Slice(d) => Some((&d.users, &d.chats)),
            Self::Empty { .. } | Self::TooLong { .. } => None,
        }
    }
}

/// Calls the dispatcher needs from a live client.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `updates.getDifference`.
    async fn get_difference(&self, req: DifferenceRequest) -> Result<Difference, InvocationError>;

    /// `messages.getMessages` / `channels.getMessages`, depending on `peer`.
    async fn get_messages(&self, peer: InputPeer, ids: &[i32]) -> Result<Vec<RawMessage>, InvocationError>;
}
