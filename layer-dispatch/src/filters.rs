//! Composable predicates for the built-in handlers.
//!
//! ```rust
//! use layer_dispatch::filters::{Filter, message};
//!
//! let f: Filter<_> = message::text().and(message::edited().not());
//! # let _ = f;
//! ```

use std::fmt;
use std::sync::Arc;

/// A cloneable predicate over `T`.
pub struct Filter<T: ?Sized>(Arc<dyn Fn(&T) -> bool + Send + Sync>);

impl<T: ?Sized + 'static> Filter<T> {
    pub fn new(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn matches(&self, value: &T) -> bool {
        (self.0)(value)
    }

    /// Both `self` and `other` match.
    pub fn and(self, other: Filter<T>) -> Self {
        Self::new(move |v| self.matches(v) && other.matches(v))
    }

    /// Either `self` or `other` matches.
    pub fn or(self, other: Filter<T>) -> Self {
        Self::new(move |v| self.matches(v) || other.matches(v))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(move |v| !self.matches(v))
    }
}

impl<T: ?Sized> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

pub mod message {
    use super::Filter;
    use crate::raw::{DocumentAttribute, Media};
    use crate::update::Message;

    pub fn all() -> Filter<Message> {
        Filter::<Message>::new(|_| true)
    }

    /// Non-empty text or caption.
    pub fn text() -> Filter<Message> {
        Filter::<Message>::new(|m| !m.text.is_empty())
    }

    pub fn chat(id: i64) -> Filter<Message> {
        Filter::<Message>::new(move |m| m.chat_id() == id)
    }

    /// Text matching `pattern`.
    pub fn regex(pattern: &str) -> Result<Filter<Message>, regex::Error> {
        let re = regex::Regex::new(pattern)?;
        Ok(Filter::<Message>::new(move |m| re.is_match(&m.text)))
    }

    pub fn media() -> Filter<Message> {
        Filter::<Message>::new(|m| m.media().is_some())
    }

    pub fn photo() -> Filter<Message> {
        Filter::<Message>::new(|m| matches!(m.media(), Some(Media::Photo { .. })))
    }

    /// Video documents that are neither GIFs nor round messages.
    pub fn video() -> Filter<Message> {
        Filter::<Message>::new(|m| {
            has_attribute(m, |a| matches!(a, DocumentAttribute::Video { round_message: false, .. }))
                && !has_attribute(m, |a| matches!(a, DocumentAttribute::Animated))
        })
    }

    pub fn animation() -> Filter<Message> {
        Filter::<Message>::new(|m| has_attribute(m, |a| matches!(a, DocumentAttribute::Animated)))
    }

    pub fn sticker() -> Filter<Message> {
        Filter::<Message>::new(|m| has_attribute(m, |a| matches!(a, DocumentAttribute::Sticker { .. })))
    }

    /// Music and voice notes.
    pub fn audio() -> Filter<Message> {
        Filter::<Message>::new(|m| has_attribute(m, |a| matches!(a, DocumentAttribute::Audio { .. })))
    }

    pub fn edited() -> Filter<Message> {
        Filter::<Message>::new(|m| m.edit_date().is_some())
    }

    pub fn service() -> Filter<Message> {
        Filter::<Message>::new(|m| m.is_service)
    }

    fn has_attribute(m: &Message, f: impl Fn(&DocumentAttribute) -> bool) -> bool {
        m.media()
            .and_then(Media::document)
            .is_some_and(|d| d.attributes.iter().any(f))
    }
}

// ─── Callback query ───────────────────────────────────────────────────────────

pub mod callback_query {
    use super::Filter;
    use crate::raw::CallbackQuery;

    pub fn all() -> Filter<CallbackQuery> {
        Filter::<CallbackQuery>::new(|_| true)
    }

    pub fn prefix(prefix: impl Into<String>) -> Filter<CallbackQuery> {
        let prefix = prefix.into().into_bytes();
        Filter::<CallbackQuery>::new(move |q| q.data.as_deref().is_some_and(|d| d.starts_with(&prefix)))
    }

    pub fn suffix(suffix: impl Into<String>) -> Filter<CallbackQuery> {
        let suffix = suffix.into().into_bytes();
        Filter::<CallbackQuery>::new(move |q| q.data.as_deref().is_some_and(|d| d.ends_with(&suffix)))
    }

    pub fn equal(data: impl Into<String>) -> Filter<CallbackQuery> {
        let data = data.into().into_bytes();
        Filter::<CallbackQuery>::new(move |q| q.data.as_deref() == Some(data.as_slice()))
    }

    pub fn from_user_id(id: i64) -> Filter<CallbackQuery> {
        Filter::<CallbackQuery>::new(move |q| q.user_id == id)
    }

    pub fn game_name(name: impl Into<String>) -> Filter<CallbackQuery> {
        let name = name.into();
        Filter::<CallbackQuery>::new(move |q| q.game_short_name.as_deref() == Some(name.as_str()))
    }
}

// ─── Inline query ─────────────────────────────────────────────────────────────

pub mod inline_query {
    use super::Filter;
    use crate::raw::InlineQuery;

    pub fn all() -> Filter<InlineQuery> {
        Filter::<InlineQuery>::new(|_| true)
    }

    pub fn prefix(prefix: impl Into<String>) -> Filter<InlineQuery> {
        let prefix = prefix.into();
        Filter::<InlineQuery>::new(move |q| q.query.starts_with(prefix.as_str()))
    }

    pub fn suffix(suffix: impl Into<String>) -> Filter<InlineQuery> {
        let suffix = suffix.into();
        Filter::<InlineQuery>::new(move |q| q.query.ends_with(suffix.as_str()))
    }

    pub fn equal(query: impl Into<String>) -> Filter<InlineQuery> {
        let query = query.into();
        Filter::<InlineQuery>::new(move |q| q.query == query)
    }

    pub fn from_user_id(id: i64) -> Filter<InlineQuery> {
        Filter::<InlineQuery>::new(move |q| q.user_id == id)
    }
}

// ─── Join requests ────────────────────────────────────────────────────────────

pub mod join_request {
    use super::Filter;
    use crate::update::ChatJoinRequest;

    pub fn all() -> Filter<ChatJoinRequest> {
        Filter::<ChatJoinRequest>::new(|_| true)
    }

    pub fn chat_id(id: i64) -> Filter<ChatJoinRequest> {
        Filter::<ChatJoinRequest>::new(move |r| r.peer.id() == id)
    }
}

// ─── Chat member ──────────────────────────────────────────────────────────────

pub mod chat_member {
    use super::Filter;
    use crate::update::ChatMemberChange;

    pub fn all() -> Filter<ChatMemberChange> {
        Filter::<ChatMemberChange>::new(|_| true)
    }

    /// Changes in basic groups.
    pub fn chat_update() -> Filter<ChatMemberChange> {
        Filter::<ChatMemberChange>::new(|c| matches!(c, ChatMemberChange::Chat(_)))
    }

    /// Changes in channels and supergroups.
    pub fn channel_update() -> Filter<ChatMemberChange> {
        Filter::<ChatMemberChange>::new(|c| matches!(c, ChatMemberChange::Channel(_)))
    }

    pub fn from_user_id(id: i64) -> Filter<ChatMemberChange> {
        Filter::<ChatMemberChange>::new(move |c| c.user_id() == id)
    }

    pub fn from_chat_id(id: i64) -> Filter<ChatMemberChange> {
        Filter::<ChatMemberChange>::new(move |c| c.chat_id() == id)
    }
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// Filters on the chat an update happened in.
///
/// `supergroup` and `channel` need the channel in the envelope's entities;
/// `group` and `private` only look at the peer kind.
pub mod update {
    use super::Filter;
    use crate::raw::RawPeer;
    use crate::update::Update;

    pub fn supergroup() -> Filter<Update> {
        Filter::<Update>::new(|u| u.get_channel().is_some_and(|c| c.megagroup))
    }

    pub fn channel() -> Filter<Update> {
        Filter::<Update>::new(|u| u.get_channel().is_some_and(|c| c.broadcast))
    }

    pub fn group() -> Filter<Update> {
        Filter::<Update>::new(|u| matches!(u.peer(), Some(RawPeer::Chat(_))))
    }

    pub fn private() -> Filter<Update> {
        Filter::<Update>::new(|u| matches!(u.peer(), Some(RawPeer::User(_))))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{
        CallbackQuery, ChannelParticipant, ChatParticipant, Document, DocumentAttribute, InlineQuery, Media,
        RawMessage, RawPeer,
    };
    use crate::update::{ChatJoinRequest, ChatMemberChange, Message, text_message};

    fn msg(text: &str) -> Message {
        Message::from_raw(RawMessage::Message(text_message(1, RawPeer::Chat(5), None, text)))
    }

    fn with_media(media: Media) -> Message {
        let mut raw = text_message(1, RawPeer::Chat(5), None, "");
        raw.media = Some(media);
        Message::from_raw(RawMessage::Message(raw))
    }

    fn doc(attributes: Vec<DocumentAttribute>) -> Media {
        Media::Document(Some(Document { attributes, ..Default::default() }))
    }

    #[test]
    fn combinators() {
        let hi = message::regex("^hi").unwrap();
        let f = hi.clone().and(message::chat(5));
        assert!(f.matches(&msg("hi all")));
        assert!(!f.matches(&msg("oh hi")));
        assert!(hi.clone().not().matches(&msg("oh hi")));
        assert!(hi.or(message::text()).matches(&msg("oh hi")));
        assert!(!message::text().matches(&msg("")));
    }

    #[test]
    fn bad_regex_is_an_error() {
        assert!(message::regex("(").is_err());
    }

    #[test]
    fn media_kinds() {
        let gif = with_media(doc(vec![
            DocumentAttribute::Video { duration: 1, w: 1, h: 1, round_message: false },
            DocumentAttribute::Animated,
        ]));
        assert!(message::animation().matches(&gif));
        assert!(!message::video().matches(&gif));
        assert!(message::media().matches(&gif));

        let photo = with_media(Media::Photo { id: 1 });
        assert!(message::photo().matches(&photo));
        assert!(!message::sticker().matches(&photo));
        assert!(!message::media().matches(&msg("x")));
    }

    #[test]
    fn callback_data() {
        let q = CallbackQuery { user_id: 3, data: Some(b"page:2".to_vec()), ..Default::default() };
        assert!(callback_query::prefix("page:").matches(&q));
        assert!(callback_query::suffix(":2").matches(&q));
        assert!(!callback_query::suffix("page").matches(&q));
        assert!(callback_query::equal("page:2").matches(&q));
        assert!(callback_query::from_user_id(3).matches(&q));
        assert!(!callback_query::game_name("g").matches(&q));
    }

    #[test]
    fn inline_query_text() {
        let q = InlineQuery { user_id: 4, query: "cats?".into(), ..Default::default() };
        assert!(inline_query::all().matches(&q));
        assert!(inline_query::prefix("cat").and(inline_query::suffix("?")).matches(&q));
        assert!(!inline_query::equal("cats").matches(&q));
        assert!(!inline_query::from_user_id(5).matches(&q));
    }

    #[test]
    fn join_requests_and_members() {
        let req = ChatJoinRequest {
            peer:              RawPeer::Channel(30),
            requests_pending:  2,
            recent_requesters: vec![7, 8],
            about:             None,
        };
        assert!(join_request::all().matches(&req));
        assert!(join_request::chat_id(30).matches(&req));
        assert!(!join_request::chat_id(31).matches(&req));

        let chat = ChatMemberChange::Chat(ChatParticipant {
            chat_id:  5,
            date:     0,
            actor_id: 1,
            user_id:  7,
            prev:     None,
            new:      None,
            qts:      0,
        });
        let channel = ChatMemberChange::Channel(ChannelParticipant {
            channel_id: 30,
            date:       0,
            actor_id:   1,
            user_id:    8,
            prev:       None,
            new:        None,
            qts:        0,
        });
        assert!(chat_member::all().matches(&chat));
        assert!(chat_member::chat_update().matches(&chat));
        assert!(!chat_member::channel_update().matches(&chat));
        assert!(chat_member::channel_update().and(chat_member::from_chat_id(30)).matches(&channel));
        assert!(chat_member::from_user_id(7).or(chat_member::from_user_id(8)).matches(&channel));
        assert!(!chat_member::from_user_id(7).matches(&channel));
    }
}
