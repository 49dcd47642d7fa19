mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use layer_dispatch::filters::{callback_query, chat_member, inline_query, join_request, message, update};
use layer_dispatch::handlers::{
    CallbackQueryHandler, ChatJoinRequestHandler, ChatMemberUpdatedHandler, Command, InlineQueryHandler,
    MessageHandler,
};
use layer_dispatch::raw::{
    CallbackQuery, Channel, ChannelParticipant, Envelope, InlineQuery, Media, RawChat, RawMessage, RawPeer,
    RawUpdate, UpdatesBundle, User,
};
use common::text_message;
use layer_dispatch::{
    Difference, DifferenceRequest, Dispatcher, InputPeer, InvocationError, PeerStorage, Signal, Upstream,
};
use tokio_util::sync::CancellationToken;

struct Offline;

#[async_trait]
impl Upstream for Offline {
    async fn get_difference(&self, _: DifferenceRequest) -> Result<Difference, InvocationError> {
        Err(InvocationError::Dropped)
    }

    async fn get_messages(&self, _: InputPeer, _: &[i32]) -> Result<Vec<RawMessage>, InvocationError> {
        Err(InvocationError::Dropped)
    }
}

fn bound_dispatcher() -> Dispatcher {
    let dp = Dispatcher::new(PeerStorage::in_memory());
    let me = User { id: 1, access_hash: Some(1), username: Some("EchoBot".into()), ..Default::default() };
    dp.initialize(Arc::new(Offline), me, CancellationToken::new());
    dp
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn hits(c: &Arc<AtomicUsize>) -> usize {
    c.load(Ordering::SeqCst)
}

macro_rules! counting {
    ($c:expr) => {{
        let c = Arc::clone(&$c);
        move |_, _| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(Signal::Continue)
            }
        }
    }};
}

fn text(text: &str) -> Envelope {
    Envelope::Short {
        update: RawUpdate::NewMessage {
            message:   RawMessage::Message(text_message(1, RawPeer::User(9), Some(RawPeer::User(9)), text)),
            pts:       0,
            pts_count: 0,
        },
        date: 0,
    }
}

fn outgoing_text(text: &str) -> Envelope {
    let mut m = text_message(1, RawPeer::User(9), None, text);
    m.out = true;
    Envelope::Short { update: RawUpdate::NewMessage { message: RawMessage::Message(m), pts: 0, pts_count: 0 }, date: 0 }
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn command_matches_prefixes_and_own_username() {
    let dp = bound_dispatcher();
    let c = counter();
    dp.add_handler(Command::new("start", counting!(c)));

    for t in ["/start", "!start", "/START arg", "/start@echobot", "/start@EchoBot x"] {
        dp.handle(text(t)).await;
    }
    assert_eq!(hits(&c), 5);

    for t in ["/start@OtherBot", "/stop", "start", "", "/starting"] {
        dp.handle(text(t)).await;
    }
    assert_eq!(hits(&c), 5);
}

#[tokio::test]
async fn command_ignores_outgoing_unless_enabled() {
    let dp = bound_dispatcher();
    let plain = counter();
    let own = counter();
    dp.add_handler(Command::new("ping", counting!(plain)));
    dp.add_handler(Command::new("ping", counting!(own)).outgoing(true));

    dp.handle(outgoing_text("/ping")).await;
    assert_eq!(hits(&plain), 0);
    assert_eq!(hits(&own), 1);
}

#[tokio::test]
async fn command_args_are_available() {
    let dp = bound_dispatcher();
    let args = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let args = Arc::clone(&args);
        dp.add_handler(Command::new("echo", move |_, update| {
            let args = Arc::clone(&args);
            async move {
                *args.lock().unwrap() = update.args();
                Ok(Signal::EndGroups)
            }
        }));
    }
    dp.handle(text("/echo  one two")).await;
    assert_eq!(*args.lock().unwrap(), ["/echo", "one", "two"]);
}

#[tokio::test]
async fn command_update_filter_limits_chats() {
    let dp = bound_dispatcher();
    let c = counter();
    dp.add_handler(Command::new("start", counting!(c)).update_filter(update::group()));

    dp.handle(text("/start")).await;
    assert_eq!(hits(&c), 0);

    let in_group = text_message(2, RawPeer::Chat(5), Some(RawPeer::User(9)), "/start");
    dp.handle(Envelope::Short {
        update: RawUpdate::NewMessage { message: RawMessage::Message(in_group), pts: 0, pts_count: 0 },
        date:   0,
    })
    .await;
    assert_eq!(hits(&c), 1);
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn message_handler_applies_filters() {
    let dp = bound_dispatcher();
    let all = counter();
    let regex = counter();
    let incoming = counter();
    dp.add_handler(MessageHandler::new(counting!(all)));
    dp.add_handler(MessageHandler::with_filter(message::regex(r"^\d+$").unwrap(), counting!(regex)));
    dp.add_handler(MessageHandler::new(counting!(incoming)).outgoing(false));

    dp.handle(text("123")).await;
    dp.handle(text("abc")).await;
    dp.handle(outgoing_text("456")).await;

    assert_eq!(hits(&all), 3);
    assert_eq!(hits(&regex), 2);
    assert_eq!(hits(&incoming), 2);
}

#[tokio::test]
async fn message_handler_update_filter() {
    let dp = bound_dispatcher();
    let supergroups = counter();
    let private = counter();
    dp.add_handler(MessageHandler::new(counting!(supergroups)).update_filter(update::supergroup()));
    dp.add_handler(MessageHandler::new(counting!(private)).update_filter(update::private()));

    let mut photo = text_message(2, RawPeer::Channel(30), Some(RawPeer::User(9)), "");
    photo.media = Some(Media::Photo { id: 1 });
    dp.handle(Envelope::Updates(UpdatesBundle {
        updates: vec![RawUpdate::NewChannelMessage { message: RawMessage::Message(photo), pts: 0, pts_count: 0 }],
        chats:   vec![RawChat::Channel(Channel { id: 30, access_hash: Some(3), megagroup: true, ..Default::default() })],
        ..Default::default()
    }))
    .await;
    dp.handle(text("dm")).await;

    assert_eq!(hits(&supergroups), 1);
    assert_eq!(hits(&private), 1);
}

#[tokio::test]
async fn non_message_updates_skip_message_handlers() {
    let dp = bound_dispatcher();
    let c = counter();
    dp.add_handler(MessageHandler::new(counting!(c)));
    dp.handle(Envelope::Short { update: RawUpdate::Other { constructor_id: 1 }, date: 0 }).await;
    assert_eq!(hits(&c), 0);
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn callback_query_handler_filters_data() {
    let dp = bound_dispatcher();
    let c = counter();
    dp.add_handler(CallbackQueryHandler::new(callback_query::prefix("vote:"), counting!(c)));

    for data in ["vote:yes", "menu", "vote:no"] {
        let q = CallbackQuery { user_id: 9, data: Some(data.as_bytes().to_vec()), ..Default::default() };
        dp.handle(Envelope::Short { update: RawUpdate::BotCallbackQuery(q), date: 0 }).await;
    }
    dp.handle(text("vote:yes")).await;
    assert_eq!(hits(&c), 2);
}

#[tokio::test]
async fn inline_query_handler_filters_query() {
    let dp = bound_dispatcher();
    let c = counter();
    dp.add_handler(InlineQueryHandler::new(inline_query::from_user_id(9).and(inline_query::suffix("?")), counting!(c)));

    for (user_id, query) in [(9, "why?"), (9, "why"), (8, "why?")] {
        let q = InlineQuery { user_id, query: query.into(), ..Default::default() };
        dp.handle(Envelope::Short { update: RawUpdate::BotInlineQuery(q), date: 0 }).await;
    }
    assert_eq!(hits(&c), 1);
}

// ── Membership ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn join_requests_and_member_changes() {
    let dp = bound_dispatcher();
    let joins = counter();
    let members = counter();
    dp.add_handler(ChatJoinRequestHandler::new(join_request::chat_id(30), counting!(joins)));
    dp.add_handler(ChatMemberUpdatedHandler::new(
        chat_member::channel_update().and(chat_member::from_chat_id(30)),
        counting!(members),
    ));

    let requests = [
        RawUpdate::PendingJoinRequests { peer: RawPeer::Channel(30), requests_pending: 1, recent_requesters: vec![9] },
        RawUpdate::BotChatInviteRequester { peer: RawPeer::Channel(31), date: 0, user_id: 9, about: String::new(), qts: 0 },
        RawUpdate::ChannelParticipant(ChannelParticipant {
            channel_id: 30,
            date:       0,
            actor_id:   9,
            user_id:    9,
            prev:       None,
            new:        None,
            qts:        0,
        }),
    ];
    for update in requests {
        dp.handle(Envelope::Short { update, date: 0 }).await;
    }
    assert_eq!(hits(&joins), 1);
    assert_eq!(hits(&members), 1);
}
