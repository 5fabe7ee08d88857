mod common;

use chrono::Utc;
use common::{text, TestEnv};
use housing_chat_service::config::Config;
use housing_chat_service::error::AppError;
use housing_chat_service::repository::ChatStore;
use housing_chat_service::services::MessageService;
use housing_chat_service::websocket::{
    ConnectionId, Delivery, PresenceScope, RealtimeHub, WsOutboundEvent,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

async fn connect(hub: &RealtimeHub, user: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded_channel();
    let connection = ConnectionId::new();
    hub.join(user, connection, tx).await;
    (connection, rx)
}

fn next_event(rx: &mut UnboundedReceiver<String>) -> Option<WsOutboundEvent> {
    rx.try_recv()
        .ok()
        .map(|frame| serde_json::from_str(&frame).expect("outbound frame decodes"))
}

fn drain(rx: &mut UnboundedReceiver<String>) {
    while rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn relay_to_offline_recipient_is_absorbed() {
    let env = TestEnv::new();
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let conv = env.conversation(a, b).await;
    let sent = MessageService::send(env.store(), env.directory.as_ref(), conv.id, a, text("Hi"), Utc::now())
        .await
        .unwrap();
    let before = env.store.find_conversation(conv.id).await.unwrap().unwrap();

    let delivery = env
        .state
        .hub
        .relay_message(a, conv.id, b, sent.id())
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Dropped);

    let after = env.store.find_conversation(conv.id).await.unwrap().unwrap();
    assert_eq!(after.unread_for(b), before.unread_for(b));
    assert_eq!(after.last_message_id, Some(sent.id()));
    assert!(env.store.find_message(sent.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn relay_delivers_persisted_message_to_recipient_only() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let conv = env.conversation(a, b).await;

    let (_, mut rx_a) = connect(hub, a).await;
    let (_, mut rx_b) = connect(hub, b).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    let sent = MessageService::send(env.store(), env.directory.as_ref(), conv.id, a, text("Hi"), Utc::now())
        .await
        .unwrap();
    let delivery = hub.relay_message(a, conv.id, b, sent.id()).await.unwrap();
    assert_eq!(delivery, Delivery::Delivered);

    match next_event(&mut rx_b) {
        Some(WsOutboundEvent::ReceiveMessage {
            conversation_id,
            message,
        }) => {
            assert_eq!(conversation_id, conv.id);
            assert_eq!(message.id(), sent.id());
            assert_eq!(message.message.body.content(), Some("Hi"));
        }
        other => panic!("expected receive_message, got {other:?}"),
    }
    assert!(next_event(&mut rx_a).is_none());
}

#[tokio::test]
async fn relay_is_validated_at_the_boundary() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let c = env.user("Chen").await;
    let ab = env.conversation(a, b).await;
    let ac = env.conversation(a, c).await;

    let from_b = MessageService::send(env.store(), env.directory.as_ref(), ab.id, b, text("mine"), Utc::now())
        .await
        .unwrap();
    let in_ac = MessageService::send(env.store(), env.directory.as_ref(), ac.id, a, text("other"), Utc::now())
        .await
        .unwrap();

    // claims someone else's message
    assert!(matches!(
        hub.relay_message(a, ab.id, b, from_b.id()).await,
        Err(AppError::Forbidden)
    ));
    // message belongs to a different conversation
    assert!(matches!(
        hub.relay_message(a, ab.id, b, in_ac.id()).await,
        Err(AppError::Forbidden)
    ));
    // recipient is not the other participant
    assert!(matches!(
        hub.relay_message(a, ab.id, c, from_b.id()).await,
        Err(AppError::BadRequest(_))
    ));
    // never persisted
    assert!(matches!(
        hub.relay_message(a, ab.id, b, Uuid::new_v4()).await,
        Err(AppError::NotFound)
    ));
    // sender outside the conversation
    assert!(matches!(
        hub.relay_typing(c, ab.id, b, true).await,
        Err(AppError::Forbidden)
    ));
}

#[tokio::test]
async fn typing_reaches_the_peer() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let conv = env.conversation(a, b).await;

    assert_eq!(
        hub.relay_typing(a, conv.id, b, true).await.unwrap(),
        Delivery::Dropped
    );

    let (_, mut rx_b) = connect(hub, b).await;
    drain(&mut rx_b);
    assert_eq!(
        hub.relay_typing(a, conv.id, b, true).await.unwrap(),
        Delivery::Delivered
    );
    match next_event(&mut rx_b) {
        Some(WsOutboundEvent::UserTyping {
            user_id, is_typing, ..
        }) => {
            assert_eq!(user_id, a);
            assert!(is_typing);
        }
        other => panic!("expected user_typing, got {other:?}"),
    }
}

#[tokio::test]
async fn join_and_disconnect_broadcast_presence() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let (_, mut rx_a) = connect(hub, a).await;
    let (conn_b, _rx_b) = connect(hub, b).await;

    match next_event(&mut rx_a) {
        Some(WsOutboundEvent::UserStatus {
            user_id, online, ..
        }) => {
            assert_eq!(user_id, b);
            assert!(online);
        }
        other => panic!("expected user_status, got {other:?}"),
    }

    let at = Utc::now();
    hub.disconnect(b, conn_b, at).await;
    match next_event(&mut rx_a) {
        Some(WsOutboundEvent::UserStatus {
            user_id,
            online,
            last_seen,
        }) => {
            assert_eq!(user_id, b);
            assert!(!online);
            assert_eq!(last_seen, Some(at));
        }
        other => panic!("expected user_status, got {other:?}"),
    }

    match hub.status(b).await {
        WsOutboundEvent::UserStatus {
            online, last_seen, ..
        } => {
            assert!(!online);
            assert_eq!(last_seen, Some(at));
        }
        other => panic!("unexpected {other:?}"),
    }
    match hub.status(Uuid::new_v4()).await {
        WsOutboundEvent::UserStatus {
            online, last_seen, ..
        } => {
            assert!(!online);
            assert_eq!(last_seen, None);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn stale_disconnect_keeps_user_online() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let watcher = Uuid::new_v4();
    let user = Uuid::new_v4();

    let (_, mut rx_watcher) = connect(hub, watcher).await;
    let (old, _rx_old) = connect(hub, user).await;
    let (_new, _rx_new) = connect(hub, user).await;
    drain(&mut rx_watcher);

    hub.disconnect(user, old, Utc::now()).await;
    assert!(hub.registry().is_online(user).await);
    assert!(next_event(&mut rx_watcher).is_none());
}

#[tokio::test]
async fn contacts_scope_limits_presence_fan_out() {
    let mut config = Config::for_memory(common::SECRET);
    config.presence_scope = PresenceScope::Contacts;
    let env = TestEnv::with_config(config);
    let hub = &env.state.hub;

    let a = env.user("Alice").await;
    let contact = env.user("Bruno").await;
    let stranger = env.user("Sam").await;
    env.conversation(a, contact).await;

    let (_, mut rx_contact) = connect(hub, contact).await;
    let (_, mut rx_stranger) = connect(hub, stranger).await;
    drain(&mut rx_contact);
    drain(&mut rx_stranger);

    connect(hub, a).await;
    assert!(matches!(
        next_event(&mut rx_contact),
        Some(WsOutboundEvent::UserStatus { user_id, online: true, .. }) if user_id == a
    ));
    assert!(next_event(&mut rx_stranger).is_none());
}

#[tokio::test]
async fn failed_push_to_closing_socket_still_announces_offline() {
    let env = TestEnv::new();
    let hub = &env.state.hub;
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let conv = env.conversation(a, b).await;

    let (_, mut rx_b) = connect(hub, b).await;
    let (conn_a, rx_a) = connect(hub, a).await;
    drop(rx_a);
    drain(&mut rx_b);

    // socket is gone but its close has not been processed yet
    assert_eq!(
        hub.relay_typing(b, conv.id, a, true).await.unwrap(),
        Delivery::Dropped
    );

    let at = Utc::now();
    hub.disconnect(a, conn_a, at).await;
    match next_event(&mut rx_b) {
        Some(WsOutboundEvent::UserStatus {
            user_id,
            online,
            last_seen,
        }) => {
            assert_eq!(user_id, a);
            assert!(!online);
            assert_eq!(last_seen, Some(at));
        }
        other => panic!("expected user_status, got {other:?}"),
    }
    match hub.status(a).await {
        WsOutboundEvent::UserStatus {
            online, last_seen, ..
        } => {
            assert!(!online);
            assert_eq!(last_seen, Some(at));
        }
        other => panic!("unexpected {other:?}"),
    }
}
