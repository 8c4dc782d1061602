use alerta_core::app::{ApiConversation, ApiMessage};
use alerta_core::chat::{ConversationId, MessageKind};
use alerta_core::model::{AlertId, SessionUser, UserId};
use alerta_core::{App, Effect, Event, Model};
use crux_core::testing::AppTester;
use crux_http::testing::ResponseBuilder;

fn me() -> UserId {
    UserId("me@example.com".into())
}

fn reporter() -> UserId {
    UserId("reporter@example.com".into())
}

fn signed_in_model() -> Model {
    let mut model = Model::default();
    model.user = Some(SessionUser {
        id: me(),
        email: "me@example.com".into(),
        display_name: None,
    });
    model
}

#[test]
fn opening_a_chat_twice_reuses_the_conversation() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model();
    let alert_id = AlertId("case-1".into());

    let _ = app.update(
        Event::ChatOpened {
            alert_id: alert_id.clone(),
            with: reporter(),
        },
        &mut model,
    );
    let first = model.open_conversation_id.clone().unwrap();

    let _ = app.update(Event::ChatClosed, &mut model);
    let _ = app.update(
        Event::ChatOpened {
            alert_id,
            with: reporter(),
        },
        &mut model,
    );
    let second = model.open_conversation_id.clone().unwrap();

    assert_eq!(first, second);
    assert_eq!(model.conversations.len(), 1);
    // The derived id matches what any other device would compute.
    assert_eq!(
        first,
        ConversationId::derive(&AlertId("case-1".into()), &me(), &reporter())
    );
}

#[test]
fn sent_message_appears_immediately_and_syncs() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model();

    let _ = app.update(
        Event::ChatOpened {
            alert_id: AlertId("case-1".into()),
            with: reporter(),
        },
        &mut model,
    );
    // Claim the upsert op so only the message op remains afterwards.
    let upsert_op = model.in_flight.pending_ids().pop().unwrap();
    let _ = model.in_flight.resolve(&upsert_op);

    let update = app.update(
        Event::MessageComposed {
            kind: MessageKind::Text,
            payload: "Is the dog still there?".into(),
        },
        &mut model,
    );
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));

    let conversation_id = model.open_conversation_id.clone().unwrap();
    let conversation = model.conversations.get(&conversation_id).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    let last = conversation.last_message.clone().unwrap();
    assert_eq!(last.preview, "Is the dog still there?");
    assert_eq!(last.sender, me());

    // Server acks with its authoritative copy, including the other side's reply.
    let op_id = model.in_flight.pending_ids().pop().unwrap();
    let wire = ApiConversation {
        id: conversation_id.as_str().to_string(),
        alert_id: "case-1".into(),
        participants: vec!["me@example.com".into(), "reporter@example.com".into()],
        messages: vec![
            ApiMessage {
                sender: "me@example.com".into(),
                kind: MessageKind::Text,
                payload: "Is the dog still there?".into(),
                sent_at_ms: 100,
            },
            ApiMessage {
                sender: "reporter@example.com".into(),
                kind: MessageKind::Text,
                payload: "Yes, by the entrance".into(),
                sent_at_ms: 200,
            },
        ],
    };
    let response = ResponseBuilder::ok().body(wire).build();
    let _ = app.update(
        Event::MessageAcked {
            op_id,
            response: Box::new(Ok(response)),
        },
        &mut model,
    );

    let conversation = model.conversations.get(&conversation_id).unwrap();
    assert_eq!(conversation.messages.len(), 2);

    // The chat is open, so the reply is already read.
    assert_eq!(conversation.unread_count(&me()), 0);

    let view = app.view(&model);
    let chat = view.chat.expect("chat view should be present");
    assert_eq!(chat.with, "reporter@example.com");
    assert_eq!(chat.messages.len(), 2);
    assert!(chat.messages[0].mine);
    assert!(!chat.messages[1].mine);
}

#[test]
fn empty_text_messages_are_ignored() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model();

    let _ = app.update(
        Event::ChatOpened {
            alert_id: AlertId("case-1".into()),
            with: reporter(),
        },
        &mut model,
    );
    let conversation_id = model.open_conversation_id.clone().unwrap();

    let _ = app.update(
        Event::MessageComposed {
            kind: MessageKind::Text,
            payload: "   ".into(),
        },
        &mut model,
    );
    let conversation = model.conversations.get(&conversation_id).unwrap();
    assert!(conversation.messages.is_empty());
}

#[test]
fn image_messages_carry_their_blob_path() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model();

    let _ = app.update(
        Event::ChatOpened {
            alert_id: AlertId("case-1".into()),
            with: reporter(),
        },
        &mut model,
    );
    let _ = app.update(
        Event::MessageComposed {
            kind: MessageKind::Image,
            payload: "chat_files/me@example.com/photo.jpg".into(),
        },
        &mut model,
    );

    let conversation_id = model.open_conversation_id.clone().unwrap();
    let conversation = model.conversations.get(&conversation_id).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].kind, MessageKind::Image);
    assert_eq!(
        conversation.last_message.as_ref().unwrap().preview,
        "Photo"
    );
}
