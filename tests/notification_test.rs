//! Notification delivery tests against a mocked Bot API

mod helpers;

use std::sync::Arc;
use assert_matches::assert_matches;
use chrono::Utc;
use uuid::Uuid;
use eventdesk::database::DatabaseService;
use eventdesk::services::{
    Notification, NotificationDispatcher, Notifier, RandomReferenceGenerator, Recipient, ServiceFactory, SystemClock,
    TelegramNotifier, TemplateKind,
};
use eventdesk::EventDeskError;
use helpers::*;

fn confirmation() -> Notification {
    Notification::new(Recipient::Guest("ana@example.com".to_string()), TemplateKind::BookingConfirmed)
        .with("reference", "TST-250101-ABC123")
        .with("event_name", "Lindy Exchange")
        .with("quantity", "2")
        .with("starts_at", "2025-01-01 20:00 UTC")
}

#[tokio::test]
async fn test_telegram_notifier_posts_rendered_message() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message(true).await;

    let notifier = TelegramNotifier::new(TEST_BOT_TOKEN, TEST_CHAT_ID).with_api_url(mock.api_url());
    notifier.send(&confirmation()).await.unwrap();

    let sent = mock.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], TEST_CHAT_ID);
    let text = sent[0]["text"].as_str().unwrap();
    assert!(text.starts_with("[booking_confirmed] guest:ana@example.com"));
    assert!(text.contains("TST-250101-ABC123"));
    assert!(text.contains("Lindy Exchange"));
}

#[tokio::test]
async fn test_telegram_notifier_surfaces_api_errors() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message(false).await;

    let notifier = TelegramNotifier::new(TEST_BOT_TOKEN, TEST_CHAT_ID).with_api_url(mock.api_url());
    let result = notifier.send(&confirmation()).await;

    assert_matches!(result, Err(EventDeskError::Telegram(_)));
}

#[tokio::test]
async fn test_dispatcher_counts_telegram_outcomes() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message(true).await;

    let notifier = TelegramNotifier::new(TEST_BOT_TOKEN, TEST_CHAT_ID).with_api_url(mock.api_url());
    let dispatcher = NotificationDispatcher::spawn(Arc::new(notifier), 16);

    for _ in 0..3 {
        dispatcher.notify(confirmation());
    }
    dispatcher.notify(
        Notification::new(Recipient::Account(Uuid::new_v4()), TemplateKind::EventRestored)
            .with("event_name", "Blues Night")
            .with("available", "12"),
    );
    dispatcher.flush().await;

    let stats = dispatcher.stats();
    assert_eq!(stats.queued, 4);
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(mock.sent_messages().await.len(), 4);
}

#[tokio::test]
async fn test_unreachable_chat_does_not_block_bookings() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message(false).await;

    let settings = TestContext::create_test_settings();
    let notifier = TelegramNotifier::new(TEST_BOT_TOKEN, TEST_CHAT_ID).with_api_url(mock.api_url());
    let services = ServiceFactory::build(
        &settings,
        DatabaseService::in_memory(),
        Arc::new(notifier),
        Arc::new(SystemClock),
        Arc::new(RandomReferenceGenerator::new("TST")),
    );

    let event = services.events.create_event(event_request_at(3, Utc::now())).await.unwrap();
    services.events.publish(event.id).await.unwrap();
    let booking = services.bookings.create_booking(event.id, guest(), 1, None).await;
    assert!(booking.is_ok());

    services.dispatcher.flush().await;
    assert_eq!(services.dispatcher.stats().failed, 1);
    assert_eq!(mock.sent_messages().await.len(), 1);
}
