use estufa_dashboard::chat::{Role, ASSISTANT_ERROR_TEXT, EMPTY_REPLY_TEXT};
use estufa_dashboard::{BackendError, ChatState, FailureKind, SendOutcome};
use estufa_devkit::{ReplyBuilder, TestHarness};
use std::time::Duration;

#[tokio::test]
async fn test_report_request_answered_locally() {
    let harness = TestHarness::new();
    let mut chat = harness.chat();

    assert_eq!(chat.send("me manda o csv").await, SendOutcome::ReportOffered);

    harness.assert_no_chat_calls().unwrap();
    assert_eq!(TestHarness::bot_messages(&chat), 1);
    let reply = chat.transcript().last().unwrap();
    assert_eq!(reply.role, Role::Bot);
    let report = reply.report.as_ref().unwrap();
    assert_eq!(report.download_url, "http://estufa.test:5000/export.csv");
    assert!(report.available);
    assert!(reply.text.contains("http://estufa.test:5000/export.csv"));
    assert_eq!(chat.state(), ChatState::Idle);
}

#[tokio::test]
async fn test_session_id_echoed_on_next_turn() {
    let harness = TestHarness::new();
    let greeting = ReplyBuilder::text("Olá! Como posso ajudar?").session("abc");
    harness.backend.push_reply(Ok(greeting.build()));
    harness.backend.push_reply(Ok(ReplyBuilder::text("A estufa está a 24 °C.").build()));
    let mut chat = harness.chat();

    assert_eq!(chat.send("oi").await, SendOutcome::Answered);
    assert_eq!(chat.send("como está a temperatura?").await, SendOutcome::Answered);

    assert_eq!(harness.chat_session_at(0).unwrap(), None);
    assert_eq!(harness.chat_session_at(1).unwrap().as_deref(), Some("abc"));
    assert_eq!(chat.session_id(), Some("abc"));
    // a reply without session_id keeps the current one
    assert_eq!(chat.transcript().len(), 4);
}

#[tokio::test]
async fn test_switched_session_used_from_then_on() {
    let harness = TestHarness::new();
    harness.backend.push_reply(Ok(ReplyBuilder::text("Oi").session("abc").build()));
    harness.backend.push_reply(Ok(ReplyBuilder::text("Sessão nova").session("xyz").build()));
    let mut chat = harness.chat();

    chat.send("oi").await;
    chat.send("e a luz?").await;
    assert_eq!(chat.send("e a água?").await, SendOutcome::Answered);

    assert_eq!(harness.chat_session_at(1).unwrap().as_deref(), Some("abc"));
    assert_eq!(harness.chat_session_at(2).unwrap().as_deref(), Some("xyz"));
    assert_eq!(chat.session_id(), Some("xyz"));
}

#[tokio::test]
async fn test_failed_turn_leaves_session_usable() {
    let harness = TestHarness::new();
    harness.backend.push_reply(Ok(ReplyBuilder::text("Oi").session("s-1").build()));
    harness.backend.push_reply(Err(BackendError::Network("timed out".into())));
    harness.backend.push_reply(Ok(ReplyBuilder::text("Voltei").build()));
    let mut chat = harness.chat();

    chat.send("oi").await;
    assert_eq!(chat.send("e a umidade?").await, SendOutcome::Failed(FailureKind::Network));
    assert_eq!(chat.state(), ChatState::Errored);
    assert_eq!(chat.transcript().last().unwrap().text, ASSISTANT_ERROR_TEXT);
    assert_eq!(TestHarness::bot_messages(&chat), 2);

    assert_eq!(chat.send("tente de novo").await, SendOutcome::Answered);
    assert_eq!(chat.state(), ChatState::Idle);
    assert_eq!(chat.transcript().last().unwrap().text, "Voltei");
    assert_eq!(harness.chat_session_at(2).unwrap().as_deref(), Some("s-1"));
}

#[tokio::test]
async fn test_empty_input_ignored() {
    let harness = TestHarness::new();
    let mut chat = harness.chat();

    assert_eq!(chat.send("   ").await, SendOutcome::Ignored);
    assert!(chat.transcript().is_empty());
    harness.assert_no_chat_calls().unwrap();
}

#[tokio::test]
async fn test_reply_cleanup_and_fallback() {
    let harness = TestHarness::new();
    harness.backend.push_reply(Ok(ReplyBuilder::text("🌱 Tudo certo 😀").build()));
    harness.backend.push_reply(Ok(ReplyBuilder::default().build()));
    let mut chat = harness.chat();

    chat.send("status?").await;
    assert_eq!(chat.transcript().last().unwrap().text, "Tudo certo");

    chat.send("e agora?").await;
    assert_eq!(chat.transcript().last().unwrap().text, EMPTY_REPLY_TEXT);
}

#[tokio::test]
async fn test_backend_report_link_resolved() {
    let harness = TestHarness::new();
    let reply = ReplyBuilder::text("Gerei o relatório").report("/export.csv?dias=7");
    harness.backend.push_reply(Ok(reply.build()));
    let mut chat = harness.chat();

    assert_eq!(chat.send("gera um resumo semanal").await, SendOutcome::Answered);
    let report = chat.transcript().last().unwrap().report.clone().unwrap();
    assert_eq!(report.download_url, "http://estufa.test:5000/export.csv?dias=7");
}

#[tokio::test]
async fn test_reset_forgets_session() {
    let harness = TestHarness::new();
    harness.backend.push_reply(Ok(ReplyBuilder::text("Oi").session("abc").build()));
    let mut chat = harness.chat();

    chat.send("oi").await;
    chat.reset();
    chat.send("oi de novo").await;

    assert!(chat.session_id().is_none());
    assert_eq!(harness.chat_session_at(1).unwrap(), None);
    assert_eq!(chat.transcript().iter().filter(|m| m.role == Role::User).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_turn_closed_on_next_send() {
    let harness = TestHarness::new();
    harness.backend.set_latency(Duration::from_secs(5));
    harness.backend.push_reply(Ok(ReplyBuilder::text("Umidade em 60%").build()));
    let mut chat = harness.chat();

    let cut = tokio::time::timeout(Duration::from_secs(1), chat.send("e a umidade?")).await;
    assert!(cut.is_err());
    assert_eq!(chat.state(), ChatState::Sending);
    assert_eq!(chat.transcript().len(), 1);

    harness.backend.set_latency(Duration::ZERO);
    assert_eq!(chat.send("e a umidade?").await, SendOutcome::Answered);
    assert_eq!(chat.state(), ChatState::Idle);

    let texts: Vec<_> = chat.transcript().iter().map(|m| (m.role, m.text.as_str())).collect();
    assert_eq!(
        texts,
        [
            (Role::User, "e a umidade?"),
            (Role::Bot, ASSISTANT_ERROR_TEXT),
            (Role::User, "e a umidade?"),
            (Role::Bot, "Umidade em 60%"),
        ]
    );
    assert_eq!(harness.backend.chat_calls().len(), 2);
}
