use crate::scripted_provider::ScriptedProvider;
use cogito::guard::InMemoryConversations;
use cogito::llm::{Completion, CompletionRequest, ContextTurn};
use cogito::{Config, OutboundMessage, ReliabilityLayer, RequestContext};
use std::sync::Arc;
use tempfile::TempDir;

fn config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = tmp.path().display().to_string();
    config.envelope.open_tag = "<ENVELOPE>".into();
    config.envelope.close_tag = "</ENVELOPE>".into();
    config.envelope.anchor_pattern = "Final answer:".into();
    config.retry.max_attempts = 3;
    config.retry.delay_ms = 1;
    config.retry.fallback_reply = Some("service busy".into());
    config
}

async fn deliver(
    layer: &ReliabilityLayer,
    ctx: &RequestContext,
    request: &CompletionRequest,
    completion: Completion,
) -> (Completion, OutboundMessage) {
    layer.before_request(ctx, request).await;
    let mut completion = completion;
    layer.after_response(ctx, &mut completion).await;
    let mut message = OutboundMessage::from_llm(completion.text.clone());
    layer.before_delivery(ctx, &mut message).await;
    (completion, message)
}

#[tokio::test]
async fn anchored_envelope_shows_reply_and_logs_thought() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let layer = ReliabilityLayer::builder(&config(&tmp), provider.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new("qq:group:1", "hi");

    let (_, message) = deliver(
        &layer,
        &ctx,
        &CompletionRequest::prompt_only("hi"),
        Completion::text_only("<ENVELOPE>reasoning</ENVELOPE>Final answer: Hello"),
    )
    .await;

    assert_eq!(message.text, "Hello");
    assert_eq!(provider.calls(), 0);
    let logged = layer.log_store().read("qq:group:1", 1).await.unwrap().unwrap();
    assert_eq!(logged.content, "reasoning");
    assert!(layer.pending().is_empty());
}

#[tokio::test]
async fn unanchored_envelope_exhausts_into_fallback() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["<ENVELOPE>partial"]));
    let layer = ReliabilityLayer::builder(&config(&tmp), provider.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new("s", "hi");

    let (_, message) = deliver(
        &layer,
        &ctx,
        &CompletionRequest::prompt_only("hi"),
        Completion::text_only("<ENVELOPE>partial"),
    )
    .await;

    assert_eq!(provider.calls(), 3);
    let suffix = message
        .text
        .strip_prefix("service busy")
        .expect("fallback text");
    assert!((1..=3).contains(&suffix.chars().count()));
    assert!(suffix.chars().all(|c| c == '\u{200b}'));
    assert!(layer.log_store().entries("s").await.unwrap().is_empty());
    assert!(layer.pending().is_empty());
}

#[tokio::test]
async fn tool_invocations_pass_through_untouched() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let layer = ReliabilityLayer::builder(&config(&tmp), provider.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new("s", "weather?");
    layer
        .before_request(&ctx, &CompletionRequest::prompt_only("weather?"))
        .await;

    let mut completion = Completion::tool_invocation("<ENVELOPE>calling a tool");
    layer.after_response(&ctx, &mut completion).await;

    assert_eq!(completion.text, "<ENVELOPE>calling a tool");
    assert_eq!(provider.calls(), 0);
    assert_eq!(layer.pending().len(), 1);

    // The continuation after the tool result arrives under the same key.
    let mut continuation = Completion::text_only("<ENVELOPE>looked it up</ENVELOPE>Final answer: Sunny");
    layer.after_response(&ctx, &mut continuation).await;
    assert_eq!(continuation.text, "Sunny");
    assert!(layer.pending().is_empty());
}

#[tokio::test]
async fn recovered_reply_is_spliced_into_history() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&[
        "",
        "<ENVELOPE>second try</ENVELOPE>Final answer: Recovered",
    ]));
    let history = Arc::new(InMemoryConversations::new());
    history.insert("s", "conv-1", vec![ContextTurn::user("earlier"), ContextTurn::assistant("ok")]);
    let layer = ReliabilityLayer::builder(&config(&tmp), provider.clone())
        .history(history.clone())
        .build()
        .unwrap();

    let ctx = RequestContext::new("s", "question");
    let request = CompletionRequest {
        conversation_id: Some("conv-1".into()),
        ..CompletionRequest::prompt_only("question")
    };
    let (_, message) = deliver(&layer, &ctx, &request, Completion::text_only("Request failed: Error code: 503")).await;

    assert_eq!(message.text, "Recovered");
    assert_eq!(provider.calls(), 2);
    let turns = history.turns("s", "conv-1").unwrap();
    assert_eq!(
        turns[2..],
        [ContextTurn::user("question"), ContextTurn::assistant("Recovered")]
    );
    let logged = layer.log_store().read("s", 1).await.unwrap().unwrap();
    assert_eq!(logged.content, "second try");
}

#[tokio::test]
async fn excluded_commands_are_never_retried() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let layer = ReliabilityLayer::builder(&config(&tmp), provider.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new("s", "/thought 2");

    let (completion, _) = deliver(
        &layer,
        &ctx,
        &CompletionRequest::prompt_only("/thought 2"),
        Completion::text_only(""),
    )
    .await;

    assert_eq!(completion.text, "");
    assert_eq!(provider.calls(), 0);
    assert!(layer.pending().is_empty());
}
