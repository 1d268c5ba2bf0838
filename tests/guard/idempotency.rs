use crate::scripted_provider::ScriptedProvider;
use cogito::guard::SkipReason;
use cogito::llm::{Completion, CompletionRequest};
use cogito::{Config, OutboundMessage, Outcome, ReliabilityLayer, RequestContext};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn layer(tmp: &TempDir, provider: Arc<ScriptedProvider>) -> ReliabilityLayer {
    let mut config = Config::default();
    config.data_dir = tmp.path().display().to_string();
    config.retry.delay_ms = 1;
    ReliabilityLayer::builder(&config, provider).build().unwrap()
}

#[tokio::test]
async fn concurrent_triggers_run_one_retry_sequence() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new(&["Final answer: fixed"]).with_latency(Duration::from_millis(20)),
    );
    let layer = layer(&tmp, provider.clone());
    let ctx = RequestContext::new("s", "hi");
    layer
        .before_request(&ctx, &CompletionRequest::prompt_only("hi"))
        .await;

    let broken = Completion::text_only("<THINK>cut off");
    let orchestrator = layer.orchestrator();
    let (first, second) = tokio::join!(
        orchestrator.handle_response(&ctx, &broken),
        orchestrator.handle_response(&ctx, &broken),
    );

    assert_eq!(provider.calls(), 1);
    let outcomes = [first, second];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Recovered { attempts: 1, .. }))
            .count(),
        1
    );
    assert!(outcomes.iter().any(|o| matches!(
        o,
        Outcome::Skipped(SkipReason::Guarded | SkipReason::Untracked)
    )));
}

#[tokio::test]
async fn delivery_stage_does_not_retry_twice() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(&["Final answer: fine now"]));
    let layer = layer(&tmp, provider.clone());
    let ctx = RequestContext::new("s", "hi");
    layer
        .before_request(&ctx, &CompletionRequest::prompt_only("hi"))
        .await;

    let mut message = OutboundMessage::from_host("Error code: 502 upstream");
    layer.before_delivery(&ctx, &mut message).await;
    layer.before_delivery(&ctx, &mut message).await;

    assert_eq!(message.text, "fine now");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn retried_requests_are_independent_copies() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::from_completions(vec![
        Completion::text_only(""),
        Completion::text_only("Final answer: ok"),
    ]));
    let layer = layer(&tmp, provider.clone());
    let ctx = RequestContext::new("s", "hi");
    layer
        .before_request(&ctx, &CompletionRequest::prompt_only("original prompt"))
        .await;

    let mut completion = Completion::text_only("   ");
    layer.after_response(&ctx, &mut completion).await;

    assert_eq!(completion.text, "ok");
    assert_eq!(provider.prompts(), vec!["original prompt", "original prompt"]);
}
