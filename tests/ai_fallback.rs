mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use compliance_unify::clients::RateLimiter;
use compliance_unify::model::{FallbackReason, Method, MethodKind};
use compliance_unify::{FrameworkSelection, UnifyError};

use common::{Behavior, ScriptedClient, ai_engine, memory_cache, sample_source};

fn selection() -> FrameworkSelection {
    FrameworkSelection::new()
        .with("iso", None)
        .with("cis", None)
        .with("nis2", None)
}

fn fallback_reasons(generation: &compliance_unify::Generation) -> Vec<FallbackReason> {
    generation
        .contents()
        .filter_map(|c| c.consolidated.as_ref())
        .map(|r| match &r.method {
            Method::Fallback { reason, .. } => *reason,
            Method::Ai { .. } => panic!("expected fallback, got AI for {}", r.text),
        })
        .collect()
}

#[tokio::test]
async fn test_rate_limit_falls_back_without_retry() {
    let client = ScriptedClient::new(Behavior::RateLimited);
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_secs(5),
    );
    let generation = engine.generate(&selection()).await.unwrap();

    let reasons = fallback_reasons(&generation);
    assert!(!reasons.is_empty());
    assert!(reasons.iter().all(|r| *r == FallbackReason::RateLimited));
    assert_eq!(client.calls(), reasons.len(), "one call per non-empty category");
    assert_eq!(generation.fatal().count(), 0);
}

#[tokio::test]
async fn test_api_error_falls_back() {
    let client = ScriptedClient::new(Behavior::ServerError);
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_secs(5),
    );
    let generation = engine.generate(&selection()).await.unwrap();
    let reasons = fallback_reasons(&generation);
    assert!(reasons.iter().all(|r| *r == FallbackReason::ApiError));
    assert_eq!(client.calls(), reasons.len());
}

#[tokio::test]
async fn test_timeout_triggers_immediate_fallback() {
    let client = ScriptedClient::new(Behavior::Hang(Duration::from_secs(10)));
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_millis(50),
    );
    let started = std::time::Instant::now();
    let generation = engine
        .generate(&FrameworkSelection::new().with("nis2", None))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    let reasons = fallback_reasons(&generation);
    assert!(!reasons.is_empty());
    assert!(reasons.iter().all(|r| *r == FallbackReason::Timeout));
}

#[tokio::test]
async fn test_rejected_ai_output_is_replaced_by_fallback() {
    let client = ScriptedClient::new(Behavior::Canned("  \n".to_string()));
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_secs(5),
    );
    let generation = engine.generate(&selection()).await.unwrap();
    let reasons = fallback_reasons(&generation);
    assert!(!reasons.is_empty());
    assert!(reasons.iter().all(|r| *r == FallbackReason::ValidationRejected));
    assert_eq!(generation.fatal().count(), 0);

    let backup = generation
        .content(&compliance_unify::CategoryId::new("business_continuity"))
        .unwrap();
    assert!(backup.text().unwrap().contains("quarterly"));
    assert_eq!(backup.statistics.method, Some(MethodKind::Fallback));
}

#[tokio::test]
async fn test_ai_draft_missing_a_detail_is_replaced_by_fallback() {
    let client = ScriptedClient::new(Behavior::EchoReplacing {
        from: "within 24 hours".to_string(),
        to: "promptly".to_string(),
    });
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_secs(5),
    );
    let generation = engine
        .generate(&FrameworkSelection::new().with("nis2", None))
        .await
        .unwrap();

    let incidents = generation
        .content(&compliance_unify::CategoryId::new("incident_response"))
        .unwrap();
    let result = incidents.consolidated.as_ref().unwrap();
    assert!(matches!(
        result.method,
        Method::Fallback {
            reason: FallbackReason::ValidationRejected,
            ..
        }
    ));
    assert!(result.text.contains("24 hours"));
    assert!(result.text.contains("CSIRT"));

    let ai_count = generation
        .contents()
        .filter(|c| c.statistics.method == Some(MethodKind::Ai))
        .count();
    assert!(ai_count >= 1, "untouched categories keep the AI draft");
}

#[tokio::test]
async fn test_cancellation_stops_at_category_boundary() {
    let token = CancellationToken::new();
    let client = ScriptedClient::new(Behavior::CancelAfterFirst(token.clone()));
    let engine = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        RateLimiter::unlimited(),
        Duration::from_secs(5),
    );
    let err = engine
        .generate_with_cancel(&selection(), &token)
        .await
        .unwrap_err();
    match err {
        UnifyError::Cancelled { completed } => assert!(completed >= 1),
        other => panic!("expected cancellation, got {other}"),
    }
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_shared_limiter_spaces_calls_across_engines() {
    let interval = Duration::from_millis(40);
    let limiter = RateLimiter::new(interval);
    let client = ScriptedClient::new(Behavior::Echo);
    let one = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        limiter.clone(),
        Duration::from_secs(5),
    );
    let two = ai_engine(
        sample_source(),
        memory_cache(),
        client.clone(),
        limiter,
        Duration::from_secs(5),
    );

    let sel = FrameworkSelection::new().with("nis2", None);
    let (a, b) = tokio::join!(one.generate(&sel), two.generate(&sel));
    a.unwrap();
    b.unwrap();

    let mut times = client.call_times();
    times.sort();
    assert!(times.len() >= 2);
    for pair in times.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= interval - Duration::from_millis(10),
            "calls too close: {:?}",
            pair[1].duration_since(pair[0])
        );
    }
}
