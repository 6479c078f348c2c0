//! End-to-end tests for the detection history pipeline
//!
//! The scripted suites always run. The live test needs a detections API
//! tenant: set FncApiToken (and optionally FncApiDomain / FncAccountUuid),
//! directly or through a `.env` file.

use fncloud_core::{DetectionHistory, FncHttpClientFactory, HistoryWindow};
use fncloud_integration_tests::{
    client::{ClientRequest, RecordingSink, ScriptedClientFactory, Step},
    fixtures::{config, detection, invocation, page, raw_page, unique_detection_uuid},
    skip_if_no_api,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing::Level;

const CHECKPOINT: &str = "2024-01-01T00:00:00Z";

fn history_request() -> serde_json::Value {
    json!({"event_type": "detections", "history": {"checkpoint": CHECKPOINT}})
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_single_page_is_enriched_and_forwarded() {
    let factory = ScriptedClientFactory::new(vec![raw_page(json!({
        "detections": [{"uuid": "a"}],
        "events": {"a": [{"id": 1}]}
    }))])
    .advancing_to(json!("2024-01-01T06:00:00Z"));
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    let checkpoint = history
        .run(invocation(json!({
            "event_type": "Detections",
            "history": {"checkpoint": CHECKPOINT}
        })))
        .await
        .expect("history pull should succeed");

    assert_eq!(checkpoint, json!("2024-01-01T06:00:00Z"));

    let batches = history.sink().batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].event_type, "Detections");
    assert_eq!(
        serde_json::to_value(&batches[0].detections).unwrap(),
        json!([{"uuid": "a", "events": "[{\"id\": 1}]"}])
    );
}

#[tokio::test]
async fn test_every_page_forwarded_in_order() {
    let first: Vec<String> = (0..3).map(|_| unique_detection_uuid()).collect();
    let second: Vec<String> = (0..2).map(|_| unique_detection_uuid()).collect();

    let factory = ScriptedClientFactory::new(vec![
        page(first.iter().map(|u| detection(u)).collect(), 2),
        page(second.iter().map(|u| detection(u)).collect(), 0),
    ]);
    let log = factory.log();
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    history
        .run(invocation(history_request()))
        .await
        .expect("history pull should succeed");

    let batches = history.sink().batches();
    let forwarded: Vec<Vec<String>> = batches
        .iter()
        .map(|b| b.detections.iter().map(|d| d.uuid.clone()).collect())
        .collect();
    assert_eq!(forwarded, vec![first.clone(), second.clone()]);

    for d in &batches[0].detections {
        let events: serde_json::Value = serde_json::from_str(d.events.as_deref().unwrap()).unwrap();
        assert_eq!(events.as_array().unwrap().len(), 2);
        assert_eq!(d.field("status"), Some(&json!("active")));
    }
    for d in &batches[1].detections {
        assert_eq!(d.events.as_deref(), Some("[]"));
    }

    // Two pages plus the call that found the end
    assert_eq!(log.pages_requested(), 3);
}

#[tokio::test]
async fn test_checkpoint_unchanged_when_client_does_not_advance() {
    let factory = ScriptedClientFactory::new(vec![]);
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    let checkpoint = history
        .run(invocation(json!({
            "event_type": "detections",
            "history": {"checkpoint": 1704067200}
        })))
        .await
        .expect("history pull should succeed");

    assert_eq!(checkpoint, json!(1704067200));
    assert!(history.sink().batches().is_empty());
}

#[tokio::test]
async fn test_client_built_from_config() {
    let factory = ScriptedClientFactory::new(vec![]);
    let log = factory.log();
    let history = DetectionHistory::new(
        config(&[
            ("FncApiToken", "token-1"),
            ("FncApiDomain", "icebrg.io"),
            ("FncAccountUuid", "acct-1"),
            ("PullMuted", "false"),
            ("IncludeEvents", "true"),
            ("LogLevel", "warning"),
        ]),
        factory,
        RecordingSink::new(),
    );

    history
        .run(invocation(json!({
            "event_type": "detections",
            "history": {
                "start_date_str": "2023-12-01T00:00:00Z",
                "end_date_str": "2023-12-31T00:00:00Z",
                "checkpoint": CHECKPOINT
            }
        })))
        .await
        .expect("history pull should succeed");

    assert_eq!(
        log.clients.lock().unwrap().clone(),
        vec![ClientRequest {
            name: "fncloud-lambda".into(),
            api_token: Some("token-1".into()),
            domain: Some("icebrg.io".into()),
        }]
    );
    assert_eq!(log.log_levels.lock().unwrap().clone(), vec![Level::WARN]);

    let polls = log.polls.lock().unwrap();
    let (ctx, args) = &polls[0];
    assert_eq!(ctx.checkpoint(), &json!(CHECKPOINT));
    assert_eq!(
        ctx.history(),
        Some(&HistoryWindow {
            start_date: "2023-12-01T00:00:00Z".into(),
            end_date: "2023-12-31T00:00:00Z".into(),
        })
    );
    assert_eq!(args.account_uuid.as_deref(), Some("acct-1"));
    assert_eq!(args.include_pdns, None);
    assert_eq!(args.include_events, Some(true));
    assert_eq!(args.pull_muted_devices, "false");
    assert_eq!(args.polling_delay, 10);
    assert_eq!(args.start_date, "2023-12-01T00:00:00Z");
}

// ============================================================================
// Invalid input
// ============================================================================

#[tokio::test]
async fn test_unsupported_event_type_rejected_immediately() {
    let factory = ScriptedClientFactory::new(vec![page(vec![detection("a")], 1)]);
    let log = factory.log();
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    let err = history
        .run(invocation(json!({"event_type": "logs", "history": {"checkpoint": CHECKPOINT}})))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_input");
    assert_eq!(log.client_count(), 0);
    assert!(history.sink().batches().is_empty());
}

#[tokio::test]
async fn test_empty_history_rejected_before_polling() {
    let factory = ScriptedClientFactory::new(vec![]);
    let log = factory.log();
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    let err = history
        .run(invocation(json!({"event_type": "detections", "history": {}})))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_input");
    assert!(err.to_string().contains("History object"));
    assert_eq!(log.client_count(), 0);
    assert_eq!(log.poll_count(), 0);
}

#[tokio::test]
async fn test_falsy_checkpoint_rejected() {
    for checkpoint in [json!(null), json!(""), json!(0), json!(false)] {
        let history = DetectionHistory::new(
            config(&[]),
            ScriptedClientFactory::new(vec![]),
            RecordingSink::new(),
        );

        let err = history
            .run(invocation(json!({
                "event_type": "detections",
                "history": {"start_date_str": "2024-01-01", "checkpoint": checkpoint}
            })))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("Checkpoint"));
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_client_failure_midway_returns_no_checkpoint() {
    let factory = ScriptedClientFactory::new(vec![
        page(vec![detection("a")], 1),
        Step::Fail("HTTP 429 from /v1/detections".into()),
        page(vec![detection("b")], 1),
    ])
    .advancing_to(json!("2024-02-01T00:00:00Z"));
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::new());

    let err = history
        .run(invocation(history_request()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "fetch_failed");
    assert_eq!(
        err.to_string(),
        "Failure: FetchAndSendDetections: checkpoint: 2024-01-01T00:00:00Z error: Client error: HTTP 429 from /v1/detections"
    );

    let batches = history.sink().batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].detections[0].uuid, "a");
}

#[tokio::test]
async fn test_sink_failure_stops_polling() {
    let factory = ScriptedClientFactory::new(vec![
        page(vec![detection("a")], 0),
        page(vec![detection("b")], 0),
        page(vec![detection("c")], 0),
    ]);
    let log = factory.log();
    let history = DetectionHistory::new(config(&[]), factory, RecordingSink::failing_on(2));

    let err = history
        .run(invocation(history_request()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "fetch_failed");
    assert!(err.to_string().contains("HTTP 503"));
    assert!(err.to_string().contains(CHECKPOINT));
    assert_eq!(log.pages_requested(), 2);
    assert_eq!(history.sink().batches().len(), 1);
}

#[tokio::test]
async fn test_bad_log_level_fails_before_polling() {
    let factory = ScriptedClientFactory::new(vec![page(vec![detection("a")], 0)]);
    let log = factory.log();
    let history = DetectionHistory::new(config(&[("LogLevel", "chatty")]), factory, RecordingSink::new());

    let err = history
        .run(invocation(history_request()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "fetch_failed");
    assert_eq!(log.client_count(), 1);
    assert_eq!(log.poll_count(), 0);
}

// ============================================================================
// Live API
// ============================================================================

#[tokio::test]
async fn test_live_history_pull() {
    skip_if_no_api!();

    let config = fncloud_core::Config::from_env().expect("valid environment config");
    let factory = FncHttpClientFactory::new().expect("http client");
    let history = DetectionHistory::new(config, factory, RecordingSink::new());

    let start = chrono::Utc::now() - chrono::Duration::hours(2);
    let end = chrono::Utc::now() - chrono::Duration::hours(1);
    let checkpoint = history
        .run(invocation(json!({
            "event_type": "detections",
            "history": {
                "start_date_str": start.to_rfc3339(),
                "end_date_str": end.to_rfc3339(),
                "checkpoint": start.to_rfc3339()
            }
        })))
        .await
        .expect("live history pull should succeed");

    assert!(checkpoint.is_string());
    for batch in history.sink().batches() {
        assert!(batch.detections.iter().all(|d| d.events.is_some()));
    }
}
