//! Pipeline behavior: phase transitions, delivery routing, failures,
//! cancellation mid-phase, and progress throttling.

use crate::config::Config;
use crate::external::{Destination, Notification};
use crate::scheduler::test_helpers::{
    UploadBehavior, create_test_scheduler, request, wait_for_state,
};
use crate::types::{Event, TaskState, UserId};
use std::time::Duration;

#[tokio::test]
async fn fetch_failure_marks_the_task_failed_with_reason() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;
    harness.fetcher.fail("https://a/1", "HTTP 403 from origin");
    wait_for_state(&harness.scheduler, &id, TaskState::Failed).await;

    let status = harness.scheduler.status(user).await;
    let info = status.iter().find(|t| t.id == id).unwrap();
    assert_eq!(info.state, TaskState::Failed);
    assert!(
        info.failure_reason.as_deref().unwrap().contains("HTTP 403"),
        "captured reason: {:?}",
        info.failure_reason
    );

    for _ in 0..400 {
        if harness
            .notifier
            .sent_to(user)
            .iter()
            .any(|n| matches!(n, Notification::Failed { id: nid, reason } if *nid == id && reason.contains("HTTP 403")))
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no failure notification with the captured reason");
}

#[tokio::test]
async fn small_artifact_is_delivered_to_chat() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;
    harness.fetcher.complete("https://a/1", 50 * 1024 * 1024);
    wait_for_state(&harness.scheduler, &id, TaskState::Completed).await;

    let records = harness.uploader.recorded();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].destination, Destination::Chat);
    assert_eq!(records[0].size_bytes, 50 * 1024 * 1024);
    assert_eq!(records[0].owner, user);
}

#[tokio::test]
async fn oversize_artifact_is_routed_to_external_storage() {
    let harness = create_test_scheduler(Config::default());

    let id = harness
        .scheduler
        .submit(UserId(1), request("https://a/big"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/big").await;
    // Just over the 2 GiB direct-delivery ceiling.
    harness
        .fetcher
        .complete("https://a/big", 2 * 1024 * 1024 * 1024 + 1);
    wait_for_state(&harness.scheduler, &id, TaskState::Completed).await;

    let records = harness.uploader.recorded();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].destination, Destination::ExternalStorage);
}

#[tokio::test]
async fn artifact_exactly_at_the_limit_goes_to_chat() {
    let harness = create_test_scheduler(Config::default());

    let id = harness
        .scheduler
        .submit(UserId(1), request("https://a/edge"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/edge").await;
    harness
        .fetcher
        .complete("https://a/edge", 2 * 1024 * 1024 * 1024);
    wait_for_state(&harness.scheduler, &id, TaskState::Completed).await;

    assert_eq!(
        harness.uploader.recorded()[0].destination,
        Destination::Chat
    );
}

#[tokio::test]
async fn upload_failure_marks_the_task_failed() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);
    harness
        .uploader
        .set_behavior(UploadBehavior::Fail("storage quota exceeded".to_string()));

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;
    harness.fetcher.complete("https://a/1", 1_000);
    wait_for_state(&harness.scheduler, &id, TaskState::Failed).await;

    let status = harness.scheduler.status(user).await;
    let info = status.iter().find(|t| t.id == id).unwrap();
    assert!(
        info.failure_reason
            .as_deref()
            .unwrap()
            .contains("storage quota exceeded")
    );
}

#[tokio::test]
async fn cancel_during_upload_cancels_and_frees_the_slot() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);
    harness.uploader.set_behavior(UploadBehavior::Hold);

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;
    harness.fetcher.complete("https://a/1", 1_000);
    wait_for_state(&harness.scheduler, &id, TaskState::Uploading).await;

    harness.scheduler.cancel(&id).await.unwrap();
    wait_for_state(&harness.scheduler, &id, TaskState::Cancelled).await;

    assert_eq!(harness.scheduler.queue_stats().await.active, 0);
    assert!(
        harness.uploader.recorded().is_empty(),
        "the held upload never finished"
    );
}

#[tokio::test]
async fn lifecycle_events_arrive_in_order() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);
    let mut events = harness.scheduler.subscribe();

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;
    harness.fetcher.complete("https://a/1", 1_000);
    wait_for_state(&harness.scheduler, &id, TaskState::Completed).await;

    let mut order = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        match event {
            Event::Started { id: eid, .. } if eid == id => order.push("started"),
            Event::Uploading { id: eid, .. } if eid == id => order.push("uploading"),
            Event::Completed { id: eid, .. } if eid == id => order.push("completed"),
            _ => {}
        }
    }
    assert_eq!(order, vec!["started", "uploading", "completed"]);
}

#[tokio::test]
async fn rapid_progress_samples_are_throttled_to_one_update() {
    let harness = create_test_scheduler(Config::default());
    let user = UserId(1);
    let mut events = harness.scheduler.subscribe();

    let id = harness
        .scheduler
        .submit(user, request("https://a/1"))
        .await
        .unwrap();
    harness.fetcher.wait_in_flight("https://a/1").await;

    // The first sample emits; wait for it so the pump is known to be caught
    // up before the burst.
    harness.fetcher.push_progress("https://a/1", 100, 1_000).await;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("first progress event within 2s")
            .unwrap();
        if matches!(event, Event::Progress { .. }) {
            break;
        }
    }

    // A burst well inside the 2s minimum interval: all suppressed.
    for done in [200u64, 300, 400, 500] {
        harness.fetcher.push_progress("https://a/1", done, 1_000).await;
    }
    harness.fetcher.complete("https://a/1", 1_000);
    wait_for_state(&harness.scheduler, &id, TaskState::Completed).await;

    // Nothing from the burst made it past the throttle.
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        assert!(
            !matches!(event, Event::Progress { .. }),
            "burst sample leaked through the throttle: {event:?}"
        );
    }

    let progress_notifications = harness
        .notifier
        .sent_to(user)
        .iter()
        .filter(|n| matches!(n, Notification::Progress { .. }))
        .count();
    assert_eq!(
        progress_notifications, 1,
        "the notification sink sees the same throttled stream"
    );
}
