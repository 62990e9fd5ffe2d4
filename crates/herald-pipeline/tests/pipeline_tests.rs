// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of the bulk-send pipeline over a temp database.

use std::time::Duration;

use herald_core::{
    BatchStatus, ErrorCode, HeraldError, JobQueue, RecipientStatus, SendErrorKind,
};
use herald_pipeline::{BatchRunReport, JobOutcome, RetryPolicy, RetryResolution, RunSummary};
use herald_storage::queries::{batches, retries};
use herald_storage::{AbandonedRecovery, NewRetry, ReceiptOutcome, RetryStatus};
use herald_test_utils::{contacts, MockOutcome, TestHarness};

fn phone(i: usize) -> String {
    format!("+1555{i:07}")
}

async fn harness() -> TestHarness {
    let h = TestHarness::new().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    h
}

async fn recover(h: &TestHarness) -> AbandonedRecovery {
    let policy = h.worker.retries().policy();
    herald_pipeline::recover_abandoned(&h.db, h.queue.as_ref(), policy, Duration::ZERO)
        .await
        .unwrap()
}

async fn run_next(h: &TestHarness) -> JobOutcome {
    let job = h.queue.dequeue().await.unwrap().expect("a queued job");
    h.worker.process_job(&job).await.unwrap()
}

#[tokio::test]
async fn hundred_twenty_contacts_plan_three_batches() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(120)).await.unwrap();
    assert_eq!(submission.total_recipients, 120);

    let planned = batches::list_batches(&h.db, &submission.campaign_id)
        .await
        .unwrap();
    let sizes: Vec<u32> = planned.iter().map(|b| b.recipient_count).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert!(planned.iter().all(|b| b.total_batches == 3));
    assert!(planned.iter().all(|b| b.status == BatchStatus::Queued));
    assert_eq!(
        submission.job_ids,
        (0..3)
            .map(|i| format!("{}:{i}", submission.campaign_id))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn over_quota_request_is_rejected_before_any_send() {
    let h = TestHarness::builder().with_daily_limit(10).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    h.consume_quota("t-1", 8).await.unwrap();

    let err = h.submit("t-1", contacts(5)).await.unwrap_err();
    assert!(matches!(
        err,
        HeraldError::QuotaExceeded {
            current: 8,
            limit: 10,
            ..
        }
    ));
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 8);
    assert_eq!(h.sender.call_count().await, 0);
    assert!(h.queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn empty_recipient_list_is_a_validation_error() {
    let h = harness().await;
    let err = h.submit("t-1", vec![]).await.unwrap_err();
    assert!(matches!(err, HeraldError::Validation(_)));
}

#[tokio::test]
async fn duplicate_delivery_runs_the_batch_once() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(2)).await.unwrap();
    h.queue.enqueue(&submission.job_ids[0]).await.unwrap();

    let first = h.queue.dequeue().await.unwrap().unwrap();
    let second = h.queue.dequeue().await.unwrap().unwrap();
    let (a, b) = tokio::join!(h.worker.process_job(&first), h.worker.process_job(&second));
    let outcomes = [a.unwrap(), b.unwrap()];

    let ran = outcomes
        .iter()
        .filter(|o| matches!(o, JobOutcome::Ran { .. }))
        .count();
    assert_eq!(ran, 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        JobOutcome::Ignored(BatchStatus::Processing | BatchStatus::Completed)
    )));
    assert_eq!(h.sender.call_count().await, 2);

    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    assert_eq!(batch.attempts, 1);
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[tokio::test]
async fn clean_run_completes_every_batch() {
    let h = TestHarness::builder().with_batch_size(2).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    let submission = h.submit("t-1", contacts(5)).await.unwrap();

    assert_eq!(h.drain().await.unwrap(), 3);
    let stats = h
        .aggregator
        .campaign_stats(&submission.campaign_id)
        .await
        .unwrap();
    assert_eq!(stats.total_batches, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.failed_messages, 0);
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 5);

    let keys: Vec<String> = h
        .sender
        .calls()
        .await
        .into_iter()
        .map(|r| r.idempotency_key)
        .collect();
    assert_eq!(keys[0], format!("{}:0:0:1", submission.campaign_id));
    assert_eq!(keys[4], format!("{}:2:0:1", submission.campaign_id));
}

#[tokio::test]
async fn three_transient_failures_count_one_failed_message() {
    let h = TestHarness::builder()
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
        })
        .build()
        .await
        .unwrap();
    h.add_tenant("t-1").await.unwrap();
    h.sender
        .fail_times(&phone(0), SendErrorKind::TransientNetwork, 3)
        .await;
    let submission = h.submit("t-1", contacts(2)).await.unwrap();
    let job_id = submission.job_ids[0].clone();

    let outcome = run_next(&h).await;
    assert_eq!(
        outcome,
        JobOutcome::Ran {
            report: BatchRunReport {
                sent: 1,
                failed: 1,
                stopped: 0,
                retrying: 1,
            },
            status: BatchStatus::Processing,
        }
    );

    h.settle_retries(&job_id, 100).await.unwrap();

    let batch = h.batch(&job_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.stats.failed, 1);
    assert_eq!(batch.stats.sent, 1);
    let recipient = &batch.recipients[0];
    assert_eq!(recipient.status, RecipientStatus::Failed);
    assert_eq!(recipient.attempts, 3);
    assert_eq!(recipient.error_code, Some(ErrorCode::RetriesExhausted));
    assert_eq!(h.sender.calls_to(&phone(0)).await, 3);

    let scheduled = retries::list_for_job(&h.db, &job_id).await.unwrap();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].status, RetryStatus::Done);
    assert_eq!(scheduled[1].status, RetryStatus::Exhausted);
    assert!(scheduled[0].next_attempt_at <= scheduled[1].next_attempt_at);

    let keys: Vec<String> = h
        .sender
        .calls()
        .await
        .into_iter()
        .filter(|r| r.phone == phone(0))
        .map(|r| r.idempotency_key)
        .collect();
    assert_eq!(
        keys,
        vec![
            format!("{job_id}:0:1"),
            format!("{job_id}:0:2"),
            format!("{job_id}:0:3"),
        ]
    );
}

#[tokio::test]
async fn successful_retry_moves_the_failure_to_sent() {
    let h = harness().await;
    h.sender
        .fail_times(&phone(1), SendErrorKind::RateLimit, 1)
        .await;
    let submission = h.submit("t-1", contacts(3)).await.unwrap();
    let job_id = submission.job_ids[0].clone();

    h.drain().await.unwrap();
    assert_eq!(h.batch(&job_id).await.unwrap().stats.failed, 1);

    h.settle_retries(&job_id, 50).await.unwrap();
    let batch = h.batch(&job_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.stats.failed, 0);
    assert_eq!(batch.stats.sent, 3);
    assert_eq!(batch.recipients[1].status, RecipientStatus::Sent);
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 3);
}

#[tokio::test]
async fn stale_retry_entry_is_resolved_without_sending() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(1)).await.unwrap();
    let job_id = submission.job_ids[0].clone();
    h.drain().await.unwrap();

    retries::schedule(
        &h.db,
        &NewRetry {
            job_id: job_id.clone(),
            recipient_index: 0,
            contact_id: "contact-0".into(),
            phone: phone(0),
            reason: "TRANSIENT_NETWORK: replayed".into(),
            attempt: 1,
            next_attempt_at: herald_storage::database::now_timestamp(),
        },
    )
    .await
    .unwrap();
    let due = h.worker.retries().claim_due(10, 60).await.unwrap();
    assert_eq!(due.len(), 1);

    let resolution = h.worker.process_retry(&due[0]).await.unwrap();
    assert_eq!(resolution, RetryResolution::Stale);
    assert_eq!(h.sender.call_count().await, 1);
    assert_eq!(h.worker.retries().outstanding(&job_id).await.unwrap(), 0);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let h = harness().await;
    h.sender
        .fail_times(&phone(0), SendErrorKind::InvalidRecipient, 1)
        .await;
    let submission = h.submit("t-1", contacts(2)).await.unwrap();

    let outcome = run_next(&h).await;
    assert!(matches!(
        outcome,
        JobOutcome::Ran {
            status: BatchStatus::Completed,
            ..
        }
    ));
    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    assert_eq!(batch.recipients[0].error_code, Some(ErrorCode::InvalidRecipient));
    assert_eq!(batch.stats.failed, 1);
    assert_eq!(
        h.worker
            .retries()
            .outstanding(&submission.job_ids[0])
            .await
            .unwrap(),
        0
    );
    // The failed send gave its reservation back.
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 1);
}

#[tokio::test]
async fn provider_quota_error_stops_the_run() {
    let h = harness().await;
    h.sender
        .script(&phone(2), [MockOutcome::Fail(SendErrorKind::DailyLimit)])
        .await;
    let submission = h.submit("t-1", contacts(5)).await.unwrap();

    let outcome = run_next(&h).await;
    assert_eq!(
        outcome,
        JobOutcome::Ran {
            report: BatchRunReport {
                sent: 2,
                failed: 1,
                stopped: 2,
                retrying: 0,
            },
            status: BatchStatus::Failed,
        }
    );
    assert_eq!(h.sender.calls_to(&phone(3)).await, 0);
    assert_eq!(h.sender.calls_to(&phone(4)).await, 0);

    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    assert_eq!(batch.error_code, Some(ErrorCode::QuotaExceeded));
    assert!(!batch.can_retry());
    assert_eq!(batch.recipients[2].error_code, Some(ErrorCode::QuotaExceeded));
    assert_eq!(batch.recipients[4].status, RecipientStatus::Skipped);

    let summary = h
        .aggregator
        .run_summary(&submission.campaign_id)
        .await
        .unwrap();
    assert_eq!(
        summary,
        RunSummary {
            sent: 2,
            failed: 1,
            stopped: 2,
        }
    );
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 2);
}

#[tokio::test]
async fn guard_denial_mid_run_skips_the_rest() {
    let h = TestHarness::builder().with_daily_limit(5).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    let submission = h.submit("t-1", contacts(5)).await.unwrap();
    // Another campaign spends quota after the pre-flight check passed.
    h.consume_quota("t-1", 3).await.unwrap();

    let outcome = run_next(&h).await;
    assert_eq!(
        outcome,
        JobOutcome::Ran {
            report: BatchRunReport {
                sent: 2,
                failed: 0,
                stopped: 3,
                retrying: 0,
            },
            status: BatchStatus::Failed,
        }
    );
    assert_eq!(h.sender.call_count().await, 2);
    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    assert_eq!(batch.stats.skipped, 3);
    assert_eq!(h.usage("t-1").await.unwrap().messages_today, 5);
}

#[tokio::test]
async fn quota_stop_halts_the_rest_of_the_campaign() {
    let h = TestHarness::builder().with_batch_size(2).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    h.sender
        .script(&phone(1), [MockOutcome::Fail(SendErrorKind::MonthlyLimit)])
        .await;
    let submission = h.submit("t-1", contacts(6)).await.unwrap();

    h.drain().await.unwrap();
    assert_eq!(h.sender.call_count().await, 2);

    let planned = batches::list_batches(&h.db, &submission.campaign_id)
        .await
        .unwrap();
    assert!(planned.iter().all(|b| b.status == BatchStatus::Failed));
    assert!(planned
        .iter()
        .all(|b| b.error_code == Some(ErrorCode::QuotaExceeded)));

    let stats = h
        .aggregator
        .campaign_stats(&submission.campaign_id)
        .await
        .unwrap();
    assert_eq!((stats.sent, stats.failed_messages, stats.skipped), (1, 1, 4));
}

#[tokio::test]
async fn paused_campaign_waits_for_resume() {
    let h = TestHarness::builder().with_batch_size(2).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    let submission = h.submit("t-1", contacts(4)).await.unwrap();

    assert_eq!(h.service.pause(&submission.campaign_id).await.unwrap(), 2);
    h.drain().await.unwrap();
    assert_eq!(h.sender.call_count().await, 0);
    let stats = h
        .aggregator
        .campaign_stats(&submission.campaign_id)
        .await
        .unwrap();
    assert_eq!(stats.paused, 2);

    assert_eq!(h.service.resume(&submission.campaign_id).await.unwrap(), 2);
    h.drain().await.unwrap();
    assert_eq!(h.sender.call_count().await, 4);
    let stats = h
        .aggregator
        .campaign_stats(&submission.campaign_id)
        .await
        .unwrap();
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn receipts_advance_delivery_counters() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(1)).await.unwrap();
    h.drain().await.unwrap();

    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    let message_id = batch.recipients[0].message_id.clone().unwrap();
    assert_eq!(
        h.service
            .record_receipt(&message_id, RecipientStatus::Read)
            .await
            .unwrap(),
        ReceiptOutcome::Applied
    );
    assert_eq!(
        h.service
            .record_receipt(&message_id, RecipientStatus::Delivered)
            .await
            .unwrap(),
        ReceiptOutcome::Ignored
    );

    let batch = h.batch(&submission.job_ids[0]).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!((batch.stats.delivered, batch.stats.read), (1, 1));
    assert!(h
        .service
        .record_receipt(&message_id, RecipientStatus::Failed)
        .await
        .is_err());
}

#[tokio::test]
async fn rollup_reruns_replace_the_day() {
    let h = harness().await;
    h.submit("t-1", contacts(3)).await.unwrap();
    h.drain().await.unwrap();

    let today = chrono::Utc::now().date_naive();
    let first = h.aggregator.rollup_daily(today).await.unwrap();
    let second = h.aggregator.rollup_daily(today).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].messages_sent, 3);
    assert_eq!(second[0].campaigns_initiated, 1);
    assert!((second[0].estimated_cost - 0.015).abs() < 1e-9);

    let stored = herald_storage::queries::summaries::list_for_date(
        &h.db,
        &today.format("%Y-%m-%d").to_string(),
    )
    .await
    .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn abandoned_batch_is_recovered_without_resending() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(3)).await.unwrap();
    let job_id = submission.job_ids[0].clone();

    // A worker claims the batch, sends to the first recipient, then dies.
    let job = h.queue.dequeue().await.unwrap().unwrap();
    assert!(matches!(
        batches::claim_batch(&h.db, &job_id).await.unwrap(),
        herald_storage::ClaimOutcome::Claimed(_)
    ));
    batches::record_recipient(
        &h.db,
        &job_id,
        0,
        herald_storage::RecipientOutcome::Sent {
            message_id: "wamid.before-crash".into(),
        },
    )
    .await
    .unwrap();
    h.queue.ack(&job).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let recovery = recover(&h).await;
    assert_eq!(recovery.reclaimable, vec![job_id.clone()]);

    h.drain().await.unwrap();
    let batch = h.batch(&job_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.attempts, 2);
    assert_eq!(batch.stats.sent, 3);
    assert_eq!(h.sender.calls_to(&phone(0)).await, 0);
}

#[tokio::test]
async fn failure_left_without_its_retry_is_rescheduled_on_recovery() {
    let h = harness().await;
    let submission = h.submit("t-1", contacts(1)).await.unwrap();
    let job_id = submission.job_ids[0].clone();

    // A worker records a transient failure, then dies before the retry row
    // is written.
    let job = h.queue.dequeue().await.unwrap().unwrap();
    assert!(matches!(
        batches::claim_batch(&h.db, &job_id).await.unwrap(),
        herald_storage::ClaimOutcome::Claimed(_)
    ));
    batches::record_recipient(
        &h.db,
        &job_id,
        0,
        herald_storage::RecipientOutcome::Failed {
            error: "TRANSIENT_NETWORK: connection reset".into(),
            code: Some(ErrorCode::TransientNetwork),
        },
    )
    .await
    .unwrap();
    h.queue.ack(&job).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let recovery = recover(&h).await;
    assert_eq!(recovery.rescheduled, 1);
    assert!(recovery.reclaimable.is_empty());
    assert_eq!(h.worker.retries().outstanding(&job_id).await.unwrap(), 1);

    h.drain().await.unwrap();
    h.settle_retries(&job_id, 50).await.unwrap();

    let batch = h.batch(&job_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!((batch.stats.sent, batch.stats.failed), (1, 0));
    assert_eq!(batch.recipients[0].attempts, 2);
    let calls = h.sender.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].idempotency_key, format!("{job_id}:0:2"));
}

#[tokio::test]
async fn every_failed_attempt_leaves_a_retry_or_a_final_code() {
    let h = harness().await;
    h.sender
        .fail_times(&phone(0), SendErrorKind::TransientNetwork, 2)
        .await;
    let submission = h.submit("t-1", contacts(1)).await.unwrap();
    let job_id = submission.job_ids[0].clone();

    h.drain().await.unwrap();
    let pending = retries::list_for_job(&h.db, &job_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!((pending[0].attempt, pending[0].status), (1, RetryStatus::Pending));

    // The failed retry closes its own entry and opens the next one.
    let due = h.worker.retries().claim_due(10, 60).await.unwrap();
    let resolution = h.worker.process_retry(&due[0]).await.unwrap();
    assert_eq!(resolution, RetryResolution::Rescheduled);
    let rows = retries::list_for_job(&h.db, &job_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].attempt, rows[0].status), (1, RetryStatus::Done));
    assert_eq!((rows[1].attempt, rows[1].status), (2, RetryStatus::Pending));
    assert_eq!(h.batch(&job_id).await.unwrap().recipients[0].attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn pacing_spaces_sends_within_a_batch() {
    let pacing = Duration::from_millis(250);
    let h = TestHarness::builder().with_pacing(pacing).build().await.unwrap();
    h.add_tenant("t-1").await.unwrap();
    h.submit("t-1", contacts(3)).await.unwrap();

    let started = tokio::time::Instant::now();
    run_next(&h).await;
    let elapsed = started.elapsed();

    let times = h.sender.call_times().await;
    assert_eq!(times.len(), 3);
    assert!(times[0] - started < pacing, "first send must not wait");
    assert!(times[1] - times[0] >= pacing);
    assert!(times[2] - times[1] >= pacing);
    assert!(elapsed >= pacing * 2, "{elapsed:?}");
}

#[tokio::test]
async fn stats_of_unknown_campaign_is_not_found() {
    let h = harness().await;
    let err = h.aggregator.campaign_stats("missing").await.unwrap_err();
    assert!(matches!(err, HeraldError::NotFound { .. }));
}
