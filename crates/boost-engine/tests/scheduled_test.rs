//! 定时任务集成测试：序列条件扫描与动态受众刷新

mod common;

use boost_engine::models::{BoostStatus, BoostType, HistoricalEvent, MessageInstructionRef};
use boost_engine::service::BOOST_REDEEMED;
use chrono::{Duration, Utc};
use common::{TestEnv, boost};

const SAVED_AND_KEPT: &str =
    "event_does_not_follow #{SAVING_PAYMENT_SUCCESSFUL::WITHDRAWAL_EVENT_CONFIRMED::30::DAYS}";

fn days_ago(event_type: &str, days: i64) -> HistoricalEvent {
    HistoricalEvent {
        event_type: event_type.to_string(),
        timestamp: Utc::now() - Duration::days(days),
    }
}

fn sequence_env(started_days_ago: i64) -> TestEnv {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_account("acc-2", "user-2");
    let mut kept = boost(
        "boost-keep",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &[SAVED_AND_KEPT])],
    );
    kept.boost_start_time = Utc::now() - Duration::days(started_days_ago);
    kept.boost_end_time = Utc::now() + Duration::days(30);
    env.store.add_boost(kept);
    env.store.join("boost-keep", "acc-1", BoostStatus::Pending);
    env.store.join("boost-keep", "acc-2", BoostStatus::Pending);
    env
}

#[tokio::test]
async fn test_sequence_sweep_redeems_accounts_that_kept_savings() {
    let env = sequence_env(40);
    env.history
        .set("user-1", vec![days_ago("SAVING_PAYMENT_SUCCESSFUL", 35)]);
    env.history.set(
        "user-2",
        vec![
            days_ago("SAVING_PAYMENT_SUCCESSFUL", 38),
            days_ago("WITHDRAWAL_EVENT_CONFIRMED", 20),
        ],
    );

    let report = env.engine.process_time_based_conditions().await.unwrap();

    assert_eq!(report.boosts_processed, 1);
    assert_eq!(report.boosts_triggered, 1);
    assert_eq!(report.accounts_updated, 1);

    assert_eq!(env.store.status_of("boost-keep", "acc-1"), Some(BoostStatus::Redeemed));
    assert_eq!(env.store.status_of("boost-keep", "acc-2"), Some(BoostStatus::Pending));

    let queries = env.history.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].user_ids, vec!["user-1", "user-2"]);

    let calls = env.transfer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0].recipients[0].recipient_id, "acc-1");

    let updates = env.store.status_updates();
    assert_eq!(updates.len(), 1);
    let context = &updates[0].log_context;
    assert_eq!(context.process_type.as_deref(), Some("SCHEDULED"));
    assert_eq!(context.old_status.as_deref(), Some("PENDING"));
    assert_eq!(context.event_history.as_ref().map(Vec::len), Some(1));

    assert_eq!(env.publisher.users_for(BOOST_REDEEMED), vec!["user-1"]);
    assert_eq!(env.store.redeemed_count("boost-keep"), 1);
}

#[tokio::test]
async fn test_sequence_sweep_skips_boost_younger_than_window() {
    let env = sequence_env(1);
    env.history
        .set("user-1", vec![days_ago("SAVING_PAYMENT_SUCCESSFUL", 35)]);

    let report = env.engine.process_time_based_conditions().await.unwrap();

    assert_eq!(report.boosts_processed, 1);
    assert_eq!(report.boosts_triggered, 0);
    assert!(env.history.queries().is_empty());
    assert!(env.store.status_updates().is_empty());
}

#[tokio::test]
async fn test_sequence_sweep_ignores_boosts_without_sequences() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_boost(boost(
        "boost-plain",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &["save_completed_by #{acc-1}"])],
    ));
    env.store.join("boost-plain", "acc-1", BoostStatus::Offered);

    let report = env.engine.process_time_based_conditions().await.unwrap();

    assert_eq!(report.boosts_processed, 0);
    assert!(env.history.queries().is_empty());
}

#[tokio::test]
async fn test_audience_refresh_offers_boost_to_new_members() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_account("acc-2", "user-2");
    let mut dynamic = boost(
        "boost-aud",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &["save_event_greater_than #{50000::HUNDREDTH_CENT::ZAR}"])],
    );
    dynamic.audience_id = Some("aud-1".into());
    dynamic.default_status = Some(BoostStatus::Offered);
    dynamic.message_instructions = vec![MessageInstructionRef {
        status: BoostStatus::Offered,
        account_id: MessageInstructionRef::ALL_ACCOUNTS.into(),
        msg_instruction_id: "msg-offer".into(),
    }];
    env.store.add_boost(dynamic);
    env.store.set_audience("aud-1", &["acc-1", "acc-2"]);
    env.store.join("boost-aud", "acc-1", BoostStatus::Offered);

    let report = env.engine.refresh_dynamic_audience_boosts().await.unwrap();

    assert_eq!(report.boosts_refreshed, 1);
    assert_eq!(report.accounts_added, 1);
    assert_eq!(env.audience.refreshed(), vec!["aud-1"]);
    assert_eq!(env.store.status_of("boost-aud", "acc-2"), Some(BoostStatus::Offered));

    let sent = env.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination_user_id, "user-2");
    assert_eq!(sent[0].instruction_id, "msg-offer");

    assert_eq!(
        env.publisher.event_types(),
        vec!["BOOST_CREATED_SIMPLE", "BOOST_OFFERED_SIMPLE"]
    );
    assert_eq!(env.publisher.users_for("BOOST_OFFERED_SIMPLE"), vec!["user-2"]);
    let (_, _, options) = &env.publisher.published()[0];
    assert_eq!(options.context["boostId"], "boost-aud");
}

#[tokio::test]
async fn test_audience_refresh_without_new_members_is_quiet() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    let mut dynamic = boost("boost-aud", BoostType::Simple, &[]);
    dynamic.audience_id = Some("aud-1".into());
    env.store.add_boost(dynamic);
    env.store.set_audience("aud-1", &["acc-1"]);
    env.store.join("boost-aud", "acc-1", BoostStatus::Offered);

    let report = env.engine.refresh_dynamic_audience_boosts().await.unwrap();

    assert_eq!(report.boosts_refreshed, 1);
    assert_eq!(report.accounts_added, 0);
    assert!(env.messenger.sent().is_empty());
    assert!(env.publisher.event_types().is_empty());
}
