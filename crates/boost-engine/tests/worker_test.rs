//! 定时任务启停测试

mod common;

use std::time::Duration;

use boost_engine::models::{BoostStatus, BoostType};
use boost_engine::worker::{AudienceWorker, ExpiryWorker, SequenceWorker};
use common::{TestEnv, boost};
use tokio::sync::watch;

const PERIOD: Duration = Duration::from_millis(10);

#[tokio::test]
async fn test_workers_run_until_shutdown() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_account("acc-2", "user-2");
    env.store.add_boost(boost(
        "boost-old",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &["save_completed_by #{acc-1}"])],
    ));
    env.store.join("boost-old", "acc-1", BoostStatus::Offered);
    env.store.mark_expired("boost-old");

    let mut dynamic = boost("boost-aud", BoostType::Simple, &[]);
    dynamic.audience_id = Some("aud-1".into());
    env.store.add_boost(dynamic);
    env.store.set_audience("aud-1", &["acc-2"]);

    let (tx, rx) = watch::channel(false);
    let handles = vec![
        tokio::spawn(ExpiryWorker::new(env.engine.expiry(), PERIOD).run(rx.clone())),
        tokio::spawn(SequenceWorker::new(env.engine.sequences(), PERIOD).run(rx.clone())),
        tokio::spawn(AudienceWorker::new(env.engine.audiences(), PERIOD).run(rx)),
    ];

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker 应在关闭信号后退出")
            .unwrap();
    }

    assert_eq!(env.store.status_of("boost-old", "acc-1"), Some(BoostStatus::Expired));
    assert_eq!(env.store.status_of("boost-aud", "acc-2"), Some(BoostStatus::Offered));
    assert!(env.audience.refreshed().len() >= 2);
    // 之后的轮次不会重复加入
    assert_eq!(env.publisher.users_for("BOOST_OFFERED_SIMPLE"), vec!["user-2"]);
}
