//! 到期处理集成测试

mod common;

use boost_engine::models::{BoostStatus, BoostType, LogType, TransactionType};
use boost_engine::service::{BOOST_REDEEMED, BOOST_TOURNAMENT_WON, ExpiryKind};
use common::{TestEnv, boost, game_log};

fn tournament_env() -> TestEnv {
    let env = TestEnv::new();
    for i in 1..=4 {
        env.store.add_account(&format!("acc-{i}"), &format!("user-{i}"));
    }
    env.store.add_boost(boost(
        "boost-game",
        BoostType::Game,
        &[
            (BoostStatus::Pending, &["number_taps_greater_than #{0::10000}"]),
            (BoostStatus::Redeemed, &["number_taps_in_first_N #{1::10000}"]),
        ],
    ));
    for i in 1..=3 {
        env.store.join("boost-game", &format!("acc-{i}"), BoostStatus::Pending);
    }
    env.store.join("boost-game", "acc-4", BoostStatus::Offered);

    env.store.add_log(game_log("boost-game", "acc-1", 20, 9000));
    env.store.add_log(game_log("boost-game", "acc-2", 35, 9500));
    env.store.add_log(game_log("boost-game", "acc-3", 10, 8000));
    // 同一账户的较差成绩不影响排名
    env.store.add_log(game_log("boost-game", "acc-1", 5, 9000));
    env
}

#[tokio::test]
async fn test_tournament_expiry_pays_the_winner_only() {
    let env = tournament_env();
    env.store.mark_expired("boost-game");

    let report = env.engine.check_for_boosts_to_expire().await.unwrap();

    assert_eq!(report.boosts_expired, 1);
    assert_eq!(report.accounts_redeemed, 1);
    assert_eq!(report.accounts_expired, 3);
    assert!(report.failed_boost_ids.is_empty());

    assert_eq!(env.store.status_of("boost-game", "acc-2"), Some(BoostStatus::Redeemed));
    for loser in ["acc-1", "acc-3", "acc-4"] {
        assert_eq!(env.store.status_of("boost-game", loser), Some(BoostStatus::Expired));
    }

    let calls = env.transfer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0].recipients.len(), 1);
    assert_eq!(calls[0][0].recipients[0].recipient_id, "acc-2");

    assert_eq!(env.publisher.users_for(BOOST_TOURNAMENT_WON), vec!["user-2"]);
    assert_eq!(env.publisher.users_for(BOOST_REDEEMED), vec!["user-2"]);
    assert_eq!(
        env.publisher.users_for("BOOST_EXPIRED"),
        vec!["user-1", "user-3", "user-4"]
    );
    assert_eq!(env.store.redeemed_count("boost-game"), 1);
}

#[tokio::test]
async fn test_tournament_writes_outcome_per_responder() {
    let env = tournament_env();

    env.engine.expiry().handle_expired_boost("boost-game").await.unwrap();

    let outcomes = env.store.logs_of("boost-game", LogType::GameOutcome);
    assert_eq!(outcomes.len(), 3);
    let ranking = |account: &str| {
        outcomes
            .iter()
            .find(|l| l.account_id == account)
            .and_then(|l| l.context_i64("ranking"))
    };
    assert_eq!(ranking("acc-2"), Some(1));
    assert_eq!(ranking("acc-1"), Some(2));
    assert_eq!(ranking("acc-3"), Some(3));
    assert_eq!(outcomes[0].context_f64("topScore"), Some(35.0));
}

#[tokio::test]
async fn test_plain_boost_expiry_skips_finished_accounts() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_account("acc-2", "user-2");
    env.store.add_boost(boost(
        "boost-plain",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &["save_completed_by #{acc-1}"])],
    ));
    env.store.join("boost-plain", "acc-1", BoostStatus::Offered);
    env.store.join("boost-plain", "acc-2", BoostStatus::Redeemed);

    let outcome = env.engine.expiry().handle_expired_boost("boost-plain").await.unwrap();

    assert_eq!(outcome.kind, ExpiryKind::Simple);
    assert_eq!(outcome.accounts_expired, 1);
    assert_eq!(env.store.status_of("boost-plain", "acc-1"), Some(BoostStatus::Expired));
    assert_eq!(env.store.status_of("boost-plain", "acc-2"), Some(BoostStatus::Redeemed));
    assert!(env.transfer.calls().is_empty());
    assert_eq!(env.publisher.users_for("BOOST_EXPIRED"), vec!["user-1"]);
}

#[tokio::test]
async fn test_game_without_responses_just_expires() {
    let env = TestEnv::new();
    env.store.add_account("acc-1", "user-1");
    env.store.add_boost(boost(
        "boost-quiet",
        BoostType::Game,
        &[(BoostStatus::Redeemed, &["number_taps_in_first_N #{1::10000}"])],
    ));
    env.store.join("boost-quiet", "acc-1", BoostStatus::Offered);

    let outcome = env.engine.expiry().handle_expired_boost("boost-quiet").await.unwrap();

    assert_eq!(outcome.kind, ExpiryKind::Simple);
    assert_eq!(outcome.accounts_redeemed, 0);
    assert!(env.store.logs_of("boost-quiet", LogType::GameOutcome).is_empty());
}

#[tokio::test]
async fn test_random_award_picks_exactly_n() {
    let env = TestEnv::new();
    for i in 1..=3 {
        env.store.add_account(&format!("acc-{i}"), &format!("user-{i}"));
    }
    env.store.add_boost(boost(
        "boost-lucky",
        BoostType::Simple,
        &[(BoostStatus::Redeemed, &["randomly_chosen_first_N #{1}"])],
    ));
    for i in 1..=3 {
        env.store.join("boost-lucky", &format!("acc-{i}"), BoostStatus::Pending);
    }

    let outcome = env.engine.expiry().handle_expired_boost("boost-lucky").await.unwrap();

    assert_eq!(outcome.kind, ExpiryKind::RandomAward);
    assert_eq!(outcome.accounts_redeemed, 1);
    assert_eq!(outcome.accounts_expired, 2);

    let statuses: Vec<BoostStatus> = (1..=3)
        .filter_map(|i| env.store.status_of("boost-lucky", &format!("acc-{i}")))
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == BoostStatus::Redeemed).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == BoostStatus::Expired).count(), 2);

    let calls = env.transfer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0].transaction_type, TransactionType::BoostRedemption);
}

#[tokio::test]
async fn test_sweep_reports_missing_boost() {
    let env = TestEnv::new();
    env.store.mark_expired("boost-gone");

    let report = env.engine.check_for_boosts_to_expire().await.unwrap();

    assert_eq!(report.boosts_expired, 0);
    assert_eq!(report.failed_boost_ids, vec!["boost-gone"]);
}
