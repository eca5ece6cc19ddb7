//! 奖励金额计算
//!
//! 固定金额直接取 boost_amount；奖池与随机金额统一在 HUNDREDTH_CENT 下计算后换回 boost 单位。

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{BoostError, Result};
use crate::models::{Boost, MoneyUnit, RandomScoreEntry, RewardParameters, RewardType};

/// 奖励计算器
///
/// 配置了随机种子时结果可复现
pub struct RewardCalculator {
    rng: Mutex<StdRng>,
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RewardCalculator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// 本次兑现的金额（boost 单位）
    ///
    /// `pool_size` 为奖池贡献账户数，仅奖池类使用
    pub fn calculate(&self, boost: &Boost, pool_size: usize) -> Result<i64> {
        match boost.reward_parameters.as_ref() {
            Some(params) if params.reward_type == RewardType::Pooled => {
                pooled_amount(boost, params, pool_size)
            }
            Some(params) if params.reward_type == RewardType::Random => {
                self.random_amount(boost, params)
            }
            _ => Ok(boost.boost_amount),
        }
    }

    fn random_amount(&self, boost: &Boost, params: &RewardParameters) -> Result<i64> {
        let total = boost.boost_money().in_hundredth_cents();
        let draw: f64 = self.rng.lock().random();
        let multiplier = (draw * 100.0).round() / 100.0;

        let mut amount = (total as f64 * multiplier).round() as i64;
        if let Some(target) = params.realized_reward_modulo_zero_target.filter(|t| *t > 0) {
            amount -= amount.rem_euclid(target);
        }
        let amount = amount.min(total);

        Ok(MoneyUnit::HundredthCent.convert(amount, boost.boost_unit)?)
    }

    /// 为候选账户生成随机分数，用于随机抽奖
    pub fn random_scores(&self, account_ids: &[String]) -> Vec<RandomScoreEntry> {
        let mut rng = self.rng.lock();
        account_ids
            .iter()
            .map(|account_id| RandomScoreEntry {
                account_id: account_id.clone(),
                score: rng.random(),
            })
            .collect()
    }
}

/// 奖池金额 = 人数 × 每人贡献 × 奖池比例 + 额外奖金
fn pooled_amount(boost: &Boost, params: &RewardParameters, pool_size: usize) -> Result<i64> {
    let contribution = params.pool_contribution_per_user.as_ref().ok_or_else(|| {
        BoostError::Validation(format!("奖池 boost {} 缺少 poolContributionPerUser", boost.boost_id))
    })?;
    let percent = params.percent_pool_as_reward.unwrap_or(0.0);
    let bonus = params
        .additional_bonus_to_pool
        .as_ref()
        .map(|b| b.in_hundredth_cents())
        .unwrap_or(0);

    let pool = pool_size as f64 * contribution.in_hundredth_cents() as f64 * percent;
    let amount = pool.round() as i64 + bonus;

    Ok(MoneyUnit::HundredthCent.convert(amount, boost.boost_unit)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::boost::fixtures::boost_with_redeemed;
    use crate::models::{BoostType, Money};

    fn pooled_boost() -> Boost {
        let mut boost = boost_with_redeemed("boost-pool", BoostType::Game, &["number_taps_in_first_N #{1::10000}"]);
        boost.boost_unit = MoneyUnit::WholeCent;
        boost.reward_parameters = Some(RewardParameters {
            reward_type: RewardType::Pooled,
            pool_contribution_per_user: Some(Money::new(2, MoneyUnit::WholeCurrency, "ZAR")),
            percent_pool_as_reward: Some(0.05),
            additional_bonus_to_pool: Some(Money::new(100, MoneyUnit::WholeCent, "ZAR")),
            ..Default::default()
        });
        boost
    }

    #[test]
    fn test_simple_reward_is_boost_amount() {
        let boost = boost_with_redeemed("boost-1", BoostType::Simple, &["save_completed_by #{ACC1}"]);
        assert_eq!(RewardCalculator::default().calculate(&boost, 0).unwrap(), 100_000);
    }

    #[test]
    fn test_pooled_reward() {
        // 5 人 × 20000 × 0.05 + 10000 = 15000 HUNDREDTH_CENT = 150 WHOLE_CENT
        let amount = RewardCalculator::default().calculate(&pooled_boost(), 5).unwrap();
        assert_eq!(amount, 150);
    }

    #[test]
    fn test_random_reward_bounded_and_reproducible() {
        let mut boost = boost_with_redeemed("boost-r", BoostType::Simple, &["save_completed_by #{ACC1}"]);
        boost.reward_parameters = Some(RewardParameters {
            reward_type: RewardType::Random,
            realized_reward_modulo_zero_target: Some(1000),
            ..Default::default()
        });

        let first = RewardCalculator::new(Some(42));
        let second = RewardCalculator::new(Some(42));
        for _ in 0..20 {
            let a = first.calculate(&boost, 0).unwrap();
            let b = second.calculate(&boost, 0).unwrap();
            assert_eq!(a, b);
            assert!((0..=boost.boost_amount).contains(&a));
            assert_eq!(a % 1000, 0);
        }
    }

    #[test]
    fn test_random_scores_cover_all_accounts() {
        let accounts = vec!["acc-1".to_string(), "acc-2".to_string()];
        let scores = RewardCalculator::new(Some(7)).random_scores(&accounts);
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| (0.0..1.0).contains(&s.score)));
    }
}
