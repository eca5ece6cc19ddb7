//! 金额值类型
//!
//! 上下游以 `amount::UNIT::CURRENCY` 字符串传递金额，这里解析为强类型并提供单位换算。
//! 所有比较都先换算到 HUNDREDTH_CENT。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MoneyError;

/// 金额单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoneyUnit {
    HundredthCent,
    WholeCent,
    WholeCurrency,
}

impl MoneyUnit {
    /// 相对 HUNDREDTH_CENT 的倍数
    pub fn multiplier(&self) -> i64 {
        match self {
            Self::HundredthCent => 1,
            Self::WholeCent => 100,
            Self::WholeCurrency => 10_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HundredthCent => "HUNDREDTH_CENT",
            Self::WholeCent => "WHOLE_CENT",
            Self::WholeCurrency => "WHOLE_CURRENCY",
        }
    }

    /// 把 `amount` 从本单位换算到 `target`，四舍五入（.5 向正无穷）
    pub fn convert(&self, amount: i64, target: MoneyUnit) -> Result<i64, MoneyError> {
        let base = amount
            .checked_mul(self.multiplier())
            .ok_or_else(|| MoneyError::Overflow(format!("{amount} {}", self.as_str())))?;
        Ok(round_div(base, target.multiplier()))
    }
}

impl fmt::Display for MoneyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoneyUnit {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HUNDREDTH_CENT" => Ok(Self::HundredthCent),
            "WHOLE_CENT" => Ok(Self::WholeCent),
            "WHOLE_CURRENCY" => Ok(Self::WholeCurrency),
            other => Err(MoneyError::Unit(other.to_string())),
        }
    }
}

fn round_div(value: i64, divisor: i64) -> i64 {
    if divisor == 1 {
        return value;
    }
    // floor(v/d + 0.5)，先取商和余数，不对 v 做乘法
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) * 2 >= divisor {
        quotient + 1
    } else {
        quotient
    }
}

/// 带单位和币种的金额
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money {
    pub amount: i64,
    pub unit: MoneyUnit,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, unit: MoneyUnit, currency: impl Into<String>) -> Self {
        Self {
            amount,
            unit,
            currency: currency.into(),
        }
    }

    /// 解析 `amount::unit::currency`
    pub fn parse(value: &str) -> Result<Self, MoneyError> {
        let parts: Vec<&str> = value.split("::").collect();
        let [amount, unit, currency] = parts.as_slice() else {
            return Err(MoneyError::Format(value.to_string()));
        };

        let amount = amount
            .trim()
            .parse::<i64>()
            .map_err(|_| MoneyError::Amount(amount.to_string()))?;
        let unit = unit.parse::<MoneyUnit>()?;

        if currency.is_empty() {
            return Err(MoneyError::Format(value.to_string()));
        }

        Ok(Self::new(amount, unit, *currency))
    }

    /// 换算为 HUNDREDTH_CENT 数值
    pub fn in_hundredth_cents(&self) -> i64 {
        self.amount.saturating_mul(self.unit.multiplier())
    }

    /// 换算到指定单位
    pub fn to_unit(&self, unit: MoneyUnit) -> Result<Money, MoneyError> {
        Ok(Self::new(
            self.unit.convert(self.amount, unit)?,
            unit,
            self.currency.clone(),
        ))
    }

    pub fn negate(&self) -> Money {
        Self::new(-self.amount, self.unit, self.currency.clone())
    }

    pub fn same_currency(&self, other: &Money) -> bool {
        self.currency == other.currency
    }

    /// 用于消息模板的整数货币金额，如 "ZAR 20"
    pub fn format_whole_currency(&self) -> String {
        let whole = round_div(self.in_hundredth_cents(), MoneyUnit::WholeCurrency.multiplier());
        format!("{} {}", self.currency, whole)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.amount, self.unit, self.currency)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        money.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let money = Money::parse("5000::HUNDREDTH_CENT::USD").unwrap();
        assert_eq!(money.amount, 5000);
        assert_eq!(money.unit, MoneyUnit::HundredthCent);
        assert_eq!(money.currency, "USD");
        assert_eq!(money.to_string(), "5000::HUNDREDTH_CENT::USD");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Money::parse("5000::USD"), Err(MoneyError::Format(_))));
        assert!(matches!(
            Money::parse("abc::WHOLE_CENT::ZAR"),
            Err(MoneyError::Amount(_))
        ));
        assert!(matches!(
            Money::parse("10::WHOLE_DOLLAR::ZAR"),
            Err(MoneyError::Unit(_))
        ));
        assert!(matches!(Money::parse("10::WHOLE_CENT::"), Err(MoneyError::Format(_))));
    }

    #[test]
    fn test_normalisation_across_units() {
        let a = Money::parse("1::WHOLE_CURRENCY::ZAR").unwrap();
        let b = Money::parse("100::WHOLE_CENT::ZAR").unwrap();
        let c = Money::parse("10000::HUNDREDTH_CENT::ZAR").unwrap();
        assert_eq!(a.in_hundredth_cents(), b.in_hundredth_cents());
        assert_eq!(b.in_hundredth_cents(), c.in_hundredth_cents());
    }

    #[test]
    fn test_convert_rounds_half_up() {
        assert_eq!(MoneyUnit::HundredthCent.convert(150, MoneyUnit::WholeCent).unwrap(), 2);
        assert_eq!(MoneyUnit::HundredthCent.convert(149, MoneyUnit::WholeCent).unwrap(), 1);
        assert_eq!(MoneyUnit::HundredthCent.convert(-150, MoneyUnit::WholeCent).unwrap(), -1);
        assert_eq!(
            MoneyUnit::WholeCurrency.convert(20, MoneyUnit::HundredthCent).unwrap(),
            200_000
        );
    }

    #[test]
    fn test_convert_overflow() {
        assert!(matches!(
            MoneyUnit::WholeCurrency.convert(i64::MAX, MoneyUnit::HundredthCent),
            Err(MoneyError::Overflow(_))
        ));
    }

    #[test]
    fn test_rounding_near_i64_limits() {
        assert_eq!(
            MoneyUnit::HundredthCent.convert(i64::MAX, MoneyUnit::WholeCurrency).unwrap(),
            922_337_203_685_478
        );
        assert_eq!(
            MoneyUnit::HundredthCent.convert(i64::MIN, MoneyUnit::WholeCurrency).unwrap(),
            -922_337_203_685_478
        );
        let huge = Money::new(i64::MAX, MoneyUnit::WholeCurrency, "ZAR");
        assert_eq!(huge.format_whole_currency(), "ZAR 922337203685478");
    }

    #[test]
    fn test_serde_as_string() {
        let money: Money = serde_json::from_str("\"20::WHOLE_CURRENCY::ZAR\"").unwrap();
        assert_eq!(money.to_unit(MoneyUnit::WholeCent).unwrap().amount, 2000);
        assert_eq!(
            serde_json::to_string(&money.negate()).unwrap(),
            "\"-20::WHOLE_CURRENCY::ZAR\""
        );
        assert_eq!(money.format_whole_currency(), "ZAR 20");
    }
}
