//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象，用于封装不可变的概念性值与校验逻辑。
//!
use crate::error::{DomainError, DomainResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 值对象抽象
pub trait ValueObject {
    /// 业务校验失败时的错误类型
    type Error;

    /// 创建值对象时进行验证
    fn validate(&self) -> Result<(), Self::Error>;
}

/// 版本号（用于乐观锁和并发控制）
///
/// 新建记录的版本为 0，此后每次成功提交恰好加一。
///
/// # 示例
///
/// ```
/// use order_domain::value_object::Version;
///
/// let v1 = Version::new();
/// assert_eq!(v1.value(), 0);
/// assert!(v1.is_new());
///
/// let v2 = v1.next();
/// assert_eq!(v2.value(), 1);
/// assert!(v2 > v1);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// 创建初始版本（版本号为 0）
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    /// 获取下一个版本号
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// 检查是否为初始版本
    pub fn is_new(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self::from_value(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.value()
    }
}

/// 订单数量，恒为正
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    pub fn new(value: i32) -> DomainResult<Self> {
        let quantity = Self(value);
        quantity.validate()?;
        Ok(quantity)
    }

    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl ValueObject for Quantity {
    type Error = DomainError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.0 <= 0 {
            return Err(DomainError::invalid_argument(format!(
                "quantity must be positive, got {}",
                self.0
            )));
        }
        Ok(())
    }
}

impl TryFrom<i32> for Quantity {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        quantity.value()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 订单价格：定点小数，精度 10、标度 2，非负
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    pub const PRECISION: u32 = 10;
    pub const SCALE: u32 = 2;

    pub fn new(value: Decimal) -> DomainResult<Self> {
        let price = Self(value);
        price.validate()?;
        Ok(price)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub const fn value(&self) -> Decimal {
        self.0
    }

    fn max_value() -> Decimal {
        // 99999999.99
        Decimal::new(9_999_999_999, Self::SCALE)
    }
}

impl ValueObject for Price {
    type Error = DomainError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            return Err(DomainError::invalid_argument(format!(
                "price must not be negative, got {}",
                self.0
            )));
        }
        if self.0.normalize().scale() > Self::SCALE {
            return Err(DomainError::invalid_argument(format!(
                "price supports at most {} fractional digits, got {}",
                Self::SCALE,
                self.0
            )));
        }
        if self.0 > Self::max_value() {
            return Err(DomainError::invalid_argument(format!(
                "price exceeds precision {}, got {}",
                Self::PRECISION,
                self.0
            )));
        }
        Ok(())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.value()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // 测试初始版本创建
    #[test]
    fn test_version_new() {
        let v = Version::new();
        assert_eq!(v.value(), 0);
        assert!(v.is_new());
    }

    #[test]
    fn test_version_next_and_ordering() {
        let v1 = Version::from_value(10);
        let v2 = v1.next();

        assert_eq!(v2.value(), 11);
        assert!(v2 > v1);
        assert_eq!(format!("{}", v2), "v11");
    }

    // 版本号以裸整数序列化
    #[test]
    fn test_version_serde() {
        let v = Version::from_value(42);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "42");

        let deserialized: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, v);
    }

    #[test]
    fn test_quantity_rejects_non_positive() {
        assert_eq!(Quantity::new(5).unwrap().value(), 5);

        for bad in [0, -1] {
            match Quantity::new(bad).unwrap_err() {
                DomainError::InvalidArgument { .. } => {}
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_quantity_deserialize_validates() {
        assert!(serde_json::from_str::<Quantity>("3").is_ok());
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_price_bounds() {
        assert!(Price::new(Decimal::from_str("19.99").unwrap()).is_ok());
        assert!(Price::new(Decimal::ZERO).is_ok());
        assert!(Price::new(Decimal::from_str("99999999.99").unwrap()).is_ok());

        assert!(Price::new(Decimal::from_str("-0.01").unwrap()).is_err());
        assert!(Price::new(Decimal::from_str("1.234").unwrap()).is_err());
        assert!(Price::new(Decimal::from_str("100000000.00").unwrap()).is_err());
    }

    // 尾随零不计入标度
    #[test]
    fn test_price_trailing_zeros_allowed() {
        let p = Price::new(Decimal::from_str("5.100").unwrap()).unwrap();
        assert_eq!(p.value(), Decimal::from_str("5.1").unwrap());
    }
}
