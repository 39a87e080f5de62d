use std::fmt::{self, Display};
use std::io::prelude::*;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::BigInt;

const CENTS_IN_REAL: u32 = 2;
const BASIS_POINTS: u128 = 10_000;

/// Monetary amount in cents of BRL.
///
/// Stored as `BIGINT` in postgres, so values above `i64::MAX` are rejected on write
/// and negative values are rejected on read. Serialized as an integer number of cents.
///
/// As a monetary amount it only implements checked operations.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, FromSqlRow, AsExpression, Default, PartialOrd, Ord, Hash)]
#[sql_type = "BigInt"]
pub struct Amount(u64);

#[derive(Debug, Clone, Fail)]
#[fail(display = "failed to parse amount")]
pub struct ParseAmountError;

impl Amount {
    pub fn zero() -> Self {
        Amount(0)
    }

    pub fn new(cents: u64) -> Self {
        Amount(cents)
    }

    pub fn inner(&self) -> u64 {
        self.0
    }

    /// Make addition, return None on overflow
    pub fn checked_add(&self, other: Amount) -> Option<Self> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Make subtraction, return None on overflow
    pub fn checked_sub(&self, other: Amount) -> Option<Self> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(&self, times: u64) -> Option<Self> {
        self.0.checked_mul(times).map(Amount)
    }

    /// Share of the amount expressed in basis points (1 bps = 0.01%), rounded half up.
    /// Returns None if `bps` is above 100%.
    pub fn percent_bps(&self, bps: u32) -> Option<Self> {
        let bps = u128::from(bps);
        if bps > BASIS_POINTS {
            return None;
        }
        let share = (u128::from(self.0) * bps + BASIS_POINTS / 2) / BASIS_POINTS;
        Some(Amount(share as u64))
    }

    /// Sum of amounts, None on overflow
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Self> {
        amounts.into_iter().try_fold(Amount::zero(), |acc, amount| acc.checked_add(amount))
    }

    /// Parses an amount in reais, e.g. `49.90`. More than two decimal places are rejected.
    pub fn from_reais(value: &BigDecimal) -> Result<Amount, ParseAmountError> {
        let exp = BigDecimal::from(10i64.pow(CENTS_IN_REAL));
        let cents = value.clone() * exp;
        if cents.with_scale(0) != cents {
            return Err(ParseAmountError);
        }
        cents.with_scale(0).to_u64().map(Amount).ok_or(ParseAmountError)
    }

    pub fn to_reais(&self) -> BigDecimal {
        let exp = BigDecimal::from(10i64.pow(CENTS_IN_REAL));
        (BigDecimal::from(self.0 as i64) / exp).with_scale(i64::from(CENTS_IN_REAL))
    }

    /// Whole reais, cents are dropped
    pub fn whole_reais(&self) -> u64 {
        self.0 / 10u64.pow(CENTS_IN_REAL)
    }
}

impl From<u64> for Amount {
    fn from(val: u64) -> Self {
        Amount(val)
    }
}

impl From<Amount> for u64 {
    fn from(val: Amount) -> Self {
        val.0
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Amount::new).map_err(|_| ParseAmountError)
    }
}

impl ToSql<BigInt, Pg> for Amount {
    fn to_sql<W: Write>(&self, out: &mut Output<W, Pg>) -> serialize::Result {
        if self.0 > i64::max_value() as u64 {
            return Err(format!("Amount {} does not fit into BIGINT", self.0).into());
        }
        ToSql::<BigInt, Pg>::to_sql(&(self.0 as i64), out)
    }
}

impl FromSql<BigInt, Pg> for Amount {
    fn from_sql(bytes: Option<&[u8]>) -> deserialize::Result<Self> {
        let value = <i64 as FromSql<BigInt, Pg>>::from_sql(bytes)?;
        if value < 0 {
            return Err(format!("Negative amount is not supported: {}", value).into());
        }
        Ok(Amount(value as u64))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
