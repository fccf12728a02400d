use rust_decimal::Decimal;
use semval::prelude::*;

/// A monetary amount entered by a user.
///
/// Budget amounts are always positive and never carry more precision than
/// cents. Signs are implied by context: an expense or a DEDUCTION subtracts
/// its amount, everything else adds it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Amount(Decimal);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AmountInvalidity {
    /// The amount was zero or negative.
    NotPositive,
    /// The amount carried more than two decimal places. The parameter is the
    /// number of decimal places received.
    TooManyDecimals(u32),
}

impl Amount {
    pub fn unvalidated(value: Decimal) -> Self {
        Self(value)
    }

    /// The amount normalized to exactly two decimal places.
    pub fn value(&self) -> Decimal {
        self.0.round_dp(2)
    }
}

impl Validate for Amount {
    type Invalidity = AmountInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        let scale = self.0.normalize().scale();

        ValidationContext::new()
            .invalidate_if(self.0 <= Decimal::ZERO, AmountInvalidity::NotPositive)
            .invalidate_if(scale > 2, AmountInvalidity::TooManyDecimals(scale))
            .into()
    }
}
