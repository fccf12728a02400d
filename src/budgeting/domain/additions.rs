use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use semval::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amounts::{Amount, AmountInvalidity};

pub const MAX_SOURCE_LENGTH: usize = 100;
pub const MAX_COMMENTS_LENGTH: usize = 500;

/// How a budget addition affects the period's budget.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdditionKind {
    /// Money coming in. Increases the budget.
    Income,
    /// A manual correction. Increases the budget.
    Adjustment,
    /// Money taken off the top, e.g. a recurring fee. Decreases the budget.
    Deduction,
}

impl AdditionKind {
    /// Whether this kind requires an explanation from the user.
    ///
    /// Adjustments and deductions change the budget without an obvious
    /// external cause, so they must carry a comment.
    pub fn requires_comments(&self) -> bool {
        matches!(self, Self::Adjustment | Self::Deduction)
    }
}

impl fmt::Display for AdditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Income => write!(f, "INCOME"),
            Self::Adjustment => write!(f, "ADJUSTMENT"),
            Self::Deduction => write!(f, "DEDUCTION"),
        }
    }
}

impl FromStr for AdditionKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "INCOME" => Ok(Self::Income),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            "DEDUCTION" => Ok(Self::Deduction),
            other => Err(anyhow::anyhow!("unknown budget addition kind: {}", other)),
        }
    }
}

/// A validated budget addition that has not been persisted yet.
#[derive(Debug)]
pub struct NewBudgetAddition {
    period_id: Uuid,
    kind: AdditionKind,
    amount: Amount,
    source: String,
    date: DateTime<Utc>,
    comments: Option<String>,
}

impl NewBudgetAddition {
    pub fn period_id(&self) -> Uuid {
        self.period_id
    }

    pub fn kind(&self) -> AdditionKind {
        self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount.value()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NewBudgetAdditionInvalidity {
    Amount(AmountInvalidity),
    /// The source is empty or exceeds the maximum length.
    SourceLength(usize),
    /// The kind requires comments, but none were provided.
    CommentsRequired,
    /// The comments exceed the maximum length.
    CommentsLength(usize),
}

impl Validate for NewBudgetAddition {
    type Invalidity = NewBudgetAdditionInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        let comments_missing = self.kind.requires_comments()
            && self.comments.as_deref().map_or(true, str::is_empty);

        ValidationContext::new()
            .validate_with(&self.amount, NewBudgetAdditionInvalidity::Amount)
            .invalidate_if(
                self.source.is_empty() || self.source.len() > MAX_SOURCE_LENGTH,
                NewBudgetAdditionInvalidity::SourceLength(MAX_SOURCE_LENGTH),
            )
            .invalidate_if(
                comments_missing,
                NewBudgetAdditionInvalidity::CommentsRequired,
            )
            .invalidate_if(
                self.comments
                    .as_deref()
                    .map_or(false, |comments| comments.len() > MAX_COMMENTS_LENGTH),
                NewBudgetAdditionInvalidity::CommentsLength(MAX_COMMENTS_LENGTH),
            )
            .into()
    }
}

/// Unvalidated budget addition data as received from a caller.
#[derive(Clone, Debug)]
pub struct NewBudgetAdditionData {
    pub period_id: Uuid,
    pub kind: AdditionKind,
    pub amount: Decimal,
    pub source: String,
    pub date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl ValidatedFrom<NewBudgetAdditionData> for NewBudgetAddition {
    fn validated_from(from: NewBudgetAdditionData) -> ValidatedResult<Self> {
        let into = NewBudgetAddition {
            period_id: from.period_id,
            kind: from.kind,
            amount: Amount::unvalidated(from.amount),
            source: from.source,
            date: from.date.unwrap_or_else(Utc::now),
            comments: from.comments,
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}

/// A persisted budget addition.
///
/// `budget_before` and `budget_after` were computed when the addition was
/// recorded and are never recalculated, even if sibling records are later
/// deleted.
#[derive(Clone, Debug)]
pub struct BudgetAddition {
    pub id: Uuid,
    pub period_id: Uuid,
    pub kind: AdditionKind,
    pub amount: Decimal,
    pub source: String,
    pub date: DateTime<Utc>,
    pub comments: Option<String>,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn data(kind: AdditionKind, amount: &str, comments: Option<&str>) -> NewBudgetAdditionData {
        NewBudgetAdditionData {
            period_id: Uuid::new_v4(),
            kind,
            amount: amount.parse().expect("literal should parse"),
            source: "Salary".to_owned(),
            date: None,
            comments: comments.map(str::to_owned),
        }
    }

    #[test]
    fn income_does_not_require_comments() {
        let addition = NewBudgetAddition::validated_from(data(AdditionKind::Income, "1000", None))
            .expect("income without comments should be valid");

        assert_eq!(AdditionKind::Income, addition.kind());
        assert_eq!(None, addition.comments());
    }

    #[test]
    fn adjustment_requires_comments() {
        for comments in [None, Some("")] {
            let (_, context) =
                NewBudgetAddition::validated_from(data(AdditionKind::Adjustment, "100", comments))
                    .expect_err("adjustment without comments should be invalid");

            assert!(context
                .into_iter()
                .any(|invalidity| invalidity == NewBudgetAdditionInvalidity::CommentsRequired));
        }
    }

    #[test]
    fn deduction_with_comments_is_valid() {
        let addition =
            NewBudgetAddition::validated_from(data(AdditionKind::Deduction, "50", Some("fee")))
                .expect("deduction with comments should be valid");

        assert_eq!(Some("fee"), addition.comments());
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut invalid = data(AdditionKind::Income, "1000", None);
        invalid.source = String::new();

        let (_, context) = NewBudgetAddition::validated_from(invalid)
            .expect_err("empty source should be invalid");

        assert!(context.into_iter().any(|invalidity| matches!(
            invalidity,
            NewBudgetAdditionInvalidity::SourceLength(_)
        )));
    }

    #[test]
    fn invalid_amount_is_reported() {
        let (_, context) =
            NewBudgetAddition::validated_from(data(AdditionKind::Income, "-5", None))
                .expect_err("negative amount should be invalid");

        assert!(context.into_iter().any(|invalidity| {
            invalidity == NewBudgetAdditionInvalidity::Amount(AmountInvalidity::NotPositive)
        }));
    }

    #[test]
    fn missing_date_defaults_to_now() {
        let before = Utc::now();
        let addition = NewBudgetAddition::validated_from(data(AdditionKind::Income, "10", None))
            .expect("addition should be valid");

        assert!(addition.date() >= before);
        assert!(addition.date() <= Utc::now());
    }
}
