//! Milestone payment breakdown validation
//!
//! A bid splits its total into named milestones. Entry surfaces send shares
//! either as currency amounts or as percentages; the stored form is always
//! percentages summing to exactly 100.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Allowed drift between the milestone sum and the bid total in absolute mode
pub const ABSOLUTE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Decimal places kept when converting absolute shares to percentages
const PERCENT_SCALE: u32 = 4;

/// How the shares in a milestone payload are expressed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneMode {
    #[default]
    Absolute,
    Percentage,
}

/// Milestone as submitted by a bidder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MilestoneInput {
    pub title: String,
    pub share: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// Canonical stored milestone
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub title: String,
    pub percentage: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl Milestone {
    /// Currency amount of this milestone for a bid of `total`
    pub fn amount_of(&self, total: Decimal) -> Decimal {
        (self.percentage / Decimal::ONE_HUNDRED)
            .saturating_mul(total)
            .round_dp(2)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MilestoneError {
    #[error("at least one milestone is required")]
    Empty,

    #[error("milestone {index} has an empty title")]
    MissingTitle { index: usize },

    #[error("milestone {index} must have a positive share")]
    NonPositiveShare { index: usize },

    #[error("milestone shares sum to {actual}, expected {expected}")]
    SumMismatch { expected: Decimal, actual: Decimal },

    #[error("milestone shares are too large to add up")]
    Overflow,
}

fn share_sum(milestones: &[MilestoneInput]) -> Result<Decimal, MilestoneError> {
    milestones.iter().try_fold(Decimal::ZERO, |sum, m| {
        sum.checked_add(m.share).ok_or(MilestoneError::Overflow)
    })
}

/// Validate a milestone breakdown against the bid total.
///
/// Absolute shares must add up to `total` within [`ABSOLUTE_TOLERANCE`];
/// percentage shares must add up to exactly 100.
pub fn validate(
    milestones: &[MilestoneInput],
    total: Decimal,
    mode: MilestoneMode,
) -> Result<(), MilestoneError> {
    if milestones.is_empty() {
        return Err(MilestoneError::Empty);
    }

    for (index, milestone) in milestones.iter().enumerate() {
        if milestone.title.trim().is_empty() {
            return Err(MilestoneError::MissingTitle { index });
        }
        if milestone.share <= Decimal::ZERO {
            return Err(MilestoneError::NonPositiveShare { index });
        }
    }

    let actual = share_sum(milestones)?;

    match mode {
        MilestoneMode::Absolute => {
            let drift = actual.checked_sub(total).ok_or(MilestoneError::Overflow)?;
            if drift.abs() > ABSOLUTE_TOLERANCE {
                return Err(MilestoneError::SumMismatch {
                    expected: total,
                    actual,
                });
            }
        }
        MilestoneMode::Percentage => {
            if actual != Decimal::ONE_HUNDRED {
                return Err(MilestoneError::SumMismatch {
                    expected: Decimal::ONE_HUNDRED,
                    actual,
                });
            }
        }
    }

    Ok(())
}

/// Validate and convert a breakdown into canonical percentage milestones.
///
/// Absolute shares are rounded to four decimal places; the last milestone
/// absorbs the rounding remainder so the result sums to exactly 100.
pub fn normalize(
    milestones: &[MilestoneInput],
    total: Decimal,
    mode: MilestoneMode,
) -> Result<Vec<Milestone>, MilestoneError> {
    validate(milestones, total, mode)?;

    let mut percentages: Vec<Decimal> = match mode {
        MilestoneMode::Percentage => milestones.iter().map(|m| m.share).collect(),
        MilestoneMode::Absolute => {
            let declared = share_sum(milestones)?;
            milestones
                .iter()
                .map(|m| {
                    m.share
                        .checked_div(declared)
                        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                        .map(|percentage| percentage.round_dp(PERCENT_SCALE))
                        .ok_or(MilestoneError::Overflow)
                })
                .collect::<Result<_, _>>()?
        }
    };

    let last = percentages.len() - 1;
    let head: Decimal = percentages[..last].iter().copied().sum();
    percentages[last] = Decimal::ONE_HUNDRED - head;
    if percentages[last] <= Decimal::ZERO {
        return Err(MilestoneError::NonPositiveShare { index: last });
    }

    Ok(milestones
        .iter()
        .zip(percentages)
        .map(|(input, percentage)| Milestone {
            title: input.title.trim().to_string(),
            percentage,
            description: input.description.clone(),
        })
        .collect())
}
