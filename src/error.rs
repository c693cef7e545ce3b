// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for loyalty operations.

use crate::base::{CustomerId, LocationCode, RedemptionId, RewardId};
use crate::redemption::RedemptionStatus;
use thiserror::Error;

/// Loyalty engine errors.
///
/// Every variant is returned before any state is touched, so a failed
/// operation leaves balance, ledger and inventory unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoyaltyError {
    /// No loyalty account exists for the customer
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    /// Reward is not in the catalog
    #[error("reward {0} not found")]
    RewardNotFound(RewardId),

    /// Redemption request does not exist
    #[error("redemption {0} not found")]
    RedemptionNotFound(RedemptionId),

    /// Reward is inactive or outside its availability window
    #[error("reward {0} is not available")]
    Unavailable(RewardId),

    /// No stock left for the reward at the requested location
    #[error("reward {reward} is out of stock at {location}")]
    OutOfStock {
        reward: RewardId,
        location: LocationCode,
    },

    /// Customer already redeemed this reward the maximum number of times
    #[error("redemption limit of {limit} reached for reward {reward}")]
    LimitReached { reward: RewardId, limit: u32 },

    /// Balance does not cover the cost
    #[error("insufficient points: {points_needed} more needed")]
    InsufficientPoints { points_needed: u64 },

    /// A purchase event with this payment reference was already awarded
    #[error("payment {0} already awarded")]
    DuplicatePayment(String),

    /// Redemption state machine does not allow the action
    #[error("cannot {action} a redemption in status {from}")]
    InvalidTransition {
        from: RedemptionStatus,
        action: &'static str,
    },

    /// Zero adjustment, or an amount that would overflow a balance
    #[error("invalid point amount")]
    InvalidAmount,
}
