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

//! Redemption requests.
//!
//! Requests follow a state machine:
//! - [`Pending`] → [`Approved`] (via approve) → [`Delivered`] (via mark delivered)
//! - [`Pending`] or [`Approved`] → [`Rejected`] (via reject, points refunded)
//!
//! Repeating the action that produced the current state is a no-op.
//!
//! [`Pending`]: RedemptionStatus::Pending
//! [`Approved`]: RedemptionStatus::Approved
//! [`Delivered`]: RedemptionStatus::Delivered
//! [`Rejected`]: RedemptionStatus::Rejected

use crate::LoyaltyError;
use crate::base::{CustomerId, LocationCode, RedemptionId, RewardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Delivered,
    Rejected,
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Delivered => "DELIVERED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub redemption_id: RedemptionId,
    pub customer_id: CustomerId,
    pub phone_number: String,
    pub reward_id: RewardId,
    pub reward_name: String,
    /// Cost at request time; later catalog price changes do not apply.
    pub points_used: u64,
    pub status: RedemptionStatus,
    pub delivery_method: String,
    pub delivery_address: Option<String>,
    pub location_code: LocationCode,
    /// Whether a unit of stock was reserved for this request.
    pub stock_reserved: bool,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub technician_assigned: Option<String>,
    pub rejection_reason: Option<String>,
}

impl RedemptionRequest {
    /// Moves `Pending` to `Approved`. Returns `false` if already approved
    /// or delivered.
    pub(crate) fn approve(
        &mut self,
        technician: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, LoyaltyError> {
        match self.status {
            RedemptionStatus::Pending => {
                self.status = RedemptionStatus::Approved;
                self.approved_at = Some(now);
                self.technician_assigned = technician;
                Ok(true)
            }
            RedemptionStatus::Approved | RedemptionStatus::Delivered => Ok(false),
            RedemptionStatus::Rejected => Err(self.invalid("approve")),
        }
    }

    /// Moves `Approved` to `Delivered`. Returns `false` if already delivered.
    pub(crate) fn deliver(&mut self, now: DateTime<Utc>) -> Result<bool, LoyaltyError> {
        match self.status {
            RedemptionStatus::Approved => {
                self.status = RedemptionStatus::Delivered;
                self.delivered_at = Some(now);
                Ok(true)
            }
            RedemptionStatus::Delivered => Ok(false),
            RedemptionStatus::Pending | RedemptionStatus::Rejected => {
                Err(self.invalid("deliver"))
            }
        }
    }

    /// Moves an undelivered request to `Rejected`. Returns `false` if
    /// already rejected.
    pub(crate) fn reject(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, LoyaltyError> {
        match self.status {
            RedemptionStatus::Pending | RedemptionStatus::Approved => {
                self.status = RedemptionStatus::Rejected;
                self.rejected_at = Some(now);
                self.rejection_reason = reason;
                Ok(true)
            }
            RedemptionStatus::Rejected => Ok(false),
            RedemptionStatus::Delivered => Err(self.invalid("reject")),
        }
    }

    fn invalid(&self, action: &'static str) -> LoyaltyError {
        LoyaltyError::InvalidTransition {
            from: self.status,
            action,
        }
    }
}
