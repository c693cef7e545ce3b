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

//! Ledger entries.
//!
//! Entries are immutable once appended, with one exception: an `Earned`
//! entry's `is_expired` flag is set exactly once by the expiry sweep.
//!
//! ```text
//!  Earned (+) ──sweep──► Earned (is_expired) + Expired (-)
//!  Redeemed (-)
//!  Adjusted (+/-)
//! ```

use crate::base::{CustomerId, EntryId, RedemptionId, RewardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Earned,
    Redeemed,
    Expired,
    Adjusted,
}

/// Optional references tying an entry back to its cause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub package_ref: Option<String>,
    pub payment_ref: Option<String>,
    pub reward_id: Option<RewardId>,
    pub redemption_id: Option<RedemptionId>,
    pub description: Option<String>,
}

impl Correlation {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub phone_number: String,
    pub entry_type: EntryType,
    /// Positive for `Earned`, negative for `Redeemed` and `Expired`.
    pub points: i64,
    pub balance_after: u64,
    pub created_at: DateTime<Utc>,
    /// Only set on `Earned` entries.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    #[serde(flatten)]
    pub correlation: Correlation,
}

impl LedgerEntry {
    /// Whether the sweep should expire this entry at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.entry_type == EntryType::Earned
            && !self.is_expired
            && self.points > 0
            && self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn earned(expires_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: EntryId(1),
            customer_id: CustomerId(1),
            phone_number: "254700000001".into(),
            entry_type: EntryType::Earned,
            points: 10,
            balance_after: 10,
            created_at: expires_at - Duration::days(90),
            expires_at: Some(expires_at),
            is_expired: false,
            correlation: Correlation::default(),
        }
    }

    #[test]
    fn due_only_when_earned_unexpired_and_past_deadline() {
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let mut entry = earned(at);
        assert!(!entry.is_due(at - Duration::seconds(1)));
        assert!(entry.is_due(at));

        entry.is_expired = true;
        assert!(!entry.is_due(at));

        let mut redeemed = earned(at);
        redeemed.entry_type = EntryType::Redeemed;
        assert!(!redeemed.is_due(at));
    }

    #[test]
    fn serializes_type_in_uppercase() {
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_value(earned(at)).unwrap();
        assert_eq!(json["entry_type"], "EARNED");
        assert!(json["payment_ref"].is_null());
    }
}
