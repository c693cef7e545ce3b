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

//! Tier resolution.
//!
//! A balance maps to a [`Tier`] and a [`TierStatus`]. Configured bands are
//! consulted first; without a matching band the built-in status ladder
//! applies:
//!
//! | Balance | Status |
//! |---------|--------|
//! | >= 400  | VIP |
//! | >= 151  | Loyal |
//! | >= 51   | Regular |
//! | > 0     | New |
//! | 0       | unchanged |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Status implied by a tier when the band does not grant priority support.
    pub fn status(self) -> TierStatus {
        match self {
            Tier::Platinum => TierStatus::Vip,
            Tier::Gold => TierStatus::Loyal,
            Tier::Silver => TierStatus::Regular,
            Tier::Bronze => TierStatus::New,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TierStatus {
    New,
    Regular,
    Loyal,
    Vip,
}

impl TierStatus {
    fn tier(self) -> Tier {
        match self {
            TierStatus::Vip => Tier::Platinum,
            TierStatus::Loyal => Tier::Gold,
            TierStatus::Regular => Tier::Silver,
            TierStatus::New => Tier::Bronze,
        }
    }
}

impl fmt::Display for TierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierStatus::New => "NEW",
            TierStatus::Regular => "REGULAR",
            TierStatus::Loyal => "LOYAL",
            TierStatus::Vip => "VIP",
        };
        f.write_str(name)
    }
}

/// Operator-maintained tier band. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub min_points: u64,
    pub max_points: u64,
    pub mapped_tier: Tier,
    #[serde(default = "unit_multiplier")]
    pub bonus_multiplier: Decimal,
    #[serde(default)]
    pub priority_support: bool,
    #[serde(default)]
    pub display_name: String,
}

fn unit_multiplier() -> Decimal {
    Decimal::ONE
}

/// Benefits attached to the band an account currently sits in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierPerks {
    pub display_name: String,
    pub bonus_multiplier: Decimal,
    pub priority_support: bool,
}

impl From<&TierConfig> for TierPerks {
    fn from(config: &TierConfig) -> Self {
        Self {
            display_name: config.display_name.clone(),
            bonus_multiplier: config.bonus_multiplier,
            priority_support: config.priority_support,
        }
    }
}

/// Result of resolving a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierAssignment {
    pub tier: Tier,
    pub status: TierStatus,
}

#[derive(Debug, Clone, Default)]
pub struct TierResolver {
    bands: Vec<TierConfig>,
}

impl TierResolver {
    pub fn new(bands: impl IntoIterator<Item = TierConfig>) -> Self {
        let mut bands: Vec<TierConfig> = bands.into_iter().collect();
        bands.sort_by_key(|b| b.min_points);
        Self { bands }
    }

    fn band(&self, balance: u64) -> Option<&TierConfig> {
        self.bands
            .iter()
            .find(|b| (b.min_points..=b.max_points).contains(&balance))
    }

    /// Returns the assignment for `balance`, or `None` when the balance is
    /// zero and no band covers it (the account keeps its current tier).
    pub fn resolve(&self, balance: u64) -> Option<TierAssignment> {
        if let Some(band) = self.band(balance) {
            let status = if band.priority_support {
                TierStatus::Vip
            } else {
                band.mapped_tier.status()
            };
            return Some(TierAssignment {
                tier: band.mapped_tier,
                status,
            });
        }

        debug!(balance, "no tier band matches, using built-in ladder");
        let status = match balance {
            0 => return None,
            400.. => TierStatus::Vip,
            151.. => TierStatus::Loyal,
            51.. => TierStatus::Regular,
            _ => TierStatus::New,
        };
        Some(TierAssignment {
            tier: status.tier(),
            status,
        })
    }

    pub fn perks(&self, balance: u64) -> Option<TierPerks> {
        self.band(balance).map(TierPerks::from)
    }
}
