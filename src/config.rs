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

//! Engine configuration.
//!
//! Rules, tier bands, and the reward catalog are operator-maintained and
//! read-only to the engine once loaded. Everything defaults to empty, in
//! which case the built-in point and tier ladders apply.
//!
//! ```json
//! {
//!   "engine": { "expiry_months": 3, "default_channel": "sms" },
//!   "point_rules": [
//!     { "package_type": "hotspot", "min_duration_days": 8, "max_duration_days": 30, "points_awarded": 10 }
//!   ],
//!   "tiers": [
//!     { "min_points": 0, "max_points": 50, "mapped_tier": "BRONZE" }
//!   ],
//!   "rewards": [
//!     { "reward_id": 1, "name": "Router upgrade", "points_required": 100, "max_redemptions_per_customer": 1 }
//!   ],
//!   "inventory": [
//!     { "reward_id": 1, "location_code": "GLOBAL", "stock_available": 5 }
//!   ]
//! }
//! ```

use crate::catalog::{InventoryRecord, RewardCatalogItem};
use crate::notifier::Channel;
use crate::rules::PointRule;
use crate::tier::TierConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Months after which earned points expire.
    pub expiry_months: u32,
    pub default_channel: Channel,
    /// Upper bound for history page sizes.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiry_months: 3,
            default_channel: Channel::Sms,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoyaltyConfig {
    pub engine: EngineConfig,
    pub point_rules: Vec<PointRule>,
    pub tiers: Vec<TierConfig>,
    pub rewards: Vec<RewardCatalogItem>,
    pub inventory: Vec<InventoryRecord>,
}

impl LoyaltyConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.expiry_months == 0 {
            return Err(ConfigError::Invalid("expiry_months must be positive".into()));
        }
        if self.engine.max_page_size == 0 {
            return Err(ConfigError::Invalid("max_page_size must be positive".into()));
        }
        for rule in &self.point_rules {
            if rule.min_duration_days > rule.max_duration_days {
                return Err(ConfigError::Invalid(format!(
                    "point rule for {} has min_duration_days > max_duration_days",
                    rule.package_type
                )));
            }
        }
        for band in &self.tiers {
            if band.min_points > band.max_points {
                return Err(ConfigError::Invalid(format!(
                    "tier {} has min_points > max_points",
                    band.mapped_tier
                )));
            }
        }
        for reward in &self.rewards {
            if reward.points_required == 0 {
                return Err(ConfigError::Invalid(format!(
                    "reward {} must cost at least one point",
                    reward.reward_id
                )));
            }
        }
        for record in &self.inventory {
            if !self.rewards.iter().any(|r| r.reward_id == record.reward_id) {
                return Err(ConfigError::Invalid(format!(
                    "inventory references unknown reward {}",
                    record.reward_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{LocationCode, RewardId};
    use crate::tier::Tier;

    #[test]
    fn empty_document_uses_defaults() {
        let config = LoyaltyConfig::from_json("{}").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.point_rules.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let raw = r#"{
            "engine": { "expiry_months": 6, "default_channel": "email" },
            "point_rules": [
                { "package_type": "hotspot", "min_duration_days": 8, "max_duration_days": 30, "points_awarded": 10 }
            ],
            "tiers": [
                { "min_points": 0, "max_points": 50, "mapped_tier": "BRONZE", "bonus_multiplier": "1.25" }
            ],
            "rewards": [
                { "reward_id": 1, "name": "Router upgrade", "points_required": 100, "inventory_count": 77 }
            ],
            "inventory": [
                { "reward_id": 1, "stock_available": 5 }
            ]
        }"#;
        let config = LoyaltyConfig::from_json(raw).unwrap();
        assert_eq!(config.engine.expiry_months, 6);
        assert_eq!(config.engine.default_channel, Channel::Email);
        assert_eq!(config.engine.max_page_size, 100);
        assert!(config.point_rules[0].active);
        assert_eq!(config.tiers[0].mapped_tier, Tier::Bronze);
        assert_eq!(config.rewards[0].reward_id, RewardId(1));
        assert!(config.rewards[0].active);
        assert_eq!(config.rewards[0].inventory_count, 0);
        assert_eq!(config.inventory[0].location_code, LocationCode::global());
    }

    #[test]
    fn rejects_free_rewards() {
        let raw = r#"{ "rewards": [ { "reward_id": 1, "name": "x", "points_required": 0 } ] }"#;
        assert!(matches!(
            LoyaltyConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_inverted_rule_range() {
        let raw = r#"{ "point_rules": [
            { "package_type": "hotspot", "min_duration_days": 30, "max_duration_days": 8, "points_awarded": 10 }
        ] }"#;
        assert!(matches!(
            LoyaltyConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_orphan_inventory() {
        let raw = r#"{ "inventory": [ { "reward_id": 9, "stock_available": 1 } ] }"#;
        assert!(matches!(
            LoyaltyConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }
}
