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

//! Point rule resolution.
//!
//! Resolution order for a purchased package:
//!
//! 1. A positive point value carried on the package itself.
//! 2. The active rule for the package type whose duration range contains the
//!    package duration (lowest `min_duration_days` first).
//! 3. The active default rule with the lowest `min_duration_days`.
//! 4. With no active rules at all, the built-in duration ladder.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Operator-maintained award rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRule {
    pub package_type: String,
    pub min_duration_days: u32,
    pub max_duration_days: u32,
    pub points_awarded: u64,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl PointRule {
    fn matches(&self, package_type: &str, duration_days: u32) -> bool {
        self.package_type.eq_ignore_ascii_case(package_type)
            && (self.min_duration_days..=self.max_duration_days).contains(&duration_days)
    }
}

/// The purchased package as seen by the award path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub package_type: String,
    pub duration_days: u32,
    /// Hour-based offer rather than a daily plan. Only consulted by the
    /// built-in ladder for packages of a day or less.
    #[serde(default)]
    pub hourly: bool,
    /// Package-level point override; wins whenever positive.
    #[serde(default)]
    pub points_override: Option<u64>,
}

impl PackageDescriptor {
    /// A daily package with no override.
    pub fn new(package_type: impl Into<String>, duration_days: u32) -> Self {
        Self {
            package_type: package_type.into(),
            duration_days,
            hourly: false,
            points_override: None,
        }
    }
}

/// Resolves how many points a package is worth.
#[derive(Debug, Clone, Default)]
pub struct PointRuleResolver {
    /// Active rules, stably sorted by `min_duration_days`.
    rules: Vec<PointRule>,
}

impl PointRuleResolver {
    pub fn new(rules: impl IntoIterator<Item = PointRule>) -> Self {
        let mut rules: Vec<PointRule> = rules.into_iter().filter(|r| r.active).collect();
        // Stable sort keeps configuration order for equal minimums.
        rules.sort_by_key(|r| r.min_duration_days);
        Self { rules }
    }

    pub fn resolve(&self, package: &PackageDescriptor) -> u64 {
        if let Some(points) = package.points_override.filter(|p| *p > 0) {
            return points;
        }

        if self.rules.is_empty() {
            debug!(
                package_type = %package.package_type,
                duration_days = package.duration_days,
                "no point rules configured, using built-in ladder"
            );
            return legacy_points(package.duration_days, package.hourly);
        }

        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.matches(&package.package_type, package.duration_days))
        {
            return rule.points_awarded;
        }

        match self.rules.iter().find(|r| r.is_default) {
            Some(rule) => rule.points_awarded,
            None => {
                debug!(
                    package_type = %package.package_type,
                    duration_days = package.duration_days,
                    "no matching or default point rule"
                );
                0
            }
        }
    }
}

/// Built-in ladder used when no rules are configured.
fn legacy_points(duration_days: u32, hourly: bool) -> u64 {
    match duration_days {
        0..=1 if hourly => 1,
        0..=1 => 2,
        2..=7 => 6,
        8..=30 => 10,
        d if d >= 150 => 40,
        d => u64::from((d / 3).max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(package_type: &str, min: u32, max: u32, points: u64) -> PointRule {
        PointRule {
            package_type: package_type.to_string(),
            min_duration_days: min,
            max_duration_days: max,
            points_awarded: points,
            is_default: false,
            active: true,
        }
    }

    fn package(package_type: &str, duration_days: u32) -> PackageDescriptor {
        PackageDescriptor {
            package_type: package_type.to_string(),
            duration_days,
            hourly: false,
            points_override: None,
        }
    }

    #[test]
    fn package_override_wins() {
        let resolver = PointRuleResolver::new([rule("hotspot", 1, 30, 10)]);
        let mut pkg = package("hotspot", 30);
        pkg.points_override = Some(25);
        assert_eq!(resolver.resolve(&pkg), 25);
    }

    #[test]
    fn zero_override_is_ignored() {
        let resolver = PointRuleResolver::new([rule("hotspot", 8, 30, 10)]);
        let mut pkg = package("hotspot", 30);
        pkg.points_override = Some(0);
        assert_eq!(resolver.resolve(&pkg), 10);
    }

    #[test]
    fn matching_rule_by_type_and_range() {
        let resolver = PointRuleResolver::new([
            rule("hotspot", 1, 7, 6),
            rule("hotspot", 8, 30, 10),
            rule("pppoe", 8, 30, 15),
        ]);
        assert_eq!(resolver.resolve(&package("hotspot", 30)), 10);
        assert_eq!(resolver.resolve(&package("PPPoE", 10)), 15);
        assert_eq!(resolver.resolve(&package("hotspot", 3)), 6);
    }

    #[test]
    fn overlapping_rules_pick_lowest_minimum_then_configuration_order() {
        let resolver = PointRuleResolver::new([
            rule("hotspot", 5, 30, 9),
            rule("hotspot", 1, 30, 3),
            rule("hotspot", 1, 10, 4),
        ]);
        assert_eq!(resolver.resolve(&package("hotspot", 6)), 3);
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut inactive = rule("hotspot", 1, 30, 99);
        inactive.active = false;
        let resolver = PointRuleResolver::new([inactive, rule("hotspot", 1, 30, 5)]);
        assert_eq!(resolver.resolve(&package("hotspot", 2)), 5);
    }

    #[test]
    fn falls_back_to_lowest_default_rule() {
        let mut high_default = rule("any", 30, 365, 20);
        high_default.is_default = true;
        let mut low_default = rule("any", 1, 29, 2);
        low_default.is_default = true;
        let resolver =
            PointRuleResolver::new([high_default, rule("hotspot", 1, 7, 6), low_default]);
        assert_eq!(resolver.resolve(&package("fiber", 90)), 2);
    }

    #[test]
    fn rules_without_match_or_default_award_nothing() {
        let resolver = PointRuleResolver::new([rule("hotspot", 1, 7, 6)]);
        assert_eq!(resolver.resolve(&package("fiber", 90)), 0);
    }

    #[test]
    fn legacy_ladder_without_rules() {
        let resolver = PointRuleResolver::default();
        let mut hourly = package("hotspot", 1);
        hourly.hourly = true;
        assert_eq!(resolver.resolve(&hourly), 1);
        assert_eq!(resolver.resolve(&package("hotspot", 1)), 2);
        assert_eq!(resolver.resolve(&package("hotspot", 7)), 6);
        assert_eq!(resolver.resolve(&package("hotspot", 30)), 10);
        assert_eq!(resolver.resolve(&package("hotspot", 90)), 30);
        assert_eq!(resolver.resolve(&package("hotspot", 150)), 40);
        assert_eq!(resolver.resolve(&package("hotspot", 365)), 40);
        assert_eq!(resolver.resolve(&package("hotspot", 31)), 10);
    }
}
