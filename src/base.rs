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

//! Core identifier types for customers, rewards, ledger entries and redemptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a loyalty customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CustomerId(pub u64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reward catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RewardId(pub u32);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ledger entry.
///
/// Allocated from a single engine-wide counter, so ordering by id is
/// ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a redemption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RedemptionId(pub u64);

impl fmt::Display for RedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inventory location code.
///
/// [`LocationCode::GLOBAL`] is the location-less bucket used when a
/// redemption does not name a pickup point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LocationCode(pub String);

impl LocationCode {
    pub const GLOBAL: &'static str = "GLOBAL";

    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Resolves an optional caller-supplied code, falling back to `GLOBAL`
    /// for `None` and blank strings.
    pub fn resolve(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some(code) if !code.is_empty() => Self(code.to_string()),
            _ => Self::global(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocationCode {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_resolves_to_global_when_missing_or_blank() {
        assert_eq!(LocationCode::resolve(None), LocationCode::global());
        assert_eq!(LocationCode::resolve(Some("  ")), LocationCode::global());
        assert_eq!(LocationCode::resolve(Some("NBO-01")).as_str(), "NBO-01");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&CustomerId(42)).unwrap();
        assert_eq!(json, "42");
        let json = serde_json::to_string(&LocationCode::global()).unwrap();
        assert_eq!(json, "\"GLOBAL\"");
    }
}
