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

//! # Loyalty Ledger
//!
//! Append-only points ledger and reward redemption engine for an ISP-style
//! loyalty program.
//!
//! Customers earn points when a purchase completes, move between tiers as
//! their balance changes, and spend points on catalog rewards that pass
//! through an approval workflow. Earned points expire after a configurable
//! number of months.
//!
//! ## Core Components
//!
//! - [`Engine`]: Owns accounts, catalog and redemptions; every mutation goes through it
//! - [`LoyaltyAccount`]: Per-customer balance, tier and ledger
//! - [`Catalog`]: Rewards and per-location stock
//! - [`PointRuleResolver`] / [`TierResolver`]: Configured awarding and tier bands
//! - [`Sweeper`]: Background point expiry
//! - [`LoyaltyError`]: Business-rule failures
//!
//! ## Example
//!
//! ```
//! use loyalty_ledger_rs::{
//!     AwardOutcome, CustomerId, Engine, PackageDescriptor, PurchaseEvent, Tier,
//! };
//!
//! let engine = Engine::new();
//!
//! let outcome = engine
//!     .award_points(PurchaseEvent {
//!         customer_id: CustomerId(1),
//!         phone_number: "+254700000001".into(),
//!         package: PackageDescriptor::new("hotspot", 30),
//!         payment_ref: Some("MPESA-1".into()),
//!         package_ref: None,
//!     })
//!     .unwrap();
//! assert!(matches!(outcome, AwardOutcome::Awarded(_)));
//!
//! let account = engine.account(&CustomerId(1)).unwrap();
//! assert_eq!(account.balance(), 10);
//! assert_eq!(account.tier(), Tier::Bronze);
//! ```
//!
//! ## Thread Safety
//!
//! Operations on different customers run in parallel. Operations on one
//! customer are serialized by that customer's account lock, and stock is
//! decremented atomically, so concurrent redemptions never oversell.

pub mod account;
mod base;
pub mod catalog;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod payments;
pub mod query;
pub mod redemption;
pub mod rules;
pub mod sweeper;
pub mod tier;

pub use account::{AccountSnapshot, LoyaltyAccount};
pub use base::{CustomerId, EntryId, LocationCode, RedemptionId, RewardId};
pub use catalog::{Catalog, InventoryRecord, Reservation, RewardCatalogItem};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, LoyaltyConfig};
pub use engine::{AwardOutcome, AwardReceipt, Engine, PurchaseEvent, RedeemCommand};
pub use error::LoyaltyError;
pub use ledger::{Correlation, EntryType, LedgerEntry};
pub use notifier::{
    Channel, LogNotifier, Notification, NotificationEvent, Notifier, NotifierError, QueuedNotifier,
};
pub use query::{Page, RewardProgress};
pub use redemption::{RedemptionRequest, RedemptionStatus};
pub use rules::{PackageDescriptor, PointRule, PointRuleResolver};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
pub use tier::{Tier, TierAssignment, TierConfig, TierPerks, TierResolver, TierStatus};
