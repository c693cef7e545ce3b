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

//! Loyalty engine.
//!
//! The [`Engine`] owns every loyalty account, the reward catalog and the
//! redemption requests, and exposes the mutating operations:
//!
//! - **Award**: turn a completed purchase into earned points.
//! - **Redeem**: exchange points for a catalog reward.
//! - **Approve / Deliver / Reject**: administrative redemption transitions.
//! - **Adjust**: manual balance corrections.
//!
//! Expiry sweeps live in [`crate::sweeper`] and read models in
//! [`crate::query`].
//!
//! # Thread Safety
//!
//! Accounts are held in a [`DashMap`] as `Arc<LoyaltyAccount>`; handles are
//! cloned out of the map before locking so no shard lock is held across a
//! read-modify-write. The account mutex serializes every mutation of one
//! customer, while different customers proceed in parallel. Lock order is
//! account, then inventory, then the redemption map. Notifications are sent
//! only after all of them are released.

use crate::account::{self, LoyaltyAccount};
use crate::base::{CustomerId, EntryId, LocationCode, RedemptionId, RewardId};
use crate::catalog::{Catalog, Reservation};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig, LoyaltyConfig};
use crate::ledger::{Correlation, LedgerEntry};
use crate::notifier::{LogNotifier, Notification, NotificationEvent, Notifier};
use crate::payments::PaymentRegistry;
use crate::redemption::{RedemptionRequest, RedemptionStatus};
use crate::rules::{PackageDescriptor, PointRuleResolver};
use crate::tier::{Tier, TierResolver, TierStatus};
use crate::LoyaltyError;
use chrono::{DateTime, Months, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// A confirmed purchase, delivered after payment succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub customer_id: CustomerId,
    pub phone_number: String,
    pub package: PackageDescriptor,
    /// Deduplication key; events without one are never deduplicated.
    pub payment_ref: Option<String>,
    pub package_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardReceipt {
    pub entry: LedgerEntry,
    pub previous_balance: u64,
    pub balance: u64,
    pub tier: Tier,
    pub tier_status: TierStatus,
    /// Rewards that became affordable with this award.
    pub unlocked: Vec<RewardId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// The package is worth no points; nothing was recorded.
    NoPoints,
    Awarded(AwardReceipt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCommand {
    pub customer_id: CustomerId,
    pub reward_id: RewardId,
    pub delivery_method: String,
    pub delivery_address: Option<String>,
    pub location_code: Option<String>,
}

/// Loyalty ledger and redemption engine.
///
/// # Invariants
///
/// - An account's balance equals the `balance_after` of its latest entry and
///   the sum of all its entry points.
/// - Balances and inventory stock never go below zero.
/// - A payment reference is awarded at most once.
/// - Redemptions move `Pending -> Approved -> Delivered`, or to `Rejected`
///   before delivery.
pub struct Engine {
    config: EngineConfig,
    rules: PointRuleResolver,
    tiers: TierResolver,
    accounts: DashMap<CustomerId, Arc<LoyaltyAccount>>,
    catalog: Catalog,
    redemptions: DashMap<RedemptionId, RedemptionRequest>,
    payments: PaymentRegistry,
    next_entry: AtomicU64,
    next_redemption: AtomicU64,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Creates an engine with no configuration, so the built-in point and
    /// tier ladders apply.
    pub fn new() -> Self {
        Self::build(LoyaltyConfig::default())
    }

    /// Creates an engine from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails
    /// [`LoyaltyConfig::validate`].
    pub fn from_config(config: LoyaltyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LoyaltyConfig) -> Self {
        let catalog = Catalog::new();
        for reward in config.rewards {
            if let Err(error) = catalog.upsert_reward(reward) {
                warn!(%error, "skipping invalid reward");
            }
        }
        for record in config.inventory {
            catalog.set_stock(record);
        }

        Engine {
            config: config.engine,
            rules: PointRuleResolver::new(config.point_rules),
            tiers: TierResolver::new(config.tiers),
            accounts: DashMap::new(),
            catalog,
            redemptions: DashMap::new(),
            payments: PaymentRegistry::new(),
            next_entry: AtomicU64::new(1),
            next_redemption: AtomicU64::new(1),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Awards points for a completed purchase.
    ///
    /// Creates the account on first award. A package worth zero points is a
    /// normal outcome ([`AwardOutcome::NoPoints`]), not an error.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::DuplicatePayment`] - The payment reference was already awarded.
    /// - [`LoyaltyError::InvalidAmount`] - The points, or the resulting balance, are out of range.
    #[instrument(skip(self, event), fields(customer_id = %event.customer_id))]
    pub fn award_points(&self, event: PurchaseEvent) -> Result<AwardOutcome, LoyaltyError> {
        let points = self.rules.resolve(&event.package);
        if points == 0 {
            debug!(package_type = %event.package.package_type, "package awards no points");
            return Ok(AwardOutcome::NoPoints);
        }
        account::ledger_delta(points)?;

        // Claim the payment reference before touching the account so a
        // retried webhook cannot award twice.
        if let Some(payment_ref) = event.payment_ref.as_deref() {
            self.payments.register(payment_ref, event.customer_id)?;
        }

        let account = self.account_or_create(event.customer_id, &event.phone_number);
        let now = self.clock.now();
        let expires_at = self.expiry_for(now);
        let correlation = Correlation {
            package_ref: event.package_ref,
            payment_ref: event.payment_ref.clone(),
            description: Some(format!(
                "{} package, {} days",
                event.package.package_type, event.package.duration_days
            )),
            ..Correlation::default()
        };

        let (entry, previous_balance, tier, tier_status, phone) = {
            let mut data = account.lock();
            let previous_balance = data.balance();
            let earned = data.earn(
                self.next_entry_id(),
                points,
                now,
                expires_at,
                correlation,
                &self.tiers,
            );
            let entry = match earned {
                Ok(entry) => entry,
                Err(error) => {
                    if let Some(payment_ref) = event.payment_ref.as_deref() {
                        self.payments.release(payment_ref);
                    }
                    return Err(error);
                }
            };
            (
                entry,
                previous_balance,
                data.tier(),
                data.tier_status(),
                data.phone_number().to_string(),
            )
        };
        let balance = entry.balance_after;

        let unlocked = self.catalog.newly_affordable(previous_balance, balance, now);
        for reward in &unlocked {
            self.notify(
                &phone,
                NotificationEvent::RewardUnlocked,
                format!(
                    "You now have {} points. You can redeem {} for {} points.",
                    balance, reward.name, reward.points_required
                ),
            );
        }

        info!(
            points,
            balance,
            tier = %tier,
            unlocked = unlocked.len(),
            "points awarded"
        );
        Ok(AwardOutcome::Awarded(AwardReceipt {
            entry,
            previous_balance,
            balance,
            tier,
            tier_status,
            unlocked: unlocked.into_iter().map(|r| r.reward_id).collect(),
        }))
    }

    /// Redeems points for a catalog reward.
    ///
    /// Validation, stock reservation, the debit and the new request all
    /// happen under the customer's lock; any failure leaves balance, ledger
    /// and inventory untouched.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::CustomerNotFound`] / [`LoyaltyError::RewardNotFound`]
    /// - [`LoyaltyError::Unavailable`] - Reward inactive or outside its window.
    /// - [`LoyaltyError::LimitReached`] - Per-customer cap already used.
    /// - [`LoyaltyError::InsufficientPoints`] - Carries the shortfall.
    /// - [`LoyaltyError::OutOfStock`] - No stock at the resolved location.
    #[instrument(skip(self, command), fields(customer_id = %command.customer_id, reward_id = %command.reward_id))]
    pub fn redeem(&self, command: RedeemCommand) -> Result<RedemptionRequest, LoyaltyError> {
        let account = self
            .account(&command.customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(command.customer_id))?;
        let reward = self
            .catalog
            .reward(command.reward_id)
            .ok_or(LoyaltyError::RewardNotFound(command.reward_id))?;

        let now = self.clock.now();
        if !reward.is_available(now) {
            return Err(LoyaltyError::Unavailable(reward.reward_id));
        }
        let location = LocationCode::resolve(command.location_code.as_deref());

        let request = {
            let mut data = account.lock();

            let limit = reward.max_redemptions_per_customer;
            if limit > 0 && data.redemption_count(reward.reward_id) >= limit {
                return Err(LoyaltyError::LimitReached {
                    reward: reward.reward_id,
                    limit,
                });
            }
            data.ensure_covers(reward.points_required)?;

            let reservation = self.catalog.reserve(reward.reward_id, &location)?;
            let redemption_id = RedemptionId(self.next_redemption.fetch_add(1, Ordering::Relaxed));
            let correlation = Correlation {
                reward_id: Some(reward.reward_id),
                redemption_id: Some(redemption_id),
                description: Some(format!("redeemed {}", reward.name)),
                ..Correlation::default()
            };
            let debit = data.redeem(
                self.next_entry_id(),
                redemption_id,
                reward.reward_id,
                reward.points_required,
                now,
                correlation,
                &self.tiers,
            );
            if let Err(error) = debit {
                if matches!(reservation, Reservation::Reserved { .. }) {
                    self.catalog.release(reward.reward_id, &location);
                }
                return Err(error);
            }

            let request = RedemptionRequest {
                redemption_id,
                customer_id: command.customer_id,
                phone_number: data.phone_number().to_string(),
                reward_id: reward.reward_id,
                reward_name: reward.name.clone(),
                points_used: reward.points_required,
                status: RedemptionStatus::Pending,
                delivery_method: if command.delivery_method.is_empty() {
                    reward.delivery_method.clone()
                } else {
                    command.delivery_method
                },
                delivery_address: command.delivery_address,
                location_code: location,
                stock_reserved: matches!(reservation, Reservation::Reserved { .. }),
                requested_at: now,
                approved_at: None,
                delivered_at: None,
                rejected_at: None,
                technician_assigned: None,
                rejection_reason: None,
            };
            self.redemptions.insert(redemption_id, request.clone());
            request
        };

        self.notify(
            &request.phone_number,
            NotificationEvent::RedemptionRequested,
            format!(
                "Your request for {} ({} points) is pending approval. Ref {}.",
                request.reward_name, request.points_used, request.redemption_id
            ),
        );
        info!(
            redemption_id = %request.redemption_id,
            points = request.points_used,
            location = %request.location_code,
            "redemption requested"
        );
        Ok(request)
    }

    /// Approves a pending redemption. Approving again is a no-op.
    #[instrument(skip(self, technician))]
    pub fn approve(
        &self,
        redemption_id: RedemptionId,
        technician: Option<String>,
    ) -> Result<RedemptionRequest, LoyaltyError> {
        let now = self.clock.now();
        let (request, changed) = {
            let mut request = self
                .redemptions
                .get_mut(&redemption_id)
                .ok_or(LoyaltyError::RedemptionNotFound(redemption_id))?;
            let changed = request.approve(technician, now)?;
            (request.clone(), changed)
        };

        if changed {
            let message = match &request.technician_assigned {
                Some(technician) => format!(
                    "Your {} redemption was approved. Technician {} will contact you.",
                    request.reward_name, technician
                ),
                None => format!("Your {} redemption was approved.", request.reward_name),
            };
            self.notify(&request.phone_number, NotificationEvent::RedemptionApproved, message);
            info!(customer_id = %request.customer_id, "redemption approved");
        }
        Ok(request)
    }

    /// Marks an approved redemption delivered. Repeating is a no-op.
    #[instrument(skip(self))]
    pub fn mark_delivered(
        &self,
        redemption_id: RedemptionId,
    ) -> Result<RedemptionRequest, LoyaltyError> {
        let now = self.clock.now();
        let (request, changed) = {
            let mut request = self
                .redemptions
                .get_mut(&redemption_id)
                .ok_or(LoyaltyError::RedemptionNotFound(redemption_id))?;
            let changed = request.deliver(now)?;
            (request.clone(), changed)
        };

        if changed {
            self.notify(
                &request.phone_number,
                NotificationEvent::RedemptionDelivered,
                format!("Your {} has been delivered. Enjoy!", request.reward_name),
            );
            info!(customer_id = %request.customer_id, "redemption delivered");
        }
        Ok(request)
    }

    /// Rejects an undelivered redemption, refunding its points and
    /// returning any reserved stock. Rejecting again is a no-op.
    #[instrument(skip(self, reason))]
    pub fn reject(
        &self,
        redemption_id: RedemptionId,
        reason: Option<String>,
    ) -> Result<RedemptionRequest, LoyaltyError> {
        let customer_id = self
            .redemptions
            .get(&redemption_id)
            .map(|r| r.customer_id)
            .ok_or(LoyaltyError::RedemptionNotFound(redemption_id))?;
        let account = self
            .account(&customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let now = self.clock.now();

        let (request, changed) = {
            let mut data = account.lock();
            let (request, changed) = {
                let mut request = self
                    .redemptions
                    .get_mut(&redemption_id)
                    .ok_or(LoyaltyError::RedemptionNotFound(redemption_id))?;
                if request.status != RedemptionStatus::Rejected {
                    data.ensure_creditable(request.points_used)?;
                }
                let changed = request.reject(reason, now)?;
                (request.clone(), changed)
            };
            if changed {
                let correlation = Correlation {
                    reward_id: Some(request.reward_id),
                    redemption_id: Some(redemption_id),
                    description: Some(format!("refund for rejected redemption {redemption_id}")),
                    ..Correlation::default()
                };
                data.refund(
                    self.next_entry_id(),
                    request.reward_id,
                    request.points_used,
                    now,
                    correlation,
                    &self.tiers,
                )?;
                if request.stock_reserved {
                    self.catalog.release(request.reward_id, &request.location_code);
                }
            }
            (request, changed)
        };

        if changed {
            let message = match &request.rejection_reason {
                Some(reason) => format!(
                    "Your {} redemption was declined ({}). {} points were returned.",
                    request.reward_name, reason, request.points_used
                ),
                None => format!(
                    "Your {} redemption was declined. {} points were returned.",
                    request.reward_name, request.points_used
                ),
            };
            self.notify(&request.phone_number, NotificationEvent::RedemptionRejected, message);
            info!(customer_id = %customer_id, points = request.points_used, "redemption rejected");
        }
        Ok(request)
    }

    /// Applies a manual balance correction with an `Adjusted` entry.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::CustomerNotFound`]
    /// - [`LoyaltyError::InvalidAmount`] - `delta` is zero or would overflow the balance.
    /// - [`LoyaltyError::InsufficientPoints`] - A negative delta exceeds the balance.
    #[instrument(skip(self, reason))]
    pub fn adjust_points(
        &self,
        customer_id: CustomerId,
        delta: i64,
        reason: &str,
    ) -> Result<LedgerEntry, LoyaltyError> {
        let account = self
            .account(&customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let now = self.clock.now();
        let entry = account.lock().adjust(
            self.next_entry_id(),
            delta,
            now,
            Correlation::described(reason),
            &self.tiers,
        )?;
        info!(delta, balance = entry.balance_after, "points adjusted");
        Ok(entry)
    }

    /// Returns a handle to a customer's account.
    pub fn account(&self, customer_id: &CustomerId) -> Option<Arc<LoyaltyAccount>> {
        self.accounts.get(customer_id).map(|a| Arc::clone(a.value()))
    }

    /// All accounts ordered by customer ID.
    pub fn accounts(&self) -> Vec<Arc<LoyaltyAccount>> {
        let mut accounts: Vec<(CustomerId, Arc<LoyaltyAccount>)> = self
            .accounts
            .iter()
            .map(|a| (*a.key(), Arc::clone(a.value())))
            .collect();
        accounts.sort_by_key(|(id, _)| *id);
        accounts.into_iter().map(|(_, account)| account).collect()
    }

    pub fn redemption(&self, redemption_id: RedemptionId) -> Option<RedemptionRequest> {
        self.redemptions.get(&redemption_id).map(|r| r.clone())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn payments(&self) -> &PaymentRegistry {
        &self.payments
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TierResolver {
        &self.tiers
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn account_or_create(&self, customer_id: CustomerId, phone_number: &str) -> Arc<LoyaltyAccount> {
        let account = self
            .accounts
            .entry(customer_id)
            .or_insert_with(|| {
                debug!(customer_id = %customer_id, "creating loyalty account");
                Arc::new(LoyaltyAccount::new(customer_id, phone_number))
            });
        Arc::clone(account.value())
    }

    fn expiry_for(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_months(Months::new(self.config.expiry_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub(crate) fn next_entry_id(&self) -> EntryId {
        EntryId(self.next_entry.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn redemptions_for(&self, ids: &[RedemptionId]) -> Vec<RedemptionRequest> {
        ids.iter().filter_map(|id| self.redemption(*id)).collect()
    }

    /// Best-effort send; failures are logged and dropped.
    pub(crate) fn notify(&self, phone_number: &str, event: NotificationEvent, message: String) {
        if phone_number.is_empty() {
            debug!(%event, "no phone number on file, notification skipped");
            return;
        }
        let notification = Notification {
            phone_number: phone_number.to_string(),
            channel: self.config.default_channel,
            event,
            message,
        };
        if let Err(error) = self.notifier.send(notification) {
            warn!(%error, %event, "notification failed");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
