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

//! Dashboard read models.

use crate::LoyaltyError;
use crate::account::AccountSnapshot;
use crate::base::{CustomerId, RewardId};
use crate::engine::Engine;
use crate::ledger::LedgerEntry;
use crate::redemption::RedemptionRequest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// One page of a newest-first listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page)
    }
}

/// Distance to the cheapest reward the customer cannot yet afford.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardProgress {
    pub reward_id: RewardId,
    pub reward_name: String,
    pub points_required: u64,
    pub balance: u64,
    pub points_needed: u64,
    /// Percentage of the cost already held, rounded to two places.
    pub percent: Decimal,
}

impl Engine {
    /// Account summary including the perks of the current tier band.
    pub fn account_snapshot(&self, customer_id: CustomerId) -> Option<AccountSnapshot> {
        let account = self.account(&customer_id)?;
        let mut snapshot = account.snapshot();
        snapshot.perks = self.tiers().perks(snapshot.balance);
        Some(snapshot)
    }

    /// Ledger entries, newest first. `per_page` is clamped to the configured
    /// maximum.
    pub fn transaction_history(
        &self,
        customer_id: CustomerId,
        page: usize,
        per_page: usize,
    ) -> Result<Page<LedgerEntry>, LoyaltyError> {
        let account = self
            .account(&customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let page = page.max(1);
        let per_page = per_page.clamp(1, self.config().max_page_size.max(1));

        let data = account.lock();
        let entries = data.entries();
        let items = entries
            .iter()
            .rev()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page,
            per_page,
            total: entries.len(),
        })
    }

    /// The customer's redemption requests, newest first.
    pub fn redemption_history(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<RedemptionRequest>, LoyaltyError> {
        let account = self
            .account(&customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let ids = account.lock().redemptions().to_vec();
        let mut requests = self.redemptions_for(&ids);
        requests.reverse();
        Ok(requests)
    }

    /// Progress toward the cheapest available reward above the balance.
    /// `None` when every available reward is already affordable.
    pub fn progress_to_next_reward(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<RewardProgress>, LoyaltyError> {
        let account = self
            .account(&customer_id)
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let balance = account.balance();

        let Some(reward) = self.catalog().next_unaffordable(balance, self.now()) else {
            return Ok(None);
        };
        let percent = (Decimal::from(balance) * dec!(100) / Decimal::from(reward.points_required))
            .round_dp(2);

        Ok(Some(RewardProgress {
            reward_id: reward.reward_id,
            reward_name: reward.name,
            points_required: reward.points_required,
            balance,
            points_needed: reward.points_required - balance,
            percent,
        }))
    }
}
