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

//! Payment reference registry.
//!
//! Payment webhooks are retried upstream, so the same purchase-completed
//! event can arrive more than once. Awarding records the payment reference
//! here first and refuses references it has already seen.

use crate::LoyaltyError;
use crate::base::CustomerId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Default)]
pub struct PaymentRegistry {
    /// Payment reference to the customer it was awarded to.
    awarded: DashMap<String, CustomerId>,
}

impl PaymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a payment reference.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::DuplicatePayment`] if the reference was
    /// already recorded.
    pub fn register(&self, payment_ref: &str, customer_id: CustomerId) -> Result<(), LoyaltyError> {
        // Entry API makes check-and-insert atomic.
        match self.awarded.entry(payment_ref.to_string()) {
            Entry::Occupied(_) => Err(LoyaltyError::DuplicatePayment(payment_ref.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(customer_id);
                Ok(())
            }
        }
    }

    /// Forgets a payment reference whose award did not go through, so a
    /// corrected retry can claim it.
    pub fn release(&self, payment_ref: &str) {
        self.awarded.remove(payment_ref);
    }

    pub fn awarded_to(&self, payment_ref: &str) -> Option<CustomerId> {
        self.awarded.get(payment_ref).map(|c| *c)
    }

    pub fn len(&self) -> usize {
        self.awarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.awarded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn duplicate_reference_is_rejected() {
        let registry = PaymentRegistry::new();
        registry.register("MPESA-1", CustomerId(1)).unwrap();
        assert_eq!(
            registry.register("MPESA-1", CustomerId(2)),
            Err(LoyaltyError::DuplicatePayment("MPESA-1".into()))
        );
        assert_eq!(registry.awarded_to("MPESA-1"), Some(CustomerId(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn released_reference_can_be_claimed_again() {
        let registry = PaymentRegistry::new();
        registry.register("MPESA-2", CustomerId(1)).unwrap();
        registry.release("MPESA-2");
        assert!(registry.is_empty());
        registry.register("MPESA-2", CustomerId(1)).unwrap();
        assert_eq!(registry.awarded_to("MPESA-2"), Some(CustomerId(1)));
    }

    #[test]
    fn concurrent_registration_admits_exactly_one() {
        let registry = Arc::new(PaymentRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register("MPESA-9", CustomerId(i)).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
