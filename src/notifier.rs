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

//! Outbound customer notifications.
//!
//! The engine hands a [`Notification`] to a [`Notifier`] only after the
//! mutation that caused it has committed and every lock is released. A
//! failed send is logged and dropped.

use crossbeam::channel::{self, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Sms,
    Email,
    Push,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
            Channel::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    RewardUnlocked,
    RedemptionRequested,
    RedemptionApproved,
    RedemptionDelivered,
    RedemptionRejected,
    PointsExpired,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RewardUnlocked => "reward_unlocked",
            Self::RedemptionRequested => "redemption_requested",
            Self::RedemptionApproved => "redemption_approved",
            Self::RedemptionDelivered => "redemption_delivered",
            Self::RedemptionRejected => "redemption_rejected",
            Self::PointsExpired => "points_expired",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub phone_number: String,
    pub channel: Channel,
    pub event: NotificationEvent,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification queue is closed")]
    Closed,
}

/// Delivery transport for customer notifications.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifierError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifierError> {
        info!(
            phone = %notification.phone_number,
            channel = %notification.channel,
            event = %notification.event,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// Hands notifications to a background thread so callers never wait on
/// the transport.
///
/// Dropping the notifier closes the queue and waits for the worker to
/// drain what was already accepted.
pub struct QueuedNotifier {
    sender: Option<Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedNotifier {
    pub fn new<N>(transport: N) -> Self
    where
        N: Notifier + 'static,
    {
        let (sender, receiver) = channel::unbounded::<Notification>();
        let worker = thread::Builder::new()
            .name("loyalty-notifier".into())
            .spawn(move || {
                for notification in receiver {
                    let event = notification.event;
                    if let Err(error) = transport.send(notification) {
                        warn!(%error, %event, "notification delivery failed");
                    }
                }
            });

        match worker {
            Ok(worker) => Self {
                sender: Some(sender),
                worker: Some(worker),
            },
            Err(error) => {
                warn!(%error, "failed to start notifier thread, notifications disabled");
                Self {
                    sender: None,
                    worker: None,
                }
            }
        }
    }
}

impl Notifier for QueuedNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifierError> {
        let sender = self.sender.as_ref().ok_or(NotifierError::Closed)?;
        sender.send(notification).map_err(|_| NotifierError::Closed)
    }
}

impl Drop for QueuedNotifier {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("notifier thread panicked");
            }
        }
    }
}
