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

//! Point expiry.
//!
//! [`Engine::sweep_expired`] ages out earned entries whose `expires_at` has
//! passed. Each earned entry is flagged once, under its account's lock, in
//! the same step that writes the compensating `Expired` entry, so a sweep
//! that stops halfway is simply finished by the next run.
//!
//! [`Sweeper`] runs the sweep on a fixed interval from a background thread.

use crate::engine::Engine;
use crate::notifier::NotificationEvent;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Totals for one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub accounts_scanned: usize,
    /// Earned entries flagged as expired.
    pub entries_expired: usize,
    pub points_expired: u64,
}

impl Engine {
    /// Expires every earned entry that is due at the current time.
    #[instrument(skip(self))]
    pub fn sweep_expired(&self) -> SweepReport {
        let now = self.now();
        let mut report = SweepReport::default();

        for account in self.accounts() {
            report.accounts_scanned += 1;

            let (expired_points, expired_entries, balance, phone) = {
                let mut data = account.lock();
                let mut expired_points = 0u64;
                let mut expired_entries = 0usize;
                for index in data.due_entries(now) {
                    match data.expire_entry(index, self.next_entry_id(), now, self.tiers()) {
                        Some(expired) => {
                            debug!(
                                earned_id = %expired.earned_id,
                                amount = expired.amount,
                                "earned entry expired"
                            );
                            expired_points += expired.amount;
                            expired_entries += 1;
                        }
                        None => warn!(index, "entry no longer due, skipped"),
                    }
                }
                (
                    expired_points,
                    expired_entries,
                    data.balance(),
                    data.phone_number().to_string(),
                )
            };

            report.entries_expired += expired_entries;
            report.points_expired += expired_points;
            if expired_points > 0 {
                self.notify(
                    &phone,
                    NotificationEvent::PointsExpired,
                    format!(
                        "{expired_points} loyalty points have expired. Your balance is now {balance} points."
                    ),
                );
            }
        }

        if report.entries_expired > 0 {
            info!(
                entries = report.entries_expired,
                points = report.points_expired,
                "expiry sweep finished"
            );
        }
        report
    }
}

/// Periodic expiry sweep on a dedicated thread.
pub struct Sweeper;

impl Sweeper {
    /// Starts sweeping every `interval`; the first sweep runs one interval
    /// after start.
    pub fn spawn(engine: Arc<Engine>, interval: Duration) -> io::Result<SweeperHandle> {
        let (shutdown, signal) = channel::bounded::<()>(1);
        let worker = thread::Builder::new()
            .name("loyalty-sweeper".into())
            .spawn(move || {
                info!(?interval, "expiry sweeper started");
                let mut runs = 0usize;
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            engine.sweep_expired();
                            runs += 1;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(runs, "expiry sweeper stopped");
                runs
            })?;

        Ok(SweeperHandle { shutdown, worker })
    }
}

pub struct SweeperHandle {
    shutdown: Sender<()>,
    worker: JoinHandle<usize>,
}

impl SweeperHandle {
    /// Stops the sweeper after any in-flight run and returns how many
    /// sweeps it completed.
    pub fn shutdown(self) -> usize {
        let _ = self.shutdown.send(());
        match self.worker.join() {
            Ok(runs) => runs,
            Err(_) => {
                warn!("expiry sweeper thread panicked");
                0
            }
        }
    }
}
