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

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! These tests drive the real engine from many threads and verify that the
//! account, inventory and redemption locks never form a cycle. The
//! `deadlock_detection` feature of parking_lot is enabled for tests, so any
//! cycle in the lock graph is reported with backtraces.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use loyalty_ledger_rs::{
    CustomerId, Engine, LogNotifier, LoyaltyConfig, ManualClock, PackageDescriptor, PurchaseEvent,
    QueuedNotifier, RedeemCommand, RedemptionId, RewardId, Sweeper,
};
use parking_lot::deadlock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

// === Helpers ===

const CATALOG: &str = r#"{
    "rewards": [
        { "reward_id": 1, "name": "Speed boost", "points_required": 5 },
        { "reward_id": 2, "name": "Router", "points_required": 30 }
    ],
    "inventory": [
        { "reward_id": 2, "location_code": "NBO", "stock_available": 1000 },
        { "reward_id": 2, "location_code": "MSA", "stock_available": 1000 }
    ]
}"#;

fn engine() -> Engine {
    Engine::from_config(LoyaltyConfig::from_json(CATALOG).unwrap()).unwrap()
}

fn award(engine: &Engine, customer: u64, points: u64) {
    let mut package = PackageDescriptor::new("hotspot", 30);
    package.points_override = Some(points);
    let _ = engine.award_points(PurchaseEvent {
        customer_id: CustomerId(customer),
        phone_number: format!("254733{customer:06}"),
        package,
        payment_ref: None,
        package_ref: None,
    });
}

fn redeem(engine: &Engine, customer: u64, reward: u32, location: &str) -> Option<RedemptionId> {
    engine
        .redeem(RedeemCommand {
            customer_id: CustomerId(customer),
            reward_id: RewardId(reward),
            delivery_method: String::new(),
            delivery_address: None,
            location_code: Some(location.to_string()),
        })
        .ok()
        .map(|r| r.redemption_id)
}

fn assert_consistent(engine: &Engine) {
    for account in engine.accounts() {
        let entries = account.entries();
        assert_eq!(
            account.balance(),
            entries.last().map_or(0, |e| e.balance_after)
        );
        assert_eq!(account.replay_balance(), i128::from(account.balance()));
    }
}

// === Tests ===

/// High contention on a single account with many threads.
#[test]
fn no_deadlock_high_contention_single_account() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(engine());
    award(&engine, 1, 100);

    const NUM_THREADS: usize = 32;
    const OPS_PER_THREAD: usize = 100;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    match (t + i) % 4 {
                        0 => award(&engine, 1, 10),
                        1 => {
                            redeem(&engine, 1, 1, "GLOBAL");
                        }
                        2 => {
                            let _ = engine.adjust_points(CustomerId(1), -1, "contention");
                        }
                        _ => {
                            let _ = engine.account_snapshot(CustomerId(1));
                            let _ = engine.transaction_history(CustomerId(1), 1, 20);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);
    assert_consistent(&engine);
}

/// Redemption workflow actions racing on shared requests and stock.
#[test]
fn no_deadlock_workflow_races() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(engine());
    for customer in 1..=8 {
        award(&engine, customer, 1_000);
    }

    let redeemers: Vec<_> = (1..=8u64)
        .map(|customer| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let location = if customer % 2 == 0 { "NBO" } else { "MSA" };
                (0..20)
                    .filter_map(|_| redeem(&engine, customer, 2, location))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let ids: Vec<RedemptionId> = redeemers
        .into_iter()
        .flat_map(|h| h.join().expect("Thread panicked"))
        .collect();
    let ids = Arc::new(ids);

    let admins: Vec<_> = (0..6)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for id in ids.iter() {
                    match t % 3 {
                        0 => {
                            let _ = engine.approve(*id, Some(format!("tech-{t}")));
                        }
                        1 => {
                            let _ = engine.mark_delivered(*id);
                        }
                        _ => {
                            let _ = engine.reject(*id, Some("race".into()));
                        }
                    }
                }
            })
        })
        .collect();

    for handle in admins {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);
    assert_consistent(&engine);

    let outstanding = ids
        .iter()
        .filter_map(|id| engine.redemption(*id))
        .filter(|r| r.rejected_at.is_none())
        .count();
    let stock = engine.catalog().reward(RewardId(2)).unwrap().inventory_count;
    assert_eq!(stock as usize + outstanding, 2_000);
}

/// Expiry sweeps running in the background while customers transact.
#[test]
fn no_deadlock_sweeper_vs_transactions() {
    let detector = start_deadlock_detector();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    ));
    let engine = Arc::new(engine().with_clock(clock.clone()));
    for customer in 1..=10 {
        award(&engine, customer, 50);
    }
    clock.advance(ChronoDuration::days(100));

    let sweeper = Sweeper::spawn(Arc::clone(&engine), Duration::from_millis(1)).unwrap();
    let handles: Vec<_> = (1..=10u64)
        .map(|customer| {
            let engine = Arc::clone(&engine);
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                for i in 0..200 {
                    award(&engine, customer, 3);
                    redeem(&engine, customer, 1, "GLOBAL");
                    if i % 50 == 0 {
                        clock.advance(ChronoDuration::days(30));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    sweeper.shutdown();

    stop_deadlock_detector(detector);
    assert_consistent(&engine);
}

/// Queued notifications are dispatched off the caller's locks.
#[test]
fn no_deadlock_with_queued_notifier() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(engine().with_notifier(Arc::new(QueuedNotifier::new(LogNotifier))));

    let handles: Vec<_> = (1..=16u64)
        .map(|customer| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..100 {
                    award(&engine, customer % 4, 6);
                    if let Some(id) = redeem(&engine, customer % 4, 1, "GLOBAL") {
                        let _ = engine.approve(id, None);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);
    assert_consistent(&engine);
}
