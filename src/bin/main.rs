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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use loyalty_ledger_rs::{
    CustomerId, Engine, LoyaltyConfig, LoyaltyError, PackageDescriptor, PurchaseEvent,
    RedeemCommand, RedemptionId, RewardId,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Loyalty Ledger - Replay loyalty commands from a CSV file
///
/// Reads award, redemption and adjustment commands from a CSV file and
/// outputs account summaries to stdout.
#[derive(Parser, Debug)]
#[command(name = "loyalty-ledger-rs")]
#[command(about = "A loyalty points engine that processes command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,customer,phone,package,days,points,payment_ref,reward,location,redemption,note[,hourly]
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON file with point rules, tiers and the reward catalog
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Run one expiry sweep after all commands are applied
    #[arg(long)]
    sweep: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => match LoyaltyConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => LoyaltyConfig::default(),
    };
    let engine = match Engine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_commands(&engine, BufReader::new(file)) {
        eprintln!("Error processing commands: {}", e);
        process::exit(1);
    }

    if args.sweep {
        let report = engine.sweep_expired();
        info!(
            entries = report.entries_expired,
            points = report.points_expired,
            "sweep complete"
        );
    }

    if let Err(e) = write_accounts(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record. Columns a command does not use are left empty.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    customer: Option<u64>,
    phone: Option<String>,
    package: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    days: Option<u32>,
    /// Point override for `award`, signed delta for `adjust`.
    #[serde(deserialize_with = "csv::invalid_option")]
    points: Option<i64>,
    payment_ref: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    reward: Option<u32>,
    location: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    redemption: Option<u64>,
    /// Delivery address, technician, rejection or adjustment reason.
    note: Option<String>,
    /// Optional trailing column marking an hour-based `award` package.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    hourly: Option<bool>,
}

#[derive(Debug)]
enum Command {
    Award(PurchaseEvent),
    Redeem(RedeemCommand),
    Approve(RedemptionId, Option<String>),
    Deliver(RedemptionId),
    Reject(RedemptionId, Option<String>),
    Adjust(CustomerId, i64, String),
}

impl CsvRecord {
    /// Returns `None` for unknown command types or missing required fields.
    fn into_command(self) -> Option<Command> {
        match self.kind.to_lowercase().as_str() {
            "award" => {
                let mut package = PackageDescriptor::new(self.package?, self.days?);
                package.hourly = self.hourly.unwrap_or(false);
                package.points_override = self
                    .points
                    .and_then(|p| u64::try_from(p).ok())
                    .filter(|p| *p > 0);
                Some(Command::Award(PurchaseEvent {
                    customer_id: CustomerId(self.customer?),
                    phone_number: self.phone.unwrap_or_default(),
                    package,
                    payment_ref: self.payment_ref,
                    package_ref: None,
                }))
            }
            "redeem" => Some(Command::Redeem(RedeemCommand {
                customer_id: CustomerId(self.customer?),
                reward_id: RewardId(self.reward?),
                delivery_method: String::new(),
                delivery_address: self.note,
                location_code: self.location,
            })),
            "approve" => Some(Command::Approve(RedemptionId(self.redemption?), self.note)),
            "deliver" => Some(Command::Deliver(RedemptionId(self.redemption?))),
            "reject" => Some(Command::Reject(RedemptionId(self.redemption?), self.note)),
            "adjust" => Some(Command::Adjust(
                CustomerId(self.customer?),
                self.points?,
                self.note.unwrap_or_else(|| "manual adjustment".into()),
            )),
            _ => None,
        }
    }
}

fn apply(engine: &Engine, command: Command) -> Result<(), LoyaltyError> {
    match command {
        Command::Award(event) => engine.award_points(event).map(|_| ()),
        Command::Redeem(command) => engine.redeem(command).map(|_| ()),
        Command::Approve(id, technician) => engine.approve(id, technician).map(|_| ()),
        Command::Deliver(id) => engine.mark_delivered(id).map(|_| ()),
        Command::Reject(id, reason) => engine.reject(id, reason).map(|_| ()),
        Command::Adjust(customer_id, delta, reason) => {
            engine.adjust_points(customer_id, delta, &reason).map(|_| ())
        }
    }
}

/// Applies commands from a CSV reader, returning how many succeeded.
///
/// Rows are streamed. Malformed rows and rejected commands are logged and
/// skipped.
///
/// # CSV Format
///
/// ```csv
/// type,customer,phone,package,days,points,payment_ref,reward,location,redemption,note,hourly
/// award,1,254700000001,hotspot,30,,MPESA-1,,,,
/// award,2,254700000002,hotspot,1,,,,,,,true
/// redeem,1,,,,,,7,NBO,,
/// approve,,,,,,,,,1,tech-42
/// ```
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn process_commands<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut applied = 0;
    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };
        let kind = record.kind.clone();
        let Some(command) = record.into_command() else {
            warn!(row, kind = %kind, "skipping invalid command");
            continue;
        };
        match apply(engine, command) {
            Ok(()) => applied += 1,
            Err(e) => warn!(row, kind = %kind, error = %e, "command rejected"),
        }
    }

    Ok(applied)
}

/// Writes account summaries as CSV, ordered by customer.
///
/// Columns: `customer, phone, balance, total_earned, total_redeemed, tier, status`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in engine.accounts() {
        wtr.serialize(&*account)?;
    }
    wtr.flush()?;
    Ok(())
}
