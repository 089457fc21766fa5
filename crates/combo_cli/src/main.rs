//! Smoke-check CLI for the execution engine.
//!
//! # Responsibility
//! - Verify `combo_core` linkage with deterministic output.
//! - Inspect persisted balances of one account in an existing ledger file.

use clap::{Parser, Subcommand};
use combo_core::db::open_db_read_only;
use combo_core::{Address, Ledger, SqliteLedger};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "combo_cli", version, about = "Smoke checks for the combo execution engine")]
struct Cli {
    /// Without a subcommand, prints ping and version.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the balances an account holds in a ledger file.
    Balances {
        /// Existing ledger database; never created or migrated.
        db_path: PathBuf,
        /// Account as `0x` + 40 hex digits.
        address: Address,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        None => {
            println!("combo_core ping={}", combo_core::ping());
            println!("combo_core version={}", combo_core::core_version());
            ExitCode::SUCCESS
        }
        Some(Command::Balances { db_path, address }) => match print_balances(&db_path, &address) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
    }
}

fn print_balances(db_path: &Path, account: &Address) -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_db_read_only(db_path)?;
    let balances = SqliteLedger::new(&conn).balances(account)?;
    if balances.is_empty() {
        println!("{account} holds nothing");
    }
    for (asset, amount) in balances {
        println!("{account} {asset}={amount}");
    }
    Ok(())
}
