//! Balance ledger contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide balance reads and transfers over the `balances` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Balances never go negative; a short debit fails before any write.
//! - Amounts are stored as decimal text and must parse back as `u128`.
//! - The ledger never opens transactions itself: the dispatcher owns the
//!   transaction an invocation runs in.

use crate::db::DbError;
use crate::error::{Revert, RevertKind};
use crate::model::address::{Address, Asset};
use crate::model::amount::Amount;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger persistence and accounting errors.
#[derive(Debug)]
pub enum LedgerError {
    InsufficientBalance {
        account: Address,
        asset: Asset,
        required: Amount,
        available: Amount,
    },
    Overflow {
        account: Address,
        asset: Asset,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientBalance {
                account,
                asset,
                required,
                available,
            } => write!(
                f,
                "insufficient {asset} balance for {account}: required {required}, available {available}"
            ),
            Self::Overflow { account, asset } => {
                write!(f, "{asset} balance overflow for {account}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<LedgerError> for Revert {
    fn from(value: LedgerError) -> Self {
        let (operation, kind) = match &value {
            LedgerError::InsufficientBalance { .. } => {
                ("transfer", RevertKind::InsufficientBalance)
            }
            LedgerError::Overflow { .. } => ("transfer", RevertKind::InvalidInput),
            LedgerError::Db(_) => ("query", RevertKind::Storage),
            LedgerError::InvalidData(_) => ("decode", RevertKind::Storage),
        };
        Revert::new("Ledger", operation, kind, value.to_string())
    }
}

/// Committed invocation summary kept for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub invocation_id: Uuid,
    pub caller: Address,
    pub step_count: u32,
    pub value_received: Amount,
    pub value_consumed: Amount,
    pub refunded: Amount,
    pub return_data: Vec<u8>,
}

/// World-state balance interface shared by the dispatcher, handlers and
/// external protocols.
pub trait Ledger {
    fn balance_of(&self, account: &Address, asset: &Asset) -> LedgerResult<Amount>;
    /// Mints `amount` into `account` (funding and test setup).
    fn credit(&self, account: &Address, asset: &Asset, amount: Amount) -> LedgerResult<()>;
    /// Burns `amount` from `account`.
    fn debit(&self, account: &Address, asset: &Asset, amount: Amount) -> LedgerResult<()>;
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: Amount,
    ) -> LedgerResult<()>;
    /// Non-zero balances of `account`, ordered by asset key.
    fn balances(&self, account: &Address) -> LedgerResult<Vec<(Asset, Amount)>>;
}

/// SQLite-backed ledger over a migrated connection or open transaction.
pub struct SqliteLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedger<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Appends one committed-invocation audit row.
    pub fn record_invocation(&self, record: &InvocationRecord) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO invocations (
                invocation_id,
                caller,
                step_count,
                value_received,
                value_consumed,
                refunded,
                return_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                record.invocation_id.to_string(),
                record.caller.to_string(),
                record.step_count,
                record.value_received.to_string(),
                record.value_consumed.to_string(),
                record.refunded.to_string(),
                record.return_data.as_slice(),
            ],
        )?;
        Ok(())
    }

    /// Lists committed invocations for one caller, oldest first.
    pub fn invocations_by_caller(&self, caller: &Address) -> LedgerResult<Vec<InvocationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                invocation_id,
                caller,
                step_count,
                value_received,
                value_consumed,
                refunded,
                return_data
             FROM invocations
             WHERE caller = ?1
             ORDER BY committed_at ASC, rowid ASC;",
        )?;
        let rows = stmt.query_map([caller.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, caller, step_count, received, consumed, refunded, return_data) = row?;
            records.push(InvocationRecord {
                invocation_id: Uuid::parse_str(&id)
                    .map_err(|err| LedgerError::InvalidData(format!("invocation id `{id}`: {err}")))?,
                caller: Address::parse(&caller)
                    .map_err(|err| LedgerError::InvalidData(err.to_string()))?,
                step_count,
                value_received: parse_amount(&received)?,
                value_consumed: parse_amount(&consumed)?,
                refunded: parse_amount(&refunded)?,
                return_data,
            });
        }
        Ok(records)
    }

    /// Total committed invocations.
    pub fn invocation_count(&self) -> LedgerResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM invocations;", [], |row| {
                row.get::<_, i64>(0)
            })?;
        Ok(count.max(0) as u64)
    }

    fn write_balance(&self, account: &Address, asset: &Asset, amount: Amount) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO balances (account, asset, amount)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(account, asset) DO UPDATE SET
                amount = excluded.amount,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![account.to_string(), asset.storage_key(), amount.to_string()],
        )?;
        Ok(())
    }
}

impl Ledger for SqliteLedger<'_> {
    fn balance_of(&self, account: &Address, asset: &Asset) -> LedgerResult<Amount> {
        let stored = self
            .conn
            .query_row(
                "SELECT amount FROM balances WHERE account = ?1 AND asset = ?2;",
                params![account.to_string(), asset.storage_key()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match stored {
            Some(raw) => parse_amount(&raw),
            None => Ok(0),
        }
    }

    fn credit(&self, account: &Address, asset: &Asset, amount: Amount) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.balance_of(account, asset)?;
        let next = current.checked_add(amount).ok_or(LedgerError::Overflow {
            account: *account,
            asset: *asset,
        })?;
        self.write_balance(account, asset, next)
    }

    fn debit(&self, account: &Address, asset: &Asset, amount: Amount) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.balance_of(account, asset)?;
        let next = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *account,
                asset: *asset,
                required: amount,
                available: current,
            })?;
        self.write_balance(account, asset, next)
    }

    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: Amount,
    ) -> LedgerResult<()> {
        if amount == 0 || from == to {
            // Still surface a short balance for self-transfers.
            let available = self.balance_of(from, asset)?;
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    account: *from,
                    asset: *asset,
                    required: amount,
                    available,
                });
            }
            return Ok(());
        }
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    fn balances(&self, account: &Address) -> LedgerResult<Vec<(Asset, Amount)>> {
        let mut stmt = self.conn.prepare(
            "SELECT asset, amount
             FROM balances
             WHERE account = ?1
             ORDER BY asset ASC;",
        )?;
        let rows = stmt.query_map([account.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut balances = Vec::new();
        for row in rows {
            let (asset_key, raw_amount) = row?;
            let amount = parse_amount(&raw_amount)?;
            if amount == 0 {
                continue;
            }
            let asset = Asset::parse(&asset_key)
                .map_err(|err| LedgerError::InvalidData(err.to_string()))?;
            balances.push((asset, amount));
        }
        Ok(balances)
    }
}

fn parse_amount(raw: &str) -> LedgerResult<Amount> {
    raw.parse::<Amount>()
        .map_err(|err| LedgerError::InvalidData(format!("amount `{raw}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LedgerError, SqliteLedger};
    use crate::db::open_db_in_memory;
    use crate::model::address::{Address, Asset};

    fn token() -> Asset {
        Asset::Token(Address::from_low_u64(0xda1))
    }

    #[test]
    fn unknown_balance_reads_as_zero() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        assert_eq!(
            ledger
                .balance_of(&Address::from_low_u64(1), &Asset::Native)
                .expect("balance read"),
            0
        );
    }

    #[test]
    fn credit_then_transfer_moves_balance() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        let alice = Address::from_low_u64(1);
        let bob = Address::from_low_u64(2);

        ledger.credit(&alice, &token(), 100).expect("credit");
        ledger.transfer(&alice, &bob, &token(), 40).expect("transfer");

        assert_eq!(ledger.balance_of(&alice, &token()).expect("alice"), 60);
        assert_eq!(ledger.balance_of(&bob, &token()).expect("bob"), 40);
    }

    #[test]
    fn short_transfer_fails_without_writes() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        let alice = Address::from_low_u64(1);
        let bob = Address::from_low_u64(2);
        ledger.credit(&alice, &Asset::Native, 5).expect("credit");

        let err = ledger
            .transfer(&alice, &bob, &Asset::Native, 6)
            .expect_err("overdraft must fail");
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                required: 6,
                available: 5,
                ..
            }
        ));
        assert_eq!(ledger.balance_of(&alice, &Asset::Native).expect("alice"), 5);
        assert_eq!(ledger.balance_of(&bob, &Asset::Native).expect("bob"), 0);
    }

    #[test]
    fn amounts_beyond_i64_roundtrip_as_text() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        let whale = Address::from_low_u64(9);
        let large = u128::from(u64::MAX) * 1_000;
        ledger.credit(&whale, &Asset::Native, large).expect("credit");
        assert_eq!(
            ledger.balance_of(&whale, &Asset::Native).expect("read"),
            large
        );
    }

    #[test]
    fn balances_lists_non_zero_assets_only() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        let alice = Address::from_low_u64(1);
        ledger.credit(&alice, &Asset::Native, 3).expect("native");
        ledger.credit(&alice, &token(), 7).expect("token");
        ledger.debit(&alice, &token(), 7).expect("drain token");

        let balances = ledger.balances(&alice).expect("list");
        assert_eq!(balances, vec![(Asset::Native, 3)]);
    }
}
