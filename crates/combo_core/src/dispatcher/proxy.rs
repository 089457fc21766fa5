//! Atomic multi-step execution.
//!
//! # Responsibility
//! - Run an ordered instruction list against registry-approved handlers
//!   inside one ledger transaction.
//! - Account native value, sweep tracked tokens and refund surplus value to
//!   the caller before commit.
//! - Reject nested execution from inside an in-flight invocation.
//!
//! # Invariants
//! - Either every effect of an invocation commits or none does.
//! - Every target is resolved through the registry right before its step.
//! - After commit the dispatcher holds none of the invocation's tracked
//!   tokens and none of its native value.

use crate::config::EngineConfig;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::dispatcher::execution::ExecutionContext;
use crate::error::{Revert, RevertKind};
use crate::handler::HandlerContext;
use crate::ledger::{InvocationRecord, Ledger, LedgerError, SqliteLedger};
use crate::model::address::{Address, Asset};
use crate::model::amount::{resolve_amount, Amount};
use crate::model::instruction::{Instruction, Invocation};
use crate::registry::SharedRegistry;
use log::{debug, error, info};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use uuid::Uuid;

const COMPONENT: &str = "Proxy";

/// Outcome of one committed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub invocation_id: Uuid,
    /// Raw return data of the last step; empty when no step ran.
    pub return_data: Vec<u8>,
    pub steps: usize,
    pub value_received: Amount,
    pub value_consumed: Amount,
    pub refunded: Amount,
    /// Tokens returned to the caller, in asset order.
    pub swept: Vec<(Asset, Amount)>,
}

/// Entry point that sequences handler calls atomically.
pub struct Dispatcher {
    address: Address,
    registry: SharedRegistry,
    conn: Mutex<Connection>,
    in_flight: Mutex<bool>,
}

impl Dispatcher {
    /// Wraps a migrated connection.
    pub fn new(address: Address, registry: SharedRegistry, conn: Connection) -> Self {
        Self {
            address,
            registry,
            conn: Mutex::new(conn),
            in_flight: Mutex::new(false),
        }
    }

    /// Opens the configured ledger database and wraps it.
    pub fn open(config: &EngineConfig, registry: SharedRegistry) -> Result<Self, DbError> {
        let conn = match &config.database.path {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        Ok(Self::new(config.dispatcher_address, registry, conn))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Runs `instructions` for `caller` with `value` attached and returns the
    /// last step's raw return data.
    pub fn execute(
        &self,
        caller: Address,
        value: Amount,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<u8>, Revert> {
        let invocation = Invocation::new(caller, value, instructions);
        self.execute_invocation(&invocation)
            .map(|receipt| receipt.return_data)
    }

    /// Runs one invocation atomically.
    ///
    /// # Errors
    /// - `ReentrancyDetected` while another invocation is in flight, from any
    ///   thread. Hosts sharing one dispatcher retry after it finishes.
    /// - Any step's `Revert`; nothing is committed in that case.
    pub fn execute_invocation(&self, invocation: &Invocation) -> Result<ExecutionReceipt, Revert> {
        // Admission comes first so nested callers never wait on `conn`.
        let _flight = InFlight::enter(&self.in_flight)?;
        let mut conn = lock(&self.conn);

        let started_at = Instant::now();
        let mut state = ExecutionContext::new(invocation.caller);
        info!(
            "event=execute module=dispatcher status=start invocation_id={} caller={} steps={} value={} token_inputs={}",
            state.invocation_id(),
            invocation.caller,
            invocation.instructions.len(),
            invocation.value,
            invocation.token_inputs.len()
        );

        match self.run(&mut conn, &mut state, invocation) {
            Ok(receipt) => {
                info!(
                    "event=execute module=dispatcher status=ok invocation_id={} steps={} value_received={} value_consumed={} refunded={} duration_ms={}",
                    receipt.invocation_id,
                    receipt.steps,
                    receipt.value_received,
                    receipt.value_consumed,
                    receipt.refunded,
                    started_at.elapsed().as_millis()
                );
                Ok(receipt)
            }
            Err(revert) => {
                error!(
                    "event=execute module=dispatcher status=error invocation_id={} error_code={} duration_ms={} reason={}",
                    state.invocation_id(),
                    revert.kind().as_str(),
                    started_at.elapsed().as_millis(),
                    revert
                );
                Err(revert)
            }
        }
    }

    /// Runs `read` against the ledger outside any invocation.
    ///
    /// Fails with `ReentrancyDetected` while an invocation is in flight,
    /// since the ledger is locked for it.
    pub fn with_ledger<R>(&self, read: impl FnOnce(&SqliteLedger<'_>) -> R) -> Result<R, Revert> {
        self.reject_reentry()?;
        let conn = lock(&self.conn);
        Ok(read(&SqliteLedger::new(&conn)))
    }

    /// Committed invocations recorded in the audit table.
    pub fn invocation_count(&self) -> Result<u64, Revert> {
        self.with_ledger(|ledger| ledger.invocation_count())?
            .map_err(Revert::from)
    }

    fn reject_reentry(&self) -> Result<(), Revert> {
        if *lock(&self.in_flight) {
            return Err(reentrancy());
        }
        Ok(())
    }

    fn run(
        &self,
        conn: &mut Connection,
        state: &mut ExecutionContext,
        invocation: &Invocation,
    ) -> Result<ExecutionReceipt, Revert> {
        let step_count = u32::try_from(invocation.instructions.len())
            .map_err(|_| revert(RevertKind::InvalidInput, "too many instructions"))?;
        let tx = conn.transaction().map_err(LedgerError::from)?;

        let receipt = {
            let ledger = SqliteLedger::new(&tx);
            self.receive_inputs(&ledger, state, invocation)?;
            for (index, instruction) in invocation.instructions.iter().enumerate() {
                self.run_step(&ledger, state, index, instruction)?;
            }
            let swept = self.sweep(&ledger, state)?;
            let refunded = self.refund(&ledger, state)?;

            let receipt = ExecutionReceipt {
                invocation_id: state.invocation_id(),
                return_data: state.take_return_data(),
                steps: invocation.instructions.len(),
                value_received: state.total_value_received(),
                value_consumed: state.value_consumed(),
                refunded,
                swept,
            };
            ledger.record_invocation(&InvocationRecord {
                invocation_id: receipt.invocation_id,
                caller: invocation.caller,
                step_count,
                value_received: receipt.value_received,
                value_consumed: receipt.value_consumed,
                refunded: receipt.refunded,
                return_data: receipt.return_data.clone(),
            })?;
            receipt
        };

        tx.commit().map_err(LedgerError::from)?;
        Ok(receipt)
    }

    fn receive_inputs(
        &self,
        ledger: &SqliteLedger<'_>,
        state: &mut ExecutionContext,
        invocation: &Invocation,
    ) -> Result<(), Revert> {
        let caller = &invocation.caller;
        if invocation.value > 0 {
            ledger
                .transfer(caller, &self.address, &Asset::Native, invocation.value)
                .map_err(|err| match err {
                    LedgerError::InsufficientBalance { available, .. } => revert(
                        RevertKind::InsufficientValue,
                        format!(
                            "caller cannot fund attached value {}: holds {available}",
                            invocation.value
                        ),
                    ),
                    other => Revert::from(other),
                })?;
            state
                .record_received(invocation.value)
                .map_err(|_| revert(RevertKind::InvalidInput, "attached value overflow"))?;
        }

        for input in &invocation.token_inputs {
            if input.amount == 0 {
                return Err(revert(
                    RevertKind::InvalidInput,
                    format!("token input {} has zero amount", input.token),
                ));
            }
            let asset = Asset::token(input.token);
            if asset.is_native() {
                return Err(revert(
                    RevertKind::InvalidInput,
                    "native value must be attached as value, not as a token input",
                ));
            }
            ledger
                .transfer(caller, &self.address, &asset, input.amount)
                .map_err(|err| match err {
                    LedgerError::InsufficientBalance { .. } => {
                        revert(RevertKind::InsufficientBalance, err.to_string())
                    }
                    other => Revert::from(other),
                })?;
            state.track(&asset);
        }
        Ok(())
    }

    fn run_step(
        &self,
        ledger: &SqliteLedger<'_>,
        state: &mut ExecutionContext,
        index: usize,
        instruction: &Instruction,
    ) -> Result<(), Revert> {
        let resolved = lock_read(&self.registry)
            .resolve_target(&instruction.target)
            .map_err(|err| revert(RevertKind::InactiveOrUnknown, err.to_string()))?;
        let entry_point = instruction.call.entry_point.as_str();
        if !resolved
            .handler
            .entry_points()
            .iter()
            .any(|listed| *listed == entry_point)
        {
            return Err(revert(
                RevertKind::InvalidInput,
                format!(
                    "{} has no entry point `{entry_point}`",
                    resolved.handler.name()
                ),
            ));
        }

        let available = state.available_value();
        let allowance = resolve_amount(
            &instruction.native_value,
            available,
            state.last_net_amount(),
        )
        .map_err(|err| revert(RevertKind::InvalidInput, format!("step {index}: {err}")))?;
        if allowance > available {
            return Err(revert(
                RevertKind::InsufficientValue,
                format!("step {index} needs {allowance} native, {available} available"),
            ));
        }

        debug!(
            "event=execute_step module=dispatcher status=start invocation_id={} step={} handler={} entry={} native_allowance={}",
            state.invocation_id(),
            index,
            resolved.identifier,
            instruction.call.entry_point,
            allowance
        );
        let output = {
            let mut ctx = HandlerContext::new(ledger, self.address, state, index, allowance);
            resolved.handler.handle(&mut ctx, &instruction.call)?
        };
        debug!(
            "event=execute_step module=dispatcher status=ok invocation_id={} step={} net={}",
            state.invocation_id(),
            index,
            output.net_amount
        );
        state.record_step(output.net_amount, output.raw_return_data);
        Ok(())
    }

    fn sweep(
        &self,
        ledger: &SqliteLedger<'_>,
        state: &ExecutionContext,
    ) -> Result<Vec<(Asset, Amount)>, Revert> {
        let caller = state.original_caller();
        let mut swept = Vec::new();
        for asset in state.tracked_assets() {
            let held = ledger.balance_of(&self.address, asset)?;
            if held == 0 {
                continue;
            }
            ledger
                .transfer(&self.address, caller, asset, held)
                .map_err(|err| {
                    revert(
                        RevertKind::TransferFailed,
                        format!("sweep of {asset} failed: {err}"),
                    )
                })?;
            swept.push((*asset, held));
        }
        Ok(swept)
    }

    fn refund(&self, ledger: &SqliteLedger<'_>, state: &ExecutionContext) -> Result<Amount, Revert> {
        let surplus = state.available_value();
        if surplus > 0 {
            ledger
                .transfer(&self.address, state.original_caller(), &Asset::Native, surplus)
                .map_err(|err| {
                    revert(
                        RevertKind::TransferFailed,
                        format!("refund of {surplus} native failed: {err}"),
                    )
                })?;
        }
        Ok(surplus)
    }
}

/// In-progress flag held for one invocation; cleared on every exit path.
struct InFlight<'d> {
    flag: &'d Mutex<bool>,
}

impl<'d> InFlight<'d> {
    /// Test-and-set under one lock, so two entrants never both pass.
    fn enter(flag: &'d Mutex<bool>) -> Result<Self, Revert> {
        let mut running = lock(flag);
        if *running {
            return Err(reentrancy());
        }
        *running = true;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *lock(self.flag) = false;
    }
}

fn reentrancy() -> Revert {
    revert(
        RevertKind::ReentrancyDetected,
        "reentrant call while an invocation is in progress",
    )
}

fn revert(kind: RevertKind, message: impl Into<String>) -> Revert {
    Revert::new(COMPONENT, "execute", kind, message)
}

// A panicking handler poisons the lock; the rolled-back state is still valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_read(
    registry: &SharedRegistry,
) -> std::sync::RwLockReadGuard<'_, crate::registry::HandlerRegistry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}
