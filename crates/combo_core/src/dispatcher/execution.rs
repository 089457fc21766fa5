//! Per-invocation execution state.
//!
//! # Invariants
//! - Created at invocation entry and dropped at exit; never shared between
//!   invocations.
//! - `value_consumed <= total_value_received` after every mutation.
//! - Approvals are transient: every approval, whatever its spender, is
//!   cleared when the protocol call that follows it returns.

use crate::model::address::{Address, Asset};
use crate::model::amount::Amount;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Value accounting violation raised by `ExecutionContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueError {
    /// Consumption would exceed what was received.
    Overspend {
        requested: Amount,
        available: Amount,
    },
    Overflow,
}

/// Transient state of one `execute` invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    invocation_id: Uuid,
    original_caller: Address,
    total_value_received: Amount,
    value_consumed: Amount,
    last_return_data: Vec<u8>,
    last_net_amount: Option<Amount>,
    tracked_assets: BTreeSet<Asset>,
    pub(crate) allowances: BTreeMap<(Address, Asset), Amount>,
}

impl ExecutionContext {
    pub fn new(original_caller: Address) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            original_caller,
            total_value_received: 0,
            value_consumed: 0,
            last_return_data: Vec::new(),
            last_net_amount: None,
            tracked_assets: BTreeSet::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn original_caller(&self) -> &Address {
        &self.original_caller
    }

    pub fn total_value_received(&self) -> Amount {
        self.total_value_received
    }

    pub fn value_consumed(&self) -> Amount {
        self.value_consumed
    }

    /// Native still owed to the caller if the invocation ended now.
    pub fn available_value(&self) -> Amount {
        self.total_value_received - self.value_consumed
    }

    pub fn last_net_amount(&self) -> Option<Amount> {
        self.last_net_amount
    }

    /// Tokens to sweep back to the caller, in asset order.
    pub fn tracked_assets(&self) -> impl Iterator<Item = &Asset> {
        self.tracked_assets.iter()
    }

    pub(crate) fn record_received(&mut self, amount: Amount) -> Result<(), ValueError> {
        self.total_value_received = self
            .total_value_received
            .checked_add(amount)
            .ok_or(ValueError::Overflow)?;
        Ok(())
    }

    pub(crate) fn record_consumed(&mut self, amount: Amount) -> Result<(), ValueError> {
        let available = self.available_value();
        if amount > available {
            return Err(ValueError::Overspend {
                requested: amount,
                available,
            });
        }
        self.value_consumed += amount;
        Ok(())
    }

    pub(crate) fn record_step(&mut self, net_amount: Amount, raw_return_data: Vec<u8>) {
        self.last_net_amount = Some(net_amount);
        self.last_return_data = raw_return_data;
    }

    /// Native is settled through the refund, so only tokens are tracked.
    pub(crate) fn track(&mut self, asset: &Asset) {
        if !asset.is_native() {
            self.tracked_assets.insert(*asset);
        }
    }

    pub(crate) fn clear_allowances(&mut self) {
        self.allowances.clear();
    }

    pub(crate) fn take_return_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.last_return_data)
    }
}
