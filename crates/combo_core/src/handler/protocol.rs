//! External protocol seam.
//!
//! # Responsibility
//! - Define the contract of a wrapped third-party router (`ExternalProtocol`).
//! - Give the router a narrow view of the ledger (`ProtocolEnv`): pull what it
//!   was approved for, pay the caller, read balances.
//!
//! # Invariants
//! - A router can only pull tokens the handler approved to its spender, and
//!   never more than approved.
//! - Native value reaches the router only as the call's attached `value`.

use crate::ledger::{Ledger, LedgerError};
use crate::model::address::{Address, Asset};
use crate::model::amount::Amount;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One call into a router.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolCall<'p> {
    pub method: &'p str,
    pub payload: &'p [u8],
}

/// Failure raised by a router; becomes `ExternalCallFailed` in the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    message: String,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProtocolError {}

impl From<LedgerError> for ProtocolError {
    fn from(value: LedgerError) -> Self {
        Self::new(value.to_string())
    }
}

/// Third-party router wrapped by a handler.
pub trait ExternalProtocol: Send + Sync {
    /// Account holding the router's own balances.
    fn address(&self) -> &Address;

    /// Account token approvals are granted to. Routers with a separate
    /// transfer proxy override this.
    fn spender(&self) -> &Address {
        self.address()
    }

    fn invoke(
        &self,
        env: &mut ProtocolEnv<'_>,
        call: &ProtocolCall<'_>,
    ) -> Result<Vec<u8>, ProtocolError>;
}

/// Router's view of the world during one call.
pub struct ProtocolEnv<'a> {
    ledger: &'a dyn Ledger,
    caller: Address,
    protocol: Address,
    spender: Address,
    value: Amount,
    allowances: &'a mut BTreeMap<(Address, Asset), Amount>,
}

impl<'a> ProtocolEnv<'a> {
    pub(crate) fn new(
        ledger: &'a dyn Ledger,
        caller: Address,
        protocol: Address,
        spender: Address,
        value: Amount,
        allowances: &'a mut BTreeMap<(Address, Asset), Amount>,
    ) -> Self {
        Self {
            ledger,
            caller,
            protocol,
            spender,
            value,
            allowances,
        }
    }

    /// The dispatcher account that issued the call.
    pub fn caller(&self) -> &Address {
        &self.caller
    }

    pub fn address(&self) -> &Address {
        &self.protocol
    }

    /// Native value attached to this call (already credited to the router).
    pub fn value(&self) -> Amount {
        self.value
    }

    /// Router's own balance.
    pub fn balance(&self, asset: &Asset) -> Result<Amount, ProtocolError> {
        Ok(self.ledger.balance_of(&self.protocol, asset)?)
    }

    pub fn caller_balance(&self, asset: &Asset) -> Result<Amount, ProtocolError> {
        Ok(self.ledger.balance_of(&self.caller, asset)?)
    }

    /// Remaining approval from the caller to this router's spender.
    pub fn allowance(&self, asset: &Asset) -> Amount {
        self.allowances
            .get(&(self.spender, *asset))
            .copied()
            .unwrap_or(0)
    }

    /// Moves approved tokens from the caller to the router.
    pub fn pull(&mut self, asset: &Asset, amount: Amount) -> Result<(), ProtocolError> {
        if asset.is_native() {
            return Err(ProtocolError::new(
                "native asset cannot be pulled; attach it as call value",
            ));
        }
        let allowed = self.allowance(asset);
        if allowed < amount {
            return Err(ProtocolError::new(format!(
                "transfer amount exceeds allowance: requested {amount}, approved {allowed}"
            )));
        }
        self.ledger
            .transfer(&self.caller, &self.protocol, asset, amount)?;
        self.allowances
            .insert((self.spender, *asset), allowed - amount);
        Ok(())
    }

    /// Pays the caller out of the router's own balance.
    pub fn pay(&mut self, asset: &Asset, amount: Amount) -> Result<(), ProtocolError> {
        self.ledger
            .transfer(&self.protocol, &self.caller, asset, amount)?;
        Ok(())
    }
}
