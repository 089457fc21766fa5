//! Capability object handed to handlers.
//!
//! # Responsibility
//! - Expose exactly what a handler may do with the dispatcher's holdings:
//!   read balances, approve a spender, call a protocol with native value,
//!   mark outputs for the final sweep.
//! - Account native forwarding against the step allowance and the
//!   invocation's value budget.
//!
//! # Invariants
//! - Native value is forwarded once per `call_protocol` and never beyond the
//!   step's remaining allowance.
//! - Approvals granted for a call are zeroed when the call returns, success
//!   or not.

use crate::dispatcher::execution::{ExecutionContext, ValueError};
use crate::error::{Revert, RevertKind};
use crate::handler::protocol::{ExternalProtocol, ProtocolCall, ProtocolEnv, ProtocolError};
use crate::ledger::{Ledger, LedgerError};
use crate::model::address::{Address, Asset};
use crate::model::amount::{resolve_amount, Amount, AmountResolveError, AmountSpec};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Failure of a context operation; handlers turn it into their own `Revert`.
#[derive(Debug)]
pub enum CallError {
    InsufficientValue {
        requested: Amount,
        allowance: Amount,
    },
    Amount(AmountResolveError),
    Ledger(LedgerError),
    Protocol(ProtocolError),
}

impl CallError {
    /// Classifies this failure under the handler's component/operation.
    pub fn into_revert(self, component: &str, operation: &str) -> Revert {
        let kind = match &self {
            Self::InsufficientValue { .. } => RevertKind::InsufficientValue,
            Self::Amount(_) => RevertKind::InvalidInput,
            Self::Ledger(LedgerError::InsufficientBalance { .. }) => {
                RevertKind::InsufficientBalance
            }
            Self::Ledger(_) => RevertKind::Storage,
            Self::Protocol(_) => RevertKind::ExternalCallFailed,
        };
        Revert::new(component, operation, kind, self.to_string())
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientValue {
                requested,
                allowance,
            } => write!(
                f,
                "native value {requested} exceeds step allowance {allowance}"
            ),
            Self::Amount(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Protocol(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InsufficientValue { .. } => None,
            Self::Amount(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::Protocol(err) => Some(err),
        }
    }
}

impl From<LedgerError> for CallError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<AmountResolveError> for CallError {
    fn from(value: AmountResolveError) -> Self {
        Self::Amount(value)
    }
}

impl From<ValueError> for CallError {
    fn from(value: ValueError) -> Self {
        match value {
            ValueError::Overspend {
                requested,
                available,
            } => Self::InsufficientValue {
                requested,
                allowance: available,
            },
            ValueError::Overflow => Self::Amount(AmountResolveError::Overflow),
        }
    }
}

/// Handler's window onto the dispatcher during one step.
pub struct HandlerContext<'a> {
    ledger: &'a dyn Ledger,
    holder: Address,
    state: &'a mut ExecutionContext,
    step_index: usize,
    native_allowance: Amount,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        ledger: &'a dyn Ledger,
        holder: Address,
        state: &'a mut ExecutionContext,
        step_index: usize,
        native_allowance: Amount,
    ) -> Self {
        Self {
            ledger,
            holder,
            state,
            step_index,
            native_allowance,
        }
    }

    /// Account whose holdings this handler manages (the dispatcher).
    pub fn holder(&self) -> &Address {
        &self.holder
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn invocation_id(&self) -> Uuid {
        self.state.invocation_id()
    }

    /// Holder balance of `asset`.
    pub fn balance_of(&self, asset: &Asset) -> Result<Amount, CallError> {
        Ok(self.ledger.balance_of(&self.holder, asset)?)
    }

    /// Native this step may still forward.
    pub fn native_allowance(&self) -> Amount {
        self.native_allowance
    }

    /// Net amount of the previous step, if any.
    pub fn last_output(&self) -> Option<Amount> {
        self.state.last_net_amount()
    }

    /// Resolves `spec` for spending `asset`; native spend is capped by the
    /// step allowance.
    pub fn resolve_amount(&self, spec: &AmountSpec, asset: &Asset) -> Result<Amount, CallError> {
        let held = self.balance_of(asset)?;
        let spendable = if asset.is_native() {
            held.min(self.native_allowance)
        } else {
            held
        };
        Ok(resolve_amount(spec, spendable, self.last_output())?)
    }

    /// Grants `spender` a transient approval over the holder's `asset`.
    pub fn approve(&mut self, asset: &Asset, spender: &Address, amount: Amount) {
        if asset.is_native() || amount == 0 {
            return;
        }
        self.state.allowances.insert((*spender, *asset), amount);
    }

    /// Marks `asset` to be swept back to the original caller at the end.
    pub fn track_output(&mut self, asset: &Asset) {
        self.state.track(asset);
    }

    /// Calls `protocol`, forwarding `value` native exactly once.
    ///
    /// Returns the router's raw return data, which callers must not trust
    /// for accounting.
    pub fn call_protocol(
        &mut self,
        protocol: &dyn ExternalProtocol,
        method: &str,
        value: Amount,
        payload: &[u8],
    ) -> Result<Vec<u8>, CallError> {
        if value > self.native_allowance {
            return Err(CallError::InsufficientValue {
                requested: value,
                allowance: self.native_allowance,
            });
        }

        let protocol_address = *protocol.address();
        let spender = *protocol.spender();
        let native_before = self.balance_of(&Asset::Native)?;
        if value > 0 {
            self.state.record_consumed(value)?;
            self.ledger
                .transfer(&self.holder, &protocol_address, &Asset::Native, value)?;
            self.native_allowance -= value;
        }

        debug!(
            "event=protocol_call module=handler status=start invocation_id={} step={} protocol={} method={} value={}",
            self.state.invocation_id(),
            self.step_index,
            protocol_address,
            method,
            value
        );
        let outcome = {
            let mut env = ProtocolEnv::new(
                self.ledger,
                self.holder,
                protocol_address,
                spender,
                value,
                &mut self.state.allowances,
            );
            protocol.invoke(&mut env, &ProtocolCall { method, payload })
        };
        self.state.clear_allowances();
        let output = outcome.map_err(CallError::Protocol)?;

        let native_after = self.balance_of(&Asset::Native)?;
        let baseline = native_before.saturating_sub(value);
        if native_after > baseline {
            self.state.record_received(native_after - baseline)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::{CallError, HandlerContext};
    use crate::db::open_db_in_memory;
    use crate::dispatcher::execution::ExecutionContext;
    use crate::error::RevertKind;
    use crate::handler::protocol::{ExternalProtocol, ProtocolCall, ProtocolEnv, ProtocolError};
    use crate::ledger::{Ledger, SqliteLedger};
    use crate::model::address::{Address, Asset};
    use crate::model::amount::AmountSpec;

    struct EchoValue {
        address: Address,
        refund: bool,
    }

    impl ExternalProtocol for EchoValue {
        fn address(&self) -> &Address {
            &self.address
        }

        fn invoke(
            &self,
            env: &mut ProtocolEnv<'_>,
            _call: &ProtocolCall<'_>,
        ) -> Result<Vec<u8>, ProtocolError> {
            if self.refund {
                let value = env.value();
                env.pay(&Asset::Native, value)?;
            }
            Ok(Vec::new())
        }
    }

    fn holder() -> Address {
        Address::from_low_u64(0xd15)
    }

    #[test]
    fn forwarding_beyond_allowance_is_rejected_before_any_transfer() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        ledger.credit(&holder(), &Asset::Native, 100).expect("fund");
        let mut state = ExecutionContext::new(Address::from_low_u64(1));
        state.record_received(100).expect("receive");
        let mut ctx = HandlerContext::new(&ledger, holder(), &mut state, 0, 10);
        let router = EchoValue {
            address: Address::from_low_u64(0xa),
            refund: false,
        };

        let err = ctx
            .call_protocol(&router, "swap", 11, &[])
            .expect_err("value above allowance must fail");
        assert!(matches!(err, CallError::InsufficientValue { .. }));
        assert_eq!(
            err.into_revert("HTest", "_call").kind(),
            RevertKind::InsufficientValue
        );
        assert_eq!(ledger.balance_of(&holder(), &Asset::Native).expect("held"), 100);
    }

    #[test]
    fn forwarded_value_is_consumed_and_returned_value_is_received() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        ledger.credit(&holder(), &Asset::Native, 100).expect("fund");
        let mut state = ExecutionContext::new(Address::from_low_u64(1));
        state.record_received(100).expect("receive");
        {
            let mut ctx = HandlerContext::new(&ledger, holder(), &mut state, 0, 50);
            let router = EchoValue {
                address: Address::from_low_u64(0xa),
                refund: true,
            };
            ctx.call_protocol(&router, "swap", 50, &[])
                .expect("call should succeed");
            assert_eq!(ctx.native_allowance(), 0);
        }
        assert_eq!(state.value_consumed(), 50);
        assert_eq!(state.total_value_received(), 150);
        assert_eq!(state.available_value(), 100);
    }

    #[test]
    fn approvals_to_other_spenders_do_not_outlive_the_call() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        let token = Asset::Token(Address::from_low_u64(0x7001));
        ledger.credit(&holder(), &token, 100).expect("fund");
        let mut state = ExecutionContext::new(Address::from_low_u64(1));
        {
            let mut ctx = HandlerContext::new(&ledger, holder(), &mut state, 0, 0);
            let router = EchoValue {
                address: Address::from_low_u64(0xa),
                refund: false,
            };
            ctx.approve(&token, router.address(), 40);
            ctx.approve(&token, &Address::from_low_u64(0xbad), 60);
            ctx.call_protocol(&router, "swap", 0, &[])
                .expect("call should succeed");
        }
        assert!(state.allowances.is_empty());
    }

    #[test]
    fn native_all_balance_is_capped_by_allowance() {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        ledger.credit(&holder(), &Asset::Native, 100).expect("fund");
        let mut state = ExecutionContext::new(Address::from_low_u64(1));
        let ctx = HandlerContext::new(&ledger, holder(), &mut state, 0, 30);

        let resolved = ctx
            .resolve_amount(&AmountSpec::AllBalance, &Asset::Native)
            .expect("resolve");
        assert_eq!(resolved, 30);
    }
}
