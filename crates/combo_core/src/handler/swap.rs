//! Shared swap routine for router-wrapping handlers.
//!
//! # Responsibility
//! - Implement the handler contract once: resolve input, approve, call,
//!   measure the output delta, enforce slippage, track the output.
//!
//! # Invariants
//! - `net_amount` is `balance_after - balance_before` of the output asset on
//!   the holder, whatever the router reports.
//! - A zero or negative delta is `InvalidOutputAmount`; a positive delta below
//!   `min_output` is `SlippageExceeded`.

use crate::error::{Revert, RevertKind};
use crate::handler::context::HandlerContext;
use crate::handler::protocol::ExternalProtocol;
use crate::handler::HandlerOutput;
use crate::model::amount::decode_amount;
use crate::model::instruction::HandlerCall;
use log::{debug, warn};

/// Where and how a handler routes one entry point.
pub struct SwapRoute<'r> {
    /// Revert component, e.g. `HParaSwapV5`.
    pub component: &'r str,
    /// Entry point name, used as the revert operation for contract checks.
    pub operation: &'r str,
    /// Revert operation for router failures, e.g. `_paraswapCall`.
    pub call_operation: &'r str,
    pub protocol: &'r dyn ExternalProtocol,
    pub method: &'r str,
}

impl SwapRoute<'_> {
    fn revert(&self, kind: RevertKind, message: impl Into<String>) -> Revert {
        Revert::new(self.component, self.operation, kind, message)
    }
}

/// Runs one swap through `route` and returns the measured net output.
pub fn execute_swap(
    ctx: &mut HandlerContext<'_>,
    route: &SwapRoute<'_>,
    call: &HandlerCall,
) -> Result<HandlerOutput, Revert> {
    if call.input_asset == call.output_asset {
        return Err(route.revert(
            RevertKind::InvalidInput,
            "input and output asset must differ",
        ));
    }

    let amount = ctx
        .resolve_amount(&call.input_amount, &call.input_asset)
        .map_err(|err| err.into_revert(route.component, route.operation))?;
    if amount == 0 {
        return Err(route.revert(RevertKind::InvalidInput, "input amount is zero"));
    }

    let value = if call.input_asset.is_native() {
        amount
    } else {
        ctx.approve(&call.input_asset, route.protocol.spender(), amount);
        0
    };

    let before = ctx
        .balance_of(&call.output_asset)
        .map_err(|err| err.into_revert(route.component, route.operation))?;
    let reported = ctx
        .call_protocol(route.protocol, route.method, value, &call.routing_payload)
        .map_err(|err| err.into_revert(route.component, route.call_operation))?;
    let after = ctx
        .balance_of(&call.output_asset)
        .map_err(|err| err.into_revert(route.component, route.operation))?;

    let net_amount = after.saturating_sub(before);
    if net_amount == 0 {
        warn!(
            "event=handler_swap module=handler status=error handler={} entry={} reason=no_output before={} after={}",
            route.component, route.operation, before, after
        );
        return Err(route.revert(
            RevertKind::InvalidOutputAmount,
            "Invalid output token amount",
        ));
    }
    if net_amount < call.min_output {
        warn!(
            "event=handler_swap module=handler status=error handler={} entry={} reason=slippage net={} min_output={}",
            route.component, route.operation, net_amount, call.min_output
        );
        return Err(route.revert(
            RevertKind::SlippageExceeded,
            format!(
                "output {net_amount} below minimum {}",
                call.min_output
            ),
        ));
    }

    if let Some(claimed) = decode_amount(&reported) {
        if claimed != net_amount {
            warn!(
                "event=handler_swap module=handler status=mismatch handler={} entry={} reported={} measured={}",
                route.component, route.operation, claimed, net_amount
            );
        }
    }

    ctx.track_output(&call.output_asset);
    debug!(
        "event=handler_swap module=handler status=ok handler={} entry={} step={} input={} net={}",
        route.component,
        route.operation,
        ctx.step_index(),
        amount,
        net_amount
    );
    Ok(HandlerOutput::new(net_amount))
}

#[cfg(test)]
mod tests {
    use super::{execute_swap, SwapRoute};
    use crate::db::open_db_in_memory;
    use crate::dispatcher::execution::ExecutionContext;
    use crate::error::RevertKind;
    use crate::handler::context::HandlerContext;
    use crate::handler::protocol::{ExternalProtocol, ProtocolCall, ProtocolEnv, ProtocolError};
    use crate::ledger::{Ledger, SqliteLedger};
    use crate::model::address::{Address, Asset};
    use crate::model::amount::{encode_amount, Amount, AmountSpec};
    use crate::model::instruction::HandlerCall;

    /// Pulls the approved input and pays `output` of `out`; reports `claim`.
    struct FixedRouter {
        address: Address,
        output: Amount,
        claim: Amount,
    }

    impl ExternalProtocol for FixedRouter {
        fn address(&self) -> &Address {
            &self.address
        }

        fn invoke(
            &self,
            env: &mut ProtocolEnv<'_>,
            call: &ProtocolCall<'_>,
        ) -> Result<Vec<u8>, ProtocolError> {
            let out = Asset::parse(std::str::from_utf8(call.payload).map_err(|_| {
                ProtocolError::new("payload must name the output asset")
            })?)
            .map_err(|err| ProtocolError::new(err.to_string()))?;
            if self.output > 0 {
                env.pay(&out, self.output)?;
            }
            Ok(encode_amount(self.claim))
        }
    }

    fn holder() -> Address {
        Address::from_low_u64(0xd15)
    }

    fn token_x() -> Asset {
        Asset::Token(Address::from_low_u64(0x7))
    }

    fn run(router: &FixedRouter, call: &HandlerCall, fund: Amount) -> Result<Amount, RevertKind> {
        let conn = open_db_in_memory().expect("open db");
        let ledger = SqliteLedger::new(&conn);
        ledger.credit(&holder(), &Asset::Native, fund).expect("fund holder");
        ledger
            .credit(&router.address, &token_x(), 1_000)
            .expect("fund router");
        let mut state = ExecutionContext::new(Address::from_low_u64(1));
        state.record_received(fund).expect("receive");
        let mut ctx = HandlerContext::new(&ledger, holder(), &mut state, 0, fund);
        let route = SwapRoute {
            component: "HTest",
            operation: "swap",
            call_operation: "_testCall",
            protocol: router,
            method: "swap",
        };
        execute_swap(&mut ctx, &route, call)
            .map(|output| output.net_amount)
            .map_err(|revert| revert.kind())
    }

    fn native_to_x(min_output: Amount) -> HandlerCall {
        HandlerCall::new("swap", Asset::Native, AmountSpec::AllBalance, token_x())
            .with_min_output(min_output)
            .with_payload(token_x().storage_key().into_bytes())
    }

    #[test]
    fn net_is_measured_not_reported() {
        let router = FixedRouter {
            address: Address::from_low_u64(0xa),
            output: 97,
            claim: 500,
        };
        assert_eq!(run(&router, &native_to_x(90), 100), Ok(97));
    }

    #[test]
    fn shortfall_below_minimum_is_slippage() {
        let router = FixedRouter {
            address: Address::from_low_u64(0xa),
            output: 97,
            claim: 97,
        };
        assert_eq!(
            run(&router, &native_to_x(98), 100),
            Err(RevertKind::SlippageExceeded)
        );
    }

    #[test]
    fn zero_delta_is_invalid_output() {
        let router = FixedRouter {
            address: Address::from_low_u64(0xa),
            output: 0,
            claim: 97,
        };
        assert_eq!(
            run(&router, &native_to_x(0), 100),
            Err(RevertKind::InvalidOutputAmount)
        );
    }

    #[test]
    fn identical_assets_are_rejected() {
        let router = FixedRouter {
            address: Address::from_low_u64(0xa),
            output: 1,
            claim: 1,
        };
        let call = HandlerCall::new("swap", token_x(), AmountSpec::Fixed(1), token_x());
        assert_eq!(run(&router, &call, 0), Err(RevertKind::InvalidInput));
    }

    #[test]
    fn zero_input_is_rejected() {
        let router = FixedRouter {
            address: Address::from_low_u64(0xa),
            output: 1,
            claim: 1,
        };
        assert_eq!(run(&router, &native_to_x(0), 0), Err(RevertKind::InvalidInput));
    }
}
