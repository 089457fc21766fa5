//! `HParaSwapV5` reference handler.
//!
//! # Invariants
//! - Token approvals go to the router's transfer proxy (`spender()`), which
//!   may differ from the router account itself.
//! - Router failures surface as `HParaSwapV5__paraswapCall: <reason>`.

use crate::error::{Revert, RevertKind};
use crate::handler::context::HandlerContext;
use crate::handler::protocol::ExternalProtocol;
use crate::handler::swap::{execute_swap, SwapRoute};
use crate::handler::{Handler, HandlerOutput};
use crate::model::instruction::HandlerCall;
use std::sync::Arc;

const NAME: &str = "HParaSwapV5";
const CALL_OPERATION: &str = "_paraswapCall";
const ENTRY_POINTS: [&str; 1] = ["swap"];

pub struct ParaSwapV5Handler {
    augustus: Arc<dyn ExternalProtocol>,
}

impl ParaSwapV5Handler {
    pub fn new(augustus: Arc<dyn ExternalProtocol>) -> Self {
        Self { augustus }
    }
}

impl Handler for ParaSwapV5Handler {
    fn name(&self) -> &str {
        NAME
    }

    fn entry_points(&self) -> &[&'static str] {
        &ENTRY_POINTS
    }

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        call: &HandlerCall,
    ) -> Result<HandlerOutput, Revert> {
        if call.entry_point != "swap" {
            return Err(Revert::new(
                NAME,
                "handle",
                RevertKind::InvalidInput,
                format!("unsupported entry point `{}`", call.entry_point),
            ));
        }

        let route = SwapRoute {
            component: NAME,
            operation: "swap",
            call_operation: CALL_OPERATION,
            protocol: self.augustus.as_ref(),
            method: "swap",
        };
        execute_swap(ctx, &route, call)
    }
}
