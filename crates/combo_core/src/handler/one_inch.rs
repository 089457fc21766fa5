//! `HOneInchV3` reference handler.
//!
//! Wraps an aggregation router with two paths: the generic `swap` and the
//! single-family `unoswap`. Both settle through the shared swap routine.

use crate::error::{Revert, RevertKind};
use crate::handler::context::HandlerContext;
use crate::handler::protocol::ExternalProtocol;
use crate::handler::swap::{execute_swap, SwapRoute};
use crate::handler::{Handler, HandlerOutput};
use crate::model::instruction::HandlerCall;
use std::sync::Arc;

const NAME: &str = "HOneInchV3";
const CALL_OPERATION: &str = "_oneInchCall";
const ENTRY_POINTS: [&str; 2] = ["swap", "unoswap"];

pub struct OneInchV3Handler {
    router: Arc<dyn ExternalProtocol>,
}

impl OneInchV3Handler {
    pub fn new(router: Arc<dyn ExternalProtocol>) -> Self {
        Self { router }
    }
}

impl Handler for OneInchV3Handler {
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
        let Some(entry) = ENTRY_POINTS
            .iter()
            .copied()
            .find(|entry| *entry == call.entry_point)
        else {
            return Err(Revert::new(
                NAME,
                "handle",
                RevertKind::InvalidInput,
                format!("unsupported entry point `{}`", call.entry_point),
            ));
        };

        let route = SwapRoute {
            component: NAME,
            operation: entry,
            call_operation: CALL_OPERATION,
            protocol: self.router.as_ref(),
            method: entry,
        };
        execute_swap(ctx, &route, call)
    }
}
