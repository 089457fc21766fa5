//! Handler contract protocol.
//!
//! # Responsibility
//! - Define the uniform `Handler` contract the dispatcher calls through.
//! - Provide the capability object (`HandlerContext`) handlers act through and
//!   the `ExternalProtocol` seam for wrapped routers.
//! - Ship the shared swap routine and two reference handlers.
//!
//! # Invariants
//! - Handlers are stateless; everything they touch is reached through the
//!   context passed into `handle`.
//! - Output is always measured as a balance delta, never taken from the
//!   external protocol's self-report.
//! - Handlers never swallow failures: any internal failure is returned as a
//!   `Revert` and aborts the whole invocation.

pub mod context;
pub mod one_inch;
pub mod para_swap;
pub mod protocol;
pub mod swap;

use crate::error::Revert;
use crate::model::amount::{encode_amount, Amount};
use crate::model::instruction::HandlerCall;

pub use context::{CallError, HandlerContext};
pub use one_inch::OneInchV3Handler;
pub use para_swap::ParaSwapV5Handler;
pub use protocol::{ExternalProtocol, ProtocolCall, ProtocolEnv, ProtocolError};
pub use swap::{execute_swap, SwapRoute};

/// Result of one handler entry-point call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutput {
    /// Measured balance delta of the output asset.
    pub net_amount: Amount,
    /// `net_amount` encoded as one return-data word.
    pub raw_return_data: Vec<u8>,
}

impl HandlerOutput {
    pub fn new(net_amount: Amount) -> Self {
        Self {
            net_amount,
            raw_return_data: encode_amount(net_amount),
        }
    }
}

/// Stateless adapter around one external protocol integration.
pub trait Handler: Send + Sync {
    /// Component name used as the revert-reason prefix, e.g. `HOneInchV3`.
    fn name(&self) -> &str;

    /// Entry points accepted in `HandlerCall::entry_point`.
    fn entry_points(&self) -> &[&'static str];

    fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
        call: &HandlerCall,
    ) -> Result<HandlerOutput, Revert>;
}

#[cfg(test)]
mod tests {
    use super::HandlerOutput;
    use crate::model::amount::decode_amount;

    #[test]
    fn output_echoes_net_amount_in_return_data() {
        let output = HandlerOutput::new(97);
        assert_eq!(output.net_amount, 97);
        assert_eq!(decode_amount(&output.raw_return_data), Some(97));
    }
}
