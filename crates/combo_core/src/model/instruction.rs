//! Caller-submitted instruction shapes.
//!
//! # Responsibility
//! - Describe one handler call (`HandlerCall`) and where it is routed (`Target`).
//! - Bundle an ordered instruction list with attached value (`Invocation`).
//!
//! # Invariants
//! - Instructions are ephemeral: built by the caller, consumed once, never
//!   persisted by the engine.
//! - `routing_payload` is opaque to the core and forwarded verbatim.

use crate::model::address::{Address, Asset};
use crate::model::amount::{Amount, AmountSpec};
use crate::registry::HandlerId;
use serde::{Deserialize, Serialize};

/// Registry lookup key for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Id(HandlerId),
    Address(Address),
}

impl From<HandlerId> for Target {
    fn from(value: HandlerId) -> Self {
        Self::Id(value)
    }
}

impl From<Address> for Target {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

/// Handler calldata: entry point plus the shared swap-shaped arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerCall {
    pub entry_point: String,
    pub input_asset: Asset,
    pub input_amount: AmountSpec,
    pub output_asset: Asset,
    /// Slippage bound; `0` only requires a positive output.
    #[serde(default)]
    pub min_output: Amount,
    /// Off-chain built router calldata.
    #[serde(default)]
    pub routing_payload: Vec<u8>,
}

impl HandlerCall {
    pub fn new(
        entry_point: impl Into<String>,
        input_asset: Asset,
        input_amount: impl Into<AmountSpec>,
        output_asset: Asset,
    ) -> Self {
        Self {
            entry_point: entry_point.into(),
            input_asset,
            input_amount: input_amount.into(),
            output_asset,
            min_output: 0,
            routing_payload: Vec::new(),
        }
    }

    pub fn with_min_output(mut self, min_output: Amount) -> Self {
        self.min_output = min_output;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.routing_payload = payload.into();
        self
    }
}

/// One step of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub target: Target,
    pub call: HandlerCall,
    /// Native the step may forward to external calls.
    #[serde(default)]
    pub native_value: AmountSpec,
}

impl Instruction {
    pub fn new(target: impl Into<Target>, call: HandlerCall) -> Self {
        Self {
            target: target.into(),
            call,
            native_value: AmountSpec::zero(),
        }
    }

    pub fn with_native_value(mut self, native_value: impl Into<AmountSpec>) -> Self {
        self.native_value = native_value.into();
        self
    }
}

/// Token moved from the caller into the dispatcher before the first step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInput {
    pub token: Address,
    pub amount: Amount,
}

/// Full `execute` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub caller: Address,
    /// Native value attached to the call.
    #[serde(default)]
    pub value: Amount,
    #[serde(default)]
    pub token_inputs: Vec<TokenInput>,
    pub instructions: Vec<Instruction>,
}

impl Invocation {
    pub fn new(caller: Address, value: Amount, instructions: Vec<Instruction>) -> Self {
        Self {
            caller,
            value,
            token_inputs: Vec::new(),
            instructions,
        }
    }

    pub fn with_token_input(mut self, token: Address, amount: Amount) -> Self {
        self.token_inputs.push(TokenInput { token, amount });
        self
    }
}
