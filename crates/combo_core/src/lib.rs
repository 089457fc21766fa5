//! Plugin-gated atomic multi-step execution engine.
//! A dispatcher runs ordered handler calls against a shared asset ledger and
//! commits all of them or none.

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod registry;

pub use config::{ConfigError, DatabaseConfig, EngineConfig, LoggingConfig};
pub use dispatcher::{Dispatcher, ExecutionContext, ExecutionReceipt};
pub use error::{Revert, RevertKind};
pub use handler::{
    CallError, ExternalProtocol, Handler, HandlerContext, HandlerOutput, OneInchV3Handler,
    ParaSwapV5Handler, ProtocolCall, ProtocolEnv, ProtocolError,
};
pub use ledger::{InvocationRecord, Ledger, LedgerError, SqliteLedger};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::address::{Address, AddressParseError, Asset};
pub use model::amount::{decode_amount, encode_amount, Amount, AmountSpec};
pub use model::instruction::{HandlerCall, Instruction, Invocation, Target, TokenInput};
pub use registry::{
    AdminConfig, HandlerId, HandlerRegistry, RegistryEntry, RegistryError, RegistryEvent,
    SharedRegistry,
};

/// Minimal health-check API for host wiring.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
