//! Handler registry: identifiers, entries and the admin-gated allow-list.

pub mod handler_id;
pub mod handler_registry;

pub use handler_id::{HandlerId, HandlerIdError, HANDLER_ID_BYTES};
pub use handler_registry::{
    AdminConfig, HandlerRegistry, RegistryEntry, RegistryError, RegistryEvent, ResolvedHandler,
    SharedRegistry,
};
