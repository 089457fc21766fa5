//! Handler allow-list.
//!
//! # Responsibility
//! - Map handler identifiers and implementation addresses to authorized
//!   `Handler` implementations.
//! - Gate every mutation behind the configured admin.
//! - Keep an append-only event log of registrations and deactivations.
//!
//! # Invariants
//! - Entries are deactivated, never removed; an identifier is never reused.
//! - An implementation address backs at most one identifier.
//! - Resolution succeeds only for active entries.

use crate::error::{Revert, RevertKind};
use crate::handler::Handler;
use crate::model::address::Address;
use crate::model::instruction::Target;
use crate::registry::handler_id::HandlerId;
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Registry authority, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminConfig {
    admin: Address,
}

impl AdminConfig {
    pub fn new(admin: Address) -> Self {
        Self { admin }
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn is_admin(&self, caller: &Address) -> bool {
        &self.admin == caller
    }
}

/// One registered handler.
#[derive(Clone)]
pub struct RegistryEntry {
    pub identifier: HandlerId,
    pub implementation_address: Address,
    pub active: bool,
    pub registered_at_ms: i64,
    pub deactivated_at_ms: Option<i64>,
    handler: Arc<dyn Handler>,
}

impl RegistryEntry {
    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }
}

impl Debug for RegistryEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("identifier", &self.identifier)
            .field("implementation_address", &self.implementation_address)
            .field("active", &self.active)
            .field("registered_at_ms", &self.registered_at_ms)
            .field("deactivated_at_ms", &self.deactivated_at_ms)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Registration or deactivation notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEvent {
    pub identifier: HandlerId,
    pub implementation_address: Address,
    pub active: bool,
}

/// Handler resolved for one dispatch.
#[derive(Clone)]
pub struct ResolvedHandler {
    pub identifier: HandlerId,
    pub implementation_address: Address,
    pub handler: Arc<dyn Handler>,
}

/// Registry operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Unauthorized {
        operation: &'static str,
        caller: Address,
    },
    DuplicateIdentifier(HandlerId),
    DuplicateImplementation(Address),
    InvalidImplementation,
    NotFound(HandlerId),
    AlreadyInactive(HandlerId),
    /// Resolution miss: unknown or deactivated.
    InactiveOrUnknown(String),
}

impl RegistryError {
    pub fn kind(&self) -> RevertKind {
        match self {
            Self::Unauthorized { .. } => RevertKind::Unauthorized,
            Self::DuplicateIdentifier(_) | Self::DuplicateImplementation(_) => {
                RevertKind::DuplicateIdentifier
            }
            Self::InvalidImplementation => RevertKind::InvalidInput,
            Self::NotFound(_) => RevertKind::NotFound,
            Self::AlreadyInactive(_) | Self::InactiveOrUnknown(_) => RevertKind::InactiveOrUnknown,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::Unauthorized { operation, .. } => *operation,
            Self::DuplicateIdentifier(_)
            | Self::DuplicateImplementation(_)
            | Self::InvalidImplementation => "register",
            Self::NotFound(_) | Self::AlreadyInactive(_) => "deactivate",
            Self::InactiveOrUnknown(_) => "resolve",
        }
    }
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { caller, .. } => write!(f, "caller {caller} is not the admin"),
            Self::DuplicateIdentifier(id) => write!(f, "identifier already registered: {id}"),
            Self::DuplicateImplementation(address) => {
                write!(f, "implementation already registered: {address}")
            }
            Self::InvalidImplementation => write!(f, "implementation address is zero"),
            Self::NotFound(id) => write!(f, "identifier not found: {id}"),
            Self::AlreadyInactive(id) => write!(f, "identifier already deactivated: {id}"),
            Self::InactiveOrUnknown(target) => write!(f, "invalid handler: {target}"),
        }
    }
}

impl Error for RegistryError {}

impl From<RegistryError> for Revert {
    fn from(value: RegistryError) -> Self {
        Revert::new("Registry", value.operation(), value.kind(), value.to_string())
    }
}

/// Admin-gated handler registry.
pub struct HandlerRegistry {
    config: AdminConfig,
    entries: BTreeMap<HandlerId, RegistryEntry>,
    by_address: BTreeMap<Address, HandlerId>,
    events: Vec<RegistryEvent>,
}

/// Registry shared between the host and dispatchers.
pub type SharedRegistry = Arc<RwLock<HandlerRegistry>>;

impl HandlerRegistry {
    pub fn new(config: AdminConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            by_address: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn admin(&self) -> &Address {
        self.config.admin()
    }

    /// Registers `handler` under `identifier`; admin only.
    pub fn register(
        &mut self,
        caller: &Address,
        identifier: HandlerId,
        implementation_address: Address,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        self.require_admin(caller, "register")?;
        if implementation_address.is_zero() {
            return Err(RegistryError::InvalidImplementation);
        }
        if self.entries.contains_key(&identifier) {
            return Err(RegistryError::DuplicateIdentifier(identifier));
        }
        if self.by_address.contains_key(&implementation_address) {
            return Err(RegistryError::DuplicateImplementation(
                implementation_address,
            ));
        }

        self.entries.insert(
            identifier,
            RegistryEntry {
                identifier,
                implementation_address,
                active: true,
                registered_at_ms: now_ms(),
                deactivated_at_ms: None,
                handler,
            },
        );
        self.by_address.insert(implementation_address, identifier);
        self.events.push(RegistryEvent {
            identifier,
            implementation_address,
            active: true,
        });
        info!(
            "event=registry_register module=registry status=ok identifier={} implementation={}",
            identifier, implementation_address
        );
        Ok(())
    }

    /// Marks `identifier` inactive; admin only.
    pub fn deactivate(
        &mut self,
        caller: &Address,
        identifier: &HandlerId,
    ) -> Result<(), RegistryError> {
        self.require_admin(caller, "deactivate")?;
        let entry = self
            .entries
            .get_mut(identifier)
            .ok_or(RegistryError::NotFound(*identifier))?;
        if !entry.active {
            return Err(RegistryError::AlreadyInactive(*identifier));
        }

        entry.active = false;
        entry.deactivated_at_ms = Some(now_ms());
        let implementation_address = entry.implementation_address;
        self.events.push(RegistryEvent {
            identifier: *identifier,
            implementation_address,
            active: false,
        });
        info!(
            "event=registry_deactivate module=registry status=ok identifier={} implementation={}",
            identifier, implementation_address
        );
        Ok(())
    }

    /// Returns the active handler for `identifier`.
    pub fn resolve(&self, identifier: &HandlerId) -> Result<ResolvedHandler, RegistryError> {
        match self.entries.get(identifier) {
            Some(entry) if entry.active => Ok(ResolvedHandler {
                identifier: entry.identifier,
                implementation_address: entry.implementation_address,
                handler: entry.handler(),
            }),
            _ => Err(RegistryError::InactiveOrUnknown(identifier.to_string())),
        }
    }

    /// Returns the active handler whose implementation lives at `address`.
    pub fn resolve_address(&self, address: &Address) -> Result<ResolvedHandler, RegistryError> {
        let identifier = self
            .by_address
            .get(address)
            .ok_or_else(|| RegistryError::InactiveOrUnknown(address.to_string()))?;
        self.resolve(identifier)
            .map_err(|_| RegistryError::InactiveOrUnknown(address.to_string()))
    }

    pub fn resolve_target(&self, target: &Target) -> Result<ResolvedHandler, RegistryError> {
        let resolved = match target {
            Target::Id(identifier) => self.resolve(identifier),
            Target::Address(address) => self.resolve_address(address),
        };
        if let Err(err) = &resolved {
            warn!(
                "event=registry_resolve module=registry status=error reason={}",
                err.kind().as_str()
            );
        }
        resolved
    }

    pub fn get(&self, identifier: &HandlerId) -> Option<&RegistryEntry> {
        self.entries.get(identifier)
    }

    /// Entries ordered by identifier, active and deactivated.
    pub fn entries(&self) -> Vec<&RegistryEntry> {
        self.entries.values().collect()
    }

    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn require_admin(
        &self,
        caller: &Address,
        operation: &'static str,
    ) -> Result<(), RegistryError> {
        if self.config.is_admin(caller) {
            return Ok(());
        }
        warn!(
            "event=registry_{} module=registry status=error reason=unauthorized caller={}",
            operation, caller
        );
        Err(RegistryError::Unauthorized {
            operation,
            caller: *caller,
        })
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{AdminConfig, HandlerRegistry, RegistryError, RegistryEvent};
    use crate::error::{Revert, RevertKind};
    use crate::handler::{Handler, HandlerContext, HandlerOutput};
    use crate::model::address::Address;
    use crate::model::instruction::{HandlerCall, Target};
    use crate::registry::handler_id::HandlerId;
    use std::sync::Arc;

    struct NoopHandler;

    impl Handler for NoopHandler {
        fn name(&self) -> &str {
            "HNoop"
        }

        fn entry_points(&self) -> &[&'static str] {
            &["noop"]
        }

        fn handle(
            &self,
            _ctx: &mut HandlerContext<'_>,
            _call: &HandlerCall,
        ) -> Result<HandlerOutput, Revert> {
            Ok(HandlerOutput::new(1))
        }
    }

    fn admin() -> Address {
        Address::from_low_u64(0xad)
    }

    fn id(tag: &str) -> HandlerId {
        HandlerId::from_tag(tag).expect("valid tag")
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new(AdminConfig::new(admin()))
    }

    #[test]
    fn register_then_resolve_by_id_and_address() {
        let mut registry = registry();
        let implementation = Address::from_low_u64(0x11);
        registry
            .register(&admin(), id("Noop"), implementation, Arc::new(NoopHandler))
            .expect("admin register");

        let by_id = registry.resolve(&id("Noop")).expect("resolve by id");
        assert_eq!(by_id.implementation_address, implementation);
        let by_address = registry
            .resolve_target(&Target::Address(implementation))
            .expect("resolve by address");
        assert_eq!(by_address.identifier, id("Noop"));
        assert_eq!(
            registry.events(),
            &[RegistryEvent {
                identifier: id("Noop"),
                implementation_address: implementation,
                active: true,
            }]
        );
    }

    #[test]
    fn non_admin_cannot_mutate() {
        let mut registry = registry();
        let stranger = Address::from_low_u64(0x5);
        let err = registry
            .register(
                &stranger,
                id("Noop"),
                Address::from_low_u64(0x11),
                Arc::new(NoopHandler),
            )
            .expect_err("stranger must be rejected");
        assert_eq!(err.kind(), RevertKind::Unauthorized);
        assert!(registry.is_empty());
        assert!(registry.events().is_empty());

        let revert = Revert::from(err);
        assert!(revert.to_string().starts_with("Registry_register: "));
    }

    #[test]
    fn duplicate_identifier_and_implementation_are_rejected() {
        let mut registry = registry();
        registry
            .register(
                &admin(),
                id("Noop"),
                Address::from_low_u64(0x11),
                Arc::new(NoopHandler),
            )
            .expect("first register");

        let err = registry
            .register(
                &admin(),
                id("Noop"),
                Address::from_low_u64(0x12),
                Arc::new(NoopHandler),
            )
            .expect_err("same identifier");
        assert_eq!(err, RegistryError::DuplicateIdentifier(id("Noop")));

        let err = registry
            .register(
                &admin(),
                id("Other"),
                Address::from_low_u64(0x11),
                Arc::new(NoopHandler),
            )
            .expect_err("same implementation");
        assert_eq!(err.kind(), RevertKind::DuplicateIdentifier);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn zero_implementation_is_invalid() {
        let mut registry = registry();
        let err = registry
            .register(&admin(), id("Noop"), Address::ZERO, Arc::new(NoopHandler))
            .expect_err("zero address");
        assert_eq!(err.kind(), RevertKind::InvalidInput);
    }

    #[test]
    fn deactivated_entries_stay_listed_but_do_not_resolve() {
        let mut registry = registry();
        let implementation = Address::from_low_u64(0x11);
        registry
            .register(&admin(), id("Noop"), implementation, Arc::new(NoopHandler))
            .expect("register");
        registry
            .deactivate(&admin(), &id("Noop"))
            .expect("deactivate");

        let entry = registry.get(&id("Noop")).expect("entry kept");
        assert!(!entry.active);
        assert!(entry.deactivated_at_ms.is_some());
        assert_eq!(
            registry.resolve(&id("Noop")).map(|_| ()),
            Err(RegistryError::InactiveOrUnknown("Noop".to_string()))
        );
        assert!(registry.resolve_address(&implementation).is_err());
        assert_eq!(registry.events().len(), 2);
        assert!(!registry.events()[1].active);

        let err = registry
            .deactivate(&admin(), &id("Noop"))
            .expect_err("already inactive");
        assert_eq!(err.kind(), RevertKind::InactiveOrUnknown);

        let err = registry
            .register(&admin(), id("Noop"), Address::from_low_u64(0x12), Arc::new(NoopHandler))
            .expect_err("identifier is never reused");
        assert_eq!(err.kind(), RevertKind::DuplicateIdentifier);
    }

    #[test]
    fn deactivating_unknown_identifier_is_not_found() {
        let mut registry = registry();
        let err = registry
            .deactivate(&admin(), &id("Ghost"))
            .expect_err("unknown id");
        assert_eq!(err.kind(), RevertKind::NotFound);
        assert_eq!(
            Revert::from(err).to_string(),
            "Registry_deactivate: identifier not found: Ghost"
        );
    }
}
