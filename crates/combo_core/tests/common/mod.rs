#![allow(dead_code)]

use combo_core::model::amount::encode_amount;
use combo_core::{
    AdminConfig, Address, Amount, Asset, Dispatcher, EngineConfig, ExternalProtocol, Handler,
    HandlerId, HandlerRegistry, Ledger, ProtocolCall, ProtocolEnv, ProtocolError, RevertKind,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

pub const ONE_TENTH_NATIVE: Amount = 100_000_000_000_000_000;

pub fn admin() -> Address {
    Address::from_low_u64(0xad)
}

pub fn user() -> Address {
    Address::from_low_u64(0x05e7)
}

pub fn dispatcher_address() -> Address {
    Address::from_low_u64(0xd15)
}

pub fn token(low: u64) -> Asset {
    Asset::Token(Address::from_low_u64(low))
}

pub fn token_x() -> Asset {
    token(0x7001)
}

pub fn token_y() -> Asset {
    token(0x7002)
}

pub fn handler_id(tag: &str) -> HandlerId {
    HandlerId::from_tag(tag).expect("valid handler tag")
}

/// Off-chain built route the quoted router executes, carried as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePayload {
    pub src: Asset,
    pub dest: Asset,
    pub amount_in: Amount,
    pub amount_out: Amount,
    /// Amount the router claims to have delivered; defaults to `amount_out`.
    #[serde(default)]
    pub report: Option<Amount>,
}

impl RoutePayload {
    pub fn new(src: Asset, dest: Asset, amount_in: Amount, amount_out: Amount) -> Self {
        Self {
            src,
            dest,
            amount_in,
            amount_out,
            report: None,
        }
    }

    pub fn reporting(mut self, report: Amount) -> Self {
        self.report = Some(report);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serializes")
    }
}

/// Router that executes the quoted route in its payload out of its reserves.
pub struct QuotedRouter {
    address: Address,
    spender: Address,
    calls: AtomicUsize,
}

impl QuotedRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            spender: address,
            calls: AtomicUsize::new(0),
        }
    }

    /// Router whose token approvals go to a separate transfer proxy.
    pub fn with_transfer_proxy(address: Address, spender: Address) -> Self {
        Self {
            address,
            spender,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalProtocol for QuotedRouter {
    fn address(&self) -> &Address {
        &self.address
    }

    fn spender(&self) -> &Address {
        &self.spender
    }

    fn invoke(
        &self,
        env: &mut ProtocolEnv<'_>,
        call: &ProtocolCall<'_>,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let route: RoutePayload = serde_json::from_slice(call.payload)
            .map_err(|err| ProtocolError::new(format!("malformed route: {err}")))?;

        if route.src.is_native() {
            if env.value() < route.amount_in {
                return Err(ProtocolError::new(format!(
                    "insufficient value: sent {}, route needs {}",
                    env.value(),
                    route.amount_in
                )));
            }
        } else {
            let held = env.caller_balance(&route.src)?;
            if held < route.amount_in {
                return Err(ProtocolError::new(format!(
                    "insufficient source balance: holds {held}, route needs {}",
                    route.amount_in
                )));
            }
            env.pull(&route.src, route.amount_in)?;
        }
        env.pay(&route.dest, route.amount_out)?;
        Ok(encode_amount(route.report.unwrap_or(route.amount_out)))
    }
}

/// Router that always fails and counts how often it was reached.
pub struct FailingRouter {
    address: Address,
    calls: AtomicUsize,
}

impl FailingRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalProtocol for FailingRouter {
    fn address(&self) -> &Address {
        &self.address
    }

    fn invoke(
        &self,
        _env: &mut ProtocolEnv<'_>,
        _call: &ProtocolCall<'_>,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProtocolError::new("router paused"))
    }
}

/// Router that calls back into the dispatcher while it is executing.
pub struct ReentrantRouter {
    address: Address,
    dispatcher: OnceLock<Arc<Dispatcher>>,
    nested: Mutex<Option<RevertKind>>,
    from_helper_thread: bool,
}

impl ReentrantRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            dispatcher: OnceLock::new(),
            nested: Mutex::new(None),
            from_helper_thread: false,
        }
    }

    /// Makes the nested call from a spawned thread and waits for it.
    pub fn on_helper_thread(address: Address) -> Self {
        Self {
            from_helper_thread: true,
            ..Self::new(address)
        }
    }

    pub fn bind(&self, dispatcher: Arc<Dispatcher>) {
        let _ = self.dispatcher.set(dispatcher);
    }

    /// Failure kind the nested call observed.
    pub fn nested_failure(&self) -> Option<RevertKind> {
        *self.nested.lock().expect("nested lock")
    }
}

impl ExternalProtocol for ReentrantRouter {
    fn address(&self) -> &Address {
        &self.address
    }

    fn invoke(
        &self,
        env: &mut ProtocolEnv<'_>,
        _call: &ProtocolCall<'_>,
    ) -> Result<Vec<u8>, ProtocolError> {
        let dispatcher = self
            .dispatcher
            .get()
            .ok_or_else(|| ProtocolError::new("dispatcher not bound"))?;
        let caller = *env.address();
        let outcome = if self.from_helper_thread {
            let nested = Arc::clone(dispatcher);
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let _ = tx.send(nested.execute(caller, 0, Vec::new()));
            });
            rx.recv_timeout(Duration::from_secs(5))
                .map_err(|_| ProtocolError::new("nested call blocked"))?
        } else {
            dispatcher.execute(caller, 0, Vec::new())
        };
        match outcome {
            Ok(_) => Err(ProtocolError::new("nested execute unexpectedly succeeded")),
            Err(revert) => {
                *self.nested.lock().expect("nested lock") = Some(revert.kind());
                Err(ProtocolError::new(revert.to_string()))
            }
        }
    }
}

/// Dispatcher over an in-memory ledger plus helpers for setup and reads.
pub struct Fixture {
    pub dispatcher: Arc<Dispatcher>,
}

impl Fixture {
    pub fn new() -> Self {
        let config = EngineConfig::new(dispatcher_address(), admin());
        let registry = HandlerRegistry::new(AdminConfig::new(admin())).into_shared();
        let dispatcher = Dispatcher::open(&config, registry).expect("open dispatcher");
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn register(&self, tag: &str, implementation: Address, handler: Arc<dyn Handler>) {
        self.dispatcher
            .registry()
            .write()
            .expect("registry lock")
            .register(&admin(), handler_id(tag), implementation, handler)
            .expect("admin registers handler");
    }

    pub fn deactivate(&self, tag: &str) {
        self.dispatcher
            .registry()
            .write()
            .expect("registry lock")
            .deactivate(&admin(), &handler_id(tag))
            .expect("admin deactivates handler");
    }

    pub fn fund(&self, account: &Address, asset: &Asset, amount: Amount) {
        self.dispatcher
            .with_ledger(|ledger| ledger.credit(account, asset, amount))
            .expect("ledger available")
            .expect("credit succeeds");
    }

    pub fn balance(&self, account: &Address, asset: &Asset) -> Amount {
        self.dispatcher
            .with_ledger(|ledger| ledger.balance_of(account, asset))
            .expect("ledger available")
            .expect("balance readable")
    }

    /// Dispatcher holds nothing of any listed asset.
    pub fn assert_dispatcher_empty(&self, assets: &[Asset]) {
        for asset in assets {
            assert_eq!(
                self.balance(&dispatcher_address(), asset),
                0,
                "dispatcher still holds {asset}"
            );
        }
    }
}
