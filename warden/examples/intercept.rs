//! Selective interception with Warden.
//!
//! Run with `RUST_LOG=warden=debug cargo run --example intercept` to see
//! the container's own logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use warden::prelude::{
    Arguments, Container, Definition, HandlerInvocationError, Interceptable, Marker, MethodDescriptor,
    MethodHandlerRegistration, PendingCall, ProxyCore, TypeDescriptor, Value,
};

// === An interceptable interface ===

const AUDITED: Marker = Marker::new("audited");

const DEPOSIT: MethodDescriptor = MethodDescriptor::new("deposit").marked(&[AUDITED]);
const BALANCE: MethodDescriptor = MethodDescriptor::new("balance");
const STATEMENT: MethodDescriptor = MethodDescriptor::new("statement").asynchronous();
static ACCOUNT: TypeDescriptor = TypeDescriptor::new("Account", &[DEPOSIT, BALANCE, STATEMENT]);

trait Account: Send + Sync {
    fn deposit(&self, amount: u64) -> Result<u64, HandlerInvocationError>;
    fn balance(&self) -> Result<u64, HandlerInvocationError>;
    fn statement(&self) -> PendingCall<String>;
}

struct AccountProxy {
    inner: Arc<dyn Account>,
    core: ProxyCore,
}

impl Account for AccountProxy {
    fn deposit(&self, amount: u64) -> Result<u64, HandlerInvocationError> {
        self.core
            .invoke(&DEPOSIT, Arguments::new().with(amount), || Ok(self.inner.deposit(amount)?))
    }

    fn balance(&self) -> Result<u64, HandlerInvocationError> {
        self.core.invoke(&BALANCE, Arguments::new(), || Ok(self.inner.balance()?))
    }

    fn statement(&self) -> PendingCall<String> {
        let inner = self.inner.clone();
        self.core
            .invoke_async(&STATEMENT, Arguments::new(), move || Ok(inner.statement().wait()?))
    }
}

impl Interceptable for dyn Account {
    fn descriptor() -> &'static TypeDescriptor {
        &ACCOUNT
    }

    fn wrap(inner: Arc<Self>, core: ProxyCore) -> Arc<Self> {
        Arc::new(AccountProxy { inner, core })
    }
}

// === Implementation ===

#[derive(Default)]
struct SavingsAccount {
    balance: AtomicU64,
}

impl Account for SavingsAccount {
    fn deposit(&self, amount: u64) -> Result<u64, HandlerInvocationError> {
        Ok(self.balance.fetch_add(amount, Ordering::SeqCst) + amount)
    }

    fn balance(&self) -> Result<u64, HandlerInvocationError> {
        Ok(self.balance.load(Ordering::SeqCst))
    }

    fn statement(&self) -> PendingCall<String> {
        let thread = std::thread::current().name().unwrap_or("unnamed").to_owned();
        PendingCall::ready(format!(
            "balance {} (prepared on {thread})",
            self.balance.load(Ordering::SeqCst)
        ))
    }
}

fn main() -> warden::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warden=info,intercept=info")
        .init();

    let audit = MethodHandlerRegistration::new(|call| {
        let amount = call.args().get::<u64>(0).copied().unwrap_or_default();
        info!(method = call.method().name(), amount, "Audit");
        let total: u64 = call.proceed_as()?;
        Ok(Box::new(total) as Value)
    })
    .method_marker(AUDITED);

    let container = Container::builder()
        .register(
            Definition::of::<SavingsAccount>()
                .default_constructor()
                .intercept::<dyn Account>(|a| a)
                .build(),
        )
        .method_handler(audit)
        .build()?;

    println!("✅ Container built successfully!");
    println!("{container:?}");

    let account: Arc<dyn Account> = container.resolve()?;
    println!("🔍 Proxied: {}", container.is_proxy(&account));

    account.deposit(40)?;
    account.deposit(2)?;
    println!("💰 Balance: {}", account.balance()?);
    println!("📄 Statement: {}", account.statement().wait()?);

    container.shutdown()?;
    println!("🛑 Container is {}", container.phase());
    Ok(())
}
