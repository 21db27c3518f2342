//! # Warden: dependency injection with selective interception
//!
//! A singleton container that detects cycles per resolution call,
//! tolerates field-injection cycles, and hands out proxies only for beans
//! that a registered method handler (or an asynchronous method) needs to
//! intercept.
//!
//! ```
//! use std::sync::Arc;
//! use warden::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! #[derive(Default)]
//! struct FixedClock;
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 { 42 }
//! }
//!
//! let container = Container::builder().build()?;
//! container.register_type::<dyn Clock, FixedClock>(|c| c)?;
//!
//! let clock: Arc<dyn Clock> = container.resolve()?;
//! assert_eq!(clock.now(), 42);
//! # Ok::<(), WardenError>(())
//! ```

pub use warden_container::*;
pub use warden_support::*;
