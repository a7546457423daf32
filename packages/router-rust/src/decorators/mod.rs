//! Built-in decorators, each registered through its factory.
//!
//! - [`LoggingFactory`]: `tracing` span per attempt with duration and outcome
//! - [`TimeoutFactory`]: per-attempt deadline with child-token cancellation
//! - [`CircuitBreakerFactory`]: per-key breaker that rejects keys that keep failing
//! - [`ConcurrencyLimitFactory`]: semaphore-based load shedding
//!
//! Registration order is outer to inner; a typical stack is
//! `[logging, concurrency, circuit breaker, timeout]`.

pub mod circuit_breaker;
pub mod concurrency;
pub mod logging;
pub mod timeout;

pub use circuit_breaker::{CircuitBreakerDecorator, CircuitBreakerFactory, CircuitState};
pub use concurrency::{ConcurrencyLimitDecorator, ConcurrencyLimitFactory};
pub use logging::{LoggingDecorator, LoggingFactory};
pub use timeout::{TimeoutDecorator, TimeoutFactory};
