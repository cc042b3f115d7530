//! Deterministic Simulation Testing (DST)
//!
//! `TigerStyle`: Every time-, randomness-, and failure-dependent path in the
//! substrate flows through this module so tests can replay it exactly.
//!
//! - [`Clock`]: simulated or wall-clock time behind one handle
//! - [`DeterministicRng`]: seeded ChaCha20 RNG with independent forks
//! - [`FaultInjector`]: probabilistic fault injection for storage paths
//! - [`SimConfig`]: seed management with `DST_SEED` replay support

mod clock;
mod config;
mod fault;
mod rng;

pub use clock::Clock;
pub use config::SimConfig;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
