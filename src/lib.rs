//! MockWire
//!
//! An HTTP interception engine for development: declare rules that
//! divert outgoing calls and return synthetic responses instead of
//! hitting a real backend. Simulates error codes, network failures,
//! latency, and partial response data without server cooperation.
//!
//! # Features
//!
//! - **Rule Matching**: path patterns with named parameters
//!   (`/api/user/:id`), first match wins
//! - **Network Simulation**: delays, named profiles, forced
//!   timeout/offline, random failure rates
//! - **Response Synthesis**: business envelopes or raw HTTP-error
//!   bodies
//! - **Field Omission**: deterministic partial-data corruption under a
//!   seed
//! - **Cancellation**: simulated delays race cleanly against
//!   caller-initiated abort
//!
//! # Example Configuration
//!
//! ```yaml
//! rules:
//!   - id: login-ok
//!     url_pattern: /api/user/login
//!     method: POST
//!     network:
//!       delay_ms: 200
//!     response:
//!       status: 200
//!       err_no: 0
//!       result:
//!         token: "t"
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod omission;
pub mod pipeline;
pub mod rng;
pub mod simulator;
pub mod synthesizer;

pub use config::{GlobalConfig, MockWireConfig, Rule};
pub use error::{TransportFailure, WaitError};
pub use pipeline::{InterceptOutcome, InterceptRequest, InterceptionPipeline, Interceptor};
pub use synthesizer::SynthesizedResponse;
