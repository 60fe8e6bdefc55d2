//! Shared data structures for the OEE decision engine
//!
//! - Observation records (input contract from the external loader)
//! - Anomaly knowledge-base records
//! - Decision objects: forecasts, optimal speeds, similar cases, alerts,
//!   line rankings

mod anomaly;
mod forecast;
mod ml;
mod observation;
mod optimization;
mod recommendation;

pub use anomaly::*;
pub use forecast::*;
pub use ml::*;
pub use observation::*;
pub use optimization::*;
pub use recommendation::*;
