//! Real-time air hockey on top of the document sync layer.
//!
//! The host runs the authoritative simulation and publishes the puck at a
//! throttled rate; each side owns its paddle. Guests predict locally and
//! reconcile with what the host publishes.

pub mod payload;
pub mod physics;
pub mod reconciler;
pub mod session;
pub mod timestep;

pub use payload::HockeyState;
pub use physics::{GoalGuard, HockeyConfig, Puck, collide, step};
pub use reconciler::{Reconciled, SendThrottle};
pub use session::HockeySession;
pub use timestep::FixedTimestep;
