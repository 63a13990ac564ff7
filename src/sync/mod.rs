//! Coordination primitives shared by the managers.
//!
//! - [`RendezvousExecutor`]: runs callbacks one at a time, dropping bursts
//! - [`Debouncer`]: runs the latest posted action after a quiet window
//! - [`SuspendableInitializer`]: one-shot "ready or failed" gate
//! - [`LatestSignal`]: change notification where subscribers only see the latest value

mod debouncer;
mod initializer;
mod latest;
mod rendezvous;

pub use debouncer::Debouncer;
pub use initializer::SuspendableInitializer;
pub use latest::LatestSignal;
pub use rendezvous::RendezvousExecutor;
