//! Immutable, sequenced records of what happened to a stock stream.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
