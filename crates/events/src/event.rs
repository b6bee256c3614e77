use chrono::{DateTime, Utc};

/// A fact recorded against a stock stream.
///
/// Implementors are plain data: once sealed into an
/// [`EventEnvelope`](crate::EventEnvelope) they are never edited, only
/// followed by newer records.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, stable across releases (e.g. "inventory.stock.valued").
    fn event_type(&self) -> &'static str;

    /// Payload schema version; bump when fields change meaning.
    fn version(&self) -> u32;

    /// Business time of the fact, not the time it was written.
    fn occurred_at(&self) -> DateTime<Utc>;
}
