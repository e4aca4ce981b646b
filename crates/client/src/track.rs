//! Media track abstraction
//!
//! Tracks are produced by capture devices (outbound) or by the handler
//! (inbound). The transport layer only needs their identity and kind.

use crate::parameters::MediaKind;

/// A local or remote media track
pub trait MediaTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> &str;

    /// Track media kind
    fn kind(&self) -> MediaKind;
}
