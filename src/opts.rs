use crate::engine::StreamSelector;
use crate::media::{MediaKind, SeekDirection};

/// Read-ahead buffer handed to the engine when the caller has no preference.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Packets a stream may hold before the engine has to wait.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Options that control which packets a session produces.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI maps its flags into this type so other frontends (services, tests) can build
/// options programmatically.
#[derive(Debug, Clone)]
pub struct SessionOpts {
    /// Media kind targeted by point queries and streams.
    pub media_kind: MediaKind,

    /// Stream of that kind to use; `Best` lets the engine choose.
    pub stream: StreamSelector,

    /// How seeks land when the exact timestamp is unavailable.
    pub seek_direction: SeekDirection,

    /// Packets a stream buffers ahead of its consumer.
    ///
    /// With the buffer full the engine waits for the consumer; nothing is dropped. Clamped to
    /// at least one.
    pub high_water_mark: usize,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            media_kind: MediaKind::Audio,
            stream: StreamSelector::Best,
            seek_direction: SeekDirection::Backward,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}
