/// Largest payload the read path packs into a single outbound data frame.
///
/// Matches the transport's payload ceiling: a 256 kiB frame minus the
/// header overhead.
pub(crate) const MAXIMUM_PAYLOAD_SIZE_IN_BYTES: usize = 256 * 1024 - 24;

/// Stream engine configuration.
///
/// Defaults are always safe; construct with [`StreamConfig::new`] and
/// override fields as needed.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Size of the buffer offered to the data source on each read, and
    /// therefore the largest payload of one outbound data frame.
    pub maximum_payload_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            maximum_payload_size: MAXIMUM_PAYLOAD_SIZE_IN_BYTES,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
