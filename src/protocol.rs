//! Shared protocol constants for the hfile wire format
//!
//! One connection carries one file:
//! `name_len (u16 BE) | name (name_len bytes) | body (until EOF)`

// Header: 2-byte big-endian filename length
pub const HEADER_LEN: usize = 2;

// Filename length bounds enforced by both peers
pub const MIN_NAME_LEN: usize = 1;
pub const MAX_NAME_LEN: usize = 255;

// Body chunk size used when streaming file contents (1 MiB)
pub const CHUNK_SIZE: usize = 1024 * 1024;

// Bounds for a configured chunk size
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_IP: &str = "127.0.0.1";

/// Clamp a configured chunk size into the supported range.
pub fn clamp_chunk_size(size: usize) -> usize {
    size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

// Timeout constants used by the async transport
pub mod timeouts {
    // Base timeout for the header and filename reads (ms)
    pub const HEADER_MS: u64 = 5_000;

    // Base timeout for writes (ms)
    pub const WRITE_BASE_MS: u64 = 5_000;

    // Base timeout for body reads (ms)
    pub const READ_BASE_MS: u64 = 30_000;

    // Additional timeout per MB of data (ms)
    pub const PER_MB_MS: u64 = 100;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 5_000;

    // Calculate write deadline based on payload size (ms)
    // base + PER_MB_MS per started MiB
    pub fn write_deadline_ms(payload_len: usize) -> u64 {
        let mb = (payload_len as u64).div_ceil(1_048_576);
        WRITE_BASE_MS + mb * PER_MB_MS
    }

    // Calculate read deadline based on payload size (ms)
    pub fn read_deadline_ms(payload_len: usize) -> u64 {
        let mb = (payload_len as u64).div_ceil(1_048_576);
        READ_BASE_MS + mb * PER_MB_MS
    }
}
