//! OTA transfer bookkeeping: declared geometry, running digest, verdict.

use sha2::{Digest, Sha256};

use swarmit_protocol::{OtaStart, OTA_HASH_SIZE};

/// `last_chunk_acked` sentinel meaning no chunk has been acknowledged yet.
/// Distinct from every real index so the first chunk is never mistaken for
/// a replay.
pub const NO_CHUNK_ACKED: u32 = u32::MAX;

/// State of the in-flight (or most recently finished) OTA transfer.
pub struct OtaTransfer {
    image_size: u32,
    chunk_count: u32,
    expected: [u8; OTA_HASH_SIZE],
    hasher: Sha256,
    /// `None` until a transfer ran to completion, then the verification
    /// verdict of the last one.
    outcome: Option<bool>,
}

impl OtaTransfer {
    pub fn new() -> Self {
        OtaTransfer {
            image_size: 0,
            chunk_count: 0,
            expected: [0; OTA_HASH_SIZE],
            hasher: Sha256::new(),
            outcome: None,
        }
    }

    /// Record the header of a fresh transfer and reset the running digest.
    pub fn begin(&mut self, header: &OtaStart) {
        self.image_size = header.image_size;
        self.chunk_count = header.chunk_count;
        self.expected = header.hash;
        self.hasher = Sha256::new();
        self.outcome = None;
        log::info!(
            "ota transfer: {} bytes in {} chunks",
            header.image_size,
            header.chunk_count
        );
    }

    /// Feed one chunk's bytes into the running digest.
    pub fn absorb(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Whether `index` addresses the final chunk of the transfer.
    pub fn is_last(&self, index: u32) -> bool {
        self.chunk_count > 0 && index == self.chunk_count - 1
    }

    /// Close the digest and compare it against the declared hash.
    pub fn finalize(&mut self) -> bool {
        let hasher = core::mem::replace(&mut self.hasher, Sha256::new());
        let computed = hasher.finalize();
        let matched = computed[..] == self.expected[..];
        self.outcome = Some(matched);
        if matched {
            log::info!("ota image verified");
        } else {
            log::warn!("ota image hash mismatch");
        }
        matched
    }

    /// A completed transfer failed verification: the staged image must not
    /// be launched.
    pub fn start_refused(&self) -> bool {
        self.outcome == Some(false)
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }
}

impl Default for OtaTransfer {
    fn default() -> Self {
        Self::new()
    }
}
