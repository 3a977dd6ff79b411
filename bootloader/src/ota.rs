//! Flash writer for the non-secure user partition.
//!
//! The erase at OTA start is also the commit mechanism in reverse: a
//! partially written image is never executable because its first page, the
//! one holding the reset vector, only becomes valid again once every chunk
//! has been written.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use swarmit_protocol::OTA_CHUNK_SIZE;

#[derive(Debug)]
pub enum Error<E> {
    ChunkTooLarge,
    Flash(E),
}

pub struct OtaWriter<F> {
    flash: F,
    user_base: u32,
}

impl<F: NorFlash> OtaWriter<F> {
    pub fn new(flash: F, user_base: u32) -> Self {
        OtaWriter { flash, user_base }
    }

    /// Erase enough pages at the user base address to hold `image_size`
    /// bytes.
    pub fn erase_user_region(&mut self, image_size: u32) -> Result<(), Error<F::Error>> {
        let page = F::ERASE_SIZE as u32;
        let pages = image_size.div_ceil(page);
        if pages == 0 {
            return Ok(());
        }
        log::info!("erasing {} user pages for a {} byte image", pages, image_size);
        self.flash
            .erase(self.user_base, self.user_base + pages * page)
            .map_err(Error::Flash)
    }

    /// Program one chunk at `user_base + index * OTA_CHUNK_SIZE`.
    ///
    /// A trailing partial chunk is padded with erased-state bytes up to the
    /// flash write granularity, so rewriting the same chunk (an operator
    /// retransmission) programs identical bits.
    pub fn write_chunk(&mut self, index: u32, bytes: &[u8]) -> Result<(), Error<F::Error>> {
        if bytes.len() > OTA_CHUNK_SIZE {
            return Err(Error::ChunkTooLarge);
        }
        let offset = self.user_base + index * OTA_CHUNK_SIZE as u32;
        let mut padded = [0xffu8; OTA_CHUNK_SIZE];
        padded[..bytes.len()].copy_from_slice(bytes);
        let length = bytes.len().next_multiple_of(F::WRITE_SIZE);
        self.flash.write(offset, &padded[..length]).map_err(Error::Flash)
    }
}

impl<F: ReadNorFlash> OtaWriter<F> {
    /// Whether the user partition starts with something other than erased
    /// flash. The first eight bytes hold the initial stack pointer and the
    /// reset vector; all-ones there means no image.
    pub fn image_present(&mut self) -> Result<bool, Error<F::Error>> {
        let mut vector = [0u8; 8];
        self.flash.read(self.user_base, &mut vector).map_err(Error::Flash)?;
        Ok(vector != [0xff; 8])
    }
}
