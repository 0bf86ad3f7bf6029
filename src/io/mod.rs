//! Random-access byte sources for the ZIP reader.

mod local;
#[cfg(test)]
mod memory;

pub use local::LocalFileReader;
#[cfg(test)]
pub(crate) use memory::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely starting at `offset`.
    ///
    /// Fails when the source ends before the buffer is full, which for a ZIP
    /// archive means a record points past the end of the file.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64);
        if end.is_none_or(|end| end > self.size()) {
            anyhow::bail!(
                "Read of {} bytes at offset {} is past the end of the source ({} bytes)",
                buf.len(),
                offset,
                self.size()
            );
        }

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                anyhow::bail!("Unexpected end of source at offset {}", offset + filled as u64);
            }
            filled += n;
        }
        Ok(())
    }
}
