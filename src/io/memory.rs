use super::ReadAt;
use anyhow::Result;
use async_trait::async_trait;

/// Archive bytes already held in memory.
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_exact_at_rejects_reads_past_the_end() {
        let reader = MemoryReader::new(b"abcdef".to_vec());

        let mut buf = [0u8; 3];
        reader.read_exact_at(2, &mut buf).await.unwrap();
        assert_eq!(&buf, b"cde");

        let mut buf = [0u8; 4];
        assert!(reader.read_exact_at(4, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn read_at_is_short_at_the_tail() {
        let reader = MemoryReader::new(b"abc".to_vec());
        let mut buf = [0u8; 8];
        assert_eq!(reader.read_at(1, &mut buf).await.unwrap(), 2);
        assert_eq!(reader.read_at(10, &mut buf).await.unwrap(), 0);
    }
}
