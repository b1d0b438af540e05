// Trace capture: wraps a memory region so every write is appended to a
// capture file before reaching the backing store. Format (little-endian,
// per spec.md §6): `u32 tag=1, u32 addr, u32 len, [len bytes data]`, then
// 0..3 zero bytes padding the next packet to a 4-byte boundary.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const TAG_WRITE: u32 = 1;

pub struct TraceWriter {
    out: BufWriter<File>,
}

impl TraceWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(TraceWriter { out: BufWriter::new(file) })
    }

    /// Appends one write packet. Errors are logged rather than propagated:
    /// a tracing failure must not perturb emulation, which is the whole
    /// point of routing writes through the real backend regardless.
    pub fn log_write(&mut self, addr: u32, data: &[u8]) {
        if let Err(e) = self.try_log_write(addr, data) {
            log::warn!("trace: failed to append write packet: {}", e);
        }
    }

    fn try_log_write(&mut self, addr: u32, data: &[u8]) -> io::Result<()> {
        self.out.write_all(&TAG_WRITE.to_le_bytes())?;
        self.out.write_all(&addr.to_le_bytes())?;
        self.out.write_all(&(data.len() as u32).to_le_bytes())?;
        self.out.write_all(data)?;
        let padding = (4 - (data.len() % 4)) % 4;
        self.out.write_all(&[0u8; 3][..padding])?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn write_packet_matches_the_documented_layout() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("washdc_trace_test_{:?}", std::thread::current().id()));
        {
            let mut writer = TraceWriter::create(&path).unwrap();
            writer.log_write(0x1000, &[0xaa, 0xbb, 0xcc]);
            writer.flush().unwrap();
        }
        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(&buf[0..4], &1u32.to_le_bytes());
        assert_eq!(&buf[4..8], &0x1000u32.to_le_bytes());
        assert_eq!(&buf[8..12], &3u32.to_le_bytes());
        assert_eq!(&buf[12..15], &[0xaa, 0xbb, 0xcc]);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[15], 0);
    }
}
