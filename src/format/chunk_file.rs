//! Typed random-access reader over a chunk streaming file.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Little-endian typed reader with seek/tell.
pub struct ChunkFile<R> {
    inner: R,
}

impl ChunkFile<BufReader<File>> {
    /// Open a chunk file from disk.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read + Seek> ChunkFile<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Seek to an absolute byte offset.
    pub fn seek(&mut self, position: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Current absolute byte offset.
    pub fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    /// Bytes between the current offset and the end of the file.
    pub fn remaining(&mut self) -> io::Result<u64> {
        let position = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(end.saturating_sub(position))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_typed_reads_little_endian() {
        let mut bytes = Vec::new();
        bytes.push(7u8);
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        bytes.extend_from_slice(&(-5i16).to_le_bytes());
        bytes.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        bytes.extend_from_slice(&(-42i32).to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());

        let mut file = ChunkFile::new(Cursor::new(bytes));
        assert_eq!(file.read_u8().unwrap(), 7);
        assert_eq!(file.read_u16().unwrap(), 0x1234);
        assert_eq!(file.read_i16().unwrap(), -5);
        assert_eq!(file.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(file.read_i32().unwrap(), -42);
        assert_eq!(file.read_f32().unwrap(), 1.5);
        assert_eq!(file.tell().unwrap(), 18);
    }

    #[test]
    fn test_seek_and_eof() {
        let mut file = ChunkFile::new(Cursor::new(vec![1u8, 2, 3, 4]));
        file.seek(2).unwrap();
        assert_eq!(file.read_u8().unwrap(), 3);
        assert_eq!(file.tell().unwrap(), 3);

        let err = file.read_u32().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_remaining_keeps_position() {
        let mut file = ChunkFile::new(Cursor::new(vec![0u8; 10]));
        file.seek(4).unwrap();
        assert_eq!(file.remaining().unwrap(), 6);
        assert_eq!(file.tell().unwrap(), 4);
        file.seek(20).unwrap();
        assert_eq!(file.remaining().unwrap(), 0);
    }
}
