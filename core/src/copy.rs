//! Chunked byte copying shared by the asset store and the image importer.

use std::io::{self, ErrorKind, Read, Write};

/// Chunk size used when materializing bundled assets.
pub const ASSET_CHUNK_SIZE: usize = 4 * 1024;

/// Chunk size used when importing picked images.
pub const IMPORT_CHUNK_SIZE: usize = 1024;

/// Copies every byte from `reader` to `writer` in chunks of at most
/// `chunk_size` bytes, flushes the writer and returns the number of bytes
/// copied.
pub fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    if chunk_size == 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "chunk size must be greater than zero",
        ));
    }

    let mut buffer = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}
