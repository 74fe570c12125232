//! Bridges between the compression byte in the header and the codec crates.

use async_compression::tokio::bufread::GzipDecoder;
#[cfg(feature = "brotli")]
use async_compression::tokio::bufread::BrotliDecoder;
#[cfg(feature = "zstd")]
use async_compression::tokio::bufread::ZstdDecoder;
use tokio::io::AsyncReadExt;

use crate::error::{PmtError, PmtResult};
use crate::header::Compression;

/// Decompresses a whole buffer framed with `compression`.
///
/// `None` copies the input; a kind that is not compiled into this build fails
/// with [`PmtError::UnsupportedCompression`].
pub(crate) async fn decompress(compression: Compression, bytes: &[u8]) -> PmtResult<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(bytes.len() * 2);
    match compression {
        Compression::None => decompressed.extend_from_slice(bytes),
        Compression::Gzip => {
            GzipDecoder::new(bytes).read_to_end(&mut decompressed).await?;
        }
        #[cfg(feature = "brotli")]
        Compression::Brotli => {
            BrotliDecoder::new(bytes).read_to_end(&mut decompressed).await?;
        }
        #[cfg(feature = "zstd")]
        Compression::Zstd => {
            ZstdDecoder::new(bytes).read_to_end(&mut decompressed).await?;
        }
        v => return Err(PmtError::UnsupportedCompression(v)),
    }
    Ok(decompressed)
}
