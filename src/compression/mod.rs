//! 压缩/解压（LZ4 / None）

use crate::common::{Result, RowMapError};
use crate::field_type::CompressionType;

pub fn compress(data: &[u8], codec: CompressionType) -> Result<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  =>
            lz4::block::compress(data, None, false)
                .map_err(|e| RowMapError::Compression(e.to_string())),
    }
}

pub fn decompress(
    data:             &[u8],
    codec:            CompressionType,
    uncompressed_len: usize,
) -> Result<Vec<u8>> {
    let out = match codec {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4  => {
            // 空输入在 LZ4 block 模式下没有合法压缩表示
            if uncompressed_len == 0 {
                return Ok(Vec::new());
            }
            lz4::block::decompress(data, Some(uncompressed_len as i32))
                .map_err(|e| RowMapError::Compression(e.to_string()))?
        }
    };
    if out.len() != uncompressed_len {
        return Err(RowMapError::Compression(format!(
            "{codec:?}: expected {uncompressed_len} bytes, got {}", out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_shrinks_repetitive_data() {
        let data = vec![7u8; 4096];
        let packed = compress(&data, CompressionType::Lz4).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, CompressionType::Lz4, data.len()).unwrap(), data);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let err = decompress(b"abc", CompressionType::None, 4).unwrap_err();
        assert!(matches!(err, RowMapError::Compression(_)));
    }
}
