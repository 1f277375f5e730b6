//! Data Page 读写
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ value_count  (u32 LE)            │
//! │ first_row    (u32 LE)            │
//! │ uncomp_size  (u32 LE)            │
//! │ has_nulls    (u8)                │
//! │ [validity bitmap (bit-packed)]   │  仅 has_nulls = 1
//! │ data         (encoded+compressed)│  仅非空值
//! │ CRC32        (u32 LE)            │
//! └──────────────────────────────────┘
//! ```

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Result, RowMapError};
use crate::compression;
use crate::encoding;
use crate::field_type::{ColumnValue, CompressionType, EncodingType, PhysicalType};

/// 每页默认容纳的行数
pub const PAGE_MAX_ROWS: usize = 1024;

const HEADER_LEN: usize = 13;

/// 页的编码参数（同一列的所有页共享）
#[derive(Debug, Clone, Copy)]
pub struct PageCodec {
    pub physical:    PhysicalType,
    pub encoding:    EncodingType,
    pub compression: CompressionType,
}

// ── PageBuilder ───────────────────────────────────────────────────────────────

pub struct PageBuilder {
    pub first_row: u32,
    codec:         PageCodec,
    max_rows:      usize,
    values:        Vec<ColumnValue>,
}

impl PageBuilder {
    pub fn new(first_row: u32, codec: PageCodec, max_rows: usize) -> Self {
        Self { first_row, codec, max_rows: max_rows.max(1), values: Vec::new() }
    }

    pub fn add(&mut self, v: ColumnValue) {
        self.values.push(v);
    }

    pub fn len(&self)      -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }
    pub fn is_full(&self)  -> bool  { self.values.len() >= self.max_rows }

    /// 序列化为页字节（拆出 bitmap → encode → compress → 加 header+CRC）
    pub fn build(self) -> Result<Vec<u8>> {
        let count     = self.values.len();
        let has_nulls = self.values.iter().any(ColumnValue::is_null);

        let mut bitmap = Vec::new();
        if has_nulls {
            bitmap = vec![0u8; count.div_ceil(8)];
            for (i, v) in self.values.iter().enumerate() {
                if !v.is_null() {
                    bitmap[i / 8] |= 1 << (i % 8);
                }
            }
        }

        let present: Vec<ColumnValue> = self.values.into_iter()
            .filter(|v| !v.is_null())
            .collect();
        let encoded    = encoding::encode(&present, self.codec.physical, self.codec.encoding)?;
        let compressed = compression::compress(&encoded, self.codec.compression)?;

        let mut page = Vec::with_capacity(HEADER_LEN + bitmap.len() + compressed.len() + 4);
        page.write_u32::<LittleEndian>(count as u32)?;
        page.write_u32::<LittleEndian>(self.first_row)?;
        page.write_u32::<LittleEndian>(encoded.len() as u32)?;
        page.push(has_nulls as u8);
        page.extend_from_slice(&bitmap);
        page.extend_from_slice(&compressed);

        let crc = crc32fast::hash(&page);
        page.write_u32::<LittleEndian>(crc)?;
        Ok(page)
    }
}

// ── PageDecoder ───────────────────────────────────────────────────────────────

pub struct PageDecoder {
    pub value_count: usize,
    pub first_row:   u32,
    pub values:      Vec<ColumnValue>,
}

impl PageDecoder {
    pub fn decode(data: &[u8], codec: PageCodec) -> Result<Self> {
        if data.len() < HEADER_LEN + 4 {
            return Err(RowMapError::Encoding("page data too short".into()));
        }
        let payload_end = data.len() - 4;

        // 先校验 CRC
        let stored_crc = Cursor::new(&data[payload_end..]).read_u32::<LittleEndian>()?;
        if crc32fast::hash(&data[..payload_end]) != stored_crc {
            return Err(RowMapError::ChecksumMismatch);
        }

        let mut hdr     = Cursor::new(&data[..HEADER_LEN]);
        let value_count = hdr.read_u32::<LittleEndian>()? as usize;
        let first_row   = hdr.read_u32::<LittleEndian>()?;
        let uncomp_size = hdr.read_u32::<LittleEndian>()? as usize;
        let has_nulls   = hdr.read_u8()? != 0;

        let bitmap_len = if has_nulls { value_count.div_ceil(8) } else { 0 };
        if HEADER_LEN + bitmap_len > payload_end {
            return Err(RowMapError::Encoding("page bitmap exceeds page".into()));
        }
        let bitmap  = &data[HEADER_LEN..HEADER_LEN + bitmap_len];
        let payload = &data[HEADER_LEN + bitmap_len..payload_end];

        let is_present = |i: usize| !has_nulls || bitmap[i / 8] & (1 << (i % 8)) != 0;
        let present    = (0..value_count).filter(|&i| is_present(i)).count();

        let raw     = compression::decompress(payload, codec.compression, uncomp_size)?;
        let decoded = encoding::decode(&raw, codec.physical, codec.encoding, present)?;

        let values = if has_nulls {
            let mut it  = decoded.into_iter();
            let mut out = Vec::with_capacity(value_count);
            for i in 0..value_count {
                if is_present(i) {
                    // decode 已保证数量与 present 一致
                    out.push(it.next().unwrap_or(ColumnValue::Null));
                } else {
                    out.push(ColumnValue::Null);
                }
            }
            out
        } else {
            decoded
        };

        Ok(Self { value_count, first_row, values })
    }
}
