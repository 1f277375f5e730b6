//! 文件级持久化元数据（Footer 内容）

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Result, RowMapError};
use crate::field_type::{ColumnMeta, CompressionType, EncodingType, LogicalType, PhysicalType};
use crate::index::OrdinalIndex;

// ── 列块元数据 ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChunkMetaData {
    pub column_id:   u32,
    pub compression: CompressionType,
    pub encoding:    EncodingType,
    /// 列块在文件中的绝对偏移
    pub offset:      u64,
    pub size:        u64,
    pub num_values:  u64,
    pub null_count:  u64,
    pub pages:       OrdinalIndex,
}

// ── 行组元数据 ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroupMetaData {
    pub num_rows:        u64,
    pub total_byte_size: u64,
    pub columns:         Vec<ColumnChunkMetaData>,
}

impl RowGroupMetaData {
    pub fn num_columns(&self) -> usize { self.columns.len() }

    pub fn column_chunk(&self, idx: usize) -> Option<&ColumnChunkMetaData> {
        self.columns.get(idx)
    }
}

// ── 文件元数据 ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaData {
    pub version:    u32,
    pub created_by: String,
    pub schema:     Vec<ColumnMeta>,
    pub row_groups: Vec<RowGroupMetaData>,
    pub key_value:  Vec<(String, String)>,
}

impl FileMetaData {
    pub fn num_columns(&self)    -> usize { self.schema.len() }
    pub fn num_row_groups(&self) -> usize { self.row_groups.len() }
    pub fn num_rows(&self)       -> u64   { self.row_groups.iter().map(|rg| rg.num_rows).sum() }

    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.key_value.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.version)?;
        write_str(&mut out, &self.created_by)?;

        out.write_u32::<LittleEndian>(self.schema.len() as u32)?;
        for col in &self.schema {
            write_column_meta(&mut out, col)?;
        }

        out.write_u32::<LittleEndian>(self.row_groups.len() as u32)?;
        for rg in &self.row_groups {
            out.write_u64::<LittleEndian>(rg.num_rows)?;
            out.write_u64::<LittleEndian>(rg.total_byte_size)?;
            out.write_u32::<LittleEndian>(rg.columns.len() as u32)?;
            for cc in &rg.columns {
                out.write_u32::<LittleEndian>(cc.column_id)?;
                out.push(compression_tag(cc.compression));
                out.push(encoding_tag(cc.encoding));
                out.write_u64::<LittleEndian>(cc.offset)?;
                out.write_u64::<LittleEndian>(cc.size)?;
                out.write_u64::<LittleEndian>(cc.num_values)?;
                out.write_u64::<LittleEndian>(cc.null_count)?;
                cc.pages.serialize_into(&mut out)?;
            }
        }

        out.write_u32::<LittleEndian>(self.key_value.len() as u32)?;
        for (k, v) in &self.key_value {
            write_str(&mut out, k)?;
            write_str(&mut out, v)?;
        }
        Ok(out)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut rd = Cursor::new(data);
        let version    = rd.read_u32::<LittleEndian>()?;
        let created_by = read_str(&mut rd)?;

        let ncols = rd.read_u32::<LittleEndian>()? as usize;
        let mut schema = Vec::with_capacity(ncols.min(4096));
        for _ in 0..ncols {
            schema.push(read_column_meta(&mut rd)?);
        }

        let ngroups = rd.read_u32::<LittleEndian>()? as usize;
        let mut row_groups = Vec::with_capacity(ngroups.min(4096));
        for _ in 0..ngroups {
            let num_rows        = rd.read_u64::<LittleEndian>()?;
            let total_byte_size = rd.read_u64::<LittleEndian>()?;
            let nchunks         = rd.read_u32::<LittleEndian>()? as usize;
            let mut columns = Vec::with_capacity(nchunks.min(4096));
            for _ in 0..nchunks {
                columns.push(ColumnChunkMetaData {
                    column_id:   rd.read_u32::<LittleEndian>()?,
                    compression: compression_from_tag(rd.read_u8()?)?,
                    encoding:    encoding_from_tag(rd.read_u8()?)?,
                    offset:      rd.read_u64::<LittleEndian>()?,
                    size:        rd.read_u64::<LittleEndian>()?,
                    num_values:  rd.read_u64::<LittleEndian>()?,
                    null_count:  rd.read_u64::<LittleEndian>()?,
                    pages:       OrdinalIndex::deserialize_from(&mut rd)?,
                });
            }
            row_groups.push(RowGroupMetaData { num_rows, total_byte_size, columns });
        }

        let nkv = rd.read_u32::<LittleEndian>()? as usize;
        let mut key_value = Vec::with_capacity(nkv.min(4096));
        for _ in 0..nkv {
            let k = read_str(&mut rd)?;
            let v = read_str(&mut rd)?;
            key_value.push((k, v));
        }

        Ok(Self { version, created_by, schema, row_groups, key_value })
    }
}

// ── 辅助编解码 ────────────────────────────────────────────────────────────────

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    out.write_u32::<LittleEndian>(s.len() as u32)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str<R: Read>(rd: &mut R) -> Result<String> {
    let len = rd.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    rd.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| RowMapError::Encoding(format!("footer string: {e}")))
}

fn write_column_meta(out: &mut Vec<u8>, col: &ColumnMeta) -> Result<()> {
    out.write_u32::<LittleEndian>(col.column_id)?;
    write_str(out, &col.name)?;
    out.push(col.physical.tag());
    match col.logical {
        LogicalType::None                       => out.push(0),
        LogicalType::Int { bits, signed }       => { out.push(1); out.push(bits); out.push(signed as u8); }
        LogicalType::Date                       => out.push(2),
        LogicalType::Timestamp                  => out.push(3),
        LogicalType::Decimal { precision, scale } => { out.push(4); out.push(precision); out.push(scale); }
        LogicalType::Utf8                       => out.push(5),
    }
    out.push(col.nullable as u8);
    out.push(encoding_tag(col.encoding));
    out.push(compression_tag(col.compression));
    Ok(())
}

fn read_column_meta<R: Read>(rd: &mut R) -> Result<ColumnMeta> {
    let column_id = rd.read_u32::<LittleEndian>()?;
    let name      = read_str(rd)?;
    let ptag      = rd.read_u8()?;
    let physical  = PhysicalType::from_tag(ptag)
        .ok_or_else(|| RowMapError::Encoding(format!("unknown physical type tag {ptag}")))?;
    let logical = match rd.read_u8()? {
        0 => LogicalType::None,
        1 => LogicalType::Int { bits: rd.read_u8()?, signed: rd.read_u8()? != 0 },
        2 => LogicalType::Date,
        3 => LogicalType::Timestamp,
        4 => LogicalType::Decimal { precision: rd.read_u8()?, scale: rd.read_u8()? },
        5 => LogicalType::Utf8,
        t => return Err(RowMapError::Encoding(format!("unknown logical type tag {t}"))),
    };
    let nullable    = rd.read_u8()? != 0;
    let encoding    = encoding_from_tag(rd.read_u8()?)?;
    let compression = compression_from_tag(rd.read_u8()?)?;
    Ok(ColumnMeta { column_id, name, physical, logical, nullable, encoding, compression })
}

fn encoding_tag(enc: EncodingType) -> u8 {
    match enc {
        EncodingType::Plain       => 0,
        EncodingType::RunLength   => 1,
        EncodingType::DeltaBinary => 2,
        EncodingType::Dictionary  => 3,
    }
}

fn encoding_from_tag(tag: u8) -> Result<EncodingType> {
    Ok(match tag {
        0 => EncodingType::Plain,
        1 => EncodingType::RunLength,
        2 => EncodingType::DeltaBinary,
        3 => EncodingType::Dictionary,
        t => return Err(RowMapError::Encoding(format!("unknown encoding tag {t}"))),
    })
}

fn compression_tag(c: CompressionType) -> u8 {
    match c {
        CompressionType::None => 0,
        CompressionType::Lz4  => 1,
    }
}

fn compression_from_tag(tag: u8) -> Result<CompressionType> {
    Ok(match tag {
        0 => CompressionType::None,
        1 => CompressionType::Lz4,
        t => return Err(RowMapError::Encoding(format!("unknown compression tag {t}"))),
    })
}
