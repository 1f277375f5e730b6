//! 列写入器
//!
//! 每列独立维护：
//!   - Data Page 缓冲区（满 `page_rows` 行即封页）
//!   - OrdinalIndex（行号→页位置）
//!   - 行数与空值计数

use crate::common::{Result, RowMapError};
use crate::field_type::{ColumnMeta, ColumnValue};
use crate::index::OrdinalIndex;
use crate::page::{PageBuilder, PageCodec};

/// 单个列块（即单个行组）的行数上限：页头与页索引以 u32 记录行号
pub const MAX_CHUNK_ROWS: u64 = u32::MAX as u64;

/// 写完的列块（尚未落盘）
#[derive(Debug)]
pub struct ColumnChunk {
    pub data:       Vec<u8>,
    pub num_values: u64,
    pub null_count: u64,
    pub pages:      OrdinalIndex,
}

pub struct ColumnWriter {
    meta:       ColumnMeta,
    // 已封页的字节（按顺序拼接）
    data:       Vec<u8>,
    current:    PageBuilder,
    page_rows:  usize,
    // 当前行计数（跨页累计）
    next_row:   u64,
    null_count: u64,
    pages:      OrdinalIndex,
}

impl ColumnWriter {
    pub fn new(meta: ColumnMeta, page_rows: usize) -> Self {
        let page = PageBuilder::new(0, codec_of(&meta), page_rows);
        Self {
            meta, data: Vec::new(),
            current: page, page_rows,
            next_row: 0, null_count: 0,
            pages: OrdinalIndex::default(),
        }
    }

    pub fn meta(&self) -> &ColumnMeta { &self.meta }

    /// 追加一个值到本列
    pub fn append(&mut self, value: ColumnValue) -> Result<()> {
        if self.next_row >= MAX_CHUNK_ROWS {
            return Err(RowMapError::Encoding(format!(
                "column `{}` already holds {MAX_CHUNK_ROWS} rows", self.meta.name
            )));
        }
        match value.physical_type() {
            None if !self.meta.nullable => {
                return Err(RowMapError::UnexpectedNull {
                    field: self.meta.name.clone(),
                    row:   self.next_row,
                });
            }
            None => self.null_count += 1,
            Some(ty) if ty != self.meta.physical => {
                return Err(RowMapError::ColumnTypeMismatch {
                    column:   self.meta.name.clone(),
                    expected: format!("{:?}", self.meta.physical),
                    actual:   format!("{ty:?}"),
                });
            }
            Some(_) => {}
        }

        self.current.add(value);
        self.next_row += 1;

        if self.current.is_full() {
            self.flush_page()?;
        }
        Ok(())
    }

    fn flush_page(&mut self) -> Result<()> {
        let first_row = self.current.first_row;
        let bytes = std::mem::replace(
            &mut self.current,
            PageBuilder::new(self.next_row as u32, codec_of(&self.meta), self.page_rows),
        ).build()?;

        self.pages.add(first_row, self.data.len() as u64, bytes.len() as u32);
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    /// 完成写入，返回列块字节与页索引
    pub fn finalize(mut self) -> Result<ColumnChunk> {
        if !self.current.is_empty() {
            self.flush_page()?;
        }
        Ok(ColumnChunk {
            data:       self.data,
            num_values: self.next_row,
            null_count: self.null_count,
            pages:      self.pages,
        })
    }

    pub fn num_rows(&self) -> u64 { self.next_row }
}

pub(crate) fn codec_of(meta: &ColumnMeta) -> PageCodec {
    PageCodec {
        physical:    meta.physical,
        encoding:    meta.encoding,
        compression: meta.compression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::PhysicalType;

    #[test]
    fn pages_split_at_page_rows() {
        let mut w = ColumnWriter::new(ColumnMeta::new(0, "a", PhysicalType::Int32), 4);
        for i in 0..10 {
            w.append(ColumnValue::Int32(i)).unwrap();
        }
        let chunk = w.finalize().unwrap();
        assert_eq!(chunk.num_values, 10);
        assert_eq!(chunk.pages.page_count(), 3);
        assert_eq!(chunk.pages.find_page(9).map(|p| p.first_row), Some(8));
    }

    #[test]
    fn chunk_row_ceiling() {
        let mut w = ColumnWriter::new(ColumnMeta::new(0, "a", PhysicalType::Int64), 4);
        w.next_row = MAX_CHUNK_ROWS - 1;
        w.current = PageBuilder::new(w.next_row as u32, codec_of(&w.meta), 4);
        w.append(ColumnValue::Int64(1)).unwrap();
        assert_eq!(w.num_rows(), MAX_CHUNK_ROWS);
        assert!(matches!(w.append(ColumnValue::Int64(2)), Err(RowMapError::Encoding(_))));
        assert_eq!(w.num_rows(), MAX_CHUNK_ROWS);
    }

    #[test]
    fn rejects_wrong_type_and_null() {
        let mut w = ColumnWriter::new(ColumnMeta::new(0, "a", PhysicalType::Double), 16);
        assert!(matches!(
            w.append(ColumnValue::Float(1.0)),
            Err(RowMapError::ColumnTypeMismatch { .. })
        ));
        assert!(matches!(
            w.append(ColumnValue::Null),
            Err(RowMapError::UnexpectedNull { row: 0, .. })
        ));
        assert_eq!(w.num_rows(), 0);
    }

    #[test]
    fn nullable_column_counts_nulls() {
        let meta = ColumnMeta::new(0, "a", PhysicalType::ByteArray).nullable();
        let mut w = ColumnWriter::new(meta, 16);
        w.append(ColumnValue::Bytes(b"x".to_vec())).unwrap();
        w.append(ColumnValue::Null).unwrap();
        let chunk = w.finalize().unwrap();
        assert_eq!(chunk.null_count, 1);
        assert_eq!(chunk.num_values, 2);
    }
}
