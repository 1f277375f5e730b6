//! 列读取器：按页拉取，一次只解码一页

use crate::column_writer::codec_of;
use crate::common::{Result, RowMapError};
use crate::field_type::{ColumnMeta, ColumnValue};
use crate::meta::ColumnChunkMetaData;
use crate::page::PageDecoder;

pub struct ColumnReader<'a> {
    meta:      &'a ColumnMeta,
    chunk:     &'a ColumnChunkMetaData,
    /// 列块字节（已按 offset/size 切好）
    data:      &'a [u8],
    buffered:  std::vec::IntoIter<ColumnValue>,
    consumed:  u64,
}

impl<'a> ColumnReader<'a> {
    pub(crate) fn new(
        meta:  &'a ColumnMeta,
        chunk: &'a ColumnChunkMetaData,
        data:  &'a [u8],
    ) -> Self {
        Self {
            meta, chunk, data,
            buffered:  Vec::new().into_iter(),
            consumed:  0,
        }
    }

    pub fn meta(&self) -> &ColumnMeta { self.meta }

    /// 已读出的值个数（即下一行的行号）
    pub fn position(&self) -> u64 { self.consumed }

    pub fn has_next(&self) -> bool { self.consumed < self.chunk.num_values }

    /// 读取下一个值；列块读尽返回 None
    pub fn next_value(&mut self) -> Result<Option<ColumnValue>> {
        if !self.has_next() {
            return Ok(None);
        }
        loop {
            if let Some(v) = self.buffered.next() {
                self.consumed += 1;
                return Ok(Some(v));
            }
            self.load_next_page()?;
        }
    }

    fn load_next_page(&mut self) -> Result<()> {
        // 当前缓冲页已读尽，下一行必然是某页的首行
        let row = u32::try_from(self.consumed)
            .map_err(|_| RowMapError::Encoding(format!("row {} beyond page index", self.consumed)))?;
        let loc = self.chunk.pages.find_page(row).ok_or_else(|| {
            RowMapError::Encoding(format!(
                "column `{}`: {} values promised, pages exhausted at {}",
                self.meta.name, self.chunk.num_values, self.consumed
            ))
        })?;
        let start = loc.offset as usize;
        let end   = start + loc.length as usize;
        let bytes = self.data.get(start..end).ok_or_else(|| {
            RowMapError::Encoding(format!("column `{}`: page outside column chunk", self.meta.name))
        })?;

        let page = PageDecoder::decode(bytes, codec_of(self.meta))?;
        if page.first_row as u64 != self.consumed {
            return Err(RowMapError::Encoding(format!(
                "column `{}`: page starts at row {}, expected {}",
                self.meta.name, page.first_row, self.consumed
            )));
        }
        if page.values.is_empty() {
            return Err(RowMapError::Encoding(format!(
                "column `{}`: empty page at row {}", self.meta.name, self.consumed
            )));
        }
        self.buffered = page.values.into_iter();
        Ok(())
    }
}
