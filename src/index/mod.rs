//! 列块内的页定位索引
//!
//! **OrdinalIndex** — 稀疏行号→页位置，按 row 二分定位页；
//! 读取端依靠它逐页拉取，不必整块解码。

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Result, RowMapError};

/// 单页在列块中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub first_row: u32,
    /// 相对列块起点的偏移
    pub offset:    u64,
    pub length:    u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrdinalIndex {
    /// 按 first_row 升序
    entries: Vec<PageLocation>,
}

impl OrdinalIndex {
    pub fn add(&mut self, first_row: u32, offset: u64, length: u32) {
        self.entries.push(PageLocation { first_row, offset, length });
    }

    /// 找包含 row 的页（二分查找）
    pub fn find_page(&self, row: u32) -> Option<&PageLocation> {
        let pos = self.entries.partition_point(|p| p.first_row <= row);
        pos.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    pub fn page(&self, idx: usize) -> Option<&PageLocation> {
        self.entries.get(idx)
    }

    pub fn page_count(&self) -> usize { self.entries.len() }

    pub fn serialize_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for p in &self.entries {
            out.write_u32::<LittleEndian>(p.first_row)?;
            out.write_u64::<LittleEndian>(p.offset)?;
            out.write_u32::<LittleEndian>(p.length)?;
        }
        Ok(())
    }

    pub fn deserialize_from<R: Read>(rd: &mut R) -> Result<Self> {
        let n = rd.read_u32::<LittleEndian>()? as usize;
        let mut entries = Vec::with_capacity(n.min(1 << 16));
        for _ in 0..n {
            let first_row = rd.read_u32::<LittleEndian>()?;
            let offset    = rd.read_u64::<LittleEndian>()?;
            let length    = rd.read_u32::<LittleEndian>()?;
            if entries.last().is_some_and(|p: &PageLocation| p.first_row > first_row) {
                return Err(RowMapError::Encoding("ordinal index out of order".into()));
            }
            entries.push(PageLocation { first_row, offset, length });
        }
        Ok(Self { entries })
    }
}
