//! 列存文件读写（多行组）
//!
//! 文件格式：
//! ```text
//! ┌────────────────────────────────────┐
//! │  MAGIC  (8 bytes) "OLAPROW\0"      │
//! │  Version(4 bytes) = 1              │
//! ├────────────────────────────────────┤
//! │  ROW GROUP 0                       │
//! │    [Column chunk 0: data pages]    │ ← 编码 + LZ4/None
//! │    [Column chunk 1: data pages]    │
//! │    ...                             │
//! │  ROW GROUP 1 ...                   │
//! ├────────────────────────────────────┤
//! │  FOOTER                            │
//! │    FileMetaData (自定义二进制)      │
//! │    Footer CRC32  (4 bytes)         │
//! │    Footer length (4 bytes)         │
//! │    MAGIC         (8 bytes)         │
//! └────────────────────────────────────┘
//! ```
//!
//! 行组按顺序落盘：`RowGroupWriter::close` 时一次写出全部列块，
//! 未 close 即丢弃的行组不会在文件中留下任何字节。

use std::io::Write;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::column_reader::ColumnReader;
use crate::column_writer::ColumnWriter;
use crate::common::{Result, RowMapError};
use crate::field_type::ColumnMeta;
use crate::meta::{ColumnChunkMetaData, FileMetaData, RowGroupMetaData};
use crate::properties::WriterProperties;

const MAGIC: &[u8; 8] = b"OLAPROW\0";
const VERSION: u32     = 1;
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 16;

// ── ColumnarFileWriter ────────────────────────────────────────────────────────

pub struct ColumnarFileWriter<W: Write> {
    sink:       W,
    pos:        u64,
    schema:     Vec<ColumnMeta>,
    page_rows:  usize,
    row_groups: Vec<RowGroupMetaData>,
    key_value:  Vec<(String, String)>,
    created_by: String,
}

impl<W: Write> ColumnarFileWriter<W> {
    /// 写出文件头；`schema` 中的压缩方式按原样使用
    pub fn new(mut sink: W, schema: Vec<ColumnMeta>, props: &WriterProperties) -> Result<Self> {
        if schema.is_empty() {
            return Err(RowMapError::SchemaMismatch("file schema has no columns".into()));
        }
        if let Some(col) = schema.iter().find(|c| !c.encoding.supports(c.physical)) {
            return Err(RowMapError::Encoding(format!(
                "column `{}`: {:?} cannot encode {:?}", col.name, col.encoding, col.physical
            )));
        }
        sink.write_all(MAGIC)?;
        sink.write_all(&VERSION.to_le_bytes())?;
        Ok(Self {
            sink,
            pos: HEADER_LEN as u64,
            schema,
            page_rows:  props.data_page_rows(),
            row_groups: Vec::new(),
            key_value:  props.key_value().to_vec(),
            created_by: props.created_by().to_owned(),
        })
    }

    pub fn schema(&self) -> &[ColumnMeta] { &self.schema }
    pub fn num_row_groups(&self) -> usize { self.row_groups.len() }

    /// 打开一个新行组；同一时刻只能有一个行组处于打开状态
    pub fn append_row_group(&mut self) -> RowGroupWriter<'_, W> {
        let columns = self.schema.iter()
            .map(|m| ColumnWriter::new(m.clone(), self.page_rows))
            .collect();
        RowGroupWriter { file: self, columns }
    }

    /// 写 Footer 并交还底层输出流
    pub fn finish(mut self) -> Result<W> {
        let footer = FileMetaData {
            version:    VERSION,
            created_by: std::mem::take(&mut self.created_by),
            schema:     std::mem::take(&mut self.schema),
            row_groups: std::mem::take(&mut self.row_groups),
            key_value:  std::mem::take(&mut self.key_value),
        };
        let footer_bytes = footer.serialize()?;
        let footer_crc   = crc32fast::hash(&footer_bytes);

        self.sink.write_all(&footer_bytes)?;
        self.sink.write_all(&footer_crc.to_le_bytes())?;
        self.sink.write_all(&(footer_bytes.len() as u32).to_le_bytes())?;
        self.sink.write_all(MAGIC)?;
        self.sink.flush()?;

        debug!(
            row_groups = footer.row_groups.len(),
            rows = footer.num_rows(),
            bytes = self.pos + footer_bytes.len() as u64 + TRAILER_LEN as u64,
            "columnar file finished"
        );
        Ok(self.sink)
    }
}

// ── RowGroupWriter ────────────────────────────────────────────────────────────

/// 打开中的行组：持有每列的写入器，close 时统一落盘
pub struct RowGroupWriter<'a, W: Write> {
    file:    &'a mut ColumnarFileWriter<W>,
    columns: Vec<ColumnWriter>,
}

impl<'a, W: Write> RowGroupWriter<'a, W> {
    pub fn num_columns(&self) -> usize { self.columns.len() }

    pub fn column(&mut self, idx: usize) -> Result<&mut ColumnWriter> {
        let n = self.columns.len();
        self.columns.get_mut(idx).ok_or_else(|| {
            RowMapError::SchemaMismatch(format!("column {idx} requested, row group has {n}"))
        })
    }

    /// 已完整写入的行数（取各列最小值）
    pub fn num_rows(&self) -> u64 {
        self.columns.iter().map(|c| c.num_rows()).min().unwrap_or(0)
    }

    /// 校验各列行数一致，写出全部列块并登记行组元数据
    pub fn close(self) -> Result<RowGroupMetaData> {
        let num_rows = self.columns.first().map(|c| c.num_rows()).unwrap_or(0);
        if let Some(bad) = self.columns.iter().find(|c| c.num_rows() != num_rows) {
            return Err(RowMapError::SchemaMismatch(format!(
                "column `{}` has {} rows, expected {num_rows}", bad.meta().name, bad.num_rows()
            )));
        }

        let start = self.file.pos;
        let mut chunks = Vec::with_capacity(self.columns.len());
        for cw in self.columns {
            let meta  = cw.meta().clone();
            let chunk = cw.finalize()?;
            self.file.sink.write_all(&chunk.data)?;
            chunks.push(ColumnChunkMetaData {
                column_id:   meta.column_id,
                compression: meta.compression,
                encoding:    meta.encoding,
                offset:      self.file.pos,
                size:        chunk.data.len() as u64,
                num_values:  chunk.num_values,
                null_count:  chunk.null_count,
                pages:       chunk.pages,
            });
            self.file.pos += chunk.data.len() as u64;
        }

        let rg = RowGroupMetaData {
            num_rows,
            total_byte_size: self.file.pos - start,
            columns:         chunks,
        };
        debug!(
            row_group = self.file.row_groups.len(),
            rows = rg.num_rows,
            bytes = rg.total_byte_size,
            "row group closed"
        );
        self.file.row_groups.push(rg.clone());
        Ok(rg)
    }

    /// 丢弃本行组已缓冲的全部列数据，文件中不留痕迹
    pub fn abort(self) {
        debug!(rows = self.num_rows(), "row group aborted");
    }
}

// ── ColumnarFileReader ────────────────────────────────────────────────────────

pub struct ColumnarFileReader {
    data:     Vec<u8>,
    metadata: FileMetaData,
}

impl ColumnarFileReader {
    /// 从内存字节解析文件
    pub fn open(data: Vec<u8>) -> Result<Self> {
        let n = data.len();
        if n < HEADER_LEN + TRAILER_LEN || &data[..8] != MAGIC || &data[n - 8..] != MAGIC {
            return Err(RowMapError::Encoding("invalid columnar file magic".into()));
        }
        let version = LittleEndian::read_u32(&data[8..12]);
        if version != VERSION {
            return Err(RowMapError::Encoding(format!("unsupported file version {version}")));
        }

        let footer_len = LittleEndian::read_u32(&data[n - 12..n - 8]) as usize;
        let footer_crc = LittleEndian::read_u32(&data[n - 16..n - 12]);
        let footer_start = (n - TRAILER_LEN).checked_sub(footer_len)
            .filter(|&s| s >= HEADER_LEN)
            .ok_or_else(|| RowMapError::Encoding("footer length exceeds file".into()))?;
        let footer_bytes = &data[footer_start..n - TRAILER_LEN];

        if crc32fast::hash(footer_bytes) != footer_crc {
            return Err(RowMapError::ChecksumMismatch);
        }
        let metadata = FileMetaData::deserialize(footer_bytes)?;

        for (i, rg) in metadata.row_groups.iter().enumerate() {
            if rg.columns.len() != metadata.schema.len() {
                return Err(RowMapError::Encoding(format!(
                    "row group {i} has {} column chunks, schema has {}",
                    rg.columns.len(), metadata.schema.len()
                )));
            }
            for cc in &rg.columns {
                let end = cc.offset.checked_add(cc.size);
                if cc.offset < HEADER_LEN as u64 || end.map_or(true, |e| e > footer_start as u64) {
                    return Err(RowMapError::Encoding(format!(
                        "row group {i}: column chunk {} outside data region", cc.column_id
                    )));
                }
            }
        }

        Ok(Self { data, metadata })
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(std::fs::read(path)?)
    }

    pub fn metadata(&self) -> &FileMetaData { &self.metadata }
    pub fn schema(&self) -> &[ColumnMeta] { &self.metadata.schema }
    pub fn num_row_groups(&self) -> usize { self.metadata.row_groups.len() }

    pub fn row_group(&self, index: usize) -> Result<RowGroupReader<'_>> {
        let meta = self.metadata.row_groups.get(index).ok_or(RowMapError::RowGroupOutOfRange {
            index,
            count: self.metadata.row_groups.len(),
        })?;
        Ok(RowGroupReader { file: self, meta, index })
    }
}

// ── RowGroupReader ────────────────────────────────────────────────────────────

pub struct RowGroupReader<'a> {
    file:  &'a ColumnarFileReader,
    meta:  &'a RowGroupMetaData,
    index: usize,
}

impl<'a> RowGroupReader<'a> {
    pub fn index(&self) -> usize { self.index }
    pub fn metadata(&self) -> &'a RowGroupMetaData { self.meta }
    pub fn num_rows(&self) -> u64 { self.meta.num_rows }
    pub fn num_columns(&self) -> usize { self.meta.columns.len() }
    pub fn schema(&self) -> &'a [ColumnMeta] { &self.file.metadata.schema }

    /// 打开指定列的读取器（每次调用都从该列第 0 行开始）
    pub fn column(&self, idx: usize) -> Result<ColumnReader<'a>> {
        let (meta, chunk) = self.file.metadata.schema.get(idx)
            .zip(self.meta.columns.get(idx))
            .ok_or_else(|| RowMapError::SchemaMismatch(format!(
                "column {idx} requested, row group has {}", self.meta.columns.len()
            )))?;
        // 范围已在 open 时校验
        let data = &self.file.data[chunk.offset as usize..(chunk.offset + chunk.size) as usize];
        Ok(ColumnReader::new(meta, chunk, data))
    }
}
