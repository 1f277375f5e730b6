//! 面向行的文件读写入口
//!
//! `RowWriter` 缓冲记录，满 `row_group_size` 行即写成一个行组；
//! `RowReader` 打开文件时校验记录形状与文件 schema，之后按行组读取。
//! 两者默认使用进程级 [`ShapeCache::global`]，也可传入独立的缓存。

use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::common::{Result, RowMapError};
use crate::field_type::ColumnMeta;
use crate::file::{ColumnarFileReader, ColumnarFileWriter};
use crate::meta::FileMetaData;
use crate::properties::WriterProperties;
use crate::record::Row;
use crate::shape::{CompiledShape, ShapeCache};
use crate::transposer::{read_row_group, write_row_group, RowGroupRows};

// ── RowWriter ─────────────────────────────────────────────────────────────────

pub struct RowWriter<R: Row, W: Write> {
    plans:          Arc<CompiledShape>,
    file:           Option<ColumnarFileWriter<W>>,
    /// close 之后交还的输出流
    sink:           Option<W>,
    buffer:         Vec<R>,
    row_group_size: usize,
    rows_written:   u64,
}

impl<R: Row, W: Write> RowWriter<R, W> {
    pub fn create(sink: W, props: WriterProperties) -> Result<Self> {
        Self::with_cache(ShapeCache::global(), sink, props)
    }

    pub fn with_cache(cache: &ShapeCache, sink: W, props: WriterProperties) -> Result<Self> {
        let plans  = cache.plans::<R>()?;
        let schema = props.apply(plans.write.columns().to_vec())?;
        let file   = ColumnarFileWriter::new(sink, schema, &props)?;
        Ok(Self {
            plans,
            file:           Some(file),
            sink:           None,
            buffer:         Vec::with_capacity(props.row_group_size()),
            row_group_size: props.row_group_size(),
            rows_written:   0,
        })
    }

    pub fn schema(&self) -> Option<&[ColumnMeta]> {
        self.file.as_ref().map(|f| f.schema())
    }

    /// 已落盘的行数（不含缓冲中的行）
    pub fn rows_written(&self) -> u64 { self.rows_written }

    pub fn num_row_groups(&self) -> usize {
        self.file.as_ref().map_or(0, |f| f.num_row_groups())
    }

    pub fn write_row(&mut self, row: R) -> Result<()> {
        if self.file.is_none() {
            return Err(RowMapError::SessionClosed);
        }
        self.buffer.push(row);
        if self.buffer.len() >= self.row_group_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn write_rows<I: IntoIterator<Item = R>>(&mut self, rows: I) -> Result<()> {
        rows.into_iter().try_for_each(|row| self.write_row(row))
    }

    /// 把缓冲中的行写成一个行组（缓冲为空时不产生行组）
    pub fn start_new_row_group(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Err(RowMapError::SessionClosed);
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(RowMapError::SessionClosed)?;
        let rg = write_row_group::<R, _, _>(&self.plans.write, self.buffer.drain(..), file)?;
        self.rows_written += rg.num_rows;
        Ok(())
    }

    /// 写出剩余行与 Footer；重复调用为空操作
    ///
    /// 最后一个行组写入失败时仍写出 Footer，文件保留此前的行组。
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        let Some(file) = self.file.take() else {
            return flushed;
        };
        self.buffer.clear();
        self.sink = Some(file.finish()?);
        debug!(rows = self.rows_written, "row writer closed");
        flushed
    }

    /// 关闭并交还底层输出流
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        self.sink.take().ok_or(RowMapError::SessionClosed)
    }
}

impl<R: Row, W: Write> Drop for RowWriter<R, W> {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "row writer close on drop failed");
            }
        }
    }
}

// ── RowReader ─────────────────────────────────────────────────────────────────

pub struct RowReader<R: Row> {
    plans:   Arc<CompiledShape>,
    file:    ColumnarFileReader,
    _record: PhantomData<fn() -> R>,
}

impl<R: Row> RowReader<R> {
    pub fn open(data: Vec<u8>) -> Result<Self> {
        Self::with_cache(ShapeCache::global(), data)
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(std::fs::read(path)?)
    }

    /// 解析文件并校验 `R` 与文件 schema 逐列一致
    pub fn with_cache(cache: &ShapeCache, data: Vec<u8>) -> Result<Self> {
        let file  = ColumnarFileReader::open(data)?;
        let plans = cache.plans::<R>()?;
        plans.read.check_schema(file.schema())?;
        Ok(Self { plans, file, _record: PhantomData })
    }

    pub fn metadata(&self) -> &FileMetaData { self.file.metadata() }
    pub fn schema(&self) -> &[ColumnMeta] { self.file.schema() }
    pub fn num_row_groups(&self) -> usize { self.file.num_row_groups() }

    /// 按需读取一个行组
    pub fn rows(&self, row_group: usize) -> Result<RowGroupRows<'_, R>> {
        let group = self.file.row_group(row_group)?;
        read_row_group(&self.plans.read, &group)
    }

    /// 读取一个行组的全部记录
    pub fn read_rows(&self, row_group: usize) -> Result<Vec<R>> {
        self.rows(row_group)?.collect()
    }
}
