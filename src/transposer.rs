//! 行组转置：按行驱动编译好的计划
//!
//! 写会话与读会话共用同一个状态机：
//! ```text
//!   Created ──write/read_next──► Active ──close / 出错──► Closed
//!      └───────────────────close────────────────────────────┘
//! ```
//! `Closed` 之后再次 close 是空操作；其它调用返回 `SessionClosed`。
//! 资源（写会话的打开行组、读会话的列读取器）只释放一次。
//!
//! 会话按记录类型 `R` 参数化，打开时先校验 `R` 的布局与计划的形状一致。

use std::borrow::Borrow;
use std::io::Write;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::column_reader::ColumnReader;
use crate::common::{Result, RowIndex, RowMapError};
use crate::file::{ColumnarFileWriter, RowGroupReader, RowGroupWriter};
use crate::meta::RowGroupMetaData;
use crate::plan::{ReadPlan, WritePlan};
use crate::record::{Cell, CellReader, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Closed,
}

// ── 写会话 ────────────────────────────────────────────────────────────────────

/// 一个打开中的行组写入
///
/// 任何字段写入失败都会丢弃整个行组，会话随即进入 `Closed`。
pub struct RowGroupWriteSession<'a, R: Row, W: Write> {
    plan:    &'a WritePlan,
    group:   Option<RowGroupWriter<'a, W>>,
    state:   SessionState,
    rows:    u64,
    scratch: Vec<Cell>,
    _record: PhantomData<fn(&R)>,
}

impl<'a, R: Row, W: Write> RowGroupWriteSession<'a, R, W> {
    /// 校验记录布局、文件 schema 与计划一致，并在文件上打开一个新行组
    pub fn open(plan: &'a WritePlan, file: &'a mut ColumnarFileWriter<W>) -> Result<Self> {
        plan.shape().check_layout(&R::layout())?;
        plan.check_schema(file.schema())?;
        let row_group = file.num_row_groups();
        let group = file.append_row_group();
        debug!(row_group, columns = plan.len(), "row group write session opened");
        Ok(Self {
            plan,
            group:   Some(group),
            state:   SessionState::Created,
            rows:    0,
            scratch: Vec::with_capacity(plan.len()),
            _record: PhantomData,
        })
    }

    pub fn state(&self) -> SessionState { self.state }
    pub fn rows_written(&self) -> u64 { self.rows }

    /// 写入一条记录：每列恰好追加一个值
    pub fn write(&mut self, record: &R) -> Result<()> {
        let group = self.group.as_mut().ok_or(RowMapError::SessionClosed)?;
        self.state = SessionState::Active;

        self.scratch.clear();
        record.to_cells(&mut self.scratch);
        if let Err(e) = self.plan.write_row(&mut self.scratch, group) {
            self.scratch.clear();
            self.discard();
            return Err(e);
        }
        self.rows += 1;
        Ok(())
    }

    /// 落盘本行组；已关闭时返回 `Ok(None)`
    pub fn close(&mut self) -> Result<Option<RowGroupMetaData>> {
        let Some(group) = self.group.take() else {
            return Ok(None);
        };
        self.state = SessionState::Closed;
        group.close().map(Some)
    }

    fn discard(&mut self) {
        if let Some(group) = self.group.take() {
            group.abort();
        }
        self.state = SessionState::Closed;
    }
}

impl<R: Row, W: Write> Drop for RowGroupWriteSession<'_, R, W> {
    fn drop(&mut self) {
        if self.group.is_some() {
            warn!(rows = self.rows, "row group write session dropped before close, row group discarded");
            self.discard();
        }
    }
}

/// 把 `records` 全部写成一个行组
///
/// 任一记录失败则整个行组被丢弃，错误原样返回。
pub fn write_row_group<R, I, W>(
    plan:    &WritePlan,
    records: I,
    file:    &mut ColumnarFileWriter<W>,
) -> Result<RowGroupMetaData>
where
    R: Row,
    I: IntoIterator,
    I::Item: Borrow<R>,
    W: Write,
{
    let mut session = RowGroupWriteSession::<R, W>::open(plan, file)?;
    for record in records {
        session.write(record.borrow())?;
    }
    session.close()?.ok_or(RowMapError::SessionClosed)
}

// ── 读会话 ────────────────────────────────────────────────────────────────────

/// 一个打开中的行组读取：每列一个读取器，按行同步推进
pub struct RowGroupReadSession<'a, R: Row> {
    plan:     &'a ReadPlan,
    columns:  Vec<ColumnReader<'a>>,
    state:    SessionState,
    row:      RowIndex,
    num_rows: u64,
    scratch:  Vec<Cell>,
    _record:  PhantomData<fn() -> R>,
}

impl<'a, R: Row> RowGroupReadSession<'a, R> {
    /// 校验记录布局、列数与逐列类型，按列序打开读取器
    pub fn open(plan: &'a ReadPlan, group: &RowGroupReader<'a>) -> Result<Self> {
        plan.shape().check_layout(&R::layout())?;
        plan.check_schema(group.schema())?;
        let columns = (0..group.num_columns())
            .map(|i| group.column(i))
            .collect::<Result<Vec<_>>>()?;
        debug!(row_group = group.index(), rows = group.num_rows(), "row group read session opened");
        Ok(Self {
            plan,
            columns,
            state:    SessionState::Created,
            row:      0,
            num_rows: group.num_rows(),
            scratch:  Vec::with_capacity(plan.len()),
            _record:  PhantomData,
        })
    }

    pub fn state(&self) -> SessionState { self.state }
    pub fn num_rows(&self) -> u64 { self.num_rows }
    /// 下一条要读的行号
    pub fn position(&self) -> RowIndex { self.row }

    /// 组装下一条记录；行组读尽返回 `Ok(None)`
    ///
    /// 出错即关闭会话，之后的调用返回 `SessionClosed`。
    pub fn read_next(&mut self) -> Result<Option<R>> {
        if self.state == SessionState::Closed {
            return Err(RowMapError::SessionClosed);
        }
        if self.row >= self.num_rows {
            return Ok(None);
        }
        self.state = SessionState::Active;

        match self.materialize() {
            Ok(record) => {
                self.row += 1;
                Ok(Some(record))
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn materialize(&mut self) -> Result<R> {
        let row = self.row;
        self.scratch.clear();
        self.plan.read_row(&mut self.columns, row, &mut self.scratch)?;

        let mut cells = CellReader::new(&mut self.scratch, self.plan.shape(), row);
        let record = R::from_cells(&mut cells)?;
        match cells.remaining() {
            0 => Ok(record),
            n => Err(RowMapError::SchemaMismatch(format!(
                "record left {n} of {} fields unread", self.plan.len()
            ))),
        }
    }

    /// 释放列读取器；已关闭时为空操作
    pub fn close(&mut self) -> Result<()> {
        if self.state != SessionState::Closed {
            self.release();
        }
        Ok(())
    }

    fn release(&mut self) {
        // 与打开顺序相反
        while let Some(column) = self.columns.pop() {
            drop(column);
        }
        self.scratch.clear();
        self.state = SessionState::Closed;
        debug!(rows_read = self.row, "row group read session closed");
    }
}

/// 行组中记录的惰性序列；出错后不再产出
pub struct RowGroupRows<'a, R: Row> {
    session: RowGroupReadSession<'a, R>,
}

impl<'a, R: Row> RowGroupRows<'a, R> {
    pub fn session(&self) -> &RowGroupReadSession<'a, R> { &self.session }
}

impl<R: Row> Iterator for RowGroupRows<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.session.state() == SessionState::Closed {
            return None;
        }
        match self.session.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                // close 对读会话不会失败
                let _ = self.session.close();
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.session.state() == SessionState::Closed {
            return (0, Some(0));
        }
        let left = (self.session.num_rows() - self.session.position()) as usize;
        (0, Some(left))
    }
}

impl<R: Row> FusedIterator for RowGroupRows<'_, R> {}

/// 打开行组，返回按需组装的记录序列
pub fn read_row_group<'a, R: Row>(
    plan:  &'a ReadPlan,
    group: &RowGroupReader<'a>,
) -> Result<RowGroupRows<'a, R>> {
    Ok(RowGroupRows { session: RowGroupReadSession::open(plan, group)? })
}
