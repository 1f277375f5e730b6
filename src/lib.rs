//! # olap-rowmap
//!
//! 以"行"的方式读写 OLAP 列存文件：应用提供 / 取回普通记录（元组、结构体），
//! 引擎负责逐列类型映射、定点小数缩放、压缩选择与行组切分。
//!
//! ## 整体架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  RowWriter<R> / RowReader<R>            (row_file)           │
//! │        │  首次使用某个记录类型时经 ShapeCache 解析 + 编译        │
//! │        ▼                                                     │
//! │  ShapeCache ── RecordShape ── FieldDescriptor × N  (shape)   │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  WritePlan / ReadPlan：每字段一个转换步骤           (plan)    │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  RowGroupWriteSession / RowGroupReadSession   (transposer)   │
//! │        │  Created → Active → Closed                          │
//! │        ▼                                                     │
//! │  列存文件                                                    │
//! │   ┌──────────────────────────────────────────────────┐       │
//! │   │  ColumnarFileWriter / ColumnarFileReader (file)  │       │
//! │   │   └─ RowGroup × N                                │       │
//! │   │       └─ ColumnWriter / ColumnReader × 列数       │       │
//! │   │           ├─ encoding    (Plain/RLE/Delta/Dict)  │       │
//! │   │           ├─ compression (LZ4/None)              │       │
//! │   │           └─ OrdinalIndex (行号→页偏移)           │       │
//! │   └──────────────────────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 示例
//!
//! ```
//! use chrono::NaiveDate;
//! use olap_rowmap::{RowReader, RowWriter, WriterProperties};
//!
//! type Reading = (i32, f32, NaiveDate);
//!
//! let rows: Vec<Reading> = vec![
//!     (123, 3.14, NaiveDate::from_ymd_opt(1981, 6, 10).unwrap()),
//!     (456, 1.27, NaiveDate::from_ymd_opt(1987, 3, 16).unwrap()),
//! ];
//!
//! let mut writer = RowWriter::<Reading, _>::create(Vec::new(), WriterProperties::default())?;
//! writer.write_rows(rows.iter().copied())?;
//! let bytes = writer.into_inner()?;
//!
//! let reader = RowReader::<Reading>::open(bytes)?;
//! assert_eq!(reader.read_rows(0)?, rows);
//! # Ok::<(), olap_rowmap::RowMapError>(())
//! ```

pub mod common;

// ── 列存文件层 ────────────────────────────────────────────────────────────────
pub mod field_type;
pub mod encoding;
pub mod compression;
pub mod page;
pub mod index;
pub mod column_writer;
pub mod column_reader;
pub mod meta;
pub mod properties;
pub mod file;

// ── 行映射层 ──────────────────────────────────────────────────────────────────
pub mod record;
pub mod shape;
pub mod plan;
pub mod transposer;
pub mod row_file;

pub use common::{Ordinal, Result, RowIndex, RowMapError};
pub use field_type::{ColumnMeta, CompressionType, EncodingType, LogicalType, PhysicalType};
pub use file::{ColumnarFileReader, ColumnarFileWriter, RowGroupReader, RowGroupWriter};
pub use plan::{ReadPlan, WritePlan};
pub use properties::WriterProperties;
pub use record::{Cell, CellReader, DeclaredType, Field, Row};
pub use row_file::{RowReader, RowWriter};
pub use shape::{CompiledShape, FieldDescriptor, FieldKind, FieldSpec, RecordShape, ShapeCache};
pub use transposer::{
    read_row_group, write_row_group, RowGroupReadSession, RowGroupRows, RowGroupWriteSession,
    SessionState,
};
