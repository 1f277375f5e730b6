//! 全局基础类型与错误定义

use thiserror::Error;

// ── 别名 ──────────────────────────────────────────────────────────────────────

/// 字段在记录中的序号（从 0 开始，与列序号一致）
pub type Ordinal  = usize;
/// 行组内的行号
pub type RowIndex = u64;

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RowMapError {
    // ── Shape 解析 / Plan 编译期 ─────────────────────────────────────────────
    #[error("unsupported field type: field `{field}` declared as {declared}")]
    UnsupportedFieldType { field: String, declared: String },
    #[error("decimal field `{field}` has no scale annotation")]
    MissingDecimalScale { field: String },
    #[error("decimal field `{field}` scale {scale} outside 0..={max}")]
    DecimalScaleOutOfRange { field: String, scale: i32, max: u32 },

    // ── 行组打开期 ───────────────────────────────────────────────────────────
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("row group {index} out of range (file has {count})")]
    RowGroupOutOfRange { index: usize, count: usize },

    // ── 行级读写 ─────────────────────────────────────────────────────────────
    #[error("write failed for field #{ordinal} (column `{column}`)")]
    FieldWriteFailed {
        ordinal: Ordinal,
        column:  String,
        #[source]
        source:  Box<RowMapError>,
    },
    #[error("read failed for field #{ordinal} (column `{column}`) at row {row}")]
    FieldReadFailed {
        ordinal: Ordinal,
        column:  String,
        row:     RowIndex,
        #[source]
        source:  Box<RowMapError>,
    },
    #[error("unexpected null for non-nullable field `{field}` at row {row}")]
    UnexpectedNull { field: String, row: RowIndex },
    #[error("session already closed")]
    SessionClosed,
    #[error("decimal rescale: {0}")]
    DecimalRescale(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("column `{column}` expects {expected}, got {actual}")]
    ColumnTypeMismatch { column: String, expected: String, actual: String },

    // ── 列存文件层 ───────────────────────────────────────────────────────────
    #[error("file I/O error: {0}")]
    FileIo(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

pub type Result<T> = std::result::Result<T, RowMapError>;
