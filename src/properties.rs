//! 写入配置

use crate::common::{Result, RowMapError};
use crate::column_writer::MAX_CHUNK_ROWS;
use crate::field_type::{ColumnMeta, CompressionType, EncodingType};
use crate::page::PAGE_MAX_ROWS;

/// 每个行组默认缓冲的行数
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1024;

/// 行写入器 / 列存文件写入器的配置
#[derive(Debug, Clone)]
pub struct WriterProperties {
    compression:        CompressionType,
    /// 按列名覆盖压缩方式
    column_compression: Vec<(String, CompressionType)>,
    /// 按列名覆盖编码方式（默认由物理类型决定）
    column_encoding:    Vec<(String, EncodingType)>,
    row_group_size:     usize,
    data_page_rows:     usize,
    column_names:       Option<Vec<String>>,
    key_value:          Vec<(String, String)>,
    created_by:         String,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            compression:        CompressionType::Lz4,
            column_compression: Vec::new(),
            column_encoding:    Vec::new(),
            row_group_size:     DEFAULT_ROW_GROUP_SIZE,
            data_page_rows:     PAGE_MAX_ROWS,
            column_names:       None,
            key_value:          Vec::new(),
            created_by:         concat!("olap-rowmap ", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl WriterProperties {
    pub fn with_compression(mut self, comp: CompressionType) -> Self {
        self.compression = comp; self
    }
    pub fn with_column_compression(mut self, column: &str, comp: CompressionType) -> Self {
        self.column_compression.retain(|(name, _)| name != column);
        self.column_compression.push((column.into(), comp));
        self
    }
    /// 按列名指定编码；与物理类型不兼容时在创建文件时报错
    pub fn with_column_encoding(mut self, column: &str, enc: EncodingType) -> Self {
        self.column_encoding.retain(|(name, _)| name != column);
        self.column_encoding.push((column.into(), enc));
        self
    }
    /// 取值范围 1..=MAX_CHUNK_ROWS
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows.clamp(1, MAX_CHUNK_ROWS as usize); self
    }
    pub fn with_data_page_rows(mut self, rows: usize) -> Self {
        self.data_page_rows = rows.max(1); self
    }
    /// 覆盖字段推导出的列名（个数须与字段数一致）
    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
    pub fn with_key_value(mut self, key: &str, value: &str) -> Self {
        self.key_value.push((key.into(), value.into())); self
    }
    pub fn with_created_by(mut self, created_by: &str) -> Self {
        self.created_by = created_by.into(); self
    }

    pub fn compression(&self)    -> CompressionType     { self.compression }
    pub fn row_group_size(&self) -> usize               { self.row_group_size }
    pub fn data_page_rows(&self) -> usize               { self.data_page_rows }
    pub fn key_value(&self)      -> &[(String, String)] { &self.key_value }
    pub fn created_by(&self)     -> &str                { &self.created_by }

    /// 列最终使用的压缩方式
    pub fn compression_for(&self, column: &str) -> CompressionType {
        self.column_compression.iter()
            .find(|(name, _)| name == column)
            .map(|(_, c)| *c)
            .unwrap_or(self.compression)
    }

    /// 列的编码覆盖；None 表示沿用物理类型的默认编码
    pub fn encoding_for(&self, column: &str) -> Option<EncodingType> {
        self.column_encoding.iter()
            .find(|(name, _)| name == column)
            .map(|(_, e)| *e)
    }

    /// 将列名覆盖与压缩配置套用到字段推导出的 schema 上
    pub fn apply(&self, mut schema: Vec<ColumnMeta>) -> Result<Vec<ColumnMeta>> {
        if let Some(names) = &self.column_names {
            if names.len() != schema.len() {
                return Err(RowMapError::SchemaMismatch(format!(
                    "{} column names given for {} fields", names.len(), schema.len()
                )));
            }
            for (col, name) in schema.iter_mut().zip(names) {
                col.name = name.clone();
            }
        }
        Ok(schema.into_iter()
            .map(|col| {
                let comp = self.compression_for(&col.name);
                let col = col.with_compression(comp);
                match self.encoding_for(&col.name) {
                    Some(enc) => col.with_encoding(enc),
                    None      => col,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::PhysicalType;

    fn schema() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new(0, "Item1", PhysicalType::Int32),
            ColumnMeta::new(1, "Item2", PhysicalType::Float),
        ]
    }

    #[test]
    fn column_override_wins_over_default() {
        let props = WriterProperties::default()
            .with_compression(CompressionType::None)
            .with_column_compression("Item2", CompressionType::Lz4);
        let cols = props.apply(schema()).unwrap();
        assert_eq!(cols[0].compression, CompressionType::None);
        assert_eq!(cols[1].compression, CompressionType::Lz4);
    }

    #[test]
    fn renamed_columns_pick_up_overrides() {
        let props = WriterProperties::default()
            .with_column_names(["id", "price"])
            .with_column_compression("price", CompressionType::None);
        let cols = props.apply(schema()).unwrap();
        assert_eq!(cols[0].name, "id");
        assert_eq!(cols[1].compression, CompressionType::None);
    }

    #[test]
    fn encoding_override_by_column_name() {
        let props = WriterProperties::default().with_column_encoding("Item1", EncodingType::Plain);
        let cols = props.apply(schema()).unwrap();
        assert_eq!(cols[0].encoding, EncodingType::Plain);
        assert_eq!(cols[1].encoding, EncodingType::Plain);
        assert_eq!(props.encoding_for("Item2"), None);
    }

    #[test]
    fn row_group_size_is_clamped() {
        assert_eq!(WriterProperties::default().with_row_group_size(0).row_group_size(), 1);
        assert_eq!(
            WriterProperties::default().with_row_group_size(usize::MAX).row_group_size(),
            MAX_CHUNK_ROWS as usize
        );
    }

    #[test]
    fn wrong_name_count_is_a_schema_mismatch() {
        let props = WriterProperties::default().with_column_names(["only"]);
        assert!(matches!(props.apply(schema()), Err(RowMapError::SchemaMismatch(_))));
    }
}
