//! 列存文件中列的物理 / 逻辑类型与运行时列值

/// 列在文件中的物理存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Boolean,
    Int32,
    Int64,
    /// 定点小数的未缩放整数（16 字节）
    Int128,
    Float,
    Double,
    /// 变长字节
    ByteArray,
}

impl PhysicalType {
    /// 固定字节宽度；变长类型返回 None
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Boolean   => Some(1),
            Self::Int32     => Some(4),
            Self::Int64     => Some(8),
            Self::Int128    => Some(16),
            Self::Float     => Some(4),
            Self::Double    => Some(8),
            Self::ByteArray => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Boolean   => 0,
            Self::Int32     => 1,
            Self::Int64     => 2,
            Self::Int128    => 3,
            Self::Float     => 4,
            Self::Double    => 5,
            Self::ByteArray => 6,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Boolean,
            1 => Self::Int32,
            2 => Self::Int64,
            3 => Self::Int128,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::ByteArray,
            _ => return None,
        })
    }
}

/// 物理类型之上的语义注解
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    None,
    /// 窄整数 / 无符号整数，按位宽存入 Int32 或 Int64
    Int { bits: u8, signed: bool },
    /// 自 1970-01-01 起的天数（Int32）
    Date,
    /// 自 Unix 纪元起的微秒数，UTC（Int64）
    Timestamp,
    /// 未缩放整数（Int128），value = raw / 10^scale
    Decimal { precision: u8, scale: u8 },
    /// UTF-8 字符串（ByteArray）
    Utf8,
}

/// 编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingType {
    Plain,
    RunLength,
    DeltaBinary,
    Dictionary,
}

impl EncodingType {
    /// 按物理类型选择默认编码：整数用 Delta，字节串用字典，布尔用 RLE，其余 Plain
    pub fn default_for(physical: PhysicalType) -> Self {
        match physical {
            PhysicalType::Int32 | PhysicalType::Int64 => Self::DeltaBinary,
            PhysicalType::ByteArray                   => Self::Dictionary,
            PhysicalType::Boolean                     => Self::RunLength,
            _                                         => Self::Plain,
        }
    }

    /// 该编码能否用于给定物理类型
    pub fn supports(self, physical: PhysicalType) -> bool {
        match self {
            Self::Plain       => true,
            Self::RunLength   => physical == PhysicalType::Boolean,
            Self::DeltaBinary => physical.is_integer(),
            Self::Dictionary  => physical == PhysicalType::ByteArray,
        }
    }
}

/// 压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    None,
    Lz4,
}

/// 每列的元数据（写入 Footer）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub column_id:   u32,
    pub name:        String,
    pub physical:    PhysicalType,
    pub logical:     LogicalType,
    pub nullable:    bool,
    pub encoding:    EncodingType,
    pub compression: CompressionType,
}

impl ColumnMeta {
    pub fn new(column_id: u32, name: &str, physical: PhysicalType) -> Self {
        Self {
            column_id, name: name.into(), physical,
            logical: LogicalType::None,
            nullable: false,
            encoding: EncodingType::default_for(physical),
            compression: CompressionType::Lz4,
        }
    }

    pub fn with_logical(mut self, logical: LogicalType) -> Self {
        self.logical = logical; self
    }
    pub fn with_encoding(mut self, enc: EncodingType) -> Self {
        self.encoding = enc; self
    }
    pub fn with_compression(mut self, comp: CompressionType) -> Self {
        self.compression = comp; self
    }
    pub fn nullable(mut self) -> Self {
        self.nullable = true; self
    }

    /// 两列的值形态是否一致（名称、可空性、编码与压缩方式不参与比较）
    pub fn same_storage(&self, other: &ColumnMeta) -> bool {
        self.physical == other.physical && self.logical == other.logical
    }
}

/// 列值（运行时表示，与物理类型一一对应）
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
}

impl ColumnValue {
    /// 值对应的物理类型；Null 返回 None
    pub fn physical_type(&self) -> Option<PhysicalType> {
        Some(match self {
            Self::Null       => return None,
            Self::Boolean(_) => PhysicalType::Boolean,
            Self::Int32(_)   => PhysicalType::Int32,
            Self::Int64(_)   => PhysicalType::Int64,
            Self::Int128(_)  => PhysicalType::Int128,
            Self::Float(_)   => PhysicalType::Float,
            Self::Double(_)  => PhysicalType::Double,
            Self::Bytes(_)   => PhysicalType::ByteArray,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoding_follows_physical_type() {
        assert_eq!(ColumnMeta::new(0, "a", PhysicalType::Int64).encoding, EncodingType::DeltaBinary);
        assert_eq!(ColumnMeta::new(1, "b", PhysicalType::ByteArray).encoding, EncodingType::Dictionary);
        assert_eq!(ColumnMeta::new(2, "c", PhysicalType::Boolean).encoding, EncodingType::RunLength);
        assert_eq!(ColumnMeta::new(3, "d", PhysicalType::Double).encoding, EncodingType::Plain);
        assert_eq!(ColumnMeta::new(4, "e", PhysicalType::Int128).encoding, EncodingType::Plain);
    }

    #[test]
    fn physical_tags_are_stable() {
        for ty in [
            PhysicalType::Boolean, PhysicalType::Int32, PhysicalType::Int64, PhysicalType::Int128,
            PhysicalType::Float, PhysicalType::Double, PhysicalType::ByteArray,
        ] {
            assert_eq!(PhysicalType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(PhysicalType::from_tag(99), None);
    }
}
