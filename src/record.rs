//! 记录侧的值与类型声明
//!
//! - [`Field`] — 单个字段类型如何声明自己、如何与 [`Cell`] 互转
//! - [`Row`]   — 一条记录的字段布局，及逐字段拆解 / 组装
//!
//! 元组（1..=12 元）自动实现 `Row`，列名为 `Item1..ItemN`；
//! 普通结构体通过 [`impl_row!`](crate::impl_row) 实现，列名取字段名。

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::common::{Ordinal, Result, RowIndex, RowMapError};
use crate::shape::{FieldSpec, RecordShape};

// ── 声明类型 ──────────────────────────────────────────────────────────────────

/// 字段在 Rust 侧声明的类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Bool,
    Int8, Int16, Int32, Int64,
    UInt8, UInt16, UInt32, UInt64,
    Float32, Float64,
    Date,
    Timestamp,
    Decimal,
    Bytes,
    String,
    /// 可空包装（`Option<T>`）
    Optional(Box<DeclaredType>),
    /// 重复值；列存层不支持，解析时报错
    List(Box<DeclaredType>),
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool        => f.write_str("bool"),
            Self::Int8        => f.write_str("i8"),
            Self::Int16       => f.write_str("i16"),
            Self::Int32       => f.write_str("i32"),
            Self::Int64       => f.write_str("i64"),
            Self::UInt8       => f.write_str("u8"),
            Self::UInt16      => f.write_str("u16"),
            Self::UInt32      => f.write_str("u32"),
            Self::UInt64      => f.write_str("u64"),
            Self::Float32     => f.write_str("f32"),
            Self::Float64     => f.write_str("f64"),
            Self::Date        => f.write_str("NaiveDate"),
            Self::Timestamp   => f.write_str("NaiveDateTime"),
            Self::Decimal     => f.write_str("Decimal"),
            Self::Bytes       => f.write_str("Vec<u8>"),
            Self::String      => f.write_str("String"),
            Self::Optional(t) => write!(f, "Option<{t}>"),
            Self::List(t)     => write!(f, "Vec<{t}>"),
        }
    }
}

// ── Cell ──────────────────────────────────────────────────────────────────────

/// 记录侧的单个字段值
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Boolean(bool),
    /// 所有有符号整数
    Int(i64),
    /// 所有无符号整数
    UInt(u64),
    Float(f32),
    Double(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    Utf8(String),
}

// ── Field ─────────────────────────────────────────────────────────────────────

/// 可以作为记录字段的类型
pub trait Field: Sized {
    fn declared_type() -> DeclaredType;
    fn to_cell(&self) -> Cell;
    fn from_cell(cell: Cell) -> Result<Self>;
}

fn unexpected(cell: &Cell, target: &str) -> RowMapError {
    RowMapError::InvalidValue(format!("cannot read {cell:?} as {target}"))
}

macro_rules! impl_int_field {
    ($($t:ty => $decl:ident, $variant:ident, $wide:ty);+ $(;)?) => {$(
        impl Field for $t {
            fn declared_type() -> DeclaredType { DeclaredType::$decl }

            fn to_cell(&self) -> Cell { Cell::$variant(*self as $wide) }

            fn from_cell(cell: Cell) -> Result<Self> {
                match cell {
                    Cell::$variant(v) => <$t>::try_from(v).map_err(|_| {
                        RowMapError::InvalidValue(format!(
                            "{v} out of range for {}", stringify!($t)
                        ))
                    }),
                    other => Err(unexpected(&other, stringify!($t))),
                }
            }
        }
    )+};
}

impl_int_field! {
    i8  => Int8,   Int,  i64;
    i16 => Int16,  Int,  i64;
    i32 => Int32,  Int,  i64;
    i64 => Int64,  Int,  i64;
    u8  => UInt8,  UInt, u64;
    u16 => UInt16, UInt, u64;
    u32 => UInt32, UInt, u64;
    u64 => UInt64, UInt, u64;
}

macro_rules! impl_plain_field {
    ($($t:ty => $decl:ident, $variant:ident);+ $(;)?) => {$(
        impl Field for $t {
            fn declared_type() -> DeclaredType { DeclaredType::$decl }

            fn to_cell(&self) -> Cell { Cell::$variant(self.clone()) }

            fn from_cell(cell: Cell) -> Result<Self> {
                match cell {
                    Cell::$variant(v) => Ok(v),
                    other => Err(unexpected(&other, stringify!($t))),
                }
            }
        }
    )+};
}

impl_plain_field! {
    bool          => Bool,      Boolean;
    f32           => Float32,   Float;
    f64           => Float64,   Double;
    NaiveDate     => Date,      Date;
    NaiveDateTime => Timestamp, Timestamp;
    Decimal       => Decimal,   Decimal;
    Vec<u8>       => Bytes,     Bytes;
    String        => String,    Utf8;
}

impl<T: Field> Field for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Optional(Box::new(T::declared_type()))
    }

    fn to_cell(&self) -> Cell {
        match self {
            Some(v) => v.to_cell(),
            None    => Cell::Null,
        }
    }

    fn from_cell(cell: Cell) -> Result<Self> {
        match cell {
            Cell::Null => Ok(None),
            other      => T::from_cell(other).map(Some),
        }
    }
}

// ── Row ───────────────────────────────────────────────────────────────────────

/// 一条记录：固定的字段布局 + 字段值的拆解 / 组装
///
/// `to_cells` 与 `from_cells` 必须按 `layout` 的顺序逐字段处理。
pub trait Row: Sized + 'static {
    fn layout() -> Vec<FieldSpec>;
    fn to_cells(&self, out: &mut Vec<Cell>);
    fn from_cells(cells: &mut CellReader<'_>) -> Result<Self>;
}

/// 按字段顺序消费一行的 Cell，并把转换失败标注到具体字段
pub struct CellReader<'a> {
    cells:   std::vec::Drain<'a, Cell>,
    shape:   &'a RecordShape,
    row:     RowIndex,
    ordinal: Ordinal,
}

impl<'a> CellReader<'a> {
    pub(crate) fn new(cells: &'a mut Vec<Cell>, shape: &'a RecordShape, row: RowIndex) -> Self {
        Self { cells: cells.drain(..), shape, row, ordinal: 0 }
    }

    /// 取下一个字段
    #[allow(clippy::should_implement_trait)]
    pub fn next<T: Field>(&mut self) -> Result<T> {
        let ordinal = self.ordinal;
        let cell = self.cells.next().ok_or_else(|| RowMapError::SchemaMismatch(format!(
            "record asks for field #{ordinal}, shape has {}", self.shape.len()
        )))?;
        self.ordinal += 1;
        T::from_cell(cell).map_err(|source| RowMapError::FieldReadFailed {
            ordinal,
            column: self.shape.field(ordinal).map(|f| f.name.clone()).unwrap_or_default(),
            row:    self.row,
            source: Box::new(source),
        })
    }

    pub fn remaining(&self) -> usize { self.cells.len() }
}

macro_rules! impl_row_for_tuple {
    ($($t:ident . $idx:tt => $name:literal),+) => {
        impl<$($t: Field + 'static),+> Row for ($($t,)+) {
            fn layout() -> Vec<FieldSpec> {
                vec![$(FieldSpec::new($name, <$t as Field>::declared_type())),+]
            }

            fn to_cells(&self, out: &mut Vec<Cell>) {
                $(out.push(self.$idx.to_cell());)+
            }

            fn from_cells(cells: &mut CellReader<'_>) -> Result<Self> {
                Ok(($(cells.next::<$t>()?,)+))
            }
        }
    };
}

impl_row_for_tuple!(A.0 => "Item1");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7", H.7 => "Item8");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7", H.7 => "Item8",
                    I.8 => "Item9");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7", H.7 => "Item8",
                    I.8 => "Item9", J.9 => "Item10");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7", H.7 => "Item8",
                    I.8 => "Item9", J.9 => "Item10", K.10 => "Item11");
impl_row_for_tuple!(A.0 => "Item1", B.1 => "Item2", C.2 => "Item3", D.3 => "Item4",
                    E.4 => "Item5", F.5 => "Item6", G.6 => "Item7", H.7 => "Item8",
                    I.8 => "Item9", J.9 => "Item10", K.10 => "Item11", L.11 => "Item12");

/// 为普通结构体实现 [`Row`]：字段按列出的顺序映射到列，列名取字段名。
///
/// 定点小数字段必须写出 scale：
///
/// ```ignore
/// struct Trade { id: i32, price: f32, when: NaiveDateTime, amount: Decimal }
/// impl_row!(Trade { id, price, when, amount: decimal(3) });
/// ```
///
/// 结构体的每个字段都必须列出（组装时使用结构体字面量）。
#[macro_export]
macro_rules! impl_row {
    ($ty:ident { $($field:ident $(: decimal($scale:expr))?),+ $(,)? }) => {
        impl $crate::Row for $ty {
            fn layout() -> ::std::vec::Vec<$crate::FieldSpec> {
                ::std::vec![$(
                    $crate::FieldSpec::of(stringify!($field), |r: &$ty| &r.$field)
                        $(.with_decimal_scale($scale))?
                ),+]
            }

            fn to_cells(&self, out: &mut ::std::vec::Vec<$crate::Cell>) {
                $(out.push($crate::Field::to_cell(&self.$field));)+
            }

            fn from_cells(cells: &mut $crate::CellReader<'_>) -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    $($field: cells.next()?,)+
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_wraps_declared_type() {
        assert_eq!(
            <Option<i16>>::declared_type(),
            DeclaredType::Optional(Box::new(DeclaredType::Int16))
        );
        assert_eq!(<Option<Option<u8>>>::declared_type().to_string(), "Option<Option<u8>>");
    }

    #[test]
    fn narrow_ints_reject_out_of_range_cells() {
        assert_eq!(i8::from_cell(Cell::Int(-128)).unwrap(), -128);
        assert!(matches!(i8::from_cell(Cell::Int(300)), Err(RowMapError::InvalidValue(_))));
        assert!(matches!(u16::from_cell(Cell::Int(1)), Err(RowMapError::InvalidValue(_))));
    }

    #[test]
    fn optional_maps_null() {
        assert_eq!(<Option<String>>::from_cell(Cell::Null).unwrap(), None);
        assert_eq!(Some(3u32).to_cell(), Cell::UInt(3));
        assert_eq!(None::<f64>.to_cell(), Cell::Null);
    }

    #[test]
    fn tuple_layout_is_positional() {
        let layout = <(i32, f32, NaiveDate)>::layout();
        let names: Vec<&str> = layout.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Item1", "Item2", "Item3"]);
        assert_eq!(layout[2].declared, DeclaredType::Date);

        let mut cells = Vec::new();
        (7i32, 1.5f32, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).to_cells(&mut cells);
        assert_eq!(cells[0], Cell::Int(7));
        assert_eq!(cells[1], Cell::Float(1.5));
    }
}
