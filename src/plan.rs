//! 读写计划
//!
//! 每个形状编译一次：每个字段生成一个写步骤和一个读步骤，执行时只按
//! 步骤的封闭枚举分派，不再检查字段声明。
//!
//! | 字段类别  | 写入                        | 读出                       |
//! |-----------|-----------------------------|----------------------------|
//! | 整数      | 按位宽收窄到 Int32 / Int64  | 扩回 i64 / u64             |
//! | Date      | 距 1970-01-01 的天数        | 天数 → NaiveDate           |
//! | Timestamp | 距 Unix 纪元的微秒（UTC）   | 微秒 → NaiveDateTime       |
//! | Decimal   | 尾数按列 scale 精确重标定   | 以列 scale 还原            |
//! | Utf8      | UTF-8 字节                  | 校验后还原 String          |
//! | 其余      | 原样复制                    | 原样复制                   |
//!
//! 有损的转换一律报错而不是舍入：Decimal 降 scale 须整除，Timestamp 不能带亚微秒部分。

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::column_reader::ColumnReader;
use crate::common::{Ordinal, Result, RowIndex, RowMapError};
use crate::field_type::{ColumnMeta, ColumnValue, PhysicalType};
use crate::file::RowGroupWriter;
use crate::record::Cell;
use crate::shape::{FieldDescriptor, FieldKind, RecordShape};

/// 0001-01-01 到 1970-01-01 的天数
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;
/// Decimal 尾数上限（96 位）
const MAX_MANTISSA: u128 = (1 << 96) - 1;

// ── Step ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// 记录值与列值一一对应，直接复制
    Copy(PhysicalType),
    Integer { bits: u8, signed: bool },
    Date,
    Timestamp,
    Decimal { scale: u32 },
    Utf8,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub ordinal:  Ordinal,
    pub field:    String,
    pub kind:     StepKind,
    /// 可空字段：Null 原样穿过，非空值按 kind 转换
    pub nullable: bool,
}

impl Step {
    fn for_field(f: &FieldDescriptor) -> Result<Self> {
        let kind = match f.kind {
            FieldKind::Boolean                 => StepKind::Copy(PhysicalType::Boolean),
            FieldKind::Integer { bits, signed } => StepKind::Integer { bits, signed },
            FieldKind::Float                   => StepKind::Copy(PhysicalType::Float),
            FieldKind::Double                  => StepKind::Copy(PhysicalType::Double),
            FieldKind::Date                    => StepKind::Date,
            FieldKind::Timestamp               => StepKind::Timestamp,
            FieldKind::Decimal                 => StepKind::Decimal {
                scale: f.decimal_scale.ok_or_else(|| RowMapError::MissingDecimalScale {
                    field: f.name.clone(),
                })?,
            },
            FieldKind::Bytes                   => StepKind::Copy(PhysicalType::ByteArray),
            FieldKind::Utf8                    => StepKind::Utf8,
        };
        Ok(Self { ordinal: f.ordinal, field: f.name.clone(), kind, nullable: f.nullable })
    }

    /// 写方向：记录值 → 列值
    pub fn encode(&self, cell: Cell) -> Result<ColumnValue> {
        Ok(match (self.kind, cell) {
            (_, Cell::Null) if self.nullable => ColumnValue::Null,
            (_, Cell::Null) => {
                return Err(RowMapError::InvalidValue(format!(
                    "null for non-nullable field `{}`", self.field
                )));
            }
            (StepKind::Copy(PhysicalType::Boolean), Cell::Boolean(b))   => ColumnValue::Boolean(b),
            (StepKind::Copy(PhysicalType::Float), Cell::Float(v))       => ColumnValue::Float(v),
            (StepKind::Copy(PhysicalType::Double), Cell::Double(v))     => ColumnValue::Double(v),
            (StepKind::Copy(PhysicalType::ByteArray), Cell::Bytes(b))   => ColumnValue::Bytes(b),
            (StepKind::Utf8, Cell::Utf8(s))                             => ColumnValue::Bytes(s.into_bytes()),
            (StepKind::Integer { bits, signed: true }, Cell::Int(v))    => narrow_signed(v, bits)?,
            (StepKind::Integer { bits, signed: false }, Cell::UInt(v))  => narrow_unsigned(v, bits)?,
            (StepKind::Date, Cell::Date(d))                             => ColumnValue::Int32(date_to_days(d)),
            (StepKind::Timestamp, Cell::Timestamp(ts))                  => ColumnValue::Int64(timestamp_to_micros(ts)?),
            (StepKind::Decimal { scale }, Cell::Decimal(d))             => ColumnValue::Int128(rescale(&d, scale)?),
            (kind, cell) => {
                return Err(RowMapError::InvalidValue(format!(
                    "{cell:?} cannot be written by {kind:?} step"
                )));
            }
        })
    }

    /// 读方向：列值 → 记录值；Null 的合法性由调用方按行判断
    pub fn decode(&self, value: ColumnValue) -> Result<Cell> {
        Ok(match (self.kind, value) {
            (_, ColumnValue::Null) => Cell::Null,
            (StepKind::Copy(PhysicalType::Boolean), ColumnValue::Boolean(b))   => Cell::Boolean(b),
            (StepKind::Copy(PhysicalType::Float), ColumnValue::Float(v))       => Cell::Float(v),
            (StepKind::Copy(PhysicalType::Double), ColumnValue::Double(v))     => Cell::Double(v),
            (StepKind::Copy(PhysicalType::ByteArray), ColumnValue::Bytes(b))   => Cell::Bytes(b),
            (StepKind::Utf8, ColumnValue::Bytes(b)) => Cell::Utf8(
                String::from_utf8(b).map_err(|e| RowMapError::InvalidValue(e.to_string()))?,
            ),
            (StepKind::Integer { bits, signed }, ColumnValue::Int32(v)) if bits <= 32 => {
                if signed { Cell::Int(v as i64) } else { Cell::UInt(v as u32 as u64) }
            }
            (StepKind::Integer { bits: 64, signed }, ColumnValue::Int64(v)) => {
                if signed { Cell::Int(v) } else { Cell::UInt(v as u64) }
            }
            (StepKind::Date, ColumnValue::Int32(days))   => Cell::Date(days_to_date(days)?),
            (StepKind::Timestamp, ColumnValue::Int64(us)) => Cell::Timestamp(micros_to_timestamp(us)?),
            (StepKind::Decimal { scale }, ColumnValue::Int128(raw)) => Cell::Decimal(
                Decimal::try_from_i128_with_scale(raw, scale)
                    .map_err(|e| RowMapError::InvalidValue(format!("decimal {raw}e-{scale}: {e}")))?,
            ),
            (kind, value) => {
                return Err(RowMapError::ColumnTypeMismatch {
                    column:   self.field.clone(),
                    expected: format!("{kind:?}"),
                    actual:   format!("{:?}", value.physical_type()),
                });
            }
        })
    }
}

// ── 值转换 ────────────────────────────────────────────────────────────────────

fn narrow_signed(v: i64, bits: u8) -> Result<ColumnValue> {
    if bits >= 64 {
        return Ok(ColumnValue::Int64(v));
    }
    let half = 1i64 << (bits - 1);
    if v < -half || v >= half {
        return Err(RowMapError::InvalidValue(format!("{v} does not fit in i{bits}")));
    }
    Ok(ColumnValue::Int32(v as i32))
}

fn narrow_unsigned(v: u64, bits: u8) -> Result<ColumnValue> {
    if bits >= 64 {
        // u64 按位重解释存入 Int64
        return Ok(ColumnValue::Int64(v as i64));
    }
    if v >> bits != 0 {
        return Err(RowMapError::InvalidValue(format!("{v} does not fit in u{bits}")));
    }
    Ok(ColumnValue::Int32(v as u32 as i32))
}

fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Result<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| RowMapError::InvalidValue(format!("{days} days from epoch is not a date")))
}

/// 列以微秒存储；带亚微秒部分的值不截断，直接拒绝
fn timestamp_to_micros(ts: NaiveDateTime) -> Result<i64> {
    let utc = ts.and_utc();
    if utc.timestamp_subsec_nanos() % 1_000 != 0 {
        return Err(RowMapError::InvalidValue(format!(
            "{ts} has sub-microsecond precision"
        )));
    }
    Ok(utc.timestamp_micros())
}

fn micros_to_timestamp(us: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_micros(us)
        .map(|t| t.naive_utc())
        .ok_or_else(|| RowMapError::InvalidValue(format!("{us}us from epoch is not a timestamp")))
}

/// 把小数的尾数重标定到列 scale，只做整数乘除
///
/// 升 scale 时乘 10^k（超出 96 位尾数报错）；降 scale 时只有整除才允许，否则报错而不舍入。
pub fn rescale(d: &Decimal, column_scale: u32) -> Result<i128> {
    let mantissa = d.mantissa();
    let scale    = d.scale();
    if scale <= column_scale {
        10i128.checked_pow(column_scale - scale)
            .and_then(|f| mantissa.checked_mul(f))
            .filter(|m| m.unsigned_abs() <= MAX_MANTISSA)
            .ok_or_else(|| RowMapError::DecimalRescale(format!(
                "{d} overflows at scale {column_scale}"
            )))
    } else {
        let div = 10i128.pow(scale - column_scale);
        if mantissa % div != 0 {
            return Err(RowMapError::DecimalRescale(format!(
                "{d} has more than {column_scale} fractional digits"
            )));
        }
        Ok(mantissa / div)
    }
}

// ── WritePlan / ReadPlan ──────────────────────────────────────────────────────

/// 记录 → 列值；按序号升序对每列恰好追加一次
#[derive(Debug)]
pub struct WritePlan {
    shape:   Arc<RecordShape>,
    steps:   Vec<Step>,
    columns: Vec<ColumnMeta>,
}

/// 列值 → 记录；每列取一个值，按字段顺序组装
#[derive(Debug)]
pub struct ReadPlan {
    shape:   Arc<RecordShape>,
    steps:   Vec<Step>,
    columns: Vec<ColumnMeta>,
}

/// 为形状编译一对读写计划
pub fn compile(shape: &Arc<RecordShape>) -> Result<(WritePlan, ReadPlan)> {
    let steps = shape.fields().iter()
        .map(Step::for_field)
        .collect::<Result<Vec<_>>>()?;
    let columns = shape.columns();
    Ok((
        WritePlan { shape: Arc::clone(shape), steps: steps.clone(), columns: columns.clone() },
        ReadPlan  { shape: Arc::clone(shape), steps, columns },
    ))
}

/// 列数与逐列值形态必须一致；列名不比较
///
/// 可空性也不比较：可空列映射到非可空字段时，遇到 Null 的那一行读取失败。
fn check_schema(expected: &[ColumnMeta], actual: &[ColumnMeta]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(RowMapError::SchemaMismatch(format!(
            "record has {} fields, file has {} columns", expected.len(), actual.len()
        )));
    }
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        if !e.same_storage(a) {
            return Err(RowMapError::SchemaMismatch(format!(
                "column {i} (`{}`): record expects {:?}/{:?}, file has {:?}/{:?}",
                a.name, e.physical, e.logical, a.physical, a.logical,
            )));
        }
    }
    Ok(())
}

impl WritePlan {
    pub fn shape(&self) -> &Arc<RecordShape> { &self.shape }
    pub fn steps(&self) -> &[Step] { &self.steps }
    /// 形状的列 schema，每次编译结果都相同
    pub fn columns(&self) -> &[ColumnMeta] { &self.columns }
    pub fn len(&self) -> usize { self.steps.len() }
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    pub fn check_schema(&self, schema: &[ColumnMeta]) -> Result<()> {
        check_schema(&self.columns, schema)
    }

    /// 把一行的 Cell（按字段顺序）写入打开中的行组；`cells` 会被清空
    pub fn write_row<W: Write>(
        &self,
        cells: &mut Vec<Cell>,
        group: &mut RowGroupWriter<'_, W>,
    ) -> Result<()> {
        if cells.len() != self.steps.len() {
            return Err(RowMapError::SchemaMismatch(format!(
                "record produced {} values for {} fields", cells.len(), self.steps.len()
            )));
        }
        for (step, cell) in self.steps.iter().zip(cells.drain(..)) {
            let written = step.encode(cell)
                .and_then(|value| group.column(step.ordinal)?.append(value));
            if let Err(source) = written {
                let column = group.column(step.ordinal)
                    .map(|c| c.meta().name.clone())
                    .unwrap_or_else(|_| step.field.clone());
                return Err(RowMapError::FieldWriteFailed {
                    ordinal: step.ordinal,
                    column,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }
}

impl ReadPlan {
    pub fn shape(&self) -> &Arc<RecordShape> { &self.shape }
    pub fn steps(&self) -> &[Step] { &self.steps }
    pub fn columns(&self) -> &[ColumnMeta] { &self.columns }
    pub fn len(&self) -> usize { self.steps.len() }
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    pub fn check_schema(&self, schema: &[ColumnMeta]) -> Result<()> {
        check_schema(&self.columns, schema)
    }

    /// 从每列各取下一个值，转换后按字段顺序放入 `out`
    pub fn read_row(
        &self,
        columns: &mut [ColumnReader<'_>],
        row:     RowIndex,
        out:     &mut Vec<Cell>,
    ) -> Result<()> {
        for (step, column) in self.steps.iter().zip(columns.iter_mut()) {
            let value = column.next_value()?.ok_or_else(|| RowMapError::Encoding(format!(
                "column `{}` exhausted at row {row}", column.meta().name
            )))?;
            if value.is_null() && !step.nullable {
                return Err(RowMapError::UnexpectedNull { field: step.field.clone(), row });
            }
            let cell = step.decode(value).map_err(|source| RowMapError::FieldReadFailed {
                ordinal: step.ordinal,
                column:  column.meta().name.clone(),
                row,
                source:  Box::new(source),
            })?;
            out.push(cell);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;

    use super::*;
    use crate::record::Row;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rescale_is_exact() {
        assert_eq!(rescale(&dec("123.1"), 3).unwrap(), 123_100);
        assert_eq!(rescale(&dec("-0.5"), 3).unwrap(), -500);
        assert_eq!(rescale(&dec("123.100"), 1).unwrap(), 1_231);
        assert_eq!(rescale(&dec("42"), 0).unwrap(), 42);
    }

    #[test]
    fn rescale_keeps_mantissa_in_96_bits() {
        assert!(matches!(rescale(&Decimal::MAX, 1), Err(RowMapError::DecimalRescale(_))));
        assert_eq!(rescale(&Decimal::MAX, 0).unwrap(), (1i128 << 96) - 1);
    }

    #[test]
    fn rescale_refuses_to_round() {
        assert!(matches!(rescale(&dec("1.25"), 1), Err(RowMapError::DecimalRescale(_))));
    }

    #[test]
    fn decimal_step_round_trips_with_column_scale() {
        let step = Step {
            ordinal: 0, field: "d".into(),
            kind: StepKind::Decimal { scale: 3 }, nullable: false,
        };
        let raw = step.encode(Cell::Decimal(dec("123.1"))).unwrap();
        assert_eq!(raw, ColumnValue::Int128(123_100));
        match step.decode(raw).unwrap() {
            Cell::Decimal(d) => {
                assert_eq!(d, dec("123.100"));
                assert_eq!(d.to_string(), "123.100");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dates_and_timestamps_use_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 1, 11).unwrap()), 10);
        assert_eq!(days_to_date(-1).unwrap(), NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
        assert!(days_to_date(i32::MAX).is_err());

        let ts = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_micro_opt(0, 0, 1, 5).unwrap();
        let step = Step { ordinal: 0, field: "t".into(), kind: StepKind::Timestamp, nullable: false };
        assert_eq!(step.encode(Cell::Timestamp(ts)).unwrap(), ColumnValue::Int64(1_000_005));
        assert_eq!(step.decode(ColumnValue::Int64(1_000_005)).unwrap(), Cell::Timestamp(ts));
    }

    #[test]
    fn timestamps_refuse_to_truncate_nanoseconds() {
        let step = Step { ordinal: 0, field: "t".into(), kind: StepKind::Timestamp, nullable: false };
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let nanos = day.and_hms_nano_opt(0, 0, 0, 123_456_789).unwrap();
        assert!(matches!(step.encode(Cell::Timestamp(nanos)), Err(RowMapError::InvalidValue(_))));

        let micros = day.and_hms_nano_opt(0, 0, 0, 123_456_000).unwrap();
        let v = step.encode(Cell::Timestamp(micros)).unwrap();
        assert_eq!(step.decode(v).unwrap(), Cell::Timestamp(micros));

        let before_epoch = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()
            .and_hms_nano_opt(23, 59, 59, 999_999_001).unwrap();
        assert!(step.encode(Cell::Timestamp(before_epoch)).is_err());
    }

    #[test]
    fn unsigned_values_are_bit_reinterpreted() {
        let step = Step {
            ordinal: 0, field: "u".into(),
            kind: StepKind::Integer { bits: 32, signed: false }, nullable: false,
        };
        let v = step.encode(Cell::UInt(u32::MAX as u64)).unwrap();
        assert_eq!(v, ColumnValue::Int32(-1));
        assert_eq!(step.decode(v).unwrap(), Cell::UInt(u32::MAX as u64));
        assert!(step.encode(Cell::UInt(1 << 32)).is_err());
    }

    #[test]
    fn narrow_signed_checks_range() {
        assert_eq!(narrow_signed(-128, 8).unwrap(), ColumnValue::Int32(-128));
        assert!(narrow_signed(128, 8).is_err());
        assert_eq!(narrow_signed(i64::MIN, 64).unwrap(), ColumnValue::Int64(i64::MIN));
    }

    #[test]
    fn null_needs_nullable_step() {
        let mut step = Step {
            ordinal: 0, field: "x".into(),
            kind: StepKind::Copy(PhysicalType::Double), nullable: false,
        };
        assert!(step.encode(Cell::Null).is_err());
        step.nullable = true;
        assert_eq!(step.encode(Cell::Null).unwrap(), ColumnValue::Null);
    }

    #[test]
    fn compile_emits_one_step_per_field_in_order() {
        let shape = Arc::new(
            RecordShape::resolve(&<(bool, Option<String>, NaiveDate, i8)>::layout()).unwrap(),
        );
        let (write, read) = compile(&shape).unwrap();
        let kinds: Vec<StepKind> = write.steps().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, [
            StepKind::Copy(PhysicalType::Boolean),
            StepKind::Utf8,
            StepKind::Date,
            StepKind::Integer { bits: 8, signed: true },
        ]);
        assert!(write.steps()[1].nullable);
        assert_eq!(write.columns(), read.columns());
        assert_eq!(
            write.steps().iter().map(|s| s.ordinal).collect::<Vec<_>>(),
            [0, 1, 2, 3]
        );
    }

    #[test]
    fn schema_check_is_positional() {
        let shape = Arc::new(RecordShape::resolve(&<(i32, f32)>::layout()).unwrap());
        let (write, _) = compile(&shape).unwrap();

        let mut renamed = write.columns().to_vec();
        renamed[0].name = "anything".into();
        assert!(write.check_schema(&renamed).is_ok());

        let swapped = vec![write.columns()[1].clone(), write.columns()[0].clone()];
        assert!(matches!(write.check_schema(&swapped), Err(RowMapError::SchemaMismatch(_))));
        assert!(matches!(
            write.check_schema(&write.columns()[..1]),
            Err(RowMapError::SchemaMismatch(_))
        ));
    }
}
