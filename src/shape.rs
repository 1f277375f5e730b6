//! 记录形状解析与缓存
//!
//! ```text
//!   Row::layout()  ──►  [FieldSpec]  ──resolve──►  RecordShape  ──compile──►  WritePlan / ReadPlan
//!                                                       │
//!                                   ShapeCache：按布局缓存，首次使用时解析 + 编译
//! ```
//!
//! 映射是位置式的：第 i 个字段对应第 i 列。

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{Ordinal, Result, RowMapError};
use crate::field_type::{ColumnMeta, LogicalType, PhysicalType};
use crate::plan::{self, ReadPlan, WritePlan};
use crate::record::{DeclaredType, Field, Row};

/// 96 位尾数能表示的最大小数位数
pub const MAX_DECIMAL_SCALE: u32 = 28;
/// 定点小数列登记的精度
pub const DECIMAL_PRECISION: u8 = 29;

// ── FieldSpec ─────────────────────────────────────────────────────────────────

/// 字段的原始描述：名字、声明类型、可选的小数 scale 注解
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name:          String,
    pub declared:      DeclaredType,
    pub decimal_scale: Option<i32>,
}

impl FieldSpec {
    pub fn new(name: &str, declared: DeclaredType) -> Self {
        Self { name: name.into(), declared, decimal_scale: None }
    }

    /// 通过字段访问器推导声明类型（供 `impl_row!` 使用）
    pub fn of<R, T, F>(name: &str, _accessor: F) -> Self
    where
        T: Field,
        F: Fn(&R) -> &T,
    {
        Self::new(name, T::declared_type())
    }

    pub fn with_decimal_scale(mut self, scale: i32) -> Self {
        self.decimal_scale = Some(scale); self
    }
}

// ── FieldDescriptor ───────────────────────────────────────────────────────────

/// 解析后的物理值类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Boolean,
    Integer { bits: u8, signed: bool },
    Float,
    Double,
    Date,
    Timestamp,
    Decimal,
    Bytes,
    Utf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub ordinal:       Ordinal,
    pub name:          String,
    pub kind:          FieldKind,
    pub nullable:      bool,
    /// 仅 Decimal 有值
    pub decimal_scale: Option<u32>,
}

impl FieldDescriptor {
    /// 字段对应的列定义（列号 = 字段序号）
    pub fn column_meta(&self) -> ColumnMeta {
        let (physical, logical) = match self.kind {
            FieldKind::Boolean                          => (PhysicalType::Boolean, LogicalType::None),
            FieldKind::Integer { bits: 32, signed: true } => (PhysicalType::Int32, LogicalType::None),
            FieldKind::Integer { bits: 64, signed: true } => (PhysicalType::Int64, LogicalType::None),
            FieldKind::Integer { bits, signed } if bits <= 32 =>
                (PhysicalType::Int32, LogicalType::Int { bits, signed }),
            FieldKind::Integer { bits, signed }         => (PhysicalType::Int64, LogicalType::Int { bits, signed }),
            FieldKind::Float                            => (PhysicalType::Float, LogicalType::None),
            FieldKind::Double                           => (PhysicalType::Double, LogicalType::None),
            FieldKind::Date                             => (PhysicalType::Int32, LogicalType::Date),
            FieldKind::Timestamp                        => (PhysicalType::Int64, LogicalType::Timestamp),
            FieldKind::Decimal                          => (PhysicalType::Int128, LogicalType::Decimal {
                precision: DECIMAL_PRECISION,
                scale:     self.decimal_scale.unwrap_or(0) as u8,
            }),
            FieldKind::Bytes                            => (PhysicalType::ByteArray, LogicalType::None),
            FieldKind::Utf8                             => (PhysicalType::ByteArray, LogicalType::Utf8),
        };
        let meta = ColumnMeta::new(self.ordinal as u32, &self.name, physical).with_logical(logical);
        if self.nullable { meta.nullable() } else { meta }
    }
}

// ── RecordShape ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    fields: Vec<FieldDescriptor>,
}

impl RecordShape {
    /// 解析字段描述；不支持的类型、缺失或越界的 scale 在此报错
    pub fn resolve(specs: &[FieldSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(RowMapError::SchemaMismatch("record shape has no fields".into()));
        }
        let fields = specs.iter()
            .enumerate()
            .map(|(ordinal, spec)| resolve_field(ordinal, spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDescriptor] { &self.fields }
    pub fn field(&self, ordinal: Ordinal) -> Option<&FieldDescriptor> { self.fields.get(ordinal) }
    pub fn len(&self) -> usize { self.fields.len() }
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// 校验另一组字段描述与本形状逐位置一致（类别、可空性、scale；名字不比较）
    ///
    /// 未注明 scale 的 Decimal 字段（如元组）接受本形状的 scale。
    pub fn check_layout(&self, specs: &[FieldSpec]) -> Result<()> {
        if specs.len() != self.len() {
            return Err(RowMapError::SchemaMismatch(format!(
                "record has {} fields, plan has {}", specs.len(), self.len()
            )));
        }
        for (spec, ours) in specs.iter().zip(&self.fields) {
            let theirs = match (spec.decimal_scale, ours.decimal_scale) {
                (None, Some(scale)) if is_decimal(&spec.declared) => {
                    resolve_field(ours.ordinal, &spec.clone().with_decimal_scale(scale as i32))?
                }
                _ => resolve_field(ours.ordinal, spec)?,
            };
            if (theirs.kind, theirs.nullable, theirs.decimal_scale)
                != (ours.kind, ours.nullable, ours.decimal_scale)
            {
                return Err(RowMapError::SchemaMismatch(format!(
                    "field #{} `{}`: record has {:?}{}, plan has {:?}{}",
                    ours.ordinal,
                    spec.name,
                    theirs.kind, if theirs.nullable { " (nullable)" } else { "" },
                    ours.kind, if ours.nullable { " (nullable)" } else { "" },
                )));
            }
        }
        Ok(())
    }

    /// 形状对应的列 schema（顺序即字段顺序）
    pub fn columns(&self) -> Vec<ColumnMeta> {
        self.fields.iter().map(FieldDescriptor::column_meta).collect()
    }
}

fn is_decimal(declared: &DeclaredType) -> bool {
    match declared {
        DeclaredType::Optional(inner) => **inner == DeclaredType::Decimal,
        other                         => *other == DeclaredType::Decimal,
    }
}

fn resolve_field(ordinal: Ordinal, spec: &FieldSpec) -> Result<FieldDescriptor> {
    let unsupported = || RowMapError::UnsupportedFieldType {
        field:    spec.name.clone(),
        declared: spec.declared.to_string(),
    };

    let (inner, nullable) = match &spec.declared {
        DeclaredType::Optional(inner) => (inner.as_ref(), true),
        other                         => (other, false),
    };

    let kind = match inner {
        DeclaredType::Bool      => FieldKind::Boolean,
        DeclaredType::Int8      => FieldKind::Integer { bits: 8,  signed: true },
        DeclaredType::Int16     => FieldKind::Integer { bits: 16, signed: true },
        DeclaredType::Int32     => FieldKind::Integer { bits: 32, signed: true },
        DeclaredType::Int64     => FieldKind::Integer { bits: 64, signed: true },
        DeclaredType::UInt8     => FieldKind::Integer { bits: 8,  signed: false },
        DeclaredType::UInt16    => FieldKind::Integer { bits: 16, signed: false },
        DeclaredType::UInt32    => FieldKind::Integer { bits: 32, signed: false },
        DeclaredType::UInt64    => FieldKind::Integer { bits: 64, signed: false },
        DeclaredType::Float32   => FieldKind::Float,
        DeclaredType::Float64   => FieldKind::Double,
        DeclaredType::Date      => FieldKind::Date,
        DeclaredType::Timestamp => FieldKind::Timestamp,
        DeclaredType::Decimal   => FieldKind::Decimal,
        DeclaredType::Bytes     => FieldKind::Bytes,
        DeclaredType::String    => FieldKind::Utf8,
        // Option<Option<T>> 与重复值没有对应的列形态
        DeclaredType::Optional(_) | DeclaredType::List(_) => return Err(unsupported()),
    };

    let decimal_scale = match (kind, spec.decimal_scale) {
        (FieldKind::Decimal, None) => {
            return Err(RowMapError::MissingDecimalScale { field: spec.name.clone() });
        }
        (FieldKind::Decimal, Some(scale)) => {
            if scale < 0 || scale as u32 > MAX_DECIMAL_SCALE {
                return Err(RowMapError::DecimalScaleOutOfRange {
                    field: spec.name.clone(),
                    scale,
                    max:   MAX_DECIMAL_SCALE,
                });
            }
            Some(scale as u32)
        }
        // scale 注解只能出现在 Decimal 字段上
        (_, Some(_)) => return Err(unsupported()),
        (_, None)    => None,
    };

    Ok(FieldDescriptor { ordinal, name: spec.name.clone(), kind, nullable, decimal_scale })
}

// ── ShapeCache ────────────────────────────────────────────────────────────────

/// 一个形状及其编译好的读写计划
#[derive(Debug)]
pub struct CompiledShape {
    pub shape: Arc<RecordShape>,
    pub write: WritePlan,
    pub read:  ReadPlan,
}

/// 记录形状缓存
///
/// 查询只取读锁；未命中时在锁外解析 + 编译，再取写锁插入。
/// 两个线程同时首次使用同一形状时各自编译一次，先插入者胜出。
#[derive(Default)]
pub struct ShapeCache {
    by_type:   RwLock<HashMap<TypeId, Arc<CompiledShape>>>,
    by_layout: RwLock<HashMap<Vec<FieldSpec>, Arc<CompiledShape>>>,
}

impl ShapeCache {
    pub fn new() -> Self { Self::default() }

    /// 进程级默认缓存，仅供 `row_file` 的便捷构造使用
    pub fn global() -> &'static ShapeCache {
        static GLOBAL: OnceLock<ShapeCache> = OnceLock::new();
        GLOBAL.get_or_init(ShapeCache::new)
    }

    pub fn resolve<R: Row>(&self) -> Result<Arc<RecordShape>> {
        Ok(Arc::clone(&self.plans::<R>()?.shape))
    }

    /// 取 `R` 的编译结果（首次使用时解析并编译）
    pub fn plans<R: Row>(&self) -> Result<Arc<CompiledShape>> {
        let key = TypeId::of::<R>();
        if let Some(hit) = self.by_type.read().get(&key) {
            return Ok(Arc::clone(hit));
        }
        let compiled = self.resolve_specs(R::layout())?;
        Ok(Arc::clone(self.by_type.write().entry(key).or_insert(compiled)))
    }

    /// 按字段布局取编译结果；布局相同的形状共享同一份计划
    pub fn resolve_specs(&self, specs: Vec<FieldSpec>) -> Result<Arc<CompiledShape>> {
        if let Some(hit) = self.by_layout.read().get(&specs) {
            return Ok(Arc::clone(hit));
        }

        let shape = Arc::new(RecordShape::resolve(&specs)?);
        let (write, read) = plan::compile(&shape)?;
        debug!(
            fields = shape.len(),
            columns = ?shape.fields().iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "record shape compiled"
        );
        let compiled = Arc::new(CompiledShape { shape, write, read });
        Ok(Arc::clone(self.by_layout.write().entry(specs).or_insert(compiled)))
    }

    /// 已缓存的不同布局数
    pub fn len(&self) -> usize { self.by_layout.read().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn spec(name: &str, declared: DeclaredType) -> FieldSpec {
        FieldSpec::new(name, declared)
    }

    #[test]
    fn resolves_positional_tuple() {
        let shape = ShapeCache::new().resolve::<(i32, f32, NaiveDate)>().unwrap();
        assert_eq!(shape.len(), 3);
        let f = &shape.fields()[2];
        assert_eq!((f.ordinal, f.kind, f.nullable), (2, FieldKind::Date, false));

        let cols = shape.columns();
        assert_eq!(cols[0].physical, PhysicalType::Int32);
        assert_eq!(cols[2].logical, LogicalType::Date);
    }

    #[test]
    fn optional_marks_nullable() {
        let shape = ShapeCache::new().resolve::<(Option<u16>, String)>().unwrap();
        let f = &shape.fields()[0];
        assert!(f.nullable);
        assert_eq!(f.kind, FieldKind::Integer { bits: 16, signed: false });
        assert_eq!(
            f.column_meta().logical,
            LogicalType::Int { bits: 16, signed: false }
        );
        assert!(!shape.fields()[1].nullable);
    }

    #[test]
    fn nested_optional_is_unsupported() {
        let err = ShapeCache::new().resolve::<(i32, Option<Option<i32>>)>().unwrap_err();
        match err {
            RowMapError::UnsupportedFieldType { field, declared } => {
                assert_eq!(field, "Item2");
                assert_eq!(declared, "Option<Option<i32>>");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn list_is_unsupported() {
        let specs = [spec("tags", DeclaredType::List(Box::new(DeclaredType::String)))];
        assert!(matches!(
            RecordShape::resolve(&specs),
            Err(RowMapError::UnsupportedFieldType { .. })
        ));
    }

    #[test]
    fn decimal_needs_scale() {
        let err = ShapeCache::new().resolve::<(Decimal,)>().unwrap_err();
        assert!(matches!(err, RowMapError::MissingDecimalScale { field } if field == "Item1"));
    }

    #[test]
    fn decimal_scale_bounds() {
        for bad in [-1, 29, 100] {
            let specs = [spec("d", DeclaredType::Decimal).with_decimal_scale(bad)];
            assert!(matches!(
                RecordShape::resolve(&specs),
                Err(RowMapError::DecimalScaleOutOfRange { scale, max: 28, .. }) if scale == bad
            ));
        }
        for ok in [0, 28] {
            let specs = [spec("d", DeclaredType::Decimal).with_decimal_scale(ok)];
            let shape = RecordShape::resolve(&specs).unwrap();
            assert_eq!(shape.fields()[0].decimal_scale, Some(ok as u32));
        }
    }

    #[test]
    fn scale_on_non_decimal_is_rejected() {
        let specs = [spec("n", DeclaredType::Int32).with_decimal_scale(2)];
        assert!(matches!(
            RecordShape::resolve(&specs),
            Err(RowMapError::UnsupportedFieldType { .. })
        ));
    }

    #[test]
    fn layout_check_is_positional() {
        let shape = ShapeCache::new().resolve::<(i32, Option<String>)>().unwrap();

        let renamed = [
            spec("id", DeclaredType::Int32),
            spec("name", DeclaredType::Optional(Box::new(DeclaredType::String))),
        ];
        assert!(shape.check_layout(&renamed).is_ok());

        for other in [
            <(i64, Option<String>)>::layout(),
            <(i32, String)>::layout(),
            <(i32,)>::layout(),
            <(i32, Option<String>, bool)>::layout(),
        ] {
            assert!(matches!(shape.check_layout(&other), Err(RowMapError::SchemaMismatch(_))));
        }
    }

    #[test]
    fn layout_check_compares_decimal_scale() {
        let d = |s| [spec("d", DeclaredType::Decimal).with_decimal_scale(s)];
        let shape = RecordShape::resolve(&d(2)).unwrap();
        assert!(shape.check_layout(&d(2)).is_ok());
        assert!(matches!(shape.check_layout(&d(3)), Err(RowMapError::SchemaMismatch(_))));
        // 元组里的 Decimal 不带 scale，沿用列的 scale
        assert!(shape.check_layout(&<(Decimal,)>::layout()).is_ok());
        assert!(matches!(
            shape.check_layout(&<(Option<Decimal>,)>::layout()),
            Err(RowMapError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn empty_shape_is_rejected() {
        assert!(matches!(RecordShape::resolve(&[]), Err(RowMapError::SchemaMismatch(_))));
    }

    #[test]
    fn identical_layouts_share_one_entry() {
        let cache = ShapeCache::new();
        let a = cache.plans::<(i32, f64)>().unwrap();
        let b = cache.resolve_specs(<(i32, f64)>::layout()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        cache.plans::<(i64,)>().unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let cache = ShapeCache::new();
        assert!(cache.plans::<(Decimal,)>().is_err());
        assert!(cache.is_empty());
    }
}
