//! 任意记录序列写入后读回应逐字段相等

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use rust_decimal::Decimal;

use olap_rowmap::{impl_row, CompressionType, RowReader, RowWriter, ShapeCache, WriterProperties};

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    tiny:    i8,
    small:   Option<u16>,
    big:     i64,
    wide:    u64,
    ratio:   f32,
    label:   String,
    blob:    Option<Vec<u8>>,
    day:     NaiveDate,
    at:      Option<NaiveDateTime>,
    amount:  Decimal,
    flag:    bool,
}

impl_row!(Sample { tiny, small, big, wide, ratio, label, blob, day, at, amount: decimal(4), flag });

fn sample() -> impl Strategy<Value = Sample> {
    (
        any::<i8>(),
        any::<Option<u16>>(),
        any::<i64>(),
        any::<u64>(),
        any::<f32>().prop_filter("NaN never compares equal", |f| !f.is_nan()),
        ".{0,12}",
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
        -100_000i32..100_000,
        proptest::option::of(-4_000_000_000_000_000i64..4_000_000_000_000_000),
        (-10_000_000_000i64..10_000_000_000, 0u32..=4),
        any::<bool>(),
    )
        .prop_map(|(tiny, small, big, wide, ratio, label, blob, days, micros, (mantissa, scale), flag)| {
            Sample {
                tiny, small, big, wide, ratio, label, blob,
                day: NaiveDate::from_num_days_from_ce_opt(719_163 + days).unwrap(),
                at: micros.map(|us| DateTime::from_timestamp_micros(us).unwrap().naive_utc()),
                amount: Decimal::new(mantissa, scale),
                flag,
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn written_rows_read_back_equal(
        rows in proptest::collection::vec(sample(), 0..300),
        group_size in 1usize..120,
        lz4 in any::<bool>(),
    ) {
        let cache = ShapeCache::new();
        let compression = if lz4 { CompressionType::Lz4 } else { CompressionType::None };
        let props = WriterProperties::default()
            .with_compression(compression)
            .with_row_group_size(group_size)
            .with_data_page_rows(37);

        let mut writer = RowWriter::<Sample, _>::with_cache(&cache, Vec::new(), props).unwrap();
        writer.write_rows(rows.iter().cloned()).unwrap();
        let reader = RowReader::<Sample>::with_cache(&cache, writer.into_inner().unwrap()).unwrap();

        let mut back = Vec::with_capacity(rows.len());
        for rg in 0..reader.num_row_groups() {
            back.extend(reader.read_rows(rg).unwrap());
        }
        prop_assert_eq!(back, rows);
    }
}
