//! # olap-rowmap 使用案例
//!
//! 1. 以元组写入 / 读回（位置映射，列名 Item1..ItemN）
//! 2. 以结构体写入（含定点小数、可空字段），按列指定压缩方式
//! 3. 查看文件元数据：行组、列块压缩、空值计数
//! 4. 直接使用行组会话：逐行拉取
//! 5. 形状不匹配与空值拒绝

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use olap_rowmap::{
    impl_row, CompressionType, RowGroupReadSession, RowMapError, RowReader, RowWriter, ShapeCache,
    WriterProperties,
};

#[derive(Debug, Clone, PartialEq)]
struct Order {
    order_id: i64,
    customer: String,
    amount:   Decimal,
    shipped:  Option<NaiveDate>,
    priority: u8,
}

impl_row!(Order { order_id, customer, amount: decimal(2), shipped, priority });

fn main() -> olap_rowmap::Result<()> {
    println!("═══════════════════════════════════════════════════════════");
    println!("   olap-rowmap 演示                                         ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 元组
    // =========================================================================
    println!("【1】元组 (i32, f32, NaiveDate) 写入 3 行 ...");
    type Reading = (i32, f32, NaiveDate);
    let readings: Vec<Reading> = vec![
        (123, 3.14, ymd(1981, 6, 10)),
        (456, 1.27, ymd(1987, 3, 16)),
        (789, 6.66, ymd(2018, 5, 2)),
    ];
    let mut writer = RowWriter::<Reading, _>::create(Vec::new(), WriterProperties::default())?;
    writer.write_rows(readings.iter().copied())?;
    let bytes = writer.into_inner()?;
    println!("    文件大小 = {} bytes", bytes.len());

    let reader = RowReader::<Reading>::open(bytes)?;
    for row in reader.rows(0)? {
        let (id, value, day) = row?;
        println!("    {id:>4}  {value:>5.2}  {day}");
    }
    println!("    ✓ OK\n");

    // =========================================================================
    // 2. 结构体 + 定点小数 + 按列压缩
    // =========================================================================
    println!("【2】结构体 Order 写入 5 行（行组 2 行，customer 列不压缩）...");
    let orders: Vec<Order> = (0..5)
        .map(|i| Order {
            order_id: 1000 + i,
            customer: format!("customer-{}", i % 2),
            amount:   Decimal::from_str("19.90").unwrap_or_default() * Decimal::from(i + 1),
            shipped:  (i % 2 == 0).then(|| ymd(2024, 1, 1 + i as u32)),
            priority: (i % 3) as u8,
        })
        .collect();

    let props = WriterProperties::default()
        .with_row_group_size(2)
        .with_column_compression("customer", CompressionType::None)
        .with_key_value("origin", "demo");
    let mut writer = RowWriter::<Order, _>::create(Vec::new(), props)?;
    writer.write_rows(orders.iter().cloned())?;
    let bytes = writer.into_inner()?;

    // =========================================================================
    // 3. 文件元数据
    // =========================================================================
    println!("\n【3】文件元数据 ...");
    let reader = RowReader::<Order>::open(bytes.clone())?;
    let meta = reader.metadata();
    println!("    created_by = {}", meta.created_by);
    println!("    origin     = {:?}", meta.key_value("origin"));
    println!("    行组数 = {}，总行数 = {}", meta.num_row_groups(), meta.num_rows());
    for (col, chunk) in reader.schema().iter().zip(&meta.row_groups[0].columns) {
        println!(
            "    {:<10} {:?}/{:?}  compression={:?}  nulls={}",
            col.name, col.physical, col.logical, chunk.compression, chunk.null_count
        );
    }

    let mut back = Vec::new();
    for rg in 0..reader.num_row_groups() {
        back.extend(reader.read_rows(rg)?);
    }
    assert_eq!(back, orders);
    println!("    ✓ 读回 {} 行，与写入一致\n", back.len());

    // =========================================================================
    // 4. 行组会话
    // =========================================================================
    println!("【4】直接使用行组会话 ...");
    let cache = ShapeCache::new();
    let plans = cache.plans::<Order>()?;
    let file = olap_rowmap::ColumnarFileReader::open(bytes)?;
    let group = file.row_group(1)?;
    let mut session = RowGroupReadSession::<Order>::open(&plans.read, &group)?;
    while let Some(order) = session.read_next()? {
        println!("    row {} → #{} {} {}", session.position() - 1, order.order_id, order.customer, order.amount);
    }
    session.close()?;
    session.close()?;
    println!("    state = {:?}\n", session.state());

    // =========================================================================
    // 5. 错误
    // =========================================================================
    println!("【5】错误处理 ...");
    let mut writer = RowWriter::<(Option<i32>,), _>::create(Vec::new(), WriterProperties::default())?;
    writer.write_rows([(Some(1),), (None,)])?;
    let bytes = writer.into_inner()?;

    match RowReader::<(i64,)>::open(bytes.clone()) {
        Err(e @ RowMapError::SchemaMismatch(_)) => println!("    {e}"),
        other => println!("    unexpected: {:?}", other.err()),
    }
    let strict = RowReader::<(i32,)>::open(bytes)?;
    for row in strict.rows(0)? {
        match row {
            Ok((v,)) => println!("    value = {v}"),
            Err(e)   => println!("    {e}"),
        }
    }

    println!("\n═══════════════════════════════════════════════════════════");
    println!("   演示完成");
    println!("═══════════════════════════════════════════════════════════");
    Ok(())
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
