//! 行组会话的生命周期、空值拒绝与形状缓存并发

use std::sync::{Arc, Barrier};
use std::thread;

use olap_rowmap::{
    read_row_group, write_row_group, ColumnarFileReader, ColumnarFileWriter, RowGroupReadSession,
    RowGroupWriteSession, RowMapError, RowWriter, SessionState, ShapeCache, WriterProperties,
};

fn writer_for(columns: &[olap_rowmap::ColumnMeta]) -> ColumnarFileWriter<Vec<u8>> {
    ColumnarFileWriter::new(Vec::new(), columns.to_vec(), &WriterProperties::default()).unwrap()
}

#[test]
fn null_in_required_field_stops_only_that_row_group() {
    let cache = ShapeCache::new();
    let loose = cache.plans::<(Option<i64>, String)>().unwrap();
    let strict = cache.plans::<(i64, String)>().unwrap();

    let mut file = writer_for(loose.write.columns());
    write_row_group::<(Option<i64>, String), _, _>(
        &loose.write,
        [(Some(1), "a".to_string()), (None, "b".to_string()), (Some(3), "c".to_string())],
        &mut file,
    )
    .unwrap();
    write_row_group::<(Option<i64>, String), _, _>(
        &loose.write,
        [(Some(10), "x".to_string()), (Some(11), "y".to_string())],
        &mut file,
    )
    .unwrap();
    let reader = ColumnarFileReader::open(file.finish().unwrap()).unwrap();

    let first = reader.row_group(0).unwrap();
    let results: Vec<_> = read_row_group::<(i64, String)>(&strict.read, &first).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &(1, "a".to_string()));
    assert!(matches!(
        &results[1],
        Err(RowMapError::UnexpectedNull { field, row: 1 }) if field == "Item1"
    ));

    let second = reader.row_group(1).unwrap();
    let rows: Vec<(i64, String)> = read_row_group(&strict.read, &second)
        .unwrap()
        .collect::<olap_rowmap::Result<_>>()
        .unwrap();
    assert_eq!(rows, vec![(10, "x".to_string()), (11, "y".to_string())]);
}

#[test]
fn closing_twice_is_a_no_op_everywhere() {
    let cache = ShapeCache::new();
    let plans = cache.plans::<(i32,)>().unwrap();
    let mut file = writer_for(plans.write.columns());

    {
        let mut session = RowGroupWriteSession::<(i32,), _>::open(&plans.write, &mut file).unwrap();
        session.write(&(7,)).unwrap();
        assert!(session.close().unwrap().is_some());
        assert!(session.close().unwrap().is_none());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.rows_written(), 1);
    }
    assert_eq!(file.num_row_groups(), 1);

    let reader = ColumnarFileReader::open(file.finish().unwrap()).unwrap();
    let group = reader.row_group(0).unwrap();
    let mut session = RowGroupReadSession::<(i32,)>::open(&plans.read, &group).unwrap();
    assert_eq!(session.state(), SessionState::Created);
    session.close().unwrap();
    session.close().unwrap();
    assert!(matches!(session.read_next(), Err(RowMapError::SessionClosed)));

    let mut writer = RowWriter::<(i32,), _>::with_cache(&cache, Vec::new(), WriterProperties::default())
        .unwrap();
    writer.close().unwrap();
    writer.close().unwrap();
    assert!(matches!(writer.write_row((1,)), Err(RowMapError::SessionClosed)));
}

#[test]
fn read_session_reports_exhaustion_without_closing() {
    let plans = ShapeCache::new().plans::<(bool,)>().unwrap();
    let mut file = writer_for(plans.write.columns());
    write_row_group::<(bool,), _, _>(&plans.write, [(true,)], &mut file).unwrap();
    let reader = ColumnarFileReader::open(file.finish().unwrap()).unwrap();
    let group = reader.row_group(0).unwrap();

    let mut session = RowGroupReadSession::<(bool,)>::open(&plans.read, &group).unwrap();
    assert_eq!(session.read_next().unwrap(), Some((true,)));
    assert_eq!(session.read_next().unwrap(), None);
    assert_eq!(session.read_next().unwrap(), None);
    assert_eq!(session.state(), SessionState::Active);
    session.close().unwrap();
}

#[test]
fn concurrent_first_use_resolves_equal_shapes() {
    type Shape = (i32, Option<String>, f64, chrono::NaiveDateTime);
    const THREADS: usize = 8;

    let cache = Arc::new(ShapeCache::new());
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.plans::<Shape>().unwrap()
            })
        })
        .collect();

    let compiled: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for c in &compiled[1..] {
        assert_eq!(c.shape, compiled[0].shape);
        assert_eq!(c.write.columns(), compiled[0].write.columns());
    }
    assert_eq!(cache.len(), 1);
    let cached = cache.plans::<Shape>().unwrap();
    assert!(compiled.iter().any(|c| Arc::ptr_eq(c, &cached)));
}

#[test]
fn row_group_index_out_of_range() {
    let plans = ShapeCache::new().plans::<(i32,)>().unwrap();
    let file = writer_for(plans.write.columns());
    let reader = ColumnarFileReader::open(file.finish().unwrap()).unwrap();
    assert_eq!(reader.num_row_groups(), 0);
    assert!(matches!(
        reader.row_group(0),
        Err(RowMapError::RowGroupOutOfRange { index: 0, count: 0 })
    ));
}

#[test]
fn sessions_reject_records_of_another_shape() {
    let cache = ShapeCache::new();
    let plans = cache.plans::<(i32, String)>().unwrap();
    let mut file = writer_for(plans.write.columns());

    assert!(matches!(
        RowGroupWriteSession::<(i64, String), _>::open(&plans.write, &mut file),
        Err(RowMapError::SchemaMismatch(_))
    ));
    write_row_group::<(i32, String), _, _>(&plans.write, [(5, "five".to_string())], &mut file).unwrap();
    let reader = ColumnarFileReader::open(file.finish().unwrap()).unwrap();
    let group = reader.row_group(0).unwrap();

    assert!(matches!(
        read_row_group::<(i32,)>(&plans.read, &group),
        Err(RowMapError::SchemaMismatch(_))
    ));
    assert!(matches!(
        RowGroupReadSession::<(String, i32)>::open(&plans.read, &group),
        Err(RowMapError::SchemaMismatch(_))
    ));
}
