//! 列编码
//!
//! 只对非空值编码（空值由页内的 validity bitmap 表示）。四种编码：
//! - **Plain**      — 按物理类型定宽小端，ByteArray 为 (len, bytes)
//! - **RunLength**  — (count, value) 对，用于布尔列
//! - **DeltaBinary**— 整数增量编码（首值 + 逐个差值）
//! - **Dictionary** — 字典编码，低基数字节串列

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Result, RowMapError};
use crate::field_type::{ColumnValue, EncodingType, PhysicalType};

// ── 统一编/解码入口 ───────────────────────────────────────────────────────────

pub fn encode(values: &[ColumnValue], physical: PhysicalType, enc: EncodingType) -> Result<Vec<u8>> {
    check_supported(physical, enc)?;
    match enc {
        EncodingType::Plain       => plain::encode(values, physical),
        EncodingType::RunLength   => rle::encode(values),
        EncodingType::DeltaBinary => delta::encode(values, physical),
        EncodingType::Dictionary  => dict::encode(values),
    }
}

pub fn decode(
    data:     &[u8],
    physical: PhysicalType,
    enc:      EncodingType,
    count:    usize,
) -> Result<Vec<ColumnValue>> {
    check_supported(physical, enc)?;
    let values = match enc {
        EncodingType::Plain       => plain::decode(data, physical, count)?,
        EncodingType::RunLength   => rle::decode(data, count)?,
        EncodingType::DeltaBinary => delta::decode(data, physical, count)?,
        EncodingType::Dictionary  => dict::decode(data, count)?,
    };
    if values.len() != count {
        return Err(RowMapError::Encoding(format!(
            "{enc:?}: expected {count} values, decoded {}", values.len()
        )));
    }
    Ok(values)
}

fn check_supported(physical: PhysicalType, enc: EncodingType) -> Result<()> {
    if enc.supports(physical) {
        Ok(())
    } else {
        Err(RowMapError::Encoding(format!("{enc:?} cannot encode {physical:?}")))
    }
}

fn mismatch(physical: PhysicalType, v: &ColumnValue) -> RowMapError {
    RowMapError::Encoding(format!("value {v:?} does not match physical type {physical:?}"))
}

fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> RowMapError + '_ {
    move |e| RowMapError::Encoding(format!("{what}: {e}"))
}

// ── Plain ─────────────────────────────────────────────────────────────────────
mod plain {
    use super::*;

    pub fn encode(values: &[ColumnValue], physical: PhysicalType) -> Result<Vec<u8>> {
        let width = physical.fixed_size().unwrap_or(8);
        let mut out = Vec::with_capacity(values.len() * width);
        for v in values {
            match (physical, v) {
                (PhysicalType::Boolean, ColumnValue::Boolean(x)) => out.push(*x as u8),
                (PhysicalType::Int32,   ColumnValue::Int32(x))   => out.write_i32::<LittleEndian>(*x)?,
                (PhysicalType::Int64,   ColumnValue::Int64(x))   => out.write_i64::<LittleEndian>(*x)?,
                (PhysicalType::Int128,  ColumnValue::Int128(x))  => out.write_i128::<LittleEndian>(*x)?,
                (PhysicalType::Float,   ColumnValue::Float(x))   => out.write_f32::<LittleEndian>(*x)?,
                (PhysicalType::Double,  ColumnValue::Double(x))  => out.write_f64::<LittleEndian>(*x)?,
                (PhysicalType::ByteArray, ColumnValue::Bytes(b)) => {
                    out.write_u32::<LittleEndian>(b.len() as u32)?;
                    out.extend_from_slice(b);
                }
                _ => return Err(mismatch(physical, v)),
            }
        }
        Ok(out)
    }

    pub fn decode(data: &[u8], physical: PhysicalType, count: usize) -> Result<Vec<ColumnValue>> {
        let mut rd  = Cursor::new(data);
        let mut out = Vec::with_capacity(count);
        let next = |rd: &mut Cursor<&[u8]>| -> std::io::Result<ColumnValue> {
            Ok(match physical {
                PhysicalType::Boolean   => ColumnValue::Boolean(rd.read_u8()? != 0),
                PhysicalType::Int32     => ColumnValue::Int32(rd.read_i32::<LittleEndian>()?),
                PhysicalType::Int64     => ColumnValue::Int64(rd.read_i64::<LittleEndian>()?),
                PhysicalType::Int128    => ColumnValue::Int128(rd.read_i128::<LittleEndian>()?),
                PhysicalType::Float     => ColumnValue::Float(rd.read_f32::<LittleEndian>()?),
                PhysicalType::Double    => ColumnValue::Double(rd.read_f64::<LittleEndian>()?),
                PhysicalType::ByteArray => {
                    let len = rd.read_u32::<LittleEndian>()? as usize;
                    let mut buf = vec![0u8; len];
                    rd.read_exact(&mut buf)?;
                    ColumnValue::Bytes(buf)
                }
            })
        };
        for _ in 0..count {
            out.push(next(&mut rd).map_err(truncated("plain"))?);
        }
        Ok(out)
    }
}

// ── Run-Length Encoding ───────────────────────────────────────────────────────
mod rle {
    use super::*;

    pub fn encode(values: &[ColumnValue]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut run: Option<(bool, u32)> = None;

        for v in values {
            let ColumnValue::Boolean(b) = v else {
                return Err(mismatch(PhysicalType::Boolean, v));
            };
            run = match run {
                Some((cur, n)) if cur == *b => Some((cur, n + 1)),
                Some((cur, n)) => {
                    write_run(&mut out, n, cur)?;
                    Some((*b, 1))
                }
                None => Some((*b, 1)),
            };
        }
        if let Some((cur, n)) = run {
            write_run(&mut out, n, cur)?;
        }
        Ok(out)
    }

    fn write_run(out: &mut Vec<u8>, run: u32, v: bool) -> Result<()> {
        out.write_u32::<LittleEndian>(run)?;
        out.push(v as u8);
        Ok(())
    }

    pub fn decode(data: &[u8], count: usize) -> Result<Vec<ColumnValue>> {
        let mut rd  = Cursor::new(data);
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let run = rd.read_u32::<LittleEndian>().map_err(truncated("rle run"))? as usize;
            let val = rd.read_u8().map_err(truncated("rle value"))? != 0;
            if out.len() + run > count {
                return Err(RowMapError::Encoding("rle: run exceeds value count".into()));
            }
            out.extend(std::iter::repeat(ColumnValue::Boolean(val)).take(run));
        }
        Ok(out)
    }
}

// ── Delta Binary ──────────────────────────────────────────────────────────────
mod delta {
    use super::*;

    fn as_i64(physical: PhysicalType, v: &ColumnValue) -> Result<i64> {
        match (physical, v) {
            (PhysicalType::Int32, ColumnValue::Int32(x)) => Ok(*x as i64),
            (PhysicalType::Int64, ColumnValue::Int64(x)) => Ok(*x),
            _ => Err(mismatch(physical, v)),
        }
    }

    pub fn encode(values: &[ColumnValue], physical: PhysicalType) -> Result<Vec<u8>> {
        let mut out  = Vec::with_capacity(values.len() * 8);
        let mut prev = 0i64;
        for (i, v) in values.iter().enumerate() {
            let x = as_i64(physical, v)?;
            // 首值即 base；其后写差值（wrapping，解码端对称还原）
            let d = if i == 0 { x } else { x.wrapping_sub(prev) };
            out.write_i64::<LittleEndian>(d)?;
            prev = x;
        }
        Ok(out)
    }

    pub fn decode(data: &[u8], physical: PhysicalType, count: usize) -> Result<Vec<ColumnValue>> {
        let mut rd   = Cursor::new(data);
        let mut out  = Vec::with_capacity(count);
        let mut prev = 0i64;
        for i in 0..count {
            let d = rd.read_i64::<LittleEndian>().map_err(truncated("delta"))?;
            let x = if i == 0 { d } else { prev.wrapping_add(d) };
            prev = x;
            out.push(match physical {
                PhysicalType::Int32 => ColumnValue::Int32(x as i32),
                _                   => ColumnValue::Int64(x),
            });
        }
        Ok(out)
    }
}

// ── Dictionary ────────────────────────────────────────────────────────────────
mod dict {
    use std::collections::HashMap;

    use super::*;

    pub fn encode(values: &[ColumnValue]) -> Result<Vec<u8>> {
        let mut dict:  Vec<&[u8]>             = Vec::new();
        let mut index: HashMap<&[u8], u32>    = HashMap::new();
        let mut codes: Vec<u32>               = Vec::with_capacity(values.len());

        for v in values {
            let ColumnValue::Bytes(b) = v else {
                return Err(mismatch(PhysicalType::ByteArray, v));
            };
            let code = *index.entry(b.as_slice()).or_insert_with(|| {
                dict.push(b.as_slice());
                (dict.len() - 1) as u32
            });
            codes.push(code);
        }

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(dict.len() as u32)?;
        for entry in &dict {
            out.write_u32::<LittleEndian>(entry.len() as u32)?;
            out.extend_from_slice(entry);
        }
        for c in &codes {
            out.write_u32::<LittleEndian>(*c)?;
        }
        Ok(out)
    }

    pub fn decode(data: &[u8], count: usize) -> Result<Vec<ColumnValue>> {
        let mut rd = Cursor::new(data);
        let dict_len = rd.read_u32::<LittleEndian>().map_err(truncated("dict header"))? as usize;
        let mut dict: Vec<Vec<u8>> = Vec::with_capacity(dict_len.min(count));

        for _ in 0..dict_len {
            let slen = rd.read_u32::<LittleEndian>().map_err(truncated("dict entry"))? as usize;
            let mut buf = vec![0u8; slen];
            rd.read_exact(&mut buf).map_err(truncated("dict entry"))?;
            dict.push(buf);
        }

        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let code = rd.read_u32::<LittleEndian>().map_err(truncated("dict code"))? as usize;
            let entry = dict.get(code).ok_or_else(|| {
                RowMapError::Encoding(format!("dict: code {code} outside dictionary of {dict_len}"))
            })?;
            out.push(ColumnValue::Bytes(entry.clone()));
        }
        Ok(out)
    }
}
