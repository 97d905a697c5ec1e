//! Conversions between [`Value`] and `PostgreSQL` wire types.
//!
//! Parameters are bound against the type the server inferred for each
//! placeholder, so a `Text` value can feed a `timestamp`, `numeric`, `uuid`
//! or `jsonb` parameter without an explicit cast. Result cells of those
//! types come back as `Text` in a canonical rendering.

use std::error::Error as StdError;
use std::fmt::{Display, Write as _};
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use dblooper_types::{DataType, Value};
use postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

use crate::error::DbError;

type BoxError = Box<dyn StdError + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Borrowed [`Value`] adapter that converts to whatever type the server
/// inferred for the parameter.
#[derive(Debug)]
pub(crate) struct PgParam<'a>(pub(crate) &'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Boolean(v) => bind_bool(*v, ty, out),
            Value::Integer(v) => bind_integer(*v, ty, out),
            Value::Float(v) => bind_float(*v, ty, out),
            Value::Text(v) => bind_text(v, ty, out),
            Value::Blob(v) if *ty == Type::BYTEA => v.as_slice().to_sql(ty, out),
            Value::Blob(_) => Err(mismatch(DataType::Blob, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

fn mismatch(kind: DataType, ty: &Type) -> BoxError {
    format!("cannot bind {kind} value to parameter of type {ty}; cast the parameter in the statement")
        .into()
}

fn bind_bool(v: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::BOOL {
        v.to_sql(ty, out)
    } else if is_text(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        Err(mismatch(DataType::Boolean, ty))
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn bind_integer(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => {
            encode_numeric(&v.to_string(), out)?;
            Ok(IsNull::No)
        }
        _ if is_text(ty) => v.to_string().to_sql(ty, out),
        _ => Err(mismatch(DataType::Integer, ty)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn bind_float(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => {
            encode_numeric(&v.to_string(), out)?;
            Ok(IsNull::No)
        }
        _ if is_text(ty) => v.to_string().to_sql(ty, out),
        _ => Err(mismatch(DataType::Float, ty)),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if is_text(ty) {
        return s.to_sql(ty, out);
    }
    match *ty {
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT2 => parse::<i16>(s, ty)?.to_sql(ty, out),
        Type::INT4 => parse::<i32>(s, ty)?.to_sql(ty, out),
        Type::INT8 => parse::<i64>(s, ty)?.to_sql(ty, out),
        Type::FLOAT4 => parse::<f32>(s, ty)?.to_sql(ty, out),
        Type::FLOAT8 => parse::<f64>(s, ty)?.to_sql(ty, out),
        Type::NUMERIC => {
            encode_numeric(s, out)?;
            Ok(IsNull::No)
        }
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| invalid(s, ty, e))?
            .to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map_err(|e| invalid(s, ty, e))?
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .map_err(|e| invalid(s, ty, e))?
            .to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s.trim())
            .map_err(|e| invalid(s, ty, e))?
            .to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => Err(mismatch(DataType::Text, ty)),
    }
}

fn invalid(s: &str, ty: &Type, err: impl Display) -> BoxError {
    format!("invalid {ty} literal '{s}': {err}").into()
}

fn parse<T>(s: &str, ty: &Type) -> Result<T, BoxError>
where
    T: FromStr,
    T::Err: Display,
{
    s.trim().parse::<T>().map_err(|e| invalid(s, ty, e))
}

/// Accepts the spellings `PostgreSQL` itself accepts for boolean input.
fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(s, &Type::BOOL, "expected true or false")),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let trimmed = s.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| invalid(s, &Type::TIMESTAMP, "expected YYYY-MM-DD[ HH:MM:SS[.f]]"))
}

/// RFC 3339 input keeps its offset; a bare timestamp is taken as UTC.
fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s.trim()) {
        return Ok(ts.with_timezone(&Utc));
    }
    parse_timestamp(s)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| invalid(s, &Type::TIMESTAMPTZ, "expected an RFC 3339 timestamp"))
}

/// Write `text` as a binary `numeric`: digit count, weight, sign and
/// display scale, then base-10000 digit groups.
fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_u16(0);
        return Ok(());
    }

    let (mut negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let well_formed = !(int_part.is_empty() && frac_part.is_empty())
        && int_part
            .bytes()
            .chain(frac_part.bytes())
            .all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(invalid(text, &Type::NUMERIC, "expected a decimal number"));
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = u16::try_from(frac_part.len())?;
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;

    let digits: Vec<u8> = std::iter::repeat(b'0')
        .take(int_pad)
        .chain(int_part.bytes())
        .chain(frac_part.bytes())
        .chain(std::iter::repeat(b'0').take(frac_pad))
        .map(|b| b - b'0')
        .collect();
    let mut groups: Vec<i16> = digits
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0_i16, |acc, d| acc * 10 + i16::from(*d)))
        .collect();
    let mut weight = i16::try_from((int_pad + int_part.len()) / 4)? - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
        negative = false;
    }

    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(weight);
    out.put_u16(if negative { NUMERIC_NEG } else { NUMERIC_POS });
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

/// Render a binary `numeric` as its decimal text, keeping the display scale.
fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let mut words = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let mut header = || words.next().ok_or("truncated numeric header");
    let ndigits = usize::from(header()?);
    #[allow(clippy::cast_possible_wrap)]
    let weight = header()? as i16;
    let sign = header()?;
    let dscale = usize::from(header()?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }
    let digits: Vec<u16> = words.take(ndigits).collect();
    if digits.len() != ndigits {
        return Err("truncated numeric digits".into());
    }
    let group = |idx: i32| -> u16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for idx in 0..=i32::from(weight) {
            if idx == 0 {
                write!(text, "{}", group(idx))?;
            } else {
                write!(text, "{:04}", group(idx))?;
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = i32::from(weight) + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", group(idx))?;
            idx += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

/// `numeric` column read back as decimal text.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn timestamp_text(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMATS[0]).to_string()
}

fn timestamptz_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Map one result cell to a [`Value`] by its column type.
pub(crate) fn read_value(row: &postgres::Row, idx: usize) -> Result<Value, DbError> {
    let ty = row.columns()[idx].type_();
    let get_err = |e: postgres::Error| DbError::Statement(e.to_string());

    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map_err(get_err)?.into(),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(get_err)?
            .map(i64::from)
            .into(),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(get_err)?
            .map(i64::from)
            .into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(get_err)?.into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(get_err)?
            .map(f64::from)
            .into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(get_err)?.into(),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map_err(get_err)?
            .map_or(Value::Null, Value::Blob),
        Type::NUMERIC => row
            .try_get::<_, Option<PgNumeric>>(idx)
            .map_err(get_err)?
            .map(|n| n.0)
            .into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(get_err)?
            .map(timestamp_text)
            .into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(get_err)?
            .map(timestamptz_text)
            .into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(get_err)?
            .map(|d| d.to_string())
            .into(),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .map_err(get_err)?
            .map(|t| t.to_string())
            .into(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(get_err)?
            .map(|j| j.to_string())
            .into(),
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(idx)
            .map_err(get_err)?
            .map(|u| u.to_string())
            .into(),
        _ if is_text(ty) => row.try_get::<_, Option<String>>(idx).map_err(get_err)?.into(),
        _ => {
            return Err(DbError::Unsupported(format!(
                "column '{}' has type {ty}; cast it to text in the statement",
                row.columns()[idx].name()
            )))
        }
    };
    Ok(value)
}
