//! XSD built-in types
//!
//! The XSD 1.0 built-in datatypes with their derivation chain, white-space
//! mode, and lexical checker. Values are parsed only as far as facets need
//! them: numbers into `rust_decimal` / `f64`, dates and times into an
//! instant on a common timeline (via `chrono`), binaries into bytes.

use std::cmp::Ordering;
use std::collections::HashMap;

use base64::Engine;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::names::{is_valid_name, is_valid_ncname, is_valid_nmtoken, is_valid_qname};
use crate::namespaces::{QName, XSD_NAMESPACE};

use super::facets::WhiteSpace;

macro_rules! builtins {
    ($( $variant:ident => $name:literal ),* $(,)?) => {
        /// An XSD built-in type
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Builtin {
            $(
                #[doc = concat!("`xs:", $name, "`")]
                $variant,
            )*
        }

        impl Builtin {
            /// Every built-in, in registration order
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),*];

            /// Local name in the XSD namespace
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }
        }
    };
}

builtins! {
    AnyType => "anyType",
    AnySimpleType => "anySimpleType",
    String => "string",
    NormalizedString => "normalizedString",
    Token => "token",
    Language => "language",
    Name => "Name",
    NCName => "NCName",
    Id => "ID",
    IdRef => "IDREF",
    IdRefs => "IDREFS",
    Entity => "ENTITY",
    Entities => "ENTITIES",
    NmToken => "NMTOKEN",
    NmTokens => "NMTOKENS",
    Boolean => "boolean",
    Decimal => "decimal",
    Integer => "integer",
    NonPositiveInteger => "nonPositiveInteger",
    NegativeInteger => "negativeInteger",
    Long => "long",
    Int => "int",
    Short => "short",
    Byte => "byte",
    NonNegativeInteger => "nonNegativeInteger",
    UnsignedLong => "unsignedLong",
    UnsignedInt => "unsignedInt",
    UnsignedShort => "unsignedShort",
    UnsignedByte => "unsignedByte",
    PositiveInteger => "positiveInteger",
    Float => "float",
    Double => "double",
    Duration => "duration",
    DateTime => "dateTime",
    Time => "time",
    Date => "date",
    GYearMonth => "gYearMonth",
    GYear => "gYear",
    GMonthDay => "gMonthDay",
    GDay => "gDay",
    GMonth => "gMonth",
    HexBinary => "hexBinary",
    Base64Binary => "base64Binary",
    AnyUri => "anyURI",
    QName => "QName",
    Notation => "NOTATION",
}

static BY_NAME: Lazy<HashMap<&'static str, Builtin>> =
    Lazy::new(|| Builtin::ALL.iter().map(|&b| (b.name(), b)).collect());

/// Value-space family of a built-in, deciding which facets apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Character strings (length in characters)
    String,
    /// true / false
    Boolean,
    /// decimal and the integer family
    Decimal,
    /// float / double
    Float,
    /// Date and time types
    Temporal,
    /// duration
    Duration,
    /// hexBinary / base64Binary (length in octets)
    Binary,
    /// QName / NOTATION
    QName,
    /// anyURI
    Uri,
    /// anySimpleType / anyType: no facets beyond pattern and enumeration
    Any,
}

impl Builtin {
    /// Look up a built-in by its local name
    pub fn from_local_name(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    /// Look up a built-in by expanded name
    pub fn from_qname(name: &QName) -> Option<Self> {
        if name.namespace == XSD_NAMESPACE {
            Self::from_local_name(&name.local)
        } else {
            None
        }
    }

    /// Expanded name
    pub fn qname(self) -> QName {
        QName::xsd(self.name())
    }

    /// Whether this is a simple type (everything except anyType)
    pub fn is_simple(self) -> bool {
        self != Builtin::AnyType
    }

    /// Base type in the built-in hierarchy; every derivation is a restriction
    /// except the three list types, which XSD treats as restrictions of
    /// anySimpleType too
    pub fn base(self) -> Option<Builtin> {
        use Builtin::*;
        Some(match self {
            AnyType => return None,
            AnySimpleType => AnyType,
            NormalizedString => String,
            Token => NormalizedString,
            Language | Name | NmToken => Token,
            NCName => Name,
            Id | IdRef | Entity => NCName,
            Integer => Decimal,
            NonPositiveInteger | Long | NonNegativeInteger => Integer,
            NegativeInteger => NonPositiveInteger,
            Int => Long,
            Short => Int,
            Byte => Short,
            UnsignedLong | PositiveInteger => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            _ => AnySimpleType,
        })
    }

    /// Item type of the built-in list types
    pub fn list_item(self) -> Option<Builtin> {
        match self {
            Builtin::IdRefs => Some(Builtin::IdRef),
            Builtin::Entities => Some(Builtin::Entity),
            Builtin::NmTokens => Some(Builtin::NmToken),
            _ => None,
        }
    }

    /// White-space handling applied before lexical checks
    pub fn whitespace(self) -> WhiteSpace {
        match self {
            Builtin::AnyType | Builtin::AnySimpleType | Builtin::String => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Value-space family
    pub fn value_kind(self) -> ValueKind {
        use Builtin::*;
        match self {
            AnyType | AnySimpleType => ValueKind::Any,
            String | NormalizedString | Token | Language | Name | NCName | Id | IdRef
            | IdRefs | Entity | Entities | NmToken | NmTokens => ValueKind::String,
            Boolean => ValueKind::Boolean,
            Decimal | Integer | NonPositiveInteger | NegativeInteger | Long | Int | Short
            | Byte | NonNegativeInteger | UnsignedLong | UnsignedInt | UnsignedShort
            | UnsignedByte | PositiveInteger => ValueKind::Decimal,
            Float | Double => ValueKind::Float,
            Duration => ValueKind::Duration,
            DateTime | Time | Date | GYearMonth | GYear | GMonthDay | GDay | GMonth => {
                ValueKind::Temporal
            }
            HexBinary | Base64Binary => ValueKind::Binary,
            QName | Notation => ValueKind::QName,
            AnyUri => ValueKind::Uri,
        }
    }

    /// Whether `self` is `other` or derives from it
    pub fn derives_from(self, other: Builtin) -> bool {
        let mut current = Some(self);
        while let Some(b) = current {
            if b == other {
                return true;
            }
            current = b.base();
        }
        false
    }

    /// Parse an already white-space-normalized value
    pub fn parse(self, value: &str) -> Result<Value, String> {
        use Builtin::*;
        let invalid = || format!("'{}' is not a valid {}", value, self.name());
        match self {
            AnyType | AnySimpleType | String => Ok(Value::String(value.to_string())),
            NormalizedString => {
                if value.contains(['\r', '\n', '\t']) {
                    return Err(invalid());
                }
                Ok(Value::String(value.to_string()))
            }
            Token => Ok(Value::String(value.to_string())),
            Language => is_language(value)
                .then(|| Value::String(value.to_string()))
                .ok_or_else(invalid),
            Name => is_valid_name(value)
                .then(|| Value::String(value.to_string()))
                .ok_or_else(invalid),
            NCName | Id | IdRef | Entity => is_valid_ncname(value)
                .then(|| Value::String(value.to_string()))
                .ok_or_else(invalid),
            NmToken => is_valid_nmtoken(value)
                .then(|| Value::String(value.to_string()))
                .ok_or_else(invalid),
            IdRefs | Entities | NmTokens => {
                let item = self.list_item().unwrap_or(Builtin::Token);
                let mut count = 0;
                for token in value.split_whitespace() {
                    item.parse(token)?;
                    count += 1;
                }
                if count == 0 {
                    return Err(invalid());
                }
                Ok(Value::String(value.to_string()))
            }
            Boolean => match value {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
            Decimal => parse_decimal(value).map(Value::Decimal).ok_or_else(invalid),
            Integer | NonPositiveInteger | NegativeInteger | Long | Int | Short | Byte
            | NonNegativeInteger | UnsignedLong | UnsignedInt | UnsignedShort | UnsignedByte
            | PositiveInteger => {
                let number = parse_integer(value).ok_or_else(invalid)?;
                if !self.integer_in_range(number) {
                    return Err(format!("'{}' is out of range for {}", value, self.name()));
                }
                Ok(Value::Decimal(number))
            }
            Float => parse_float(value)
                .map(|f| Value::Float(f as f32 as f64))
                .ok_or_else(invalid),
            Double => parse_float(value).map(Value::Float).ok_or_else(invalid),
            Duration => parse_duration(value).map(Value::Duration).ok_or_else(invalid),
            DateTime | Time | Date | GYearMonth | GYear | GMonthDay | GDay | GMonth => {
                parse_temporal(self, value).map(Value::Temporal).ok_or_else(invalid)
            }
            HexBinary => parse_hex(value).map(Value::Binary).ok_or_else(invalid),
            Base64Binary => {
                let compact: std::string::String =
                    value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map(Value::Binary)
                    .map_err(|_| invalid())
            }
            AnyUri => {
                if is_uri_reference(value) {
                    Ok(Value::String(value.to_string()))
                } else {
                    Err(invalid())
                }
            }
            QName | Notation => is_valid_qname(value)
                .then(|| Value::String(value.to_string()))
                .ok_or_else(invalid),
        }
    }

    fn integer_in_range(self, n: Decimal) -> bool {
        let zero = Decimal::ZERO;
        let (lo, hi): (Option<Decimal>, Option<Decimal>) = match self {
            Builtin::NonPositiveInteger => (None, Some(zero)),
            Builtin::NegativeInteger => (None, Some(Decimal::NEGATIVE_ONE)),
            Builtin::Long => (Some(i64::MIN.into()), Some(i64::MAX.into())),
            Builtin::Int => (Some(i32::MIN.into()), Some(i32::MAX.into())),
            Builtin::Short => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            Builtin::Byte => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            Builtin::NonNegativeInteger => (Some(zero), None),
            Builtin::PositiveInteger => (Some(Decimal::ONE), None),
            Builtin::UnsignedLong => (Some(zero), Some(u64::MAX.into())),
            Builtin::UnsignedInt => (Some(zero), Some(u32::MAX.into())),
            Builtin::UnsignedShort => (Some(zero), Some(u16::MAX.into())),
            Builtin::UnsignedByte => (Some(zero), Some(u8::MAX.into())),
            _ => (None, None),
        };
        lo.map_or(true, |lo| n >= lo) && hi.map_or(true, |hi| n <= hi)
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}

/// A point on the date/time timeline. Values without a timezone are
/// compared as if they were UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temporal {
    /// Seconds from 0001-01-01T00:00:00Z
    pub seconds: i64,
    /// Sub-second part
    pub nanos: u32,
    /// Explicit timezone offset in minutes
    pub timezone: Option<i32>,
}

/// A duration split into its two incommensurable parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationValue {
    /// Years and months, in months
    pub months: i64,
    /// Days, hours, minutes, and seconds, in seconds
    pub seconds: Decimal,
}

impl PartialOrd for DurationValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let months = self.months.cmp(&other.months);
        let seconds = self.seconds.cmp(&other.seconds);
        match (months, seconds) {
            (a, b) if a == b => Some(a),
            (Ordering::Equal, b) => Some(b),
            (a, Ordering::Equal) => Some(a),
            _ => None,
        }
    }
}

/// A parsed simple value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any string-like value, compared by code points
    String(String),
    /// boolean
    Boolean(bool),
    /// decimal and integers
    Decimal(Decimal),
    /// float and double
    Float(f64),
    /// Date and time types
    Temporal(Temporal),
    /// duration
    Duration(DurationValue),
    /// Decoded binary
    Binary(Vec<u8>),
}

impl Value {
    /// Order two values of the same family
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Temporal(a), Value::Temporal(b)) => {
                Some((a.seconds, a.nanos).cmp(&(b.seconds, b.nanos)))
            }
            (Value::Duration(a), Value::Duration(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Value-space equality, used by enumerations and identity constraints
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.compare(other) == Some(Ordering::Equal) || self == other,
        }
    }
}

fn is_language(value: &str) -> bool {
    let mut parts = value.split('-');
    let first_ok = parts
        .next()
        .map_or(false, |p| (1..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphabetic()));
    first_ok && parts.all(|p| (1..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphanumeric()))
}

fn is_uri_reference(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let ok = bytes.get(i + 1).map_or(false, u8::is_ascii_hexdigit)
                    && bytes.get(i + 2).map_or(false, u8::is_ascii_hexdigit);
                if !ok {
                    return false;
                }
                i += 3;
            }
            b'\t' | b'\n' | b'\r' => return false,
            _ => i += 1,
        }
    }
    true
}

/// Parse the XSD decimal lexical form
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut normalized = String::with_capacity(value.len() + 2);
    if value.starts_with('-') {
        normalized.push('-');
    }
    let int_part = int_part.trim_start_matches('0');
    normalized.push_str(if int_part.is_empty() { "0" } else { int_part });
    let frac_part = frac_part.trim_end_matches('0');
    if !frac_part.is_empty() {
        normalized.push('.');
        normalized.push_str(frac_part);
    }
    normalized.parse::<Decimal>().ok()
}

fn parse_integer(value: &str) -> Option<Decimal> {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    parse_decimal(value)
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let (mantissa, exponent) = match value.find(['e', 'E']) {
        Some(i) => (&value[..i], Some(&value[i + 1..])),
        None => (value, None),
    };
    parse_decimal(mantissa)?;
    if let Some(exp) = exponent {
        let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    value.parse::<f64>().ok()
}

fn parse_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(value.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Byte cursor used by the date/time and duration parsers
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Read a run of digits of exactly `n` (or at least `n` when `open`)
    fn digits(&mut self, n: usize, open: bool) -> Option<(i64, usize)> {
        let start = self.pos;
        while self.peek().map_or(false, |b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let len = self.pos - start;
        if len < n || (!open && len != n) || len > 18 {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        Some((text.parse().ok()?, len))
    }

    fn two(&mut self) -> Option<u32> {
        self.digits(2, false).map(|(v, _)| v as u32)
    }
}

fn parse_year(cursor: &mut Cursor<'_>) -> Option<i32> {
    let negative = cursor.eat(b'-');
    let start = cursor.pos;
    let (year, len) = cursor.digits(4, true)?;
    if len > 4 && cursor.bytes[start] == b'0' {
        return None;
    }
    if year == 0 {
        return None;
    }
    let year = i32::try_from(year).ok()?;
    // No year zero in XSD 1.0; chrono's proleptic calendar has one
    Some(if negative { 1 - year } else { year })
}

fn parse_time_of_day(cursor: &mut Cursor<'_>) -> Option<(u32, u32, u32, u32)> {
    let hour = cursor.two()?;
    if !cursor.eat(b':') {
        return None;
    }
    let minute = cursor.two()?;
    if !cursor.eat(b':') {
        return None;
    }
    let second = cursor.two()?;
    let mut nanos = 0u32;
    if cursor.eat(b'.') {
        let start = cursor.pos;
        while cursor.peek().map_or(false, |b| b.is_ascii_digit()) {
            cursor.pos += 1;
        }
        let frac = &cursor.bytes[start..cursor.pos];
        if frac.is_empty() {
            return None;
        }
        for (i, &d) in frac.iter().take(9).enumerate() {
            nanos += u32::from(d - b'0') * 10u32.pow(8 - i as u32);
        }
    }
    let valid = (hour < 24 && minute < 60 && second < 60)
        || (hour == 24 && minute == 0 && second == 0 && nanos == 0);
    valid.then_some((hour, minute, second, nanos))
}

fn parse_timezone(cursor: &mut Cursor<'_>) -> Option<Option<i32>> {
    if cursor.at_end() {
        return Some(None);
    }
    if cursor.eat(b'Z') {
        return cursor.at_end().then_some(Some(0));
    }
    let sign = match cursor.peek()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    cursor.pos += 1;
    let hours = cursor.two()? as i32;
    if !cursor.eat(b':') {
        return None;
    }
    let minutes = cursor.two()? as i32;
    if minutes > 59 || hours > 14 || (hours == 14 && minutes != 0) || !cursor.at_end() {
        return None;
    }
    Some(Some(sign * (hours * 60 + minutes)))
}

fn parse_temporal(kind: Builtin, value: &str) -> Option<Temporal> {
    let mut cursor = Cursor::new(value);
    let (mut year, mut month, mut day) = (2000, 1u32, 1u32);
    let mut time = (0u32, 0u32, 0u32, 0u32);
    match kind {
        Builtin::DateTime | Builtin::Date | Builtin::GYearMonth | Builtin::GYear => {
            year = parse_year(&mut cursor)?;
            if kind != Builtin::GYear {
                if !cursor.eat(b'-') {
                    return None;
                }
                month = cursor.two()?;
            }
            if matches!(kind, Builtin::DateTime | Builtin::Date) {
                if !cursor.eat(b'-') {
                    return None;
                }
                day = cursor.two()?;
            }
            if kind == Builtin::DateTime {
                if !cursor.eat(b'T') {
                    return None;
                }
                time = parse_time_of_day(&mut cursor)?;
            }
        }
        Builtin::Time => time = parse_time_of_day(&mut cursor)?,
        Builtin::GMonthDay | Builtin::GMonth => {
            if !(cursor.eat(b'-') && cursor.eat(b'-')) {
                return None;
            }
            month = cursor.two()?;
            if kind == Builtin::GMonthDay {
                if !cursor.eat(b'-') {
                    return None;
                }
                day = cursor.two()?;
            }
        }
        Builtin::GDay => {
            if !(cursor.eat(b'-') && cursor.eat(b'-') && cursor.eat(b'-')) {
                return None;
            }
            day = cursor.two()?;
        }
        _ => return None,
    }
    let timezone = parse_timezone(&mut cursor)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let (hour, minute, second, nanos) = time;
    let days = i64::from(date.num_days_from_ce());
    let seconds = days * 86_400
        + i64::from(hour) * 3600
        + i64::from(minute) * 60
        + i64::from(second)
        - i64::from(timezone.unwrap_or(0)) * 60;
    Some(Temporal {
        seconds,
        nanos,
        timezone,
    })
}

fn parse_duration(value: &str) -> Option<DurationValue> {
    let mut cursor = Cursor::new(value);
    let negative = cursor.eat(b'-');
    if !cursor.eat(b'P') {
        return None;
    }
    let mut months = 0i64;
    let mut seconds = Decimal::ZERO;
    let mut seen = false;
    let mut in_time = false;
    let mut time_seen = false;
    // Designators must appear in this order
    let date_units = [(b'Y', 12i64), (b'M', 1)];
    let mut next_date = 0;
    let mut next_time = 0;
    while !cursor.at_end() {
        if !in_time && cursor.eat(b'T') {
            in_time = true;
            continue;
        }
        let start = cursor.pos;
        let (number, _) = cursor.digits(1, true)?;
        let mut fraction = None;
        if cursor.eat(b'.') {
            while cursor.peek().map_or(false, |b| b.is_ascii_digit()) {
                cursor.pos += 1;
            }
            fraction = Some(std::str::from_utf8(&cursor.bytes[start..cursor.pos]).ok()?);
        }
        let unit = cursor.peek()?;
        cursor.pos += 1;
        seen = true;
        if in_time {
            time_seen = true;
            let order = match unit {
                b'H' => 0,
                b'M' => 1,
                b'S' => 2,
                _ => return None,
            };
            if order < next_time || (fraction.is_some() && unit != b'S') {
                return None;
            }
            next_time = order + 1;
            let amount = match fraction {
                Some(text) => parse_decimal(text)?,
                None => Decimal::from(number),
            };
            let factor = match unit {
                b'H' => 3600,
                b'M' => 60,
                _ => 1,
            };
            seconds += amount * Decimal::from(factor);
        } else {
            if fraction.is_some() {
                return None;
            }
            if unit == b'D' {
                if next_date > 2 {
                    return None;
                }
                next_date = 3;
                seconds += Decimal::from(number) * Decimal::from(86_400);
                continue;
            }
            let index = date_units.iter().position(|&(u, _)| u == unit)?;
            if index < next_date {
                return None;
            }
            next_date = index + 1;
            months += number * date_units[index].1;
        }
    }
    if !seen || (in_time && !time_seen) {
        return None;
    }
    if negative {
        months = -months;
        seconds = -seconds;
    }
    Some(DurationValue { months, seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(Builtin::from_local_name("int"), Some(Builtin::Int));
        assert_eq!(Builtin::from_qname(&QName::xsd("anyURI")), Some(Builtin::AnyUri));
        assert_eq!(Builtin::from_qname(&QName::local("int")), None);
        assert_eq!(Builtin::ALL[0], Builtin::AnyType);
    }

    #[test]
    fn test_hierarchy() {
        assert!(Builtin::UnsignedByte.derives_from(Builtin::Integer));
        assert!(Builtin::Id.derives_from(Builtin::String));
        assert!(!Builtin::Int.derives_from(Builtin::String));
        assert!(Builtin::String.derives_from(Builtin::AnyType));
        assert_eq!(Builtin::AnyType.base(), None);
    }

    #[test]
    fn test_whitespace_modes() {
        assert_eq!(Builtin::String.whitespace(), WhiteSpace::Preserve);
        assert_eq!(Builtin::NormalizedString.whitespace(), WhiteSpace::Replace);
        assert_eq!(Builtin::Int.whitespace(), WhiteSpace::Collapse);
    }

    #[test]
    fn test_numeric_lexical() {
        assert!(Builtin::Int.parse("42").is_ok());
        assert!(Builtin::Int.parse("+42").is_ok());
        assert!(Builtin::Int.parse("4.2").is_err());
        assert!(Builtin::Byte.parse("128").is_err());
        assert!(Builtin::UnsignedLong.parse("18446744073709551615").is_ok());
        assert!(Builtin::PositiveInteger.parse("0").is_err());
        assert!(Builtin::Decimal.parse("-.5").is_ok());
        assert!(Builtin::Decimal.parse("1.").is_ok());
        assert!(Builtin::Decimal.parse(".").is_err());
        assert!(Builtin::Double.parse("1.5E-3").is_ok());
        assert!(Builtin::Double.parse("-INF").is_ok());
        assert!(Builtin::Double.parse("inf").is_err());
        assert!(Builtin::Boolean.parse("yes").is_err());
    }

    #[test]
    fn test_integer_ranges() {
        assert!(Builtin::Long.parse("-9223372036854775808").is_ok());
        assert!(Builtin::Long.parse("9223372036854775808").is_err());
        assert!(Builtin::Short.parse("-32769").is_err());
        assert!(Builtin::UnsignedByte.parse("255").is_ok());
        assert!(Builtin::UnsignedByte.parse("-1").is_err());
        assert!(Builtin::NegativeInteger.parse("-1").is_ok());
        assert!(Builtin::NegativeInteger.parse("0").is_err());
        assert!(Builtin::NonPositiveInteger.parse("0").is_ok());
        assert!(Builtin::Integer.parse("-99999999999999999999").is_ok());
    }

    #[test]
    fn test_string_lexical() {
        assert!(Builtin::NCName.parse("a:b").is_err());
        assert!(Builtin::Name.parse("a:b").is_ok());
        assert!(Builtin::Language.parse("en-US").is_ok());
        assert!(Builtin::Language.parse("toolonglang").is_err());
        assert!(Builtin::NmTokens.parse("a b c").is_ok());
        assert!(Builtin::NmTokens.parse("").is_err());
        assert!(Builtin::QName.parse("p:local").is_ok());
        assert!(Builtin::AnyUri.parse("http://x/%zz").is_err());
    }

    #[test]
    fn test_temporal_lexical() {
        assert!(Builtin::Date.parse("2024-02-29").is_ok());
        assert!(Builtin::Date.parse("2023-02-29").is_err());
        assert!(Builtin::DateTime.parse("2024-01-01T24:00:00Z").is_ok());
        assert!(Builtin::DateTime.parse("2024-01-01T10:00:00+15:00").is_err());
        assert!(Builtin::Time.parse("13:20:00.5-05:00").is_ok());
        assert!(Builtin::GYear.parse("-0044").is_ok());
        assert!(Builtin::GYear.parse("0000").is_err());
        assert!(Builtin::GMonthDay.parse("--02-29").is_ok());
        assert!(Builtin::GDay.parse("---31").is_ok());
        assert!(Builtin::GMonth.parse("--13").is_err());
    }

    #[test]
    fn test_temporal_ordering() {
        let a = Builtin::DateTime.parse("2024-01-01T10:00:00Z").unwrap();
        let b = Builtin::DateTime.parse("2024-01-01T11:00:00+02:00").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Greater));
    }

    #[test]
    fn test_duration() {
        assert!(Builtin::Duration.parse("P1Y2M3DT4H5M6.5S").is_ok());
        assert!(Builtin::Duration.parse("-PT1S").is_ok());
        assert!(Builtin::Duration.parse("P").is_err());
        assert!(Builtin::Duration.parse("PT").is_err());
        assert!(Builtin::Duration.parse("P1M1Y").is_err());
        let one_month = Builtin::Duration.parse("P1M").unwrap();
        let thirty_days = Builtin::Duration.parse("P30D").unwrap();
        assert_eq!(one_month.compare(&thirty_days), None);
        let a = Builtin::Duration.parse("PT90M").unwrap();
        let b = Builtin::Duration.parse("PT1H").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Greater));
    }

    #[test]
    fn test_binary() {
        assert_eq!(Builtin::HexBinary.parse("0fA0").unwrap(), Value::Binary(vec![0x0f, 0xa0]));
        assert!(Builtin::HexBinary.parse("abc").is_err());
        assert_eq!(
            Builtin::Base64Binary.parse("aGk=").unwrap(),
            Value::Binary(b"hi".to_vec())
        );
    }

    #[test]
    fn test_value_equality() {
        let a = Builtin::Decimal.parse("1.0").unwrap();
        let b = Builtin::Decimal.parse("01").unwrap();
        assert!(a.same_value(&b));
        let nan = Builtin::Double.parse("NaN").unwrap();
        assert!(nan.same_value(&nan));
    }
}
