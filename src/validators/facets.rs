//! XSD constraining facets
//!
//! Facets are collected from `xs:restriction` as [`FacetSpec`]s by the
//! parser and folded into a [`FacetSet`] when the text validator of a
//! simple type is built. Pattern facets are translated from the XSD regular
//! expression dialect into the `regex` crate's dialect.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::error::{Error, LoadError, Result};

use super::builtins::{Builtin, Value, ValueKind};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(Error::Load(LoadError::new(format!(
                "invalid whiteSpace value '{}'",
                s
            )))),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => {
                let mut result = String::with_capacity(s.len());
                for word in s.split([' ', '\t', '\n', '\r']).filter(|w| !w.is_empty()) {
                    if !result.is_empty() {
                        result.push(' ');
                    }
                    result.push_str(word);
                }
                result
            }
        }
    }
}

/// Constraining facet kinds of XSD 1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    /// `xs:length`
    Length,
    /// `xs:minLength`
    MinLength,
    /// `xs:maxLength`
    MaxLength,
    /// `xs:pattern`
    Pattern,
    /// `xs:enumeration`
    Enumeration,
    /// `xs:whiteSpace`
    WhiteSpace,
    /// `xs:minInclusive`
    MinInclusive,
    /// `xs:maxInclusive`
    MaxInclusive,
    /// `xs:minExclusive`
    MinExclusive,
    /// `xs:maxExclusive`
    MaxExclusive,
    /// `xs:totalDigits`
    TotalDigits,
    /// `xs:fractionDigits`
    FractionDigits,
}

impl FacetKind {
    /// Parse from an XSD element local name
    pub fn from_local_name(local: &str) -> Option<Self> {
        Some(match local {
            "length" => Self::Length,
            "minLength" => Self::MinLength,
            "maxLength" => Self::MaxLength,
            "pattern" => Self::Pattern,
            "enumeration" => Self::Enumeration,
            "whiteSpace" => Self::WhiteSpace,
            "minInclusive" => Self::MinInclusive,
            "maxInclusive" => Self::MaxInclusive,
            "minExclusive" => Self::MinExclusive,
            "maxExclusive" => Self::MaxExclusive,
            "totalDigits" => Self::TotalDigits,
            "fractionDigits" => Self::FractionDigits,
            _ => return None,
        })
    }

    /// XSD element local name
    pub fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::Enumeration => "enumeration",
            Self::WhiteSpace => "whiteSpace",
            Self::MinInclusive => "minInclusive",
            Self::MaxInclusive => "maxInclusive",
            Self::MinExclusive => "minExclusive",
            Self::MaxExclusive => "maxExclusive",
            Self::TotalDigits => "totalDigits",
            Self::FractionDigits => "fractionDigits",
        }
    }

    /// Whether the facet may restrict a type of the given family.
    /// `list` selects the list-variety rules.
    pub fn applies_to(self, kind: ValueKind, list: bool) -> bool {
        use FacetKind::*;
        match self {
            Pattern | Enumeration | WhiteSpace => true,
            Length | MinLength | MaxLength => {
                list || matches!(
                    kind,
                    ValueKind::String
                        | ValueKind::Binary
                        | ValueKind::Uri
                        | ValueKind::QName
                        | ValueKind::Any
                )
            }
            _ if list => false,
            MinInclusive | MaxInclusive | MinExclusive | MaxExclusive => matches!(
                kind,
                ValueKind::Decimal | ValueKind::Float | ValueKind::Temporal | ValueKind::Duration
            ),
            TotalDigits | FractionDigits => kind == ValueKind::Decimal,
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A facet as written in the schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetSpec {
    /// Facet kind
    pub kind: FacetKind,
    /// The `value` attribute
    pub value: String,
    /// `fixed="true"`
    pub fixed: bool,
}

impl FacetSpec {
    /// Create a facet specification
    pub fn new(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: false,
        }
    }
}

/// Patterns of one derivation step; a value must match one of them
#[derive(Debug, Clone)]
pub struct PatternStep {
    /// Source patterns in XSD syntax
    pub sources: Vec<String>,
    regex: Regex,
}

impl PatternStep {
    fn new(sources: Vec<String>) -> Result<Self> {
        let mut translated = Vec::with_capacity(sources.len());
        for source in &sources {
            let rust = translate_pattern(source).map_err(|message| {
                Error::Load(LoadError::new(format!(
                    "invalid pattern '{}': {}",
                    source, message
                )))
            })?;
            translated.push(format!("(?:{})", rust));
        }
        let anchored = format!("^(?:{})$", translated.join("|"));
        let regex = Regex::new(&anchored).map_err(|e| {
            Error::Load(LoadError::new(format!(
                "invalid pattern '{}': {}",
                sources.join("|"),
                e
            )))
        })?;
        Ok(Self { sources, regex })
    }

    /// Whether the value matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// The effective facets of a simple type, accumulated along its
/// restriction chain
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    /// Exact length
    pub length: Option<usize>,
    /// Minimum length
    pub min_length: Option<usize>,
    /// Maximum length
    pub max_length: Option<usize>,
    /// Pattern steps, all of which must match
    pub patterns: Vec<PatternStep>,
    /// Allowed values, lexical form and parsed value
    pub enumeration: Option<Vec<(String, Option<Value>)>>,
    /// Inclusive lower bound
    pub min_inclusive: Option<Value>,
    /// Inclusive upper bound
    pub max_inclusive: Option<Value>,
    /// Exclusive lower bound
    pub min_exclusive: Option<Value>,
    /// Exclusive upper bound
    pub max_exclusive: Option<Value>,
    /// Maximum number of digits
    pub total_digits: Option<u32>,
    /// Maximum number of fraction digits
    pub fraction_digits: Option<u32>,
    /// Every facet applied so far, in derivation order
    pub sources: Vec<FacetSpec>,
    fixed: Vec<(FacetKind, String)>,
}

impl FacetSet {
    /// Whether no facet constrains the value
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Derive a new set by applying one restriction step.
    ///
    /// `parse` turns a facet's lexical value into a value of the base type
    /// (`None` for list and union varieties, where values compare as
    /// strings).
    pub fn restrict<F>(
        &self,
        facets: &[FacetSpec],
        kind: ValueKind,
        list: bool,
        parse: F,
    ) -> Result<FacetSet>
    where
        F: Fn(&str) -> std::result::Result<Option<Value>, String>,
    {
        let mut derived = self.clone();
        let mut patterns = Vec::new();
        let mut enumeration = Vec::new();
        for facet in facets {
            if facet.kind == FacetKind::WhiteSpace {
                derived.sources.push(facet.clone());
                continue;
            }
            if !facet.kind.applies_to(kind, list) {
                return Err(Error::derivation(format!(
                    "facet {} is not applicable to this base type",
                    facet.kind
                )));
            }
            if let Some((_, value)) = self.fixed.iter().find(|(k, _)| *k == facet.kind) {
                if value != &facet.value {
                    return Err(Error::derivation(format!(
                        "facet {} is fixed to '{}' in the base type",
                        facet.kind, value
                    )));
                }
            }
            let bound = |facet: &FacetSpec| -> Result<Value> {
                parse(&facet.value)
                    .map_err(|message| Error::Load(LoadError::new(message)))?
                    .ok_or_else(|| Error::derivation(format!("facet {} needs an ordered base", facet.kind)))
            };
            match facet.kind {
                FacetKind::Length => {
                    let n = parse_count(facet)?;
                    narrow(self.length.map_or(true, |base| base == n), facet)?;
                    derived.length = Some(n);
                }
                FacetKind::MinLength => {
                    let n = parse_count(facet)?;
                    narrow(self.min_length.map_or(true, |base| n >= base), facet)?;
                    derived.min_length = Some(n);
                }
                FacetKind::MaxLength => {
                    let n = parse_count(facet)?;
                    narrow(self.max_length.map_or(true, |base| n <= base), facet)?;
                    derived.max_length = Some(n);
                }
                FacetKind::Pattern => patterns.push(facet.value.clone()),
                FacetKind::Enumeration => {
                    let value = parse(&facet.value)
                        .map_err(|message| Error::Load(LoadError::new(message)))?;
                    enumeration.push((facet.value.clone(), value));
                }
                FacetKind::MinInclusive => {
                    let value = bound(facet)?;
                    narrow(not_below(&self.min_inclusive, &value, true), facet)?;
                    derived.min_inclusive = Some(value);
                }
                FacetKind::MinExclusive => {
                    let value = bound(facet)?;
                    narrow(not_below(&self.min_exclusive, &value, true), facet)?;
                    derived.min_exclusive = Some(value);
                }
                FacetKind::MaxInclusive => {
                    let value = bound(facet)?;
                    narrow(not_below(&self.max_inclusive, &value, false), facet)?;
                    derived.max_inclusive = Some(value);
                }
                FacetKind::MaxExclusive => {
                    let value = bound(facet)?;
                    narrow(not_below(&self.max_exclusive, &value, false), facet)?;
                    derived.max_exclusive = Some(value);
                }
                FacetKind::TotalDigits => {
                    let n = parse_count(facet)? as u32;
                    if n == 0 {
                        return Err(Error::Load(LoadError::new("totalDigits must be positive")));
                    }
                    narrow(self.total_digits.map_or(true, |base| n <= base), facet)?;
                    derived.total_digits = Some(n);
                }
                FacetKind::FractionDigits => {
                    let n = parse_count(facet)? as u32;
                    narrow(self.fraction_digits.map_or(true, |base| n <= base), facet)?;
                    derived.fraction_digits = Some(n);
                }
                FacetKind::WhiteSpace => {}
            }
            if facet.fixed {
                derived.fixed.push((facet.kind, facet.value.clone()));
            }
            derived.sources.push(facet.clone());
        }
        if let (Some(lo), Some(hi)) = (derived.min_length, derived.max_length) {
            if lo > hi {
                return Err(Error::derivation("minLength is greater than maxLength"));
            }
        }
        if derived.min_inclusive.is_some() && derived.min_exclusive.is_some() {
            return Err(Error::derivation(
                "minInclusive and minExclusive cannot both be specified",
            ));
        }
        if derived.max_inclusive.is_some() && derived.max_exclusive.is_some() {
            return Err(Error::derivation(
                "maxInclusive and maxExclusive cannot both be specified",
            ));
        }
        if !patterns.is_empty() {
            derived.patterns.push(PatternStep::new(patterns)?);
        }
        if !enumeration.is_empty() {
            derived.enumeration = Some(enumeration);
        }
        Ok(derived)
    }

    /// Check a normalized value. `value` is the parsed atomic value when
    /// there is one; `length` is the facet-relevant length when length
    /// facets apply.
    pub fn check(
        &self,
        normalized: &str,
        value: Option<&Value>,
        length: Option<usize>,
    ) -> std::result::Result<(), String> {
        if let Some(len) = length {
            if let Some(n) = self.length {
                if len != n {
                    return Err(format!("length {} differs from the required {}", len, n));
                }
            }
            if let Some(n) = self.min_length {
                if len < n {
                    return Err(format!("length {} is less than minLength {}", len, n));
                }
            }
            if let Some(n) = self.max_length {
                if len > n {
                    return Err(format!("length {} is greater than maxLength {}", len, n));
                }
            }
        }
        for step in &self.patterns {
            if !step.is_match(normalized) {
                return Err(format!(
                    "'{}' does not match pattern '{}'",
                    normalized,
                    step.sources.join("|")
                ));
            }
        }
        if let Some(allowed) = &self.enumeration {
            let found = allowed.iter().any(|(lexical, parsed)| match (value, parsed) {
                (Some(v), Some(p)) => v.same_value(p),
                _ => lexical == normalized,
            });
            if !found {
                return Err(format!("'{}' is not one of the enumerated values", normalized));
            }
        }
        if let Some(v) = value {
            let outside = |bound: &Option<Value>, reject: &[Ordering]| {
                bound
                    .as_ref()
                    .map_or(false, |b| v.compare(b).map_or(true, |o| reject.contains(&o)))
            };
            if outside(&self.min_inclusive, &[Ordering::Less]) {
                return Err(format!("'{}' is less than minInclusive", normalized));
            }
            if outside(&self.min_exclusive, &[Ordering::Less, Ordering::Equal]) {
                return Err(format!("'{}' is not greater than minExclusive", normalized));
            }
            if outside(&self.max_inclusive, &[Ordering::Greater]) {
                return Err(format!("'{}' is greater than maxInclusive", normalized));
            }
            if outside(&self.max_exclusive, &[Ordering::Greater, Ordering::Equal]) {
                return Err(format!("'{}' is not less than maxExclusive", normalized));
            }
            if let Value::Decimal(d) = v {
                let (total, fraction) = decimal_digits(normalized);
                if let Some(n) = self.total_digits {
                    if total > n as usize {
                        return Err(format!("{} has more than {} digits", d, n));
                    }
                }
                if let Some(n) = self.fraction_digits {
                    if fraction > n as usize {
                        return Err(format!("{} has more than {} fraction digits", d, n));
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_count(facet: &FacetSpec) -> Result<usize> {
    facet.value.trim().parse::<usize>().map_err(|_| {
        Error::Load(LoadError::new(format!(
            "facet {} needs a non-negative integer, got '{}'",
            facet.kind, facet.value
        )))
    })
}

fn narrow(ok: bool, facet: &FacetSpec) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::derivation(format!(
            "facet {}='{}' widens the base type",
            facet.kind, facet.value
        )))
    }
}

/// For lower bounds (`lower`), the derived bound must not be below the
/// base's; for upper bounds, not above it
fn not_below(base: &Option<Value>, derived: &Value, lower: bool) -> bool {
    match base.as_ref().and_then(|b| derived.compare(b)) {
        Some(Ordering::Less) => !lower,
        Some(Ordering::Greater) => lower,
        _ => true,
    }
}

/// Significant total digits and fraction digits of a decimal lexical
fn decimal_digits(lexical: &str) -> (usize, usize) {
    let unsigned = lexical.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    let total = (int_part.len() + frac_part.len()).max(1);
    (total, frac_part.len())
}

/// Translate an XSD regular expression into the `regex` crate's syntax,
/// without anchors
pub fn translate_pattern(xsd: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = xsd.chars().collect();
    let mut out = String::with_capacity(xsd.len() + 8);
    let mut class_depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let in_class = class_depth > 0;
        match c {
            '\\' => {
                let escaped = *chars.get(i + 1).ok_or("trailing backslash")?;
                i += 1;
                match escaped {
                    'i' | 'I' | 'c' | 'C' => {
                        return Err(format!("\\{} escapes are not supported", escaped))
                    }
                    'p' | 'P' => {
                        let start = i + 1;
                        if chars.get(start) != Some(&'{') {
                            return Err("malformed category escape".into());
                        }
                        let end = chars[start..]
                            .iter()
                            .position(|&ch| ch == '}')
                            .map(|p| start + p)
                            .ok_or("unterminated category escape")?;
                        let name: String = chars[start + 1..end].iter().collect();
                        if name.starts_with("Is") {
                            return Err(format!("block escape \\p{{{}}} is not supported", name));
                        }
                        out.push('\\');
                        out.push(escaped);
                        out.push('{');
                        out.push_str(&name);
                        out.push('}');
                        i = end;
                    }
                    'd' => out.push_str(r"\p{Nd}"),
                    'D' => out.push_str(r"\P{Nd}"),
                    's' if in_class => out.push_str(r"\x20\t\n\r"),
                    's' => out.push_str(r"[\x20\t\n\r]"),
                    'S' => out.push_str(r"[^\x20\t\n\r]"),
                    'w' => out.push_str(r"[^\p{P}\p{Z}\p{C}]"),
                    'W' => out.push_str(r"[\p{P}\p{Z}\p{C}]"),
                    'n' | 'r' | 't' => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    '\\' | '|' | '.' | '-' | '^' | '?' | '*' | '+' | '{' | '}' | '(' | ')'
                    | '[' | ']' | '$' => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    other => return Err(format!("invalid escape \\{}", other)),
                }
            }
            '[' if in_class => {
                if out.ends_with('-') && chars.get(i.wrapping_sub(1)) == Some(&'-') {
                    // class subtraction: `[a-z-[aeiou]]`
                    out.push_str("-[");
                    class_depth += 1;
                } else {
                    out.push_str(r"\[");
                }
            }
            '[' => {
                out.push('[');
                class_depth += 1;
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
            }
            ']' if in_class => {
                out.push(']');
                class_depth -= 1;
            }
            '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
            }
            '.' if !in_class => out.push_str(r"[^\n\r]"),
            '^' | '$' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            '(' if !in_class && chars.get(i + 1) == Some(&'?') => {
                return Err("'(?' is not valid in XSD patterns".into());
            }
            _ => out.push(c),
        }
        i += 1;
    }
    if class_depth > 0 {
        return Err("unterminated character class".into());
    }
    Ok(out)
}

/// Parse a facet value with a built-in's lexical rules after white-space
/// normalization
pub fn parse_with_builtin(builtin: Builtin, lexical: &str) -> std::result::Result<Option<Value>, String> {
    let normalized = builtin.whitespace().normalize(lexical);
    builtin.parse(&normalized).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facets(items: &[(FacetKind, &str)]) -> Vec<FacetSpec> {
        items.iter().map(|(k, v)| FacetSpec::new(*k, *v)).collect()
    }

    fn decimal_set(items: &[(FacetKind, &str)]) -> Result<FacetSet> {
        FacetSet::default().restrict(&facets(items), ValueKind::Decimal, false, |v| {
            parse_with_builtin(Builtin::Decimal, v)
        })
    }

    fn string_set(items: &[(FacetKind, &str)]) -> Result<FacetSet> {
        FacetSet::default().restrict(&facets(items), ValueKind::String, false, |v| {
            parse_with_builtin(Builtin::String, v)
        })
    }

    #[test]
    fn test_whitespace_modes() {
        assert_eq!(WhiteSpace::parse("preserve").unwrap(), WhiteSpace::Preserve);
        assert_eq!(WhiteSpace::parse("collapse").unwrap(), WhiteSpace::Collapse);
        assert!(WhiteSpace::parse("invalid").is_err());
    }

    #[test]
    fn test_whitespace_normalize() {
        let text = "  hello\t\nworld  ";
        assert_eq!(WhiteSpace::Preserve.normalize(text), text);
        assert_eq!(WhiteSpace::Replace.normalize(text), "  hello  world  ");
        assert_eq!(WhiteSpace::Collapse.normalize(text), "hello world");
    }

    #[test]
    fn test_length_facets() {
        let set = string_set(&[(FacetKind::MinLength, "2"), (FacetKind::MaxLength, "4")]).unwrap();
        assert!(set.check("abc", None, Some(3)).is_ok());
        assert!(set.check("a", None, Some(1)).is_err());
        assert!(set.check("abcde", None, Some(5)).is_err());
        assert!(string_set(&[(FacetKind::MinLength, "5"), (FacetKind::MaxLength, "4")]).is_err());
    }

    #[test]
    fn test_length_cannot_widen() {
        let base = string_set(&[(FacetKind::MaxLength, "4")]).unwrap();
        let widened = base.restrict(
            &facets(&[(FacetKind::MaxLength, "8")]),
            ValueKind::String,
            false,
            |v| parse_with_builtin(Builtin::String, v),
        );
        assert!(matches!(widened, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_numeric_bounds() {
        let set = decimal_set(&[
            (FacetKind::MinInclusive, "10"),
            (FacetKind::MaxExclusive, "100.5"),
        ])
        .unwrap();
        let check = |s: &str| {
            let value = Builtin::Decimal.parse(s).unwrap();
            set.check(s, Some(&value), None)
        };
        assert!(check("10").is_ok());
        assert!(check("100.4").is_ok());
        assert!(check("9.99").is_err());
        assert!(check("100.5").is_err());
    }

    #[test]
    fn test_digits() {
        let set = decimal_set(&[(FacetKind::TotalDigits, "5"), (FacetKind::FractionDigits, "2")])
            .unwrap();
        let check = |s: &str| {
            let value = Builtin::Decimal.parse(s).unwrap();
            set.check(s, Some(&value), None)
        };
        assert!(check("123.45").is_ok());
        assert!(check("0123.40").is_ok());
        assert!(check("1234.56").is_err());
        assert!(check("1.234").is_err());
    }

    #[test]
    fn test_enumeration_by_value() {
        let set = decimal_set(&[(FacetKind::Enumeration, "1.0"), (FacetKind::Enumeration, "2")])
            .unwrap();
        let one = Builtin::Decimal.parse("1").unwrap();
        assert!(set.check("1", Some(&one), None).is_ok());
        let three = Builtin::Decimal.parse("3").unwrap();
        assert!(set.check("3", Some(&three), None).is_err());
    }

    #[test]
    fn test_inapplicable_facet() {
        let result = FacetSet::default().restrict(
            &facets(&[(FacetKind::TotalDigits, "3")]),
            ValueKind::String,
            false,
            |v| parse_with_builtin(Builtin::String, v),
        );
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_fixed_facet() {
        let mut facet = FacetSpec::new(FacetKind::MaxLength, "4");
        facet.fixed = true;
        let base = FacetSet::default()
            .restrict(&[facet], ValueKind::String, false, |v| {
                parse_with_builtin(Builtin::String, v)
            })
            .unwrap();
        let result = base.restrict(
            &facets(&[(FacetKind::MaxLength, "3")]),
            ValueKind::String,
            false,
            |v| parse_with_builtin(Builtin::String, v),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_steps() {
        let set = string_set(&[(FacetKind::Pattern, r"\d{3}"), (FacetKind::Pattern, "[a-z]+")])
            .unwrap();
        assert!(set.check("123", None, None).is_ok());
        assert!(set.check("abc", None, None).is_ok());
        assert!(set.check("12a", None, None).is_err());
        let derived = set
            .restrict(&facets(&[(FacetKind::Pattern, "a.*")]), ValueKind::String, false, |v| {
                parse_with_builtin(Builtin::String, v)
            })
            .unwrap();
        assert!(derived.check("abc", None, None).is_ok());
        assert!(derived.check("bcd", None, None).is_err());
    }

    #[test]
    fn test_translate_pattern() {
        assert_eq!(translate_pattern("a.b").unwrap(), r"a[^\n\r]b");
        assert_eq!(translate_pattern("^$").unwrap(), r"\^\$");
        assert_eq!(translate_pattern("[a-z-[aeiou]]").unwrap(), "[a-z--[aeiou]]");
        assert_eq!(translate_pattern("[&~]").unwrap(), r"[\&\~]");
        assert!(translate_pattern(r"\i\c*").is_err());
        assert!(translate_pattern(r"\p{IsBasicLatin}").is_err());
        assert!(translate_pattern(r"\p{Lu}").is_ok());
        assert!(translate_pattern("[abc").is_err());
    }

    #[test]
    fn test_class_subtraction_matches() {
        let set = string_set(&[(FacetKind::Pattern, "[a-z-[aeiou]]+")]).unwrap();
        assert!(set.check("xyz", None, None).is_ok());
        assert!(set.check("xaz", None, None).is_err());
    }
}
