//! XSD attribute declarations and attribute uses

use crate::error::{Error, LoadError, Result};
use crate::namespaces::QName;

use super::elements::TypeUse;
use super::AttributeKey;

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeUse {
    /// Attribute is optional (default)
    #[default]
    Optional,
    /// Attribute is required
    Required,
    /// Attribute is prohibited
    Prohibited,
}

impl AttributeUse {
    /// Parse from string value
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "optional" => Ok(AttributeUse::Optional),
            "required" => Ok(AttributeUse::Required),
            "prohibited" => Ok(AttributeUse::Prohibited),
            _ => Err(Error::Load(LoadError::new(format!(
                "invalid attribute use value '{}'",
                s
            )))),
        }
    }

    /// Get the use as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeUse::Optional => "optional",
            AttributeUse::Required => "required",
            AttributeUse::Prohibited => "prohibited",
        }
    }
}

impl std::fmt::Display for AttributeUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Form for local element and attribute declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Form {
    /// Name is not qualified with the target namespace
    #[default]
    Unqualified,
    /// Name is qualified with the target namespace
    Qualified,
}

impl Form {
    /// Parse from string value
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "unqualified" => Ok(Form::Unqualified),
            "qualified" => Ok(Form::Qualified),
            _ => Err(Error::Load(LoadError::new(format!(
                "invalid form value '{}'",
                s
            )))),
        }
    }
}

/// Default or fixed value of an element or attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueConstraint {
    /// Supplied when absent
    Default(String),
    /// Supplied when absent and required to match when present
    Fixed(String),
}

impl ValueConstraint {
    /// Build from the `default` and `fixed` attributes; both at once is an
    /// error
    pub fn from_attrs(default: Option<&str>, fixed: Option<&str>) -> Result<Option<Self>> {
        match (default, fixed) {
            (Some(_), Some(_)) => Err(Error::Load(LoadError::new(
                "'default' and 'fixed' attributes are mutually exclusive",
            ))),
            (Some(d), None) => Ok(Some(Self::Default(d.to_string()))),
            (None, Some(f)) => Ok(Some(Self::Fixed(f.to_string()))),
            (None, None) => Ok(None),
        }
    }

    /// The constrained value
    pub fn value(&self) -> &str {
        match self {
            Self::Default(v) | Self::Fixed(v) => v,
        }
    }

    /// Whether this is a fixed value
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

/// An attribute declaration, global or local
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    /// Attribute name
    pub name: QName,
    /// Simple type of the value
    pub type_use: TypeUse,
    /// Declaration-level default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// Declared at schema level
    pub global: bool,
    /// Source line
    pub line: usize,
}

/// Where an attribute use takes its declaration from
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeTarget {
    /// A local declaration
    Local(AttributeKey),
    /// `<xs:attribute ref="…"/>`
    Ref(QName),
}

/// One attribute use inside a complex type or attribute group
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUseDef {
    /// The declaration
    pub target: AttributeTarget,
    /// optional / required / prohibited
    pub use_: AttributeUse,
    /// Use-level default or fixed value, overriding the declaration's
    pub value_constraint: Option<ValueConstraint>,
}

/// Member of an attribute list
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeItem {
    /// An attribute use
    Use(AttributeUseDef),
    /// `<xs:attributeGroup ref="…"/>`
    GroupRef(QName),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_use_parse() {
        assert_eq!(AttributeUse::parse("required").unwrap(), AttributeUse::Required);
        assert_eq!(AttributeUse::parse(" prohibited ").unwrap(), AttributeUse::Prohibited);
        assert!(AttributeUse::parse("sometimes").is_err());
        assert_eq!(AttributeUse::Optional.to_string(), "optional");
    }

    #[test]
    fn test_value_constraint() {
        assert_eq!(ValueConstraint::from_attrs(None, None).unwrap(), None);
        let fixed = ValueConstraint::from_attrs(None, Some("1")).unwrap().unwrap();
        assert!(fixed.is_fixed());
        assert_eq!(fixed.value(), "1");
        assert!(ValueConstraint::from_attrs(Some("a"), Some("b")).is_err());
    }

    #[test]
    fn test_form_parse() {
        assert_eq!(Form::parse("qualified").unwrap(), Form::Qualified);
        assert!(Form::parse("maybe").is_err());
    }
}
