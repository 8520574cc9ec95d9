//! XSD Wildcards
//!
//! - xs:any - allows any element from specified namespaces
//! - xs:anyAttribute - allows any attribute from specified namespaces
//!
//! Namespace constraints follow XSD 1.0: `##other` excludes both the
//! target namespace and "no namespace". Namespaces are kept as strings
//! with `""` standing for "absent".
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Wildcards

use serde::Serialize;

use crate::error::{Error, LoadError, Result};

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessContents {
    /// Validate strictly - element/attribute must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceConstraint {
    /// `##any`
    Any,
    /// `##other` in a schema with a target namespace: anything except that
    /// namespace and no namespace
    Other(String),
    /// A set of namespaces, sorted and deduplicated; `""` is no namespace
    Enumeration(Vec<String>),
    /// `##other` without a target namespace: any namespace at all
    NotAbsent,
}

impl Default for NamespaceConstraint {
    fn default() -> Self {
        Self::Any
    }
}

impl NamespaceConstraint {
    /// Create from a `namespace` attribute value
    pub fn parse(value: &str, target_namespace: &str) -> Result<Self> {
        let value = value.trim();
        match value {
            "##any" => Ok(Self::Any),
            "##other" if target_namespace.is_empty() => Ok(Self::NotAbsent),
            "##other" => Ok(Self::Other(target_namespace.to_string())),
            _ => {
                let mut namespaces = Vec::new();
                for ns in value.split_whitespace() {
                    match ns {
                        "##local" => namespaces.push(String::new()),
                        "##targetNamespace" => namespaces.push(target_namespace.to_string()),
                        s if s.starts_with("##") => {
                            return Err(Error::Load(LoadError::new(format!(
                                "wrong value '{}' in 'namespace' attribute",
                                s
                            ))));
                        }
                        uri => namespaces.push(uri.to_string()),
                    }
                }
                Ok(Self::enumeration(namespaces))
            }
        }
    }

    /// Build a normalized enumeration
    pub fn enumeration(mut namespaces: Vec<String>) -> Self {
        namespaces.sort();
        namespaces.dedup();
        Self::Enumeration(namespaces)
    }

    /// Check if a namespace (`""` = none) is allowed by this constraint
    pub fn allows(&self, namespace: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Other(target) => !namespace.is_empty() && namespace != target,
            Self::Enumeration(set) => set.binary_search_by(|ns| ns.as_str().cmp(namespace)).is_ok(),
            Self::NotAbsent => !namespace.is_empty(),
        }
    }

    /// Whether some namespace is allowed by both constraints
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Enumeration(set), other) | (other, Self::Enumeration(set)) => {
                set.iter().any(|ns| other.allows(ns))
            }
            // Every other form admits infinitely many namespaces and excludes
            // at most two
            _ => true,
        }
    }

    /// Union per XSD 1.0 attribute wildcard union; fails when the result
    /// is not expressible
    pub fn union(&self, other: &Self) -> Result<Self> {
        if self == other {
            return Ok(self.clone());
        }
        Ok(match (self, other) {
            (Self::Any, _) | (_, Self::Any) => Self::Any,
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::enumeration(a.iter().chain(b.iter()).cloned().collect())
            }
            (Self::Other(_), Self::Other(_))
            | (Self::Other(_), Self::NotAbsent)
            | (Self::NotAbsent, Self::Other(_))
            | (Self::NotAbsent, Self::NotAbsent) => Self::NotAbsent,
            (Self::Other(target), Self::Enumeration(set))
            | (Self::Enumeration(set), Self::Other(target)) => {
                let has_target = set.iter().any(|ns| ns == target);
                let has_absent = set.iter().any(String::is_empty);
                match (has_target, has_absent) {
                    (true, true) => Self::Any,
                    (true, false) => Self::NotAbsent,
                    (false, false) => Self::Other(target.clone()),
                    (false, true) => {
                        return Err(Error::structural(
                            "attribute wildcard union is not expressible",
                        ))
                    }
                }
            }
            (Self::NotAbsent, Self::Enumeration(set)) | (Self::Enumeration(set), Self::NotAbsent) => {
                if set.iter().any(String::is_empty) {
                    Self::Any
                } else {
                    Self::NotAbsent
                }
            }
        })
    }

    /// Intersection per XSD 1.0; fails when the result is not expressible
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        if self == other {
            return Ok(self.clone());
        }
        Ok(match (self, other) {
            (Self::Any, x) | (x, Self::Any) => x.clone(),
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::enumeration(a.iter().filter(|ns| b.contains(ns)).cloned().collect())
            }
            (Self::Enumeration(set), x) | (x, Self::Enumeration(set)) => {
                Self::enumeration(set.iter().filter(|ns| x.allows(ns)).cloned().collect())
            }
            (Self::NotAbsent, Self::Other(t)) | (Self::Other(t), Self::NotAbsent) => {
                Self::Other(t.clone())
            }
            (Self::Other(_), Self::Other(_)) | (Self::NotAbsent, Self::NotAbsent) => {
                return Err(Error::structural(
                    "attribute wildcard intersection is not expressible",
                ))
            }
        })
    }
}

/// A wildcard: namespace constraint plus process contents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Wildcard {
    /// Namespace constraint
    pub namespaces: NamespaceConstraint,
    /// Process contents mode
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a wildcard
    pub fn new(namespaces: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespaces,
            process_contents,
        }
    }

    /// Parse the `namespace` and `processContents` attributes
    pub fn parse(
        namespace: Option<&str>,
        process_contents: Option<&str>,
        target_namespace: &str,
    ) -> Result<Self> {
        let namespaces = match namespace {
            Some(value) => NamespaceConstraint::parse(value, target_namespace)?,
            None => NamespaceConstraint::Any,
        };
        let process_contents = match process_contents {
            Some(value) => ProcessContents::parse(value).ok_or_else(|| {
                Error::Load(LoadError::new(format!(
                    "wrong value '{}' in 'processContents' attribute",
                    value
                )))
            })?,
            None => ProcessContents::Strict,
        };
        Ok(Self::new(namespaces, process_contents))
    }

    /// Check if a namespace is allowed
    pub fn allows(&self, namespace: &str) -> bool {
        self.namespaces.allows(namespace)
    }

    /// Union of attribute wildcards on extension; process contents come
    /// from `self`, the local wildcard
    pub fn union(&self, base: &Wildcard) -> Result<Wildcard> {
        Ok(Wildcard::new(
            self.namespaces.union(&base.namespaces)?,
            self.process_contents,
        ))
    }

    /// Intersection with a wildcard from a referenced attribute group;
    /// process contents come from `self`
    pub fn intersection(&self, other: &Wildcard) -> Result<Wildcard> {
        Ok(Wildcard::new(
            self.namespaces.intersection(&other.namespaces)?,
            self.process_contents,
        ))
    }
}
