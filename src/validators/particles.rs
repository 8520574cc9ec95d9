//! XSD particles
//!
//! A particle is a term (element, element reference, wildcard, model group,
//! or group reference) together with its occurrence bounds. Bounds live on
//! the particle, never on the term.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cParticles

use crate::error::{Error, Result};
use crate::limits::CompileConfig;
use crate::namespaces::QName;

use super::groups::ModelGroup;
use super::wildcards::Wildcard;
use super::ElementKey;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if particle can have multiple occurrences
    pub fn is_multiple(&self) -> bool {
        !self.is_empty() && !self.is_single()
    }

    /// Check if the maximum is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl std::fmt::Display for Occurs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{{},{}}}", self.min, max),
            None => write!(f, "{{{},unbounded}}", self.min),
        }
    }
}

/// Parse one occurrence bound as an unbounded non-negative integer
fn parse_bound(name: &str, value: &str, config: &CompileConfig) -> Result<u32> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::structural(format!(
            "{} value '{}' is not a valid non-negative integer",
            name, value
        )));
    }
    // Anything that does not fit in 64 bits is far beyond any limit
    let parsed = value.parse::<u64>().unwrap_or(u64::MAX);
    config.check_occurs(parsed)
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(
    min_occurs: Option<&str>,
    max_occurs: Option<&str>,
    config: &CompileConfig,
) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = parse_bound("minOccurs", min_str, config)?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = parse_bound("maxOccurs", max_str, config)?;
            if occurs.min > max {
                return Err(Error::structural(format!(
                    "maxOccurs ({}) must be 'unbounded' or not less than minOccurs ({})",
                    max, occurs.min
                )));
            }
            occurs.max = Some(max);
        }
        None => {
            if occurs.min > 1 {
                return Err(Error::structural(
                    "minOccurs must be lesser or equal than maxOccurs",
                ));
            }
        }
    }

    Ok(occurs)
}

/// The term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A local element declaration
    Element(ElementKey),
    /// `<xs:element ref="…"/>`
    ElementRef(QName),
    /// `<xs:any/>`
    Wildcard(Wildcard),
    /// An inline sequence, choice, or all
    Group(ModelGroup),
    /// `<xs:group ref="…"/>`
    GroupRef(QName),
}

/// A term with occurrence bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// What occurs
    pub term: Term,
}

impl Particle {
    /// Create a particle
    pub fn new(occurs: Occurs, term: Term) -> Self {
        Self { occurs, term }
    }

    /// A particle that occurs exactly once
    pub fn once(term: Term) -> Self {
        Self::new(Occurs::once(), term)
    }

    /// Whether the particle can never match anything
    pub fn is_empty(&self) -> bool {
        if self.occurs.is_empty() {
            return true;
        }
        match &self.term {
            Term::Group(group) => group.particles.iter().all(Particle::is_empty),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::groups::Compositor;

    #[test]
    fn test_occurs_presets() {
        assert_eq!(Occurs::once(), Occurs::new(1, Some(1)));
        assert_eq!(Occurs::optional(), Occurs::new(0, Some(1)));
        assert_eq!(Occurs::zero_or_more(), Occurs::new(0, None));
    }

    #[test]
    fn test_occurs_predicates() {
        let optional = Occurs::optional();
        assert!(optional.is_emptiable());
        assert!(!optional.is_empty());
        assert!(optional.is_single());
        assert!(!optional.is_multiple());

        let unbounded = Occurs::zero_or_more();
        assert!(unbounded.is_unbounded());
        assert!(unbounded.is_multiple());

        assert!(Occurs::new(0, Some(0)).is_empty());
        assert_eq!(Occurs::new(2, None).to_string(), "{2,unbounded}");
    }

    #[test]
    fn test_parse_occurs_values() {
        let config = CompileConfig::default();
        assert_eq!(parse_occurs(None, None, &config).unwrap(), Occurs::once());
        assert_eq!(
            parse_occurs(Some("0"), Some("5"), &config).unwrap(),
            Occurs::new(0, Some(5))
        );
        assert_eq!(
            parse_occurs(Some("1"), Some("unbounded"), &config).unwrap(),
            Occurs::new(1, None)
        );
    }

    #[test]
    fn test_parse_occurs_errors() {
        let config = CompileConfig::default();
        assert!(parse_occurs(Some("abc"), None, &config).is_err());
        assert!(parse_occurs(None, Some("-1"), &config).is_err());
        assert!(parse_occurs(Some("5"), Some("3"), &config).is_err());
        assert!(parse_occurs(Some("5"), None, &config).is_err());
    }

    #[test]
    fn test_parse_occurs_limit() {
        let config = CompileConfig::default().with_max_occurs_limit(50);
        assert!(parse_occurs(Some("0"), Some("50"), &config).is_ok());
        assert!(matches!(
            parse_occurs(Some("0"), Some("51"), &config),
            Err(Error::OccursTooLarge { value: 51, limit: 50 })
        ));
        assert!(matches!(
            parse_occurs(None, Some("99999999999999999999999"), &config),
            Err(Error::OccursTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_particle() {
        let empty = Particle::new(
            Occurs::once(),
            Term::Group(ModelGroup::new(Compositor::Sequence)),
        );
        assert!(empty.is_empty());
        let zero = Particle::new(Occurs::new(0, Some(0)), Term::GroupRef(QName::local("g")));
        assert!(zero.is_empty());
    }
}
