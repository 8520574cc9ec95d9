//! XSD Model Groups
//!
//! - xs:sequence - ordered content
//! - xs:choice - alternative content
//! - xs:all - unordered content, elements only, each at most once
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Model_Groups

use crate::namespaces::QName;

use super::attributes::AttributeItem;
use super::particles::{Particle, Term};
use super::wildcards::Wildcard;

/// Model group compositor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compositor {
    /// Ordered sequence of particles
    #[default]
    Sequence,
    /// One of multiple alternatives
    Choice,
    /// Unordered set of element particles
    All,
}

impl Compositor {
    /// Parse from an XSD element local name
    pub fn from_local_name(local: &str) -> Option<Self> {
        match local {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A sequence, choice, or all group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Member particles in document order
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create an empty group
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            particles: Vec::new(),
        }
    }

    /// Append a particle
    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    /// Number of direct members
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Whether the group has no members
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Whether an `xs:all` group appears anywhere below this group
    pub fn contains_all(&self) -> bool {
        let mut stack: Vec<&ModelGroup> = vec![self];
        while let Some(group) = stack.pop() {
            for particle in &group.particles {
                if let Term::Group(inner) = &particle.term {
                    if inner.compositor == Compositor::All {
                        return true;
                    }
                    stack.push(inner);
                }
            }
        }
        false
    }
}

/// A named `xs:group` definition
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDef {
    /// Group name
    pub name: QName,
    /// The single model group it wraps
    pub group: ModelGroup,
    /// Source line
    pub line: usize,
}

/// A named `xs:attributeGroup` definition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroupDef {
    /// Group name
    pub name: QName,
    /// Attribute uses and nested group references in document order
    pub attributes: Vec<AttributeItem>,
    /// Attribute wildcard
    pub any_attribute: Option<Wildcard>,
    /// Source line
    pub line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::particles::Occurs;

    #[test]
    fn test_compositor_names() {
        assert_eq!(Compositor::from_local_name("choice"), Some(Compositor::Choice));
        assert_eq!(Compositor::from_local_name("element"), None);
        assert_eq!(Compositor::All.to_string(), "all");
    }

    #[test]
    fn test_contains_all() {
        let mut outer = ModelGroup::new(Compositor::Sequence);
        assert!(!outer.contains_all());
        let mut middle = ModelGroup::new(Compositor::Choice);
        middle.push(Particle::once(Term::Group(ModelGroup::new(Compositor::All))));
        outer.push(Particle::new(Occurs::optional(), Term::Group(middle)));
        assert!(outer.contains_all());
        assert_eq!(outer.len(), 1);
    }
}
