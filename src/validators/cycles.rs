//! Cycle detection
//!
//! One depth-first search, parameterized by a neighbor function, runs over
//! four graphs: types by base, named groups by reference, attribute groups
//! by reference, and substitution groups by head. The search is iterative
//! and returns the post-order of the visited nodes, so callers can process
//! bases before the types derived from them.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::namespaces::QName;

use super::attributes::AttributeItem;
use super::complex_types::ComplexContent;
use super::globals::{ParsedSchema, TypeDef};
use super::particles::Term;
use super::resolver::{Resolution, TypeRef};
use super::{AttributeGroupKey, ElementKey, GroupKey, TypeKey};

/// What to do with an edge whose target does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Drop the edge
    Ignore,
    /// Fail the search
    Error,
}

/// An outgoing edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge<N> {
    /// To an existing node
    To(N),
    /// To a name with no declaration
    Missing(QName),
}

/// How a search ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleFault<N> {
    /// `N` was reached again while still on the search path
    Cycle(N),
    /// A missing target under [`MissingPolicy::Error`]
    Missing(QName),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Open,
    Done,
}

/// Depth-first search from `roots` in order. Returns every reached node in
/// post-order (targets before sources), or the first fault.
pub fn depth_first<N, F>(
    roots: impl IntoIterator<Item = N>,
    mut neighbors: F,
    policy: MissingPolicy,
) -> std::result::Result<Vec<N>, CycleFault<N>>
where
    N: Copy + Eq + Hash,
    F: FnMut(N) -> Vec<Edge<N>>,
{
    let mut colors: HashMap<N, Color> = HashMap::new();
    let mut order = Vec::new();
    for root in roots {
        if colors.contains_key(&root) {
            continue;
        }
        colors.insert(root, Color::Open);
        let mut stack: Vec<(N, std::vec::IntoIter<Edge<N>>)> =
            vec![(root, neighbors(root).into_iter())];
        while let Some((node, edges)) = stack.last_mut() {
            let node = *node;
            match edges.next() {
                Some(Edge::To(next)) => match colors.get(&next) {
                    Some(Color::Open) => return Err(CycleFault::Cycle(next)),
                    Some(Color::Done) => {}
                    None => {
                        colors.insert(next, Color::Open);
                        let edges = neighbors(next).into_iter();
                        stack.push((next, edges));
                    }
                },
                Some(Edge::Missing(name)) => {
                    if policy == MissingPolicy::Error {
                        return Err(CycleFault::Missing(name));
                    }
                }
                None => {
                    colors.insert(node, Color::Done);
                    order.push(node);
                    stack.pop();
                }
            }
        }
    }
    Ok(order)
}

fn type_name(schema: &ParsedSchema, key: TypeKey) -> String {
    schema.type_def(key).display_name()
}

/// Types reachable by `base`, `itemType`, `memberTypes`, or an inline
/// simpleContent type; built-ins end the chain
fn type_edges(schema: &ParsedSchema, resolution: &Resolution, key: TypeKey) -> Vec<Edge<TypeKey>> {
    let mut edges = Vec::new();
    let mut push = |edge: Option<TypeRef>| {
        if let Some(TypeRef::User(target)) = edge {
            edges.push(Edge::To(target));
        }
    };
    match schema.type_def(key) {
        TypeDef::Simple(simple) => {
            for dependency in simple.dependencies() {
                push(resolution.type_use(dependency).ok().flatten());
            }
        }
        TypeDef::Complex(complex) => {
            if let Some(base) = &complex.base {
                push(resolution.type_ref(base).ok());
            }
            if let ComplexContent::Simple { inline: Some(inline), .. } = &complex.content {
                push(Some(TypeRef::User(*inline)));
            }
        }
    }
    edges
}

/// Check the type derivation graph; returns every type with its bases first
pub fn check_type_cycles(schema: &ParsedSchema, resolution: &Resolution) -> Result<Vec<TypeKey>> {
    let roots = (0..schema.types.len()).map(TypeKey::from_index);
    depth_first(roots, |key| type_edges(schema, resolution, key), MissingPolicy::Ignore).map_err(
        |fault| match fault {
            CycleFault::Cycle(key) => Error::derivation(format!(
                "circular derivation of type '{}'",
                type_name(schema, key)
            )),
            CycleFault::Missing(name) => Error::structural(format!("missing base type '{}'", name)),
        },
    )
}

fn group_edges(schema: &ParsedSchema, key: GroupKey) -> Vec<Edge<GroupKey>> {
    let mut edges = Vec::new();
    let mut stack: Vec<_> = schema.group(key).group.particles.iter().collect();
    while let Some(particle) = stack.pop() {
        match &particle.term {
            Term::GroupRef(name) => match schema.global_groups.get(name) {
                Some(target) => edges.push(Edge::To(*target)),
                None => edges.push(Edge::Missing(name.clone())),
            },
            Term::Group(group) => stack.extend(group.particles.iter().rev()),
            _ => {}
        }
    }
    edges
}

/// Check that named groups do not contain themselves
pub fn check_group_cycles(schema: &ParsedSchema) -> Result<()> {
    let roots = (0..schema.groups.len()).map(GroupKey::from_index);
    depth_first(roots, |key| group_edges(schema, key), MissingPolicy::Error)
        .map(|_| ())
        .map_err(|fault| match fault {
            CycleFault::Cycle(key) => Error::structural(format!(
                "circular reference to group '{}'",
                schema.group(key).name
            )),
            CycleFault::Missing(name) => Error::structural(format!("missing group '{}'", name)),
        })
}

fn attribute_group_edges(schema: &ParsedSchema, key: AttributeGroupKey) -> Vec<Edge<AttributeGroupKey>> {
    schema
        .attribute_group(key)
        .attributes
        .iter()
        .filter_map(|item| match item {
            AttributeItem::GroupRef(name) => Some(match schema.global_attribute_groups.get(name) {
                Some(target) => Edge::To(*target),
                None => Edge::Missing(name.clone()),
            }),
            AttributeItem::Use(_) => None,
        })
        .collect()
}

/// Check that attribute groups do not contain themselves
pub fn check_attribute_group_cycles(schema: &ParsedSchema) -> Result<()> {
    let roots = (0..schema.attribute_groups.len()).map(AttributeGroupKey::from_index);
    depth_first(roots, |key| attribute_group_edges(schema, key), MissingPolicy::Error)
        .map(|_| ())
        .map_err(|fault| match fault {
            CycleFault::Cycle(key) => Error::structural(format!(
                "circular reference to attribute group '{}'",
                schema.attribute_group(key).name
            )),
            CycleFault::Missing(name) => {
                Error::structural(format!("missing attribute group '{}'", name))
            }
        })
}

/// Check that substitution groups form a DAG under their heads
pub fn check_substitution_cycles(schema: &ParsedSchema) -> Result<()> {
    let roots = schema.global_elements.values().copied();
    let edges = |key: ElementKey| match &schema.element(key).substitution_group {
        Some(head) => vec![match schema.global_elements.get(head) {
            Some(target) => Edge::To(*target),
            None => Edge::Missing(head.clone()),
        }],
        None => Vec::new(),
    };
    depth_first(roots, edges, MissingPolicy::Error)
        .map(|_| ())
        .map_err(|fault| match fault {
            CycleFault::Cycle(key) => Error::structural(format!(
                "circular substitution group at element '{}'",
                schema.element(key).name
            )),
            CycleFault::Missing(name) => {
                Error::structural(format!("missing substitution group head '{}'", name))
            }
        })
}

/// Run all four checks; returns the type post-order
pub fn check_cycles(schema: &ParsedSchema, resolution: &Resolution) -> Result<Vec<TypeKey>> {
    let order = check_type_cycles(schema, resolution)?;
    check_group_cycles(schema)?;
    check_attribute_group_cycles(schema)?;
    check_substitution_cycles(schema)?;
    tracing::debug!(types = order.len(), "no reference cycles");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CompileConfig;
    use crate::loaders::MemoryLoader;
    use crate::validators::parsing::parse_schema;
    use crate::validators::resolver::resolve;

    fn check(body: &str) -> Result<Vec<TypeKey>> {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        let loader = MemoryLoader::new().with_document("s.xsd", xml);
        let schema = parse_schema(&loader, "s.xsd", &CompileConfig::default())?;
        let resolution = resolve(&schema)?;
        check_cycles(&schema, &resolution)
    }

    #[test]
    fn test_depth_first_post_order() {
        let graph = |n: u32| match n {
            1 => vec![Edge::To(2), Edge::To(3)],
            2 => vec![Edge::To(3)],
            _ => vec![],
        };
        let order = depth_first([1, 2, 3], graph, MissingPolicy::Ignore).unwrap();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_depth_first_cycle_and_missing() {
        let graph = |n: u32| match n {
            1 => vec![Edge::To(2)],
            2 => vec![Edge::To(1)],
            _ => vec![Edge::Missing(QName::local("x"))],
        };
        assert_eq!(
            depth_first([1], graph, MissingPolicy::Error),
            Err(CycleFault::Cycle(1))
        );
        assert!(depth_first([3], graph, MissingPolicy::Ignore).is_ok());
        assert_eq!(
            depth_first([3], graph, MissingPolicy::Error),
            Err(CycleFault::Missing(QName::local("x")))
        );
    }

    #[test]
    fn test_type_cycle() {
        let result = check(
            r#"<xs:simpleType name="A"><xs:restriction base="B"/></xs:simpleType>
               <xs:simpleType name="B"><xs:restriction base="A"/></xs:simpleType>"#,
        );
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_bases_come_first() {
        let order = check(
            r#"<xs:simpleType name="A"><xs:restriction base="B"/></xs:simpleType>
               <xs:simpleType name="B"><xs:restriction base="xs:string"/></xs:simpleType>"#,
        )
        .unwrap();
        assert_eq!(order, vec![TypeKey(1), TypeKey(0)]);
    }

    #[test]
    fn test_group_cycle() {
        let result = check(
            r#"<xs:group name="G"><xs:sequence><xs:group ref="H"/></xs:sequence></xs:group>
               <xs:group name="H"><xs:choice><xs:group ref="G"/></xs:choice></xs:group>"#,
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_recursion_through_element_is_allowed() {
        let result = check(
            r#"<xs:group name="G">
                 <xs:sequence>
                   <xs:element name="e" minOccurs="0">
                     <xs:complexType><xs:group ref="G"/></xs:complexType>
                   </xs:element>
                 </xs:sequence>
               </xs:group>"#,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_attribute_group_cycle() {
        let result = check(
            r#"<xs:attributeGroup name="A"><xs:attributeGroup ref="A"/></xs:attributeGroup>"#,
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_substitution_cycle() {
        let result = check(
            r#"<xs:element name="a" substitutionGroup="b"/>
               <xs:element name="b" substitutionGroup="a"/>"#,
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }
}
