//! Content-model lowering
//!
//! Turns the effective content particle of a complex type into a regular
//! expression over element and wildcard leaves, then into its Glushkov
//! automaton. Group references are inlined, occurrence bounds unrolled,
//! and every element reference that admits substitution is replaced by the
//! choice of its allowed substitutes. A top-level `xs:all` group takes a
//! separate path and becomes an [`AllGroup`].
//!
//! A single element or wildcard particle whose unrolled copies would exceed
//! the position budget is kept as a counted loop instead, provided no
//! enclosing particle repeats. Copies of one particle never conflict with
//! each other under Unique Particle Attribution, so every leaf records the
//! particle it came from.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cos-particle-extend

use crate::automata::{Expr, Glushkov};
use crate::error::{Error, Result};
use crate::limits::CompileConfig;
use crate::namespaces::QName;

use super::complex_types::DerivationSet;
use super::derivation::Derivations;
use super::globals::ParsedSchema;
use super::groups::{Compositor, ModelGroup};
use super::particles::{Occurs, Particle, Term};
use super::resolver::Resolution;
use super::wildcards::Wildcard;
use super::ElementKey;

/// One position of a content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// A child element validated against a declaration
    Element {
        /// Declaration
        decl: ElementKey,
        /// Name the child appears under
        name: QName,
        /// Particle the position was lowered from
        particle: u32,
    },
    /// An element wildcard
    Wildcard {
        /// The wildcard
        wildcard: Wildcard,
        /// Particle the position was lowered from
        particle: u32,
    },
}

impl Leaf {
    /// Particle the position was lowered from
    pub fn particle(&self) -> u32 {
        match self {
            Leaf::Element { particle, .. } | Leaf::Wildcard { particle, .. } => *particle,
        }
    }

    /// Whether both leaves could match the same child name
    pub fn overlaps(&self, other: &Leaf) -> bool {
        match (self, other) {
            (Leaf::Element { name: a, .. }, Leaf::Element { name: b, .. }) => a == b,
            (Leaf::Element { name, .. }, Leaf::Wildcard { wildcard, .. })
            | (Leaf::Wildcard { wildcard, .. }, Leaf::Element { name, .. }) => {
                wildcard.allows(&name.namespace)
            }
            (Leaf::Wildcard { wildcard: a, .. }, Leaf::Wildcard { wildcard: b, .. }) => {
                a.namespaces.overlaps(&b.namespaces)
            }
        }
    }

    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            Leaf::Element { name, .. } => format!("element '{}'", name),
            Leaf::Wildcard { wildcard, .. } => format!("wildcard {:?}", wildcard.namespaces),
        }
    }
}

/// A member of an `xs:all` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllGroupMember {
    /// The element and its allowed substitutes
    pub alternatives: Vec<(ElementKey, QName)>,
    /// `minOccurs="0"`
    pub optional: bool,
}

/// A lowered `xs:all` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllGroup {
    /// Members in declaration order
    pub members: Vec<AllGroupMember>,
    /// Whether the group itself may be absent
    pub emptiable: bool,
}

/// A lowered content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModel {
    /// No child elements allowed
    Empty,
    /// A position automaton
    Regular(Glushkov<Leaf>),
    /// An all group
    All(AllGroup),
}

enum Work<'a> {
    /// A particle, and whether an enclosing particle repeats
    Enter(&'a Particle, bool),
    Exit {
        compositor: Compositor,
        count: usize,
        occurs: Occurs,
    },
}

/// Lowers particles of one schema
pub struct ModelLowering<'a> {
    schema: &'a ParsedSchema,
    resolution: &'a Resolution,
    derivations: &'a Derivations,
    max_positions: usize,
}

impl<'a> ModelLowering<'a> {
    /// Create a lowering over a resolved and derived schema
    pub fn new(
        schema: &'a ParsedSchema,
        resolution: &'a Resolution,
        derivations: &'a Derivations,
        config: &CompileConfig,
    ) -> Self {
        Self {
            schema,
            resolution,
            derivations,
            max_positions: config.effective_max_positions(),
        }
    }

    /// Lower the effective particle of a type
    pub fn lower(&self, owner: &str, particle: Option<&'a Particle>) -> Result<ContentModel> {
        let Some(particle) = particle else {
            return Ok(ContentModel::Empty);
        };
        if particle.occurs.max == Some(0) {
            return Ok(ContentModel::Empty);
        }
        if let Some(group) = self.group_of(particle)? {
            if group.compositor == Compositor::All {
                return self.lower_all(owner, group, particle.occurs);
            }
        }

        let expr = self.lower_expr(owner, particle)?;
        let positions = expr.position_count();
        if positions > self.max_positions {
            return Err(Error::structural(format!(
                "content model of {} needs {} positions, limit is {}",
                owner, positions, self.max_positions
            )));
        }
        let automaton = Glushkov::build(&expr);
        if automaton.is_empty() && automaton.nullable {
            return Ok(ContentModel::Empty);
        }
        Ok(ContentModel::Regular(automaton))
    }

    /// The model group a particle stands for, following a group reference
    fn group_of(&self, particle: &'a Particle) -> Result<Option<&'a ModelGroup>> {
        Ok(match &particle.term {
            Term::Group(group) => Some(group),
            Term::GroupRef(name) => Some(&self.schema.group(self.resolution.group(name)?).group),
            _ => None,
        })
    }

    fn lower_expr(&self, owner: &str, root: &'a Particle) -> Result<Expr<Leaf>> {
        let mut work = vec![Work::Enter(root, false)];
        let mut done: Vec<Expr<Leaf>> = Vec::new();
        let mut next_particle = 0u32;

        while let Some(item) = work.pop() {
            match item {
                Work::Enter(particle, repeated) => {
                    if particle.occurs.max == Some(0) {
                        done.push(Expr::Empty);
                        continue;
                    }
                    let id = next_particle;
                    let leaf = match &particle.term {
                        Term::Element(key) => Some(Expr::Leaf(Leaf::Element {
                            decl: *key,
                            name: self.schema.element(*key).name.clone(),
                            particle: id,
                        })),
                        Term::ElementRef(name) => {
                            let head = self.resolution.element(name)?;
                            let leaves = self
                                .substitutes(head)?
                                .into_iter()
                                .map(|(decl, name)| {
                                    Expr::Leaf(Leaf::Element {
                                        decl,
                                        name,
                                        particle: id,
                                    })
                                })
                                .collect();
                            Some(Expr::alt(leaves))
                        }
                        Term::Wildcard(wildcard) => Some(Expr::Leaf(Leaf::Wildcard {
                            wildcard: wildcard.clone(),
                            particle: id,
                        })),
                        Term::Group(_) | Term::GroupRef(_) => None,
                    };
                    match leaf {
                        Some(expr) => {
                            next_particle += 1;
                            done.push(self.repeat(owner, expr, particle.occurs, !repeated)?);
                        }
                        None => {
                            let group = self.group_of(particle)?.ok_or_else(|| {
                                Error::structural(format!("particle of {} is not a group", owner))
                            })?;
                            if group.compositor == Compositor::All {
                                return Err(Error::structural(format!(
                                    "content model of {} nests an 'all' group",
                                    owner
                                )));
                            }
                            work.push(Work::Exit {
                                compositor: group.compositor,
                                count: group.particles.len(),
                                occurs: particle.occurs,
                            });
                            let repeated = repeated || particle.occurs.max != Some(1);
                            work.extend(
                                group
                                    .particles
                                    .iter()
                                    .rev()
                                    .map(|child| Work::Enter(child, repeated)),
                            );
                        }
                    }
                }
                Work::Exit {
                    compositor,
                    count,
                    occurs,
                } => {
                    let children = done.split_off(done.len() - count);
                    let expr = match compositor {
                        Compositor::Choice => Expr::alt(children),
                        _ => Expr::seq(children),
                    };
                    done.push(self.repeat(owner, expr, occurs, false)?);
                }
            }
        }
        Ok(done.pop().unwrap_or(Expr::Empty))
    }

    /// Unroll bounds. Past the position budget, a `countable` single
    /// particle becomes a counted loop; anything else is refused before the
    /// copies are made.
    fn repeat(&self, owner: &str, expr: Expr<Leaf>, occurs: Occurs, countable: bool) -> Result<Expr<Leaf>> {
        let copies = match occurs.max {
            Some(max) => max as usize,
            None => occurs.min.max(1) as usize,
        };
        let needed = expr.position_count().saturating_mul(copies);
        if needed > self.max_positions {
            if countable {
                tracing::debug!(
                    owner,
                    min = occurs.min,
                    max = ?occurs.max,
                    "counting repetition instead of unrolling it"
                );
                return Ok(Expr::Counted {
                    inner: Box::new(expr),
                    min: occurs.min,
                    max: occurs.max,
                });
            }
            return Err(Error::structural(format!(
                "repetition in the content model of {} needs {} positions, limit is {}",
                owner, needed, self.max_positions
            )));
        }
        Ok(expr.repeat(occurs.min, occurs.max))
    }

    fn lower_all(&self, owner: &str, group: &'a ModelGroup, occurs: Occurs) -> Result<ContentModel> {
        if occurs.min > 1 || occurs.max != Some(1) {
            return Err(Error::structural(format!(
                "'all' group of {} must occur at most once, found {}",
                owner, occurs
            )));
        }
        let mut members = Vec::with_capacity(group.particles.len());
        for particle in &group.particles {
            if particle.occurs.max == Some(0) {
                continue;
            }
            let alternatives = match &particle.term {
                Term::Element(key) => vec![(*key, self.schema.element(*key).name.clone())],
                Term::ElementRef(name) => self.substitutes(self.resolution.element(name)?)?,
                _ => {
                    return Err(Error::structural(format!(
                        "'all' group of {} may only contain elements",
                        owner
                    )))
                }
            };
            members.push(AllGroupMember {
                alternatives,
                optional: particle.occurs.min == 0,
            });
        }
        if members.is_empty() {
            return Ok(ContentModel::Empty);
        }
        Ok(ContentModel::All(AllGroup {
            members,
            emptiable: occurs.min == 0,
        }))
    }

    /// The elements that may appear where `head` is expected: the head
    /// itself unless abstract, then every transitive substitution group
    /// member not excluded by `abstract` or the head's `block`
    pub fn substitutes(&self, head: ElementKey) -> Result<Vec<(ElementKey, QName)>> {
        let decl = self.schema.element(head);
        if decl.blocks_substitution() {
            if decl.is_abstract {
                return Err(Error::structural(format!(
                    "abstract element '{}' blocks substitution",
                    decl.name
                )));
            }
            return Ok(vec![(head, decl.name.clone())]);
        }

        let head_type = self.derivations.element_type(head);
        let blocked = decl
            .block
            .union(self.derivations.info(head_type)?.block)
            .intersection(DerivationSet::COMPLEX);

        let mut members: Vec<ElementKey> = Vec::new();
        let mut pending: Vec<&QName> = match self.schema.substitution_groups.get(&decl.name) {
            Some(direct) => direct.iter().rev().collect(),
            None => Vec::new(),
        };
        while let Some(name) = pending.pop() {
            let key = self.resolution.element(name)?;
            if members.contains(&key) || key == head {
                continue;
            }
            members.push(key);
            if let Some(more) = self.schema.substitution_groups.get(name) {
                pending.extend(more.iter().rev());
            }
        }
        members.sort();

        let mut allowed = Vec::with_capacity(members.len() + 1);
        if !decl.is_abstract {
            allowed.push((head, decl.name.clone()));
        }
        for key in members {
            let member = self.schema.element(key);
            if member.is_abstract {
                continue;
            }
            let mask = self
                .derivations
                .derivation_mask(self.derivations.element_type(key), head_type)
                .unwrap_or_default();
            if mask.intersects(blocked) {
                tracing::trace!(head = %decl.name, member = %member.name, "substitution blocked");
                continue;
            }
            allowed.push((key, member.name.clone()));
        }
        if allowed.is_empty() {
            return Err(Error::structural(format!(
                "abstract element '{}' has no usable substitute",
                decl.name
            )));
        }
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::MemoryLoader;
    use crate::validators::cycles::check_cycles;
    use crate::validators::derivation::derive;
    use crate::validators::parsing::parse_schema;
    use crate::validators::resolver::{resolve, TypeRef};

    fn lowered(body: &str, type_name: &str, config: CompileConfig) -> Result<ContentModel> {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        let loader = MemoryLoader::new().with_document("s.xsd", xml);
        let schema = parse_schema(&loader, "s.xsd", &config)?;
        let resolution = resolve(&schema)?;
        let order = check_cycles(&schema, &resolution)?;
        let derivations = derive(&schema, &resolution, &order)?;
        let key = schema.global_types[&QName::local(type_name)];
        let info = derivations.info(TypeRef::User(key))?;
        ModelLowering::new(&schema, &resolution, &derivations, &config)
            .lower(type_name, info.particle.as_ref())
    }

    fn names(model: &ContentModel) -> Vec<String> {
        match model {
            ContentModel::Regular(g) => g
                .positions
                .iter()
                .map(|leaf| match leaf {
                    Leaf::Element { name, .. } => name.local.clone(),
                    Leaf::Wildcard { .. } => "*".to_string(),
                })
                .collect(),
            other => panic!("not a regular model: {:?}", other),
        }
    }

    #[test]
    fn test_group_ref_is_inlined() {
        let model = lowered(
            r#"<xs:group name="G"><xs:sequence><xs:element name="b"/><xs:element name="c"/></xs:sequence></xs:group>
               <xs:complexType name="T">
                 <xs:sequence><xs:element name="a"/><xs:group ref="G" maxOccurs="2"/></xs:sequence>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["a", "b", "c", "b", "c"]);
    }

    #[test]
    fn test_empty_content() {
        let model = lowered(
            r#"<xs:complexType name="T"><xs:sequence/></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(model, ContentModel::Empty);
    }

    #[test]
    fn test_substitution_expansion() {
        let model = lowered(
            r#"<xs:element name="head" type="xs:string"/>
               <xs:element name="m1" substitutionGroup="head"/>
               <xs:element name="m2" abstract="true" substitutionGroup="head"/>
               <xs:element name="m3" substitutionGroup="m2"/>
               <xs:complexType name="T"><xs:sequence><xs:element ref="head"/></xs:sequence></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["head", "m1", "m3"]);
    }

    #[test]
    fn test_blocked_substitution_keeps_head() {
        let model = lowered(
            r#"<xs:element name="head" type="xs:string" block="substitution"/>
               <xs:element name="m1" substitutionGroup="head"/>
               <xs:complexType name="T"><xs:sequence><xs:element ref="head"/></xs:sequence></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["head"]);
    }

    #[test]
    fn test_blocked_derivation_excludes_member() {
        let model = lowered(
            r#"<xs:complexType name="Base"><xs:sequence/></xs:complexType>
               <xs:complexType name="Ext">
                 <xs:complexContent><xs:extension base="Base"/></xs:complexContent>
               </xs:complexType>
               <xs:element name="head" type="Base" block="extension"/>
               <xs:element name="m1" type="Ext" substitutionGroup="head"/>
               <xs:element name="m2" type="Base" substitutionGroup="head"/>
               <xs:complexType name="T"><xs:sequence><xs:element ref="head"/></xs:sequence></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["head", "m2"]);
    }

    #[test]
    fn test_abstract_blocked_head_rejected() {
        let result = lowered(
            r#"<xs:element name="head" abstract="true" block="substitution"/>
               <xs:complexType name="T"><xs:sequence><xs:element ref="head"/></xs:sequence></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_all_group() {
        let model = lowered(
            r#"<xs:complexType name="T">
                 <xs:all minOccurs="0"><xs:element name="a"/><xs:element name="b" minOccurs="0"/></xs:all>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        match model {
            ContentModel::All(all) => {
                assert!(all.emptiable);
                assert_eq!(all.members.len(), 2);
                assert!(!all.members[0].optional);
                assert!(all.members[1].optional);
            }
            other => panic!("expected all group, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_all_rejected() {
        let result = lowered(
            r#"<xs:group name="G"><xs:all><xs:element name="a"/></xs:all></xs:group>
               <xs:complexType name="T">
                 <xs:sequence><xs:group ref="G"/><xs:element name="b"/></xs:sequence>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_position_budget() {
        let body = r#"<xs:complexType name="T">
                        <xs:sequence maxOccurs="3000"><xs:element name="a"/><xs:element name="b"/></xs:sequence>
                      </xs:complexType>"#;
        let result = lowered(body, "T", CompileConfig::default());
        assert!(matches!(result, Err(Error::Structural(_))));
        let model = lowered(body, "T", CompileConfig::permissive()).unwrap();
        assert_eq!(names(&model).len(), 6000);
    }

    #[test]
    fn test_large_bound_is_counted() {
        let model = lowered(
            r#"<xs:complexType name="T">
                 <xs:sequence>
                   <xs:element name="a" maxOccurs="1000000"/>
                   <xs:element name="b" minOccurs="5000" maxOccurs="unbounded"/>
                 </xs:sequence>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["a", "b"]);
        match model {
            ContentModel::Regular(g) => {
                assert_eq!(g.counted, vec![Some(0), Some(1)]);
                assert_eq!(g.counters[0].max, Some(1_000_000));
                assert_eq!(g.counters[1].min, 5000);
            }
            other => panic!("not a regular model: {:?}", other),
        }
    }

    #[test]
    fn test_large_bound_under_repeated_group_is_refused() {
        let result = lowered(
            r#"<xs:complexType name="T">
                 <xs:sequence maxOccurs="2"><xs:element name="a" maxOccurs="5000"/></xs:sequence>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_repeated_empty_group() {
        let model = lowered(
            r#"<xs:element name="a"/>
               <xs:complexType name="T">
                 <xs:sequence><xs:element ref="a"/><xs:sequence maxOccurs="1000000"/></xs:sequence>
               </xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&model), vec!["a"]);
    }

    #[test]
    fn test_repeated_all_group_ref_rejected() {
        let result = lowered(
            r#"<xs:group name="G"><xs:all><xs:element name="a"/></xs:all></xs:group>
               <xs:complexType name="T"><xs:group ref="G" maxOccurs="2"/></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        );
        assert!(matches!(result, Err(Error::Structural(_))));
        lowered(
            r#"<xs:group name="G"><xs:all><xs:element name="a"/></xs:all></xs:group>
               <xs:complexType name="T"><xs:group ref="G" minOccurs="0"/></xs:complexType>"#,
            "T",
            CompileConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn test_leaf_overlap() {
        let a = Leaf::Element {
            decl: ElementKey(0),
            name: QName::new("urn:x", "a"),
            particle: 0,
        };
        let b = Leaf::Element {
            decl: ElementKey(1),
            name: QName::new("urn:x", "b"),
            particle: 1,
        };
        let any_other = Leaf::Wildcard {
            wildcard: Wildcard::new(
                crate::validators::NamespaceConstraint::Other("urn:x".into()),
                crate::validators::ProcessContents::Lax,
            ),
            particle: 2,
        };
        let any = Leaf::Wildcard {
            wildcard: Wildcard::default(),
            particle: 3,
        };
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&a.clone()));
        assert!(!a.overlaps(&any_other));
        assert!(any_other.overlaps(&any));
        assert_eq!(any.particle(), 3);
    }
}
