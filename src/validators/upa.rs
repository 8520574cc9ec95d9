//! Unique Particle Attribution
//!
//! A content model is deterministic when every set of positions a matcher
//! may have to choose from (the first set and each follow set) holds no two
//! positions of different particles that could both accept the same child.
//! Copies made by unrolling one particle's bounds attribute a child to the
//! same particle and never conflict. All-group members are checked
//! pairwise, since any member may follow any other.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cos-nonambig

use crate::error::{Result, UpaError};

use super::models::{AllGroup, ContentModel, Leaf};

/// Check one lowered content model; `owner` names the type in errors
pub fn check_model(owner: &str, model: &ContentModel) -> Result<()> {
    match model {
        ContentModel::Empty => Ok(()),
        ContentModel::Regular(automaton) => {
            for set in automaton.choice_sets() {
                let positions: Vec<usize> = set.iter().collect();
                for (n, &i) in positions.iter().enumerate() {
                    for &j in &positions[n + 1..] {
                        let (a, b) = (&automaton.positions[i], &automaton.positions[j]);
                        if a.particle() != b.particle() && a.overlaps(b) {
                            return Err(violation(owner, i, j, a, b).into());
                        }
                    }
                }
            }
            Ok(())
        }
        ContentModel::All(group) => check_all(owner, group),
    }
}

fn check_all(owner: &str, group: &AllGroup) -> Result<()> {
    let leaves: Vec<(usize, Leaf)> = group
        .members
        .iter()
        .enumerate()
        .flat_map(|(i, member)| {
            member
                .alternatives
                .iter()
                .map(move |(decl, name)| {
                    (
                        i,
                        Leaf::Element {
                            decl: *decl,
                            name: name.clone(),
                            particle: i as u32,
                        },
                    )
                })
        })
        .collect();
    let mut seen: Vec<(usize, &Leaf)> = Vec::new();
    for (member, leaf) in &leaves {
        if let Some((other, earlier)) = seen.iter().find(|(_, earlier)| earlier.overlaps(leaf)) {
            return Err(violation(owner, *other, *member, earlier, leaf).into());
        }
        seen.push((*member, leaf));
    }
    Ok(())
}

fn violation(owner: &str, i: usize, j: usize, a: &Leaf, b: &Leaf) -> UpaError {
    let symbol = match (a, b) {
        (Leaf::Element { name, .. }, _) | (_, Leaf::Element { name, .. }) => name.to_string(),
        (Leaf::Wildcard { .. }, Leaf::Wildcard { .. }) => a.describe(),
    };
    UpaError::new(owner, i, j).with_symbol(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::limits::CompileConfig;
    use crate::loaders::MemoryLoader;
    use crate::namespaces::QName;
    use crate::validators::cycles::check_cycles;
    use crate::validators::derivation::derive;
    use crate::validators::models::ModelLowering;
    use crate::validators::parsing::parse_schema;
    use crate::validators::resolver::{resolve, TypeRef};

    fn check(content: &str) -> Result<()> {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t"
                 xmlns="urn:t" elementFormDefault="qualified">
                 <xs:element name="g"/><xs:element name="s" substitutionGroup="g"/>
                 <xs:complexType name="T">{}</xs:complexType>
               </xs:schema>"#,
            content
        );
        let loader = MemoryLoader::new().with_document("s.xsd", xml);
        let config = CompileConfig::default();
        let schema = parse_schema(&loader, "s.xsd", &config)?;
        let resolution = resolve(&schema)?;
        let order = check_cycles(&schema, &resolution)?;
        let derivations = derive(&schema, &resolution, &order)?;
        let key = schema.global_types[&QName::new("urn:t", "T")];
        let info = derivations.info(TypeRef::User(key))?;
        let model = ModelLowering::new(&schema, &resolution, &derivations, &config)
            .lower("T", info.particle.as_ref())?;
        check_model("T", &model)
    }

    #[test]
    fn test_deterministic_models_pass() {
        check("<xs:sequence><xs:element name='a'/><xs:element name='b' minOccurs='0'/></xs:sequence>")
            .unwrap();
        check("<xs:sequence><xs:element name='a' maxOccurs='3'/><xs:element name='b'/></xs:sequence>")
            .unwrap();
        check("<xs:choice><xs:element name='a'/><xs:any namespace='##other'/></xs:choice>").unwrap();
    }

    #[test]
    fn test_same_name_in_choice() {
        let err = check("<xs:choice><xs:element name='a'/><xs:element name='a'/></xs:choice>")
            .unwrap_err();
        match err {
            Error::Upa(upa) => {
                assert_eq!((upa.first, upa.second), (0, 1));
                assert_eq!(upa.symbol.as_deref(), Some("{urn:t}a"));
            }
            other => panic!("expected a UPA error, got {:?}", other),
        }
    }

    #[test]
    fn test_element_and_wildcard() {
        let result = check(
            "<xs:sequence><xs:element name='a' minOccurs='0'/><xs:any namespace='##targetNamespace'/></xs:sequence>",
        );
        assert!(matches!(result, Err(Error::Upa(_))));
    }

    #[test]
    fn test_optional_followed_by_same_name() {
        let result = check(
            "<xs:sequence><xs:element name='a' minOccurs='0'/><xs:element name='a'/></xs:sequence>",
        );
        assert!(matches!(result, Err(Error::Upa(_))));
    }

    #[test]
    fn test_substitute_overlaps_member() {
        let result = check("<xs:choice><xs:element ref='g'/><xs:element ref='s'/></xs:choice>");
        assert!(matches!(result, Err(Error::Upa(_))));
    }

    #[test]
    fn test_copies_of_one_particle_do_not_conflict() {
        check(
            "<xs:choice maxOccurs='unbounded'><xs:element name='a' maxOccurs='2'/><xs:element name='b'/></xs:choice>",
        )
        .unwrap();
        check("<xs:sequence maxOccurs='3'><xs:element name='a' minOccurs='0'/><xs:element name='b'/></xs:sequence>")
            .unwrap();
        let result = check(
            "<xs:sequence><xs:element name='a' maxOccurs='2'/><xs:element name='a' minOccurs='0'/></xs:sequence>",
        );
        assert!(matches!(result, Err(Error::Upa(_))));
    }

    #[test]
    fn test_all_group_duplicates() {
        let result = check("<xs:all><xs:element ref='g'/><xs:element ref='s'/></xs:all>");
        assert!(matches!(result, Err(Error::Upa(_))));
        check("<xs:all><xs:element name='a'/><xs:element name='b'/></xs:all>").unwrap();
    }
}
