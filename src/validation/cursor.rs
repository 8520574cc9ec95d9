//! Content-model cursors
//!
//! A [`Cursor`] is the run state of one open element's content model. It
//! borrows nothing, so a stack of cursors can live beside the shared
//! [`RuntimeSchema`].

use crate::automata::{AllStep, BitSet, Input, Match, Matcher, ModelRef, NfaState};
use crate::runtime::{RuntimeSchema, SymbolId, WildcardId, WildcardKind};
use crate::validators::ElemId;

/// Run state of one content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// No children allowed
    Empty,
    /// A DFA state
    Dfa {
        /// Model index
        model: u32,
        /// Current state
        state: u32,
    },
    /// An NFA position set
    Nfa {
        /// Model index
        model: u32,
        /// Current positions
        state: NfaState,
    },
    /// Members of an all group seen so far
    All {
        /// Model index
        model: u32,
        /// Seen members
        seen: BitSet,
    },
}

/// Outcome of offering a child to a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Matched an element position
    Element(ElemId),
    /// Matched a wildcard position
    Wildcard(WildcardId),
    /// Second occurrence of an all-group member
    Duplicate,
    /// Not admitted
    Rejected,
}

impl Cursor {
    /// The initial state of `model`
    pub fn start(model: Option<ModelRef>) -> Self {
        match model {
            None => Cursor::Empty,
            Some(ModelRef::Dfa(model)) => Cursor::Dfa { model, state: 0 },
            Some(ModelRef::Nfa(model)) => Cursor::Nfa {
                model,
                state: NfaState::default(),
            },
            Some(ModelRef::All(model)) => Cursor::All {
                model,
                seen: BitSet::default(),
            },
        }
    }

    /// Offer one child; the cursor only moves on a match
    pub fn step(&mut self, schema: &RuntimeSchema, input: &Input) -> Step {
        let models = schema.models();
        let admits = |rule: WildcardId| schema.wildcard_admits(rule, input.namespace);
        let matched = match self {
            Cursor::Empty => None,
            Cursor::Dfa { model, state } => {
                let next = models
                    .dfa(*model)
                    .and_then(|dfa| dfa.step(*state, input, admits));
                next.map(|(target, m)| {
                    *state = target;
                    m
                })
            }
            Cursor::Nfa { model, state } => {
                let next = models
                    .nfa(*model)
                    .and_then(|nfa| nfa.step(state, input, &models.bits, admits));
                next.map(|(target, m)| {
                    *state = target;
                    m
                })
            }
            Cursor::All { model, seen } => {
                let Some(all) = models.all(*model) else {
                    return Step::Rejected;
                };
                return match all.step(seen, input.symbol) {
                    AllStep::Accepted { elem, .. } => Step::Element(elem),
                    AllStep::Duplicate(_) => Step::Duplicate,
                    AllStep::Unexpected => Step::Rejected,
                };
            }
        };
        match matched {
            Some(Match::Element(elem)) => Step::Element(elem),
            Some(Match::Wildcard(rule)) => Step::Wildcard(rule),
            None => Step::Rejected,
        }
    }

    /// Whether the content seen so far is complete
    pub fn is_accepting(&self, schema: &RuntimeSchema) -> bool {
        let models = schema.models();
        match self {
            Cursor::Empty => true,
            Cursor::Dfa { model, state } => models.dfa(*model).map_or(false, |d| d.is_accepting(*state)),
            Cursor::Nfa { model, state } => models
                .nfa(*model)
                .map_or(false, |n| n.is_accepting(state, &models.bits)),
            Cursor::All { model, seen } => models.all(*model).map_or(false, |a| a.is_accepting(seen)),
        }
    }

    /// Display names of what may come next
    pub fn expected(&self, schema: &RuntimeSchema) -> Vec<String> {
        let models = schema.models();
        let name = |symbol: SymbolId| {
            schema
                .symbol_name(symbol)
                .map_or_else(String::new, |n| n.to_string())
        };
        let mut out: Vec<String> = match self {
            Cursor::Empty => Vec::new(),
            Cursor::Dfa { model, state } => match models.dfa(*model) {
                Some(dfa) => {
                    let mut names: Vec<String> = dfa.expected(*state).map(name).collect();
                    if let Some(s) = dfa.states.get(*state as usize) {
                        names.extend(s.wildcards.iter().map(|w| wildcard_label(schema, w.rule)));
                    }
                    names
                }
                None => Vec::new(),
            },
            Cursor::Nfa { model, state } => models
                .nfa(*model)
                .map(|nfa| {
                    nfa.expected(state, &models.bits)
                        .into_iter()
                        .map(|m| match m {
                            Matcher::Element { symbol, .. } => name(symbol),
                            Matcher::Wildcard { rule } => wildcard_label(schema, rule),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Cursor::All { model, seen } => models
                .all(*model)
                .map(|all| all.expected(seen).map(name).collect())
                .unwrap_or_default(),
        };
        out.dedup();
        out
    }
}

/// `*`, `##other`, or the admitted namespaces as `{ns}*`
fn wildcard_label(schema: &RuntimeSchema, rule: WildcardId) -> String {
    let Some(wildcard) = schema.wildcard(rule) else {
        return "*".to_string();
    };
    match wildcard.kind {
        WildcardKind::Any => "*".to_string(),
        WildcardKind::Other | WildcardKind::NotAbsent => "##other".to_string(),
        WildcardKind::Enumeration => {
            let start = wildcard.offset as usize;
            let members = schema
                .wildcard_ns
                .get(start..start + wildcard.len as usize)
                .unwrap_or(&[]);
            members
                .iter()
                .map(|ns| match schema.symbols().namespace(*ns) {
                    Some("") | None => "*".to_string(),
                    Some(uri) => format!("{{{}}}*", uri),
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CompileConfig;
    use crate::namespaces::QName;
    use crate::validators::SchemaCompiler;

    const SEQ: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="r" type="T"/>
          <xs:element name="a"/>
          <xs:element name="b"/>
          <xs:complexType name="T">
            <xs:sequence><xs:element ref="a"/><xs:element ref="b" minOccurs="0"/></xs:sequence>
          </xs:complexType>
        </xs:schema>"#;

    fn run(schema: &RuntimeSchema, names: &[&str]) -> (Cursor, Vec<Step>) {
        let t = schema.type_by_name(&QName::local("T")).unwrap();
        let mut cursor = Cursor::start(schema.complex_of(t).unwrap().model);
        let mut steps = Vec::new();
        for name in names {
            let input = Input {
                symbol: schema.symbols().lookup("", name),
                namespace: schema.symbols().namespace_id(""),
            };
            steps.push(cursor.step(schema, &input));
        }
        (cursor, steps)
    }

    #[test]
    fn test_dfa_and_nfa_cursors_agree() {
        let dfa = SchemaCompiler::new().compile_str(SEQ).unwrap();
        let config = CompileConfig {
            max_dfa_states: 1,
            ..CompileConfig::default()
        };
        let nfa = SchemaCompiler::new().with_config(config).compile_str(SEQ).unwrap();
        for schema in [&dfa, &nfa] {
            let (cursor, steps) = run(schema, &["a"]);
            assert!(matches!(steps[0], Step::Element(_)));
            assert!(cursor.is_accepting(schema));
            assert_eq!(cursor.expected(schema), vec!["b".to_string()]);

            let (cursor, steps) = run(schema, &["b"]);
            assert_eq!(steps[0], Step::Rejected);
            assert!(!cursor.is_accepting(schema));
            assert_eq!(cursor.expected(schema), vec!["a".to_string()]);
        }
        let t = nfa.type_by_name(&QName::local("T")).unwrap();
        assert!(matches!(nfa.complex_of(t).unwrap().model, Some(ModelRef::Nfa(_))));
    }

    #[test]
    fn test_all_cursor_reports_duplicates() {
        let schema = SchemaCompiler::new()
            .compile_str(&SEQ.replace("xs:sequence", "xs:all"))
            .unwrap();
        let (cursor, steps) = run(&schema, &["b", "a", "a"]);
        assert!(matches!(steps[0], Step::Element(_)));
        assert!(matches!(steps[1], Step::Element(_)));
        assert_eq!(steps[2], Step::Duplicate);
        assert!(cursor.is_accepting(&schema));
    }

    #[test]
    fn test_empty_cursor() {
        let mut cursor = Cursor::start(None);
        let schema = SchemaCompiler::new().compile_str(SEQ).unwrap();
        let input = Input {
            symbol: None,
            namespace: schema.symbols().namespace_id(""),
        };
        assert_eq!(cursor.step(&schema, &input), Step::Rejected);
        assert!(cursor.is_accepting(&schema));
        assert!(cursor.expected(&schema).is_empty());
    }
}
