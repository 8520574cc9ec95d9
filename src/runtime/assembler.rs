//! Runtime assembly
//!
//! Lowers a resolved, registered, and derived schema into a
//! [`RuntimeSchema`]. Tables are filled in ID order, so two compilations of
//! byte-identical sources intern symbols, compile models, and fold the
//! build hash in exactly the same sequence.

use std::collections::HashMap;

use crate::automata::{AllMember, AllModel, Glushkov, Matcher, ModelRef, Models};
use crate::error::Result;
use crate::limits::CompileConfig;
use crate::validators::derivation::{Derivations, TypeInfo};
use crate::validators::models::{ContentModel, Leaf, ModelLowering};
use crate::validators::registry::TypeSlot;
use crate::validators::simple_types::TextVariety;
use crate::validators::{
    upa, ContentKind, ElemId, ParsedSchema, Registry, Resolution, TypeId, TypeRef, ValueConstraint,
    Wildcard,
};

use super::attr_index::{AttrTable, AttrUse};
use super::hash::Fingerprint;
use super::symbols::{NamespaceId, SymbolTable, WildcardId};
use super::wildcards::WildcardRule;
use super::{
    ComplexRef, RuntimeAttribute, RuntimeComplexType, RuntimeConstraint, RuntimeElement, RuntimeSchema,
    RuntimeType, TypeKind,
};

struct Assembler<'a> {
    schema: &'a ParsedSchema,
    resolution: &'a Resolution,
    registry: &'a Registry,
    derivations: &'a Derivations,
    lowering: ModelLowering<'a>,
    max_states: usize,
    symbols: SymbolTable,
    models: Models,
    wildcards: Vec<WildcardRule>,
    wildcard_index: HashMap<Wildcard, WildcardId>,
    wildcard_ns: Vec<NamespaceId>,
    attr_table: AttrTable,
    complex_types: Vec<RuntimeComplexType>,
}

impl<'a> Assembler<'a> {
    fn wildcard(&mut self, wildcard: &Wildcard) -> WildcardId {
        if let Some(id) = self.wildcard_index.get(wildcard) {
            return *id;
        }
        let id = WildcardId(self.wildcards.len() as u32);
        let rule = WildcardRule::encode(wildcard, &mut self.symbols, &mut self.wildcard_ns);
        self.wildcards.push(rule);
        self.wildcard_index.insert(wildcard.clone(), id);
        id
    }

    fn type_ref(slot: TypeSlot) -> TypeRef {
        match slot {
            TypeSlot::Builtin(builtin) => TypeRef::Builtin(builtin),
            TypeSlot::User(key) => TypeRef::User(key),
        }
    }

    fn compile_model(&mut self, owner: &str, info: &'a TypeInfo) -> Result<Option<ModelRef>> {
        let lowered = self.lowering.lower(owner, info.particle.as_ref())?;
        upa::check_model(owner, &lowered)?;
        Ok(match lowered {
            ContentModel::Empty => None,
            ContentModel::Regular(automaton) => {
                let mut matchers = Vec::with_capacity(automaton.len());
                for leaf in &automaton.positions {
                    matchers.push(match leaf {
                        Leaf::Element { decl, name, .. } => Matcher::Element {
                            symbol: self.symbols.intern(name),
                            elem: self.registry.element_id(*decl)?,
                        },
                        Leaf::Wildcard { wildcard, .. } => Matcher::Wildcard {
                            rule: self.wildcard(wildcard),
                        },
                    });
                }
                let automaton = Glushkov {
                    positions: matchers,
                    nullable: automaton.nullable,
                    first: automaton.first,
                    last: automaton.last,
                    follow: automaton.follow,
                    counters: automaton.counters,
                    counted: automaton.counted,
                };
                Some(self.models.compile(&automaton, self.max_states))
            }
            ContentModel::All(group) => {
                let mut members = Vec::with_capacity(group.members.len());
                for member in &group.members {
                    let mut alternatives = Vec::with_capacity(member.alternatives.len());
                    for (decl, name) in &member.alternatives {
                        alternatives.push((self.symbols.intern(name), self.registry.element_id(*decl)?));
                    }
                    members.push(AllMember {
                        alternatives,
                        optional: member.optional,
                    });
                }
                Some(self.models.add_all(AllModel {
                    members,
                    emptiable: group.emptiable,
                }))
            }
        })
    }

    fn complex_type(&mut self, info: &'a TypeInfo) -> Result<ComplexRef> {
        let owner = info.display_name();
        let model = self.compile_model(&owner, info)?;
        let mut uses = Vec::with_capacity(info.attributes.len());
        for attribute in &info.attributes {
            uses.push(AttrUse {
                symbol: self.symbols.intern(&attribute.name),
                attr: self.registry.attribute_id(attribute.decl)?,
                required: attribute.required,
                value: attribute.value_constraint.clone(),
            });
        }
        let attrs = self.attr_table.push(uses);
        let any_attribute = info.any_attribute.as_ref().map(|w| self.wildcard(w));
        tracing::trace!(
            type_name = owner.as_str(),
            content = ?info.content,
            model = ?model,
            attributes = info.attributes.len(),
            "compiled complex type"
        );
        self.complex_types.push(RuntimeComplexType {
            mixed: info.content == ContentKind::Mixed,
            content: info.content,
            model,
            text: match info.content {
                ContentKind::Simple => info.validator,
                _ => None,
            },
            attrs,
            any_attribute,
        });
        Ok(ComplexRef(self.complex_types.len() as u32 - 1))
    }
}

/// Build the runtime schema
pub fn assemble(
    schema: &ParsedSchema,
    resolution: &Resolution,
    registry: &Registry,
    derivations: &Derivations,
    config: &CompileConfig,
) -> Result<RuntimeSchema> {
    let mut asm = Assembler {
        schema,
        resolution,
        registry,
        derivations,
        lowering: ModelLowering::new(schema, resolution, derivations, config),
        max_states: config.effective_max_dfa_states(),
        symbols: SymbolTable::new(),
        models: Models::new(),
        wildcards: Vec::new(),
        wildcard_index: HashMap::new(),
        wildcard_ns: Vec::new(),
        attr_table: AttrTable::new(),
        complex_types: Vec::new(),
    };

    let mut types = Vec::with_capacity(registry.type_count());
    for (_, slot) in registry.types() {
        let info = derivations.info(Assembler::type_ref(slot))?;
        let name = info.name.as_ref().map(|n| asm.symbols.intern(n));
        let base = match info.base {
            Some(base) => registry.type_id(base)?,
            None => TypeId::INVALID,
        };
        let complex = if info.simple {
            None
        } else {
            Some(asm.complex_type(info)?)
        };
        types.push(RuntimeType {
            name,
            kind: if info.simple { TypeKind::Simple } else { TypeKind::Complex },
            base,
            method: info.method,
            validator: if info.simple { info.validator } else { None },
            complex,
            block: info.block,
            final_set: info.final_set,
            is_abstract: info.is_abstract,
        });
    }

    let mut elements = Vec::with_capacity(registry.element_count());
    for (_, record) in registry.elements() {
        let decl = schema.element(record.key);
        let subst_head = match &decl.substitution_group {
            Some(head) => registry.element_id(resolution.element(head)?)?,
            None => ElemId::INVALID,
        };
        elements.push(RuntimeElement {
            name: asm.symbols.intern(&decl.name),
            type_id: registry.type_id(derivations.element_type(record.key))?,
            subst_head,
            nillable: decl.nillable,
            is_abstract: decl.is_abstract,
            block: decl.block,
            final_set: decl.final_set,
            value: decl.value_constraint.clone(),
            constraints: decl.constraints.iter().map(|c| c.index() as u32).collect(),
        });
    }

    let mut attributes = Vec::with_capacity(registry.attribute_count());
    for (_, record) in registry.attributes() {
        let decl = schema.attribute(record.key);
        attributes.push(RuntimeAttribute {
            name: asm.symbols.intern(&decl.name),
            validator: derivations.attribute_validator(record.key)?,
            value: decl.value_constraint.clone(),
        });
    }

    let mut constraints = Vec::with_capacity(schema.constraints.len());
    for constraint in &schema.constraints {
        let refer = match &constraint.refer {
            Some(name) => Some(resolution.constraint(name)?.index() as u32),
            None => None,
        };
        constraints.push(RuntimeConstraint {
            name: constraint.name.clone(),
            kind: constraint.kind,
            selector: constraint.selector.clone(),
            fields: constraint.fields.clone(),
            refer,
        });
    }

    let mut global_types = HashMap::new();
    for (name, id) in &registry.global_types {
        global_types.insert(asm.symbols.intern(name), *id);
    }
    let mut global_elements = HashMap::new();
    for (name, id) in &registry.global_elements {
        global_elements.insert(asm.symbols.intern(name), *id);
    }
    let mut global_attributes = HashMap::new();
    for (name, id) in &registry.global_attributes {
        global_attributes.insert(asm.symbols.intern(name), *id);
    }
    for name in schema.notations.keys() {
        asm.symbols.intern(name);
    }

    let mut runtime = RuntimeSchema {
        symbols: asm.symbols,
        types,
        complex_types: asm.complex_types,
        elements,
        attributes,
        models: asm.models,
        wildcards: asm.wildcards,
        wildcard_ns: asm.wildcard_ns,
        attr_table: asm.attr_table,
        validators: derivations.validators.clone(),
        constraints,
        global_types,
        global_elements,
        global_attributes,
        build_hash: 0,
    };
    runtime.build_hash = fingerprint(&runtime, config);
    tracing::debug!(
        types = runtime.types.len(),
        elements = runtime.elements.len(),
        attributes = runtime.attributes.len(),
        models = runtime.models.len(),
        nfas = runtime.models.nfas.len(),
        build_hash = format_args!("{:016x}", runtime.build_hash),
        "assembled runtime schema"
    );
    Ok(runtime)
}

fn value_constraint(fp: &mut Fingerprint, value: &Option<ValueConstraint>) {
    match value {
        None => fp.u32(0),
        Some(ValueConstraint::Default(v)) => fp.u32(1).str(v),
        Some(ValueConstraint::Fixed(v)) => fp.u32(2).str(v),
    };
}

/// Fold every table in a fixed order. Maps keyed by symbol are folded in
/// ID order, never in map order.
fn fingerprint(rt: &RuntimeSchema, config: &CompileConfig) -> u64 {
    let mut fp = Fingerprint::new();
    fp.tag("config")
        .u32(config.effective_max_dfa_states() as u32)
        .u32(config.max_occurs_limit)
        .u32(config.effective_max_positions() as u32);

    fp.tag("symbols").u32(rt.symbols.namespace_count() as u32);
    for ns in 0..rt.symbols.namespace_count() {
        fp.opt_str(rt.symbols.namespace(NamespaceId(ns as u32)));
    }
    for symbol in 0..rt.symbols.len() {
        if let Some((ns, local)) = rt.symbols.parts(super::SymbolId(symbol as u32)) {
            fp.u32(ns.0).str(local);
        }
    }

    fp.tag("types");
    for t in &rt.types {
        fp.u32(t.name.map_or(u32::MAX, |s| s.0))
            .bool(t.kind == TypeKind::Complex)
            .u32(t.base.0)
            .u32(u32::from(t.method.as_set().bits()))
            .u32(t.validator.map_or(u32::MAX, |v| v.0))
            .u32(t.complex.map_or(u32::MAX, |c| c.0))
            .u32(u32::from(t.block.bits()))
            .u32(u32::from(t.final_set.bits()))
            .bool(t.is_abstract);
    }

    fp.tag("complex");
    for c in &rt.complex_types {
        fp.bool(c.mixed).str(&format!("{:?}", c.content));
        match c.model {
            None => fp.u32(0),
            Some(ModelRef::Dfa(i)) => fp.u32(1).u32(i),
            Some(ModelRef::Nfa(i)) => fp.u32(2).u32(i),
            Some(ModelRef::All(i)) => fp.u32(3).u32(i),
        };
        fp.u32(c.text.map_or(u32::MAX, |v| v.0))
            .u32(c.attrs.offset)
            .u32(c.attrs.len)
            .u32(c.any_attribute.map_or(u32::MAX, |w| w.0));
    }

    fp.tag("attr-uses");
    for u in rt.attr_table.all_uses() {
        fp.u32(u.symbol.0).u32(u.attr.0).bool(u.required);
        value_constraint(&mut fp, &u.value);
    }

    fp.tag("dfas");
    for dfa in &rt.models.dfas {
        fp.u32(dfa.states.len() as u32);
        for state in &dfa.states {
            fp.bool(state.accepting).u32(state.transitions.len() as u32);
            for t in &state.transitions {
                fp.u32(t.symbol.0).u32(t.elem.0).u32(t.target);
            }
            fp.u32(state.wildcards.len() as u32);
            for w in &state.wildcards {
                fp.u32(w.rule.0).u32(w.target);
            }
        }
    }
    fp.tag("nfas");
    for nfa in &rt.models.nfas {
        fp.u32(nfa.start.offset)
            .u32(nfa.accept.offset)
            .bool(nfa.nullable)
            .u32(nfa.matchers.len() as u32);
        for (matcher, follow) in nfa.matchers.iter().zip(&nfa.follow) {
            match matcher {
                Matcher::Element { symbol, elem } => fp.u32(0).u32(symbol.0).u32(elem.0),
                Matcher::Wildcard { rule } => fp.u32(1).u32(rule.0),
            };
            fp.u32(follow.offset).u32(follow.len);
        }
        fp.u32(nfa.counters.len() as u32);
        for counter in &nfa.counters {
            fp.u32(counter.min).u32(counter.max.unwrap_or(u32::MAX));
        }
        for counter in &nfa.counted {
            fp.u32(counter.unwrap_or(u32::MAX));
        }
    }
    for word in rt.models.bits.as_words() {
        fp.u64(*word);
    }
    fp.tag("alls");
    for all in &rt.models.alls {
        fp.bool(all.emptiable).u32(all.members.len() as u32);
        for member in &all.members {
            fp.bool(member.optional).u32(member.alternatives.len() as u32);
            for (symbol, elem) in &member.alternatives {
                fp.u32(symbol.0).u32(elem.0);
            }
        }
    }

    fp.tag("wildcards");
    for w in &rt.wildcards {
        fp.str(&format!("{:?}", w.kind))
            .bool(w.has_target)
            .bool(w.has_local)
            .u32(w.offset)
            .u32(w.len)
            .str(&w.process_contents.to_string());
    }
    for ns in &rt.wildcard_ns {
        fp.u32(ns.0);
    }

    fp.tag("elements");
    for e in &rt.elements {
        fp.u32(e.name.0)
            .u32(e.type_id.0)
            .u32(e.subst_head.0)
            .bool(e.nillable)
            .bool(e.is_abstract)
            .u32(u32::from(e.block.bits()))
            .u32(u32::from(e.final_set.bits()));
        value_constraint(&mut fp, &e.value);
        for c in &e.constraints {
            fp.u32(*c);
        }
    }
    fp.tag("attributes");
    for a in &rt.attributes {
        fp.u32(a.name.0).u32(a.validator.0);
        value_constraint(&mut fp, &a.value);
    }

    fp.tag("validators");
    for (id, v) in rt.validators.iter() {
        fp.u32(id.0).opt_str(v.name.as_ref().map(|n| n.to_string()).as_deref());
        match &v.variety {
            TextVariety::Atomic(builtin) => fp.u32(0).str(builtin.name()),
            TextVariety::List(item) => fp.u32(1).u32(item.0),
            TextVariety::Union(members) => {
                fp.u32(2).u32(members.len() as u32);
                for m in members {
                    fp.u32(m.0);
                }
                &mut fp
            }
        };
        fp.str(&format!("{:?}", v.whitespace));
        for facet in &v.facets.sources {
            fp.str(&facet.kind.to_string()).str(&facet.value).bool(facet.fixed);
        }
    }

    fp.tag("constraints");
    for c in &rt.constraints {
        fp.str(&c.name.to_string())
            .str(&c.kind.to_string())
            .str(&c.selector.source)
            .u32(c.fields.len() as u32);
        for f in &c.fields {
            fp.str(&f.source);
        }
        fp.u32(c.refer.map_or(u32::MAX, |r| r));
    }

    // Global maps, in ID order
    fp.tag("globals");
    let mut globals: Vec<(u32, u32, u32)> = Vec::new();
    globals.extend(rt.global_types.iter().map(|(s, id)| (0, id.0, s.0)));
    globals.extend(rt.global_elements.iter().map(|(s, id)| (1, id.0, s.0)));
    globals.extend(rt.global_attributes.iter().map(|(s, id)| (2, id.0, s.0)));
    globals.sort_unstable();
    for (kind, id, symbol) in globals {
        fp.u32(kind).u32(id).u32(symbol);
    }
    fp.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::ModelRef;
    use crate::namespaces::QName;
    use crate::runtime::attr_index::AttrIndexKind;
    use crate::validators::SchemaCompiler;

    fn compile_with(body: &str, config: CompileConfig) -> Result<RuntimeSchema> {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        SchemaCompiler::new().with_config(config).compile_str(&xml)
    }

    #[test]
    fn test_ids_in_range() {
        let rt = compile_with(
            r#"<xs:element name="r"><xs:complexType><xs:sequence>
                 <xs:element name="a" type="xs:int"/><xs:element ref="g"/>
               </xs:sequence><xs:attribute name="x"/></xs:complexType></xs:element>
               <xs:element name="g" type="xs:string"/>"#,
            CompileConfig::default(),
        )
        .unwrap();
        for e in &rt.elements {
            assert!(e.type_id.is_valid() && e.type_id.slot() < rt.types.len());
        }
        for t in &rt.types {
            assert!(t.base == TypeId::INVALID || t.base.slot() < rt.types.len());
        }
        for u in rt.attr_table.all_uses() {
            assert!(u.attr.is_valid() && u.attr.slot() < rt.attributes.len());
        }
    }

    #[test]
    fn test_nfa_fallback_and_hash_depends_on_config() {
        let body = r#"<xs:element name="r"><xs:complexType><xs:sequence>
                        <xs:element name="a"/><xs:element name="b"/>
                      </xs:sequence></xs:complexType></xs:element>"#;
        let dfa = compile_with(body, CompileConfig::default()).unwrap();
        let nfa = compile_with(body, CompileConfig::default().with_max_dfa_states(1)).unwrap();
        let r = dfa.element_by_name(&QName::local("r")).unwrap();
        let t = dfa.element(r).unwrap().type_id;
        assert!(matches!(dfa.complex_of(t).unwrap().model, Some(ModelRef::Dfa(_))));
        let t = nfa.element(nfa.element_by_name(&QName::local("r")).unwrap()).unwrap().type_id;
        assert!(matches!(nfa.complex_of(t).unwrap().model, Some(ModelRef::Nfa(_))));
        assert_ne!(dfa.build_hash(), nfa.build_hash());
    }

    #[test]
    fn test_attribute_strategy() {
        let attrs: String = (0..70)
            .map(|i| format!(r#"<xs:attribute name="a{}"/>"#, i))
            .collect();
        let rt = compile_with(
            &format!(r#"<xs:complexType name="T">{}</xs:complexType>"#, attrs),
            CompileConfig::default(),
        )
        .unwrap();
        let t = rt.type_by_name(&QName::local("T")).unwrap();
        let complex = rt.complex_of(t).unwrap();
        assert_eq!(complex.attrs.kind, AttrIndexKind::Hash);
        let symbol = rt.symbols().lookup("", "a42").unwrap();
        assert!(rt.attr_table().find(complex.attrs, symbol).is_some());
    }
}
