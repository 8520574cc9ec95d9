//! Runtime schema
//!
//! The immutable product of compilation: dense tables indexed by
//! [`TypeId`], [`ElemId`], and [`AttrId`], the compiled content models, the
//! wildcard rules, and the symbol table every name is interned in. A
//! `RuntimeSchema` is built once, never mutated, and shared by any number of
//! validation sessions.

pub mod assembler;
pub mod attr_index;
pub mod hash;
pub mod symbols;
pub mod wildcards;

use std::collections::HashMap;

use serde::Serialize;

use crate::automata::{ModelRef, Models};
use crate::namespaces::QName;
use crate::validators::identities::{ConstraintKind, PathExpr};
use crate::validators::{
    AttrId, ContentKind, DerivationMethod, DerivationSet, ElemId, TypeId, ValidatorId, ValidatorTable,
    ValueConstraint,
};

pub use assembler::assemble;
pub use attr_index::{AttrIndex, AttrIndexKind, AttrTable, AttrUse};
pub use symbols::{NamespaceId, SymbolId, SymbolTable, WildcardId};
pub use wildcards::{WildcardKind, WildcardRule};

/// Index into [`RuntimeSchema::complex_types`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ComplexRef(pub u32);

/// Simple or complex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// A simple type
    Simple,
    /// A complex type
    Complex,
}

/// A type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeType {
    /// Name; `None` for anonymous types
    pub name: Option<SymbolId>,
    /// Simple or complex
    pub kind: TypeKind,
    /// Base type; [`TypeId::INVALID`] for anyType
    pub base: TypeId,
    /// How the type derives from its base
    pub method: DerivationMethod,
    /// Text validator of simple types
    pub validator: Option<ValidatorId>,
    /// Complex part
    pub complex: Option<ComplexRef>,
    /// `block`
    pub block: DerivationSet,
    /// `final`
    pub final_set: DerivationSet,
    /// `abstract`
    pub is_abstract: bool,
}

/// The content and attributes of a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeComplexType {
    /// Whether text may interleave with children
    pub mixed: bool,
    /// Content kind
    pub content: ContentKind,
    /// Child content model; `None` when no children are allowed
    pub model: Option<ModelRef>,
    /// Validator of simple content
    pub text: Option<ValidatorId>,
    /// Attribute uses
    pub attrs: AttrIndex,
    /// Attribute wildcard
    pub any_attribute: Option<WildcardId>,
}

/// An element declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeElement {
    /// Name
    pub name: SymbolId,
    /// Type
    pub type_id: TypeId,
    /// Substitution group head; [`ElemId::INVALID`] when none
    pub subst_head: ElemId,
    /// `nillable`
    pub nillable: bool,
    /// `abstract`
    pub is_abstract: bool,
    /// `block`
    pub block: DerivationSet,
    /// `final`
    pub final_set: DerivationSet,
    /// Default or fixed value
    pub value: Option<ValueConstraint>,
    /// Identity constraints, as indexes into [`RuntimeSchema::constraints`]
    pub constraints: Vec<u32>,
}

/// An attribute declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeAttribute {
    /// Name
    pub name: SymbolId,
    /// Text validator
    pub validator: ValidatorId,
    /// Default or fixed value
    pub value: Option<ValueConstraint>,
}

/// An identity constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConstraint {
    /// Name
    pub name: QName,
    /// Kind
    pub kind: ConstraintKind,
    /// Selector program
    pub selector: PathExpr,
    /// Field programs
    pub fields: Vec<PathExpr>,
    /// Referenced key or unique of a keyref
    pub refer: Option<u32>,
}

/// A compiled schema
#[derive(Debug, Clone)]
pub struct RuntimeSchema {
    pub(crate) symbols: SymbolTable,
    pub(crate) types: Vec<RuntimeType>,
    pub(crate) complex_types: Vec<RuntimeComplexType>,
    pub(crate) elements: Vec<RuntimeElement>,
    pub(crate) attributes: Vec<RuntimeAttribute>,
    pub(crate) models: Models,
    pub(crate) wildcards: Vec<WildcardRule>,
    pub(crate) wildcard_ns: Vec<NamespaceId>,
    pub(crate) attr_table: AttrTable,
    pub(crate) validators: ValidatorTable,
    pub(crate) constraints: Vec<RuntimeConstraint>,
    pub(crate) global_types: HashMap<SymbolId, TypeId>,
    pub(crate) global_elements: HashMap<SymbolId, ElemId>,
    pub(crate) global_attributes: HashMap<SymbolId, AttrId>,
    pub(crate) build_hash: u64,
}

impl RuntimeSchema {
    /// 64-bit fingerprint, equal for byte-identical inputs and
    /// configuration
    pub fn build_hash(&self) -> u64 {
        self.build_hash
    }

    /// The symbol table
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// A symbol as a [`QName`]
    pub fn symbol_name(&self, symbol: SymbolId) -> Option<QName> {
        self.symbols.qname(symbol)
    }

    /// Number of types, built-ins included
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of element declarations
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of attribute declarations
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// A type by ID
    pub fn type_def(&self, id: TypeId) -> Option<&RuntimeType> {
        if !id.is_valid() {
            return None;
        }
        self.types.get(id.slot())
    }

    /// An element by ID
    pub fn element(&self, id: ElemId) -> Option<&RuntimeElement> {
        if !id.is_valid() {
            return None;
        }
        self.elements.get(id.slot())
    }

    /// An attribute by ID
    pub fn attribute(&self, id: AttrId) -> Option<&RuntimeAttribute> {
        if !id.is_valid() {
            return None;
        }
        self.attributes.get(id.slot())
    }

    /// The complex part of a type
    pub fn complex_type(&self, complex: ComplexRef) -> Option<&RuntimeComplexType> {
        self.complex_types.get(complex.0 as usize)
    }

    /// The complex part of a type, by type ID
    pub fn complex_of(&self, id: TypeId) -> Option<&RuntimeComplexType> {
        self.type_def(id)?.complex.and_then(|c| self.complex_type(c))
    }

    /// All compiled content models
    pub fn models(&self) -> &Models {
        &self.models
    }

    /// Kind and index of a content model, if it exists
    pub fn model(&self, model: ModelRef) -> Option<ModelRef> {
        let exists = match model {
            ModelRef::Dfa(i) => self.models.dfa(i).is_some(),
            ModelRef::Nfa(i) => self.models.nfa(i).is_some(),
            ModelRef::All(i) => self.models.all(i).is_some(),
        };
        exists.then_some(model)
    }

    /// A wildcard rule
    pub fn wildcard(&self, id: WildcardId) -> Option<&WildcardRule> {
        self.wildcards.get(id.0 as usize)
    }

    /// Whether a wildcard admits a namespace
    pub fn wildcard_admits(&self, id: WildcardId, namespace: NamespaceId) -> bool {
        self.wildcard(id)
            .map_or(false, |rule| rule.admits(namespace, &self.wildcard_ns))
    }

    /// The attribute-use table
    pub fn attr_table(&self) -> &AttrTable {
        &self.attr_table
    }

    /// Text validators
    pub fn validators(&self) -> &ValidatorTable {
        &self.validators
    }

    /// An identity constraint
    pub fn constraint(&self, index: u32) -> Option<&RuntimeConstraint> {
        self.constraints.get(index as usize)
    }

    /// A global element by name
    pub fn element_by_name(&self, name: &QName) -> Option<ElemId> {
        let symbol = self.symbols.lookup(&name.namespace, &name.local)?;
        self.global_element(symbol)
    }

    /// A global element by symbol
    pub fn global_element(&self, symbol: SymbolId) -> Option<ElemId> {
        self.global_elements.get(&symbol).copied()
    }

    /// A global type by name
    pub fn type_by_name(&self, name: &QName) -> Option<TypeId> {
        let symbol = self.symbols.lookup(&name.namespace, &name.local)?;
        self.global_type(symbol)
    }

    /// A global type by symbol
    pub fn global_type(&self, symbol: SymbolId) -> Option<TypeId> {
        self.global_types.get(&symbol).copied()
    }

    /// A global attribute by symbol
    pub fn global_attribute(&self, symbol: SymbolId) -> Option<AttrId> {
        self.global_attributes.get(&symbol).copied()
    }

    /// Display name of a type
    pub fn type_name(&self, id: TypeId) -> String {
        self.type_def(id)
            .and_then(|t| t.name)
            .and_then(|s| self.symbol_name(s))
            .map_or_else(|| "#anonymous".to_string(), |n| n.to_string())
    }

    /// The union of derivation methods from `from` up to `to`; `None` when
    /// `from` does not derive from `to`
    pub fn derivation_mask(&self, from: TypeId, to: TypeId) -> Option<DerivationSet> {
        let mut mask = DerivationSet::empty();
        let mut current = from;
        for _ in 0..=self.types.len() {
            if current == to {
                return Some(mask);
            }
            let def = self.type_def(current)?;
            mask = mask.union(def.method.as_set());
            current = def.base;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::ModelRef;
    use crate::validators::{Builtin, Registry};

    fn schema(body: &str) -> RuntimeSchema {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        crate::compile_str(&xml).unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let rt = schema(
            r#"<xs:element name="root" type="T"/>
               <xs:complexType name="T"><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>"#,
        );
        let root = rt.element_by_name(&QName::local("root")).unwrap();
        let t = rt.type_by_name(&QName::local("T")).unwrap();
        assert_eq!(rt.element(root).unwrap().type_id, t);
        let complex = rt.complex_of(t).unwrap();
        assert!(matches!(complex.model, Some(ModelRef::Dfa(_))));
        assert!(rt.element_by_name(&QName::local("a")).is_none());
        assert!(rt.element(ElemId::INVALID).is_none());
    }

    #[test]
    fn test_derivation_mask() {
        let rt = schema(
            r#"<xs:simpleType name="S"><xs:restriction base="xs:int"/></xs:simpleType>"#,
        );
        let s = rt.type_by_name(&QName::local("S")).unwrap();
        let decimal = Registry::builtin_id(Builtin::Decimal);
        assert_eq!(
            rt.derivation_mask(s, decimal),
            Some(DerivationSet::RESTRICTION)
        );
        assert_eq!(rt.derivation_mask(decimal, s), None);
        let any = Registry::builtin_id(Builtin::AnyType);
        assert!(rt.derivation_mask(s, any).is_some());
    }
}
