//! XML Schema components and the compile pipeline
//!
//! The parsed schema model lives here (declarations, types, particles,
//! facets) together with the stages that turn it into a runtime schema:
//! parsing, reference resolution, ID assignment, cycle detection,
//! derivation, content-model lowering, and UPA checking.

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Position in the arena
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }
    };
}

arena_key!(
    /// Arena index of a type definition
    TypeKey
);
arena_key!(
    /// Arena index of an element declaration
    ElementKey
);
arena_key!(
    /// Arena index of an attribute declaration
    AttributeKey
);
arena_key!(
    /// Arena index of a named model group
    GroupKey
);
arena_key!(
    /// Arena index of an attribute group
    AttributeGroupKey
);
arena_key!(
    /// Arena index of an identity constraint
    ConstraintKey
);

pub mod attributes;
pub mod builtins;
pub mod complex_types;
pub mod cycles;
pub mod derivation;
pub mod elements;
pub mod facets;
pub mod globals;
pub mod groups;
pub mod identities;
pub mod models;
pub mod parsing;
pub mod particles;
pub mod registry;
pub mod resolver;
pub mod schemas;
pub mod simple_types;
pub mod upa;
pub mod wildcards;

pub use attributes::{AttributeDecl, AttributeItem, AttributeUse, AttributeUseDef, ValueConstraint};
pub use builtins::Builtin;
pub use complex_types::{ComplexContent, ComplexTypeDef, ContentKind, DerivationMethod, DerivationSet};
pub use elements::{ElementDecl, TypeUse};
pub use facets::{FacetKind, FacetSpec, WhiteSpace};
pub use globals::{DeclarationKind, NotationDecl, ParsedSchema, TypeDef};
pub use groups::{Compositor, ModelGroup};
pub use identities::{ConstraintKind, IdentityConstraint};
pub use particles::{Occurs, Particle, Term};
pub use registry::{AttrId, ElemId, Registry, TypeId};
pub use resolver::{Resolution, TypeRef};
pub use schemas::SchemaCompiler;
pub use simple_types::{TextValidator, ValidatorId, ValidatorTable};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
