//! Schema compiler
//!
//! Orchestrates the compile pipeline:
//! 1. load and parse every schema document reachable from the entry,
//! 2. resolve QName references,
//! 3. assign dense IDs,
//! 4. reject reference cycles,
//! 5. derive effective type properties,
//! 6. lower, UPA-check, and compile every content model while assembling
//!    the runtime schema.
//!
//! Any stage error aborts compilation.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::limits::CompileConfig;
use crate::loaders::{FsLoader, LoaderOptions, MemoryLoader, SchemaLoader};
use crate::runtime::{assemble, RuntimeSchema};

use super::cycles::check_cycles;
use super::derivation::derive;
use super::parsing::parse_schema;
use super::registry::build_registry;
use super::resolver::resolve;

/// Location under which in-memory sources are registered
pub const INLINE_LOCATION: &str = "schema.xsd";

/// Compiles XSD documents into a [`RuntimeSchema`]
#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    config: CompileConfig,
    loader_options: LoaderOptions,
}

impl SchemaCompiler {
    /// Create a compiler with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compile configuration
    pub fn with_config(mut self, config: CompileConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the options used by the loaders this compiler creates
    pub fn with_loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = options;
        self
    }

    /// The compile configuration
    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Compile the schema whose entry document is `entry` in `loader`
    pub fn compile(&self, loader: &dyn SchemaLoader, entry: &str) -> Result<RuntimeSchema> {
        let schema = parse_schema(loader, entry, &self.config)?;
        tracing::debug!(
            entry,
            documents = schema.documents.len(),
            declarations = schema.declaration_order.len(),
            "parsed schema documents"
        );
        let resolution = resolve(&schema)?;
        let registry = build_registry(&schema, &resolution)?;
        let type_order = check_cycles(&schema, &resolution)?;
        let derivations = derive(&schema, &resolution, &type_order)?;
        assemble(&schema, &resolution, &registry, &derivations, &self.config)
    }

    /// Compile and wrap for sharing between sessions
    pub fn compile_shared(&self, loader: &dyn SchemaLoader, entry: &str) -> Result<Arc<RuntimeSchema>> {
        self.compile(loader, entry).map(Arc::new)
    }

    /// Compile a single self-contained document
    pub fn compile_bytes(&self, source: &[u8]) -> Result<RuntimeSchema> {
        let loader = MemoryLoader::new()
            .with_options(self.loader_options.clone())
            .with_document(INLINE_LOCATION, source.to_vec());
        self.compile(&loader, INLINE_LOCATION)
    }

    /// Compile a single self-contained document
    pub fn compile_str(&self, source: &str) -> Result<RuntimeSchema> {
        self.compile_bytes(source.as_bytes())
    }

    /// Compile a schema from the file system; includes and imports are
    /// resolved relative to the entry's directory
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<RuntimeSchema> {
        let path = path.as_ref();
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let entry = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let loader = FsLoader::new(root).with_options(self.loader_options.clone());
        self.compile(&loader, &entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::namespaces::QName;

    const PURCHASE: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            targetNamespace="urn:po" xmlns="urn:po" elementFormDefault="qualified">
          <xs:element name="order" type="Order"/>
          <xs:complexType name="Order">
            <xs:sequence>
              <xs:element name="item" maxOccurs="unbounded">
                <xs:complexType>
                  <xs:simpleContent>
                    <xs:extension base="xs:string">
                      <xs:attribute name="qty" type="xs:positiveInteger" use="required"/>
                    </xs:extension>
                  </xs:simpleContent>
                </xs:complexType>
              </xs:element>
            </xs:sequence>
            <xs:attribute name="id" type="xs:ID"/>
          </xs:complexType>
        </xs:schema>"#;

    #[test]
    fn test_compile_purchase_order() {
        let rt = SchemaCompiler::new().compile_str(PURCHASE).unwrap();
        assert!(rt.element_by_name(&QName::new("urn:po", "order")).is_some());
        assert!(rt.type_by_name(&QName::new("urn:po", "Order")).is_some());
        assert_eq!(rt.element_count(), 2);
        assert_eq!(rt.attribute_count(), 2);
    }

    #[test]
    fn test_hash_is_stable() {
        let compiler = SchemaCompiler::new();
        let a = compiler.compile_str(PURCHASE).unwrap();
        let b = compiler.compile_str(PURCHASE).unwrap();
        assert_eq!(a.build_hash(), b.build_hash());
        let c = compiler
            .compile_str(&PURCHASE.replace("maxOccurs=\"unbounded\"", "maxOccurs=\"5\""))
            .unwrap();
        assert_ne!(a.build_hash(), c.build_hash());
    }

    #[test]
    fn test_stage_errors_abort() {
        let missing = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:element name="a" type="Missing"/>
            </xs:schema>"#;
        assert!(matches!(
            SchemaCompiler::new().compile_str(missing),
            Err(Error::Reference(_))
        ));
        assert!(matches!(
            SchemaCompiler::new().compile_str("<notxml"),
            Err(Error::Load(_)) | Err(Error::Syntax(_))
        ));
    }
}
