//! Multi-document schema sets loaded from disk and memory

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use xsdstream::error::Error;
use xsdstream::{FsLoader, LoaderOptions, MemoryLoader, QName, SchemaCompiler, ValidationSession};

const MAIN: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="urn:main" xmlns="urn:main" xmlns:ext="urn:ext"
        elementFormDefault="qualified">
      <xs:include schemaLocation="types/common.xsd"/>
      <xs:import namespace="urn:ext" schemaLocation="ext.xsd"/>
      <xs:element name="doc">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="label" type="Label"/>
            <xs:element ref="ext:extra" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

// No targetNamespace: adopts the including document's namespace
const COMMON: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:simpleType name="Label">
        <xs:restriction base="xs:string"><xs:maxLength value="8"/></xs:restriction>
      </xs:simpleType>
    </xs:schema>"#;

const EXT: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="urn:ext" elementFormDefault="qualified">
      <xs:element name="extra" type="xs:boolean"/>
    </xs:schema>"#;

fn write(root: &Path, location: &str, content: &str) {
    let path = root.join(location);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn schema_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.xsd", MAIN);
    write(dir.path(), "types/common.xsd", COMMON);
    write(dir.path(), "ext.xsd", EXT);
    dir
}

#[test]
fn test_include_and_import_from_disk() {
    let dir = schema_dir();
    let schema = SchemaCompiler::new()
        .compile(&FsLoader::new(dir.path()), "main.xsd")
        .unwrap();
    assert!(schema.type_by_name(&QName::new("urn:main", "Label")).is_some());
    assert!(schema.element_by_name(&QName::new("urn:ext", "extra")).is_some());

    let mut session = ValidationSession::new(Arc::new(schema));
    let valid = r#"<doc xmlns="urn:main" xmlns:e="urn:ext"><label>short</label><e:extra>true</e:extra></doc>"#;
    let report = session.validate_bytes(valid.as_bytes()).unwrap();
    assert!(report.is_valid(), "{:?}", report.diagnostics);

    let too_long = r#"<doc xmlns="urn:main"><label>far too long</label></doc>"#;
    assert!(!session.validate_bytes(too_long.as_bytes()).unwrap().is_valid());
}

#[test]
fn test_compile_file_matches_loader() {
    let dir = schema_dir();
    let from_file = SchemaCompiler::new()
        .compile_file(dir.path().join("main.xsd"))
        .unwrap();
    let from_loader = SchemaCompiler::new()
        .compile(&FsLoader::new(dir.path()), "main.xsd")
        .unwrap();
    assert_eq!(from_file.build_hash(), from_loader.build_hash());
}

#[test]
fn test_memory_loader_matches_disk() {
    let dir = schema_dir();
    let loader = MemoryLoader::new()
        .with_document("main.xsd", MAIN)
        .with_document("types/common.xsd", COMMON)
        .with_document("ext.xsd", EXT);
    let in_memory = SchemaCompiler::new().compile(&loader, "main.xsd").unwrap();
    let on_disk = SchemaCompiler::new()
        .compile(&FsLoader::new(dir.path()), "main.xsd")
        .unwrap();
    assert_eq!(in_memory.build_hash(), on_disk.build_hash());
}

#[test]
fn test_missing_document_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.xsd", MAIN);
    let err = SchemaCompiler::new()
        .compile(&FsLoader::new(dir.path()), "main.xsd")
        .unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{}", err);
}

#[test]
fn test_locations_outside_the_root_are_refused() {
    let dir = schema_dir();
    let outside = TempDir::new().unwrap();
    write(outside.path(), "secret.xsd", EXT);
    let absolute = outside.path().join("secret.xsd");

    let entry = format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:import namespace="urn:ext" schemaLocation="{}"/>
           </xs:schema>"#,
        absolute.display()
    );
    write(dir.path(), "absolute.xsd", &entry);
    write(
        dir.path(),
        "escape.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:include schemaLocation="../../elsewhere.xsd"/>
           </xs:schema>"#,
    );
    write(
        dir.path(),
        "remote.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:import namespace="urn:ext" schemaLocation="https://example.com/ext.xsd"/>
           </xs:schema>"#,
    );

    let loader = FsLoader::new(dir.path());
    for entry in ["absolute.xsd", "escape.xsd", "remote.xsd"] {
        let err = SchemaCompiler::new().compile(&loader, entry).unwrap_err();
        assert!(matches!(err, Error::Load(_)), "{}: {}", entry, err);
    }

    let permissive = FsLoader::new(dir.path()).with_options(LoaderOptions::permissive());
    let schema = SchemaCompiler::new().compile(&permissive, "absolute.xsd").unwrap();
    assert!(schema.element_by_name(&QName::new("urn:ext", "extra")).is_some());
}

#[test]
fn test_document_size_limit() {
    let dir = schema_dir();
    let options = LoaderOptions {
        max_document_size: 64,
        ..LoaderOptions::default()
    };
    let loader = FsLoader::new(dir.path()).with_options(options);
    let err = SchemaCompiler::new().compile(&loader, "main.xsd").unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{}", err);
}
