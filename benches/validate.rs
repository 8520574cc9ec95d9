use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use xsdstream::*;

const ORDERS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="urn:po" xmlns="urn:po" xmlns:po="urn:po" elementFormDefault="qualified">
      <xs:element name="orders">
        <xs:complexType>
          <xs:sequence><xs:element ref="order" maxOccurs="unbounded"/></xs:sequence>
        </xs:complexType>
        <xs:key name="orderKey"><xs:selector xpath="po:order"/><xs:field xpath="@id"/></xs:key>
      </xs:element>
      <xs:element name="order">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="customer" type="xs:string"/>
            <xs:element name="item" maxOccurs="unbounded">
              <xs:complexType>
                <xs:simpleContent>
                  <xs:extension base="xs:string">
                    <xs:attribute name="qty" type="xs:positiveInteger" use="required"/>
                    <xs:attribute name="price" type="xs:decimal"/>
                  </xs:extension>
                </xs:simpleContent>
              </xs:complexType>
            </xs:element>
            <xs:element name="date" type="xs:date" minOccurs="0"/>
          </xs:sequence>
          <xs:attribute name="id" type="xs:ID" use="required"/>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

fn generate_document(orders: usize) -> String {
    let mut doc = String::from(r#"<orders xmlns="urn:po">"#);
    for i in 0..orders {
        doc.push_str(&format!(r#"<order id="o{i}"><customer>Customer {i}</customer>"#));
        for j in 0..5 {
            doc.push_str(&format!(r#"<item qty="{}" price="{}.50">Item {j}</item>"#, j + 1, i % 100));
        }
        doc.push_str("<date>2024-05-17</date></order>");
    }
    doc.push_str("</orders>");
    doc
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_orders_schema", |b| {
        b.iter(|| black_box(compile_str(black_box(ORDERS))).unwrap())
    });
}

fn bench_tokenize(c: &mut Criterion) {
    let doc = generate_document(1_000);
    let mut group = c.benchmark_group("tokenize");
    group.throughput(Throughput::Bytes(doc.len() as u64));
    group.bench_function("orders_1000", |b| {
        b.iter(|| {
            let mut tokenizer = Tokenizer::new(doc.as_bytes(), TokenizerOptions::for_validation());
            let mut count = 0usize;
            while !matches!(tokenizer.next_token().unwrap(), Token::Eof) {
                count += 1;
            }
            black_box(count)
        })
    });
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let schema = Arc::new(compile_str(ORDERS).unwrap());
    let mut group = c.benchmark_group("validate");
    for orders in [10usize, 100, 1_000] {
        let doc = generate_document(orders);
        group.throughput(Throughput::Bytes(doc.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(orders), &doc, |b, doc| {
            let mut session = ValidationSession::new(Arc::clone(&schema));
            b.iter(|| {
                let report = session.validate_bytes(black_box(doc.as_bytes())).unwrap();
                assert!(report.is_valid());
                black_box(report)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_tokenize, bench_validate);
criterion_main!(benches);
