//! Parsing-engine throughput: the waterfall chain over a realistic
//! free-text description row.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sacks::engine::RowParser;
use sacks::formats::compile_supplier;
use sacks::formats::lookup::{LookupSet, LookupTable};
use sacks::formats::model::SupplierDoc;
use sacks::formats::CompiledSupplier;
use sacks::grid::RowData;
use sacks::normalize::RowNormalizer;

fn waterfall_supplier() -> CompiledSupplier {
    let mut lookups = LookupSet::new();
    let mut brand = LookupTable::new("Brand");
    for (input, canonical) in [
        ("D&G", "Dolce & Gabbana"),
        ("CK", "Calvin Klein"),
        ("Armani", "Giorgio Armani"),
        ("CHANEL", "CHANEL"),
        ("YSL", "Yves Saint Laurent"),
    ] {
        brand.insert(input, canonical);
    }
    lookups.insert(brand);
    let mut gender = LookupTable::new("Gender");
    gender.insert("Wom", "Women");
    gender.insert("Men", "Men");
    lookups.insert(gender);
    let mut conc = LookupTable::new("Concentration");
    conc.insert("EDP", "EDP");
    conc.insert("EDT", "EDT");
    lookups.insert(conc);

    let doc: SupplierDoc = serde_json::from_str(
        r#"{
            "Name": "Bench", "Currency": "USD",
            "ParserConfig": { "ColumnRules": [{
                "Column": "A",
                "Actions": [
                    { "Op": "Assign", "Output": "Offer.Description" },
                    { "Op": "Find", "Output": "Brands",
                      "Parameters": { "Pattern": "lookup:Brand", "Options": "first,ignorecase,remove" } },
                    { "Op": "Map", "Input": "Brands", "Output": "Product.Brand",
                      "Parameters": { "Table": "Brand" } },
                    { "Op": "Find", "Input": "Brands.Clean", "Output": "Sizes",
                      "Parameters": { "Pattern": "(?i)(?<size>\\d+(?:\\.\\d+)?\\s*(?:ml|oz))", "Options": "first,remove" } },
                    { "Op": "Find", "Input": "Sizes", "Output": "Product.Size",
                      "Parameters": { "Pattern": "(?<num>\\d+(?:\\.\\d+)?)" } },
                    { "Op": "Find", "Input": "Sizes.Clean", "Output": "Concentrations",
                      "Parameters": { "Pattern": "lookup:Concentration", "Options": "first,remove" } },
                    { "Op": "Find", "Input": "Concentrations.Clean", "Output": "Genders",
                      "Parameters": { "Pattern": "lookup:Gender", "Options": "first,remove" } },
                    { "Op": "Map", "Input": "Genders", "Output": "Product.Gender",
                      "Parameters": { "Table": "Gender" } },
                    { "Op": "Assign", "Input": "Genders.Clean", "Output": "Product.Name" }
                ]
            }]}
        }"#,
    )
    .expect("bench supplier parses");
    compile_supplier(&doc, &lookups).expect("bench supplier compiles")
}

fn bench_waterfall(c: &mut Criterion) {
    let supplier = waterfall_supplier();
    let parser = RowParser::new(&supplier);
    let normalizer = RowNormalizer::new(&supplier);
    let row = RowData::new(0, vec!["D&G Devotion Intense Wom EDP (100ml)".to_string()]);

    c.bench_function("waterfall_parse_row", |b| {
        b.iter(|| parser.parse_row(black_box(&row)))
    });

    c.bench_function("waterfall_parse_and_normalize", |b| {
        b.iter(|| {
            let parsed = parser.parse_row(black_box(&row));
            normalizer.normalize(&parsed)
        })
    });
}

criterion_group!(benches, bench_waterfall);
criterion_main!(benches);
