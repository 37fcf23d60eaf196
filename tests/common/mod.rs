#![allow(dead_code)]

use std::sync::Arc;

use syncly_core::{ModelSchema, Record, RecordSet, Schema};

/// Brands are reference-only, products own photos.
pub fn catalog_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            ModelSchema::new("photo", &["url"])
                .with_attributes(&["alt", "position"])
                .with_parent("product"),
            ModelSchema::new("product", &["productnumber"])
                .with_attributes(&["name", "price", "brand"]),
            ModelSchema::new("brand", &["name"]),
        ])
        .expect("catalog schema is valid"),
    )
}

pub fn product(schema: &Schema, number: &str, price: f64) -> Record {
    Record::builder(schema.model("product").unwrap())
        .field("productnumber", number)
        .field("name", format!("Product {number}"))
        .field("price", price)
        .build()
        .unwrap()
}

pub fn product_with_photos(schema: &Schema, number: &str, price: f64, photos: &[&str]) -> Record {
    let children: Vec<Record> = photos.iter().map(|url| photo(schema, url)).collect();
    Record::builder(schema.model("product").unwrap())
        .field("productnumber", number)
        .field("name", format!("Product {number}"))
        .field("price", price)
        .children(children)
        .build()
        .unwrap()
}

pub fn photo(schema: &Schema, url: &str) -> Record {
    Record::builder(schema.model("photo").unwrap())
        .field("url", url)
        .field("alt", format!("alt for {url}"))
        .build()
        .unwrap()
}

pub fn brand(schema: &Schema, name: &str) -> Record {
    Record::builder(schema.model("brand").unwrap())
        .field("name", name)
        .ignore()
        .build()
        .unwrap()
}

pub fn record_set(schema: &Arc<Schema>, records: Vec<Record>) -> RecordSet {
    let mut set = RecordSet::new(Arc::clone(schema));
    for record in records {
        set.insert(record).unwrap();
    }
    set
}
