mod common;

use common::{brand, catalog_schema, photo, product, product_with_photos, record_set};
use syncly_core::{
    diff, IdentityError, ModelSchema, NaturalKey, Record, RecordError, RecordLink, RecordSet,
    Schema, SchemaError, Value,
};

fn keys(keys: Vec<&NaturalKey>) -> Vec<String> {
    keys.into_iter().map(|k| k.to_string()).collect()
}

#[test]
fn scenario_products_created_and_deleted() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product(&schema, "A", 10.0), product(&schema, "B", 5.0)]);
    let destination = record_set(&schema, vec![product(&schema, "B", 5.0), product(&schema, "C", 1.0)]);

    let plan = diff(&source, &destination).unwrap();
    let products = plan.model("product").unwrap();

    assert_eq!(keys(products.create_keys()), vec!["A"]);
    assert_eq!(keys(products.delete_keys()), vec!["C"]);
    assert!(products.updates.is_empty());
    assert_eq!(products.unchanged, 1);
}

#[test]
fn scenario_price_change_is_a_single_field_update() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product(&schema, "A", 10.0)]);
    let destination = record_set(&schema, vec![product(&schema, "A", 9.5)]);

    let plan = diff(&source, &destination).unwrap();
    let products = plan.model("product").unwrap();

    assert!(products.creates.is_empty());
    assert!(products.deletes.is_empty());
    let update = products.update(&NaturalKey::from("A")).unwrap();
    let changed = update.changed_fields();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed.get("price"), Some(&Value::Float(10.0)));
    assert_eq!(update.changes[0].destination, Some(Value::Float(9.5)));
}

#[test]
fn disjoint_keys_create_all_source_and_delete_all_unignored_destination() {
    let schema = catalog_schema();
    let source = record_set(
        &schema,
        vec![product(&schema, "A", 1.0), product(&schema, "B", 2.0), product(&schema, "C", 3.0)],
    );
    let destination = record_set(
        &schema,
        vec![
            product(&schema, "X", 1.0),
            product(&schema, "Y", 2.0),
            brand(&schema, "Acme"),
        ],
    );

    let plan = diff(&source, &destination).unwrap();
    let products = plan.model("product").unwrap();
    assert_eq!(keys(products.create_keys()), vec!["A", "B", "C"]);
    assert_eq!(keys(products.delete_keys()), vec!["X", "Y"]);
    assert!(products.updates.is_empty());

    let brands = plan.model("brand").unwrap();
    assert!(brands.deletes.is_empty());
    assert_eq!(brands.skipped, 1);
}

#[test]
fn identical_sets_diff_to_nothing_twice() {
    let schema = catalog_schema();
    let records = vec![
        product_with_photos(&schema, "A", 10.0, &["a1.jpg", "a2.jpg"]),
        product(&schema, "B", 5.0),
    ];
    let source = record_set(&schema, records.clone());
    let destination = record_set(&schema, records);

    let first = diff(&source, &destination).unwrap();
    let second = diff(&source, &destination).unwrap();

    assert!(!first.has_changes());
    assert_eq!(first, second);
    let summary = first.summary();
    assert_eq!(summary.no_change, 4);
    assert_eq!(summary.create + summary.update + summary.delete, 0);
}

#[test]
fn source_only_compares_attributes_it_expresses() {
    let schema = catalog_schema();
    let sparse = Record::builder(schema.model("product").unwrap())
        .field("productnumber", "A")
        .field("price", 10.0)
        .build()
        .unwrap();
    let source = record_set(&schema, vec![sparse]);
    let destination = record_set(&schema, vec![product(&schema, "A", 10.0)]);

    let plan = diff(&source, &destination).unwrap();
    assert!(!plan.has_changes());
}

#[test]
fn int_and_float_prices_differ() {
    let schema = catalog_schema();
    let as_int = Record::builder(schema.model("product").unwrap())
        .field("productnumber", "A")
        .field("name", "Product A")
        .field("price", 10_i64)
        .build()
        .unwrap();
    let source = record_set(&schema, vec![as_int]);
    let destination = record_set(&schema, vec![product(&schema, "A", 10.0)]);

    let plan = diff(&source, &destination).unwrap();
    let update = plan.model("product").unwrap().update(&NaturalKey::from("A")).unwrap();
    assert_eq!(update.changed_fields().get("price"), Some(&Value::Int(10)));
}

#[test]
fn ignored_destination_records_are_never_deleted() {
    let schema = catalog_schema();
    let mut reference = product_with_photos(&schema, "REF", 1.0, &["ref.jpg"]);
    reference.set_ignore(true);
    let source = RecordSet::new(schema.clone());
    let destination = record_set(&schema, vec![reference, brand(&schema, "Acme")]);

    let plan = diff(&source, &destination).unwrap();
    assert!(!plan.has_changes());
    // product, its photo and the brand
    assert_eq!(plan.summary().skip, 3);
}

#[test]
fn ignored_source_records_are_neither_created_nor_updated() {
    let schema = catalog_schema();
    let mut skipped_new = product(&schema, "NEW", 1.0);
    skipped_new.set_ignore(true);
    let mut skipped_changed = product(&schema, "OLD", 2.0);
    skipped_changed.set_ignore(true);

    let source = record_set(&schema, vec![skipped_new, skipped_changed]);
    let destination = record_set(&schema, vec![product(&schema, "OLD", 1.0)]);

    let plan = diff(&source, &destination).unwrap();
    let products = plan.model("product").unwrap();
    assert!(products.creates.is_empty());
    assert!(products.updates.is_empty());
    // The destination copy is matched by key, so it is not deleted either.
    assert!(products.deletes.is_empty());
    assert_eq!(products.skipped, 2);
}

#[test]
fn new_child_of_existing_parent_is_a_child_create_only() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg", "a2.jpg"])]);
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg"])]);

    let plan = diff(&source, &destination).unwrap();
    let products = plan.model("product").unwrap();
    assert!(!products.has_changes());

    let photos = plan.model("photo").unwrap();
    assert_eq!(keys(photos.create_keys()), vec!["a2.jpg"]);
    let parent = photos.creates[0].parent.as_ref().unwrap();
    assert_eq!(parent.model, "product");
    assert_eq!(parent.key, NaturalKey::from("A"));
}

#[test]
fn plan_lists_parents_before_children() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg"])]);
    let destination = RecordSet::new(schema.clone());

    let plan = diff(&source, &destination).unwrap();
    let order: Vec<&str> = plan.models().iter().map(|m| m.model.as_str()).collect();
    assert_eq!(order, vec!["product", "brand", "photo"]);
}

#[test]
fn diff_refuses_record_sets_of_different_schemas() {
    let schema = catalog_schema();
    let other = std::sync::Arc::new(Schema::new(vec![ModelSchema::new("product", &["sku"])]).unwrap());
    let err = diff(&RecordSet::new(schema), &RecordSet::new(other)).unwrap_err();
    assert_eq!(err, SchemaError::Mismatch);
}

#[test]
fn records_without_usable_identifiers_are_rejected_before_diffing() {
    let schema = catalog_schema();
    let model = schema.model("product").unwrap();

    let missing = Record::builder(model).field("name", "No number").build().unwrap_err();
    assert_eq!(
        missing,
        RecordError::Identity(IdentityError::MissingField {
            model: "product".into(),
            field: "productnumber".into(),
        })
    );

    let empty = Record::builder(model).field("productnumber", "").build().unwrap_err();
    assert!(matches!(
        empty,
        RecordError::Identity(IdentityError::EmptyField { .. })
    ));
}

#[test]
fn display_renders_changes_as_a_tree() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product(&schema, "A", 10.0), product(&schema, "B", 2.0)]);
    let destination = record_set(&schema, vec![product(&schema, "A", 9.5), product(&schema, "C", 1.0)]);

    let rendered = diff(&source, &destination).unwrap().to_string();
    assert!(rendered.contains("* product"));
    assert!(rendered.contains("  ! A"));
    assert!(rendered.contains("    + price: 10"));
    assert!(rendered.contains("    - price: 9.5"));
    assert!(rendered.contains("  + B"));
    assert!(rendered.contains("  - C"));
    assert!(!rendered.contains("* photo"));
}

#[test]
fn json_output_carries_keys_and_changes() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product(&schema, "A", 10.0)]);
    let destination = record_set(&schema, vec![product(&schema, "A", 9.5)]);

    let json = diff(&source, &destination).unwrap().to_json_pretty().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let products = parsed["models"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["model"] == "product")
        .unwrap();
    assert_eq!(products["updates"][0]["key"], serde_json::json!(["A"]));
    assert_eq!(products["updates"][0]["changes"][0]["name"], "price");
    assert_eq!(products["updates"][0]["changes"][0]["source"], 10.0);
}

#[test]
fn photo_helper_builds_child_records() {
    let schema = catalog_schema();
    let child = photo(&schema, "x.jpg");
    assert_eq!(child.model(), "photo");
    assert_eq!(child.key(), &NaturalKey::from("x.jpg"));
}

#[test]
fn child_under_a_new_owner_is_a_move() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "B", 1.0, &["x.jpg"])]);
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["x.jpg"])]);

    let plan = diff(&source, &destination).unwrap();

    let photos = plan.model("photo").unwrap();
    assert_eq!(photos.unchanged, 0);
    assert!(photos.creates.is_empty());
    assert!(photos.deletes.is_empty());
    let moved = photos.update(&NaturalKey::from("x.jpg")).unwrap();
    assert!(moved.is_move());
    assert!(moved.changes.is_empty());
    assert_eq!(moved.parent, Some(RecordLink::new("product", NaturalKey::from("B"))));
    assert_eq!(moved.moved_from, Some(RecordLink::new("product", NaturalKey::from("A"))));

    let products = plan.model("product").unwrap();
    assert_eq!(keys(products.create_keys()), vec!["B"]);
    let old_owner = products.delete(&NaturalKey::from("A")).unwrap();
    assert!(old_owner.kept_children.is_empty());

    let summary = plan.summary();
    assert_eq!((summary.create, summary.update, summary.delete), (1, 1, 1));
}

#[test]
fn same_owner_on_both_sides_is_not_a_move() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["x.jpg"])]);
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["x.jpg"])]);

    let photos = diff(&source, &destination).unwrap().model("photo").unwrap().clone();
    assert!(photos.updates.is_empty());
    assert_eq!(photos.unchanged, 1);
}

#[test]
fn delete_lists_children_that_stay_behind() {
    let schema = catalog_schema();
    let kept = Record::builder(schema.model("photo").unwrap())
        .field("url", "keep.jpg")
        .ignore()
        .build()
        .unwrap();
    let owner = Record::builder(schema.model("product").unwrap())
        .field("productnumber", "A")
        .field("price", 1.0)
        .child(kept)
        .build()
        .unwrap();
    let destination = record_set(&schema, vec![owner]);

    let plan = diff(&RecordSet::new(schema.clone()), &destination).unwrap();

    let delete = plan.model("product").unwrap().delete(&NaturalKey::from("A")).unwrap();
    assert_eq!(
        delete.kept_children,
        vec![RecordLink::new("photo", NaturalKey::from("keep.jpg"))]
    );
    let photos = plan.model("photo").unwrap();
    assert!(photos.deletes.is_empty());
    assert_eq!(photos.skipped, 1);
}

#[test]
fn children_deleted_with_their_owner_are_not_kept() {
    let schema = catalog_schema();
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg"])]);

    let plan = diff(&RecordSet::new(schema.clone()), &destination).unwrap();

    let delete = plan.model("product").unwrap().delete(&NaturalKey::from("A")).unwrap();
    assert!(delete.kept_children.is_empty());
}

#[test]
fn display_nests_children_under_their_owner() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg", "a2.jpg"])]);
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["a1.jpg"])]);

    let rendered = diff(&source, &destination).unwrap().to_string();
    assert!(
        rendered.starts_with("* product\n  * A\n    * photo\n      + a2.jpg\n        + alt: alt for a2.jpg\n"),
        "rendered:\n{rendered}"
    );
    assert!(!rendered.contains("a1.jpg"));
}

#[test]
fn display_shows_a_move_under_the_new_owner() {
    let schema = catalog_schema();
    let source = record_set(&schema, vec![product_with_photos(&schema, "B", 1.0, &["x.jpg"])]);
    let destination = record_set(&schema, vec![product_with_photos(&schema, "A", 1.0, &["x.jpg"])]);

    let rendered = diff(&source, &destination).unwrap().to_string();
    assert!(rendered.contains("  + B\n"), "rendered:\n{rendered}");
    assert!(rendered.contains("    * photo\n      ! x.jpg\n        + parent: product B\n        - parent: product A\n"));
    assert!(rendered.contains("  - A\n"));
}
