//! Loading Tests
//!
//! Loads the RAML fixtures under `tests/fixtures` from disk and checks the
//! resolved shape graph.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use raml_shapes::diagnostics::DiagnosticCode;
use raml_shapes::{Fragment, Position, Registry, ShapeError, ShapeId, ShapeKind, ShapeType};

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

fn load(relative: &str) -> (Registry, Fragment) {
    let mut registry = Registry::new();
    let fragment = registry
        .load(fixture(relative))
        .unwrap_or_else(|e| panic!("failed to load {}: {}", relative, e.trace()));
    (registry, fragment)
}

fn lookup(registry: &Registry, relative: &str, name: &str) -> ShapeId {
    registry
        .shape(fixture(relative), name)
        .unwrap_or_else(|| panic!("{} not declared in {}", name, relative))
}

fn property(registry: &Registry, owner: ShapeId, name: &str) -> ShapeId {
    registry.get(owner).properties().expect("object shape")[name]
}

// =============================================================================
// Libraries
// =============================================================================

#[test]
fn test_common_library_types() {
    let (registry, fragment) = load("libraries/common.raml");
    let library = fragment.as_library().expect("library fragment");

    assert_eq!(
        library.usage.as_deref(),
        Some("Shared building blocks for the people API")
    );
    let names: Vec<_> = library.types.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["Name", "Email", "Age", "Address", "Person", "Nickname", "Contact", "Token"]
    );
    assert_eq!(library.annotation_types.len(), 2);
    assert!(registry.unresolved().next().is_none());

    let age = lookup(&registry, "libraries/common.raml", "Age");
    match &registry.get(age).kind {
        ShapeKind::Integer(f) => {
            assert_eq!(f.minimum, Some(0.0));
            assert_eq!(f.maximum, Some(150.0));
        }
        other => panic!("Expected Integer, got {:?}", other),
    }

    let token = lookup(&registry, "libraries/common.raml", "Token");
    assert_eq!(registry.get(token).shape_type(), ShapeType::String);
}

#[test]
fn test_person_properties() {
    let (registry, _) = load("libraries/common.raml");
    let person = lookup(&registry, "libraries/common.raml", "Person");
    let name = lookup(&registry, "libraries/common.raml", "Name");
    let address = lookup(&registry, "libraries/common.raml", "Address");

    let properties: Vec<_> = registry
        .get(person)
        .properties()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert_eq!(properties, vec!["kind", "name", "age", "email", "tags", "addresses"]);

    // `name: Name` refines the declared Name
    let person_name = property(&registry, person, "name");
    assert_eq!(registry.get(person_name).base.inherits, vec![name]);
    match &registry.get(person_name).kind {
        ShapeKind::String(f) => assert_eq!(f.max_length, Some(50)),
        other => panic!("Expected String, got {:?}", other),
    }

    let email = property(&registry, person, "email");
    assert_eq!(registry.get(email).base.required, Some(false));

    let tags = property(&registry, person, "tags");
    let tag = registry.get(tags).items().unwrap();
    assert_eq!(registry.get(tag).shape_type(), ShapeType::String);

    // `Address[]` items alias the declared Address
    let addresses = property(&registry, person, "addresses");
    assert_eq!(registry.get(addresses).items(), Some(address));
}

#[test]
fn test_refinement_keeps_parent_facets() {
    let (registry, _) = load("libraries/common.raml");
    let nickname = lookup(&registry, "libraries/common.raml", "Nickname");
    match &registry.get(nickname).kind {
        ShapeKind::String(f) => {
            assert_eq!(f.min_length, Some(1));
            assert_eq!(f.max_length, Some(12));
        }
        other => panic!("Expected String, got {:?}", other),
    }
}

#[test]
fn test_union_members_in_source_order() {
    let (registry, _) = load("libraries/common.raml");
    let contact = lookup(&registry, "libraries/common.raml", "Contact");
    let person = lookup(&registry, "libraries/common.raml", "Person");
    let address = lookup(&registry, "libraries/common.raml", "Address");
    assert_eq!(registry.get(contact).any_of(), &[person, address]);
}

#[test]
fn test_annotations_bound_to_annotation_types() {
    let (registry, _) = load("libraries/common.raml");
    let person = lookup(&registry, "libraries/common.raml", "Person");
    let since = lookup(&registry, "libraries/common.raml", "since");
    let annotation = &registry.get(person).base.custom_domain_properties["since"];
    assert_eq!(annotation.defined_by, Some(since));
    assert_eq!(annotation.extension.as_str(), Some("1.2"));
}

// =============================================================================
// Cross-file references
// =============================================================================

#[test]
fn test_reference_through_library_alias() {
    let (registry, fragment) = load("libraries/people.raml");
    let person = lookup(&registry, "libraries/common.raml", "Person");
    let employee = lookup(&registry, "libraries/people.raml", "Employee");

    assert_eq!(
        fragment.uses().get("common"),
        Some(&fixture("libraries/common.raml"))
    );
    assert_eq!(registry.get(employee).base.inherits, vec![person]);

    let properties: Vec<_> = registry
        .get(employee)
        .properties()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert_eq!(
        properties,
        vec!["kind", "name", "age", "email", "tags", "addresses", "employeeId"]
    );

    let team = lookup(&registry, "libraries/people.raml", "Team");
    let members = property(&registry, team, "members");
    assert_eq!(registry.get(members).items(), Some(person));
    let lead = property(&registry, team, "lead");
    assert_eq!(registry.get(lead).base.inherits, vec![employee]);
}

#[test]
fn test_multiple_inheritance() {
    let (registry, _) = load("libraries/people.raml");

    let badge = lookup(&registry, "libraries/people.raml", "Badge");
    match &registry.get(badge).kind {
        ShapeKind::Object(f) => {
            assert_eq!(f.additional_properties, Some(false));
            assert!(f.properties.is_empty());
        }
        other => panic!("Expected Object, got {:?}", other),
    }
    assert_eq!(registry.get(badge).base.inherits.len(), 2);

    // first parent wins; the disagreement is only a warning
    let mixed = lookup(&registry, "libraries/people.raml", "Mixed");
    assert_eq!(registry.get(mixed).shape_type(), ShapeType::Object);
    let divergent: Vec<_> = registry
        .diagnostics()
        .with_code(DiagnosticCode::DivergentParentKinds)
        .collect();
    assert_eq!(divergent.len(), 1);
    assert!(divergent[0].subject.ends_with("#Mixed"));
}

#[test]
fn test_annotation_through_library_alias() {
    let (registry, _) = load("libraries/people.raml");
    let flagged = lookup(&registry, "libraries/people.raml", "Flagged");
    let internal = lookup(&registry, "libraries/common.raml", "internal");
    let annotation = &registry.get(flagged).base.custom_domain_properties["common.internal"];
    assert_eq!(annotation.defined_by, Some(internal));
}

// =============================================================================
// Includes and data types
// =============================================================================

#[test]
fn test_included_data_type() {
    let (registry, _) = load("api/main.raml");
    let profile = lookup(&registry, "api/main.raml", "Profile");
    let person_fragment = registry
        .fragment(fixture("types/person.raml"))
        .and_then(Fragment::as_data_type)
        .cloned()
        .expect("person data type cached");

    let shape = registry.get(profile);
    assert_eq!(shape.shape_type(), ShapeType::Object);
    assert_eq!(shape.base.inherits, vec![person_fragment.shape]);
    assert_eq!(shape.base.link, Some(fixture("types/person.raml")));

    let properties = shape.properties().unwrap();
    assert!(properties.contains_key("name"));
    assert!(properties.contains_key("nickname"));

    let data_type = registry.get(person_fragment.shape);
    assert_eq!(data_type.name(), "person");
    assert_eq!(
        data_type.base.description.as_deref(),
        Some("A person as exchanged over the wire")
    );
}

#[test]
fn test_json_shorthand_include() {
    let (registry, _) = load("api/main.raml");
    let user = lookup(&registry, "api/main.raml", "UserDoc");
    match &registry.get(user).kind {
        ShapeKind::Json(json) => assert!(json.schema.contains("json-schema.org")),
        other => panic!("Expected Json, got {:?}", other),
    }
}

#[test]
fn test_included_examples_are_shared() {
    let (registry, _) = load("api/main.raml");
    let sample = lookup(&registry, "api/main.raml", "Sample");
    let other = lookup(&registry, "api/main.raml", "Other");

    let a = registry.get(sample).base.examples[0].link.clone().expect("linked example");
    let b = registry.get(other).base.examples[0].link.clone().expect("linked example");
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.mime.as_deref(), Some("application/json"));

    let value = registry.get(sample).base.examples[0]
        .effective_value()
        .map(|v| v.to_json())
        .unwrap();
    assert_eq!(value["name"], "Ada");
}

#[test]
fn test_compound_expressions_across_libraries() {
    let (registry, _) = load("api/main.raml");
    let employee = lookup(&registry, "libraries/people.raml", "Employee");
    let team = lookup(&registry, "libraries/people.raml", "Team");

    let staff = lookup(&registry, "api/main.raml", "Staff");
    assert_eq!(registry.get(staff).items(), Some(employee));

    let lookup_shape = lookup(&registry, "api/main.raml", "Lookup");
    let members = registry.get(lookup_shape).any_of();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0], team);
    assert_eq!(registry.get(members[1]).shape_type(), ShapeType::Nil);
}

#[test]
fn test_ignored_sections_are_reported() {
    let (registry, _) = load("api/main.raml");
    let ignored: Vec<_> = registry
        .diagnostics()
        .with_code(DiagnosticCode::IgnoredSection)
        .collect();
    assert_eq!(ignored.len(), 1);
    assert!(ignored[0].message.contains("traits"));
}

#[test]
fn test_library_cycle_through_uses() {
    let (registry, _) = load("cycles/a.raml");
    let a = lookup(&registry, "cycles/a.raml", "A");
    let b = lookup(&registry, "cycles/b.raml", "B");

    let partner = property(&registry, a, "partner");
    assert_eq!(registry.get(partner).base.inherits, vec![b]);
    let back = property(&registry, b, "partner");
    assert_eq!(registry.get(back).base.inherits, vec![a]);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_self_reference_is_cyclic() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("cycles/self.raml")).unwrap_err();
    match err {
        ShapeError::CyclicType { name, .. } => assert_eq!(name, "Foo"),
        other => panic!("Expected CyclicType, got {:?}", other),
    }
}

#[test]
fn test_mutual_reference_is_cyclic() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("cycles/mutual.raml")).unwrap_err();
    assert!(matches!(err, ShapeError::CyclicType { .. }));
}

#[test]
fn test_unknown_header() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("invalid/trait.raml")).unwrap_err();
    match err {
        ShapeError::FragmentHeaderMismatch { found, .. } => assert_eq!(found, "#%RAML 1.0 Trait"),
        other => panic!("Expected FragmentHeaderMismatch, got {:?}", other),
    }
}

#[test]
fn test_uses_must_name_a_library() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("invalid/uses_data_type.raml")).unwrap_err();
    match err {
        ShapeError::FragmentHeaderMismatch { expected, found, .. } => {
            assert_eq!(expected, "#%RAML 1.0 Library");
            assert_eq!(found, "#%RAML 1.0 DataType");
        }
        other => panic!("Expected FragmentHeaderMismatch, got {:?}", other),
    }
}

#[test]
fn test_bad_expression_reports_offset() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("invalid/bad_expression.raml")).unwrap_err();
    match &err {
        ShapeError::TypeExpressionSyntax { expression, location, .. } => {
            assert_eq!(expression, "(string | integer");
            assert_eq!(location.path, fixture("invalid/bad_expression.raml"));
            // `Broken: "(string | integer"` is line 3, value at column 11
            assert_eq!(location.position, Position::new(3, 11));
            let path = fixture("invalid/bad_expression.raml");
            assert!(err.to_string().starts_with(&format!("{}:3:11: ", path.display())));
        }
        other => panic!("Expected TypeExpressionSyntax, got {:?}", other),
    }
}

#[test]
fn test_declarations_keep_source_positions() {
    let mut registry = Registry::new();
    let err = registry.load(fixture("cycles/mutual.raml")).unwrap_err();
    let location = err.location().expect("cycle error has a location");
    assert_eq!(location.path, fixture("cycles/mutual.raml"));
    assert!(location.position.line >= 3);

    let (registry, _) = load("types/person.raml");
    let shape = registry.shape(fixture("types/person.raml"), "person").unwrap();
    assert!(registry.get(shape).base.position.is_known());
}
