//! Integration tests for schema compilation and rendering.
//!
//! Services are declared through the public builder API, compiled, and the
//! resulting documents and proto text are inspected.

use modelrpc_core::render::render_proto;
use modelrpc_core::types::{CollectionKind, TypeDescriptor};
use modelrpc_core::{
    AppStateInner, CompileOptions, Describe, HandlerError, Message, MessageDecl, SchemaCompiler,
    SchemaError, ServiceBuilder, ServiceDeclaration, TypeDecl,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Category {
    name: String,
    children: Vec<Category>,
}

impl Describe for Category {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Category", || {
            MessageDecl::new()
                .field::<String>("name")
                .field::<Vec<Category>>("children")
        })
    }
}

impl Message for Category {}

#[derive(Debug, Serialize, Deserialize)]
struct Author {
    name: String,
    books: Vec<Book>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Book {
    title: String,
    author: Option<Author>,
}

impl Describe for Author {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Author", || {
            MessageDecl::new()
                .field::<String>("name")
                .field::<Vec<Book>>("books")
        })
    }
}

impl Message for Author {}

impl Describe for Book {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Book", || {
            MessageDecl::new()
                .field::<String>("title")
                .field::<Option<Author>>("author")
        })
    }
}

impl Message for Book {}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Empty {}

impl Describe for Empty {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Empty", MessageDecl::new)
    }
}

impl Message for Empty {}

/// Two unrelated types that both call themselves `Item`.
mod inventory {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Item {
        pub sku: String,
    }

    impl Describe for Item {
        fn describe() -> TypeDecl {
            TypeDecl::message::<Self>("Item", || MessageDecl::new().field::<String>("sku"))
        }
    }

    impl Message for Item {}
}

mod shop {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Item {
        pub price: f64,
    }

    impl Describe for Item {
        fn describe() -> TypeDecl {
            TypeDecl::message::<Self>("Item", || MessageDecl::new().field::<f64>("price"))
        }
    }

    impl Message for Item {}
}

fn library() -> ServiceDeclaration {
    ServiceBuilder::new("LibraryService")
        .unary("get_category", |category: Category, _ctx| {
            Ok::<_, HandlerError>(category)
        })
        .unary("get_author", |author: Author, _ctx| Ok::<_, HandlerError>(author))
        .unary("get_book", |book: Book, _ctx| Ok::<_, HandlerError>(book))
        .build()
}

fn compile(services: &[ServiceDeclaration]) -> Result<modelrpc_core::SchemaDocument, SchemaError> {
    SchemaCompiler::new(CompileOptions::default()).compile(services)
}

#[test]
fn test_compile_twice_is_identical() {
    let first = compile(&[library()]).expect("first compile");
    let second = compile(&[library()]).expect("second compile");
    assert_eq!(first, second);
    assert_eq!(render_proto(&first), render_proto(&second));
}

#[test]
fn test_recursive_types_compile_once() {
    let doc = compile(&[library()]).expect("library should compile");
    assert_eq!(doc.package, "library.v1");

    let names: Vec<&str> = doc.messages.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Category", "Author", "Book"]);

    let category = doc.message_by_name("Category").expect("Category");
    let TypeDescriptor::Collection(children) = &category.field("children").expect("children").ty
    else {
        panic!("children should be a collection");
    };
    assert_eq!(children.kind, CollectionKind::List);
    assert!(children.element.is_reference());

    // The Book/Author cycle closes with a reference.
    let book = doc.message_by_name("library.v1.Book").expect("Book");
    let author_field = book.field("author").expect("author");
    assert!(author_field.optional);
    assert!(author_field.ty.is_reference());

    let service = doc.service("LibraryService").expect("service");
    let get_book = service.method("GetBook").expect("GetBook");
    assert!(get_book.input.is_reference());
    assert_eq!(
        doc.message(get_book.input.composite_id().expect("message input"))
            .map(|m| m.name.as_str()),
        Some("Book")
    );
}

#[test]
fn test_same_name_different_shape_conflicts() {
    let first = ServiceBuilder::new("Inventory")
        .unary("lookup", |item: inventory::Item, _ctx| {
            Ok::<_, HandlerError>(item.sku)
        })
        .build();
    let second = ServiceBuilder::new("Shop")
        .unary("price", |item: shop::Item, _ctx| Ok::<_, HandlerError>(item.price))
        .build();

    let err = compile(&[first, second]).unwrap_err();
    match err {
        SchemaError::SchemaConflict { name, .. } => assert_eq!(name, "inventory.v1.Item"),
        other => panic!("expected a schema conflict, got {:?}", other),
    }
}

#[test]
fn test_namespaces_keep_same_names_apart() {
    let first = ServiceBuilder::new("Inventory")
        .unary("lookup", |item: inventory::Item, _ctx| {
            Ok::<_, HandlerError>(item.sku)
        })
        .build();
    let second = ServiceBuilder::new("Shop")
        .namespace("shop.v1")
        .unary("price", |item: shop::Item, _ctx| Ok::<_, HandlerError>(item.price))
        .build();

    let doc = compile(&[first, second]).expect("namespaced services should compile");
    let full_names: Vec<String> = doc.messages.iter().map(|m| m.full_name()).collect();
    assert_eq!(full_names, vec!["inventory.v1.Item", "shop.v1.Item"]);
    assert_eq!(doc.packages(), vec!["inventory.v1", "shop.v1"]);

    let files = render_proto(&doc);
    assert_eq!(files.len(), 2);
    assert!(files["shop.v1"].contains("service Shop {"));
    assert!(files["shop.v1"].contains("message Item {\n  double price = 1;\n}"));
}

#[test]
fn test_empty_service_and_empty_message() {
    let idle = ServiceBuilder::new("Idle").build();
    let ping = ServiceBuilder::new("Ping")
        .unary("ping", |_: Empty, _ctx| Ok::<_, HandlerError>(Empty::default()))
        .build();

    let doc = SchemaCompiler::new(CompileOptions {
        default_package: Some("ops.v1".to_string()),
    })
    .compile(&[idle, ping])
    .expect("empty declarations should compile");

    assert!(doc.services[0].methods.is_empty());
    let text = &render_proto(&doc)["ops.v1"];
    assert!(text.contains("service Idle {\n}"));
    assert!(text.contains("rpc Ping (Empty) returns (Empty);"));
    assert!(text.contains("message Empty {\n}"));
}

#[test]
fn test_unsupported_field_type_reports_path() {
    #[derive(Serialize, Deserialize)]
    struct Blob {
        payload: serde_json::Value,
    }

    impl Describe for Blob {
        fn describe() -> TypeDecl {
            TypeDecl::message::<Self>("Blob", || {
                MessageDecl::new().field::<serde_json::Value>("payload")
            })
        }
    }

    impl Message for Blob {}

    let service = ServiceBuilder::new("Store")
        .unary("put", |blob: Blob, _ctx| Ok::<_, HandlerError>(blob.payload.to_string()))
        .build();
    assert_eq!(service.methods.len(), 1);

    let err = compile(&[service]).unwrap_err();
    match err {
        SchemaError::UnsupportedType { path, .. } => {
            assert_eq!(path, "Store.Put(request).payload")
        }
        other => panic!("expected an unsupported type, got {:?}", other),
    }
}

#[test]
fn test_state_reports_rejected_methods() {
    let service = ServiceBuilder::new("Health")
        .unary("check", |text: String, _ctx| Ok::<_, HandlerError>(text))
        .unary("status", |text: String, _ctx| Ok::<_, HandlerError>(text))
        .build();
    let state = AppStateInner::builder()
        .mount(service)
        .build()
        .expect("remaining methods should compile");

    assert_eq!(state.method_list(), vec!["/health.v1.Health/Status"]);
    let rejected = state.rejected();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].method(), "Check");
}
