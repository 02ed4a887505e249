//! Bundled demo services used by `modelrpc serve`, `schema` and `call`.
//!
//! - `Greeter`: one synchronous unary method
//! - `ChatService`: every streaming shape, all async
//! - `library.v1.Library`: recursive messages, enums, maps, optionals,
//!   unions and not-found errors

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use modelrpc_core::types::Constraint;
use modelrpc_core::{
    AppState, AppStateInner, Describe, EnumDecl, HandlerError, HttpRule, Message, MessageDecl,
    ServiceBuilder, ServiceDeclaration, Streaming, TypeDecl, ValidationFailure,
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Greeter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

impl Describe for HelloRequest {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("HelloRequest", || {
            MessageDecl::new()
                .doc("Who to greet.")
                .field::<String>("name")
                .described("Name of the person to greet.")
                .constrained(Constraint::MinLen(1))
        })
    }
}

impl Message for HelloRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

impl Describe for HelloReply {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("HelloReply", || MessageDecl::new().field::<String>("message"))
    }
}

impl Message for HelloReply {}

pub fn greeter() -> ServiceDeclaration {
    ServiceBuilder::new("Greeter")
        .doc("Says hello.")
        .unary("say_hello", |request: HelloRequest, _ctx| {
            Ok::<_, HandlerError>(HelloReply {
                message: format!("Hello, {}!", request.name),
            })
        })
        .with_doc("Greet one person by name.")
        .build()
}

// ---------------------------------------------------------------------------
// ChatService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
}

impl Describe for ChatMessage {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("ChatMessage", || {
            MessageDecl::new()
                .doc("A chat message.")
                .field::<String>("user")
                .field::<String>("text")
        })
    }
}

impl Message for ChatMessage {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Describe for ChatResponse {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("ChatResponse", || {
            MessageDecl::new()
                .doc("A response from the chat service.")
                .field::<String>("message")
                .field::<DateTime<Utc>>("timestamp")
        })
    }
}

impl Message for ChatResponse {}

fn reply(message: String) -> ChatResponse {
    ChatResponse {
        message,
        timestamp: Utc::now(),
    }
}

/// Number of updates `StreamUpdates` sends per request.
pub const UPDATE_COUNT: usize = 3;

pub fn chat() -> ServiceDeclaration {
    ServiceBuilder::new("ChatService")
        .doc("A chat service demonstrating every streaming pattern.")
        .unary_async("send_message", |request: ChatMessage, _ctx| async move {
            Ok::<_, HandlerError>(reply(format!(
                "Received from {}: {}",
                request.user, request.text
            )))
        })
        .with_doc("Send a single message and get a response.")
        .server_streaming_async("stream_updates", |request: ChatMessage, _ctx| {
            async_stream::stream! {
                for i in 0..UPDATE_COUNT {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    yield Ok::<_, HandlerError>(reply(format!(
                        "Update {} for {}: Processing '{}'",
                        i + 1,
                        request.user,
                        request.text
                    )));
                }
            }
        })
        .with_doc("Send a message and receive a stream of updates.")
        .client_streaming_async("batch_send", |mut requests: Streaming<ChatMessage>, _ctx| async move {
            let mut count = 0;
            let mut users = std::collections::BTreeSet::new();
            while let Some(message) = requests.next().await {
                count += 1;
                users.insert(message.user);
            }
            Ok::<_, HandlerError>(reply(format!(
                "Received {} messages from {} users",
                count,
                users.len()
            )))
        })
        .with_doc("Send many messages and get one summary.")
        .bidi_streaming_async("chat_session", |requests: Streaming<ChatMessage>, _ctx| {
            async_stream::stream! {
                for await message in requests {
                    yield Ok::<_, HandlerError>(reply(format!(
                        "Echo from server: {} said '{}'",
                        message.user, message.text
                    )));
                    yield Ok(reply(format!("Server acknowledges message from {}", message.user)));
                }
            }
        })
        .with_doc("Real-time chat: two replies per message.")
        .build()
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Fiction,
    History,
    Science,
}

impl Describe for Genre {
    fn describe() -> TypeDecl {
        TypeDecl::enumeration::<Self>(
            EnumDecl::new("Genre")
                .member("FICTION", 1)
                .member("HISTORY", 2)
                .member("SCIENCE", 3),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub born: Option<i32>,
}

impl Describe for Author {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Author", || {
            MessageDecl::new()
                .field::<String>("name")
                .field::<Option<i32>>("born")
                .described("Year of birth, when known.")
        })
    }
}

impl Message for Author {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub genre: Genre,
    pub author: Author,
    pub tags: Vec<String>,
    pub ratings: HashMap<String, i32>,
    pub published: Option<DateTime<Utc>>,
}

impl Describe for Book {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Book", || {
            MessageDecl::new()
                .doc("A book in the catalogue.")
                .reserved(3)
                .field::<i64>("id")
                .field::<String>("title")
                .field::<Genre>("genre")
                .field::<Author>("author")
                .field::<Vec<String>>("tags")
                .field::<HashMap<String, i32>>("ratings")
                .described("Ratings by reviewer, 1 to 5.")
                .field::<Option<DateTime<Utc>>>("published")
        })
    }
}

impl Message for Book {
    fn validate(&self) -> Result<(), ValidationFailure> {
        for (reviewer, rating) in &self.ratings {
            if !(1..=5).contains(rating) {
                return Err(ValidationFailure::single(
                    "ratings",
                    format!("rating from {} must be between 1 and 5", reviewer),
                ));
            }
        }
        Ok(())
    }
}

/// Either a numeric id or an exact title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookKey {
    #[serde(rename = "int64")]
    Id(i64),
    #[serde(rename = "string")]
    Title(String),
}

impl Describe for BookKey {
    fn describe() -> TypeDecl {
        TypeDecl::union(vec![i64::describe(), String::describe()])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindBook {
    pub key: BookKey,
}

impl Describe for FindBook {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("FindBook", || MessageDecl::new().field::<BookKey>("key"))
    }
}

impl Message for FindBook {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreFilter {
    pub genre: Genre,
    pub limit: i32,
}

impl Describe for GenreFilter {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("GenreFilter", || {
            MessageDecl::new()
                .field::<Genre>("genre")
                .field::<i32>("limit")
                .constrained(Constraint::Ge(1.0))
                .constrained(Constraint::Le(100.0))
        })
    }
}

impl Message for GenreFilter {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub children: Vec<Category>,
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

impl Category {
    fn size(&self) -> i32 {
        1 + self.children.iter().map(Category::size).sum::<i32>()
    }
}

pub fn catalogue() -> Vec<Book> {
    let le_guin = Author {
        name: "Ursula K. Le Guin".to_string(),
        born: Some(1929),
    };
    let beard = Author {
        name: "Mary Beard".to_string(),
        born: Some(1955),
    };
    vec![
        Book {
            id: 1,
            title: "The Dispossessed".to_string(),
            genre: Genre::Fiction,
            author: le_guin.clone(),
            tags: vec!["anarchism".to_string(), "physics".to_string()],
            ratings: HashMap::from([("ada".to_string(), 5)]),
            published: Utc.with_ymd_and_hms(1974, 5, 1, 0, 0, 0).single(),
        },
        Book {
            id: 2,
            title: "A Wizard of Earthsea".to_string(),
            genre: Genre::Fiction,
            author: le_guin,
            tags: vec!["magic".to_string()],
            ratings: HashMap::new(),
            published: None,
        },
        Book {
            id: 3,
            title: "SPQR".to_string(),
            genre: Genre::History,
            author: beard,
            tags: vec!["rome".to_string()],
            ratings: HashMap::from([("grace".to_string(), 4)]),
            published: Utc.with_ymd_and_hms(2015, 10, 20, 0, 0, 0).single(),
        },
    ]
}

pub fn library() -> ServiceDeclaration {
    let books = Arc::new(catalogue());
    let by_key = books.clone();
    let by_genre = books;

    ServiceBuilder::new("Library")
        .namespace("library.v1")
        .doc("A small read-only catalogue.")
        .unary("find_book", move |request: FindBook, _ctx| {
            let found = by_key.iter().find(|book| match &request.key {
                BookKey::Id(id) => book.id == *id,
                BookKey::Title(title) => &book.title == title,
            });
            found
                .cloned()
                .ok_or_else(|| HandlerError::not_found(format!("no book matches {:?}", request.key)))
        })
        .with_doc("Look a book up by id or by exact title.")
        .with_http(HttpRule::post("/v1/books:find").body("*"))
        .server_streaming("list_books", move |filter: GenreFilter, _ctx| {
            let matching: Vec<Book> = by_genre
                .iter()
                .filter(|book| book.genre == filter.genre)
                .take(filter.limit as usize)
                .cloned()
                .collect();
            matching.into_iter().map(Ok::<_, HandlerError>)
        })
        .with_doc("Stream every book of one genre.")
        .with_http(
            HttpRule::get("/v1/books")
                .additional_binding(HttpRule::get("/v1/genres/{genre}/books")),
        )
        .unary("count_categories", |root: Category, _ctx| {
            Ok::<_, HandlerError>(root.size())
        })
        .with_doc("Count the nodes of a category tree.")
        .with_option("idempotency_level", "NO_SIDE_EFFECTS")
        .build()
}

/// Compile the demo services into a runnable state.
pub fn demo_state(package: Option<&str>) -> Result<AppState, String> {
    let mut builder = AppStateInner::builder()
        .mount(greeter())
        .mount(chat())
        .mount(library());
    if let Some(package) = package {
        builder = builder.package(package);
    }
    builder
        .build()
        .map_err(|e| format!("Failed to compile demo services: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_size_counts_every_node() {
        let tree = Category {
            name: "root".to_string(),
            children: vec![
                Category {
                    name: "a".to_string(),
                    children: vec![Category {
                        name: "a1".to_string(),
                        children: vec![],
                    }],
                },
                Category {
                    name: "b".to_string(),
                    children: vec![],
                },
            ],
        };
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn test_demo_state_compiles_without_rejections() {
        let state = demo_state(None).expect("demo services should compile");
        assert!(state.rejected().is_empty());
        assert_eq!(state.schema.package, "greeter.v1");
        assert_eq!(
            state.schema.packages(),
            vec!["greeter.v1".to_string(), "library.v1".to_string()]
        );
    }
}
