//! Host contracts
//!
//!     The engine never owns content, users or code execution. A host plugs them in through
//!     the traits in this module:
//!
//!         ContentStore   content items, their authors, custom fields and built-in attributes
//!         Authorization  which capabilities an author holds
//!         Sandbox        evaluation of stored code
//!
//!     The stage pipeline contract lives with its in-memory implementation in
//!     [pipeline](super::pipeline). An in-memory host for files and tests is in
//!     [memory](super::memory).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::Capability;
use super::value::Value;

pub type ContentId = u64;
pub type AuthorId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    #[default]
    Publish,
    Draft,
    Pending,
    Private,
    Future,
    Trash,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Publish => "publish",
            ContentStatus::Draft => "draft",
            ContentStatus::Pending => "pending",
            ContentStatus::Private => "private",
            ContentStatus::Future => "future",
            ContentStatus::Trash => "trash",
        }
    }
}

/// A content item of the host: a post, a page, or any other kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub slug: String,
    pub kind: String,
    #[serde(default)]
    pub status: ContentStatus,
    pub author: AuthorId,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

/// What a field or attribute is read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entity<'a> {
    Content(&'a ContentItem),
    Author(&'a Author),
}

/// Lookup of content items, authors and their data.
pub trait ContentStore {
    fn content(&self, id: ContentId) -> Option<ContentItem>;

    /// The first item with the slug, trying the kinds in order. No kinds means any kind.
    fn find_by_slug(&self, slug: &str, kinds: &[String]) -> Option<ContentId>;

    fn author(&self, id: AuthorId) -> Option<Author>;

    /// All values stored under a custom field name, in storage order.
    fn fields(&self, entity: Entity<'_>, name: &str) -> Vec<Value>;

    /// A built-in attribute, like a title or a login.
    fn attribute(&self, entity: Entity<'_>, name: &str) -> Option<Value>;

    /// Filter the kinds a slug is searched among.
    fn slug_kinds(&self, kinds: Vec<String>) -> Vec<String> {
        kinds
    }

    /// Provide an item for a `@@slug` that does not exist.
    fn missing_content(&self, _slug: &str) -> Option<ContentItem> {
        None
    }
}

pub trait Authorization {
    fn author_can(&self, author: AuthorId, capability: Capability) -> bool;
}

/// What a sandbox call produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub value: Value,
    /// A parse or runtime failure; the value is discarded when set
    pub error: Option<String>,
    /// Anything printed while running
    pub output: String,
}

impl Evaluation {
    pub fn value(value: Value) -> Self {
        Evaluation {
            value,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Evaluation {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// What stored code can see and touch while it runs.
#[derive(Debug)]
pub struct ExecutionScope<'a> {
    /// The item whose field holds the code
    pub origin: &'a ContentItem,
    /// The item being processed, if any
    pub processed: Option<&'a ContentItem>,
    /// Shared by the injections of the item being processed
    pub intra: &'a mut Value,
    /// Shared by everything the engine processes
    pub extra: &'a mut Value,
    continue_injecting: &'a mut bool,
}

impl<'a> ExecutionScope<'a> {
    pub fn new(
        origin: &'a ContentItem,
        processed: Option<&'a ContentItem>,
        intra: &'a mut Value,
        extra: &'a mut Value,
        continue_injecting: &'a mut bool,
    ) -> Self {
        ExecutionScope {
            origin,
            processed,
            intra,
            extra,
            continue_injecting,
        }
    }

    /// Leave the remaining injections of the current content untouched.
    pub fn stop_injecting(&mut self) {
        *self.continue_injecting = false;
    }

    pub fn is_injecting(&self) -> bool {
        *self.continue_injecting
    }
}

/// Evaluation of code stored in custom fields.
pub trait Sandbox {
    /// Run `code` with positional `arguments`.
    ///
    /// Failures are reported in the returned [Evaluation]. A panic is caught by the engine
    /// unless it was configured otherwise.
    fn evaluate(&self, code: &str, arguments: &[Value], scope: &mut ExecutionScope<'_>)
        -> Evaluation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn scope_can_stop_injecting() {
        let item = ContentItem {
            id: 1,
            slug: "a".into(),
            kind: "post".into(),
            status: ContentStatus::Publish,
            author: 1,
            date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            title: String::new(),
        };
        let (mut intra, mut extra, mut go_on) = (Value::Null, Value::Null, true);
        let mut scope = ExecutionScope::new(&item, None, &mut intra, &mut extra, &mut go_on);
        *scope.intra = json!({"seen": true});
        scope.stop_injecting();
        assert!(!scope.is_injecting());
        assert!(!go_on);
        assert_eq!(intra, json!({"seen": true}));
    }

    #[test]
    fn item_defaults_when_deserialized() {
        let item: ContentItem = serde_json::from_value(json!({
            "id": 3, "slug": "home", "kind": "page", "author": 2,
            "date": "2021-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(item.status, ContentStatus::Publish);
        assert_eq!(item.title, "");
    }

    #[test]
    fn evaluation_builders() {
        let failed = Evaluation::failure("boom").with_output("partial");
        assert_eq!(failed.value, Value::Null);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.output, "partial");
        assert_eq!(Evaluation::value(json!(3)).error, None);
    }
}
