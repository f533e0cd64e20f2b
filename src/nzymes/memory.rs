//! In-memory host
//!
//!     A [Site] is a content store and an authorization service built from a YAML or JSON
//!     document, used by the command line tool and by tests:
//!
//!         authors:
//!           - id: 2
//!             login: ann
//!             roles: [Coder]
//!             capabilities: [share_dynamic_custom_fields]
//!             fields:
//!               signature: "-- Ann"
//!         items:
//!           - id: 10
//!             slug: hello
//!             kind: post
//!             author: 2
//!             date: 2021-03-04T05:06:07Z
//!             fields:
//!               tags: [one, two]
//!
//!     A field written as a list holds several values, anything else holds one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::host::{
    Author, AuthorId, Authorization, ContentId, ContentItem, ContentStore, Entity,
};
use super::policy::{Capability, Role};
use super::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML site: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON site: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAuthor {
    #[serde(flatten)]
    pub author: Author,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Granted on top of the roles
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteItem {
    #[serde(flatten)]
    pub item: ContentItem,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub authors: Vec<SiteAuthor>,
    #[serde(default)]
    pub items: Vec<SiteItem>,
}

impl Site {
    pub fn from_yaml_str(source: &str) -> Result<Self, SiteError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, SiteError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a site file; `.json` files are read as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SiteError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| SiteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    fn site_item(&self, id: ContentId) -> Option<&SiteItem> {
        self.items.iter().find(|entry| entry.item.id == id)
    }

    fn site_author(&self, id: AuthorId) -> Option<&SiteAuthor> {
        self.authors.iter().find(|entry| entry.author.id == id)
    }
}

fn values_of(stored: Option<&Value>) -> Vec<Value> {
    match stored {
        None => Vec::new(),
        Some(Value::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
    }
}

fn content_attribute(item: &ContentItem, name: &str) -> Option<Value> {
    let value = match name {
        "id" => Value::from(item.id),
        "slug" => Value::from(item.slug.as_str()),
        "kind" => Value::from(item.kind.as_str()),
        "status" => Value::from(item.status.as_str()),
        "author" => Value::from(item.author),
        "date" => Value::from(item.date.to_rfc3339()),
        "title" => Value::from(item.title.as_str()),
        _ => return None,
    };
    Some(value)
}

fn author_attribute(author: &Author, name: &str) -> Option<Value> {
    let value = match name {
        "id" => Value::from(author.id),
        "login" => Value::from(author.login.as_str()),
        "display_name" => Value::from(author.display_name.as_str()),
        _ => return None,
    };
    Some(value)
}

impl ContentStore for Site {
    fn content(&self, id: ContentId) -> Option<ContentItem> {
        self.site_item(id).map(|entry| entry.item.clone())
    }

    fn find_by_slug(&self, slug: &str, kinds: &[String]) -> Option<ContentId> {
        let mut matching = self.items.iter().filter(|entry| entry.item.slug == slug);
        if kinds.is_empty() {
            return matching.next().map(|entry| entry.item.id);
        }
        let matching: Vec<&SiteItem> = matching.collect();
        kinds.iter().find_map(|kind| {
            matching
                .iter()
                .find(|entry| &entry.item.kind == kind)
                .map(|entry| entry.item.id)
        })
    }

    fn author(&self, id: AuthorId) -> Option<Author> {
        self.site_author(id).map(|entry| entry.author.clone())
    }

    fn fields(&self, entity: Entity<'_>, name: &str) -> Vec<Value> {
        match entity {
            Entity::Content(item) => {
                values_of(self.site_item(item.id).and_then(|e| e.fields.get(name)))
            }
            Entity::Author(author) => {
                values_of(self.site_author(author.id).and_then(|e| e.fields.get(name)))
            }
        }
    }

    fn attribute(&self, entity: Entity<'_>, name: &str) -> Option<Value> {
        match entity {
            Entity::Content(item) => content_attribute(item, name).or_else(|| {
                self.site_item(item.id)
                    .and_then(|e| e.attributes.get(name).cloned())
            }),
            Entity::Author(author) => author_attribute(author, name).or_else(|| {
                self.site_author(author.id)
                    .and_then(|e| e.attributes.get(name).cloned())
            }),
        }
    }
}

impl Authorization for Site {
    fn author_can(&self, author: AuthorId, capability: Capability) -> bool {
        self.site_author(author).is_some_and(|entry| {
            entry.capabilities.contains(&capability)
                || entry.roles.iter().any(|role| role.can(capability))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SITE: &str = r#"
authors:
  - id: 2
    login: ann
    display_name: Ann
    roles: [User]
    capabilities: [share_static_custom_fields]
    fields:
      signature: "-- Ann"
    attributes:
      city: Rome
items:
  - id: 10
    slug: hello
    kind: post
    author: 2
    date: 2021-03-04T05:06:07Z
    title: Hello
    fields:
      tags: [one, two]
      color: blue
  - id: 11
    slug: hello
    kind: page
    status: draft
    author: 2
    date: 2021-03-04T05:06:07Z
"#;

    fn site() -> Site {
        Site::from_yaml_str(SITE).unwrap()
    }

    #[test]
    fn loads_items_and_authors() {
        let site = site();
        let item = site.content(10).unwrap();
        assert_eq!(item.slug, "hello");
        assert_eq!(item.title, "Hello");
        assert_eq!(site.content(11).unwrap().status.as_str(), "draft");
        assert_eq!(site.author(2).unwrap().display_name, "Ann");
        assert!(site.content(12).is_none());
    }

    #[test]
    fn slugs_follow_kind_order() {
        let site = site();
        let kinds = |k: &[&str]| k.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(site.find_by_slug("hello", &kinds(&["page", "post"])), Some(11));
        assert_eq!(site.find_by_slug("hello", &kinds(&["post", "page"])), Some(10));
        assert_eq!(site.find_by_slug("hello", &[]), Some(10));
        assert_eq!(site.find_by_slug("hello", &kinds(&["attachment"])), None);
    }

    #[test]
    fn list_fields_hold_several_values() {
        let site = site();
        let item = site.content(10).unwrap();
        assert_eq!(
            site.fields(Entity::Content(&item), "tags"),
            vec![json!("one"), json!("two")]
        );
        assert_eq!(site.fields(Entity::Content(&item), "color"), vec![json!("blue")]);
        assert!(site.fields(Entity::Content(&item), "nothing").is_empty());
        let author = site.author(2).unwrap();
        assert_eq!(
            site.fields(Entity::Author(&author), "signature"),
            vec![json!("-- Ann")]
        );
    }

    #[test]
    fn attributes_are_builtin_or_extra() {
        let site = site();
        let item = site.content(10).unwrap();
        assert_eq!(site.attribute(Entity::Content(&item), "id"), Some(json!(10)));
        assert_eq!(
            site.attribute(Entity::Content(&item), "date"),
            Some(json!("2021-03-04T05:06:07+00:00"))
        );
        let author = site.author(2).unwrap();
        assert_eq!(site.attribute(Entity::Author(&author), "login"), Some(json!("ann")));
        assert_eq!(site.attribute(Entity::Author(&author), "city"), Some(json!("Rome")));
        assert_eq!(site.attribute(Entity::Author(&author), "zip"), None);
    }

    #[test]
    fn capabilities_come_from_roles_and_grants() {
        let site = site();
        assert!(site.author_can(2, Capability::Inject));
        assert!(site.author_can(2, Capability::ShareStaticCustomFields));
        assert!(!site.author_can(2, Capability::CreateDynamicCustomFields));
        assert!(!site.author_can(3, Capability::Inject));
    }

    #[test]
    fn load_reads_json_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"authors": [{{"id": 1, "login": "root", "roles": ["Administrator"]}}]}}"#
        )
        .unwrap();
        let site = Site::load(file.path()).unwrap();
        assert!(site.author_can(1, Capability::UseOthersAttributes));
        assert!(site.items.is_empty());
    }

    #[test]
    fn load_reports_missing_files() {
        let err = Site::load("/nonexistent/site.yaml").unwrap_err();
        assert!(matches!(err, SiteError::Io { .. }));
    }
}
