//! Cacheable surfaces and how each expands into concrete paths.
//!
//! A surface kind ("post_page", "homepage", ...) is registered under a name
//! with one of three scopes. Adding a kind means registering a scope, never
//! touching the expansion code.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::events::InvalidationEvent;

pub const POST_PAGE: &str = "post_page";
pub const PAGE_PAGE: &str = "page_page";
pub const HOMEPAGE: &str = "homepage";
pub const CATEGORY_PAGE: &str = "category_page";
pub const AUTHOR_PAGE: &str = "author_page";
pub const TAG_PAGE: &str = "tag_page";
pub const ARCHIVE_PAGE: &str = "archive_page";
pub const FEED: &str = "feed";
pub const SITEMAP: &str = "sitemap";

const PLACEHOLDER: &str = "{id}";

static STANDARD_SURFACES: Lazy<SurfaceRegistry> = Lazy::new(|| {
    let mut registry = SurfaceRegistry::empty();
    registry.register(POST_PAGE, SurfaceScope::entity("post", "/blog/post-{id}"));
    registry.register(PAGE_PAGE, SurfaceScope::entity("page", "/{id}"));
    registry.register(HOMEPAGE, SurfaceScope::singleton_with_sections("/", "/?section={id}"));
    registry.register(CATEGORY_PAGE, SurfaceScope::list("/category/{id}"));
    registry.register(AUTHOR_PAGE, SurfaceScope::list("/author/{id}"));
    registry.register(TAG_PAGE, SurfaceScope::list("/tag/{id}"));
    registry.register(ARCHIVE_PAGE, SurfaceScope::list("/archive/{id}"));
    registry.register(FEED, SurfaceScope::singleton("/feed.xml"));
    registry.register(SITEMAP, SurfaceScope::singleton("/sitemap.xml"));
    registry
});

/// A path pattern with an `{id}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_placeholder(&self) -> bool {
        self.0.contains(PLACEHOLDER)
    }

    pub fn render(&self, id: &str) -> String {
        self.0.replace(PLACEHOLDER, id)
    }
}

/// How a surface kind turns an event into paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceScope {
    /// One page per entity: the event's own entity when its type matches,
    /// plus every discriminator listed for the surface.
    Entity {
        entity_type: String,
        template: PathTemplate,
    },
    /// A single page, plus one per listed section when sections are templated.
    Singleton {
        path: String,
        sections: Option<PathTemplate>,
    },
    /// One page per listed discriminator; nothing when none are listed.
    List { template: PathTemplate },
}

impl SurfaceScope {
    pub fn entity(entity_type: impl Into<String>, template: impl Into<String>) -> Self {
        Self::Entity {
            entity_type: entity_type.into(),
            template: PathTemplate::new(template),
        }
    }

    pub fn singleton(path: impl Into<String>) -> Self {
        Self::Singleton {
            path: path.into(),
            sections: None,
        }
    }

    pub fn singleton_with_sections(path: impl Into<String>, sections: impl Into<String>) -> Self {
        Self::Singleton {
            path: path.into(),
            sections: Some(PathTemplate::new(sections)),
        }
    }

    pub fn list(template: impl Into<String>) -> Self {
        Self::List {
            template: PathTemplate::new(template),
        }
    }

    /// Same scope with a different primary path or template.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let path = path.into();
        match self {
            Self::Entity { entity_type, .. } => Self::Entity {
                entity_type: entity_type.clone(),
                template: PathTemplate::new(path),
            },
            Self::Singleton { sections, .. } => Self::Singleton {
                path,
                sections: sections.clone(),
            },
            Self::List { .. } => Self::List {
                template: PathTemplate::new(path),
            },
        }
    }

    /// Whether the primary path must carry an `{id}` placeholder.
    pub fn requires_placeholder(&self) -> bool {
        !matches!(self, Self::Singleton { .. })
    }

    /// Append the paths this surface contributes for `event`.
    pub fn expand(&self, kind: &str, event: &InvalidationEvent, paths: &mut Vec<String>) {
        let discriminators = event
            .dependencies_for(kind)
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());

        match self {
            Self::Entity {
                entity_type,
                template,
            } => {
                if event.entity_type == *entity_type {
                    if let Some(id) = event
                        .entity_id
                        .as_deref()
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                    {
                        paths.push(template.render(id));
                    }
                }
                paths.extend(discriminators.map(|id| template.render(id)));
            }
            Self::Singleton { path, sections } => {
                paths.push(path.clone());
                if let Some(sections) = sections {
                    paths.extend(discriminators.map(|id| sections.render(id)));
                }
            }
            Self::List { template } => {
                paths.extend(discriminators.map(|id| template.render(id)));
            }
        }
    }
}

/// Surface kind name → scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRegistry {
    surfaces: HashMap<String, SurfaceScope>,
}

impl SurfaceRegistry {
    pub fn empty() -> Self {
        Self {
            surfaces: HashMap::new(),
        }
    }

    /// The built-in content-site surfaces.
    pub fn standard() -> Self {
        STANDARD_SURFACES.clone()
    }

    /// Register or replace a surface kind.
    pub fn register(&mut self, kind: impl Into<String>, scope: SurfaceScope) {
        self.surfaces.insert(kind.into(), scope);
    }

    pub fn get(&self, kind: &str) -> Option<&SurfaceScope> {
        self.surfaces.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.surfaces.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.surfaces.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
