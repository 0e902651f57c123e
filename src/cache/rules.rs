//! Event → affected-surface rules.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use super::events::{
    AUTHOR_UPDATED, CATEGORY_UPDATED, COMMENT_ADDED, COMMENT_DELETED, COMMENT_UPDATED,
    PAGE_DELETED, PAGE_UPDATED, POST_CREATED, POST_DELETED, POST_UPDATED,
};
use super::surfaces::{
    ARCHIVE_PAGE, AUTHOR_PAGE, CATEGORY_PAGE, FEED, HOMEPAGE, PAGE_PAGE, POST_PAGE, SITEMAP,
    TAG_PAGE,
};

const POST_LISTINGS: [&str; 6] = [
    POST_PAGE,
    HOMEPAGE,
    CATEGORY_PAGE,
    AUTHOR_PAGE,
    TAG_PAGE,
    ARCHIVE_PAGE,
];

static STANDARD_RULES: Lazy<InvalidationRuleTable> = Lazy::new(|| {
    let mut table = InvalidationRuleTable::empty();
    let with_feed_and_sitemap = POST_LISTINGS.iter().chain(&[FEED, SITEMAP]).copied();

    table.insert(POST_CREATED, with_feed_and_sitemap.clone());
    table.insert(POST_UPDATED, POST_LISTINGS.iter().chain(&[FEED]).copied());
    table.insert(POST_DELETED, with_feed_and_sitemap);
    table.insert(COMMENT_ADDED, [POST_PAGE]);
    table.insert(COMMENT_UPDATED, [POST_PAGE]);
    table.insert(COMMENT_DELETED, [POST_PAGE]);
    table.insert(AUTHOR_UPDATED, [AUTHOR_PAGE, POST_PAGE]);
    table.insert(CATEGORY_UPDATED, [CATEGORY_PAGE, HOMEPAGE]);
    table.insert(PAGE_UPDATED, [PAGE_PAGE, SITEMAP]);
    table.insert(PAGE_DELETED, [PAGE_PAGE, SITEMAP]);
    table
});

/// Ordered surface-kind lists keyed by event type.
///
/// Surface names are kept as given so rules may reference kinds that are
/// not registered yet; those expand to nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationRuleTable {
    rules: BTreeMap<String, Vec<String>>,
}

impl InvalidationRuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard content-management vocabulary.
    pub fn standard() -> Self {
        STANDARD_RULES.clone()
    }

    /// Set the surfaces for an event type, replacing any existing rule.
    pub fn insert<I, S>(&mut self, event_type: impl Into<String>, surfaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.insert(
            event_type.into(),
            surfaces.into_iter().map(Into::into).collect(),
        );
    }

    pub fn lookup(&self, event_type: &str) -> Option<&[String]> {
        self.rules.get(event_type).map(Vec::as_slice)
    }

    /// Surfaces for an event type; empty when no rule exists.
    pub fn get(&self, event_type: &str) -> &[String] {
        self.lookup(event_type).unwrap_or_default()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.rules.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in event-type order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules
            .iter()
            .map(|(event_type, surfaces)| (event_type.as_str(), surfaces.as_slice()))
    }
}
