//! Invalidation resolution.
//!
//! Turns a mutation event into the exact set of canonical keys to purge:
//! rule lookup → surface expansion → path normalization → key digesting.

use std::collections::{BTreeSet, HashSet};

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::events::InvalidationEvent;
use super::keys::{CanonicalKey, KeyCanonicalizer};
use super::normalize::{NormalizedVariants, normalize_path, normalize_variants};
use super::rules::InvalidationRuleTable;
use super::surfaces::{SurfaceRegistry, SurfaceScope};

pub const METRIC_RESOLVE_TOTAL: &str = "regen_cache_resolve_total";
pub const METRIC_PURGE_KEYS_TOTAL: &str = "regen_cache_purge_keys_total";
pub const METRIC_UNKNOWN_EVENT_TOTAL: &str = "regen_cache_unknown_event_total";

/// De-duplicated canonical keys to delete from the artifact store.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PurgeSet {
    keys: Vec<CanonicalKey>,
    #[serde(skip)]
    seen: HashSet<CanonicalKey>,
}

impl PurgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Add a key; returns false when it was already present.
    pub fn insert(&mut self, key: CanonicalKey) -> bool {
        let inserted = self.seen.insert(key);
        if inserted {
            self.keys.push(key);
        }
        inserted
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.keys.iter()
    }

    pub fn into_vec(self) -> Vec<CanonicalKey> {
        self.keys
    }
}

impl PartialEq for PurgeSet {
    fn eq(&self, other: &Self) -> bool {
        self.seen == other.seen
    }
}

impl Eq for PurgeSet {}

/// Outcome of resolving one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub purge_keys: PurgeSet,
    pub reason: String,
}

impl Resolution {
    fn unmatched(event_type: &str) -> Self {
        Self {
            purge_keys: PurgeSet::new(),
            reason: format!("no invalidation rule registered for event type `{event_type}`"),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.purge_keys.is_empty()
    }
}

/// Distinct normalized paths and variant sets for one event.
struct ResolutionPlan {
    paths: BTreeSet<String>,
    variant_sets: Vec<NormalizedVariants>,
}

impl ResolutionPlan {
    fn key_count(&self) -> usize {
        self.paths.len() * self.variant_sets.len()
    }
}

/// Configures rules and surfaces before the resolver is shared.
#[derive(Debug, Clone)]
pub struct ResolverBuilder {
    rules: InvalidationRuleTable,
    surfaces: SurfaceRegistry,
}

impl ResolverBuilder {
    /// Start from the standard rules and surfaces.
    pub fn new() -> Self {
        Self {
            rules: InvalidationRuleTable::standard(),
            surfaces: SurfaceRegistry::standard(),
        }
    }

    /// Start with no rules and no surfaces.
    pub fn empty() -> Self {
        Self {
            rules: InvalidationRuleTable::empty(),
            surfaces: SurfaceRegistry::empty(),
        }
    }

    /// Add or replace the rule for an event type.
    pub fn with_rule<I, S>(mut self, event_type: impl Into<String>, surfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.insert(event_type, surfaces);
        self
    }

    /// Register or replace a surface kind.
    pub fn with_surface(mut self, kind: impl Into<String>, scope: SurfaceScope) -> Self {
        self.surfaces.register(kind, scope);
        self
    }

    pub fn with_rules(mut self, rules: InvalidationRuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_surfaces(mut self, surfaces: SurfaceRegistry) -> Self {
        self.surfaces = surfaces;
        self
    }

    pub fn build(self) -> InvalidationResolver {
        InvalidationResolver {
            rules: self.rules,
            surfaces: self.surfaces,
            canonicalizer: KeyCanonicalizer::new(),
        }
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves mutation events into purge sets.
///
/// Resolution only borrows `&self`; changing rules requires `&mut self`, so
/// a shared resolver cannot be reconfigured while other threads read it.
#[derive(Debug, Clone)]
pub struct InvalidationResolver {
    rules: InvalidationRuleTable,
    surfaces: SurfaceRegistry,
    canonicalizer: KeyCanonicalizer,
}

impl InvalidationResolver {
    pub fn new() -> Self {
        ResolverBuilder::new().build()
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn rules(&self) -> &InvalidationRuleTable {
        &self.rules
    }

    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.surfaces
    }

    /// Add or replace the rule for an event type.
    pub fn add_rule<I, S>(&mut self, event_type: impl Into<String>, surfaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.insert(event_type, surfaces);
    }

    /// Surfaces registered for an event type; empty when there is no rule.
    pub fn get_rule(&self, event_type: &str) -> &[String] {
        self.rules.get(event_type)
    }

    #[instrument(skip_all, fields(event_type = %event.event_type))]
    pub fn resolve(&self, event: &InvalidationEvent) -> Resolution {
        counter!(METRIC_RESOLVE_TOTAL).increment(1);

        let Some(plan) = self.plan(event) else {
            counter!(METRIC_UNKNOWN_EVENT_TOTAL).increment(1);
            debug!(
                event_type = %event.event_type,
                "No invalidation rule registered; nothing to purge"
            );
            return Resolution::unmatched(&event.event_type);
        };

        let mut purge_keys = PurgeSet::with_capacity(plan.key_count());
        for path in &plan.paths {
            for variants in &plan.variant_sets {
                purge_keys.insert(self.canonicalizer.digest_normalized(path, variants));
            }
        }

        counter!(METRIC_PURGE_KEYS_TOTAL).increment(purge_keys.len() as u64);

        let reason = format!(
            "{}: purging {} keys across {} paths",
            event.event_type,
            purge_keys.len(),
            plan.paths.len()
        );

        if purge_keys.is_empty() {
            debug!(event_type = %event.event_type, "Invalidation rule matched no paths");
        } else {
            info!(
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = event.entity_id.as_deref().unwrap_or(""),
                paths = plan.paths.len(),
                purge_keys = purge_keys.len(),
                "Invalidation resolved"
            );
        }

        Resolution { purge_keys, reason }
    }

    /// Resolve each event independently; output order follows input order.
    pub fn resolve_batch(&self, events: &[InvalidationEvent]) -> Vec<Resolution> {
        events.iter().map(|event| self.resolve(event)).collect()
    }

    /// Number of keys `resolve` would produce, without digesting anything.
    pub fn estimate_count(&self, event: &InvalidationEvent) -> usize {
        self.plan(event)
            .map(|plan| plan.key_count())
            .unwrap_or_default()
    }

    fn plan(&self, event: &InvalidationEvent) -> Option<ResolutionPlan> {
        let surfaces = self.rules.lookup(&event.event_type)?;

        let mut raw_paths = Vec::new();
        for kind in surfaces {
            match self.surfaces.get(kind) {
                Some(scope) => scope.expand(kind, event, &mut raw_paths),
                None => debug!(
                    event_type = %event.event_type,
                    surface = %kind,
                    "Skipping unregistered surface kind"
                ),
            }
        }

        let paths: BTreeSet<String> = raw_paths.iter().map(|path| normalize_path(path)).collect();

        let variant_sets = if event.variant_sets.is_empty() {
            vec![NormalizedVariants::new()]
        } else {
            let mut seen = HashSet::new();
            event
                .variant_sets
                .iter()
                .map(normalize_variants)
                .filter(|variants| seen.insert(variants.clone()))
                .collect()
        };

        Some(ResolutionPlan {
            paths,
            variant_sets,
        })
    }
}

impl Default for InvalidationResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::{COMMENT_ADDED, POST_UPDATED};
    use crate::cache::keys::{RequestContext, Variants};
    use crate::cache::surfaces::{CATEGORY_PAGE, HOMEPAGE, POST_PAGE};

    fn key_for(path: &str) -> CanonicalKey {
        KeyCanonicalizer::new().canonicalize(&RequestContext::new(path))
    }

    #[test]
    fn end_to_end_post_update() {
        let resolver = InvalidationResolver::builder()
            .with_rule(POST_UPDATED, [POST_PAGE, HOMEPAGE])
            .build();

        let resolution = resolver.resolve(&InvalidationEvent::post_updated(42));

        assert_eq!(resolution.purge_keys.len(), 2);
        assert!(resolution.purge_keys.contains(&key_for("/blog/post-42")));
        assert!(resolution.purge_keys.contains(&key_for("/")));
        assert_eq!(resolution.reason, "post_updated: purging 2 keys across 2 paths");
    }

    #[test]
    fn own_entity_and_dependencies_are_additive() {
        let resolver = InvalidationResolver::new();
        let event = InvalidationEvent::post_updated(5).with_dependency(POST_PAGE, 9);

        let resolution = resolver.resolve(&event);
        assert!(resolution.purge_keys.contains(&key_for("/blog/post-5")));
        assert!(resolution.purge_keys.contains(&key_for("/blog/post-9")));
    }

    #[test]
    fn unknown_event_is_noop() {
        let resolver = InvalidationResolver::new();
        let resolution = resolver.resolve(&InvalidationEvent::new("nonexistent"));

        assert!(resolution.is_noop());
        assert!(resolution.reason.contains("nonexistent"));
        assert!(resolution.reason.contains("no invalidation rule"));
        assert_eq!(resolver.estimate_count(&InvalidationEvent::new("nonexistent")), 0);
    }

    #[test]
    fn missing_event_type_is_noop() {
        let resolver = InvalidationResolver::new();
        assert!(resolver.resolve(&InvalidationEvent::default()).is_noop());
    }

    #[test]
    fn unregistered_surface_kinds_are_skipped() {
        let resolver = InvalidationResolver::builder()
            .with_rule("custom", ["comment_thread", HOMEPAGE])
            .build();

        let resolution = resolver.resolve(&InvalidationEvent::new("custom"));
        assert_eq!(resolution.purge_keys.len(), 1);
        assert!(resolution.purge_keys.contains(&key_for("/")));
    }

    #[test]
    fn registered_surface_kind_expands() {
        let resolver = InvalidationResolver::builder()
            .with_surface("comment_thread", SurfaceScope::list("/comments/{id}"))
            .with_rule(COMMENT_ADDED, ["comment_thread", POST_PAGE])
            .build();

        let event = InvalidationEvent::comment_added(3).with_dependency("comment_thread", 3);
        let resolution = resolver.resolve(&event);

        assert_eq!(resolution.purge_keys.len(), 2);
        assert!(resolution.purge_keys.contains(&key_for("/comments/3")));
        assert!(resolution.purge_keys.contains(&key_for("/blog/post-3")));
    }

    #[test]
    fn duplicate_paths_collapse() {
        let resolver = InvalidationResolver::new();
        let event = InvalidationEvent::post_updated(5)
            .with_dependency(POST_PAGE, 5)
            .with_dependency(POST_PAGE, " 5 ");

        let resolution = resolver.resolve(&event);
        // post-5, the homepage, the feed
        assert_eq!(resolution.purge_keys.len(), 3);
        assert_eq!(resolver.estimate_count(&event), 3);
    }

    #[test]
    fn variant_sets_multiply_paths() {
        let resolver = InvalidationResolver::builder()
            .with_rule(POST_UPDATED, [POST_PAGE, HOMEPAGE])
            .build();
        let event = InvalidationEvent::post_updated(1)
            .with_variants(Variants::new().with("locale", "en"))
            .with_variants(Variants::new().with("locale", "fr"));

        let resolution = resolver.resolve(&event);
        assert_eq!(resolution.purge_keys.len(), 4);
        assert_eq!(resolver.estimate_count(&event), 4);

        let expected = KeyCanonicalizer::new()
            .canonicalize(&RequestContext::new("/blog/post-1").with_variant("locale", "fr"));
        assert!(resolution.purge_keys.contains(&expected));
    }

    #[test]
    fn equivalent_variant_sets_count_once() {
        let resolver = InvalidationResolver::builder()
            .with_rule(POST_UPDATED, [POST_PAGE])
            .build();
        let event = InvalidationEvent::post_updated(1)
            .with_variants(Variants::new().with("locale", "EN"))
            .with_variants(Variants::new().with("locale", " en "));

        assert_eq!(resolver.estimate_count(&event), 1);
        assert_eq!(resolver.resolve(&event).purge_keys.len(), 1);
    }

    #[test]
    fn list_surfaces_without_dependencies_contribute_nothing() {
        let resolver = InvalidationResolver::builder()
            .with_rule("category_updated", [CATEGORY_PAGE])
            .build();
        let event = InvalidationEvent::for_entity("category_updated", "category", 4);
        assert!(resolver.resolve(&event).is_noop());
        assert_eq!(
            resolver.resolve(&event).reason,
            "category_updated: purging 0 keys across 0 paths"
        );
    }

    #[test]
    fn add_rule_overwrites() {
        let mut resolver = InvalidationResolver::new();
        resolver.add_rule(POST_UPDATED, [HOMEPAGE]);
        assert_eq!(resolver.get_rule(POST_UPDATED), [HOMEPAGE]);

        let resolution = resolver.resolve(&InvalidationEvent::post_updated(1));
        assert_eq!(resolution.purge_keys.len(), 1);
    }

    #[test]
    fn get_rule_for_unknown_event_is_empty() {
        let resolver = InvalidationResolver::new();
        assert!(resolver.get_rule("nonexistent").is_empty());
    }

    #[test]
    fn batch_keeps_order_and_independence() {
        let resolver = InvalidationResolver::new();
        let events = vec![
            InvalidationEvent::new("nonexistent"),
            InvalidationEvent::post_updated(1),
            InvalidationEvent::comment_added(2),
        ];

        let resolutions = resolver.resolve_batch(&events);
        assert_eq!(resolutions.len(), 3);
        assert!(resolutions[0].is_noop());
        assert_eq!(resolutions[1], resolver.resolve(&events[1]));
        assert_eq!(resolutions[2].purge_keys.len(), 1);
        assert!(resolutions[2].purge_keys.contains(&key_for("/blog/post-2")));
    }

    #[test]
    fn resolutions_are_fresh_values() {
        let resolver = InvalidationResolver::new();
        let event = InvalidationEvent::post_updated(1);
        let mut first = resolver.resolve(&event);
        first.purge_keys.insert(key_for("/unrelated"));

        let second = resolver.resolve(&event);
        assert!(!second.purge_keys.contains(&key_for("/unrelated")));
    }

    #[test]
    fn purge_set_deduplicates() {
        let mut set = PurgeSet::new();
        assert!(set.insert(key_for("/a")));
        assert!(!set.insert(key_for("/a/")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.into_vec(), vec![key_for("/a")]);
    }

    #[test]
    fn purge_set_equality_ignores_order() {
        let mut left = PurgeSet::new();
        left.insert(key_for("/a"));
        left.insert(key_for("/b"));

        let mut right = PurgeSet::new();
        right.insert(key_for("/b"));
        right.insert(key_for("/a"));

        assert_eq!(left, right);
    }

    #[test]
    fn purge_set_serializes_as_hex_list() {
        let mut set = PurgeSet::new();
        set.insert(key_for("/"));
        let json = serde_json::to_value(&set).expect("serializable");
        let items = json.as_array().expect("array");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_str(), Some(key_for("/").to_hex().as_str()));
    }
}
