//! Regeneration cache decision core.
//!
//! Three pure components:
//!
//! - **Keys**: `KeyCanonicalizer` derives a `CanonicalKey` for one cacheable
//!   variant of one URL.
//! - **Freshness**: `FreshnessEngine` classifies a stored artifact as fresh,
//!   stale or expired.
//! - **Invalidation**: `InvalidationResolver` maps a mutation event to the
//!   keys that must be purged.
//!
//! ## Configuration
//!
//! Rules and surface paths can be extended via `regen-cache.toml`:
//!
//! ```toml
//! [invalidation.rules]
//! post_updated = ["post_page", "homepage"]
//!
//! [invalidation.paths]
//! post_page = "/posts/{id}"
//! ```

mod error;
pub mod events;
mod freshness;
mod keys;
mod normalize;
mod resolver;
mod rules;
pub mod surfaces;

pub use error::InputError;
pub use events::InvalidationEvent;
pub use freshness::{
    ArtifactMetadata, Freshness, FreshnessEngine, FreshnessVerdict, RecommendedAction,
    StaleWindowPolicy,
};
pub use keys::{CanonicalKey, KeyCanonicalizer, RequestContext, VariantValue, Variants};
pub use normalize::{NormalizedValue, NormalizedVariants, normalize_path, normalize_variants};
pub use resolver::{
    InvalidationResolver, METRIC_PURGE_KEYS_TOTAL, METRIC_RESOLVE_TOTAL,
    METRIC_UNKNOWN_EVENT_TOTAL, PurgeSet, Resolution, ResolverBuilder,
};
pub use rules::InvalidationRuleTable;
pub use surfaces::{PathTemplate, SurfaceRegistry, SurfaceScope};
