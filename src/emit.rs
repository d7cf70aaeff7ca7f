//! Artifact Emission
//!
//! Emitters turn a finished analysis into output text. They never read the
//! dependency graph: ordering, forward-reference flags and usage contexts
//! all arrive pre-computed through [`EmissionContext`].
//!
//! String `format` keywords resolve through a [`FormatRegistry`] owned by a
//! single job. Custom overrides from that job's options shadow the built-in
//! table and never leak into another job.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use tracing::debug;

use crate::document::ApiDocument;
use crate::error::{EmitError, Result};
use crate::filter::FilterStatistics;
use crate::graph::{CircularSet, CycleGroup};
use crate::plan::{EmissionBucket, EmissionPlan, PlannedReference};
use crate::usage::{ClassificationSource, UsageClassification, UsageContext};

/// Default capacity of a job's compiled-format cache
pub const DEFAULT_FORMAT_CACHE_CAPACITY: usize = 64;

/// Built-in `format` name to regex table
const BUILTIN_FORMATS: &[(&str, &str)] = &[
    ("date", r"^\d{4}-\d{2}-\d{2}$"),
    (
        "date-time",
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$",
    ),
    ("time", r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$"),
    ("email", r"^[^@\s]+@[^@\s]+\.[^@\s]+$"),
    (
        "uuid",
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    ),
    ("uri", r"^[a-zA-Z][a-zA-Z0-9+.-]*:\S+$"),
    ("ipv4", r"^(\d{1,3}\.){3}\d{1,3}$"),
    ("ipv6", r"^[0-9a-fA-F:]+$"),
    ("hostname", r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$"),
];

// =============================================================================
// Bounded Cache
// =============================================================================

/// Fixed-capacity map evicting the oldest insertion first
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    hits: usize,
    misses: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Capacity must be at least one
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EmitError::InvalidOption(
                "format cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        })
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

// =============================================================================
// Format Registry
// =============================================================================

/// Per-job string format table with a compiled-pattern cache
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    custom: BTreeMap<String, String>,
    compiled: BoundedCache<String, Regex>,
}

impl FormatRegistry {
    /// Validate custom overrides and set up an empty cache.
    ///
    /// Every custom pattern must compile; the first one that does not is
    /// reported as `InvalidFormat`.
    pub fn new(custom: &BTreeMap<String, String>, cache_capacity: usize) -> Result<Self> {
        let mut compiled = BoundedCache::new(cache_capacity)?;
        for (format, pattern) in custom {
            let regex = Regex::new(pattern).map_err(|e| EmitError::InvalidFormat {
                format: format.clone(),
                pattern: pattern.clone(),
                source: e,
            })?;
            compiled.insert(format.clone(), regex);
        }
        Ok(Self {
            custom: custom.clone(),
            compiled,
        })
    }

    /// Registry with only the built-in formats
    pub fn builtin() -> Self {
        Self {
            custom: BTreeMap::new(),
            compiled: BoundedCache {
                capacity: DEFAULT_FORMAT_CACHE_CAPACITY,
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            },
        }
    }

    /// Source pattern of a format, custom first, then built-in
    pub fn pattern(&self, format: &str) -> Option<&str> {
        self.custom.get(format).map(String::as_str).or_else(|| {
            BUILTIN_FORMATS
                .iter()
                .find(|(name, _)| *name == format)
                .map(|(_, pattern)| *pattern)
        })
    }

    /// Compiled pattern of a format, cached per job
    pub fn compiled(&mut self, format: &str) -> Option<Regex> {
        let key = format.to_string();
        if let Some(regex) = self.compiled.get(&key) {
            return Some(regex);
        }
        let regex = Regex::new(self.pattern(format)?).ok()?;
        self.compiled.insert(key, regex.clone());
        Some(regex)
    }

    /// Check a value against a format; `None` for unknown formats
    pub fn matches(&mut self, format: &str, value: &str) -> Option<bool> {
        self.compiled(format).map(|regex| regex.is_match(value))
    }

    pub fn is_custom(&self, format: &str) -> bool {
        self.custom.contains_key(format)
    }

    pub fn cache(&self) -> &BoundedCache<String, Regex> {
        &self.compiled
    }
}

// =============================================================================
// Emitter Seam
// =============================================================================

/// Everything an emitter may look at for one job
#[derive(Debug, Clone, Copy)]
pub struct EmissionContext<'a> {
    pub document: &'a ApiDocument,
    pub plan: &'a EmissionPlan,
    pub usage: &'a UsageClassification,
    pub circular: &'a CircularSet,
    pub filter_stats: &'a FilterStatistics,
    /// Include schemas classified `Unused`
    pub emit_unused: bool,
}

/// Renders one job's analysis into an artifact
pub trait ArtifactEmitter: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    fn emit(&self, ctx: &EmissionContext<'_>, formats: &mut FormatRegistry) -> Result<String>;
}

// =============================================================================
// Manifest Emitter
// =============================================================================

/// Writes the analysis as a pretty-printed JSON manifest
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestEmitter;

#[derive(Serialize)]
struct Manifest<'a> {
    source_hash: Option<&'a str>,
    classification: ClassificationSource,
    schemas: Vec<ManifestEntry<'a>>,
    cycles: &'a [CycleGroup],
    formats: BTreeMap<&'a str, FormatEntry>,
    filter: &'a FilterStatistics,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    name: &'a str,
    bucket: EmissionBucket,
    usage: UsageContext,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias_of: Option<&'a str>,
    references: &'a [PlannedReference],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    formats: Vec<&'a str>,
}

#[derive(Serialize)]
struct FormatEntry {
    pattern: Option<String>,
    custom: bool,
}

impl ArtifactEmitter for ManifestEmitter {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn emit(&self, ctx: &EmissionContext<'_>, formats: &mut FormatRegistry) -> Result<String> {
        let mut schemas = Vec::with_capacity(ctx.plan.len());
        let mut used_formats: BTreeMap<&str, FormatEntry> = BTreeMap::new();
        let mut skipped = 0usize;

        for entry in ctx.plan {
            let usage = ctx.usage.get(&entry.name);
            if usage == UsageContext::Unused && !ctx.emit_unused {
                skipped += 1;
                continue;
            }

            let Some(node) = ctx.document.schema(&entry.name) else {
                continue;
            };

            let node_formats = node.string_formats();
            for format in &node_formats {
                used_formats.entry(*format).or_insert_with(|| FormatEntry {
                    pattern: formats.compiled(format).map(|r| r.as_str().to_string()),
                    custom: formats.is_custom(format),
                });
            }

            schemas.push(ManifestEntry {
                name: &entry.name,
                bucket: entry.bucket,
                usage,
                kind: node.kind_name(),
                alias_of: node.alias_target(),
                references: &entry.references,
                formats: node_formats,
            });
        }

        if skipped > 0 {
            debug!(skipped, "omitted unused schemas from manifest");
        }

        let manifest = Manifest {
            source_hash: ctx.document.source_hash.as_deref(),
            classification: ctx.usage.source(),
            schemas,
            cycles: ctx.circular.groups(),
            formats: used_formats,
            filter: ctx.filter_stats,
        };

        let mut output = serde_json::to_string_pretty(&manifest)?;
        output.push('\n');
        Ok(output)
    }
}
