//! Operation Filtering
//!
//! Decides which operations take part in a generation job and keeps
//! running statistics about the decisions.
//!
//! ## Evaluation order
//!
//! 1. `exclude_deprecated` (hard reject)
//! 2. tags
//! 3. paths (glob)
//! 4. methods (case-insensitive)
//! 5. operationIds (glob)
//!
//! Within a dimension a non-empty include list must match at least once, and
//! any exclude match rejects regardless of the include result. A rejection is
//! credited to the first failing dimension only.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::document::Operation;
use crate::error::{EmitError, Result};

// =============================================================================
// Filter Spec
// =============================================================================

/// Include/exclude lists per dimension. All empty means "include everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationFilterSpec {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// Path globs; `*` stops at `/`, `**` crosses segments
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub include_methods: Vec<String>,
    pub exclude_methods: Vec<String>,
    /// operationId globs
    pub include_operation_ids: Vec<String>,
    pub exclude_operation_ids: Vec<String>,
    pub exclude_deprecated: bool,
}

impl OperationFilterSpec {
    /// True when the spec imposes no constraint at all
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// The dimension that rejected an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDimension {
    Deprecated,
    Tags,
    Paths,
    Methods,
    OperationIds,
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deprecated => "deprecated",
            Self::Tags => "tags",
            Self::Paths => "paths",
            Self::Methods => "methods",
            Self::OperationIds => "operationIds",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one generation job. Never reset mid-job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStatistics {
    pub total_operations: usize,
    pub included_operations: usize,
    pub filtered_by_tags: usize,
    pub filtered_by_paths: usize,
    pub filtered_by_methods: usize,
    pub filtered_by_operation_ids: usize,
    pub filtered_by_deprecated: usize,
}

impl FilterStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, outcome: Option<FilterDimension>) {
        self.total_operations += 1;
        match outcome {
            None => self.included_operations += 1,
            Some(FilterDimension::Deprecated) => self.filtered_by_deprecated += 1,
            Some(FilterDimension::Tags) => self.filtered_by_tags += 1,
            Some(FilterDimension::Paths) => self.filtered_by_paths += 1,
            Some(FilterDimension::Methods) => self.filtered_by_methods += 1,
            Some(FilterDimension::OperationIds) => self.filtered_by_operation_ids += 1,
        }
    }

    pub fn filtered_operations(&self) -> usize {
        self.total_operations - self.included_operations
    }

    /// Warning text when operations existed but none survived filtering
    pub fn zero_match_warning(&self) -> Option<String> {
        if self.total_operations > 0 && self.included_operations == 0 {
            Some(format!(
                "Operation filters matched none of {} operations; output will contain no operation-reachable schemas",
                self.total_operations
            ))
        } else {
            None
        }
    }

    /// Human-readable summary
    pub fn format_report(&self) -> String {
        let mut lines = vec![
            "Operation filtering:".to_string(),
            format!("  Total operations:    {}", self.total_operations),
            format!("  Included operations: {}", self.included_operations),
        ];

        let filtered = self.filtered_operations();
        if filtered > 0 {
            lines.push(format!("  Filtered operations: {}", filtered));
            for (label, count) in [
                ("deprecated", self.filtered_by_deprecated),
                ("tags", self.filtered_by_tags),
                ("paths", self.filtered_by_paths),
                ("methods", self.filtered_by_methods),
                ("operationIds", self.filtered_by_operation_ids),
            ] {
                if count > 0 {
                    lines.push(format!("    by {}: {}", label, count));
                }
            }
        }

        if let Some(warning) = self.zero_match_warning() {
            lines.push(format!("  Warning: {}", warning));
        }

        lines.join("\n")
    }
}

// =============================================================================
// Compiled Filter
// =============================================================================

/// A filter spec with its globs compiled
#[derive(Debug, Clone)]
pub struct OperationFilter {
    spec: OperationFilterSpec,
    include_paths: Option<GlobSet>,
    exclude_paths: Option<GlobSet>,
    include_operation_ids: Option<GlobSet>,
    exclude_operation_ids: Option<GlobSet>,
}

impl OperationFilter {
    /// Compile a spec. Fails with `InvalidPattern` on a malformed glob.
    pub fn new(spec: &OperationFilterSpec) -> Result<Self> {
        Ok(Self {
            include_paths: build_glob_set(&spec.include_paths, true)?,
            exclude_paths: build_glob_set(&spec.exclude_paths, true)?,
            include_operation_ids: build_glob_set(&spec.include_operation_ids, false)?,
            exclude_operation_ids: build_glob_set(&spec.exclude_operation_ids, false)?,
            spec: spec.clone(),
        })
    }

    pub fn spec(&self) -> &OperationFilterSpec {
        &self.spec
    }

    pub fn is_identity(&self) -> bool {
        self.spec.is_identity()
    }

    /// First failing dimension, or `None` when the operation is included
    pub fn rejection(&self, operation: &Operation) -> Option<FilterDimension> {
        let spec = &self.spec;

        if spec.exclude_deprecated && operation.deprecated {
            return Some(FilterDimension::Deprecated);
        }

        if !spec.include_tags.is_empty()
            && !operation.tags.iter().any(|t| spec.include_tags.contains(t))
        {
            return Some(FilterDimension::Tags);
        }
        if operation.tags.iter().any(|t| spec.exclude_tags.contains(t)) {
            return Some(FilterDimension::Tags);
        }

        if let Some(include) = &self.include_paths {
            if !include.is_match(&operation.path) {
                return Some(FilterDimension::Paths);
            }
        }
        if let Some(exclude) = &self.exclude_paths {
            if exclude.is_match(&operation.path) {
                return Some(FilterDimension::Paths);
            }
        }

        let method = operation.method.as_str();
        if !spec.include_methods.is_empty()
            && !spec.include_methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            return Some(FilterDimension::Methods);
        }
        if spec.exclude_methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return Some(FilterDimension::Methods);
        }

        if let Some(include) = &self.include_operation_ids {
            match &operation.operation_id {
                Some(id) if include.is_match(id) => {}
                _ => return Some(FilterDimension::OperationIds),
            }
        }
        if let (Some(exclude), Some(id)) = (&self.exclude_operation_ids, &operation.operation_id) {
            if exclude.is_match(id) {
                return Some(FilterDimension::OperationIds);
            }
        }

        None
    }

    /// Decide one operation and record the decision in `stats`
    pub fn should_include(&self, operation: &Operation, stats: &mut FilterStatistics) -> bool {
        let outcome = self.rejection(operation);
        if let Some(dimension) = outcome {
            debug!(operation = %operation.label(), %dimension, "operation filtered");
        }
        stats.record(outcome);
        outcome.is_none()
    }

    /// Filter a list of operations, warning once if nothing survives
    pub fn apply<'a>(
        &self,
        operations: &'a [Operation],
        stats: &mut FilterStatistics,
    ) -> Vec<&'a Operation> {
        let included: Vec<&Operation> = operations
            .iter()
            .filter(|op| self.should_include(op, stats))
            .collect();

        if included.is_empty() {
            if let Some(warning) = stats.zero_match_warning() {
                warn!("{}", warning);
            }
        }

        included
    }
}

fn build_glob_set(patterns: &[String], literal_separator: bool) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = if literal_separator {
            GlobBuilder::new(pattern).literal_separator(true).build()
        } else {
            Glob::new(pattern)
        }
        .map_err(|e| EmitError::InvalidPattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| EmitError::InvalidPattern {
            pattern: patterns.join(", "),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HttpMethod;

    fn tagged(tags: &[&str]) -> Operation {
        Operation::new(HttpMethod::Get, "/pets").with_tags(tags.iter().copied())
    }

    fn filter(spec: OperationFilterSpec) -> OperationFilter {
        OperationFilter::new(&spec).unwrap()
    }

    #[test]
    fn test_identity_includes_everything() {
        let f = filter(OperationFilterSpec::default());
        assert!(f.is_identity());
        assert_eq!(f.rejection(&tagged(&[]).deprecated()), None);
    }

    #[test]
    fn test_include_tag_matches_any() {
        let f = filter(OperationFilterSpec {
            include_tags: vec!["a".into()],
            ..Default::default()
        });
        assert_eq!(f.rejection(&tagged(&["a", "b"])), None);
        assert_eq!(f.rejection(&tagged(&["c"])), Some(FilterDimension::Tags));
        assert_eq!(f.rejection(&tagged(&[])), Some(FilterDimension::Tags));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = filter(OperationFilterSpec {
            include_tags: vec!["a".into()],
            exclude_tags: vec!["b".into()],
            ..Default::default()
        });
        assert_eq!(f.rejection(&tagged(&["a", "b"])), Some(FilterDimension::Tags));
    }

    #[test]
    fn test_path_globs() {
        let f = filter(OperationFilterSpec {
            include_paths: vec!["/users/*".into(), "/admin/**".into()],
            ..Default::default()
        });
        let at = |path: &str| Operation::new(HttpMethod::Get, path);
        assert_eq!(f.rejection(&at("/users/{id}")), None);
        assert_eq!(f.rejection(&at("/users/{id}/posts")), Some(FilterDimension::Paths));
        assert_eq!(f.rejection(&at("/admin/a/b/c")), None);
        assert_eq!(f.rejection(&at("/pets")), Some(FilterDimension::Paths));
    }

    #[test]
    fn test_methods_case_insensitive() {
        let f = filter(OperationFilterSpec {
            include_methods: vec!["GET".into(), "Post".into()],
            exclude_methods: vec!["post".into()],
            ..Default::default()
        });
        assert_eq!(f.rejection(&Operation::new(HttpMethod::Get, "/x")), None);
        assert_eq!(
            f.rejection(&Operation::new(HttpMethod::Post, "/x")),
            Some(FilterDimension::Methods)
        );
        assert_eq!(
            f.rejection(&Operation::new(HttpMethod::Delete, "/x")),
            Some(FilterDimension::Methods)
        );
    }

    #[test]
    fn test_operation_id_globs() {
        let f = filter(OperationFilterSpec {
            include_operation_ids: vec!["get*".into()],
            exclude_operation_ids: vec!["*Internal".into()],
            ..Default::default()
        });
        let op = |id: Option<&str>| {
            let op = Operation::new(HttpMethod::Get, "/x");
            match id {
                Some(id) => op.with_operation_id(id),
                None => op,
            }
        };
        assert_eq!(f.rejection(&op(Some("getPet"))), None);
        assert_eq!(f.rejection(&op(Some("listPets"))), Some(FilterDimension::OperationIds));
        assert_eq!(f.rejection(&op(Some("getInternal"))), Some(FilterDimension::OperationIds));
        assert_eq!(f.rejection(&op(None)), Some(FilterDimension::OperationIds));
    }

    #[test]
    fn test_deprecated_checked_first_and_credited_once() {
        let f = filter(OperationFilterSpec {
            exclude_deprecated: true,
            include_tags: vec!["keep".into()],
            include_methods: vec!["post".into()],
            ..Default::default()
        });
        let mut stats = FilterStatistics::new();
        let ops = vec![
            tagged(&["other"]).deprecated(),
            tagged(&["other"]),
            tagged(&["keep"]),
        ];
        let included = f.apply(&ops, &mut stats);

        assert!(included.is_empty());
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.included_operations, 0);
        assert_eq!(stats.filtered_by_deprecated, 1);
        assert_eq!(stats.filtered_by_tags, 1);
        assert_eq!(stats.filtered_by_methods, 1);
        assert_eq!(stats.filtered_operations(), 3);
        assert!(stats.zero_match_warning().is_some());
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let result = OperationFilter::new(&OperationFilterSpec {
            include_paths: vec!["/users/[".into()],
            ..Default::default()
        });
        assert!(matches!(result, Err(EmitError::InvalidPattern { .. })));
    }

    #[test]
    fn test_report_lists_dimensions() {
        let stats = FilterStatistics {
            total_operations: 5,
            included_operations: 3,
            filtered_by_tags: 2,
            ..Default::default()
        };
        let report = stats.format_report();
        assert!(report.contains("Total operations:    5"));
        assert!(report.contains("by tags: 2"));
        assert!(!report.contains("Warning"));
    }
}
