//! Schema Emission Engine
//!
//! Turns the component schemas of an OpenAPI-style document into an ordered,
//! annotated emission plan that a code generator can walk front to back.
//!
//! ## Features
//!
//! - **Dependency Graph**: every `$ref` between named schemas, with field paths
//! - **Cycle Detection**: exact set of schemas that can reach themselves
//! - **Usage Classification**: input / output / both / unused per schema
//! - **Operation Filtering**: tag, path, method and operationId include/exclude
//! - **Emission Planning**: dependency-first order with forward-reference flags
//! - **Batch Execution**: isolated jobs, concurrent or sequential
//!
//! ## Architecture
//!
//! ```text
//! document ──► graph ──► cycles ──┬──► usage ───┐
//!                 │               │             ├──► emit
//!                 └──► filter ────┴──► plan ────┘
//! ```

pub mod batch;
pub mod config;
pub mod document;
pub mod emit;
pub mod error;
pub mod filter;
pub mod graph;
pub mod loader;
pub mod pipeline;
pub mod plan;
pub mod schema;
pub mod usage;

pub use batch::{BatchCoordinator, BatchJobResult, BatchSummary, ExecutionMode, Pipeline};
pub use config::{BatchSettings, EmitConfig, GeneratorOptions, JobSpec};
pub use document::{ApiDocument, HttpMethod, Operation};
pub use emit::{ArtifactEmitter, EmissionContext, FormatRegistry, ManifestEmitter};
pub use error::{EmitError, Result};
pub use filter::{FilterStatistics, OperationFilter, OperationFilterSpec};
pub use graph::{CircularSet, DependencyGraph};
pub use pipeline::{Analysis, FileJob, Generator};
pub use plan::{EmissionBucket, EmissionPlan};
pub use schema::{SchemaName, SchemaNode};
pub use usage::{UsageClassification, UsageContext};
