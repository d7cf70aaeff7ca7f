//! Generation Pipeline
//!
//! One [`Generator`] per job. Each run builds its own graph, cycle set,
//! filter statistics and format registry; nothing is shared between
//! generators or kept in statics.
//!
//! Phases:
//! 1. Reference validation (the only failure point for a parsed document)
//! 2. Dependency graph + cycle detection
//! 3. Operation filtering, once, reused by both consumers below
//! 4. Usage classification
//! 5. Emission planning over the filtered subset
//! 6. Rendering through an [`ArtifactEmitter`]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::batch::Pipeline;
use crate::config::{EmitConfig, GeneratorOptions, JobSpec};
use crate::document::{ApiDocument, Operation};
use crate::emit::{ArtifactEmitter, EmissionContext, FormatRegistry, ManifestEmitter};
use crate::error::Result;
use crate::filter::{FilterStatistics, OperationFilter};
use crate::graph::{detect_cycles, expand_closure, validate_references, CircularSet, DependencyGraph};
use crate::loader::load_document;
use crate::plan::EmissionPlan;
use crate::schema::SchemaName;
use crate::usage::{classify_usage, OperationSeeds, UsageClassification};

/// Everything computed for one document
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: DependencyGraph,
    pub circular: CircularSet,
    pub filter_stats: FilterStatistics,
    pub usage: UsageClassification,
    /// Names selected by the operation filter; `None` means every schema
    pub subset: Option<BTreeSet<SchemaName>>,
    pub plan: EmissionPlan,
}

/// One isolated generation job
pub struct Generator {
    options: GeneratorOptions,
    filter: OperationFilter,
    emitter: Box<dyn ArtifactEmitter>,
}

impl Generator {
    /// Validate options up front: cache capacity, filter globs and custom
    /// format patterns. Any failure here fails only this job.
    pub fn new(options: GeneratorOptions) -> Result<Self> {
        options.validate()?;
        let filter = OperationFilter::new(&options.filter)?;
        FormatRegistry::new(&options.custom_formats, options.format_cache_capacity)?;
        Ok(Self {
            options,
            filter,
            emitter: Box::new(ManifestEmitter),
        })
    }

    /// Replace the default manifest emitter
    pub fn with_emitter(mut self, emitter: Box<dyn ArtifactEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Run every analysis phase
    pub fn analyze(&self, doc: &ApiDocument) -> Result<Analysis> {
        validate_references(doc)?;

        let graph = DependencyGraph::build(doc);
        let circular = detect_cycles(&graph);

        let mut filter_stats = FilterStatistics::new();
        let included: Vec<&Operation> = self.filter.apply(doc.operations(), &mut filter_stats);

        let usage = classify_usage(doc, &graph, &circular, &included);

        let subset = if !self.filter.is_identity() && doc.has_operations() {
            let seeds = OperationSeeds::collect(included.iter().copied());
            Some(expand_closure(seeds.all().cloned(), &graph))
        } else {
            None
        };

        let plan = EmissionPlan::build(doc, &graph, &circular, subset.as_ref());

        debug!(
            schemas = graph.len(),
            circular = circular.len(),
            included_operations = filter_stats.included_operations,
            planned = plan.len(),
            "analysis complete"
        );

        Ok(Analysis {
            graph,
            circular,
            filter_stats,
            usage,
            subset,
            plan,
        })
    }

    /// Render an analysis with a fresh per-run format registry
    pub fn render(&self, doc: &ApiDocument, analysis: &Analysis) -> Result<String> {
        let mut formats =
            FormatRegistry::new(&self.options.custom_formats, self.options.format_cache_capacity)?;
        let ctx = EmissionContext {
            document: doc,
            plan: &analysis.plan,
            usage: &analysis.usage,
            circular: &analysis.circular,
            filter_stats: &analysis.filter_stats,
            emit_unused: self.options.emit_unused,
        };
        let output = self.emitter.emit(&ctx, &mut formats)?;
        let (hits, misses) = formats.cache().stats();
        debug!(emitter = self.emitter.name(), hits, misses, "rendered artifact");
        Ok(output)
    }

    /// Analyze and render in one step
    pub fn generate(&self, doc: &ApiDocument) -> Result<(Analysis, String)> {
        let analysis = self.analyze(doc)?;
        let output = self.render(doc, &analysis)?;
        Ok((analysis, output))
    }

    /// Load `input`, generate, and write `output` (parent directories created)
    pub fn generate_file(&self, input: &Path, output: &Path) -> Result<Analysis> {
        let doc = load_document(input)?;
        let (analysis, rendered) = self.generate(&doc)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output, rendered)?;

        info!(
            input = %input.display(),
            output = %output.display(),
            schemas = analysis.plan.len(),
            circular = analysis.circular.len(),
            "generated"
        );
        Ok(analysis)
    }
}

/// A file-to-file job for the batch coordinator
pub struct FileJob {
    generator: Generator,
    input: PathBuf,
    output: PathBuf,
}

impl FileJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: GeneratorOptions) -> Result<Self> {
        Ok(Self {
            generator: Generator::new(options)?,
            input: input.into(),
            output: output.into(),
        })
    }

    /// Job with its options resolved against the config's defaults
    pub fn from_config(config: &EmitConfig, job: &JobSpec) -> Result<Self> {
        Self::new(&job.input, &job.output, config.job_options(job))
    }
}

impl Pipeline for FileJob {
    fn execute(&mut self) -> Result<()> {
        self.generator
            .generate_file(&self.input, &self.output)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HttpMethod;
    use crate::error::EmitError;
    use crate::filter::OperationFilterSpec;
    use crate::schema::{Property, SchemaNode};
    use crate::usage::UsageContext;

    fn petstore() -> ApiDocument {
        ApiDocument::new()
            .with_schema(
                "Pet",
                SchemaNode::object(vec![Property::new("owner", SchemaNode::reference("User"))]),
            )
            .with_schema("User", SchemaNode::string())
            .with_schema("Invoice", SchemaNode::string())
            .with_operation(
                Operation::new(HttpMethod::Get, "/pets")
                    .with_tags(["pets"])
                    .with_response("200", SchemaNode::reference("Pet")),
            )
            .with_operation(
                Operation::new(HttpMethod::Post, "/invoices")
                    .with_tags(["billing"])
                    .with_request_body(SchemaNode::reference("Invoice")),
            )
    }

    fn options_with_filter(filter: OperationFilterSpec) -> GeneratorOptions {
        GeneratorOptions {
            filter,
            ..GeneratorOptions::default()
        }
    }

    #[test]
    fn test_unfiltered_plan_covers_every_schema() {
        let generator = Generator::new(GeneratorOptions::default()).unwrap();
        let analysis = generator.analyze(&petstore()).unwrap();
        assert!(analysis.subset.is_none());
        assert_eq!(analysis.plan.len(), 3);
        assert_eq!(analysis.usage.get("Invoice"), UsageContext::Input);
    }

    #[test]
    fn test_filter_restricts_emitted_subset() {
        let generator = Generator::new(options_with_filter(OperationFilterSpec {
            include_tags: vec!["pets".into()],
            ..Default::default()
        }))
        .unwrap();
        let analysis = generator.analyze(&petstore()).unwrap();

        let planned: Vec<&str> = analysis.plan.names().map(String::as_str).collect();
        assert_eq!(planned, vec!["User", "Pet"]);
        assert_eq!(analysis.filter_stats.filtered_by_tags, 1);
        assert_eq!(analysis.usage.get("Invoice"), UsageContext::Unused);
    }

    #[test]
    fn test_zero_match_filter_still_succeeds() {
        let generator = Generator::new(options_with_filter(OperationFilterSpec {
            include_tags: vec!["nothing".into()],
            ..Default::default()
        }))
        .unwrap();
        let (analysis, output) = generator.generate(&petstore()).unwrap();
        assert!(analysis.plan.is_empty());
        assert!(analysis.filter_stats.zero_match_warning().is_some());
        assert!(output.contains("\"schemas\": []"));
    }

    #[test]
    fn test_unresolved_ref_aborts_job() {
        let doc = ApiDocument::new().with_schema("Pet", SchemaNode::reference("Ghost"));
        let generator = Generator::new(GeneratorOptions::default()).unwrap();
        assert!(matches!(
            generator.analyze(&doc),
            Err(EmitError::UnresolvedRef { .. })
        ));
    }

    #[test]
    fn test_invalid_custom_format_rejected_at_construction() {
        let mut options = GeneratorOptions::default();
        options.custom_formats.insert("sku".into(), "[unclosed".into());
        assert!(matches!(
            Generator::new(options),
            Err(EmitError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_emit_unused_false_omits_unused() {
        let doc = petstore().with_schema("Orphan", SchemaNode::string());
        let options = GeneratorOptions {
            emit_unused: false,
            ..GeneratorOptions::default()
        };
        let (_, output) = Generator::new(options).unwrap().generate(&doc).unwrap();
        assert!(!output.contains("\"Orphan\""));
        assert!(output.contains("\"Pet\""));
    }

    #[test]
    fn test_generate_file_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("api.json");
        let output = dir.path().join("out/nested/manifest.json");
        fs::write(
            &input,
            r##"{"components": {"schemas": {"A": {"$ref": "#/components/schemas/B"}, "B": {"type": "string"}}}}"##,
        )
        .unwrap();

        let mut job = FileJob::new(&input, &output, GeneratorOptions::default()).unwrap();
        job.execute().unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(manifest["schemas"][0]["name"], "B");
        assert_eq!(manifest["schemas"][1]["name"], "A");
        assert!(manifest["source_hash"].as_str().unwrap().len() == 64);
    }
}
