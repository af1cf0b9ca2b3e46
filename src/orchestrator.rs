//! Run orchestration: plan work units, fetch and extract in a bounded pool,
//! then deduplicate and commit in canonical order.
//!
//! ```text
//! Idle -> ConfigLoaded -+-> CleanupOnly ---------+-> Reload -> Done
//!                       |                        |
//!                       +-> Fetch -> Compile ----+---------------> Done
//! ```
//!
//! Any stage may jump to `Done` on a fatal error.

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregator::{exclusion_dict, merge, Dict};
use crate::cmd_abstraction::CommandOutput;
use crate::compiler::{commit, target_path, CFile, CommitOutcome, CompiledContent};
use crate::config::{EmptyAreaPolicy, Settings};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity, TracingSink};
use crate::error::CompileError;
use crate::extractor::{extract_bytes, Extracted};
use crate::fetcher::{pre_configured, Fetched, Fetcher};
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::parser::parse;
use crate::reload::{CommandReloader, ServiceReloader};
use crate::signal::AbortToken;
use crate::tree::{Area, BlacklistTree, Source, DOMAINS, HOSTS};

/// Where a unit's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub redirect_ip: Ipv4Addr,
    pub path: PathBuf,
}

/// One fetch-and-compile task for a (node, object type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    PreConfiguredDomains { include: Vec<String>, target: Target },
    PreConfiguredHosts { include: Vec<String>, target: Target },
    FileDomains { sources: Vec<Source>, target: Target },
    FileHosts { sources: Vec<Source>, target: Target },
    UrlDomains { sources: Vec<Source>, target: Target },
    UrlHosts { sources: Vec<Source>, target: Target },
}

/// Object type of a unit, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    PreConfigured,
    File,
    Url,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::PreConfigured, Label::File, Label::Url];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreConfigured => "pre-configured",
            Self::File => "file",
            Self::Url => "url",
        }
    }
}

impl WorkUnit {
    /// Build the unit for `area` and `label`, or `None` when it has no input.
    fn for_area(area: &Area, label: Label, target: Target) -> Option<Self> {
        let domains = match area.name.as_str() {
            DOMAINS => true,
            HOSTS => false,
            _ => return None,
        };
        let unit = match label {
            Label::PreConfigured => {
                if area.include.is_empty() {
                    return None;
                }
                let include = area.include.clone();
                if domains {
                    Self::PreConfiguredDomains { include, target }
                } else {
                    Self::PreConfiguredHosts { include, target }
                }
            }
            Label::File => {
                let sources: Vec<Source> = area.file_sources().cloned().collect();
                if sources.is_empty() {
                    return None;
                }
                if domains {
                    Self::FileDomains { sources, target }
                } else {
                    Self::FileHosts { sources, target }
                }
            }
            Label::Url => {
                let sources: Vec<Source> = area.url_sources().cloned().collect();
                if sources.is_empty() {
                    return None;
                }
                if domains {
                    Self::UrlDomains { sources, target }
                } else {
                    Self::UrlHosts { sources, target }
                }
            }
        };
        Some(unit)
    }

    pub fn node(&self) -> &'static str {
        match self {
            Self::PreConfiguredDomains { .. } | Self::FileDomains { .. } | Self::UrlDomains { .. } => {
                DOMAINS
            }
            Self::PreConfiguredHosts { .. } | Self::FileHosts { .. } | Self::UrlHosts { .. } => HOSTS,
        }
    }

    pub fn label(&self) -> Label {
        match self {
            Self::PreConfiguredDomains { .. } | Self::PreConfiguredHosts { .. } => {
                Label::PreConfigured
            }
            Self::FileDomains { .. } | Self::FileHosts { .. } => Label::File,
            Self::UrlDomains { .. } | Self::UrlHosts { .. } => Label::Url,
        }
    }

    /// Short name used in diagnostics, e.g. `hosts.url`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.node(), self.label().as_str())
    }

    pub fn target(&self) -> &Target {
        match self {
            Self::PreConfiguredDomains { target, .. }
            | Self::PreConfiguredHosts { target, .. }
            | Self::FileDomains { target, .. }
            | Self::FileHosts { target, .. }
            | Self::UrlDomains { target, .. }
            | Self::UrlHosts { target, .. } => target,
        }
    }

    fn jobs(&self, unit: usize) -> Vec<Job> {
        let kinds: Vec<JobKind> = match self {
            Self::PreConfiguredDomains { include, .. } | Self::PreConfiguredHosts { include, .. } => {
                vec![JobKind::Include(include.clone())]
            }
            Self::FileDomains { sources, .. } | Self::FileHosts { sources, .. } => sources
                .iter()
                .filter_map(|s| {
                    s.file.clone().map(|path| JobKind::File {
                        path,
                        prefix: s.prefix.clone(),
                    })
                })
                .collect(),
            Self::UrlDomains { sources, .. } | Self::UrlHosts { sources, .. } => sources
                .iter()
                .filter_map(|s| {
                    s.url.clone().map(|url| JobKind::Url {
                        url,
                        prefix: s.prefix.clone(),
                    })
                })
                .collect(),
        };
        kinds
            .into_iter()
            .enumerate()
            .map(|(seq, kind)| Job { unit, seq, kind })
            .collect()
    }
}

/// Plan the run's work units in canonical order.
///
/// Domains come before hosts; within a node the order is pre-configured,
/// file, url. Disabled areas, nodes not listed in the settings and units
/// without input are skipped.
pub fn plan(tree: &BlacklistTree, settings: &Settings) -> Result<Vec<WorkUnit>, CompileError> {
    let mut units = Vec::new();
    for node in [DOMAINS, HOSTS] {
        if !settings.nodes.iter().any(|n| n == node) {
            continue;
        }
        let Some(area) = tree.area(node) else {
            continue;
        };
        if area.disabled {
            debug!("Area {} disabled, skipping", node);
            continue;
        }
        for label in Label::ALL {
            let target = Target {
                redirect_ip: area.redirect_ip,
                path: target_path(&settings.dir, node, label.as_str(), &settings.extension),
            };
            units.extend(WorkUnit::for_area(area, label, target));
        }
    }
    check_targets(&units)?;
    Ok(units)
}

/// Reject plans where two units would write the same file.
pub fn check_targets(units: &[WorkUnit]) -> Result<(), CompileError> {
    let mut seen = HashSet::new();
    for unit in units {
        let path = &unit.target().path;
        if !seen.insert(path) {
            return Err(CompileError::DuplicateTarget(path.clone()));
        }
    }
    Ok(())
}

#[derive(Debug)]
enum JobKind {
    Include(Vec<String>),
    File { path: PathBuf, prefix: Option<String> },
    Url { url: String, prefix: Option<String> },
}

#[derive(Debug)]
struct Job {
    unit: usize,
    seq: usize,
    kind: JobKind,
}

#[derive(Debug)]
struct JobResult {
    unit: usize,
    seq: usize,
    fetched: Fetched,
    extracted: Extracted,
}

async fn run_job(fetcher: &Fetcher, job: Job, abort: &AbortToken) -> Option<JobResult> {
    if abort.is_raised() {
        return None;
    }
    let (fetched, prefix) = match job.kind {
        JobKind::Include(include) => (pre_configured(&include), None),
        JobKind::File { path, prefix } => (fetcher.fetch_file(&path).await, prefix),
        JobKind::Url { url, prefix } => (fetcher.fetch_url(&url).await, prefix),
    };
    let extracted = extract_bytes(&fetched.content, prefix.as_deref());
    Some(JobResult {
        unit: job.unit,
        seq: job.seq,
        fetched,
        extracted,
    })
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    ConfigLoaded,
    CleanupOnly,
    Fetch,
    Compile,
    Reload,
    Done,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, ConfigLoaded)
                | (ConfigLoaded, CleanupOnly)
                | (ConfigLoaded, Fetch)
                | (CleanupOnly, Reload)
                | (Fetch, Compile)
                | (Compile, Reload)
                | (Idle | ConfigLoaded | CleanupOnly | Fetch | Compile | Reload, Done)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal pipeline transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// Checked stage tracker; keeps every stage visited.
#[derive(Debug, Clone)]
pub struct Pipeline {
    history: Vec<Stage>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            history: vec![Stage::Idle],
        }
    }
}

impl Pipeline {
    pub fn current(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), TransitionError> {
        let from = self.current();
        if !from.can_advance_to(next) {
            return Err(TransitionError { from, to: next });
        }
        debug!("Stage {:?} -> {:?}", from, next);
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }
}

/// Per-unit outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub path: PathBuf,
    pub descriptors: Vec<String>,
    pub extracted: usize,
    pub dropped: usize,
    pub compiled: usize,
    pub duplicates: usize,
    pub excluded: usize,
    pub covered: usize,
    /// `None` on dry runs
    pub outcome: Option<CommitOutcome>,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// False when any error-severity diagnostic was emitted
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub units: Vec<UnitReport>,
    pub stages: Vec<Stage>,
    pub removed: Vec<PathBuf>,
    pub reload_output: Option<CommandOutput>,
}

impl RunReport {
    /// Whether the run wrote or removed any file.
    pub fn changed(&self) -> bool {
        !self.removed.is_empty()
            || self.units.iter().any(|u| {
                matches!(
                    u.outcome,
                    Some(CommitOutcome::Written) | Some(CommitOutcome::Removed)
                )
            })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// State of one run in progress.
struct Run {
    sink: Arc<dyn DiagnosticSink>,
    pipeline: Pipeline,
    diagnostics: Vec<Diagnostic>,
    units: Vec<UnitReport>,
    removed: Vec<PathBuf>,
    reload_output: Option<CommandOutput>,
}

impl Run {
    fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            pipeline: Pipeline::default(),
            diagnostics: Vec::new(),
            units: Vec::new(),
            removed: Vec::new(),
            reload_output: None,
        }
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
        self.sink.emit(diagnostic);
    }

    fn advance(&mut self, next: Stage) -> Result<()> {
        self.pipeline.advance(next)?;
        Ok(())
    }

    fn finish(mut self) -> RunReport {
        if self.pipeline.current() != Stage::Done {
            // Done is reachable from every other stage
            let _ = self.pipeline.advance(Stage::Done);
        }
        let success = !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error);
        RunReport {
            success,
            diagnostics: self.diagnostics,
            units: self.units,
            stages: self.pipeline.history,
            removed: self.removed,
            reload_output: self.reload_output,
        }
    }
}

/// Compiled but not yet committed unit.
struct Pending {
    content: CompiledContent,
    report: UnitReport,
}

/// Drives a full update run.
pub struct Orchestrator {
    settings: Settings,
    fs: Arc<dyn FileSystem>,
    reloader: Arc<dyn ServiceReloader>,
    sink: Arc<dyn DiagnosticSink>,
    abort: AbortToken,
    dry_run: bool,
}

impl Orchestrator {
    /// Orchestrator using the real filesystem, the configured reload
    /// command and `tracing` for diagnostics.
    pub fn new(settings: Settings) -> Self {
        let reloader = Arc::new(CommandReloader::from_settings(&settings));
        Self {
            settings,
            fs: Arc::new(RealFileSystem),
            reloader,
            sink: Arc::new(TracingSink),
            abort: AbortToken::new(),
            dry_run: false,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_reloader(mut self, reloader: Arc<dyn ServiceReloader>) -> Self {
        self.reloader = reloader;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_abort(mut self, abort: AbortToken) -> Self {
        self.abort = abort;
        self
    }

    /// Plan, fetch and compile without touching the disk or reloading.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Parse `config_text` and run the pipeline.
    pub async fn run(&self, config_text: &str) -> RunReport {
        let mut run = Run::new(Arc::clone(&self.sink));
        let result = match parse(config_text) {
            Ok(tree) => self.drive(&tree, &mut run).await,
            Err(e) => Err(e.into()),
        };
        self.conclude(run, result)
    }

    /// Run the pipeline on an already parsed tree.
    pub async fn run_tree(&self, tree: &BlacklistTree) -> RunReport {
        let mut run = Run::new(Arc::clone(&self.sink));
        let result = self.drive(tree, &mut run).await;
        self.conclude(run, result)
    }

    fn conclude(&self, mut run: Run, result: Result<()>) -> RunReport {
        if let Err(e) = result {
            self.abort.raise();
            run.emit(Diagnostic::error(None, format!("{:#}", e)));
        }
        let report = run.finish();
        info!(
            "Run finished: success={}, units={}, removed={}",
            report.success,
            report.units.len(),
            report.removed.len()
        );
        report
    }

    async fn drive(&self, tree: &BlacklistTree, run: &mut Run) -> Result<()> {
        run.advance(Stage::ConfigLoaded)?;

        if tree.disabled {
            info!("Blacklist disabled, removing generated files");
            run.advance(Stage::CleanupOnly)?;
            self.remove_stale(&HashSet::new(), run)?;
            return self.reload(run).await;
        }

        let units = plan(tree, &self.settings)?;
        for area in tree.areas() {
            for source in area.unusable_sources() {
                run.emit(Diagnostic::warning(
                    Some(area.name.as_str()),
                    format!("Source {} has neither url nor file, skipped", source.name),
                ));
            }
        }
        info!("Planned {} work units", units.len());

        run.advance(Stage::Fetch)?;
        let results = self.fetch_all(&units).await?;

        run.advance(Stage::Compile)?;
        let pending = self.compile_all(tree, &units, results, run)?;
        self.check_empty_areas(tree, &pending, run)?;

        let expected: HashSet<PathBuf> = units.iter().map(|u| u.target().path.clone()).collect();
        if !self.dry_run {
            self.fs
                .create_dir_all(&self.settings.dir)
                .map_err(|e| CompileError::from_write(self.settings.dir.clone(), e))?;
        }
        self.remove_stale(&expected, run)?;
        self.commit_all(pending, run)?;

        self.reload(run).await
    }

    async fn fetch_all(&self, units: &[WorkUnit]) -> Result<Vec<JobResult>> {
        let fetcher = Fetcher::new(&self.settings)?;
        let jobs: Vec<Job> = units
            .iter()
            .enumerate()
            .flat_map(|(idx, unit)| unit.jobs(idx))
            .collect();
        let total = jobs.len();

        let fetcher = &fetcher;
        let abort = &self.abort;
        let mut results: Vec<JobResult> =
            stream::iter(jobs.into_iter().map(|job| run_job(fetcher, job, abort)))
                .buffer_unordered(self.settings.cores)
                .filter_map(futures::future::ready)
                .collect()
                .await;

        if abort.is_raised() {
            anyhow::bail!(
                "Run aborted after {} of {} fetches",
                results.len(),
                total
            );
        }

        // Completion order is arbitrary; compile in canonical order
        results.sort_by_key(|r| (r.unit, r.seq));
        debug!("Downloaded {} bytes", fetcher.total_downloaded());
        Ok(results)
    }

    fn compile_all(
        &self,
        tree: &BlacklistTree,
        units: &[WorkUnit],
        results: Vec<JobResult>,
        run: &mut Run,
    ) -> Result<Vec<Pending>> {
        let excludes = Arc::new(exclusion_dict(tree));
        let mut seen: HashMap<&'static str, Dict> = HashMap::new();
        let mut covering = Dict::new();
        let mut by_unit: Vec<Vec<JobResult>> = units.iter().map(|_| Vec::new()).collect();
        for result in results {
            if let Some(slot) = by_unit.get_mut(result.unit) {
                slot.push(result);
            }
        }

        let mut pending = Vec::with_capacity(units.len());
        for (unit, results) in units.iter().zip(by_unit) {
            let name = unit.name();
            let mut descriptors = Vec::new();
            let mut extracted = 0;
            let mut dropped = 0;

            for r in &results {
                if let Some(err) = &r.fetched.error {
                    debug!("{}: {}", err.target(), err.reason());
                    run.emit(Diagnostic::error(Some(name.as_str()), err.to_string()));
                    continue;
                }
                if let Some(warning) = r.extracted.warning(&r.fetched.content, &r.fetched.descriptor)
                {
                    run.emit(Diagnostic::warning(Some(name.as_str()), warning.to_string()));
                }
                descriptors.push(r.fetched.descriptor.clone());
                extracted += r.extracted.domains.len();
                dropped += r.extracted.dropped;
            }

            let input = results
                .iter()
                .filter(|r| r.fetched.is_ok())
                .flat_map(|r| r.extracted.domains.iter().map(String::as_str));
            let node_seen = seen.entry(unit.node()).or_default();
            let cover = (unit.node() == HOSTS).then_some(&covering);
            let merged = merge(input, &excludes, node_seen, cover);
            if unit.node() == DOMAINS {
                for domain in &merged.domains {
                    covering.insert(domain);
                }
            }

            info!(
                "{}: {} extracted, {} compiled ({} duplicates, {} excluded, {} covered)",
                name,
                extracted,
                merged.domains.len(),
                merged.duplicates,
                merged.excluded,
                merged.covered
            );

            let target = unit.target();
            let report = UnitReport {
                name,
                path: target.path.clone(),
                descriptors: descriptors.clone(),
                extracted,
                dropped,
                compiled: merged.domains.len(),
                duplicates: merged.duplicates,
                excluded: merged.excluded,
                covered: merged.covered,
                outcome: None,
            };
            let content = CompiledContent {
                path: target.path.clone(),
                domains: merged.domains,
                redirect_ip: target.redirect_ip,
                descriptors,
            };
            pending.push(Pending { content, report });
        }
        Ok(pending)
    }

    /// Apply the empty-area policy to every compiled area.
    fn check_empty_areas(
        &self,
        tree: &BlacklistTree,
        pending: &[Pending],
        run: &mut Run,
    ) -> Result<()> {
        for area in tree.areas() {
            if area.disabled || !self.settings.nodes.iter().any(|n| *n == area.name) {
                continue;
            }
            let total: usize = pending
                .iter()
                .filter(|p| p.report.name.starts_with(&format!("{}.", area.name)))
                .map(|p| p.report.compiled)
                .sum();
            if total > 0 {
                continue;
            }
            let message = format!("Area {} compiled to zero entries", area.name);
            match self.settings.empty_area_policy {
                EmptyAreaPolicy::Allow => run.emit(Diagnostic::info(Some(area.name.as_str()), message)),
                EmptyAreaPolicy::Fail => anyhow::bail!(message),
            }
        }
        Ok(())
    }

    fn remove_stale(&self, expected: &HashSet<PathBuf>, run: &mut Run) -> Result<()> {
        let cfile = CFile::scan(&*self.fs, &self.settings.stale_glob(), expected)?;
        if cfile.stale.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            for path in &cfile.stale {
                info!("Would remove stale {}", path.display());
            }
            return Ok(());
        }
        self.ensure_not_aborted()?;
        run.removed = cfile.remove_stale(&*self.fs)?;
        Ok(())
    }

    fn commit_all(&self, pending: Vec<Pending>, run: &mut Run) -> Result<()> {
        let now = Utc::now();
        for Pending {
            content,
            mut report,
        } in pending
        {
            if !self.dry_run {
                self.ensure_not_aborted()?;
                let outcome = commit(&*self.fs, &content, now)
                    .map_err(|e| anyhow::Error::new(e).context(format!("unit {}", report.name)))?;
                report.outcome = Some(outcome);
            }
            run.units.push(report);
        }
        Ok(())
    }

    async fn reload(&self, run: &mut Run) -> Result<()> {
        let changed = !run.removed.is_empty()
            || run.units.iter().any(|u| {
                matches!(
                    u.outcome,
                    Some(CommitOutcome::Written) | Some(CommitOutcome::Removed)
                )
            });
        if self.dry_run || !changed {
            debug!("No changes, skipping reload");
            return Ok(());
        }
        self.ensure_not_aborted()?;

        run.advance(Stage::Reload)?;
        match self.reloader.reload().await {
            Ok(output) => {
                if !output.success {
                    run.emit(Diagnostic::error(
                        Some("reload"),
                        format!("Reload failed: {}", output.combined()),
                    ));
                }
                run.reload_output = Some(output);
            }
            Err(e) => run.emit(Diagnostic::error(Some("reload"), format!("{:#}", e))),
        }
        Ok(())
    }

    fn ensure_not_aborted(&self) -> Result<()> {
        if self.abort.is_raised() {
            anyhow::bail!("Run aborted, no further changes written");
        }
        Ok(())
    }
}
