use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::store::FingerprintCache;
use crate::compile::compiler::{CompileOptions, compile};
use crate::compile::fingerprint::Fingerprint;
use crate::compile::plan::{ComposeJob, ComposeStep, DEFAULT_BATCH_LIMIT, LayerInput, RenderPlan, TranscodeJob};
use crate::foundation::error::{VeditError, VeditResult};
use crate::foundation::random::Rng64;
use crate::media::backend::MediaBackend;
use crate::media::probe::MetadataResolver;
use crate::resolve::resolved::{Advisory, ResolvedPlan};
use crate::resolve::tree::resolve;
use crate::scene::model::{Composition, RegionId};

/// Render configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOpts {
    /// Fingerprint cache location; `None` uses [`FingerprintCache::default_dir`].
    pub cache_dir: Option<PathBuf>,
    /// Maximum overlay layers per compose invocation.
    pub batch_limit: usize,
    /// Re-transcode every excerpt even when cached.
    pub force: bool,
    /// Transcode worker threads; `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Seed for randomized placement.
    pub seed: u64,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            cache_dir: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            force: false,
            threads: None,
            seed: 0,
        }
    }
}

impl RenderOpts {
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            batch_limit: self.batch_limit,
            force: self.force,
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(FingerprintCache::default_dir)
    }
}

/// What a finished render did.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RenderReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    /// Excerpts transcoded by this render.
    pub transcoded: usize,
    /// Excerpts reused from the cache.
    pub cached: usize,
    pub compose_steps: usize,
    pub advisories: Vec<Advisory>,
}

/// A resolved and compiled composition that has not been executed.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PreparedRender {
    pub resolved: ResolvedPlan,
    pub plan: RenderPlan,
}

/// Resolve and compile `comp` without transcoding or composing anything.
///
/// Cache hits are reported against the configured cache directory if it can be opened.
pub fn plan(
    comp: &Composition,
    backend: Arc<dyn MediaBackend>,
    opts: &RenderOpts,
) -> VeditResult<PreparedRender> {
    let resolved = resolve_composition(comp, backend, opts)?;
    let cache = open_cache(opts);
    let plan = compile(&resolved, cache.as_ref(), &opts.compile_options())?;
    Ok(PreparedRender { resolved, plan })
}

/// Render `comp` to its output path.
///
/// Transcodes run in parallel on a rayon pool and go through the fingerprint cache; compose
/// steps then run children-first. The output file is replaced atomically and only once the
/// root composition succeeded, so a failed render never leaves a partial output behind.
#[tracing::instrument(skip_all, fields(output = %comp.output.path.display(), seed = opts.seed))]
pub fn render(
    comp: &Composition,
    backend: Arc<dyn MediaBackend>,
    opts: &RenderOpts,
) -> VeditResult<RenderReport> {
    let resolved = resolve_composition(comp, Arc::clone(&backend), opts)?;
    for a in &resolved.advisories {
        tracing::warn!(kind = ?a.kind, region = ?a.region.map(|r| r.0), "{}", a.message);
    }

    let cache = open_cache(opts);
    let plan = compile(&resolved, cache.as_ref(), &opts.compile_options())?;

    let scratch = tempfile::Builder::new()
        .prefix("vedit-render-")
        .tempdir()
        .map_err(|e| VeditError::render(format!("failed to create scratch dir: {e}")))?;

    let artifacts = run_transcodes(&plan, backend.as_ref(), cache.as_ref(), scratch.path(), opts)?;
    let root_output = run_composes(&plan, backend.as_ref(), &artifacts, scratch.path())?;
    publish(&root_output, &plan.output)?;

    tracing::info!(
        output = %plan.output.display(),
        duration = plan.duration,
        transcoded = plan.transcodes.len(),
        cached = plan.cached.len(),
        "render published"
    );
    Ok(RenderReport {
        output: plan.output.clone(),
        width: resolved.output.width,
        height: resolved.output.height,
        duration: plan.duration,
        transcoded: plan.transcodes.len(),
        cached: plan.cached.len(),
        compose_steps: plan.compose_count(),
        advisories: resolved.advisories,
    })
}

fn resolve_composition(
    comp: &Composition,
    backend: Arc<dyn MediaBackend>,
    opts: &RenderOpts,
) -> VeditResult<ResolvedPlan> {
    comp.validate()?;
    let media = MetadataResolver::new(backend);
    let mut rng = Rng64::new(opts.seed);
    resolve(comp, &media, &mut rng)
}

fn open_cache(opts: &RenderOpts) -> Option<FingerprintCache> {
    match FingerprintCache::open(opts.cache_dir()) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!(error = %e, "fingerprint cache unavailable, transcoding without it");
            None
        }
    }
}

fn run_transcodes(
    plan: &RenderPlan,
    backend: &dyn MediaBackend,
    cache: Option<&FingerprintCache>,
    scratch: &Path,
    opts: &RenderOpts,
) -> VeditResult<BTreeMap<Fingerprint, PathBuf>> {
    let pool = build_thread_pool(opts.threads)?;
    let produced: Vec<(Fingerprint, PathBuf)> = pool.install(|| {
        plan.transcodes
            .par_iter()
            .map(|job| transcode_one(job, backend, cache, scratch, opts.force))
            .collect::<VeditResult<Vec<_>>>()
    })?;

    let mut artifacts = plan.cached.clone();
    artifacts.extend(produced);
    Ok(artifacts)
}

fn transcode_one(
    job: &TranscodeJob,
    backend: &dyn MediaBackend,
    cache: Option<&FingerprintCache>,
    scratch: &Path,
    force: bool,
) -> VeditResult<(Fingerprint, PathBuf)> {
    tracing::debug!(fingerprint = %job.fingerprint, source = %job.source.display(), "transcoding");
    let path = match cache {
        Some(cache) => {
            match cache.get_or_create(job.fingerprint, force, |out| backend.transcode(job, out)) {
                Err(VeditError::Cache(e)) => {
                    tracing::warn!(fingerprint = %job.fingerprint, error = %e, "cache unusable, transcoding without it");
                    transcode_uncached(job, backend, scratch)
                }
                other => other,
            }
        }
        None => transcode_uncached(job, backend, scratch),
    }
    .map_err(execution_error)?;
    Ok((job.fingerprint, path))
}

fn transcode_uncached(job: &TranscodeJob, backend: &dyn MediaBackend, scratch: &Path) -> VeditResult<PathBuf> {
    let out = scratch.join(format!("{}.mp4", job.fingerprint));
    backend.transcode(job, &out).and_then(|()| expect_file(&out))
}

fn run_composes(
    plan: &RenderPlan,
    backend: &dyn MediaBackend,
    artifacts: &BTreeMap<Fingerprint, PathBuf>,
    scratch: &Path,
) -> VeditResult<PathBuf> {
    let mut outputs: HashMap<RegionId, PathBuf> = HashMap::new();
    for region in &plan.regions {
        let mut previous: Option<PathBuf> = None;
        for step in &region.steps {
            let inputs = step_inputs(step, artifacts, &outputs)?;
            let out = scratch.join(format!("region{}-batch{}.mp4", step.region.0, step.batch));
            let job = ComposeJob {
                step,
                previous: previous.as_deref(),
                inputs,
            };
            tracing::debug!(region = step.region.0, batch = step.batch, layers = step.layers.len(), "composing");
            backend
                .compose(&job, &out)
                .and_then(|()| expect_file(&out))
                .map_err(execution_error)?;
            previous = Some(out);
        }
        let done = previous.ok_or_else(|| {
            VeditError::render(format!("region {} has no compose steps", region.region.0))
        })?;
        outputs.insert(region.region, done);
    }
    outputs
        .remove(&plan.root)
        .ok_or_else(|| VeditError::render("root region produced no output"))
}

fn step_inputs(
    step: &ComposeStep,
    artifacts: &BTreeMap<Fingerprint, PathBuf>,
    outputs: &HashMap<RegionId, PathBuf>,
) -> VeditResult<Vec<Option<PathBuf>>> {
    step.layers
        .iter()
        .map(|layer| match &layer.input {
            LayerInput::Excerpt(fp) => artifacts
                .get(fp)
                .cloned()
                .map(Some)
                .ok_or_else(|| VeditError::render(format!("no artifact for excerpt {fp}"))),
            LayerInput::Region(id) => outputs
                .get(id)
                .cloned()
                .map(Some)
                .ok_or_else(|| VeditError::render(format!("region {} composed out of order", id.0))),
            LayerInput::Image(path) => Ok(Some(path.clone())),
            LayerInput::Solid { .. } => Ok(None),
        })
        .collect()
}

fn expect_file(path: &Path) -> VeditResult<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(VeditError::render(format!(
            "backend reported success but wrote no '{}'",
            path.display()
        )))
    }
}

/// Everything after resolution and compilation surfaces as a render failure.
fn execution_error(e: VeditError) -> VeditError {
    match e {
        VeditError::Render(_) => e,
        other => VeditError::render(other.to_string()),
    }
}

/// Copy `from` next to `to` and rename it into place.
fn publish(from: &Path, to: &Path) -> VeditResult<()> {
    let parent = match to.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| {
        VeditError::render(format!(
            "failed to create output directory '{}': {e}",
            parent.display()
        ))
    })?;
    let staged = tempfile::Builder::new()
        .prefix(".vedit-")
        .suffix(".mp4")
        .tempfile_in(parent)
        .map_err(|e| VeditError::render(format!("failed to stage output: {e}")))?;
    std::fs::copy(from, staged.path())
        .map_err(|e| VeditError::render(format!("failed to stage output: {e}")))?;
    staged.persist(to).map_err(|e| {
        VeditError::render(format!("failed to publish '{}': {}", to.display(), e.error))
    })?;
    Ok(())
}

fn build_thread_pool(threads: Option<usize>) -> VeditResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(VeditError::validation("render 'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| VeditError::render(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
