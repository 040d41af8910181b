use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use planbench_core::engines::sources_from_config;
use planbench_core::{
    expand as expand_template, extract_parameters, normalize, Backend, BenchmarkJob,
    BenchmarkService, Config, JobSpec, ParameterRange,
};
use serde::Serialize;
use tracing::{info, warn};

pub fn params(template: &Path) -> anyhow::Result<()> {
    let template = read(template)?;
    let params = extract_parameters(&template)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

/// Resolve `name=spec` arguments against the placeholders of `template`
pub fn parse_range_args(template: &str, args: &[String]) -> anyhow::Result<Vec<ParameterRange>> {
    let params = extract_parameters(template)?;
    args.iter()
        .map(|arg| -> anyhow::Result<ParameterRange> {
            let (name, spec) = arg
                .split_once('=')
                .ok_or_else(|| anyhow!("range '{}' must look like name=start,end,step", arg))?;
            let param = params
                .iter()
                .find(|p| p.name == name.trim())
                .ok_or_else(|| anyhow!("template has no placeholder named '{}'", name.trim()))?;
            Ok(ParameterRange::parse_spec(&param.name, param.param_type, spec)?)
        })
        .collect()
}

pub fn expand(template: &Path, range_args: &[String]) -> anyhow::Result<()> {
    let template = read(template)?;
    let ranges = parse_range_args(&template, range_args)?;
    for query in expand_template(&template, &ranges)? {
        println!("{}", query.query_text);
    }
    Ok(())
}

#[derive(Serialize)]
struct ParseOutput {
    backend: Backend,
    runtime_unit: planbench_core::RuntimeUnit,
    #[serde(flatten)]
    plan: planbench_core::NormalizedPlan,
}

pub fn parse(backend: Backend, filters: &[String], plan: &Path) -> anyhow::Result<()> {
    let raw = read(plan)?;
    let output = ParseOutput {
        backend,
        runtime_unit: backend.runtime_unit(),
        plan: normalize(backend, &raw, filters),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Read a jobs file, rebuilding each job so its parameters come from the template.
/// Job names must be unique within the file.
pub fn load_jobs(path: &Path) -> anyhow::Result<Vec<JobSpec>> {
    let contents = read(path)?;
    let specs: Vec<JobSpec> = serde_json::from_str(&contents)
        .with_context(|| format!("invalid jobs file {}", path.display()))?;

    let mut names = HashSet::new();
    specs
        .into_iter()
        .map(|spec| -> anyhow::Result<JobSpec> {
            if !names.insert(spec.job.job_name.clone()) {
                bail!(
                    "jobs file {} names job '{}' more than once",
                    path.display(),
                    spec.job.job_name
                );
            }
            let job = BenchmarkJob::new(
                spec.job.query_template,
                spec.job.backend,
                spec.job.dataset_name,
                spec.job.job_name,
            )?;
            Ok(JobSpec {
                job,
                ranges: spec.ranges,
            })
        })
        .collect()
}

pub async fn run(
    config: &Config,
    jobs: &Path,
    output: &Path,
    batches_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let specs = load_jobs(jobs)?;
    if specs.is_empty() {
        bail!("jobs file {} contains no jobs", jobs.display());
    }

    let sources = sources_from_config(config)?;
    let service = BenchmarkService::start(&config.dispatcher, sources);

    let mut scheduled = 0;
    for spec in specs {
        let name = spec.job.job_name.clone();
        match service.schedule_spec(spec) {
            Ok(queries) => scheduled += queries,
            Err(e) => warn!(job = %name, "Job not scheduled: {}", e),
        }
    }
    info!(queries = scheduled, "All jobs scheduled, waiting for completion");

    service.shutdown().await?;

    let store = service.store();
    store.write_json(output)?;
    info!(batches = store.len(), "Results written to {:?}", output);

    if let Some(dir) = batches_dir {
        let written = store.write_batches(dir)?;
        info!(files = written.len(), "Batch files written to {:?}", dir);
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}
