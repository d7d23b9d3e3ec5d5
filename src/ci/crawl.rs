//! Concurrent crawl of a job's full build history.
//!
//! The CI server tolerates a handful of parallel readers but not a
//! thundering herd, so extraction runs under a counting semaphore with a
//! fixed number of permits. Workers share nothing except the results map,
//! locked for the merge step only; extraction itself is side-effect-free
//! per build.

use crate::ci::{extract, BuildFailure, CiServer, JobFailures};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Concurrent build fetches per crawl.
const CRAWL_CONCURRENCY: usize = 8;

/// Crawl every build of `job_name` and group the extracted failures by PR
/// number.
///
/// Builds gone from CI history are skipped. The first hard error aborts
/// the whole crawl; partial results are discarded and callers needing a
/// retry must re-invoke from scratch — there is no partial-resume state.
pub async fn crawl_job(ci: &Arc<dyn CiServer>, job_name: &str) -> Result<JobFailures> {
    let build_ids = ci.list_build_ids(job_name).await?;
    debug!(job_name, builds = build_ids.len(), "crawling job history");

    let semaphore = Arc::new(Semaphore::new(CRAWL_CONCURRENCY));
    let results: Arc<Mutex<JobFailures>> = Arc::new(Mutex::new(JobFailures::new()));
    let mut workers: JoinSet<Result<()>> = JoinSet::new();

    for build_number in build_ids {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::cancelled("crawl semaphore closed"))?;
        let ci = Arc::clone(ci);
        let results = Arc::clone(&results);
        let job_name = job_name.to_string();
        workers.spawn(async move {
            let _permit = permit;
            let Some(build) = ci.fetch_build(&job_name, build_number).await? else {
                // Pruned from CI history; soft skip.
                return Ok(());
            };
            let failures = extract::build_failures(&job_name, build_number, &build);
            if failures.is_empty() {
                return Ok(());
            }
            let pr = extract::pr_number(&build);
            let mut map = results.lock().expect("crawl results lock");
            map.entry(pr).or_default().extend(failures);
            Ok(())
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                // Abort in-flight workers; whatever was merged is stale.
                workers.abort_all();
                return Err(err);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => return Err(Error::api(format!("crawl worker panicked: {join_err}"))),
        }
    }

    let map = Arc::try_unwrap(results)
        .map_err(|_| Error::api("crawl results still shared after join"))?
        .into_inner()
        .expect("crawl results lock");
    Ok(map)
}

/// Crawl `job_name` and keep only the failures `filter` lets through,
/// dropping PR buckets that filter down to nothing.
pub async fn crawl_job_filtered<F>(
    ci: &Arc<dyn CiServer>,
    job_name: &str,
    filter: F,
) -> Result<JobFailures>
where
    F: Fn(Vec<BuildFailure>, &str) -> Vec<BuildFailure>,
{
    let mut failures = crawl_job(ci, job_name).await?;
    failures.retain(|_, bucket| {
        let kept = filter(std::mem::take(bucket), job_name);
        if kept.is_empty() {
            false
        } else {
            *bucket = kept;
            true
        }
    });
    Ok(failures)
}
