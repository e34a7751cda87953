// src/gather/mod.rs

//! Dependency gathering
//!
//! Collects `SourcePackageDependencyInfo` for every package that could take
//! part in a resolution:
//! - Primary targets are asked of the primary sources only
//! - Installed packages come from the packages folder, or from every source
//!   when the folder does not have them
//! - The closure (dependencies of searched ids, parents of searched ids,
//!   installed ids and dangling dependency ids) is expanded pass by pass
//!   against every source until nothing new is found
//!
//! Requests run concurrently up to `max_degree_of_parallelism`, each with its
//! own timeout on a child of the operation token. Results are merged in
//! request order so the first source asked for an identity wins.

mod cache;
mod context;

pub use cache::GatherCache;
pub use context::{DEFAULT_MAX_DEGREE_OF_PARALLELISM, DEFAULT_REQUEST_TIMEOUT, GatherContext};

use crate::error::{Error, Result};
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, SourcePackageDependencyInfo, id_key};
use crate::protocol::{SharedSource, dedup_sources};
use crate::resolver::DependencyBehavior;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
enum RequestTarget {
    /// Every version of an id
    Id(String),
    /// One exact identity
    Exact(PackageIdentity),
}

impl RequestTarget {
    fn id(&self) -> &str {
        match self {
            RequestTarget::Id(id) => id,
            RequestTarget::Exact(identity) => &identity.id,
        }
    }
}

struct GatherRequest {
    source: SharedSource,
    target: RequestTarget,
    ignore_exceptions: bool,
    order: usize,
    is_installed: bool,
}

struct GatherResult {
    order: usize,
    is_installed: bool,
    packages: Vec<SourcePackageDependencyInfo>,
}

type Outcome = (GatherRequest, Result<Vec<SourcePackageDependencyInfo>>);

/// Gather dependency info for a resolution
pub async fn gather(
    context: &GatherContext,
    cache: &mut GatherCache,
    token: &CancellationToken,
) -> Result<Vec<SourcePackageDependencyInfo>> {
    Gatherer::new(context, cache, token).run().await
}

struct Gatherer<'a> {
    context: &'a GatherContext,
    cache: &'a mut GatherCache,
    token: CancellationToken,
    primary_sources: Vec<SharedSource>,
    all_sources: Vec<SharedSource>,
    ids_searched: HashSet<String>,
    queue: VecDeque<GatherRequest>,
    in_flight: FuturesUnordered<BoxFuture<'static, Outcome>>,
    results: Vec<GatherResult>,
    last_order: usize,
}

impl<'a> Gatherer<'a> {
    fn new(context: &'a GatherContext, cache: &'a mut GatherCache, token: &CancellationToken) -> Self {
        let primary_sources = dedup_sources(context.primary_sources.iter().cloned());
        let all_sources = dedup_sources(
            context
                .primary_sources
                .iter()
                .cloned()
                .chain(std::iter::once(context.packages_folder_source.clone()))
                .chain(context.all_sources.iter().cloned()),
        );

        Self {
            context,
            cache,
            token: token.child_token(),
            primary_sources,
            all_sources,
            ids_searched: HashSet::new(),
            queue: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            results: Vec::new(),
            last_order: 0,
        }
    }

    async fn run(mut self) -> Result<Vec<SourcePackageDependencyInfo>> {
        let started = Instant::now();
        check_cancelled(&self.token)?;

        let context = self.context;
        let mut primary_ids: Vec<String> = Vec::new();

        for target in &context.primary_targets {
            // Blocks a later all-versions search for the same id
            self.ids_searched.insert(target.key());
            push_unique(&mut primary_ids, &target.id);
            let sources = self.primary_sources.clone();
            self.queue_work(&sources, RequestTarget::Exact(target.clone()), false, false);
        }

        for id in &context.primary_target_ids {
            push_unique(&mut primary_ids, id);
            let sources = self.primary_sources.clone();
            self.queue_work(&sources, RequestTarget::Id(id.clone()), false, false);
        }

        self.start_workers();
        self.gather_installed(&primary_ids).await?;

        loop {
            check_cancelled(&self.token)?;
            self.start_workers();

            if let Some((request, outcome)) = self.in_flight.next().await {
                self.process(request, outcome)?;
            }

            if self.context.dependency_behavior != DependencyBehavior::Ignore {
                for id in self.missing_closure_ids() {
                    let sources = self.all_sources.clone();
                    self.queue_work(&sources, RequestTarget::Id(id), true, false);
                }
            }

            if self.queue.is_empty() && self.in_flight.is_empty() {
                debug!("Total number of results gathered: {}", self.results.len());
                break;
            }
        }

        check_cancelled(&self.token)?;

        let combined = merge_in_request_order(&self.results);

        if !self.context.is_update_all {
            for target_id in &primary_ids {
                if !combined.iter().any(|p| p.identity.has_id(target_id)) {
                    let label = self
                        .context
                        .primary_targets
                        .iter()
                        .find(|t| t.has_id(target_id))
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| target_id.clone());
                    let sources: Vec<&str> =
                        self.primary_sources.iter().map(|s| s.name()).collect();
                    return Err(Error::PackageNotFound(format!(
                        "Package '{}' is not found in the following primary source(s): '{}'",
                        label,
                        sources.join(", ")
                    )));
                }
            }
        }

        if combined.is_empty()
            && !(primary_ids.is_empty() && self.context.installed_packages.is_empty())
        {
            return Err(Error::UnableToGather(
                "no source returned any package metadata".to_string(),
            ));
        }

        info!(
            "Gathered {} package version(s) in {:.2?}",
            combined.len(),
            started.elapsed()
        );
        Ok(combined)
    }

    async fn gather_installed(&mut self, primary_ids: &[String]) -> Result<()> {
        let context = self.context;
        let framework = context.target_framework.clone();
        let folder = context.packages_folder_source.clone();

        for installed in &context.installed_packages {
            // Targets are skipped so upgrades and reinstalls see every version
            if primary_ids.iter().any(|id| installed.has_id(id)) {
                continue;
            }

            let local = tokio::select! {
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                r = folder.resolve_package(installed, &framework) => r,
            };

            match local {
                Ok(Some(info)) => {
                    let order = self.next_order();
                    self.results.push(GatherResult {
                        order,
                        is_installed: true,
                        packages: vec![info],
                    });
                }
                Ok(None) | Err(_) => {
                    debug!("{} not in packages folder, asking all sources", installed);
                    let sources = self.all_sources.clone();
                    self.queue_work(&sources, RequestTarget::Exact(installed.clone()), true, true);
                }
            }
        }
        Ok(())
    }

    fn next_order(&mut self) -> usize {
        self.last_order += 1;
        self.last_order
    }

    fn queue_work(
        &mut self,
        sources: &[SharedSource],
        target: RequestTarget,
        ignore_exceptions: bool,
        is_installed: bool,
    ) {
        // Exact lookups never mark the id searched; the full set may be needed later
        if let RequestTarget::Id(ref id) = target
            && !self.ids_searched.insert(id_key(id))
        {
            return;
        }

        for source in sources {
            let order = self.next_order();
            self.queue.push_back(GatherRequest {
                source: source.clone(),
                target: target.clone(),
                ignore_exceptions,
                order,
                is_installed,
            });
        }
    }

    /// Answer queued requests from the cache, start the rest up to the limit
    fn start_workers(&mut self) {
        let framework = &self.context.target_framework;

        while self.in_flight.len() < self.context.max_degree_of_parallelism.max(1) {
            let Some(request) = self.queue.pop_front() else {
                break;
            };

            let cached = match &request.target {
                RequestTarget::Id(id) => self.cache.get_packages(request.source.name(), id, framework),
                RequestTarget::Exact(identity) => self
                    .cache
                    .get_package(request.source.name(), identity, framework)
                    .map(|p| p.into_iter().collect()),
            };

            if let Some(packages) = cached {
                debug!(
                    "Package {} from source {} gathered from cache",
                    request.target.id(),
                    request.source.name()
                );
                self.results.push(GatherResult {
                    order: request.order,
                    is_installed: request.is_installed,
                    packages,
                });
                continue;
            }

            self.in_flight.push(
                fetch(
                    request,
                    framework.clone(),
                    self.context.request_timeout,
                    self.token.clone(),
                )
                .boxed(),
            );
        }
    }

    fn process(
        &mut self,
        request: GatherRequest,
        outcome: Result<Vec<SourcePackageDependencyInfo>>,
    ) -> Result<()> {
        let framework = &self.context.target_framework;
        let packages = match outcome {
            Ok(packages) => {
                match &request.target {
                    RequestTarget::Id(id) => self.cache.add_all_packages_for_id(
                        request.source.name(),
                        id,
                        framework,
                        packages.clone(),
                    ),
                    RequestTarget::Exact(identity) => {
                        self.cache.add_package_from_single_version_lookup(
                            request.source.name(),
                            identity,
                            framework,
                            packages.first().cloned(),
                        )
                    }
                }
                packages
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            // Secondary sources are often unreachable shares; they must not stop the gather
            Err(e) if request.ignore_exceptions => {
                warn!(
                    "Ignoring failure from source '{}' for {}: {}",
                    request.source.name(),
                    request.target.id(),
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        self.results.push(GatherResult {
            order: request.order,
            is_installed: request.is_installed,
            packages,
        });
        Ok(())
    }

    /// Ids in the current closure that were never searched
    fn missing_closure_ids(&self) -> Vec<String> {
        let mut current = merge_in_request_order(&self.results);

        if !self.context.allow_downgrades {
            for installed in &self.context.installed_packages {
                current.retain(|p| !(p.identity.same_id(installed) && p.identity.version < installed.version));
            }
        }

        let installed_results: Vec<&GatherResult> =
            self.results.iter().filter(|r| r.is_installed).collect();
        let installed_info = merge_in_request_order(installed_results.into_iter());

        closure_ids(&current, &installed_info, &self.ids_searched)
            .into_iter()
            .filter(|id| !self.ids_searched.contains(&id_key(id)))
            .collect()
    }
}

fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|i| i.eq_ignore_ascii_case(id)) {
        ids.push(id.to_string());
    }
}

async fn fetch(
    request: GatherRequest,
    framework: TargetFramework,
    timeout: Duration,
    token: CancellationToken,
) -> Outcome {
    let outcome = {
        let call = async {
            match &request.target {
                RequestTarget::Id(id) => request.source.resolve_packages(id, &framework).await,
                RequestTarget::Exact(identity) => request
                    .source
                    .resolve_package(identity, &framework)
                    .await
                    .map(|p| p.into_iter().collect()),
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            r = tokio::time::timeout(timeout, call) => match r {
                Ok(r) => r,
                Err(_) => Err(Error::UnableToGather(format!(
                    "timed out gathering '{}' from source '{}'",
                    request.target.id(),
                    request.source.name()
                ))),
            },
        }
    };
    (request, outcome)
}

/// Flatten results in request order; the first answer for an identity wins
fn merge_in_request_order<'r, I>(results: I) -> Vec<SourcePackageDependencyInfo>
where
    I: IntoIterator<Item = &'r GatherResult>,
{
    let mut ordered: Vec<&GatherResult> = results.into_iter().collect();
    ordered.sort_by_key(|r| r.order);

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for result in ordered {
        for package in &result.packages {
            if seen.insert(package.identity.clone()) {
                merged.push(package.clone());
            }
        }
    }
    merged
}

/// Ids that must be gathered for a complete solution
fn closure_ids(
    current: &[SourcePackageDependencyInfo],
    installed: &[SourcePackageDependencyInfo],
    ids_searched: &HashSet<String>,
) -> Vec<String> {
    let mut closure: HashMap<String, String> = HashMap::new();
    let mut add = |id: &str| {
        closure.entry(id_key(id)).or_insert_with(|| id.to_string());
    };

    // Dependencies of expanded packages
    for package in current.iter().filter(|p| ids_searched.contains(&p.identity.key())) {
        for dep in &package.dependencies {
            add(&dep.id);
        }
    }

    // Parents of expanded packages
    for package in current {
        if package.dependencies.iter().any(|d| ids_searched.contains(&id_key(&d.id))) {
            add(&package.identity.id);
        }
    }

    let current_ids: HashSet<String> = current.iter().map(|p| p.identity.key()).collect();

    // Installed packages are needed for a complete solution
    for package in installed {
        if !current_ids.contains(&package.identity.key()) {
            add(&package.identity.id);
        }
    }

    // Dependencies nobody has answered for yet
    for package in current {
        for dep in &package.dependencies {
            if !current_ids.contains(&id_key(&dep.id)) {
                add(&dep.id);
            }
        }
    }

    let mut ids: Vec<String> = closure.into_values().collect();
    ids.sort_by_key(|id| id_key(id));
    ids
}
