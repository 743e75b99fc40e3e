//! Backtracking image resolution.
//!
//! The search keeps one aggregate constraint per package name (the most
//! restrictive specifier seen so far), always expands the open name with
//! the fewest feasible candidates, and tries candidates newest-first.
//! Choice points snapshot the whole search state, so rejecting a candidate
//! cannot leak constraints into a sibling branch.

mod diagnostic;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use imago_semver::VersionSpecifier;

use crate::cache::DependencyGraph;
use crate::cancel::CancellationToken;
use crate::error::ImagoError;
use crate::image::{ImageIdentifier, ImageSpecifier};
use crate::package::{PackageDef, PackageSpecifier};
use crate::platform::{os_matches, CpuArchitecture};
use crate::repository::Repository;
use crate::Result;

use self::diagnostic::DiagnosticGraph;
pub use self::types::{
    ConflictKind, ConflictReport, ImageResolution, Requirement, RequirementOrigin,
};

/// Consulted before the cache for every package name; a `Some` answer
/// replaces the cache's candidate list for that name.
pub type ResolveHook<'a> = &'a dyn Fn(&PackageSpecifier) -> Option<PackageDef>;

/// Resolves `image` against a populated cache and, on success, converts the
/// outcome into an immutable [`ImageIdentifier`].
pub async fn resolve_image(
    image: &ImageSpecifier,
    repositories: &[Repository],
    cancel: &CancellationToken,
) -> Result<ImageIdentifier> {
    let mut root_names: Vec<String> = image.roots.iter().map(|root| root.name.clone()).collect();
    root_names.extend(image.fixed_packages.iter().map(|fixed| fixed.name.clone()));

    let graph = DependencyGraph::populate(
        repositories,
        &image.os,
        image.arch,
        &root_names,
        &image.installed_packages,
        cancel,
    )
    .await?;

    let resolution = Resolver::new(image, &graph, cancel).resolve()?;
    ImageIdentifier::from_resolution(resolution, image.repositories.clone())
}

/// Resolves `image` against an already-populated dependency graph.
pub fn resolve(
    image: &ImageSpecifier,
    graph: &DependencyGraph,
    cancel: &CancellationToken,
) -> Result<ImageResolution> {
    Resolver::new(image, graph, cancel).resolve()
}

pub struct Resolver<'a> {
    graph: &'a DependencyGraph,
    os: String,
    arch: CpuArchitecture,
    roots: Vec<PackageSpecifier>,
    fixed: Vec<PackageSpecifier>,
    hook: Option<ResolveHook<'a>>,
    cancel: CancellationToken,
    hook_defs: BTreeMap<String, Option<PackageDef>>,
    diagnostic: DiagnosticGraph,
    conflicts: Vec<ConflictReport>,
}

#[derive(Clone, Debug, Default)]
struct SearchState {
    selected: BTreeMap<String, PackageDef>,
    aggregates: BTreeMap<String, VersionSpecifier>,
    requirements: BTreeMap<String, Vec<Requirement>>,
    open: BTreeSet<String>,
    selected_arch: Option<CpuArchitecture>,
}

struct CandidateOutcome {
    /// Candidates before any filtering.
    listed: usize,
    /// Candidates surviving the platform filters.
    platform_ok: usize,
    /// Candidates also satisfying the aggregate constraint, newest first.
    feasible: Vec<PackageDef>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        image: &ImageSpecifier,
        graph: &'a DependencyGraph,
        cancel: &CancellationToken,
    ) -> Self {
        Resolver {
            graph,
            os: image.os.clone(),
            arch: image.arch,
            roots: image.roots.clone(),
            fixed: image.fixed_packages.clone(),
            hook: None,
            cancel: cancel.clone(),
            hook_defs: BTreeMap::new(),
            diagnostic: DiagnosticGraph::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: ResolveHook<'a>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn resolve(mut self) -> Result<ImageResolution> {
        let mut state = SearchState::default();

        let roots = self.roots.clone();
        let fixed = self.fixed.clone();

        let mut collected = true;
        for (origin, specifier) in roots
            .iter()
            .map(|root| (RequirementOrigin::Root, root))
            .chain(fixed.iter().map(|pin| (RequirementOrigin::Fixed, pin)))
        {
            if !self.collect_constraint(&mut state, origin, specifier) {
                collected = false;
            }
        }

        if !collected {
            return Ok(self.fail());
        }

        match self.search(state)? {
            Some(solution) => Ok(self.succeed(solution)),
            None => {
                let mut resolution = self.fail();
                if resolution.conflicts.is_empty() {
                    resolution.conflicts.push(ConflictReport {
                        kind: ConflictKind::DependencyUnsatisfiable,
                        name: String::new(),
                        requirements: Vec::new(),
                        message: "no assignment satisfies the image".to_string(),
                    });
                }
                Ok(resolution)
            }
        }
    }

    fn collect_constraint(
        &mut self,
        state: &mut SearchState,
        origin: RequirementOrigin,
        specifier: &PackageSpecifier,
    ) -> bool {
        let requirement = Requirement {
            origin,
            specifier: specifier.version.clone(),
        };

        let merged = match state.aggregates.get(&specifier.name) {
            None => Some(specifier.version.clone()),
            Some(existing) => existing.intersect(&specifier.version),
        };

        let requirements = state.requirements.entry(specifier.name.clone()).or_default();
        requirements.push(requirement);

        match merged {
            Some(aggregate) => {
                state.aggregates.insert(specifier.name.clone(), aggregate);
                state.open.insert(specifier.name.clone());
                true
            }
            None => {
                let requirements = requirements.clone();
                let message = format!(
                    "Conflicting requirements for {}: {}",
                    specifier.name,
                    describe(&requirements)
                );
                self.diagnostic.reject(&specifier.name);
                self.record_conflict(
                    ConflictKind::ConstraintIntersectionEmpty,
                    &specifier.name,
                    requirements,
                    message,
                );
                false
            }
        }
    }

    fn search(&mut self, state: SearchState) -> Result<Option<SearchState>> {
        if self.cancel.is_cancelled() {
            return Err(ImagoError::Cancelled);
        }

        let name = match self.pick_open(&state) {
            Some(name) => name,
            None => return Ok(Some(state)),
        };

        let aggregate = state
            .aggregates
            .get(&name)
            .cloned()
            .unwrap_or(VersionSpecifier::Any);
        let outcome = self.candidates_for(&name, &aggregate, &state);

        if outcome.feasible.is_empty() {
            self.report_dead_end(&name, &aggregate, &outcome, &state);
            return Ok(None);
        }

        for def in outcome.feasible {
            if self.cancel.is_cancelled() {
                return Err(ImagoError::Cancelled);
            }

            let label = def.identity.to_string();
            self.diagnostic.node(&label);

            let mut next = state.clone();
            next.open.remove(&name);
            if next.selected_arch.is_none() && def.identity.arch != CpuArchitecture::AnyCpu {
                next.selected_arch = Some(def.identity.arch);
            }
            next.selected.insert(name.clone(), def.clone());

            if !self.apply_dependencies(&def, &label, &mut next) {
                self.diagnostic.reject(&label);
                continue;
            }

            if let Some(solution) = self.search(next)? {
                return Ok(Some(solution));
            }
        }

        let requirements = state.requirements.get(&name).cloned().unwrap_or_default();
        let message = format!(
            "Unable to resolve {name} {aggregate}: every candidate leads to a conflict"
        );
        self.record_conflict(
            ConflictKind::DependencyUnsatisfiable,
            &name,
            requirements,
            message,
        );
        Ok(None)
    }

    /// Folds a candidate's dependency edges into the snapshot. Returns
    /// false when an edge contradicts an existing assignment or empties an
    /// aggregate constraint; the caller then discards the snapshot.
    fn apply_dependencies(
        &mut self,
        def: &PackageDef,
        label: &str,
        next: &mut SearchState,
    ) -> bool {
        for dep in &def.dependencies {
            if let Some(assigned) = next.selected.get(&dep.name) {
                // Already assigned; a cycle closes here and is only checked,
                // never re-entered.
                let target = assigned.identity.to_string();
                let ok = dep.version.matches(&assigned.identity.version);
                self.diagnostic.edge(label, &target, &dep.version, !ok);
                if !ok {
                    return false;
                }
                continue;
            }

            let requirement = Requirement {
                origin: RequirementOrigin::Dependency(label.to_string()),
                specifier: dep.version.clone(),
            };

            let merged = match next.aggregates.get(&dep.name) {
                None => Some(dep.version.clone()),
                Some(existing) => existing.intersect(&dep.version),
            };

            match merged {
                Some(aggregate) => {
                    next.aggregates.insert(dep.name.clone(), aggregate);
                    next.requirements
                        .entry(dep.name.clone())
                        .or_default()
                        .push(requirement);
                    next.open.insert(dep.name.clone());
                }
                None => {
                    self.diagnostic.edge(label, &dep.name, &dep.version, true);
                    self.diagnostic.reject(&dep.name);

                    let mut requirements =
                        next.requirements.get(&dep.name).cloned().unwrap_or_default();
                    requirements.push(requirement);
                    let message = format!(
                        "Conflicting requirements for {}: {}",
                        dep.name,
                        describe(&requirements)
                    );
                    self.record_conflict(
                        ConflictKind::ConstraintIntersectionEmpty,
                        &dep.name,
                        requirements,
                        message,
                    );
                    return false;
                }
            }
        }

        true
    }

    /// The open name with the fewest feasible candidates; alphabetic order
    /// breaks ties, so the search is deterministic.
    fn pick_open(&mut self, state: &SearchState) -> Option<String> {
        let mut best: Option<(usize, String)> = None;

        for name in &state.open {
            let aggregate = state
                .aggregates
                .get(name)
                .cloned()
                .unwrap_or(VersionSpecifier::Any);
            let count = self.candidates_for(name, &aggregate, state).feasible.len();

            match &best {
                Some((fewest, _)) if count >= *fewest => {}
                _ => best = Some((count, name.clone())),
            }
        }

        best.map(|(_, name)| name)
    }

    fn candidates_for(
        &mut self,
        name: &str,
        aggregate: &VersionSpecifier,
        state: &SearchState,
    ) -> CandidateOutcome {
        if self.hook.is_some() && !self.hook_defs.contains_key(name) {
            let probe = PackageSpecifier::new(name, aggregate.clone())
                .with_arch(self.arch)
                .with_os(self.os.clone());
            let answer = self.hook.map(|hook| hook(&probe)).unwrap_or(None);
            self.hook_defs.insert(name.to_string(), answer);
        }

        let base: Vec<PackageDef> = match self.hook_defs.get(name) {
            Some(Some(def)) => vec![def.clone()],
            _ => self.graph.candidates(name).to_vec(),
        };
        let listed = base.len();

        let root_filter = self
            .roots
            .iter()
            .chain(self.fixed.iter())
            .find(|spec| spec.name == name)
            .map(|spec| (spec.os.clone(), spec.arch));

        let platform: Vec<PackageDef> = base
            .into_iter()
            .filter(|def| {
                let mut ok = def.identity.arch == CpuArchitecture::AnyCpu
                    || state
                        .selected_arch
                        .map_or(true, |selected| selected == def.identity.arch);

                if let Some((os_override, arch_override)) = &root_filter {
                    if let Some(os) = os_override {
                        ok &= os_matches(&def.identity.os, os);
                    }
                    if *arch_override != CpuArchitecture::Unspecified {
                        ok &= arch_override.supports(def.identity.arch);
                    }
                }

                ok
            })
            .collect();
        let platform_ok = platform.len();

        let feasible: Vec<PackageDef> = platform
            .into_iter()
            .filter(|def| {
                aggregate.matches(&def.identity.version)
                    && (def.identity.version.pre.is_empty() || aggregate.permits_prerelease())
            })
            .collect();

        CandidateOutcome {
            listed,
            platform_ok,
            feasible,
        }
    }

    fn report_dead_end(
        &mut self,
        name: &str,
        aggregate: &VersionSpecifier,
        outcome: &CandidateOutcome,
        state: &SearchState,
    ) {
        let requirements = state.requirements.get(name).cloned().unwrap_or_default();

        let (kind, message) = if outcome.listed == 0 && !self.graph.had_incompatible(name) {
            (
                ConflictKind::PackageNotFound,
                format!("Package {name} could not be found in any repository"),
            )
        } else if outcome.platform_ok == 0 {
            (
                ConflictKind::NoCompatibleVariant,
                format!(
                    "No variant of {} is compatible with {}/{}",
                    name, self.os, self.arch
                ),
            )
        } else {
            (
                ConflictKind::DependencyUnsatisfiable,
                format!(
                    "Unable to find a version of {name} satisfying {aggregate} (required by {})",
                    describe(&requirements)
                ),
            )
        };

        self.diagnostic.reject(name);
        self.record_conflict(kind, name, requirements, message);
    }

    fn record_conflict(
        &mut self,
        kind: ConflictKind,
        name: &str,
        requirements: Vec<Requirement>,
        message: String,
    ) {
        if self
            .conflicts
            .iter()
            .any(|conflict| conflict.kind == kind && conflict.name == name)
        {
            return;
        }

        self.conflicts.push(ConflictReport {
            kind,
            name: name.to_string(),
            requirements,
            message,
        });
    }

    fn succeed(&mut self, state: SearchState) -> ImageResolution {
        // Redraw the chosen assignment as clean edges so the Dot output
        // shows the final graph, not just the exploration.
        for def in state.selected.values() {
            let from = def.identity.to_string();
            for dep in &def.dependencies {
                if let Some(target) = state.selected.get(&dep.name) {
                    self.diagnostic
                        .edge(&from, &target.identity.to_string(), &dep.version, false);
                }
            }
        }

        let assignments = state
            .selected
            .iter()
            .map(|(name, def)| (name.clone(), def.identity.version.clone()))
            .collect();
        let packages = deploy_order(&state.selected);

        ImageResolution {
            assignments,
            success: true,
            diagnostic: self.diagnostic.to_dot(),
            conflicts: mem::take(&mut self.conflicts),
            packages,
        }
    }

    fn fail(&mut self) -> ImageResolution {
        ImageResolution {
            assignments: BTreeMap::new(),
            success: false,
            diagnostic: self.diagnostic.to_dot(),
            conflicts: mem::take(&mut self.conflicts),
            packages: Vec::new(),
        }
    }
}

/// Leaves-first deployment order with alphabetic tie-breaking. Cycles are
/// broken at the alphabetically smallest remaining name.
fn deploy_order(selected: &BTreeMap<String, PackageDef>) -> Vec<PackageDef> {
    let mut emitted: BTreeSet<String> = BTreeSet::new();
    let mut order = Vec::with_capacity(selected.len());

    while emitted.len() < selected.len() {
        let ready = selected
            .iter()
            .filter(|(name, _)| !emitted.contains(name.as_str()))
            .find(|(_, def)| {
                def.dependencies.iter().all(|dep| {
                    !selected.contains_key(&dep.name) || emitted.contains(&dep.name)
                })
            })
            .map(|(name, _)| name.clone());

        let next = match ready {
            Some(name) => name,
            None => match selected.keys().find(|name| !emitted.contains(name.as_str())) {
                Some(name) => name.clone(),
                None => break,
            },
        };

        if let Some(def) = selected.get(&next) {
            order.push(def.clone());
        }
        emitted.insert(next);
    }

    order
}

fn describe(requirements: &[Requirement]) -> String {
    if requirements.is_empty() {
        return "no recorded requirement".to_string();
    }

    requirements
        .iter()
        .map(Requirement::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}
