//! Dependency Resolver for planned page implementations.
//!
//! Builds a [`DependencyGraph`] from a plan by probing the project tree,
//! detects and breaks cycles by stubbing, orders the graph topologically and
//! scaffolds placeholders for anything still missing.

mod graph;
mod stub;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use cloneforge_shared::{
    DependencyGraph, DependencyKind, DependencyStatus, ImplementationPlan, PageAnalysis,
    PageDependency, PlanResolution, ResolverConfig,
};

pub use graph::{CycleDetection, detect_circular_dependency, topological_sort};
pub use stub::{StubResult, create_stub, is_stub, pascal_case, stub_content};

/// Directory holding route page files.
pub const ROUTES_DIR: &str = "app";

/// The page file serving an internal route, e.g. `/pricing` → `app/pricing/page.tsx`.
pub fn route_file(route: &str) -> String {
    let trimmed = route.trim_matches('/');
    if trimmed.is_empty() {
        format!("{ROUTES_DIR}/page.tsx")
    } else {
        format!("{ROUTES_DIR}/{trimmed}/page.tsx")
    }
}

/// Output of [`DependencyResolver::resolve_dependencies`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Dependencies in topological order with final statuses.
    pub dependencies: Vec<PageDependency>,
    /// Paths of stubs successfully written.
    pub stubs_created: Vec<String>,
    /// Every stub attempt, including failures.
    pub stub_results: Vec<StubResult>,
    pub cycles: Vec<Vec<String>>,
    pub shared_components: Vec<String>,
    pub shared_data: Vec<String>,
}

impl Resolution {
    pub fn failed_stubs(&self) -> impl Iterator<Item = &StubResult> {
        self.stub_results.iter().filter(|r| !r.success)
    }
}

impl From<Resolution> for PlanResolution {
    fn from(r: Resolution) -> Self {
        Self {
            dependencies: r.dependencies,
            stubs_created: r.stubs_created,
            cycles: r.cycles,
            shared_components: r.shared_components,
            shared_data: r.shared_data,
        }
    }
}

/// Resolves plan dependencies against a project tree.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    config: ResolverConfig,
}

impl DependencyResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    fn exists(&self, path: &str) -> bool {
        self.config.project_root.join(path).exists()
    }

    /// Shared directory for a kind; routes have none.
    fn shared_dir(&self, kind: DependencyKind) -> Option<&str> {
        match kind {
            DependencyKind::Component => Some(self.config.shared_components_dir.as_str()),
            DependencyKind::Data => Some(self.config.shared_data_dir.as_str()),
            DependencyKind::Service => Some(self.config.shared_services_dir.as_str()),
            DependencyKind::Route => None,
        }
    }

    /// Whether `path` sits inside any configured shared directory.
    pub fn in_shared_dir(&self, path: &str) -> bool {
        self.config
            .shared_dirs()
            .iter()
            .any(|dir| path.starts_with(&format!("{}/", dir.trim_end_matches('/'))))
    }

    /// Shared when used by more than one page or already in a shared directory.
    pub fn should_be_shared(&self, dep: &PageDependency, usage_count: usize) -> bool {
        usage_count > 1 || self.in_shared_dir(&dep.path)
    }

    /// Canonical shared-namespace path for `dep`, keeping its file name.
    pub fn get_shared_path(&self, dep: &PageDependency) -> Option<String> {
        let dir = self.shared_dir(dep.kind)?;
        let file_name = dep.path.rsplit('/').next().unwrap_or(&dep.path);
        Some(format!("{}/{file_name}", dir.trim_end_matches('/')))
    }

    /// Classify every planned artifact and linked route against the filesystem.
    #[instrument(skip_all, fields(page_slug = %plan.page_slug))]
    pub fn analyze_dependencies(
        &self,
        analysis: &PageAnalysis,
        plan: &ImplementationPlan,
    ) -> DependencyGraph {
        let mut graph = DependencyGraph {
            page_slug: plan.page_slug.clone(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for (kind, artifact) in plan.artifacts() {
            if !seen.insert(artifact.path.clone()) {
                continue;
            }
            let status = if self.exists(&artifact.path) {
                DependencyStatus::Exists
            } else {
                DependencyStatus::NeedsCreation
            };
            let dep = PageDependency::new(kind, artifact.path.clone(), status)
                .with_depends_on(artifact.depends_on.iter().cloned());

            if status == DependencyStatus::Exists {
                self.record_shared(&dep, &mut graph.shared_components, &mut graph.shared_data);
            }
            graph.dependencies.push(dep);
        }

        let routes = analysis.dependencies.iter().chain(&plan.routes);
        for route in routes {
            let path = route_file(route);
            if !seen.insert(path.clone()) {
                continue;
            }
            let status = if self.exists(&path) {
                DependencyStatus::Exists
            } else {
                DependencyStatus::NeedsCreation
            };
            graph
                .dependencies
                .push(PageDependency::new(DependencyKind::Route, path, status));
            graph.linked_pages.push(route.clone());
        }

        debug!(
            dependencies = graph.dependencies.len(),
            linked_pages = graph.linked_pages.len(),
            "dependency graph built"
        );
        graph
    }

    fn record_shared(
        &self,
        dep: &PageDependency,
        components: &mut Vec<String>,
        data: &mut Vec<String>,
    ) {
        if !self.in_shared_dir(&dep.path) {
            return;
        }
        let bucket = match dep.kind {
            DependencyKind::Component => components,
            DependencyKind::Data | DependencyKind::Service => data,
            DependencyKind::Route => return,
        };
        if !bucket.contains(&dep.path) {
            bucket.push(dep.path.clone());
        }
    }

    /// Break cycles, order the graph and stub everything still missing.
    ///
    /// Never fails: stub write failures are reported per dependency in
    /// [`Resolution::stub_results`] and processing continues.
    #[instrument(skip_all, fields(page_slug = %graph.page_slug))]
    pub fn resolve_dependencies(&self, graph: &DependencyGraph) -> Resolution {
        let mut deps = graph.dependencies.clone();
        let mut resolution = Resolution {
            shared_components: graph.shared_components.clone(),
            shared_data: graph.shared_data.clone(),
            ..Default::default()
        };

        self.break_cycles(&mut deps, &mut resolution);

        let mut sorted = topological_sort(&deps);
        for dep in &mut sorted {
            match dep.status {
                DependencyStatus::Stub => {}
                DependencyStatus::Exists if self.exists(&dep.path) => {
                    self.record_shared(
                        dep,
                        &mut resolution.shared_components,
                        &mut resolution.shared_data,
                    );
                }
                DependencyStatus::Exists | DependencyStatus::NeedsCreation => {
                    let result = create_stub(self.project_root(), dep);
                    if result.success {
                        dep.status = DependencyStatus::Stub;
                        resolution.stubs_created.push(result.path.clone());
                    } else {
                        dep.status = DependencyStatus::NeedsCreation;
                    }
                    resolution.stub_results.push(result);
                }
            }
        }
        resolution.dependencies = sorted;

        info!(
            dependencies = resolution.dependencies.len(),
            stubs = resolution.stubs_created.len(),
            cycles = resolution.cycles.len(),
            failed = resolution.failed_stubs().count(),
            "dependencies resolved"
        );
        resolution
    }

    /// Stub every creatable member of each detected cycle until none remain.
    ///
    /// A stub drops its outgoing edges, which is what removes the cycle. A
    /// cycle made only of existing files cannot be broken: it is reported,
    /// its edges are masked from further detection and the search goes on.
    fn break_cycles(&self, deps: &mut [PageDependency], resolution: &mut Resolution) {
        let mut stubbed: HashSet<String> = HashSet::new();
        let mut masked: HashSet<(String, String)> = HashSet::new();

        loop {
            let view = without_edges(deps, &masked);
            let Some(cycle) = detect_circular_dependency(&view).cycle else {
                break;
            };
            warn!(cycle = %cycle.join(" -> "), "circular dependency detected");
            let mut broke = false;

            for member in &cycle {
                if stubbed.contains(member) {
                    continue;
                }
                let Some(dep) = deps
                    .iter_mut()
                    .find(|d| &d.path == member && d.status == DependencyStatus::NeedsCreation)
                else {
                    continue;
                };

                let result = create_stub(&self.config.project_root, dep);
                if result.success {
                    resolution.stubs_created.push(result.path.clone());
                }
                resolution.stub_results.push(result);

                dep.status = DependencyStatus::Stub;
                dep.depends_on.clear();
                stubbed.insert(member.clone());
                broke = true;
            }

            if !broke {
                warn!("cycle has no member that needs creation, leaving it in place");
                masked.extend(
                    cycle
                        .windows(2)
                        .map(|edge| (edge[0].clone(), edge[1].clone())),
                );
            }
            resolution.cycles.push(cycle);
        }
    }
}

/// A copy of `deps` with the `(from, to)` edges in `masked` removed.
fn without_edges(
    deps: &[PageDependency],
    masked: &HashSet<(String, String)>,
) -> Vec<PageDependency> {
    if masked.is_empty() {
        return deps.to_vec();
    }
    deps.iter()
        .map(|dep| {
            let mut dep = dep.clone();
            let from = dep.path.clone();
            dep.depends_on
                .retain(|to| !masked.contains(&(from.clone(), to.clone())));
            dep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloneforge_shared::PlannedArtifact;
    use std::path::PathBuf;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cf-deps-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn resolver(root: &Path) -> DependencyResolver {
        DependencyResolver::new(ResolverConfig::new(root))
    }

    fn touch(root: &Path, path: &str) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, "// existing").unwrap();
    }

    fn artifact(path: &str, depends_on: &[&str]) -> PlannedArtifact {
        PlannedArtifact {
            name: path.rsplit('/').next().unwrap().into(),
            path: path.into(),
            section_id: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
        }
    }

    fn analysis(routes: &[&str]) -> PageAnalysis {
        PageAnalysis {
            url: "https://example.com/demo".into(),
            title: "Demo".into(),
            sections: vec![],
            interactive_elements: vec![],
            navigation: vec![],
            breakpoints: vec![640],
            dependencies: routes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn plan() -> ImplementationPlan {
        ImplementationPlan {
            page_slug: "demo".into(),
            entry_file: "app/demo/page.tsx".into(),
            components: vec![
                artifact("components/demo/Hero.tsx", &["services/demoService.ts"]),
                artifact("components/shared/Header.tsx", &["data/demo.json"]),
            ],
            data_files: vec![artifact("data/demo.json", &[])],
            services: vec![artifact("services/demoService.ts", &["data/demo.json"])],
            routes: vec![],
            resolution: None,
        }
    }

    #[test]
    fn route_file_mapping() {
        assert_eq!(route_file("/pricing"), "app/pricing/page.tsx");
        assert_eq!(route_file("/blog/posts/"), "app/blog/posts/page.tsx");
        assert_eq!(route_file("/"), "app/page.tsx");
    }

    #[test]
    fn analyze_classifies_existing_and_missing() {
        let root = temp_root();
        touch(&root, "components/shared/Header.tsx");
        touch(&root, "app/pricing/page.tsx");

        let graph = resolver(&root).analyze_dependencies(&analysis(&["/pricing", "/about"]), &plan());
        let status = |path: &str| {
            graph
                .dependencies
                .iter()
                .find(|d| d.path == path)
                .map(|d| d.status)
                .unwrap()
        };

        assert_eq!(status("components/shared/Header.tsx"), DependencyStatus::Exists);
        assert_eq!(status("components/demo/Hero.tsx"), DependencyStatus::NeedsCreation);
        assert_eq!(status("app/pricing/page.tsx"), DependencyStatus::Exists);
        assert_eq!(status("app/about/page.tsx"), DependencyStatus::NeedsCreation);
        assert_eq!(graph.shared_components, ["components/shared/Header.tsx"]);
        assert_eq!(graph.linked_pages, ["/pricing", "/about"]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn resolve_stubs_missing_in_dependency_order() {
        let root = temp_root();
        touch(&root, "components/shared/Header.tsx");
        let r = resolver(&root);
        let graph = r.analyze_dependencies(&analysis(&["/about"]), &plan());
        let resolution = r.resolve_dependencies(&graph);

        assert!(resolution.cycles.is_empty());
        let order: Vec<&str> = resolution.dependencies.iter().map(|d| d.path.as_str()).collect();
        let pos = |p: &str| order.iter().position(|o| *o == p).unwrap();
        assert!(pos("data/demo.json") < pos("services/demoService.ts"));
        assert!(pos("services/demoService.ts") < pos("components/demo/Hero.tsx"));

        assert_eq!(resolution.stubs_created.len(), 4);
        assert!(root.join("app/about/page.tsx").exists());
        assert!(root.join("data/demo.json").exists());
        assert_eq!(
            std::fs::read_to_string(root.join("components/shared/Header.tsx")).unwrap(),
            "// existing"
        );
        assert_eq!(resolution.shared_components, ["components/shared/Header.tsx"]);
        assert!(
            resolution
                .dependencies
                .iter()
                .filter(|d| d.path != "components/shared/Header.tsx")
                .all(|d| d.status == DependencyStatus::Stub)
        );
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn resolve_breaks_cycles_with_stubs() {
        let root = temp_root();
        let graph = DependencyGraph {
            page_slug: "demo".into(),
            dependencies: vec![
                PageDependency::new(DependencyKind::Component, "A.tsx", DependencyStatus::NeedsCreation)
                    .with_depends_on(["B.tsx"]),
                PageDependency::new(DependencyKind::Component, "B.tsx", DependencyStatus::NeedsCreation)
                    .with_depends_on(["A.tsx"]),
            ],
            ..Default::default()
        };
        let resolution = resolver(&root).resolve_dependencies(&graph);

        assert_eq!(resolution.cycles, [vec!["A.tsx", "B.tsx", "A.tsx"]]);
        assert!(resolution.dependencies.iter().all(|d| d.status == DependencyStatus::Stub));
        assert!(!detect_circular_dependency(&resolution.dependencies).has_circular);
        assert_eq!(resolution.stubs_created.len(), 2);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn unbreakable_cycle_is_reported_and_left() {
        let root = temp_root();
        touch(&root, "A.tsx");
        touch(&root, "B.tsx");
        let graph = DependencyGraph {
            page_slug: "demo".into(),
            dependencies: vec![
                PageDependency::new(DependencyKind::Component, "A.tsx", DependencyStatus::Exists)
                    .with_depends_on(["B.tsx"]),
                PageDependency::new(DependencyKind::Component, "B.tsx", DependencyStatus::Exists)
                    .with_depends_on(["A.tsx"]),
            ],
            ..Default::default()
        };
        let resolution = resolver(&root).resolve_dependencies(&graph);
        assert_eq!(resolution.cycles.len(), 1);
        assert!(resolution.stubs_created.is_empty());
        assert_eq!(resolution.dependencies.len(), 2);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn unbreakable_cycle_does_not_hide_later_cycles() {
        let root = temp_root();
        touch(&root, "a.ts");
        touch(&root, "b.ts");
        let graph = DependencyGraph {
            page_slug: "demo".into(),
            dependencies: vec![
                PageDependency::new(DependencyKind::Service, "a.ts", DependencyStatus::Exists)
                    .with_depends_on(["b.ts"]),
                PageDependency::new(DependencyKind::Service, "b.ts", DependencyStatus::Exists)
                    .with_depends_on(["a.ts"]),
                PageDependency::new(DependencyKind::Service, "c.ts", DependencyStatus::NeedsCreation)
                    .with_depends_on(["d.ts"]),
                PageDependency::new(DependencyKind::Service, "d.ts", DependencyStatus::NeedsCreation)
                    .with_depends_on(["c.ts"]),
            ],
            ..Default::default()
        };
        let resolution = resolver(&root).resolve_dependencies(&graph);

        assert_eq!(
            resolution.cycles,
            [vec!["a.ts", "b.ts", "a.ts"], vec!["c.ts", "d.ts", "c.ts"]]
        );
        for path in ["c.ts", "d.ts"] {
            let dep = resolution.dependencies.iter().find(|d| d.path == path).unwrap();
            assert_eq!(dep.status, DependencyStatus::Stub);
            assert!(dep.depends_on.is_empty(), "{path}");
        }
        let remaining: Vec<PageDependency> = resolution
            .dependencies
            .iter()
            .filter(|d| d.status != DependencyStatus::Exists)
            .cloned()
            .collect();
        assert!(!detect_circular_dependency(&remaining).has_circular);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn breakable_cycle_through_an_unbreakable_node_is_still_broken() {
        let root = temp_root();
        touch(&root, "a.ts");
        touch(&root, "b.ts");
        let graph = DependencyGraph {
            page_slug: "demo".into(),
            dependencies: vec![
                PageDependency::new(DependencyKind::Service, "a.ts", DependencyStatus::Exists)
                    .with_depends_on(["b.ts", "c.ts"]),
                PageDependency::new(DependencyKind::Service, "b.ts", DependencyStatus::Exists)
                    .with_depends_on(["a.ts"]),
                PageDependency::new(DependencyKind::Service, "c.ts", DependencyStatus::NeedsCreation)
                    .with_depends_on(["a.ts"]),
            ],
            ..Default::default()
        };
        let resolution = resolver(&root).resolve_dependencies(&graph);

        assert_eq!(resolution.cycles.len(), 2);
        let c = resolution.dependencies.iter().find(|d| d.path == "c.ts").unwrap();
        assert_eq!(c.status, DependencyStatus::Stub);
        assert!(c.depends_on.is_empty());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn escaping_route_never_writes_outside_root() {
        let parent = temp_root();
        let root = parent.join("project");
        std::fs::create_dir_all(&root).unwrap();
        let mut plan = plan();
        plan.routes = vec!["../../escape".into()];

        let r = resolver(&root);
        let graph = r.analyze_dependencies(&analysis(&[]), &plan);
        let resolution = r.resolve_dependencies(&graph);

        assert!(!parent.join("escape").exists());
        assert!(resolution.stubs_created.iter().all(|p| !p.contains("..")));
        assert_eq!(resolution.failed_stubs().count(), 1);
        std::fs::remove_dir_all(&parent).ok();
    }

    #[test]
    fn stub_failure_does_not_abort_resolution() {
        let root = temp_root();
        std::fs::write(root.join("blocked"), "").unwrap();
        let graph = DependencyGraph {
            page_slug: "demo".into(),
            dependencies: vec![
                PageDependency::new(DependencyKind::Component, "blocked/Hero.tsx", DependencyStatus::NeedsCreation),
                PageDependency::new(DependencyKind::Data, "data/demo.json", DependencyStatus::NeedsCreation),
            ],
            ..Default::default()
        };
        let resolution = resolver(&root).resolve_dependencies(&graph);

        assert_eq!(resolution.failed_stubs().count(), 1);
        assert_eq!(resolution.stubs_created, ["data/demo.json"]);
        let hero = resolution.dependencies.iter().find(|d| d.path == "blocked/Hero.tsx").unwrap();
        assert_eq!(hero.status, DependencyStatus::NeedsCreation);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn sharing_rules() {
        let r = resolver(Path::new("/project"));
        let local = PageDependency::new(
            DependencyKind::Component,
            "components/demo/Footer.tsx",
            DependencyStatus::NeedsCreation,
        );
        assert!(!r.should_be_shared(&local, 1));
        assert!(r.should_be_shared(&local, 2));
        assert_eq!(
            r.get_shared_path(&local).as_deref(),
            Some("components/shared/Footer.tsx")
        );

        let shared = PageDependency::new(
            DependencyKind::Data,
            "data/shared/categories.json",
            DependencyStatus::Exists,
        );
        assert!(r.should_be_shared(&shared, 1));

        let service = PageDependency::new(
            DependencyKind::Service,
            "services/toolService.ts",
            DependencyStatus::NeedsCreation,
        );
        assert_eq!(
            r.get_shared_path(&service).as_deref(),
            Some("services/shared/toolService.ts")
        );

        let route = PageDependency::new(DependencyKind::Route, "app/x/page.tsx", DependencyStatus::Exists);
        assert_eq!(r.get_shared_path(&route), None);
    }
}
