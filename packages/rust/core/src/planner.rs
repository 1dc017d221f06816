//! Turns a page analysis plus extracted content into an implementation plan.

use std::collections::HashMap;

use tracing::debug;

use cloneforge_deps::{DependencyResolver, pascal_case};
use cloneforge_shared::{
    DependencyKind, DependencyStatus, ExtractedData, ImplementationPlan, PageAnalysis,
    PageDependency, PlannedArtifact, Section, SectionType,
};

/// Site chrome that recurs on every page, so it counts as used more than once.
const RECURRING_USAGE: usize = 2;

/// Build the plan for `slug`.
///
/// - entry file `app/<slug>/page.tsx`
/// - one component per section; header, footer and sidebar are relocated to
///   the shared components directory, nested sections become components
///   their parent depends on
/// - one data file every component depends on
/// - one service over that data file, which the main section depends on
/// - one route per internal link
pub fn build_plan(
    analysis: &PageAnalysis,
    extracted: &ExtractedData,
    slug: &str,
    resolver: &DependencyResolver,
) -> ImplementationPlan {
    let data_path = format!("data/{slug}.json");
    let service_path = format!("services/{}Service.ts", camel_case(slug));

    let mut planner = ComponentPlanner {
        slug,
        data_path: &data_path,
        service_path: &service_path,
        resolver,
        names: HashMap::new(),
        components: Vec::new(),
    };
    for section in &analysis.sections {
        planner.plan_section(section, true);
    }
    let components = planner.components;

    let data_files = vec![PlannedArtifact {
        name: format!("{}Data", pascal_case(slug)),
        path: data_path.clone(),
        section_id: None,
        depends_on: Vec::new(),
        description: format!(
            "Content extracted from {}: {} text blocks, {} images, {} links",
            analysis.url,
            extracted.text_blocks.len(),
            extracted.images.len(),
            extracted.links.len()
        ),
    }];

    let services = vec![PlannedArtifact {
        name: format!("{}Service", pascal_case(slug)),
        path: service_path,
        section_id: None,
        depends_on: vec![data_path.clone()],
        description: format!("Typed accessors over {data_path}"),
    }];

    debug!(
        components = components.len(),
        routes = analysis.dependencies.len(),
        "plan built"
    );

    ImplementationPlan {
        page_slug: slug.to_string(),
        entry_file: format!("app/{slug}/page.tsx"),
        components,
        data_files,
        services,
        routes: analysis.dependencies.clone(),
        resolution: None,
    }
}

/// Components that no other planned component depends on, in plan order.
pub fn top_level_components(plan: &ImplementationPlan) -> Vec<&PlannedArtifact> {
    plan.components
        .iter()
        .filter(|c| {
            !plan
                .components
                .iter()
                .any(|other| other.depends_on.contains(&c.path))
        })
        .collect()
}

struct ComponentPlanner<'a> {
    slug: &'a str,
    data_path: &'a str,
    service_path: &'a str,
    resolver: &'a DependencyResolver,
    /// Uses per base name, for suffixing duplicates.
    names: HashMap<String, usize>,
    components: Vec<PlannedArtifact>,
}

impl ComponentPlanner<'_> {
    /// Plan `section` and its children; returns the section's component path.
    fn plan_section(&mut self, section: &Section, top_level: bool) -> String {
        let name = self.unique_name(section);

        let mut depends_on: Vec<String> = section
            .children
            .iter()
            .map(|child| self.plan_section(child, false))
            .collect();
        depends_on.push(self.data_path.to_string());
        if section.section_type == SectionType::Main {
            depends_on.push(self.service_path.to_string());
        }

        let local = format!("components/{}/{name}.tsx", self.slug);
        let recurring = top_level
            && matches!(
                section.section_type,
                SectionType::Header | SectionType::Footer | SectionType::Sidebar
            );
        let usage = if recurring { RECURRING_USAGE } else { 1 };
        let candidate = PageDependency::new(DependencyKind::Component, &local, DependencyStatus::NeedsCreation);
        let path = if self.resolver.should_be_shared(&candidate, usage) {
            self.resolver.get_shared_path(&candidate).unwrap_or(local)
        } else {
            local
        };

        let label = section.name.as_deref().unwrap_or(section.section_type.as_str());
        self.components.push(PlannedArtifact {
            name,
            path: path.clone(),
            section_id: Some(section.id.clone()),
            depends_on,
            description: format!("{} section \"{label}\" ({})", section.section_type.as_str(), section.selector),
        });
        path
    }

    fn unique_name(&mut self, section: &Section) -> String {
        let base = pascal_case(section.name.as_deref().unwrap_or(section.section_type.as_str()));
        let count = self.names.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}{count}")
        }
    }
}

/// `ai-tools` → `aiTools`.
fn camel_case(s: &str) -> String {
    let pascal = pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => pascal,
    }
}
