//! Automatic dependency wiring between the releases of a project
//!
//! A chart declares which other charts it can be wired to. When a release of
//! such a chart shares a project with a release of the sub-chart, the
//! resolver records `dependencies[sub_chart] = release` on the dependent. An
//! entry the user already declared for that chart always wins.

use std::collections::HashMap;

use keel_core::models::{ProjectInfo, ReleaseRequest};
use keel_core::{Result, SubChartLookup};
use tracing::{debug, info, instrument};

use crate::graph::DependencyGraph;

/// Wire up a batch of new releases and return them in install order.
///
/// Releases come back leaves first, each with the dependencies discovered
/// for it filled in. Fails if the discovered edges form a cycle.
#[instrument(skip_all, fields(releases = releases.len()))]
pub async fn auto_create_release_dependencies<L>(
    lookup: &L,
    releases: Vec<ReleaseRequest>,
) -> Result<Vec<ReleaseRequest>>
where
    L: SubChartLookup + ?Sized,
{
    let mut graph = DependencyGraph::new();
    let mut release_by_chart: HashMap<String, String> = HashMap::new();
    let mut chart_by_release: HashMap<String, String> = HashMap::new();
    for release in &releases {
        graph.add(release.name.as_str());
        release_by_chart.insert(release.chart_name.clone(), release.name.clone());
        chart_by_release.insert(release.name.clone(), release.chart_name.clone());
    }

    for release in &releases {
        let sub_charts = lookup
            .chart_auto_dependencies(&release.repo_name, &release.chart_name, &release.chart_version)
            .await?;
        for sub_chart in sub_charts {
            if release.dependencies.contains_key(&sub_chart) {
                continue;
            }
            if let Some(target) = release_by_chart.get(&sub_chart) {
                graph.connect(&release.name, target);
            }
        }
    }

    let order = graph.walk_order()?;
    let mut by_name: HashMap<String, ReleaseRequest> = releases
        .into_iter()
        .map(|r| (r.name.clone(), r))
        .collect();

    let mut ordered = Vec::with_capacity(order.len());
    for name in order {
        let Some(mut release) = by_name.remove(&name) else {
            continue;
        };
        for dependency in graph.down_edges(&name) {
            if let Some(chart) = chart_by_release.get(dependency) {
                release
                    .dependencies
                    .insert(chart.clone(), dependency.to_string());
            }
        }
        debug!(release = %release.name, dependencies = ?release.dependencies, "resolved dependencies");
        ordered.push(release);
    }
    Ok(ordered)
}

/// Rewire a project around a release being added or removed.
///
/// Returns the existing releases whose dependencies changed and must be
/// re-installed. On add, `changed` also gains entries for the existing
/// releases it depends on. On remove, dependents keep the removed chart's
/// key with an empty value.
#[instrument(skip_all, fields(project = %project.name, release = %changed.name, is_remove = is_remove))]
pub async fn auto_update_release_dependencies<L>(
    lookup: &L,
    project: &ProjectInfo,
    changed: &mut ReleaseRequest,
    is_remove: bool,
) -> Result<Vec<ReleaseRequest>>
where
    L: SubChartLookup + ?Sized,
{
    let mut graph = DependencyGraph::new();
    for release in &project.releases {
        graph.add(release.spec.name.as_str());
    }
    if !is_remove {
        graph.add(changed.name.as_str());
    }
    for release in &project.releases {
        for target in release.spec.dependencies.values() {
            if !target.is_empty() {
                graph.connect(&release.spec.name, target);
            }
        }
    }

    let mut affected = Vec::new();
    if is_remove {
        for upper in graph.up_edges(&changed.name) {
            let Some(mut request) = project.release(upper).map(|r| r.to_request()) else {
                continue;
            };
            if let Some(entry) = request.dependencies.get_mut(&changed.chart_name) {
                entry.clear();
            }
            affected.push(request);
        }
        info!(affected = affected.len(), "releases depending on the removed release");
        return Ok(affected);
    }

    for release in &project.releases {
        if release.spec.name == changed.name
            || release.spec.dependencies.contains_key(&changed.chart_name)
        {
            continue;
        }
        let sub_charts = lookup
            .chart_auto_dependencies(
                &release.spec.repo_name,
                &release.spec.chart_name,
                &release.spec.chart_version,
            )
            .await?;
        if sub_charts.iter().any(|c| *c == changed.chart_name) {
            graph.connect(&release.spec.name, &changed.name);
        }
    }

    let sub_charts = lookup
        .chart_auto_dependencies(&changed.repo_name, &changed.chart_name, &changed.chart_version)
        .await?;
    for sub_chart in sub_charts {
        if changed.dependencies.contains_key(&sub_chart) {
            continue;
        }
        for release in &project.releases {
            if release.spec.chart_name == sub_chart && release.spec.name != changed.name {
                graph.connect(&changed.name, &release.spec.name);
            }
        }
    }

    for upper in graph.up_edges(&changed.name) {
        let Some(mut request) = project.release(upper).map(|r| r.to_request()) else {
            continue;
        };
        request
            .dependencies
            .entry(changed.chart_name.clone())
            .or_insert_with(|| changed.name.clone());
        affected.push(request);
    }

    for lower in graph.down_edges(&changed.name) {
        if let Some(release) = project.release(lower) {
            changed
                .dependencies
                .entry(release.spec.chart_name.clone())
                .or_insert_with(|| release.spec.name.clone());
        }
    }
    info!(
        affected = affected.len(),
        dependencies = ?changed.dependencies,
        "rewired project around added release"
    );
    Ok(affected)
}
