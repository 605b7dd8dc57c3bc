use std::collections::{BTreeSet, HashMap, HashSet};

use crate::action::Stage;
use crate::error::{CoreError, CoreResult};

/// Execution order for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    /// Indices into the stage's actions, in execution order.
    pub order: Vec<usize>,
    /// Dependency level of each action (indexed like the stage's actions).
    /// Level 0 actions have no dependency inside the stage.
    pub depth: Vec<usize>,
}

impl PlannedStage {
    /// Execution order split by dependency level. Actions of one level have
    /// no ordering relationship between them.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let mut levels: Vec<Vec<usize>> = Vec::new();
        for &idx in &self.order {
            let d = self.depth[idx];
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(idx);
        }
        levels
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub stages: Vec<PlannedStage>,
}

/// Borrowed view of an action for resolution.
pub(crate) struct NodeSpec<'a> {
    pub id: &'a str,
    pub deps: Vec<&'a str>,
}

pub(crate) struct StageSpec<'a> {
    pub name: &'a str,
    pub nodes: Vec<NodeSpec<'a>>,
}

/// Order the actions of every stage. `satisfied` holds ids that completed in
/// an earlier run and may be depended upon.
///
/// Fails on duplicate ids, unknown dependencies, dependencies on later stages
/// and cycles. Nothing has run when this fails.
pub fn resolve(stages: &[Stage], satisfied: &HashSet<String>) -> CoreResult<Plan> {
    let specs: Vec<StageSpec<'_>> = stages
        .iter()
        .map(|stage| StageSpec {
            name: &stage.name,
            nodes: stage
                .actions
                .iter()
                .map(|a| NodeSpec {
                    id: a.id(),
                    deps: a.dependencies().to_vec(),
                })
                .collect(),
        })
        .collect();
    resolve_specs(&specs, satisfied)
}

pub(crate) fn resolve_specs(
    stages: &[StageSpec<'_>],
    satisfied: &HashSet<String>,
) -> CoreResult<Plan> {
    let mut owner: HashMap<&str, usize> = HashMap::new();
    for (si, stage) in stages.iter().enumerate() {
        for node in &stage.nodes {
            if satisfied.contains(node.id) || owner.insert(node.id, si).is_some() {
                return Err(CoreError::DuplicateAction(node.id.to_string()));
            }
        }
    }

    let mut planned = Vec::with_capacity(stages.len());
    for (si, stage) in stages.iter().enumerate() {
        planned.push(order_stage(si, stage, &owner, satisfied)?);
    }
    Ok(Plan { stages: planned })
}

fn order_stage(
    si: usize,
    stage: &StageSpec<'_>,
    owner: &HashMap<&str, usize>,
    satisfied: &HashSet<String>,
) -> CoreResult<PlannedStage> {
    let n = stage.nodes.len();
    let index_of: HashMap<&str, usize> = stage
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut reverse: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for (i, node) in stage.nodes.iter().enumerate() {
        let mut seen = HashSet::new();
        for &dep in &node.deps {
            if !seen.insert(dep) {
                continue;
            }
            if let Some(&j) = index_of.get(dep) {
                in_degree[i] += 1;
                reverse[j].insert(i);
                continue;
            }
            match owner.get(dep) {
                Some(&ds) if ds < si => {}
                Some(_) => {
                    return Err(CoreError::StageOrder {
                        action: node.id.to_string(),
                        stage: stage.name.to_string(),
                        dependency: dep.to_string(),
                    })
                }
                None if satisfied.contains(dep) => {}
                None => {
                    return Err(CoreError::UnknownDependency {
                        action: node.id.to_string(),
                        dependency: dep.to_string(),
                    })
                }
            }
        }
    }

    // Ready set keyed by declaration index breaks ties deterministically.
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut depth = vec![0usize; n];
    let mut order = Vec::with_capacity(n);

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &reverse[next] {
            depth[child] = depth[child].max(depth[next] + 1);
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() != n {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let mut cycle: Vec<String> = (0..n)
            .filter(|i| !placed.contains(i))
            .map(|i| stage.nodes[i].id.to_string())
            .collect();
        cycle.sort();
        return Err(CoreError::DependencyCycle(cycle));
    }

    Ok(PlannedStage {
        name: stage.name.to_string(),
        order,
        depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage<'a>(name: &'a str, nodes: &[(&'a str, &[&'a str])]) -> StageSpec<'a> {
        StageSpec {
            name,
            nodes: nodes
                .iter()
                .map(|&(id, deps)| NodeSpec {
                    id,
                    deps: deps.to_vec(),
                })
                .collect(),
        }
    }

    fn ids(spec: &StageSpec<'_>, planned: &PlannedStage) -> Vec<String> {
        planned
            .order
            .iter()
            .map(|&i| spec.nodes[i].id.to_string())
            .collect()
    }

    #[test]
    fn dependencies_run_first() {
        let spec = stage(
            "checks",
            &[
                ("D", &["B", "C"]),
                ("C", &["A"]),
                ("B", &["A"]),
                ("A", &[]),
            ],
        );
        let plan = resolve_specs(std::slice::from_ref(&spec), &HashSet::new()).unwrap();
        let order = ids(&spec, &plan.stages[0]);

        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        for (node, deps) in [("D", ["B", "C"]), ("C", ["A", "A"]), ("B", ["A", "A"])] {
            for dep in deps {
                assert!(pos(dep) < pos(node), "{dep} must run before {node}");
            }
        }
        assert_eq!(order, vec!["A", "C", "B", "D"]);
    }

    #[test]
    fn independent_actions_keep_declaration_order() {
        let spec = stage("checks", &[("Z", &[]), ("M", &[]), ("A", &[])]);
        let plan = resolve_specs(std::slice::from_ref(&spec), &HashSet::new()).unwrap();
        assert_eq!(ids(&spec, &plan.stages[0]), vec!["Z", "M", "A"]);
    }

    #[test]
    fn cycle_is_rejected_with_members() {
        let spec = stage(
            "checks",
            &[("A", &["C"]), ("B", &["A"]), ("C", &["B"]), ("D", &[])],
        );
        let err = resolve_specs(std::slice::from_ref(&spec), &HashSet::new()).unwrap_err();
        match err {
            CoreError::DependencyCycle(members) => assert_eq!(members, vec!["A", "B", "C"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let spec = stage("checks", &[("A", &["A"])]);
        assert!(matches!(
            resolve_specs(std::slice::from_ref(&spec), &HashSet::new()),
            Err(CoreError::DependencyCycle(_))
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let spec = stage("checks", &[("A", &["MISSING"])]);
        let err = resolve_specs(std::slice::from_ref(&spec), &HashSet::new()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownDependency { ref action, ref dependency }
                if action == "A" && dependency == "MISSING"
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected_across_stages() {
        let stages = [stage("one", &[("A", &[])]), stage("two", &[("A", &[])])];
        assert!(matches!(
            resolve_specs(&stages, &HashSet::new()),
            Err(CoreError::DuplicateAction(id)) if id == "A"
        ));
    }

    #[test]
    fn later_stages_may_depend_on_earlier_ones_only() {
        let ok = [
            stage("checks", &[("CHECK", &[])]),
            stage("changes", &[("CHANGE", &["CHECK"])]),
        ];
        let plan = resolve_specs(&ok, &HashSet::new()).unwrap();
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.stages[1].depth, vec![0]);

        let backwards = [
            stage("checks", &[("CHECK", &["CHANGE"])]),
            stage("changes", &[("CHANGE", &[])]),
        ];
        assert!(matches!(
            resolve_specs(&backwards, &HashSet::new()),
            Err(CoreError::StageOrder { .. })
        ));
    }

    #[test]
    fn previously_completed_ids_satisfy_dependencies() {
        let spec = stage("post", &[("CLEANUP", &["CHANGE"])]);
        let satisfied: HashSet<String> = ["CHANGE".to_string()].into_iter().collect();
        assert!(resolve_specs(std::slice::from_ref(&spec), &satisfied).is_ok());
    }

    #[test]
    fn levels_group_unrelated_actions() {
        let spec = stage(
            "changes",
            &[("A", &[]), ("B", &[]), ("C", &["A"]), ("D", &["C", "B"])],
        );
        let plan = resolve_specs(std::slice::from_ref(&spec), &HashSet::new()).unwrap();
        assert_eq!(plan.stages[0].levels(), vec![vec![0, 1], vec![2], vec![3]]);
    }
}
