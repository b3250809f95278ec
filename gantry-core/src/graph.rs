//! Pipeline graph
//!
//! Validates the gating edges of a [`PipelineDefinition`] and yields the
//! stages as topological batches: every stage in a batch depends only on
//! stages from earlier batches, so a whole batch can run concurrently.

use std::collections::HashMap;

use crate::domain::pipeline::PipelineDefinition;
use crate::error::DefinitionError;

/// Validated stage dependency graph
///
/// Owns its stage names so it can be shared with running pipelines
/// independently of the definition it was built from.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    /// Stage names in declaration order
    order: Vec<String>,
    index: HashMap<String, usize>,
    /// Deduplicated prerequisites per stage, in `needs` order
    prerequisites: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl PipelineGraph {
    /// Builds and validates the graph for a definition
    ///
    /// # Errors
    /// - [`DefinitionError::Invalid`] for an empty definition or duplicate stage names
    /// - [`DefinitionError::UnknownStage`] when a `needs` entry names no stage
    /// - [`DefinitionError::CyclicDependency`] when gating edges form a cycle
    pub fn new(definition: &PipelineDefinition) -> Result<Self, DefinitionError> {
        if definition.stages.is_empty() {
            return Err(DefinitionError::invalid(
                "pipeline must have at least one stage",
            ));
        }

        let mut order = Vec::with_capacity(definition.stages.len());
        let mut index = HashMap::with_capacity(definition.stages.len());
        for (idx, stage) in definition.stages.iter().enumerate() {
            if index.insert(stage.name.clone(), idx).is_some() {
                return Err(DefinitionError::invalid(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            order.push(stage.name.clone());
        }

        let mut prerequisites = vec![Vec::new(); order.len()];
        let mut dependents = vec![Vec::new(); order.len()];
        for (idx, stage) in definition.stages.iter().enumerate() {
            for needed in &stage.needs {
                let Some(&prereq) = index.get(needed) else {
                    return Err(DefinitionError::UnknownStage {
                        stage: stage.name.clone(),
                        prerequisite: needed.clone(),
                    });
                };
                if !prerequisites[idx].contains(&prereq) {
                    prerequisites[idx].push(prereq);
                    dependents[prereq].push(idx);
                }
            }
        }

        let graph = Self {
            order,
            index,
            prerequisites,
            dependents,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(DefinitionError::CyclicDependency { cycle });
        }

        Ok(graph)
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stage names in declaration order
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.index.contains_key(stage)
    }

    /// Direct prerequisites of a stage (empty for unknown stages)
    pub fn prerequisites(&self, stage: &str) -> Vec<&str> {
        self.index
            .get(stage)
            .map(|&idx| {
                self.prerequisites[idx]
                    .iter()
                    .map(|&p| self.order[p].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stages that directly depend on `stage`
    pub fn dependents(&self, stage: &str) -> Vec<&str> {
        self.index
            .get(stage)
            .map(|&idx| {
                self.dependents[idx]
                    .iter()
                    .map(|&d| self.order[d].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lazily yields runnable batches of stage names
    ///
    /// Within a batch, stages keep their declaration order.
    pub fn topological_batches(&self) -> TopologicalBatches<'_> {
        TopologicalBatches {
            graph: self,
            unresolved: self.prerequisites.iter().map(Vec::len).collect(),
            emitted: vec![false; self.order.len()],
        }
    }

    /// Depth-first search for a back edge, visiting stages in declaration order
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &PipelineGraph,
            node: usize,
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            marks[node] = Mark::InProgress;
            path.push(node);

            for &next in &graph.prerequisites[node] {
                match marks[next] {
                    Mark::InProgress => {
                        let start = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..]
                            .iter()
                            .map(|&n| graph.order[n].clone())
                            .collect();
                        cycle.push(graph.order[next].clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(graph, next, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            path.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.order.len()];
        let mut path = Vec::new();
        for node in 0..self.order.len() {
            if marks[node] == Mark::Unvisited {
                if let Some(cycle) = visit(self, node, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

/// Iterator over topological batches, see [`PipelineGraph::topological_batches`]
#[derive(Debug, Clone)]
pub struct TopologicalBatches<'a> {
    graph: &'a PipelineGraph,
    /// Prerequisites not yet emitted, per stage
    unresolved: Vec<usize>,
    emitted: Vec<bool>,
}

impl<'a> Iterator for TopologicalBatches<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let ready: Vec<usize> = (0..self.graph.order.len())
            .filter(|&idx| !self.emitted[idx] && self.unresolved[idx] == 0)
            .collect();

        if ready.is_empty() {
            return None;
        }

        for &idx in &ready {
            self.emitted[idx] = true;
            for &dependent in &self.graph.dependents[idx] {
                self.unresolved[dependent] -= 1;
            }
        }

        Some(
            ready
                .into_iter()
                .map(|idx| self.graph.order[idx].as_str())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{StageDefinition, StepDefinition};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn stage(name: &str, needs: &[&str]) -> StageDefinition {
        needs.iter().fold(
            StageDefinition::new(name).step(StepDefinition::new("true")),
            |acc, need| acc.needs(*need),
        )
    }

    fn definition(stages: Vec<StageDefinition>) -> PipelineDefinition {
        PipelineDefinition {
            name: "test".to_string(),
            description: None,
            triggers: Default::default(),
            stages,
        }
    }

    fn batches(graph: &PipelineGraph) -> Vec<Vec<String>> {
        graph
            .topological_batches()
            .map(|batch| batch.into_iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_web_app_graph_batches() {
        let graph = PipelineGraph::new(&definition(vec![
            stage("backend", &[]),
            stage("frontend", &[]),
            stage("integration", &["backend", "frontend"]),
            stage("docker", &["integration"]),
        ]))
        .unwrap();

        assert_eq!(
            batches(&graph),
            vec![
                vec!["backend".to_string(), "frontend".to_string()],
                vec!["integration".to_string()],
                vec!["docker".to_string()],
            ]
        );
        assert_eq!(graph.prerequisites("integration"), vec!["backend", "frontend"]);
        assert_eq!(graph.dependents("backend"), vec!["integration"]);
    }

    #[test]
    fn test_batches_follow_declaration_order_not_dependency_order() {
        // "deploy" is declared before the stage it needs
        let graph = PipelineGraph::new(&definition(vec![
            stage("deploy", &["build"]),
            stage("lint", &[]),
            stage("build", &[]),
        ]))
        .unwrap();

        assert_eq!(
            batches(&graph),
            vec![
                vec!["lint".to_string(), "build".to_string()],
                vec!["deploy".to_string()],
            ]
        );
    }

    #[test]
    fn test_two_stage_cycle_is_rejected() {
        let err = PipelineGraph::new(&definition(vec![
            stage("a", &["b"]),
            stage("b", &["a"]),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            DefinitionError::CyclicDependency {
                cycle: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = PipelineGraph::new(&definition(vec![stage("a", &["a"])])).unwrap_err();
        assert!(matches!(err, DefinitionError::CyclicDependency { .. }));
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let err = PipelineGraph::new(&definition(vec![
            stage("root", &[]),
            stage("x", &["root", "z"]),
            stage("y", &["x"]),
            stage("z", &["y"]),
        ]))
        .unwrap_err();

        match err {
            DefinitionError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                let members: HashSet<_> = cycle.iter().map(String::as_str).collect();
                assert_eq!(members, HashSet::from(["x", "y", "z"]));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_prerequisite_is_rejected() {
        let err = PipelineGraph::new(&definition(vec![stage("deploy", &["build"])])).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UnknownStage {
                stage: "deploy".into(),
                prerequisite: "build".into()
            }
        );
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err =
            PipelineGraph::new(&definition(vec![stage("a", &[]), stage("a", &[])])).unwrap_err();
        assert!(matches!(err, DefinitionError::Invalid(_)));
    }

    #[test]
    fn test_repeated_need_counts_once() {
        let graph = PipelineGraph::new(&definition(vec![
            stage("a", &[]),
            stage("b", &["a", "a"]),
        ]))
        .unwrap();
        assert_eq!(graph.prerequisites("b"), vec!["a"]);
        assert_eq!(batches(&graph).len(), 2);
    }

    #[test]
    fn test_batches_are_lazy() {
        let graph = PipelineGraph::new(&definition(vec![
            stage("a", &[]),
            stage("b", &["a"]),
            stage("c", &["b"]),
        ]))
        .unwrap();

        let mut iter = graph.topological_batches();
        assert_eq!(iter.next(), Some(vec!["a"]));
        assert_eq!(iter.next(), Some(vec!["b"]));
        assert_eq!(iter.next(), Some(vec!["c"]));
        assert_eq!(iter.next(), None);
    }

    /// Random DAGs: stage `i` may only need stages with a lower rank, and the
    /// declaration order is an arbitrary permutation of the ranks.
    fn arbitrary_dag() -> impl Strategy<Value = PipelineDefinition> {
        (1usize..12)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
                    Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                )
            })
            .prop_map(|(edges, declaration)| {
                let stages = declaration
                    .iter()
                    .map(|&rank| {
                        let needs: Vec<String> = (0..rank)
                            .filter(|&lower| edges[rank][lower])
                            .map(|lower| format!("s{lower}"))
                            .collect();
                        let needs: Vec<&str> = needs.iter().map(String::as_str).collect();
                        stage(&format!("s{rank}"), &needs)
                    })
                    .collect();
                definition(stages)
            })
    }

    proptest! {
        #[test]
        fn prop_batches_partition_stages_and_respect_prerequisites(def in arbitrary_dag()) {
            let graph = PipelineGraph::new(&def).unwrap();
            let batches = batches(&graph);

            let flattened: Vec<&String> = batches.iter().flatten().collect();
            prop_assert_eq!(flattened.len(), def.stages.len());
            let unique: HashSet<&String> = flattened.iter().copied().collect();
            prop_assert_eq!(unique.len(), def.stages.len());

            let batch_of: HashMap<&str, usize> = batches
                .iter()
                .enumerate()
                .flat_map(|(idx, batch)| batch.iter().map(move |name| (name.as_str(), idx)))
                .collect();

            for stage in &def.stages {
                for need in &stage.needs {
                    prop_assert!(batch_of[need.as_str()] < batch_of[stage.name.as_str()]);
                }
            }

            for batch in &batches {
                let positions: Vec<usize> = batch
                    .iter()
                    .map(|name| def.stages.iter().position(|s| &s.name == name).unwrap())
                    .collect();
                prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
