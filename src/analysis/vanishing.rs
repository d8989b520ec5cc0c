//! 消失标识处理策略：保留为图节点，或沿瞬时迁移链即时消去为实标识之间的概率加权边。
//!
//! 消去时先收集从 `v` 出发经瞬时迁移可达的全部消失标识，每个消失标识按
//! `w(t) / Σ_{t' ∈ En(v)} w(t')` 分配概率质量。随后按强连通分量逆拓扑序求吸收概率：
//! 分量内解 `x = P_vv·x + P_vt`。能逃逸到实标识的环照常消去；没有任何出口的闭合
//! 消失分量即 timeless trap，整个运行失败。
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::analysis::explorer::{AbortFlag, ExplorationError};
use crate::analysis::explorer_utils::{ExplorerUtilities, ModelQueryError};
use crate::analysis::state::ClassifiedState;
use crate::net::Marking;

/// Pivots below this magnitude mean the component cannot be left.
const SINGULAR_PIVOT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VanishingPolicy {
    /// Vanishing markings are eliminated into probability-weighted tangible edges.
    #[default]
    Eliminate,
    /// Vanishing markings stay in the graph with their raw immediate weights.
    Keep,
}

impl VanishingPolicy {
    pub fn explorer<'u, U>(self, utils: &'u U) -> Box<dyn VanishingExplorer + Sync + 'u>
    where
        U: ExplorerUtilities + Sync,
    {
        match self {
            VanishingPolicy::Eliminate => Box::new(OnTheFlyVanishingExplorer::new(utils)),
            VanishingPolicy::Keep => Box::new(SimpleVanishingExplorer),
        }
    }
}

/// Tangible markings reached from a vanishing marking, with the probability of reaching each.
pub type EscapeDistribution = IndexMap<ClassifiedState, f64>;

pub trait VanishingExplorer {
    /// Resolves a vanishing `state`, entered with `rate`, into the states that become graph
    /// nodes along with the rate credited to each. Gives up with
    /// [`ExplorationError::Aborted`] once `abort` is raised.
    fn explore(
        &self,
        state: &ClassifiedState,
        rate: f64,
        abort: &AbortFlag,
    ) -> Result<Vec<(ClassifiedState, f64)>, ExplorationError>;
}

/// Keeps vanishing markings as nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleVanishingExplorer;

impl VanishingExplorer for SimpleVanishingExplorer {
    fn explore(
        &self,
        state: &ClassifiedState,
        rate: f64,
        _abort: &AbortFlag,
    ) -> Result<Vec<(ClassifiedState, f64)>, ExplorationError> {
        Ok(vec![(state.clone(), rate)])
    }
}

pub struct OnTheFlyVanishingExplorer<'u, U> {
    utils: &'u U,
}

impl<'u, U> OnTheFlyVanishingExplorer<'u, U>
where
    U: ExplorerUtilities,
{
    pub fn new(utils: &'u U) -> Self {
        Self { utils }
    }
}

impl<U> VanishingExplorer for OnTheFlyVanishingExplorer<'_, U>
where
    U: ExplorerUtilities,
{
    fn explore(
        &self,
        state: &ClassifiedState,
        rate: f64,
        abort: &AbortFlag,
    ) -> Result<Vec<(ClassifiedState, f64)>, ExplorationError> {
        let distribution = eliminate(self.utils, state, abort)?;
        Ok(distribution
            .into_iter()
            .map(|(tangible, probability)| (tangible, rate * probability))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Tangible(usize),
    Vanishing(NodeIndex),
}

struct VanishingNode {
    state: ClassifiedState,
    /// (target, branch probability) in transition order
    branches: Vec<(Target, f64)>,
}

/// Vanishing markings reachable from one root through immediate transitions.
struct VanishingClosure {
    graph: DiGraph<VanishingNode, ()>,
    tangibles: Vec<ClassifiedState>,
}

impl VanishingClosure {
    fn collect<U>(
        utils: &U,
        root: &ClassifiedState,
        abort: &AbortFlag,
    ) -> Result<(Self, NodeIndex), ExplorationError>
    where
        U: ExplorerUtilities + ?Sized,
    {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<Marking, NodeIndex> = HashMap::new();
        let mut tangibles: IndexSet<ClassifiedState> = IndexSet::new();

        let root_node = graph.add_node(VanishingNode {
            state: root.clone(),
            branches: Vec::new(),
        });
        nodes.insert(root.marking.clone(), root_node);
        let mut pending = vec![root_node];

        while let Some(node) = pending.pop() {
            abort.check()?;
            let successors = branch_probabilities(utils, &graph[node].state)?;
            let mut branches = Vec::with_capacity(successors.len());
            for (successor, probability) in successors {
                if probability == 0.0 {
                    continue;
                }
                if successor.is_tangible() {
                    let (index, _) = tangibles.insert_full(successor);
                    branches.push((Target::Tangible(index), probability));
                    continue;
                }
                let target = match nodes.entry(successor.marking.clone()) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        let target = graph.add_node(VanishingNode {
                            state: successor,
                            branches: Vec::new(),
                        });
                        pending.push(target);
                        *entry.insert(target)
                    }
                };
                graph.add_edge(node, target, ());
                branches.push((Target::Vanishing(target), probability));
            }
            graph[node].branches = branches;
        }

        let closure = VanishingClosure {
            graph,
            tangibles: tangibles.into_iter().collect(),
        };
        Ok((closure, root_node))
    }

    /// Absorption probabilities of every node, solved one strongly connected component at a
    /// time with successors first.
    fn solve(&self, abort: &AbortFlag) -> Result<Vec<Vec<f64>>, ExplorationError> {
        let width = self.tangibles.len();
        let mut solved: Vec<Option<Vec<f64>>> = vec![None; self.graph.node_count()];

        // tarjan_scc yields components in reverse topological order
        for component in algo::tarjan_scc(&self.graph) {
            abort.check()?;
            let local: HashMap<NodeIndex, usize> = component
                .iter()
                .enumerate()
                .map(|(i, node)| (*node, i))
                .collect();

            let size = component.len();
            let mut matrix = vec![vec![0.0; size]; size];
            let mut rhs = vec![vec![0.0; width]; size];
            let mut has_exit = false;

            for (row, node) in component.iter().enumerate() {
                matrix[row][row] += 1.0;
                for (target, probability) in &self.graph[*node].branches {
                    match target {
                        Target::Tangible(column) => {
                            rhs[row][*column] += probability;
                            has_exit = true;
                        }
                        Target::Vanishing(next) => match local.get(next) {
                            Some(col) => matrix[row][*col] -= probability,
                            None => {
                                let Some(known) = &solved[next.index()] else {
                                    unreachable!("component solved before its successors");
                                };
                                for (column, q) in known.iter().enumerate() {
                                    rhs[row][column] += probability * q;
                                }
                                has_exit = true;
                            }
                        },
                    }
                }
            }

            let solution = if has_exit {
                solve_linear(matrix, rhs)
            } else {
                None
            };
            let Some(solution) = solution else {
                let trapped = component.iter().min().copied().unwrap_or_default();
                let marking = self.graph[trapped].state.marking.clone();
                debug!(
                    "timeless trap: {} vanishing markings around {} never reach a tangible marking",
                    size, marking
                );
                return Err(ExplorationError::TimelessTrap { marking });
            };

            for (node, row) in component.iter().zip(solution) {
                solved[node.index()] = Some(row);
            }
        }

        Ok(solved.into_iter().map(Option::unwrap_or_default).collect())
    }
}

/// Computes the probability of escaping from vanishing `state` into each tangible marking.
///
/// Pure with respect to storage; only queries `utils`. A tangible `state` escapes to itself.
/// Cycles among vanishing markings are fine as long as their component can be left.
pub fn eliminate<U>(
    utils: &U,
    state: &ClassifiedState,
    abort: &AbortFlag,
) -> Result<EscapeDistribution, ExplorationError>
where
    U: ExplorerUtilities + ?Sized,
{
    if state.is_tangible() {
        return Ok(EscapeDistribution::from([(state.clone(), 1.0)]));
    }

    let (closure, root) = VanishingClosure::collect(utils, state, abort)?;
    let mut solved = closure.solve(abort)?;
    let row = std::mem::take(&mut solved[root.index()]);

    let distribution: EscapeDistribution = closure
        .tangibles
        .into_iter()
        .zip(row)
        .filter(|(_, probability)| *probability > 0.0)
        .collect();
    debug!(
        "eliminated {} through {} vanishing markings -> {} tangible markings",
        state.marking,
        solved.len(),
        distribution.len()
    );
    Ok(distribution)
}

/// Immediate successors of a vanishing state with their normalized probabilities.
fn branch_probabilities<U>(
    utils: &U,
    state: &ClassifiedState,
) -> Result<Vec<(ClassifiedState, f64)>, ExplorationError>
where
    U: ExplorerUtilities + ?Sized,
{
    let successors = utils.successors(state)?;
    let mut weights = Vec::with_capacity(successors.len());
    for successor in &successors {
        weights.push(utils.rate(state, successor.transition)?);
    }
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(ModelQueryError::ZeroWeight {
            marking: state.marking.clone(),
            total,
        }
        .into());
    }

    Ok(successors
        .into_iter()
        .zip(weights)
        .map(|(successor, weight)| (successor.state, weight / total))
        .collect())
}

/// Gauss-Jordan elimination with partial pivoting for `matrix · x = rhs`, one column of
/// `rhs` per tangible target. `None` if the matrix is singular.
fn solve_linear(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let size = matrix.len();
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&l, &r| matrix[l][col].abs().total_cmp(&matrix[r][col].abs()))?;
        if matrix[pivot][col].abs() < SINGULAR_PIVOT {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        let pivot_row = matrix[col].clone();
        let pivot_rhs = rhs[col].clone();
        for row in 0..size {
            if row == col {
                continue;
            }
            let factor = matrix[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (value, p) in matrix[row].iter_mut().zip(&pivot_row).skip(col) {
                *value -= factor * p;
            }
            for (value, p) in rhs[row].iter_mut().zip(&pivot_rhs) {
                *value -= factor * p;
            }
        }
    }

    for (row, values) in rhs.iter_mut().enumerate() {
        let diagonal = matrix[row][row];
        for value in values.iter_mut() {
            // round-off can leave tiny negatives
            *value = (*value / diagonal).max(0.0);
        }
    }
    Some(rhs)
}
