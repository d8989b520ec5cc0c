//! 状态空间生成：发现、展开、消失标识处理以及逐状态输出记录。
//!
//! 每个标识在首次发现时即分配编号（先于展开），因此记录中的后继编号总能解析。
//! 并行模式按层展开前沿，编号分配经由 [`StateRegistry`] 的单一临界区完成。
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, error, info};
use rayon::prelude::*;
use thiserror::Error;

use crate::analysis::explorer_utils::{ExplorerUtilities, ModelQueryError};
use crate::analysis::registry::StateRegistry;
use crate::analysis::state::{ClassifiedState, Record};
use crate::analysis::vanishing::{VanishingExplorer, VanishingPolicy};
use crate::net::{Marking, StateId};
use crate::state_io::processor::StateProcessor;

#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error("timeless trap: vanishing marking {marking} never escapes to a tangible marking")]
    TimelessTrap { marking: Marking },
    #[error("model query failed: {0}")]
    ModelQuery(#[from] ModelQueryError),
    #[error("failed to persist state space: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// In-flight work stopped because another worker already failed.
    #[error("exploration aborted")]
    Aborted,
}

/// Shared stop signal for in-flight expansion and elimination work.
#[derive(Debug, Default)]
pub struct AbortFlag(AtomicBool);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), ExplorationError> {
        if self.is_raised() {
            Err(ExplorationError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationMode {
    #[default]
    Sequential,
    /// Frontier markings are expanded on `workers` rayon threads.
    Parallel { workers: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExplorationStats {
    pub state_count: usize,
    pub edge_count: usize,
    /// States whose record has no successor.
    pub deadlock_count: usize,
}

impl ExplorationStats {
    fn account(&mut self, record: &Record) {
        self.state_count += 1;
        self.edge_count += record.successors.len();
        if record.successors.is_empty() {
            self.deadlock_count += 1;
        }
    }
}

pub struct StateSpaceExplorer<'u, U> {
    utils: &'u U,
    vanishing: Box<dyn VanishingExplorer + Sync + 'u>,
    mode: ExplorationMode,
}

impl<'u, U> StateSpaceExplorer<'u, U>
where
    U: ExplorerUtilities + Sync,
{
    pub fn new(utils: &'u U, policy: VanishingPolicy) -> Self {
        Self::with_vanishing_explorer(utils, policy.explorer(utils))
    }

    pub fn with_vanishing_explorer(
        utils: &'u U,
        vanishing: Box<dyn VanishingExplorer + Sync + 'u>,
    ) -> Self {
        Self {
            utils,
            vanishing,
            mode: ExplorationMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: ExplorationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Generates every state reachable from `initial` and hands one record per state to
    /// `processor`. Terminates only if the reachable marking set is finite.
    ///
    /// Any error aborts the whole run; whatever `processor` received before the error is
    /// not a valid state space.
    pub fn generate<P>(
        &self,
        initial: &ClassifiedState,
        processor: &mut P,
    ) -> Result<ExplorationStats, ExplorationError>
    where
        P: StateProcessor + Send,
    {
        let registry = StateRegistry::new();
        let result = match self.mode {
            ExplorationMode::Sequential => self.generate_sequential(&registry, initial, processor),
            ExplorationMode::Parallel { workers } => {
                self.generate_parallel(&registry, initial, processor, workers)
            }
        };

        match &result {
            Ok(stats) => info!(
                "state space generated: {} states, {} edges, {} deadlocks",
                stats.state_count, stats.edge_count, stats.deadlock_count
            ),
            Err(err) => error!(
                "state space generation aborted after {} discovered states: {}",
                registry.len(),
                err
            ),
        }
        result
    }

    fn generate_sequential<P>(
        &self,
        registry: &StateRegistry,
        initial: &ClassifiedState,
        processor: &mut P,
    ) -> Result<ExplorationStats, ExplorationError>
    where
        P: StateProcessor,
    {
        let mut stats = ExplorationStats::default();
        let abort = AbortFlag::new();
        let mut frontier: VecDeque<(StateId, ClassifiedState)> =
            self.seed(registry, initial, &abort)?.into();

        while let Some((id, state)) = frontier.pop_front() {
            let (record, discovered) = self.expand(registry, id, &state, &abort)?;
            processor.process(id, &state, &record)?;
            stats.account(&record);
            frontier.extend(discovered);
        }

        Ok(stats)
    }

    fn generate_parallel<P>(
        &self,
        registry: &StateRegistry,
        initial: &ClassifiedState,
        processor: &mut P,
        workers: usize,
    ) -> Result<ExplorationStats, ExplorationError>
    where
        P: StateProcessor + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("pn-explore-{idx}"))
            .build()?;

        let sink = Mutex::new((processor, ExplorationStats::default()));
        let abort = AbortFlag::new();
        let failure: Mutex<Option<ExplorationError>> = Mutex::new(None);
        // the first real error wins; `Aborted` only follows a recorded failure
        let fail = |err: ExplorationError| {
            failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(err);
            abort.raise();
        };
        let mut frontier = self.seed(registry, initial, &abort)?;

        pool.install(|| {
            while !frontier.is_empty() {
                debug!("expanding frontier level of {} states", frontier.len());
                let next = frontier
                    .par_iter()
                    .map(|(id, state)| {
                        let outcome = abort
                            .check()
                            .and_then(|()| self.expand(registry, *id, state, &abort))
                            .and_then(|(record, discovered)| {
                                let mut guard =
                                    sink.lock().unwrap_or_else(PoisonError::into_inner);
                                abort.check()?;
                                let (processor, stats) = &mut *guard;
                                if let Err(err) = processor.process(*id, state, &record) {
                                    // raised while the sink is held: nothing is processed after
                                    fail(err.into());
                                    return Err(ExplorationError::Aborted);
                                }
                                stats.account(&record);
                                Ok(discovered)
                            });
                        match outcome {
                            Ok(discovered) => Some(discovered),
                            Err(err) => {
                                fail(err);
                                None
                            }
                        }
                    })
                    .collect::<Option<Vec<_>>>();

                match next {
                    Some(levels) => frontier = levels.into_iter().flatten().collect(),
                    None => break,
                }
            }
        });

        if let Some(err) = failure
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(err);
        }
        let (_, stats) = sink.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(stats)
    }

    /// States the exploration starts from. A vanishing initial marking is resolved
    /// through the vanishing explorer first.
    fn seed(
        &self,
        registry: &StateRegistry,
        initial: &ClassifiedState,
        abort: &AbortFlag,
    ) -> Result<Vec<(StateId, ClassifiedState)>, ExplorationError> {
        let roots = if initial.is_vanishing() {
            self.vanishing.explore(initial, 1.0, abort)?
        } else {
            vec![(initial.clone(), 1.0)]
        };

        let mut seeds = Vec::with_capacity(roots.len());
        for (state, weight) in roots {
            let discovery = registry.discover(&state);
            debug!("initial state {} = {} (p = {})", discovery.id(), state, weight);
            if discovery.is_new() {
                seeds.push((discovery.id(), state));
            }
        }
        Ok(seeds)
    }

    /// Builds the record of `state` and returns the successors seen for the first time.
    fn expand(
        &self,
        registry: &StateRegistry,
        id: StateId,
        state: &ClassifiedState,
        abort: &AbortFlag,
    ) -> Result<(Record, Vec<(StateId, ClassifiedState)>), ExplorationError> {
        let mut record = Record::new(id);
        let mut discovered = Vec::new();

        for successor in self.utils.successors(state)? {
            abort.check()?;
            let rate = self.utils.rate(state, successor.transition)?;
            let targets = if successor.state.is_vanishing() {
                self.vanishing.explore(&successor.state, rate, abort)?
            } else {
                vec![(successor.state, rate)]
            };

            for (target, rate) in targets {
                let discovery = registry.discover(&target);
                record.add(discovery.id(), rate);
                if discovery.is_new() {
                    discovered.push((discovery.id(), target));
                }
            }
        }

        debug!(
            "expanded {} {} -> {} successors, {} new",
            id,
            state,
            record.successors.len(),
            discovered.len()
        );
        Ok((record, discovered))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::analysis::explorer_utils::{CachingExplorerUtilities, NetExplorerUtilities};
    use crate::net::{Net, Place, Transition};
    use crate::state_io::processor::CollectingProcessor;

    const EPS: f64 = 1e-12;

    fn run(
        net: &Net,
        policy: VanishingPolicy,
        mode: ExplorationMode,
    ) -> Result<CollectingProcessor, ExplorationError> {
        let utils = NetExplorerUtilities::new(net);
        let explorer = StateSpaceExplorer::new(&utils, policy).with_mode(mode);
        let mut processor = CollectingProcessor::default();
        explorer.generate(&utils.current_state(), &mut processor)?;
        Ok(processor)
    }

    fn id_of(collected: &CollectingProcessor, tokens: Vec<u64>) -> StateId {
        let marking = Marking::from(tokens);
        collected
            .states
            .iter()
            .find(|(_, state)| state.marking == marking)
            .map(|(id, _)| *id)
            .unwrap()
    }

    /// A --t(2.0)--> B
    fn scenario_a() -> Net {
        let mut net = Net::empty();
        let a = net.add_place(Place::new("A", 1));
        let b = net.add_place(Place::new("B", 0));
        let t = net.add_transition(Transition::timed("t", 2.0));
        net.set_input_weight(a, t, 1);
        net.set_output_weight(b, t, 1);
        net
    }

    /// A --timed(3.0)--> V, V --imm(1)--> B, V --imm(2)--> C
    fn scenario_b() -> Net {
        let mut net = Net::empty();
        let a = net.add_place(Place::new("A", 1));
        let v = net.add_place(Place::new("V", 0));
        let b = net.add_place(Place::new("B", 0));
        let c = net.add_place(Place::new("C", 0));
        let enter = net.add_transition(Transition::timed("enter", 3.0));
        let to_b = net.add_transition(Transition::immediate("to_b", 1.0));
        let to_c = net.add_transition(Transition::immediate("to_c", 2.0));
        net.set_input_weight(a, enter, 1);
        net.set_output_weight(v, enter, 1);
        net.set_input_weight(v, to_b, 1);
        net.set_output_weight(b, to_b, 1);
        net.set_input_weight(v, to_c, 1);
        net.set_output_weight(c, to_c, 1);
        net
    }

    /// Two independent two-state cycles: 4 reachable markings.
    fn product() -> Net {
        let mut net = Net::empty();
        for (name, rate) in [("x", 1.0), ("y", 2.0)] {
            let on = net.add_place(Place::new(format!("{name}_on"), 1));
            let off = net.add_place(Place::new(format!("{name}_off"), 0));
            let down = net.add_transition(Transition::timed(format!("{name}_down"), rate));
            let up = net.add_transition(Transition::timed(format!("{name}_up"), rate * 10.0));
            net.set_input_weight(on, down, 1);
            net.set_output_weight(off, down, 1);
            net.set_input_weight(off, up, 1);
            net.set_output_weight(on, up, 1);
        }
        net
    }

    #[test]
    fn scenario_a_single_timed_edge() {
        let collected = run(
            &scenario_a(),
            VanishingPolicy::Eliminate,
            ExplorationMode::Sequential,
        )
        .unwrap();
        let a = id_of(&collected, vec![1, 0]);
        let b = id_of(&collected, vec![0, 1]);

        assert_eq!(collected.states.len(), 2);
        assert_eq!(collected.records.len(), 2);
        assert_eq!(collected.records[&a].successors.len(), 1);
        assert_eq!(collected.records[&a].rate_to(b), Some(2.0));
        assert!(collected.records[&b].successors.is_empty());
    }

    #[test]
    fn scenario_b_vanishing_state_is_eliminated() {
        let collected = run(
            &scenario_b(),
            VanishingPolicy::Eliminate,
            ExplorationMode::Sequential,
        )
        .unwrap();

        assert_eq!(collected.states.len(), 3);
        assert!(collected.states.values().all(ClassifiedState::is_tangible));
        assert!(
            collected
                .states
                .values()
                .all(|s| s.marking != Marking::from(vec![0, 1, 0, 0]))
        );

        let a = id_of(&collected, vec![1, 0, 0, 0]);
        let b = id_of(&collected, vec![0, 0, 1, 0]);
        let c = id_of(&collected, vec![0, 0, 0, 1]);
        let record = &collected.records[&a];
        assert!((record.rate_to(b).unwrap() - 1.0).abs() < EPS);
        assert!((record.rate_to(c).unwrap() - 2.0).abs() < EPS);
    }

    #[test]
    fn scenario_b_keep_policy_retains_raw_weights() {
        let collected = run(
            &scenario_b(),
            VanishingPolicy::Keep,
            ExplorationMode::Sequential,
        )
        .unwrap();

        assert_eq!(collected.states.len(), 4);
        let a = id_of(&collected, vec![1, 0, 0, 0]);
        let v = id_of(&collected, vec![0, 1, 0, 0]);
        let b = id_of(&collected, vec![0, 0, 1, 0]);
        let c = id_of(&collected, vec![0, 0, 0, 1]);

        assert!(collected.states[&v].is_vanishing());
        assert_eq!(collected.records[&a].rate_to(v), Some(3.0));
        assert_eq!(collected.records[&v].rate_to(b), Some(1.0));
        assert_eq!(collected.records[&v].rate_to(c), Some(2.0));
    }

    #[test]
    fn every_state_is_visited_once() {
        let collected = run(
            &product(),
            VanishingPolicy::Eliminate,
            ExplorationMode::Sequential,
        )
        .unwrap();

        assert_eq!(collected.states.len(), 4);
        assert_eq!(collected.records.len(), 4);
        assert_eq!(collected.duplicate_deliveries, 0);
        for record in collected.records.values() {
            assert_eq!(record.successors.len(), 2);
            for successor in record.successors.keys() {
                assert!(collected.states.contains_key(successor));
            }
        }
    }

    #[test]
    fn parallel_mode_matches_sequential_graph() {
        let net = product();
        let sequential = run(&net, VanishingPolicy::Eliminate, ExplorationMode::Sequential).unwrap();
        let parallel = run(
            &net,
            VanishingPolicy::Eliminate,
            ExplorationMode::Parallel { workers: 4 },
        )
        .unwrap();

        // ids may differ between modes; compare by marking
        let by_marking = |collected: &CollectingProcessor| {
            collected
                .records
                .values()
                .map(|record| {
                    let from = collected.states[&record.state].marking.clone();
                    let mut edges = record
                        .successors
                        .iter()
                        .map(|(to, rate)| (collected.states[to].marking.to_string(), *rate))
                        .collect::<Vec<_>>();
                    edges.sort_by(|l, r| l.0.cmp(&r.0));
                    (from.to_string(), edges)
                })
                .collect::<HashMap<_, _>>()
        };
        assert_eq!(by_marking(&sequential), by_marking(&parallel));
        assert_eq!(parallel.duplicate_deliveries, 0);
    }

    #[test]
    fn timeless_trap_aborts_generation() {
        // A --timed--> V, V --imm--> V
        let mut net = Net::empty();
        let a = net.add_place(Place::new("A", 1));
        let v = net.add_place(Place::new("V", 0));
        let enter = net.add_transition(Transition::timed("enter", 1.0));
        let spin = net.add_transition(Transition::immediate("spin", 1.0));
        net.set_input_weight(a, enter, 1);
        net.set_output_weight(v, enter, 1);
        net.set_input_weight(v, spin, 1);
        net.set_output_weight(v, spin, 1);

        for mode in [
            ExplorationMode::Sequential,
            ExplorationMode::Parallel { workers: 2 },
        ] {
            let err = run(&net, VanishingPolicy::Eliminate, mode).unwrap_err();
            assert!(
                matches!(err, ExplorationError::TimelessTrap { ref marking } if *marking == Marking::from(vec![0, 1])),
                "unexpected error {err}"
            );
        }
    }

    #[test]
    fn vanishing_initial_marking_seeds_its_escape_set() {
        // V(initial) --imm(1)--> B, V --imm(3)--> C
        let mut net = Net::empty();
        let v = net.add_place(Place::new("V", 1));
        let b = net.add_place(Place::new("B", 0));
        let c = net.add_place(Place::new("C", 0));
        for (target, weight) in [(b, 1.0), (c, 3.0)] {
            let t = net.add_transition(Transition::immediate("split", weight));
            net.set_input_weight(v, t, 1);
            net.set_output_weight(target, t, 1);
        }

        let collected = run(&net, VanishingPolicy::Eliminate, ExplorationMode::Sequential).unwrap();
        assert_eq!(collected.states.len(), 2);
        assert!(collected.states.values().all(ClassifiedState::is_tangible));

        let kept = run(&net, VanishingPolicy::Keep, ExplorationMode::Sequential).unwrap();
        assert_eq!(kept.states.len(), 3);
        assert_eq!(kept.states[&StateId::new(0)].marking, Marking::from(vec![1, 0, 0]));
    }

    #[test]
    fn caching_does_not_change_the_graph() {
        let net = scenario_b();
        let plain = run(&net, VanishingPolicy::Eliminate, ExplorationMode::Sequential).unwrap();

        let utils = CachingExplorerUtilities::new(NetExplorerUtilities::new(&net));
        let mut cached = CollectingProcessor::default();
        let stats = StateSpaceExplorer::new(&utils, VanishingPolicy::Eliminate)
            .generate(&utils.current_state(), &mut cached)
            .unwrap();

        assert_eq!(plain.states, cached.states);
        assert_eq!(plain.records, cached.records);
        assert_eq!(stats.state_count, 3);
        assert_eq!(stats.deadlock_count, 2);
        assert!(utils.cached_len() >= 2);
    }

    /// Fails on the `fail_at`-th delivery and counts every delivery.
    struct FailingProcessor {
        fail_at: usize,
        calls: usize,
    }

    impl StateProcessor for FailingProcessor {
        fn process(
            &mut self,
            _id: StateId,
            _state: &ClassifiedState,
            _record: &Record,
        ) -> std::io::Result<()> {
            self.calls += 1;
            if self.calls == self.fail_at {
                return Err(std::io::Error::other("disk full"));
            }
            Ok(())
        }
    }

    /// `cycles` independent two-state cycles: 2^cycles reachable markings.
    fn wide_product(cycles: usize) -> Net {
        let mut net = Net::empty();
        for i in 0..cycles {
            let on = net.add_place(Place::new(format!("on{i}"), 1));
            let off = net.add_place(Place::new(format!("off{i}"), 0));
            let down = net.add_transition(Transition::timed(format!("down{i}"), 1.0));
            let up = net.add_transition(Transition::timed(format!("up{i}"), 1.0));
            net.set_input_weight(on, down, 1);
            net.set_output_weight(off, down, 1);
            net.set_input_weight(off, up, 1);
            net.set_output_weight(on, up, 1);
        }
        net
    }

    #[test]
    fn nothing_is_processed_after_a_failure() {
        let net = wide_product(5);
        let utils = NetExplorerUtilities::new(&net);
        for mode in [
            ExplorationMode::Sequential,
            ExplorationMode::Parallel { workers: 4 },
        ] {
            let mut processor = FailingProcessor {
                fail_at: 3,
                calls: 0,
            };
            let err = StateSpaceExplorer::new(&utils, VanishingPolicy::Eliminate)
                .with_mode(mode)
                .generate(&utils.current_state(), &mut processor)
                .unwrap_err();
            assert!(matches!(err, ExplorationError::Io(_)), "unexpected error {err}");
            assert_eq!(processor.calls, 3, "{mode:?}");
        }
    }

    #[test]
    fn full_output_place_disables_the_transition() {
        // src holds 2 tokens, buf has capacity 1
        let mut net = Net::empty();
        let src = net.add_place(Place::new("src", 2));
        let buf = net.add_place(Place::new_with_tokens_and_capacity("buf", 0, 1));
        let put = net.add_transition(Transition::timed("put", 1.0));
        net.set_input_weight(src, put, 1);
        net.set_output_weight(buf, put, 1);

        for mode in [
            ExplorationMode::Sequential,
            ExplorationMode::Parallel { workers: 2 },
        ] {
            let collected = run(&net, VanishingPolicy::Eliminate, mode).unwrap();
            assert_eq!(collected.states.len(), 2);
            let full = id_of(&collected, vec![1, 1]);
            assert!(collected.records[&full].successors.is_empty());
        }
    }
}
