//! 运行时：GSPN 的可激发集（含瞬时迁移优先级）、发生语义与标识分类。
//!
//! 对任意标识 `M ∈ ℕ^{|P|}`：
//!
//! * 迁移 `t` **结构可激发** 当且仅当 `∀p: M[p] ≥ Pre[p, t]`，且对所有抑制弧
//!   `(p, t)` 有 `M[p] < Inh[p, t]`；
//! * 若存在结构可激发的瞬时迁移，则 `M` 为 **消失标识**（vanishing），此时仅瞬时迁移可激发；
//!   否则 `M` 为 **实标识**（tangible），可激发的均为计时迁移；
//! * 发射后 `M' = M - Pre[:, t] + Post[:, t]`，超出库所容量视为错误。
use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Marking, Place, Transition, TransitionKind, Weight};

#[derive(Debug, Error)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("capacity exceeded at place {place:?}: {after} > {capacity}")]
    Capacity {
        place: PlaceId,
        after: Weight,
        capacity: Weight,
    },
    #[error("marking has {actual} places but the net has {expected}")]
    Shape { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
#[error("transition {transition:?} ({name}) has invalid rate {rate}")]
pub struct InvalidRate {
    pub transition: TransitionId,
    pub name: String,
    pub rate: f64,
}

/// 连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub isolated_places: Vec<(PlaceId, String)>,
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Net {
    pub places: IndexVec<PlaceId, Place>,
    pub transitions: IndexVec<TransitionId, Transition>,
    pub pre: Incidence<Weight>,
    pub post: Incidence<Weight>,
    /// 抑制弧阈值，0 表示无抑制弧。
    pub inhibitor: Incidence<Weight>,
}

impl Net {
    pub fn empty() -> Self {
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            pre: Incidence::new(0, 0, 0),
            post: Incidence::new(0, 0, 0),
            inhibitor: Incidence::new(0, 0, 0),
        }
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let place_id = self.places.push(place);
        self.pre.push_place_with_default(0);
        self.post.push_place_with_default(0);
        self.inhibitor.push_place_with_default(0);
        place_id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let transition_id = self.transitions.push(transition);
        self.pre.push_transition_with_default(0);
        self.post.push_transition_with_default(0);
        self.inhibitor.push_transition_with_default(0);
        transition_id
    }

    pub fn set_input_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.pre.set(place, transition, weight);
    }

    pub fn set_output_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.post.set(place, transition, weight);
    }

    /// 抑制弧: `M[place] >= weight` 时 `transition` 不可激发
    pub fn set_inhibitor_weight(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        weight: Weight,
    ) {
        self.inhibitor.set(place, transition, weight);
    }

    /// 输入弧: place -> transition
    pub fn add_input_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        *self.pre.get_mut(place, transition) += weight;
    }

    /// 输出弧: transition -> place
    pub fn add_output_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        *self.post.get_mut(place, transition) += weight;
    }

    pub fn get_place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn get_transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn initial_marking(&self) -> Marking {
        Marking(self.places.iter().map(|p| p.tokens).collect())
    }

    /// Every rate and weight must be finite and non-negative.
    pub fn validate(&self) -> Result<(), InvalidRate> {
        for (transition, t) in self.transitions.iter_enumerated() {
            if !t.rate.is_finite() || t.rate < 0.0 {
                return Err(InvalidRate {
                    transition,
                    name: t.name.clone(),
                    rate: t.rate,
                });
            }
        }
        Ok(())
    }

    /// 检测孤立节点与永远无法激发的迁移
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();

        for (place_id, place) in self.places.iter_enumerated() {
            let connected = self.transitions.indices().any(|t| {
                *self.pre.get(place_id, t) > 0
                    || *self.post.get(place_id, t) > 0
                    || *self.inhibitor.get(place_id, t) > 0
            });
            if !connected {
                report.isolated_places.push((place_id, place.name.clone()));
            }
        }

        for (trans_id, trans) in self.transitions.iter_enumerated() {
            let has_preset = self.pre.column(trans_id).any(|(_, w)| *w > 0);
            let has_postset = self.post.column(trans_id).any(|(_, w)| *w > 0);

            if !has_preset && !has_postset {
                report
                    .isolated_transitions
                    .push((trans_id, trans.name.clone()));
            } else if !has_preset && trans.is_immediate() {
                report.warnings.push(format!(
                    "immediate transition '{}' (id={}) has no input place and is always enabled",
                    trans.name,
                    trans_id.index()
                ));
            }
        }

        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();

        if !report.has_issues() {
            log::info!(
                "net connectivity check passed: {} places, {} transitions",
                self.places_len(),
                self.transitions_len()
            );
            return;
        }

        for (id, name) in &report.isolated_places {
            log::warn!("isolated place [{}] {}", id.index(), name);
        }
        for (id, name) in &report.isolated_transitions {
            log::warn!("isolated transition [{}] {}", id.index(), name);
        }
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }
    }

    /// 按插入顺序返回可激发迁移；若有瞬时迁移可激发，则只返回瞬时迁移。
    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        let structural = self
            .transitions
            .indices()
            .filter(|&t| self.is_transition_enabled(t, marking))
            .collect::<Vec<_>>();

        if structural
            .iter()
            .any(|&t| self.transitions[t].is_immediate())
        {
            structural
                .into_iter()
                .filter(|&t| self.transitions[t].is_immediate())
                .collect()
        } else {
            structural
        }
    }

    pub fn is_vanishing(&self, marking: &Marking) -> bool {
        self.transitions
            .iter_enumerated()
            .any(|(t, transition)| {
                transition.kind == TransitionKind::Immediate
                    && self.is_transition_enabled(t, marking)
            })
    }

    pub fn fire_transition(
        &self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Marking, FireError> {
        if marking.len() != self.places_len() {
            return Err(FireError::Shape {
                expected: self.places_len(),
                actual: marking.len(),
            });
        }
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if !self.is_transition_enabled(transition, marking) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();

        for (place, weight) in self.pre.column(transition) {
            // enabled => M[p] >= Pre[p, t]
            *next.tokens_mut(place) -= *weight;
        }

        for (place, weight) in self.post.column(transition) {
            if *weight == 0 {
                continue;
            }
            let tokens = next.tokens_mut(place);
            let capacity = self.places[place].capacity;
            let after = tokens.saturating_add(*weight);
            if after > capacity {
                return Err(FireError::Capacity {
                    place,
                    after,
                    capacity,
                });
            }
            *tokens = after;
        }

        Ok(next)
    }

    fn is_transition_enabled(&self, transition: TransitionId, marking: &Marking) -> bool {
        if transition.index() >= self.transitions_len() || marking.len() != self.places_len() {
            return false;
        }
        self.places.indices().all(|place| {
            let tokens = marking.tokens(place);
            let threshold = *self.inhibitor.get(place, transition);
            tokens >= *self.pre.get(place, transition) && (threshold == 0 || tokens < threshold)
        }) && self.all_outputs_have_capacity(transition, marking)
    }

    /// 输出库所已满时迁移不可激发：按净变化 `M - Pre + Post` 检查容量。
    fn all_outputs_have_capacity(&self, transition: TransitionId, marking: &Marking) -> bool {
        self.post.column(transition).all(|(place, weight)| {
            let after = marking
                .tokens(place)
                .saturating_sub(*self.pre.get(place, transition))
                .saturating_add(*weight);
            *weight == 0 || after <= self.places[place].capacity
        })
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_place_and_transition_updates_incidence() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1));
        let t = net.add_transition(Transition::timed("t", 1.0));

        net.set_input_weight(p, t, 1);
        net.set_output_weight(p, t, 1);

        assert_eq!(net.places_len(), 1);
        assert_eq!(net.transitions_len(), 1);
        assert_eq!(*net.pre.get(p, t), 1);
        assert_eq!(*net.post.get(p, t), 1);
        assert_eq!(*net.inhibitor.get(p, t), 0);
    }

    #[test]
    fn immediate_transitions_take_priority() {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::new("p0", 1));
        let p1 = net.add_place(Place::new("p1", 0));
        let timed = net.add_transition(Transition::timed("timed", 2.0));
        let immediate = net.add_transition(Transition::immediate("imm", 1.0));
        net.set_input_weight(p0, timed, 1);
        net.set_output_weight(p1, timed, 1);
        net.set_input_weight(p0, immediate, 1);
        net.set_output_weight(p1, immediate, 1);

        let marking = net.initial_marking();
        assert!(net.is_vanishing(&marking));
        assert_eq!(net.enabled_transitions(&marking), vec![immediate]);

        let next = net.fire_transition(&marking, immediate).unwrap();
        assert_eq!(next.tokens(p0), 0);
        assert_eq!(next.tokens(p1), 1);
        assert!(!net.is_vanishing(&next));
        assert!(net.enabled_transitions(&next).is_empty());
    }

    #[test]
    fn inhibitor_arc_disables_transition() {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::new("p0", 1));
        let guard = net.add_place(Place::new("guard", 2));
        let t = net.add_transition(Transition::timed("t", 1.0));
        net.set_input_weight(p0, t, 1);
        net.set_inhibitor_weight(guard, t, 2);

        let marking = net.initial_marking();
        assert!(net.enabled_transitions(&marking).is_empty());
        assert!(matches!(
            net.fire_transition(&marking, t),
            Err(FireError::NotEnabled(_))
        ));

        net.places[guard].tokens = 1;
        assert_eq!(net.enabled_transitions(&net.initial_marking()), vec![t]);
    }

    #[test]
    fn full_output_place_disables_transition() {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::new("p0", 1));
        let p1 = net.add_place(Place::new_with_tokens_and_capacity("p1", 1, 1));
        let t = net.add_transition(Transition::timed("t", 1.0));
        net.set_input_weight(p0, t, 1);
        net.set_output_weight(p1, t, 1);

        let marking = net.initial_marking();
        assert!(net.enabled_transitions(&marking).is_empty());
        let err = net.fire_transition(&marking, t).unwrap_err();
        assert!(matches!(err, FireError::NotEnabled(_)));

        net.places[p1].tokens = 0;
        let next = net.fire_transition(&net.initial_marking(), t).unwrap();
        assert_eq!(next.tokens(p1), 1);
    }

    #[test]
    fn self_loop_on_full_place_stays_enabled() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new_with_tokens_and_capacity("p", 1, 1));
        let t = net.add_transition(Transition::timed("t", 1.0));
        net.set_input_weight(p, t, 1);
        net.set_output_weight(p, t, 1);

        assert_eq!(net.enabled_transitions(&net.initial_marking()), vec![t]);
    }

    #[test]
    fn negative_rate_fails_validation() {
        let mut net = Net::empty();
        net.add_transition(Transition::timed("bad", -1.0));
        assert!(net.validate().is_err());
    }

    #[test]
    fn diagnostics_flag_isolated_nodes() {
        let mut net = Net::empty();
        net.add_place(Place::new("lonely", 0));
        net.add_transition(Transition::timed("idle", 1.0));

        let report = net.diagnose_connectivity();
        assert_eq!(report.isolated_places.len(), 1);
        assert_eq!(report.isolated_transitions.len(), 1);
        assert!(report.has_issues());
    }
}
