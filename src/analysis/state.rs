//! 已分类标识与每个状态的后继速率记录。
use std::fmt;

use indexmap::IndexMap;

use crate::net::{Marking, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// 无瞬时迁移可激发，具有随机逗留时间。
    Tangible,
    /// 至少一个瞬时迁移可激发，逗留时间为零。
    Vanishing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassifiedState {
    pub marking: Marking,
    pub kind: StateKind,
}

impl ClassifiedState {
    pub fn new(marking: Marking, kind: StateKind) -> Self {
        Self { marking, kind }
    }

    pub fn tangible(marking: Marking) -> Self {
        Self::new(marking, StateKind::Tangible)
    }

    pub fn vanishing(marking: Marking) -> Self {
        Self::new(marking, StateKind::Vanishing)
    }

    pub fn is_tangible(&self) -> bool {
        self.kind == StateKind::Tangible
    }

    pub fn is_vanishing(&self) -> bool {
        self.kind == StateKind::Vanishing
    }
}

impl fmt::Display for ClassifiedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            StateKind::Tangible => "T",
            StateKind::Vanishing => "V",
        };
        write!(f, "{tag}{}", self.marking)
    }
}

/// Outgoing rates of one state, aggregated per successor id.
///
/// Equality ignores successor order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub state: StateId,
    pub successors: IndexMap<StateId, f64>,
}

impl Record {
    pub fn new(state: StateId) -> Self {
        Self {
            state,
            successors: IndexMap::new(),
        }
    }

    pub fn with_successors(state: StateId, successors: IndexMap<StateId, f64>) -> Self {
        Self { state, successors }
    }

    /// Adds `rate` to the edge towards `successor`.
    pub fn add(&mut self, successor: StateId, rate: f64) {
        *self.successors.entry(successor).or_insert(0.0) += rate;
    }

    pub fn rate_to(&self, successor: StateId) -> Option<f64> {
        self.successors.get(&successor).copied()
    }

    pub fn total_rate(&self) -> f64 {
        self.successors.values().sum()
    }
}
