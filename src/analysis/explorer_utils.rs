//! 对宿主网模型的查询封装：初始状态、后继、迁移速率，以及按标识值缓存的变体。
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::analysis::state::{ClassifiedState, StateKind};
use crate::net::{FireError, InvalidRate, Marking, Net, TransitionId};

/// The host model failed a query or answered inconsistently.
#[derive(Debug, Error)]
pub enum ModelQueryError {
    #[error(transparent)]
    Fire(#[from] FireError),
    #[error(transparent)]
    InvalidRate(#[from] InvalidRate),
    #[error("unknown transition {0:?}")]
    UnknownTransition(TransitionId),
    #[error("transition {transition:?} is not enabled in marking {marking}")]
    NotEnabled {
        transition: TransitionId,
        marking: Marking,
    },
    #[error("immediate transitions leaving vanishing marking {marking} have total weight {total}")]
    ZeroWeight { marking: Marking, total: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
    pub transition: TransitionId,
    pub state: ClassifiedState,
}

/// Query capability over the model, fixed for the duration of a run.
pub trait ExplorerUtilities {
    /// The designated initial marking, classified.
    fn current_state(&self) -> ClassifiedState;

    fn classify(&self, marking: Marking) -> ClassifiedState;

    /// Every enabled transition with the marking it produces, in transition order.
    fn successors(&self, state: &ClassifiedState) -> Result<Vec<Successor>, ModelQueryError>;

    fn rate(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<f64, ModelQueryError>;

    fn weight_of(
        &self,
        state: &ClassifiedState,
        transitions: &[TransitionId],
    ) -> Result<f64, ModelQueryError> {
        transitions
            .iter()
            .map(|&transition| self.rate(state, transition))
            .sum()
    }
}

pub struct NetExplorerUtilities<'net> {
    net: &'net Net,
}

impl<'net> NetExplorerUtilities<'net> {
    pub fn new(net: &'net Net) -> Self {
        Self { net }
    }

    pub fn net(&self) -> &'net Net {
        self.net
    }
}

impl ExplorerUtilities for NetExplorerUtilities<'_> {
    fn current_state(&self) -> ClassifiedState {
        self.classify(self.net.initial_marking())
    }

    fn classify(&self, marking: Marking) -> ClassifiedState {
        let kind = if self.net.is_vanishing(&marking) {
            StateKind::Vanishing
        } else {
            StateKind::Tangible
        };
        ClassifiedState::new(marking, kind)
    }

    fn successors(&self, state: &ClassifiedState) -> Result<Vec<Successor>, ModelQueryError> {
        self.net
            .enabled_transitions(&state.marking)
            .into_iter()
            .map(|transition| {
                let next = self.net.fire_transition(&state.marking, transition)?;
                Ok(Successor {
                    transition,
                    state: self.classify(next),
                })
            })
            .collect()
    }

    fn rate(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<f64, ModelQueryError> {
        let Some(t) = self.net.get_transition(transition) else {
            return Err(ModelQueryError::UnknownTransition(transition));
        };
        if !self
            .net
            .enabled_transitions(&state.marking)
            .contains(&transition)
        {
            return Err(ModelQueryError::NotEnabled {
                transition,
                marking: state.marking.clone(),
            });
        }
        Ok(t.rate)
    }
}

/// Memoises `successors` by marking value. Shareable between workers.
pub struct CachingExplorerUtilities<U> {
    inner: U,
    cache: RwLock<HashMap<Marking, Vec<Successor>>>,
}

impl<U> CachingExplorerUtilities<U> {
    pub fn new(inner: U) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

impl<U> ExplorerUtilities for CachingExplorerUtilities<U>
where
    U: ExplorerUtilities,
{
    fn current_state(&self) -> ClassifiedState {
        self.inner.current_state()
    }

    fn classify(&self, marking: Marking) -> ClassifiedState {
        self.inner.classify(marking)
    }

    fn successors(&self, state: &ClassifiedState) -> Result<Vec<Successor>, ModelQueryError> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&state.marking)
        {
            return Ok(hit.clone());
        }

        let successors = self.inner.successors(state)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(state.marking.clone())
            .or_insert_with(|| successors.clone());
        Ok(successors)
    }

    fn rate(
        &self,
        state: &ClassifiedState,
        transition: TransitionId,
    ) -> Result<f64, ModelQueryError> {
        self.inner.rate(state, transition)
    }
}
