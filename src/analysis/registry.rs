//! 标识与状态编号的双向映射，按发现顺序分配，运行期间编号不变。
use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::analysis::state::ClassifiedState;
use crate::net::{Idx, Marking, StateId};

/// Outcome of [`StateRegistry::discover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// First sighting: the caller owns the expansion of this state.
    New(StateId),
    Known(StateId),
}

impl Discovery {
    pub fn id(self) -> StateId {
        match self {
            Discovery::New(id) | Discovery::Known(id) => id,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Discovery::New(_))
    }
}

/// Discovery is a single critical section, so concurrent workers agree on one id per
/// marking and exactly one of them sees [`Discovery::New`].
#[derive(Debug, Default)]
pub struct StateRegistry {
    states: Mutex<IndexMap<Marking, ClassifiedState>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discover(&self, state: &ClassifiedState) -> Discovery {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let index = states.len();
        match states.entry(state.marking.clone()) {
            Entry::Occupied(entry) => Discovery::Known(StateId::from_usize(entry.index())),
            Entry::Vacant(entry) => {
                entry.insert(state.clone());
                Discovery::New(StateId::from_usize(index))
            }
        }
    }

    pub fn id_of(&self, marking: &Marking) -> Option<StateId> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_index_of(marking)
            .map(StateId::from_usize)
    }

    pub fn state(&self, id: StateId) -> Option<ClassifiedState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_index(id.index())
            .map(|(_, state)| state.clone())
    }

    pub fn len(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn ids_follow_discovery_order() {
        let registry = StateRegistry::new();
        let a = ClassifiedState::tangible(Marking::from(vec![1, 0]));
        let b = ClassifiedState::tangible(Marking::from(vec![0, 1]));

        assert_eq!(registry.discover(&a), Discovery::New(StateId::new(0)));
        assert_eq!(registry.discover(&b), Discovery::New(StateId::new(1)));
        assert_eq!(registry.discover(&a), Discovery::Known(StateId::new(0)));
        assert_eq!(registry.id_of(&b.marking), Some(StateId::new(1)));
        assert_eq!(registry.state(StateId::new(0)), Some(a));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_discovery_agrees_on_one_id() {
        let registry = Arc::new(StateRegistry::new());
        let state = ClassifiedState::tangible(Marking::from(vec![4, 2]));

        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let state = state.clone();
                thread::spawn(move || registry.discover(&state))
            })
            .collect::<Vec<_>>();
        let outcomes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(outcomes.iter().filter(|d| d.is_new()).count(), 1);
        assert!(outcomes.iter().all(|d| d.id() == StateId::new(0)));
        assert_eq!(registry.len(), 1);
    }
}
