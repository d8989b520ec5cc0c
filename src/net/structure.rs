//! GSPN 静态结构元素：库所、迁移（瞬时/计时）与标识。
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::net::ids::PlaceId;
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    pub tokens: Weight,
    pub capacity: Weight,
}

impl Place {
    pub fn new(name: impl Into<String>, tokens: Weight) -> Self {
        Self::new_with_tokens_and_capacity(name, tokens, Weight::MAX)
    }

    pub fn new_with_tokens_and_capacity(
        name: impl Into<String>,
        tokens: Weight,
        capacity: Weight,
    ) -> Self {
        Self {
            name: name.into(),
            tokens,
            capacity,
        }
    }
}

/// 瞬时迁移零时延激发且优先于计时迁移；计时迁移按指数分布延迟激发。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Immediate,
    Timed,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub name: String,
    pub kind: TransitionKind,
    /// Firing rate for timed transitions, firing weight for immediate ones.
    pub rate: f64,
}

impl Transition {
    pub fn timed(name: impl Into<String>, rate: f64) -> Self {
        Self {
            name: name.into(),
            kind: TransitionKind::Timed,
            rate,
        }
    }

    pub fn immediate(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            kind: TransitionKind::Immediate,
            rate: weight,
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.kind == TransitionKind::Immediate
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition")
            .field(&self.name)
            .field(&self.kind)
            .field(&self.rate)
            .finish()
    }
}

/// Token vector of a net. Equality and hashing are structural.
#[derive(Clone, PartialEq, Eq)]
pub struct Marking(pub IndexVec<PlaceId, Weight>);

impl Marking {
    pub fn new(initial: IndexVec<PlaceId, Weight>) -> Self {
        Self(initial)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Weight)> {
        self.0.iter_enumerated()
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0[place]
    }

    pub fn tokens_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place]
    }

    pub fn as_slice(&self) -> &[Weight] {
        self.0.as_slice()
    }

    pub fn into_inner(self) -> IndexVec<PlaceId, Weight> {
        self.0
    }
}

impl From<Vec<Weight>> for Marking {
    fn from(tokens: Vec<Weight>) -> Self {
        Self(IndexVec::from_vec(tokens))
    }
}

impl Hash for Marking {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in self.0.iter() {
            value.hash(state);
        }
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, tokens) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{tokens}")?;
        }
        write!(f, "]")
    }
}
