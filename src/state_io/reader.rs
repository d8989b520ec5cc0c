//! 从两条持久化流完整重建状态映射与全部记录；截断或格式错误的流一律拒绝。
use std::io::Read;

use indexmap::IndexMap;
use indexmap::map::Entry;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::analysis::state::{ClassifiedState, Record, StateKind};
use crate::net::{Marking, StateId};
use crate::state_io::codec::{
    DecodeError, read_byte, read_rate, read_state_id, read_varint, read_varint_or_eof,
    state_id_from,
};
use crate::state_io::writer::{BinaryStateIo, TANGIBLE, VANISHING};

pub trait StateReader {
    /// Next mapping entry, or `None` at a clean end of stream.
    fn read_state<R: Read>(
        &self,
        input: &mut R,
    ) -> Result<Option<(StateId, ClassifiedState)>, DecodeError>;

    /// Next record, or `None` at a clean end of stream.
    fn read_record<R: Read>(&self, input: &mut R) -> Result<Option<Record>, DecodeError>;
}

impl StateReader for BinaryStateIo {
    fn read_state<R: Read>(
        &self,
        input: &mut R,
    ) -> Result<Option<(StateId, ClassifiedState)>, DecodeError> {
        let Some(raw) = read_varint_or_eof(input, "state id")? else {
            return Ok(None);
        };
        let id = state_id_from(raw)?;

        let places = read_varint(input, "marking length")?;
        // untrusted length: grow as tokens actually arrive
        let mut tokens = Vec::with_capacity(places.min(1024) as usize);
        for _ in 0..places {
            tokens.push(read_varint(input, "marking")?);
        }

        let kind = match read_byte(input, "state classification")? {
            TANGIBLE => StateKind::Tangible,
            VANISHING => StateKind::Vanishing,
            other => return Err(DecodeError::InvalidKind(other)),
        };

        Ok(Some((id, ClassifiedState::new(Marking::from(tokens), kind))))
    }

    fn read_record<R: Read>(&self, input: &mut R) -> Result<Option<Record>, DecodeError> {
        let Some(raw) = read_varint_or_eof(input, "record source")? else {
            return Ok(None);
        };
        let mut record = Record::new(state_id_from(raw)?);

        let count = read_varint(input, "successor count")?;
        for _ in 0..count {
            let to = read_state_id(input, "successor id")?;
            let rate = read_rate(input, "successor rate")?;
            if record.successors.insert(to, rate).is_some() {
                return Err(DecodeError::DuplicateSuccessor {
                    from: record.state,
                    to,
                });
            }
        }

        Ok(Some(record))
    }
}

pub type StateGraph = DiGraph<(StateId, ClassifiedState), f64>;

/// A fully reloaded state space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateSpace {
    pub states: IndexMap<StateId, ClassifiedState>,
    pub records: IndexMap<StateId, Record>,
}

impl StateSpace {
    pub fn state(&self, id: StateId) -> Option<&ClassifiedState> {
        self.states.get(&id)
    }

    pub fn record(&self, id: StateId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn id_of(&self, marking: &Marking) -> Option<StateId> {
        self.states
            .iter()
            .find(|(_, state)| state.marking == *marking)
            .map(|(id, _)| *id)
    }

    /// Graph view for consumers such as renderers: nodes carry the classified state, edges
    /// the aggregated rate. Edges whose endpoints are not mapped are left out; a space
    /// returned by [`load`] has none.
    pub fn to_graph(&self) -> (StateGraph, IndexMap<StateId, NodeIndex>) {
        let mut graph = DiGraph::with_capacity(self.states.len(), self.records.len());
        let mut nodes = IndexMap::with_capacity(self.states.len());
        for (id, state) in &self.states {
            nodes.insert(*id, graph.add_node((*id, state.clone())));
        }
        for record in self.records.values() {
            let Some(&from) = nodes.get(&record.state) else {
                continue;
            };
            for (to, rate) in &record.successors {
                if let Some(&to) = nodes.get(to) {
                    graph.add_edge(from, to, *rate);
                }
            }
        }
        (graph, nodes)
    }
}

pub fn read_states<S, R>(
    reader: &S,
    input: &mut R,
) -> Result<IndexMap<StateId, ClassifiedState>, DecodeError>
where
    S: StateReader,
    R: Read,
{
    let mut states = IndexMap::new();
    while let Some((id, state)) = reader.read_state(input)? {
        match states.entry(id) {
            Entry::Occupied(_) => return Err(DecodeError::DuplicateState(id)),
            Entry::Vacant(entry) => {
                entry.insert(state);
            }
        }
    }
    Ok(states)
}

pub fn read_records<S, R>(
    reader: &S,
    input: &mut R,
) -> Result<IndexMap<StateId, Record>, DecodeError>
where
    S: StateReader,
    R: Read,
{
    let mut records = IndexMap::new();
    while let Some(record) = reader.read_record(input)? {
        match records.entry(record.state) {
            Entry::Occupied(_) => return Err(DecodeError::DuplicateRecord(record.state)),
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
    }
    Ok(records)
}

/// Reads both streams to the end. Every mapped state must own exactly one record and every
/// id a record mentions must be mapped, which also exposes streams cut on an entry boundary.
pub fn load<S, R1, R2>(
    reader: &S,
    state_input: &mut R1,
    record_input: &mut R2,
) -> Result<StateSpace, DecodeError>
where
    S: StateReader,
    R1: Read,
    R2: Read,
{
    let states = read_states(reader, state_input)?;
    let records = read_records(reader, record_input)?;

    for record in records.values() {
        if !states.contains_key(&record.state) {
            return Err(DecodeError::DanglingState {
                from: record.state,
                to: record.state,
            });
        }
        if let Some(to) = record.successors.keys().find(|to| !states.contains_key(*to)) {
            return Err(DecodeError::DanglingState {
                from: record.state,
                to: *to,
            });
        }
    }
    if let Some(id) = states.keys().find(|id| !records.contains_key(*id)) {
        return Err(DecodeError::MissingRecord(*id));
    }

    Ok(StateSpace { states, records })
}
