//! 接收探索器逐个产出的 `(id, 状态, 记录)` 并转交给写出端。
use std::io::{self, Write};

use indexmap::IndexMap;

use crate::analysis::state::{ClassifiedState, Record};
use crate::net::StateId;
use crate::state_io::writer::StateWriter;

pub trait StateProcessor {
    fn process(&mut self, id: StateId, state: &ClassifiedState, record: &Record)
    -> io::Result<()>;
}

impl<P: StateProcessor + ?Sized> StateProcessor for &mut P {
    fn process(
        &mut self,
        id: StateId,
        state: &ClassifiedState,
        record: &Record,
    ) -> io::Result<()> {
        (**self).process(id, state, record)
    }
}

/// Streams every state to `states` and its record to `records`.
pub struct StateIOProcessor<S, W1, W2> {
    writer: S,
    states: W1,
    records: W2,
}

impl<S, W1, W2> StateIOProcessor<S, W1, W2>
where
    S: StateWriter,
    W1: Write,
    W2: Write,
{
    pub fn new(writer: S, states: W1, records: W2) -> Self {
        Self {
            writer,
            states,
            records,
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.states.flush()?;
        self.records.flush()
    }

    pub fn into_inner(self) -> (W1, W2) {
        (self.states, self.records)
    }
}

impl<S, W1, W2> StateProcessor for StateIOProcessor<S, W1, W2>
where
    S: StateWriter,
    W1: Write,
    W2: Write,
{
    fn process(
        &mut self,
        id: StateId,
        state: &ClassifiedState,
        record: &Record,
    ) -> io::Result<()> {
        self.writer.write_state(&mut self.states, id, state)?;
        self.writer.write_record(&mut self.records, record)
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingProcessor {
    pub states: IndexMap<StateId, ClassifiedState>,
    pub records: IndexMap<StateId, Record>,
    /// Deliveries for an id already seen; an exploration must never produce any.
    pub duplicate_deliveries: usize,
}

impl StateProcessor for CollectingProcessor {
    fn process(
        &mut self,
        id: StateId,
        state: &ClassifiedState,
        record: &Record,
    ) -> io::Result<()> {
        if self.states.insert(id, state.clone()).is_some() {
            self.duplicate_deliveries += 1;
        }
        self.records.insert(id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::net::Marking;
    use crate::state_io::reader::load;
    use crate::state_io::writer::BinaryStateIo;

    #[test]
    fn io_processor_output_loads_back() {
        let mut processor = StateIOProcessor::new(BinaryStateIo, Vec::new(), Vec::new());
        let a = ClassifiedState::tangible(Marking::from(vec![1, 0]));
        let b = ClassifiedState::tangible(Marking::from(vec![0, 1]));
        let mut to_b = Record::new(StateId::new(0));
        to_b.add(StateId::new(1), 2.0);

        processor.process(StateId::new(0), &a, &to_b).unwrap();
        processor
            .process(StateId::new(1), &b, &Record::new(StateId::new(1)))
            .unwrap();
        processor.flush().unwrap();

        let (states, records) = processor.into_inner();
        let space = load(
            &BinaryStateIo,
            &mut Cursor::new(states),
            &mut Cursor::new(records),
        )
        .unwrap();
        assert_eq!(space.states[&StateId::new(1)], b);
        assert_eq!(space.records[&StateId::new(0)], to_b);
    }
}
