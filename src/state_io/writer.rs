//! 追加写入：状态映射流 `(id, marking, kind)` 与转移记录流 `(from, n, (to, rate)×n)`。
use std::io::{self, Write};

use crate::analysis::state::{ClassifiedState, Record, StateKind};
use crate::net::StateId;
use crate::state_io::codec::{write_rate, write_state_id, write_varint};

pub(crate) const TANGIBLE: u8 = 0;
pub(crate) const VANISHING: u8 = 1;

pub trait StateWriter {
    fn write_state<W: Write>(
        &self,
        out: &mut W,
        id: StateId,
        state: &ClassifiedState,
    ) -> io::Result<()>;

    fn write_record<W: Write>(&self, out: &mut W, record: &Record) -> io::Result<()>;
}

/// The compact binary layout; also implements [`crate::state_io::reader::StateReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryStateIo;

impl StateWriter for BinaryStateIo {
    fn write_state<W: Write>(
        &self,
        out: &mut W,
        id: StateId,
        state: &ClassifiedState,
    ) -> io::Result<()> {
        write_state_id(out, id)?;
        write_varint(out, state.marking.len() as u64)?;
        for tokens in state.marking.as_slice() {
            write_varint(out, *tokens)?;
        }
        let kind = match state.kind {
            StateKind::Tangible => TANGIBLE,
            StateKind::Vanishing => VANISHING,
        };
        out.write_all(&[kind])
    }

    fn write_record<W: Write>(&self, out: &mut W, record: &Record) -> io::Result<()> {
        write_state_id(out, record.state)?;
        write_varint(out, record.successors.len() as u64)?;
        for (successor, rate) in &record.successors {
            write_state_id(out, *successor)?;
            write_rate(out, *rate)?;
        }
        Ok(())
    }
}
