//! Per-opcode execution handlers.
//!
//! Handlers must not commit any state before returning [`Next::Stall`]; a stalled instruction
//! is re-executed from scratch on the next cycle. The single exception is `irq wait`, which
//! raises its flag on the first cycle and then stalls until the flag is cleared.

use crate::config::StatusSource;
use crate::instruction::{
    InSource, Instruction, InstructionOperands, JmpCondition, MovDestination, MovOperation,
    MovSource, OutDestination, SetDestination, WaitSource,
};
use crate::pins::{PinChannel, PinPoll};
use crate::sm::{StallReason, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    Continue,
    Jump(u8),
    /// Completed; run this instruction on the next cycle.
    Exec(u16),
    Stall(StallReason),
}

pub(crate) struct ExecContext<'a> {
    pub irq: &'a mut u8,
    pub pins: &'a mut dyn PinChannel,
}

pub(crate) type Handler = fn(&mut StateMachine, &Instruction, &mut ExecContext<'_>) -> Next;

pub(crate) struct DispatchTable;

impl DispatchTable {
    /// Indexed by the 3-bit major opcode.
    pub(crate) const TABLE: [Handler; 8] = [
        op_jmp, op_wait, op_in, op_out, op_push_pull, op_mov, op_irq, op_set,
    ];
}

fn op_jmp(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Jmp { condition, address } = inst.operands else {
        return Next::Continue;
    };
    let taken = match condition {
        JmpCondition::Always => true,
        JmpCondition::XIsZero => sm.x == 0,
        JmpCondition::XDecNonZero => {
            let taken = sm.x != 0;
            sm.x = sm.x.wrapping_sub(1);
            taken
        }
        JmpCondition::YIsZero => sm.y == 0,
        JmpCondition::YDecNonZero => {
            let taken = sm.y != 0;
            sm.y = sm.y.wrapping_sub(1);
            taken
        }
        JmpCondition::XNotEqualY => sm.x != sm.y,
        JmpCondition::PinHigh => ctx.pins.level(sm.config.jmp_pin),
        JmpCondition::OsrNotEmpty => sm.osr.count < sm.config.pull_threshold,
    };
    if taken {
        Next::Jump(address)
    } else {
        Next::Continue
    }
}

fn op_wait(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Wait { polarity, source } = inst.operands else {
        return Next::Continue;
    };
    let met = match source {
        WaitSource::Gpio(pin) => ctx.pins.level(pin) == polarity,
        WaitSource::Pin(offset) => {
            ctx.pins.level((sm.config.in_base + offset) % 32) == polarity
        }
        WaitSource::Irq(index) => {
            let flag = 1u8 << index.resolve(sm.index);
            let met = (*ctx.irq & flag != 0) == polarity;
            if met && polarity {
                *ctx.irq &= !flag;
            }
            met
        }
    };
    if met {
        Next::Continue
    } else {
        Next::Stall(StallReason::Wait)
    }
}

fn op_in(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::In { source, bit_count } = inst.operands else {
        return Next::Continue;
    };
    let cfg = &sm.config;
    let pushes = cfg.autopush && (sm.isr.count + bit_count).min(32) >= cfg.push_threshold;
    if pushes && sm.rx.is_full() {
        return Next::Stall(StallReason::RxFull);
    }

    let data = match source {
        InSource::Pins => match ctx.pins.read_pins(cfg.in_base, bit_count) {
            Some(value) => value,
            None => return Next::Stall(StallReason::PinsEmpty),
        },
        InSource::X => sm.x,
        InSource::Y => sm.y,
        InSource::Null => 0,
        InSource::Isr => sm.isr.value,
        InSource::Osr => sm.osr.value,
    };
    let dir = cfg.in_shift;
    sm.isr.shift_in(data, bit_count, dir);

    if pushes {
        // Checked above: there is room.
        let _ = sm.rx.try_push(sm.isr.value);
        sm.isr.clear();
    }
    Next::Continue
}

fn op_out(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Out {
        destination,
        bit_count,
    } = inst.operands
    else {
        return Next::Continue;
    };
    let cfg = &sm.config;
    let mut osr = sm.osr;
    let refill = cfg.autopull && osr.count >= cfg.pull_threshold;
    if refill {
        match sm.tx.peek() {
            Some(word) => osr.set(word),
            None => return Next::Stall(StallReason::TxEmpty),
        }
    }
    let data = osr.shift_out(bit_count, cfg.out_shift);

    let next = match destination {
        OutDestination::Pins => {
            if ctx.pins.write_pins(cfg.out_base, cfg.out_count, data) == PinPoll::Full {
                return Next::Stall(StallReason::PinsFull);
            }
            Next::Continue
        }
        OutDestination::X => {
            sm.x = data;
            Next::Continue
        }
        OutDestination::Y => {
            sm.y = data;
            Next::Continue
        }
        OutDestination::Null => Next::Continue,
        OutDestination::PinDirs => {
            ctx.pins.set_pindirs(cfg.out_base, cfg.out_count, data);
            Next::Continue
        }
        OutDestination::Pc => Next::Jump((data & 0x1f) as u8),
        OutDestination::Isr => {
            sm.isr.value = data;
            sm.isr.count = bit_count;
            Next::Continue
        }
        OutDestination::Exec => Next::Exec(data as u16),
    };

    if refill {
        let _ = sm.tx.try_pop();
    }
    sm.osr = osr;
    next
}

fn op_push_pull(sm: &mut StateMachine, inst: &Instruction, _ctx: &mut ExecContext<'_>) -> Next {
    match inst.operands {
        InstructionOperands::Push { if_full, block } => {
            if if_full && sm.isr.count < sm.config.push_threshold {
                return Next::Continue;
            }
            if sm.rx.try_push(sm.isr.value).is_err() && block {
                return Next::Stall(StallReason::RxFull);
            }
            // A non-blocking push into a full FIFO loses the data but still clears the ISR.
            sm.isr.clear();
            Next::Continue
        }
        InstructionOperands::Pull { if_empty, block } => {
            if if_empty && sm.osr.count < sm.config.pull_threshold {
                return Next::Continue;
            }
            match sm.tx.try_pop() {
                Ok(word) => sm.osr.set(word),
                Err(_) if block => return Next::Stall(StallReason::TxEmpty),
                Err(_) => sm.osr.set(sm.x),
            }
            Next::Continue
        }
        _ => Next::Continue,
    }
}

fn op_mov(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Mov {
        destination,
        op,
        source,
    } = inst.operands
    else {
        return Next::Continue;
    };
    let cfg = &sm.config;
    let value = match source {
        MovSource::Pins => match ctx.pins.read_pins(cfg.in_base, 32) {
            Some(value) => value,
            None => return Next::Stall(StallReason::PinsEmpty),
        },
        MovSource::X => sm.x,
        MovSource::Y => sm.y,
        MovSource::Null => 0,
        MovSource::Status => {
            let level = match cfg.status_source {
                StatusSource::TxLevel => sm.tx.len(),
                StatusSource::RxLevel => sm.rx.len(),
            };
            if level < cfg.status_n as usize {
                u32::MAX
            } else {
                0
            }
        }
        MovSource::Isr => sm.isr.value,
        MovSource::Osr => sm.osr.value,
    };
    let value = match op {
        MovOperation::None => value,
        MovOperation::Invert => !value,
        MovOperation::BitReverse => value.reverse_bits(),
    };

    match destination {
        MovDestination::Pins => {
            if ctx.pins.write_pins(cfg.out_base, cfg.out_count, value) == PinPoll::Full {
                return Next::Stall(StallReason::PinsFull);
            }
        }
        MovDestination::X => sm.x = value,
        MovDestination::Y => sm.y = value,
        MovDestination::Exec => return Next::Exec(value as u16),
        MovDestination::Pc => return Next::Jump((value & 0x1f) as u8),
        MovDestination::Isr => sm.isr.set(value),
        MovDestination::Osr => sm.osr.set(value),
    }
    Next::Continue
}

fn op_irq(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Irq { clear, wait, index } = inst.operands else {
        return Next::Continue;
    };
    let flag = index.resolve(sm.index);
    let bit = 1u8 << flag;

    if clear {
        *ctx.irq &= !bit;
        return Next::Continue;
    }
    if sm.irq_wait == Some(flag) {
        if *ctx.irq & bit != 0 {
            return Next::Stall(StallReason::Irq);
        }
        sm.irq_wait = None;
        return Next::Continue;
    }
    *ctx.irq |= bit;
    if wait {
        sm.irq_wait = Some(flag);
        return Next::Stall(StallReason::Irq);
    }
    Next::Continue
}

fn op_set(sm: &mut StateMachine, inst: &Instruction, ctx: &mut ExecContext<'_>) -> Next {
    let InstructionOperands::Set { destination, data } = inst.operands else {
        return Next::Continue;
    };
    let cfg = &sm.config;
    match destination {
        SetDestination::Pins => {
            if ctx.pins.write_pins(cfg.set_base, cfg.set_count, data as u32) == PinPoll::Full {
                return Next::Stall(StallReason::PinsFull);
            }
        }
        SetDestination::X => sm.x = data as u32,
        SetDestination::Y => sm.y = data as u32,
        SetDestination::PinDirs => ctx.pins.set_pindirs(cfg.set_base, cfg.set_count, data as u32),
    }
    Next::Continue
}
