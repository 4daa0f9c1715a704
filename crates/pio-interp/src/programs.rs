//! Dispatch programs for each interpreter variant.
//!
//! Every program fills all 32 instruction slots: slots that no dispatch field reaches on purpose
//! hold a jump back to the fetch slot, so a stray field can never run into unrelated code.

use pio_sm::{
    pioasm, Assembler, InSource, Instruction, JmpCondition, MovDestination, MovOperation,
    MovSource, OutDestination, Program, ShiftDirection, SmConfig, INSTRUCTION_MEMORY_SIZE,
};

use crate::error::Result;
use crate::micro_op::{DispatchTable, MicroOp};
use crate::variant::{Capabilities, FieldWidth, Variant};

/// The 20-instruction 5-bit listing. Slots 20..32 are padded after parsing.
pub const MINIMAL_SOURCE: &str = "\
.program pio_interp_minimal
.origin 0

    jmp !x, x_is_zero
    jmp x_is_not_zero
    jmp x--, x_decremented
    mov x, ~x
x_decremented:
    out pc, 5
    jmp y--, y_decremented
    mov y, ~y
y_decremented:
    out pc, 5
    in osr, 16
    out pc, 5
    mov x, isr
    out pc, 5
    mov y, isr
    out pc, 5
    in isr, 1
    out pc, 5
x_is_not_zero:
x_is_zero:
out_code:
    out pins, 1
    jmp !osre, out_code
.wrap_target
fetch:
    pull
    out pc, 5
.wrap
";

const MINIMAL_FETCH: u8 = 18;

const MINIMAL_TABLE: [MicroOp; 20] = [
    MicroOp::SerializeOut,
    MicroOp::SerializeOut,
    MicroOp::DecrementX,
    MicroOp::NegateX,
    MicroOp::Redispatch,
    MicroOp::DecrementY,
    MicroOp::NegateY,
    MicroOp::Redispatch,
    MicroOp::CaptureImmediate,
    MicroOp::Redispatch,
    MicroOp::LoadXFromIsr,
    MicroOp::Redispatch,
    MicroOp::LoadYFromIsr,
    MicroOp::Redispatch,
    MicroOp::RotateIsr,
    MicroOp::Redispatch,
    MicroOp::SerializeOut,
    MicroOp::DrainOut,
    MicroOp::Fetch,
    MicroOp::Redispatch,
];

/// A dispatch program together with everything needed to drive it.
#[derive(Debug, Clone)]
pub struct InterpreterProgram {
    pub variant: Variant,
    pub program: Program,
    pub table: DispatchTable,
    /// Shift and wrap settings the program relies on. Pins are mapped at init.
    pub config: SmConfig,
    /// Program-relative slot of the `pull`.
    pub fetch_slot: u8,
    /// Program-relative slot an injected jump can target to report back through the RX FIFO.
    pub early_exit_slot: Option<u8>,
}

pub fn build(variant: Variant) -> Result<InterpreterProgram> {
    match variant.width() {
        FieldWidth::Four => Ok(four_bit(variant)),
        FieldWidth::Five => minimal(variant),
    }
}

fn minimal(variant: Variant) -> Result<InterpreterProgram> {
    let mut program = pioasm::parse_program(MINIMAL_SOURCE)?;
    let pad = Instruction::jmp(JmpCondition::Always, MINIMAL_FETCH).encode();
    program.code.resize(INSTRUCTION_MEMORY_SIZE, pad);

    let mut config = SmConfig::default();
    config
        .set_wrap(program.wrap.target, program.wrap.source)
        .set_out_shift(ShiftDirection::Right, false, 32)
        .set_in_shift(ShiftDirection::Right, false, 32);

    Ok(InterpreterProgram {
        variant,
        program,
        table: DispatchTable::new(FieldWidth::Five, MINIMAL_TABLE.to_vec()),
        config,
        fetch_slot: MINIMAL_FETCH,
        early_exit_slot: None,
    })
}

/// Layout shared by the 4-bit variants. Slots 2..16 are the handler entry points (or their
/// first instruction); longer handlers live in 16..32.
fn four_bit(variant: Variant) -> InterpreterProgram {
    let inject = variant.supports(Capabilities::INJECT);
    let early_exit = variant.supports(Capabilities::EARLY_EXIT);

    let mut a = Assembler::<{ INSTRUCTION_MEMORY_SIZE }>::new();
    a.set_origin(0);
    let mut fetch = a.label();
    let mut dispatch = a.label();
    let mut wrap_target = a.label();
    let mut wrap_source = a.label();
    let mut load_y = a.label();
    let mut exit = a.label();
    let mut serialize_x = a.label();
    let mut serialize_y = a.label();
    let mut shift_out = a.label();
    let mut sample = a.label();
    let mut sample_count = a.label();

    // 0, 1: dispatcher
    a.bind(&mut wrap_target);
    a.bind_named(&mut fetch, "fetch");
    a.pull(false, true);
    a.bind_named(&mut dispatch, "dispatch");
    a.out(OutDestination::Pc, 4);
    // 2, 3: decrement X, falling into negate when X was zero
    a.jmp(JmpCondition::XDecNonZero, &mut fetch);
    a.mov(MovDestination::X, MovOperation::Invert, MovSource::X);
    a.jmp(JmpCondition::Always, &mut fetch);
    // 5: load X
    a.out(OutDestination::X, 16);
    a.jmp(JmpCondition::Always, &mut fetch);
    // 7: inject
    if inject {
        a.out(OutDestination::Exec, 16);
    } else {
        a.jmp(JmpCondition::Always, &mut fetch);
    }
    a.jmp(JmpCondition::Always, &mut fetch);
    // 9..14: trampolines
    a.jmp(JmpCondition::Always, &mut load_y);
    if early_exit {
        a.jmp(JmpCondition::Always, &mut exit);
    } else {
        a.jmp(JmpCondition::Always, &mut fetch);
    }
    a.jmp(JmpCondition::Always, &mut serialize_x);
    a.jmp(JmpCondition::Always, &mut serialize_y);
    a.jmp(JmpCondition::Always, &mut sample_count);
    // 14, 15: decrement Y, falling into negate when Y was zero. Wraps to 0.
    a.jmp(JmpCondition::YDecNonZero, &mut fetch);
    a.mov(MovDestination::Y, MovOperation::Invert, MovSource::Y);
    a.bind(&mut wrap_source);

    // 16: load Y
    a.bind_named(&mut load_y, "load_y");
    a.out(OutDestination::Y, 16);
    a.jmp(JmpCondition::Always, &mut fetch);
    // 18: early exit
    if early_exit {
        a.bind_named(&mut exit, "early_exit");
        a.out(OutDestination::Isr, 28);
        a.push(false, true);
        a.jmp(JmpCondition::Always, &mut fetch);
    } else {
        for _ in 0..3 {
            a.jmp(JmpCondition::Always, &mut fetch);
        }
    }
    // 21: serialize
    a.bind_named(&mut serialize_x, "serialize_x");
    a.mov(MovDestination::Osr, MovOperation::None, MovSource::X);
    a.jmp(JmpCondition::Always, &mut shift_out);
    a.bind_named(&mut serialize_y, "serialize_y");
    a.mov(MovDestination::Osr, MovOperation::None, MovSource::Y);
    a.bind_named(&mut shift_out, "shift_out");
    a.out(OutDestination::Pins, 1);
    a.jmp(JmpCondition::OsrNotEmpty, &mut shift_out);
    a.jmp(JmpCondition::Always, &mut fetch);
    // 27: deserialize, X = bit count
    a.bind_named(&mut sample, "sample");
    a.r#in(InSource::Pins, 1);
    a.bind_named(&mut sample_count, "deserialize_x");
    a.jmp(JmpCondition::XDecNonZero, &mut sample);
    a.mov(MovDestination::X, MovOperation::None, MovSource::Isr);
    a.mov(MovDestination::Isr, MovOperation::None, MovSource::Null);
    a.jmp(JmpCondition::Always, &mut fetch);

    let mut program = a.assemble_with_wrap(wrap_source, wrap_target);
    program.name = Some(format!("pio_interp_{}", variant.name()));

    let mut config = SmConfig::default();
    config
        .set_wrap(program.wrap.target, program.wrap.source)
        .set_out_shift(ShiftDirection::Left, false, 32)
        .set_in_shift(ShiftDirection::Left, false, 32);

    let table = vec![
        MicroOp::Fetch,
        MicroOp::Redispatch,
        MicroOp::DecrementX,
        MicroOp::NegateX,
        MicroOp::Fetch,
        MicroOp::LoadX,
        MicroOp::Fetch,
        if inject {
            MicroOp::Inject
        } else {
            MicroOp::Fetch
        },
        MicroOp::Fetch,
        MicroOp::LoadY,
        if early_exit {
            MicroOp::EarlyExit
        } else {
            MicroOp::Fetch
        },
        MicroOp::SerializeX,
        MicroOp::SerializeY,
        MicroOp::DeserializeX,
        MicroOp::DecrementY,
        MicroOp::NegateY,
    ];

    InterpreterProgram {
        variant,
        program,
        table: DispatchTable::new(FieldWidth::Four, table),
        config,
        fetch_slot: 0,
        early_exit_slot: early_exit.then_some(10),
    }
}
