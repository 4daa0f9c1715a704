use pio_interp::bf::{self, BfRunner};
use pio_interp::{
    response_tag, Command, InterpError, Interpreter, InterpreterConfig, MicroOp, Variant,
    VariantKind,
};
use pio_sm::{GpioBank, RunExit, SerialLink, StallReason};

const MAX_CYCLES: u64 = 10_000;

fn full() -> Interpreter<GpioBank> {
    Interpreter::new(Variant::full(), 0, GpioBank::new()).unwrap()
}

#[test]
fn every_field_value_returns_to_dispatch() {
    for variant in [Variant::minimal(), Variant::standard(), Variant::full()] {
        let mut interp = Interpreter::new(variant, 0, GpioBank::new()).unwrap();
        let bits = variant.width().bits() as u32;
        for field in 0..(1u32 << bits) {
            interp.reset().unwrap();
            let word = match bits {
                4 => field << 28,
                _ => field,
            };
            interp.submit(word).unwrap();
            let exit = interp.run_until_idle(MAX_CYCLES).unwrap();
            assert!(matches!(exit, RunExit::Stalled { .. }));
            assert!(
                interp.is_idle(),
                "{} field {field} parked at pc {}",
                variant.name(),
                interp.registers().pc
            );
            assert_eq!(interp.stall_reason(), Some(StallReason::TxEmpty));
            while interp.try_recv().is_some() {}
        }
    }
}

#[test]
fn idle_interpreter_does_not_change() {
    let mut interp = full();
    interp.send(&Command::LoadX(0x55)).unwrap();
    interp.send(&Command::LoadY(0xAA)).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    let before = interp.registers();
    for _ in 0..100 {
        assert_eq!(interp.run_slice(50), RunExit::Stalled { cycles: 1 });
    }
    assert_eq!(interp.registers(), before);
    assert_eq!(before.stall, Some(StallReason::TxEmpty));
    assert_eq!(interp.pins().writes(), 0);
}

#[test]
fn increment_is_negate_decrement_negate() {
    let mut interp = full();
    interp.send(&Command::LoadX(41)).unwrap();
    for command in [Command::NegateX, Command::DecrementX, Command::NegateX] {
        interp.send(&command).unwrap();
    }
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.x(), 42);
}

#[test]
fn decrement_saturates_at_zero() {
    let mut interp = full();
    interp.send(&Command::DecrementX).unwrap();
    interp.send(&Command::DecrementY).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!((interp.x(), interp.y()), (0, 0));
}

#[test]
fn early_exit_returns_payload_and_keeps_registers() {
    let mut interp = full();
    interp.send(&Command::LoadX(0x1234)).unwrap();
    interp.send(&Command::LoadY(0x5678)).unwrap();
    interp.send(&Command::EarlyExit(0xFFFF_FFFF)).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.try_recv(), Some(0x0FFF_FFFF));
    assert_eq!(interp.try_recv(), None);
    assert_eq!((interp.x(), interp.y()), (0x1234, 0x5678));
    assert!(interp.is_idle());
}

#[test]
fn responses_keep_command_order() {
    let mut interp = full();
    for payload in [3, 1, 2] {
        interp.send(&Command::EarlyExit(payload)).unwrap();
    }
    interp.run_until_idle(MAX_CYCLES).unwrap();
    let got: Vec<u32> = std::iter::from_fn(|| interp.try_recv()).collect();
    assert_eq!(got, vec![3, 1, 2]);
}

#[test]
fn full_rx_fifo_stalls_early_exit() {
    let mut interp = full();
    for payload in 0..4 {
        interp.send(&Command::EarlyExit(payload)).unwrap();
    }
    interp.run_until_idle(MAX_CYCLES).unwrap();
    interp.send(&Command::EarlyExit(4)).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert!(!interp.is_idle());
    assert_eq!(interp.stall_reason(), Some(StallReason::RxFull));

    assert_eq!(interp.try_recv(), Some(0));
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert!(interp.is_idle());
    let rest: Vec<u32> = std::iter::from_fn(|| interp.try_recv()).collect();
    assert_eq!(rest, vec![1, 2, 3, 4]);
}

#[test]
fn zero_test_answers_only_when_x_is_zero() {
    let mut interp = full();
    let slot = interp.early_exit_pc().unwrap();

    interp.send(&Command::zero_test(slot, 0x7ab)).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    let response = interp.try_recv().unwrap();
    assert_eq!(response, 0x7ab << 16);
    assert_eq!(response_tag(response), 0x7ab);

    interp.send(&Command::LoadX(1)).unwrap();
    interp.send(&Command::zero_test(slot, 0x7ab)).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.try_recv(), None);
    assert!(interp.is_idle());
    assert_eq!(interp.x(), 1);
}

#[test]
fn injected_set_writes_register() {
    use pio_sm::{Instruction, InstructionOperands, SetDestination};

    let mut interp = full();
    let set_y = Instruction::new(InstructionOperands::Set {
        destination: SetDestination::Y,
        data: 17,
    });
    interp
        .send(&Command::Inject {
            instruction: set_y,
            tag: 0,
        })
        .unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.y(), 17);
    assert!(interp.is_idle());
}

#[test]
fn serialize_x_is_msb_first() {
    let mut interp = Interpreter::new(Variant::full(), 0, SerialLink::new(64)).unwrap();
    interp.send(&Command::LoadX(0x8001)).unwrap();
    interp.send(&Command::SerializeX).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.pins_mut().pop_output_word(), Some(0x8001));
    assert_eq!(interp.pins().output_len(), 0);
}

#[test]
fn serialize_stalls_on_full_link_and_resumes() {
    let mut interp = Interpreter::new(Variant::full(), 0, SerialLink::new(8)).unwrap();
    interp.send(&Command::LoadY(0xF00F)).unwrap();
    interp.send(&Command::SerializeY).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.stall_reason(), Some(StallReason::PinsFull));
    assert_eq!(interp.pins().output_len(), 8);

    let mut bits = Vec::new();
    loop {
        bits.extend(interp.pins_mut().take_output());
        if interp.is_idle() {
            break;
        }
        interp.run_until_idle(MAX_CYCLES).unwrap();
    }
    let word = bits.iter().fold(0u32, |w, &b| (w << 1) | b as u32);
    assert_eq!(bits.len(), 32);
    assert_eq!(word, 0xF00F);
}

#[test]
fn deserialize_samples_exactly_k_bits() {
    let mut interp = Interpreter::new(Variant::full(), 0, SerialLink::new(64)).unwrap();
    assert!(interp.pins_mut().feed_word(0xABCDE, 20));
    interp.send(&Command::LoadX(12)).unwrap();
    interp.send(&Command::DeserializeX).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert!(interp.is_idle());
    assert_eq!(interp.x(), 0xABC);
    assert_eq!(interp.pins().input_len(), 8);
    assert_eq!(interp.registers().isr_count, 0);
}

#[test]
fn deserialize_waits_for_input() {
    let mut interp = Interpreter::new(Variant::full(), 0, SerialLink::new(64)).unwrap();
    interp.send(&Command::LoadX(4)).unwrap();
    interp.send(&Command::DeserializeX).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.stall_reason(), Some(StallReason::PinsEmpty));
    interp.pins_mut().feed_word(0b1011, 4);
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert!(interp.is_idle());
    assert_eq!(interp.x(), 0b1011);
}

#[test]
fn standard_variant_rejects_inject_and_early_exit() {
    let mut interp = Interpreter::new(Variant::standard(), 0, GpioBank::new()).unwrap();
    assert_eq!(interp.early_exit_pc(), None);
    assert!(matches!(
        interp.send(&Command::EarlyExit(1)),
        Err(InterpError::CommandNotSupported {
            op: MicroOp::EarlyExit,
            ..
        })
    ));
    interp.send(&Command::NegateY).unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert_eq!(interp.y(), u32::MAX);
}

#[test]
fn minimal_packs_increment_into_one_word() {
    let mut interp = Interpreter::new(Variant::minimal(), 0, GpioBank::new()).unwrap();
    interp
        .send_packed(&[MicroOp::NegateX, MicroOp::DecrementX, MicroOp::NegateX])
        .unwrap();
    interp
        .send_packed(&[MicroOp::NegateY, MicroOp::DecrementY, MicroOp::NegateY])
        .unwrap();
    interp.run_until_idle(MAX_CYCLES).unwrap();
    assert!(interp.is_idle());
    assert_eq!((interp.x(), interp.y()), (1, 1));
    assert_eq!(interp.registers().tx_level, 0);
}

#[test]
fn minimal_rejects_four_bit_commands() {
    let mut interp = Interpreter::new(Variant::minimal(), 0, GpioBank::new()).unwrap();
    assert!(interp.send(&Command::NegateX).is_err());
}

#[test]
fn full_tx_fifo_is_reported() {
    let mut interp = full();
    for _ in 0..4 {
        interp.send(&Command::NegateX).unwrap();
    }
    assert!(matches!(
        interp.send(&Command::NegateX),
        Err(InterpError::Pio(pio_sm::PioError::TxFull))
    ));
}

fn runner() -> BfRunner {
    BfRunner::from_config(&InterpreterConfig::default()).unwrap()
}

#[test]
fn brainfuck_output() {
    let program = bf::parse("+++.").unwrap();
    let outcome = runner().run(&program, &[]).unwrap();
    assert_eq!(outcome.output, vec![3]);
    assert_eq!(outcome.x, 3);
}

#[test]
fn brainfuck_echo() {
    let program = bf::parse(",.,.").unwrap();
    let outcome = runner().run(&program, b"A").unwrap();
    assert_eq!(outcome.output, vec![b'A', 0]);
}

#[test]
fn brainfuck_loop_counts_down() {
    let program = bf::parse("+++[-]").unwrap();
    let outcome = runner().run(&program, &[]).unwrap();
    assert_eq!(outcome.x, 0);
    assert_eq!(outcome.steps, 10);
}

#[test]
fn brainfuck_pointer_moves_y() {
    let program = bf::parse(">>+<").unwrap();
    let outcome = runner().run(&program, &[]).unwrap();
    assert_eq!((outcome.x, outcome.y), (1, 1));
}

#[test]
fn brainfuck_step_limit() {
    let program = bf::parse("+[]").unwrap();
    let err = runner().with_step_limit(100).run(&program, &[]);
    assert_eq!(err, Err(InterpError::StepLimit(100)));
}

#[test]
fn brainfuck_on_narrow_link() {
    let config = InterpreterConfig {
        link_capacity: 3,
        ..InterpreterConfig::default()
    };
    let mut runner = BfRunner::from_config(&config).unwrap();
    let outcome = runner.run(&bf::parse(",+.").unwrap(), &[0x40]).unwrap();
    assert_eq!(outcome.output, vec![0x41]);
}

#[test]
fn brainfuck_needs_full_variant() {
    let config = InterpreterConfig {
        variant: VariantKind::Standard,
        ..InterpreterConfig::default()
    };
    assert!(matches!(
        BfRunner::from_config(&config),
        Err(InterpError::UnsupportedVariant(_))
    ));
    let config = InterpreterConfig {
        loopback: true,
        ..InterpreterConfig::default()
    };
    assert!(matches!(
        BfRunner::from_config(&config),
        Err(InterpError::InvalidConfig(_))
    ));
}
