use pio_interp::{Command, Interpreter, Variant};
use pio_sm::{GpioBank, SerialLink};
use proptest::prelude::*;

const MAX_CYCLES: u64 = 10_000;

fn with_registers<P: pio_sm::PinChannel>(interp: &mut Interpreter<P>, x: u32, y: u32) {
    let sm = interp.pio_mut().sm_mut(0).unwrap();
    sm.set_x(x);
    sm.set_y(y);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn negate_twice_is_identity(x in any::<u32>(), y in any::<u32>()) {
        let mut interp = Interpreter::new(Variant::full(), 0, GpioBank::new()).unwrap();
        with_registers(&mut interp, x, y);
        for command in [Command::NegateX, Command::NegateX, Command::NegateY, Command::NegateY] {
            interp.send(&command).unwrap();
        }
        interp.run_until_idle(MAX_CYCLES).unwrap();
        prop_assert_eq!((interp.x(), interp.y()), (x, y));
    }

    #[test]
    fn decrement_saturates(x in any::<u32>(), y in any::<u32>()) {
        let mut interp = Interpreter::new(Variant::full(), 0, GpioBank::new()).unwrap();
        with_registers(&mut interp, x, y);
        interp.send(&Command::DecrementX).unwrap();
        interp.send(&Command::DecrementY).unwrap();
        interp.run_until_idle(MAX_CYCLES).unwrap();
        prop_assert_eq!((interp.x(), interp.y()), (x.saturating_sub(1), y.saturating_sub(1)));
    }

    #[test]
    fn serialize_then_deserialize_reproduces_x(x in any::<u32>()) {
        let mut interp = Interpreter::new(Variant::full(), 0, SerialLink::loopback(32)).unwrap();
        with_registers(&mut interp, x, 0);
        interp.send(&Command::SerializeX).unwrap();
        interp.send(&Command::LoadX(32)).unwrap();
        interp.send(&Command::DeserializeX).unwrap();
        interp.run_until_idle(MAX_CYCLES).unwrap();
        prop_assert!(interp.is_idle());
        prop_assert_eq!(interp.x(), x);
        prop_assert_eq!(interp.pins().input_len(), 0);
    }

    #[test]
    fn early_exit_payload_is_truncated_to_28_bits(payload in any::<u32>(), x in any::<u16>()) {
        let mut interp = Interpreter::new(Variant::full(), 0, GpioBank::new()).unwrap();
        interp.send(&Command::LoadX(x)).unwrap();
        interp.send(&Command::EarlyExit(payload)).unwrap();
        interp.run_until_idle(MAX_CYCLES).unwrap();
        prop_assert_eq!(interp.try_recv(), Some(payload & 0x0fff_ffff));
        prop_assert_eq!(interp.try_recv(), None);
        prop_assert_eq!(interp.x(), x as u32);
    }
}
