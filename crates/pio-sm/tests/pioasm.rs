use pio_sm::pioasm::parse_program;
use pio_sm::{Instruction, Wrap};

const BLINK: &str = r#"
; Toggle a pin forever.
.program blink
.origin 4
.define public DELAY 7

.wrap_target
start:
    set pins, 1 [DELAY]   // on
    set pins, 0 [DELAY]
    jmp start
.wrap

% c-sdk {
static inline void blink_program_init(PIO pio, uint sm, uint offset, uint pin) {
    pio_sm_config c = blink_program_get_default_config(offset);
}
%}
"#;

#[test]
fn parses_directives_labels_and_delays() {
    let program = parse_program(BLINK).unwrap();
    assert_eq!(program.name.as_deref(), Some("blink"));
    assert_eq!(program.origin, Some(4));
    assert_eq!(program.code, vec![0xe701, 0xe700, 0x0000]);
    assert_eq!(program.wrap, Wrap { source: 2, target: 0 });
    assert_eq!(program.label("start"), Some(0));
}

#[test]
fn every_instruction_form() {
    let source = "
        top: nop
        jmp x != y, top
        jmp !osre top
        wait 1 gpio 3
        wait 0 irq 2 rel
        in pins, 32
        out exec, 16
        push iffull noblock
        pull ifempty
        mov isr, ::osr
        mov pc, ~ x
        irq wait 1 rel
        irq clear 0
        set pindirs, 31
    ";
    let program = parse_program(source).unwrap();
    let text: Vec<String> = program
        .code
        .iter()
        .map(|&w| Instruction::decode(w).unwrap().to_string())
        .collect();
    assert_eq!(
        text,
        vec![
            "mov y, y",
            "jmp x!=y, 0",
            "jmp !osre, 0",
            "wait 1 gpio 3",
            "wait 0 irq 2 rel",
            "in pins, 32",
            "out exec, 16",
            "push iffull noblock",
            "pull ifempty block",
            "mov isr, ::osr",
            "mov pc, ~x",
            "irq wait 1 rel",
            "irq clear 0",
            "set pindirs, 31",
        ]
    );
}

#[test]
fn forward_labels_and_wrap_target() {
    let source = "
        jmp done
        nop
    .wrap_target
    done:
        pull
        out pc, 5
    .wrap
    ";
    let program = parse_program(source).unwrap();
    assert_eq!(program.code[0], 0x0002);
    assert_eq!(program.wrap, Wrap { source: 3, target: 2 });
}

#[test]
fn errors_carry_line_numbers() {
    let err = parse_program("nop\njmp nowhere\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.msg.contains("nowhere"), "{err}");

    let err = parse_program("nop\n\nout pins, 33\n").unwrap_err();
    assert_eq!(err.line, 3);

    let err = parse_program("a:\na:\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.msg.contains("duplicate"));

    let err = parse_program(".side_set 1\n").unwrap_err();
    assert_eq!(err.line, 1);

    let err = parse_program("frob x\n").unwrap_err();
    assert_eq!(err.to_string(), "line 1: unknown instruction `frob`");
}

#[test]
fn rejects_programs_over_32_instructions() {
    let source = "nop\n".repeat(33);
    let err = parse_program(&source).unwrap_err();
    assert_eq!(err.line, 33);
}
