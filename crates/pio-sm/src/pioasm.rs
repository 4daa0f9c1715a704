//! Parser for pioasm-style program text.
//!
//! Supported: `.program`, `.origin`, `.define`, `.wrap_target`, `.wrap`, labels (optionally
//! `public`), `[delay]` suffixes, `;` and `//` comments. `% <lang> { ... %}` blocks are skipped.
//! Side-set is not supported.
//!
//! Parsing is two-pass: the first pass assigns addresses to labels, the second encodes.

use std::collections::BTreeMap;

use crate::error::AsmError;
use crate::instruction::{
    InSource, Instruction, InstructionOperands, IrqIndex, JmpCondition, MovDestination,
    MovOperation, MovSource, OutDestination, SetDestination, WaitSource, MAX_DELAY,
};
use crate::program::{Program, Wrap};
use crate::INSTRUCTION_MEMORY_SIZE;

type Result<T> = std::result::Result<T, AsmError>;

struct Line<'a> {
    number: usize,
    text: &'a str,
}

pub fn parse_program(source: &str) -> Result<Program> {
    let mut name = None;
    let mut origin = None;
    let mut wrap_target = None;
    let mut wrap_source = None;
    let mut labels = BTreeMap::new();
    let mut defines: BTreeMap<String, i64> = BTreeMap::new();
    let mut body: Vec<Line<'_>> = Vec::new();
    let mut in_code_block = false;

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let trimmed = raw.trim();
        if in_code_block {
            if trimmed.starts_with("%}") {
                in_code_block = false;
            }
            continue;
        }
        if trimmed.starts_with('%') {
            in_code_block = true;
            continue;
        }

        let mut text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(directive) = text.strip_prefix('.') {
            let mut words = directive.split_whitespace();
            let keyword = words.next().unwrap_or_default();
            let args: Vec<&str> = words.collect();
            match keyword {
                "program" => {
                    if name.is_some() {
                        return Err(AsmError::new(number, "only one .program per source"));
                    }
                    let program = args
                        .first()
                        .ok_or_else(|| AsmError::new(number, ".program needs a name"))?;
                    name = Some(program.to_string());
                }
                "origin" => {
                    let value = args
                        .first()
                        .ok_or_else(|| AsmError::new(number, ".origin needs a value"))?;
                    let value = parse_value(value, &defines, number)?;
                    if !(0..INSTRUCTION_MEMORY_SIZE as i64).contains(&value) {
                        return Err(AsmError::new(number, "origin out of range"));
                    }
                    origin = Some(value as u8);
                }
                "define" => {
                    let args: Vec<&str> = args
                        .into_iter()
                        .filter(|arg| *arg != "public" && *arg != "PUBLIC")
                        .collect();
                    let [symbol, value] = args[..] else {
                        return Err(AsmError::new(number, ".define needs a symbol and a value"));
                    };
                    let value = parse_value(value, &defines, number)?;
                    defines.insert(symbol.to_string(), value);
                }
                "wrap_target" => wrap_target = Some(body.len() as u8),
                "wrap" => {
                    if body.is_empty() {
                        return Err(AsmError::new(number, ".wrap before any instruction"));
                    }
                    wrap_source = Some(body.len() as u8 - 1);
                }
                "lang_opt" => {}
                "side_set" => return Err(AsmError::new(number, "side-set is not supported")),
                other => {
                    return Err(AsmError::new(number, format!("unknown directive .{other}")))
                }
            }
            continue;
        }

        // Labels, possibly followed by an instruction on the same line.
        while let Some((label, rest)) = split_label(text) {
            let label = label.strip_prefix("public ").unwrap_or(label).trim();
            if !is_symbol(label) {
                return Err(AsmError::new(number, format!("invalid label `{label}`")));
            }
            if labels.insert(label.to_string(), body.len() as u8).is_some() {
                return Err(AsmError::new(number, format!("duplicate label `{label}`")));
            }
            text = rest.trim();
        }
        if text.is_empty() {
            continue;
        }

        if body.len() >= INSTRUCTION_MEMORY_SIZE {
            return Err(AsmError::new(number, "program exceeds 32 instructions"));
        }
        body.push(Line { number, text });
    }

    let code = body
        .iter()
        .map(|line| {
            parse_instruction(line.text, &labels, &defines, line.number).map(|i| i.encode())
        })
        .collect::<Result<Vec<u16>>>()?;

    let wrap = Wrap {
        source: wrap_source.unwrap_or(code.len().saturating_sub(1) as u8),
        target: wrap_target.unwrap_or(0),
    };

    let mut program = Program::new(code);
    program.name = name;
    program.origin = origin;
    program.wrap = wrap;
    program.labels = labels;
    Ok(program)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find(';'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn split_label(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    // `::` is the bit-reverse operator, not a label.
    if text[colon..].starts_with("::") {
        return None;
    }
    let label = &text[..colon];
    if label.split_whitespace().count() > 2 {
        return None;
    }
    Some((label, &text[colon + 1..]))
}

fn is_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(token: &str, defines: &BTreeMap<String, i64>, line: usize) -> Result<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(&value) = defines.get(digits) {
        Some(value)
    } else {
        digits.parse::<i64>().ok()
    };
    let value = parsed.ok_or_else(|| AsmError::new(line, format!("invalid value `{token}`")))?;
    Ok(if negative { -value } else { value })
}

fn parse_bounded(
    token: &str,
    defines: &BTreeMap<String, i64>,
    line: usize,
    range: std::ops::RangeInclusive<i64>,
    what: &str,
) -> Result<u8> {
    let value = parse_value(token, defines, line)?;
    if !range.contains(&value) {
        return Err(AsmError::new(
            line,
            format!("{what} {value} out of range {}..={}", range.start(), range.end()),
        ));
    }
    Ok(value as u8)
}

fn parse_instruction(
    text: &str,
    labels: &BTreeMap<String, u8>,
    defines: &BTreeMap<String, i64>,
    line: usize,
) -> Result<Instruction> {
    let (text, delay) = match text.rfind('[') {
        Some(open) => {
            let close = text[open..]
                .find(']')
                .ok_or_else(|| AsmError::new(line, "unterminated delay"))?;
            let delay = parse_bounded(
                text[open + 1..open + close].trim(),
                defines,
                line,
                0..=MAX_DELAY as i64,
                "delay",
            )?;
            (&text[..open], delay)
        }
        None => (text, 0),
    };

    let spaced = text.replace(',', " ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();
    let Some((&mnemonic, args)) = tokens.split_first() else {
        return Err(AsmError::new(line, "expected an instruction"));
    };
    let lower: Vec<String> = args.iter().map(|t| t.to_ascii_lowercase()).collect();
    let lower: Vec<&str> = lower.iter().map(String::as_str).collect();
    let bad = |what: &str| AsmError::new(line, format!("{mnemonic}: {what}"));
    let bit_count =
        |token: &str| parse_bounded(token, defines, line, 1..=32, "bit count");

    let operands = match mnemonic.to_ascii_lowercase().as_str() {
        "nop" => {
            if !args.is_empty() {
                return Err(bad("takes no operands"));
            }
            Instruction::nop().operands
        }
        "jmp" => {
            let (condition, target) = match args {
                [target] => (JmpCondition::Always, *target),
                // `x != y` may be written with spaces.
                [condition @ .., target] if !condition.is_empty() => {
                    let condition = parse_condition(&condition.concat().to_ascii_lowercase())
                        .ok_or_else(|| bad("unknown condition"))?;
                    (condition, *target)
                }
                _ => return Err(bad("expected `jmp [condition,] target`")),
            };
            let address = match labels.get(target) {
                Some(&address) => address,
                None => parse_bounded(target, defines, line, 0..=31, "jump target")
                    .map_err(|_| bad(&format!("unknown label `{target}`")))?,
            };
            InstructionOperands::Jmp { condition, address }
        }
        "wait" => {
            let [polarity, source, index, rest @ ..] = &lower[..] else {
                return Err(bad("expected `wait polarity source index`"));
            };
            let polarity = match *polarity {
                "0" => false,
                "1" => true,
                _ => return Err(bad("polarity must be 0 or 1")),
            };
            let relative = match rest {
                [] => false,
                ["rel"] => true,
                _ => return Err(bad("unexpected trailing operands")),
            };
            let source = match *source {
                "gpio" => WaitSource::Gpio(parse_bounded(index, defines, line, 0..=31, "gpio")?),
                "pin" => WaitSource::Pin(parse_bounded(index, defines, line, 0..=31, "pin")?),
                "irq" => {
                    let index = parse_bounded(index, defines, line, 0..=7, "irq")?;
                    WaitSource::Irq(if relative {
                        IrqIndex::relative(index)
                    } else {
                        IrqIndex::new(index)
                    })
                }
                _ => return Err(bad("unknown wait source")),
            };
            if relative && !matches!(source, WaitSource::Irq(_)) {
                return Err(bad("`rel` only applies to irq"));
            }
            InstructionOperands::Wait { polarity, source }
        }
        "in" => {
            let [source, count] = &lower[..] else {
                return Err(bad("expected `in source, count`"));
            };
            let source = match *source {
                "pins" => InSource::Pins,
                "x" => InSource::X,
                "y" => InSource::Y,
                "null" => InSource::Null,
                "isr" => InSource::Isr,
                "osr" => InSource::Osr,
                _ => return Err(bad("unknown source")),
            };
            InstructionOperands::In {
                source,
                bit_count: bit_count(*count)?,
            }
        }
        "out" => {
            let [destination, count] = &lower[..] else {
                return Err(bad("expected `out destination, count`"));
            };
            let destination = match *destination {
                "pins" => OutDestination::Pins,
                "x" => OutDestination::X,
                "y" => OutDestination::Y,
                "null" => OutDestination::Null,
                "pindirs" => OutDestination::PinDirs,
                "pc" => OutDestination::Pc,
                "isr" => OutDestination::Isr,
                "exec" => OutDestination::Exec,
                _ => return Err(bad("unknown destination")),
            };
            InstructionOperands::Out {
                destination,
                bit_count: bit_count(*count)?,
            }
        }
        "push" | "pull" => {
            let is_pull = mnemonic.eq_ignore_ascii_case("pull");
            let mut conditional = false;
            let mut block = true;
            for arg in &lower {
                match *arg {
                    "iffull" if !is_pull => conditional = true,
                    "ifempty" if is_pull => conditional = true,
                    "block" => block = true,
                    "noblock" => block = false,
                    _ => return Err(bad(&format!("unexpected operand `{arg}`"))),
                }
            }
            if is_pull {
                InstructionOperands::Pull {
                    if_empty: conditional,
                    block,
                }
            } else {
                InstructionOperands::Push {
                    if_full: conditional,
                    block,
                }
            }
        }
        "mov" => {
            let [destination, source @ ..] = &lower[..] else {
                return Err(bad("expected `mov destination, source`"));
            };
            let destination = match *destination {
                "pins" => MovDestination::Pins,
                "x" => MovDestination::X,
                "y" => MovDestination::Y,
                "exec" => MovDestination::Exec,
                "pc" => MovDestination::Pc,
                "isr" => MovDestination::Isr,
                "osr" => MovDestination::Osr,
                _ => return Err(bad("unknown destination")),
            };
            let source = source.concat();
            let (op, source) = if let Some(rest) = source.strip_prefix("::") {
                (MovOperation::BitReverse, rest)
            } else if let Some(rest) = source.strip_prefix(['~', '!']) {
                (MovOperation::Invert, rest)
            } else {
                (MovOperation::None, source.as_str())
            };
            let source = match source {
                "pins" => MovSource::Pins,
                "x" => MovSource::X,
                "y" => MovSource::Y,
                "null" => MovSource::Null,
                "status" => MovSource::Status,
                "isr" => MovSource::Isr,
                "osr" => MovSource::Osr,
                _ => return Err(bad("unknown source")),
            };
            InstructionOperands::Mov {
                destination,
                op,
                source,
            }
        }
        "irq" => {
            let (clear, wait, rest) = match &lower[..] {
                ["set" | "nowait", rest @ ..] => (false, false, rest),
                ["wait", rest @ ..] => (false, true, rest),
                ["clear", rest @ ..] => (true, false, rest),
                rest => (false, false, rest),
            };
            let (index, relative) = match rest {
                [index] => (*index, false),
                [index, "rel"] => (*index, true),
                _ => return Err(bad("expected `irq [mode] index [rel]`")),
            };
            let index = parse_bounded(index, defines, line, 0..=7, "irq")?;
            InstructionOperands::Irq {
                clear,
                wait,
                index: if relative {
                    IrqIndex::relative(index)
                } else {
                    IrqIndex::new(index)
                },
            }
        }
        "set" => {
            let [destination, value] = &lower[..] else {
                return Err(bad("expected `set destination, value`"));
            };
            let destination = match *destination {
                "pins" => SetDestination::Pins,
                "x" => SetDestination::X,
                "y" => SetDestination::Y,
                "pindirs" => SetDestination::PinDirs,
                _ => return Err(bad("unknown destination")),
            };
            InstructionOperands::Set {
                destination,
                data: parse_bounded(value, defines, line, 0..=31, "value")?,
            }
        }
        other => return Err(AsmError::new(line, format!("unknown instruction `{other}`"))),
    };

    Ok(Instruction { operands, delay })
}

fn parse_condition(token: &str) -> Option<JmpCondition> {
    Some(match token {
        "!x" => JmpCondition::XIsZero,
        "x--" => JmpCondition::XDecNonZero,
        "!y" => JmpCondition::YIsZero,
        "y--" => JmpCondition::YDecNonZero,
        "x!=y" => JmpCondition::XNotEqualY,
        "pin" => JmpCondition::PinHigh,
        "!osre" => JmpCondition::OsrNotEmpty,
        _ => return None,
    })
}
