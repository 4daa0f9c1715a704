#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pio_interp::bf::{self, BfRunner};
use pio_interp::{build, Interpreter, InterpreterConfig, Variant, VariantKind};
use pio_sm::{pioasm, GpioBank};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Minimal,
    Standard,
    Full,
}

impl From<VariantArg> for VariantKind {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Minimal => VariantKind::Minimal,
            VariantArg::Standard => VariantKind::Standard,
            VariantArg::Full => VariantKind::Full,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "PIO command-dispatch interpreter tools", version)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print a variant's dispatch program and its field table.
    Listing {
        #[arg(long, value_enum, default_value = "full")]
        variant: VariantArg,
    },
    /// Send raw command words to an interpreter on ideal GPIO and report the result.
    Exec {
        /// Command words, decimal or `0x` hex.
        #[arg(required = true, value_parser = parse_word)]
        words: Vec<u32>,

        #[arg(long, value_enum, default_value = "full")]
        variant: VariantArg,

        /// Cycle budget per command word.
        #[arg(long, default_value_t = 100_000)]
        max_cycles: u64,

        /// Print the final registers and responses as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Assemble a pioasm source file into instruction words.
    Assemble {
        file: PathBuf,

        /// Print a disassembly alongside the words.
        #[arg(long)]
        listing: bool,
    },
    /// Compile a Brainfuck file to full-variant command words.
    Encode {
        file: PathBuf,

        /// Where to write the hex listing (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a Brainfuck file on the interpreter over a serial link.
    Run {
        file: PathBuf,

        /// Bytes read by `,`. Reads past the end yield 0.
        #[arg(long, default_value = "")]
        input: String,

        /// Interpreter settings (JSON). Command-line limits override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cycle budget per Brainfuck op.
        #[arg(long)]
        max_cycles: Option<u64>,

        #[arg(long)]
        step_limit: Option<u64>,
    },
}

fn parse_word(text: &str) -> std::result::Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid command word `{text}`: {err}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Cmd::Listing { variant } => listing(variant.into()),
        Cmd::Exec {
            words,
            variant,
            max_cycles,
            json,
        } => exec(variant.into(), &words, max_cycles, json),
        Cmd::Assemble { file, listing } => assemble(&file, listing),
        Cmd::Encode { file, output } => encode(&file, output.as_deref()),
        Cmd::Run {
            file,
            input,
            config,
            max_cycles,
            step_limit,
        } => run(&file, input.as_bytes(), config.as_deref(), max_cycles, step_limit),
    }
}

fn listing(kind: VariantKind) -> Result<()> {
    let layout = build(Variant::from(kind))?;
    let mut out = io::stdout().lock();
    writeln!(out, "; {}", layout.program.name.as_deref().unwrap_or("pio_interp"))?;
    write!(out, "{}", layout.program.listing(0))?;
    writeln!(out)?;
    writeln!(out, "; field  micro-op")?;
    for (field, op) in layout.table.entries().iter().enumerate() {
        writeln!(out, "; {field:>5}  {op}")?;
    }
    Ok(())
}

fn exec(kind: VariantKind, words: &[u32], max_cycles: u64, json: bool) -> Result<()> {
    let mut interp = Interpreter::new(Variant::from(kind), 0, GpioBank::new())?;
    let mut responses = Vec::new();
    let mut decoded = Vec::with_capacity(words.len());
    for &word in words {
        decoded.push((word, interp.table().fields(word)));
        interp.submit(word)?;
        interp
            .run_until_idle(max_cycles)
            .with_context(|| format!("command word {word:#010x}"))?;
        if !interp.is_idle() {
            bail!(
                "command word {word:#010x} left the interpreter stalled ({:?})",
                interp.stall_reason()
            );
        }
        responses.extend(std::iter::from_fn(|| interp.try_recv()));
    }

    let regs = interp.registers();
    if json {
        let commands: Vec<_> = decoded
            .iter()
            .map(|(word, fields)| {
                let fields: Vec<_> = fields
                    .iter()
                    .map(|(field, op)| serde_json::json!({ "field": field, "op": op }))
                    .collect();
                serde_json::json!({ "word": word, "fields": fields })
            })
            .collect();
        let report = serde_json::json!({
            "commands": commands,
            "registers": regs,
            "responses": responses,
            "pins": interp.pins().outputs(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (word, fields) in &decoded {
            let ops: Vec<_> = fields.iter().map(|(_, op)| op.name()).collect();
            println!("{word:#010x}: {}", ops.join(" "));
        }
        println!("x = {:#010x}", regs.x);
        println!("y = {:#010x}", regs.y);
        println!("pc = {}", regs.pc);
        for response in responses {
            println!("response {response:#010x}");
        }
    }
    Ok(())
}

fn assemble(file: &Path, with_listing: bool) -> Result<()> {
    let src =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let program = pioasm::parse_program(&src).with_context(|| format!("{}", file.display()))?;
    info!(len = program.len(), "assembled");
    if with_listing {
        print!("{}", program.listing(program.origin.unwrap_or(0)));
    } else {
        for word in &program.code {
            println!("0x{word:04x}");
        }
    }
    Ok(())
}

fn encode(file: &Path, output: Option<&Path>) -> Result<()> {
    let src =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let program = bf::parse(&src)?;
    let layout = build(Variant::full())?;
    let listing = bf::hex_listing(&program.encode(&layout)?);
    match output {
        Some(path) => fs::write(path, listing)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{listing}"),
    }
    Ok(())
}

fn run(
    file: &Path,
    input: &[u8],
    config: Option<&Path>,
    max_cycles: Option<u64>,
    step_limit: Option<u64>,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            InterpreterConfig::from_json(&text).with_context(|| format!("{}", path.display()))?
        }
        None => InterpreterConfig::default(),
    };
    if let Some(max_cycles) = max_cycles {
        cfg.max_cycles = max_cycles;
    }
    if let Some(step_limit) = step_limit {
        cfg.step_limit = step_limit;
    }

    let src =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let program = bf::parse(&src)?;
    let mut runner = BfRunner::from_config(&cfg)?;
    let outcome = runner.run(&program, input)?;
    info!(steps = outcome.steps, x = outcome.x, y = outcome.y, "program finished");

    let mut out = io::stdout().lock();
    out.write_all(&outcome.output)?;
    out.flush()?;
    Ok(())
}
