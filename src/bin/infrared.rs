//! CLI entry point (§6): reads NMF from stdin, a script from a file
//! argument, writes the compiled Standard MIDI File to stdout, and
//! optionally writes a section/delta-moment map to `--map`. This is the
//! only place in the crate allowed to call `std::process::exit`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use infrared::context::Context;
use infrared::error::InfraredError;
use infrared::interp::Interpreter;
use infrared::limits::Limits;
use infrared::midi::smf;
use infrared::nmf::StaticNmf;
use infrared::script::SourceTokenizer;

#[derive(Parser, Debug)]
#[command(name = "infrared", about = "Compile NMF + script into a Standard MIDI File")]
struct Cli {
    /// Script source file.
    script: PathBuf,

    /// Optional path to write `<section>:<delta-moment>/3` map lines to.
    #[arg(long = "map")]
    map: Option<PathBuf>,

    /// Optional TOML config overriding capacity limits and feature toggles.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FileConfig {
    keyboard_overlap_pass: Option<bool>,
    limits: Option<PartialLimits>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct PartialLimits {
    value_stack: Option<usize>,
    groups: Option<usize>,
    bank: Option<usize>,
    ruler_stack: Option<usize>,
    graph_nodes: Option<usize>,
    set_entries: Option<usize>,
    blob_bytes: Option<usize>,
    text_chars: Option<usize>,
    ops: Option<usize>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

fn apply_limits(base: Limits, partial: &PartialLimits) -> Limits {
    Limits {
        value_stack: partial.value_stack.unwrap_or(base.value_stack),
        groups: partial.groups.unwrap_or(base.groups),
        bank: partial.bank.unwrap_or(base.bank),
        ruler_stack: partial.ruler_stack.unwrap_or(base.ruler_stack),
        graph_nodes: partial.graph_nodes.unwrap_or(base.graph_nodes),
        set_entries: partial.set_entries.unwrap_or(base.set_entries),
        blob_bytes: partial.blob_bytes.unwrap_or(base.blob_bytes),
        text_chars: partial.text_chars.unwrap_or(base.text_chars),
        ops: partial.ops.unwrap_or(base.ops),
    }
    .clamped()
}

/// `-map`: one line per NMF section as `<section>:<delta-moment/3>`, each
/// section's base offset relative to the compiled range's lower bound,
/// converted from moments to subquanta by integer division (§6).
fn write_section_map(path: &PathBuf, nmf: &StaticNmf, range_lower_moment: i32) -> anyhow::Result<()> {
    use infrared::nmf::NmfSource;
    let mut out = String::new();
    for section in 0..nmf.section_count() {
        let base_quanta = nmf.section_base_quanta(section);
        let base_moment = (base_quanta as i64) * 24;
        let delta = (base_moment - range_lower_moment as i64).max(0);
        out.push_str(&format!("{section}:{}\n", delta / 3));
    }
    fs::write(path, out)?;
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let mut limits = Limits::default();
    if let Some(partial) = &config.limits {
        limits = apply_limits(limits, partial);
    }

    let mut script_source = fs::read_to_string(&cli.script)?;
    // A trailing newline keeps the tokenizer's line counter aligned with a
    // file that doesn't end in one; harmless if it already does.
    if !script_source.ends_with('\n') {
        script_source.push('\n');
    }

    let mut nmf_text = String::new();
    io::stdin().read_to_string(&mut nmf_text)?;
    let nmf = parse_static_nmf(&nmf_text)?;

    let mut ctx = Context::new(limits);
    ctx.render_pipeline = infrared::render::RenderPipeline::new(config.keyboard_overlap_pass.unwrap_or(false));

    let mut interp = Interpreter::new(&ctx);
    let mut tokenizer = SourceTokenizer::new(&script_source);
    interp.run(&mut tokenizer, &mut ctx, &nmf)?;

    let bytes = smf::serialize(&ctx.midi)?;
    io::stdout().write_all(&bytes)?;

    if let Some(map_path) = &cli.map {
        write_section_map(map_path, &nmf, ctx.midi.range_lower() * 3)?;
    }

    Ok(())
}

/// Minimal NMF reader for the CLI: one note per line as
/// `t dur pitch art sect layer_i`, first line `quantum_basis section_count
/// section_base_quanta...`. A real NMF parser is an external collaborator
/// per §6; this is enough to run the binary end to end.
fn parse_static_nmf(text: &str) -> anyhow::Result<StaticNmf> {
    use infrared::nmf::NmfNoteIn;

    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| anyhow::anyhow!("empty NMF input"))?;
    let mut header_fields = header.split_whitespace();
    let quantum_basis: i32 = header_fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("missing quantum basis in NMF header"))?
        .parse()?;
    let section_count: usize = header_fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("missing section count in NMF header"))?
        .parse()?;
    let mut section_base_quanta = Vec::with_capacity(section_count);
    for _ in 0..section_count {
        let base: i32 = header_fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing section base quanta in NMF header"))?
            .parse()?;
        section_base_quanta.push(base);
    }

    let mut notes = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let mut next_field = |name: &str| -> anyhow::Result<i32> {
            fields
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing NMF note field '{name}'"))?
                .parse::<i32>()
                .map_err(anyhow::Error::from)
        };
        notes.push(NmfNoteIn {
            t: next_field("t")?,
            dur: next_field("dur")?,
            pitch: next_field("pitch")?,
            art: next_field("art")?,
            sect: next_field("sect")?,
            layer_i: next_field("layer_i")?,
        });
    }

    Ok(StaticNmf::new(section_base_quanta, quantum_basis, notes)?)
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        let code = err.downcast_ref::<InfraredError>().map(InfraredError::exit_code).unwrap_or(1);
        eprintln!("{err}");
        std::process::exit(code);
    }
}
