use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use structopt::StructOpt;

use brltab::attributes;
use brltab::contraction::{self, compile, NativeTable};
use brltab::datafile::Diagnostic;
use brltab::paths::TableKind;
use brltab::vfs::Fs;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "brltab-tools",
    about = "Braille table toolkit: compile sources to binary tables."
)]
enum Opts {
    #[structopt(about = "Compile a contraction table source to a .bctb blob")]
    CompileContraction {
        #[structopt(parse(from_os_str))]
        from: PathBuf,

        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,

        #[structopt(long, help = "fail when the compiled table would exceed this size")]
        arena_limit: Option<usize>,
    },

    #[structopt(about = "Compile an attribute table source to its 256 cells")]
    CompileAttributes {
        #[structopt(parse(from_os_str))]
        from: PathBuf,

        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },

    #[structopt(about = "Print statistics of a contraction table (source or blob)")]
    Info {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },
}

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("warning: {}", diagnostic);
    }
}

fn compile_contraction(
    from: &Path,
    output: Option<PathBuf>,
    arena_limit: Option<usize>,
) -> anyhow::Result<()> {
    println!("Compiling {:?}...", from);
    let compiled = compile::compile_file(&Fs, from, arena_limit)?;
    report(&compiled.diagnostics);

    let output = output.unwrap_or_else(|| from.with_extension(contraction::COMPILED_EXTENSION));
    let file = File::create(&output).with_context(|| format!("creating {:?}", output))?;
    let mut writer = BufWriter::new(file);
    compiled.table.write_to(&mut writer)?;
    writer.flush()?;

    let stats = compiled.table.stats();
    println!(
        "Wrote {} rules, {} bytes to {:?}.",
        stats.rules, stats.size, output
    );
    Ok(())
}

fn compile_attributes(from: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Compiling {:?}...", from);
    let compiled = attributes::compile::compile_file(&Fs, from, None)?;
    report(&compiled.diagnostics);

    let output = output.unwrap_or_else(|| from.with_extension(attributes::COMPILED_EXTENSION));
    let file = File::create(&output).with_context(|| format!("creating {:?}", output))?;
    let mut writer = BufWriter::new(file);
    compiled.table.write_to(&mut writer)?;
    writer.flush()?;

    println!("Wrote {:?}.", output);
    Ok(())
}

fn info(path: &Path) -> anyhow::Result<()> {
    let is_source = path
        .extension()
        .map_or(false, |e| e == TableKind::Contraction.extension());

    let table: NativeTable = if is_source {
        let compiled = compile::compile_file(&Fs, path, None)?;
        report(&compiled.diagnostics);
        compiled.table
    } else {
        NativeTable::open(&Fs, path)?
    };

    println!("{}", serde_json::to_string_pretty(&table.stats())?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::from_args();

    match opts {
        Opts::CompileContraction {
            from,
            output,
            arena_limit,
        } => compile_contraction(&from, output, arena_limit),
        Opts::CompileAttributes { from, output } => compile_attributes(&from, output),
        Opts::Info { path } => info(&path),
    }
}
