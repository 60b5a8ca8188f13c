use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::Context;
use gumdrop::Options;
use serde::Serialize;

use brltab::attributes::symbols::symbols;
use brltab::attributes::{self, AttributesTable};
use brltab::config::TableConfig;
use brltab::contraction::{
    ContractionBackend, ContractionTableLoader, Translation, TranslationSession,
};
use brltab::paths::{list_tables, resolve, TableKind};
use brltab::types::{dots_to_char, Dots};
use brltab::vfs::Fs;

trait OutputWriter {
    fn write_translation(&mut self, text: &str, translation: &Translation);
    fn finish(&mut self) -> anyhow::Result<()>;
}

struct StdoutWriter;

impl OutputWriter for StdoutWriter {
    fn write_translation(&mut self, _text: &str, translation: &Translation) {
        println!("{}", translation.to_unicode());
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct TranslationResult {
    text: String,
    braille: String,
    #[serde(flatten)]
    translation: Translation,
}

#[derive(Serialize)]
struct JsonWriter {
    results: Vec<TranslationResult>,
}

impl JsonWriter {
    pub fn new() -> JsonWriter {
        JsonWriter { results: vec![] }
    }
}

impl OutputWriter for JsonWriter {
    fn write_translation(&mut self, text: &str, translation: &Translation) {
        self.results.push(TranslationResult {
            text: text.to_owned(),
            braille: translation.to_unicode(),
            translation: translation.clone(),
        });
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

#[derive(Debug, Options)]
struct Args {
    #[options(help = "print help message")]
    help: bool,

    #[options(no_short, long = "tables-dir", help = "root directory of the installed tables")]
    tables_dir: Option<PathBuf>,

    #[options(no_short, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[options(command)]
    command: Option<Command>,
}

#[derive(Debug, Options)]
enum Command {
    #[options(help = "translate text to braille with a contraction table")]
    Translate(TranslateArgs),

    #[options(help = "print the cells of an attribute table")]
    Attributes(AttributesArgs),

    #[options(help = "list the attribute names `dot` directives accept")]
    AttributeNames(AttributeNamesArgs),

    #[options(help = "list installed tables")]
    List(ListArgs),
}

#[derive(Debug, Options)]
struct TranslateArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "contraction table to use", required)]
    table: String,

    #[options(help = "character index of the cursor")]
    cursor: Option<usize>,

    #[options(help = "do not contract the word under the cursor")]
    expand: bool,

    #[options(no_short, long = "json", help = "output in JSON format")]
    use_json: bool,

    #[options(free, help = "text to be translated")]
    inputs: Vec<String>,
}

#[derive(Debug, Options)]
struct AttributesArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "attribute table to use", required)]
    table: String,

    #[options(free, help = "attribute values, decimal or 0x-prefixed hex")]
    values: Vec<String>,
}

#[derive(Debug, Options)]
struct AttributeNamesArgs {
    #[options(help = "print help message")]
    help: bool,
}

#[derive(Debug, Options)]
struct ListArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "only list tables of this kind (attributes, contraction)")]
    kind: Option<TableKind>,
}

fn read_input(inputs: Vec<String>) -> anyhow::Result<String> {
    if !inputs.is_empty() {
        return Ok(inputs.join(" "));
    }

    eprintln!("Reading from stdin...");
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn translate(config: TableConfig, args: TranslateArgs) -> anyhow::Result<()> {
    let text = read_input(args.inputs)?;

    let loader = ContractionTableLoader::new(config.clone());
    let table = loader
        .load(&args.table)
        .with_context(|| format!("loading contraction table `{}`", args.table))?;

    let mut session = TranslationSession::new(&config);
    session.expand_current_word |= args.expand;
    session.set_cursor(args.cursor);

    let mut writer: Box<dyn OutputWriter> = if args.use_json {
        Box::new(JsonWriter::new())
    } else {
        Box::new(StdoutWriter)
    };

    for line in text.lines() {
        let translation = table.translate(&mut session, line)?;
        writer.write_translation(line, &translation);
    }

    writer.finish()?;
    table.destroy();
    Ok(())
}

fn parse_attribute(value: &str) -> anyhow::Result<u8> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid attribute value `{}`", value))
}

fn dot_numbers(dots: Dots) -> String {
    let numbers: String = (0..8u8)
        .filter(|dot| dots & (1 << dot) != 0)
        .map(|dot| char::from(b'1' + dot))
        .collect();

    if numbers.is_empty() {
        "0".to_string()
    } else {
        numbers
    }
}

fn lookup_attributes(config: TableConfig, args: AttributesArgs) -> anyhow::Result<()> {
    let path = resolve(&config.tables_directory, TableKind::Attributes, &args.table);
    let table = if path.extension().map_or(false, |e| e == attributes::COMPILED_EXTENSION) {
        AttributesTable::open(&Fs, &path)?
    } else {
        let compiled = AttributesTable::compile(&config, &args.table)
            .with_context(|| format!("compiling attribute table `{}`", args.table))?;
        for diagnostic in &compiled.diagnostics {
            eprintln!("warning: {}", diagnostic);
        }
        compiled.table
    };

    let values: Vec<u8> = if args.values.is_empty() {
        (0..=u8::MAX).collect()
    } else {
        args.values
            .iter()
            .map(|v| parse_attribute(v))
            .collect::<anyhow::Result<_>>()?
    };

    for value in values {
        let dots = table.dots_for(value);
        println!("{:#04x}\t{}\t{}", value, dots_to_char(dots), dot_numbers(dots));
    }

    table.destroy();
    Ok(())
}

fn attribute_names() {
    for (name, bit) in symbols() {
        println!("{}\t{:#04x}", name, bit);
    }
}

fn list(config: TableConfig, args: ListArgs) -> anyhow::Result<()> {
    let kinds = match args.kind {
        Some(kind) => vec![kind],
        None => vec![TableKind::Attributes, TableKind::Contraction],
    };

    for kind in kinds {
        for path in list_tables(&config.tables_directory, kind) {
            let name = path.file_stem().unwrap_or_default().to_string_lossy();
            println!("{}\t{}\t{}", kind.subdirectory(), name, path.display());
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse_args_default_or_exit();

    let mut config = match &args.config {
        Some(path) => TableConfig::from_path(path)?,
        None => TableConfig::default(),
    };
    if let Some(dir) = args.tables_dir {
        config.tables_directory = dir;
    }

    match args.command {
        None => Ok(()),
        Some(Command::Translate(args)) => translate(config, args),
        Some(Command::Attributes(args)) => lookup_attributes(config, args),
        Some(Command::AttributeNames(_)) => {
            attribute_names();
            Ok(())
        }
        Some(Command::List(args)) => list(config, args),
    }
}
