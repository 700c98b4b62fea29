#![allow(clippy::upper_case_acronyms)]

use anyhow::{Context, Result, bail, format_err};
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use encoding::all::encodings;
use encoding::types::Encoding;
use indoc::indoc;
use log::{Level, debug, info};
use serde::Serialize;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use wps::{ParserSettings, PropertyStore, WpsParser};

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WpsOutputFormat {
    JSON,
    JSONL,
}

#[derive(Clone, Debug)]
enum Input {
    Stdin,
    Path(PathBuf),
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin => write!(f, "-"),
            Input::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Serialize)]
struct DumpRecord<'a> {
    source: String,
    #[serde(flatten)]
    store: &'a PropertyStore,
}

struct WpsDump {
    parser_settings: ParserSettings,
    inputs: Vec<Input>,
    offset: u64,
    num_threads: usize,
    output_format: WpsOutputFormat,
    output: Box<dyn Write>,
    verbosity_level: Option<Level>,
}

impl WpsDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let patterns: Vec<&String> = matches
            .get_many::<String>("INPUT")
            .map(|values| values.collect())
            .unwrap_or_default();
        let inputs = expand_inputs(&patterns)?;

        let output_format = match matches.get_one::<String>("output-format").map(String::as_str) {
            Some("jsonl") => WpsOutputFormat::JSONL,
            _ => WpsOutputFormat::JSON,
        };

        let num_threads = *matches.get_one::<usize>("num-threads").unwrap_or(&0);
        let num_threads = match (cfg!(feature = "multithreading"), num_threads) {
            (true, number) => number,
            (false, 1) => 1,
            (false, _) => {
                eprintln!(
                    "turned on threads, but wps_dump was compiled without `multithreading` feature! decoding inputs one at a time"
                );
                1
            }
        };

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(Level::Info),
            2 => Some(Level::Debug),
            3 => Some(Level::Trace),
            _ => {
                eprintln!("using more than -vvv does not affect verbosity level");
                Some(Level::Trace)
            }
        };

        let codec_name = matches
            .get_one::<String>("ansi-codec")
            .map(String::as_str)
            .unwrap_or(encoding::all::WINDOWS_1252.name());
        let ansi_codec = *encodings()
            .iter()
            .find(|c| c.name() == codec_name)
            .ok_or_else(|| format_err!("unknown ansi codec `{codec_name}`"))?;

        let output: Box<dyn Write> = match matches.get_one::<String>("output-target") {
            Some(path) => {
                let file = Self::create_output_file(
                    path,
                    !matches.get_flag("no-confirm-overwrite"),
                )
                .with_context(|| format!("An error occurred while creating output file at `{path}`"))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout())),
        };

        Ok(WpsDump {
            parser_settings: ParserSettings::new().ansi_codec(ansi_codec),
            inputs,
            offset: *matches.get_one::<u64>("offset").unwrap_or(&0),
            num_threads,
            output_format,
            output,
            verbosity_level,
        })
    }

    /// Main entry point for `WpsDump`.
    ///
    /// Returns whether every input decoded.
    pub fn run(&mut self) -> Result<bool> {
        self.try_to_initialize_logging();

        let results = self.decode_all()?;
        let mut all_decoded = true;

        for (input, result) in &results {
            match result {
                Ok(store) => self.dump_store(input, store)?,
                Err(e) => {
                    all_decoded = false;
                    eprintln!("{e:?}");
                }
            }
        }
        self.output.flush()?;

        Ok(all_decoded)
    }

    /// Decodes every input, results are in input order.
    fn decode_all(&self) -> Result<Vec<(Input, Result<PropertyStore>)>> {
        // `self` holds the output writer, which must stay on this thread.
        let inputs = &self.inputs;
        let settings = &self.parser_settings;
        let offset = self.offset;
        let decode = |input: &Input| (input.clone(), decode_one(input, settings, offset));

        #[cfg(feature = "multithreading")]
        {
            use rayon::prelude::*;

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build()
                .context("Failed to start worker threads")?;
            Ok(pool.install(|| inputs.par_iter().map(decode).collect()))
        }

        #[cfg(not(feature = "multithreading"))]
        {
            Ok(inputs.iter().map(decode).collect())
        }
    }

    fn dump_store(&mut self, input: &Input, store: &PropertyStore) -> Result<()> {
        let record = DumpRecord {
            source: input.to_string(),
            store,
        };
        match self.output_format {
            WpsOutputFormat::JSON => {
                serde_json::to_writer_pretty(&mut self.output, &record)?;
            }
            WpsOutputFormat::JSONL => {
                serde_json::to_writer(&mut self.output, &record)?;
            }
        }
        writeln!(self.output)?;
        Ok(())
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() {
            if prompt {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Are you sure you want to override output file at {}",
                        p.display()
                    ))
                    .default(false)
                    .interact()
                    .context("Failed to write confirmation prompt to term")?;
                if !confirmed {
                    bail!("Cancelled");
                }
            }
            return Ok(File::create(p)?);
        }

        // Ok to assume p is not an existing directory
        match p.parent() {
            Some(parent) => {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
                Ok(File::create(p)?)
            }
            None => bail!("Output file cannot be root."),
        }
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level.to_level_filter(),
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {e}");
            }
        }
    }
}

fn decode_one(input: &Input, settings: &ParserSettings, offset: u64) -> Result<PropertyStore> {
    let parser = match input {
        Input::Stdin => {
            let mut data = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .context("Failed to read stdin")?;
            WpsParser::from_buffer(data)
        }
        Input::Path(path) => WpsParser::from_path(path)
            .with_context(|| format!("Failed to open file {}", path.display()))?,
    };
    let parser = parser.with_configuration(settings.clone());

    let store = parser
        .parse_at(offset)
        .with_context(|| format!("Failed to decode property store in {input}"))?;
    debug!("{input}: {} storages", store.storages.len());
    if store.has_failures() {
        info!("{input}: the property store was only partially decoded");
    }

    Ok(store)
}

fn is_glob_pattern(value: &str) -> bool {
    value.contains(['*', '?', '['])
}

fn expand_inputs(patterns: &[&String]) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();

    for pattern in patterns {
        if pattern.as_str() == "-" {
            inputs.push(Input::Stdin);
        } else if is_glob_pattern(pattern) {
            let before = inputs.len();
            for entry in
                glob::glob(pattern).with_context(|| format!("invalid glob pattern `{pattern}`"))?
            {
                match entry {
                    Ok(path) if path.is_file() => inputs.push(Input::Path(path)),
                    Ok(_) => {}
                    Err(e) => eprintln!("glob entry error: {e}"),
                }
            }
            if inputs.len() == before {
                bail!("glob pattern `{pattern}` did not match any file");
            }
        } else {
            inputs.push(Input::Path(PathBuf::from(pattern)));
        }
    }

    if inputs.is_empty() {
        bail!("No inputs provided.");
    }
    Ok(inputs)
}

/// Accepts decimal or `0x` prefixed hexadecimal offsets.
fn parse_offset(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| format!("`{value}` is not a valid offset"))
}

fn command() -> Command {
    let ansi_codecs: Vec<&'static str> = encodings()
        .iter()
        .filter(|&e| e.raw_decoder().is_ascii_compatible())
        .map(|e| e.name())
        .collect();

    Command::new("WPS Parser")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to decode serialized Windows Property Stores")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .action(ArgAction::Append)
                .help("Input files, glob patterns, or `-` to read stdin."),
        )
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .default_value("0")
                .value_parser(clap::value_parser!(usize))
                .help("Sets the number of worker threads, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["json", "jsonl"])
                .default_value("json")
                .help("Sets the output format")
                .long_help(indoc!(
                    r#"
                    Sets the output format:
                        "json"  - one indented document per input.
                        "jsonl" - one line per input.
                    "#
                )),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .value_name("FILE")
                .help(indoc!(
                    "Writes output to the file specified instead of stdout, errors will still be printed to stderr.
                     Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`
                     Will create parent directories if needed."
                )),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .value_name("N")
                .default_value("0")
                .value_parser(parse_offset)
                .help("Byte offset of the property store inside each input, decimal or `0x` hex."),
        )
        .arg(
            Arg::new("ansi-codec")
                .long("ansi-codec")
                .value_parser(PossibleValuesParser::new(ansi_codecs))
                .default_value(encoding::all::WINDOWS_1252.name())
                .help("When set, controls the codec of ansi encoded (`VT_LPSTR`) strings."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help(indoc!(
                    "-v - info, -vv - debug, -vvv - trace.
                     trace output is only available in debug builds, as it is extremely verbose"
                )),
        )
}

fn main() {
    let matches = command().get_matches();

    let mut app = match WpsDump::from_cli_matches(&matches) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{e:?}");
            exit(1)
        }
    };

    match app.run() {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            eprintln!("{e:?}");
            exit(1)
        }
    }
}
