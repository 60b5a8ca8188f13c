//! Contraction delegated to a helper program.
//!
//! The helper is started on first use and kept running. Each translation is
//! one request written to its standard input and one response read from its
//! standard output, both as `key=value` lines ended by an empty line.
//!
//! Request:
//!
//! ```text
//! cursor-position=3
//! expand-current-word=0
//! capitalization-mode=0
//! maximum-length=4096
//! text=the cat
//!
//! ```
//!
//! Response (`output-offsets` and `capitalization-mode` are optional, unknown
//! keys are ignored):
//!
//! ```text
//! consumed-length=7
//! output-cells=2e,00,09,01,1e
//! output-offsets=0,3,4,5,6
//!
//! ```
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use parking_lot::Mutex;

use super::session::{CapitalizationState, Translation, TranslationSession};
use super::ContractionBackend;
use crate::error::TranslateError;
use crate::types::Dots;

pub struct ExternalTable {
    program: PathBuf,
    args: Vec<OsString>,
    state: Mutex<HelperState>,
}

enum HelperState {
    NotStarted,
    Running(HelperProcess),
    /// A spawn or exchange failed; the table stays unusable.
    Failed,
}

impl std::fmt::Debug for ExternalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            HelperState::NotStarted => "not started",
            HelperState::Running(_) => "running",
            HelperState::Failed => "failed",
        };
        f.debug_struct("ExternalTable")
            .field("program", &self.program)
            .field("state", &state)
            .finish()
    }
}

impl ExternalTable {
    pub fn new(program: impl Into<PathBuf>) -> ExternalTable {
        ExternalTable::with_args(program, Vec::<OsString>::new())
    }

    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> ExternalTable
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        ExternalTable {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            state: Mutex::new(HelperState::NotStarted),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), HelperState::Running(_))
    }
}

impl ContractionBackend for ExternalTable {
    fn translate(
        &self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError> {
        let mut state = self.state.lock();

        let mut process = match std::mem::replace(&mut *state, HelperState::Failed) {
            HelperState::Failed => return Err(TranslateError::HelperFailed),
            HelperState::Running(process) => process,
            HelperState::NotStarted => {
                log::debug!("starting contraction helper {}", self.program.display());
                HelperProcess::spawn(&self.program, &self.args).map_err(|e| {
                    log::warn!("{}", e);
                    e
                })?
            }
        };

        match process.translate(session, text) {
            Ok(translation) => {
                *state = HelperState::Running(process);
                Ok(translation)
            }
            Err(e) => {
                log::warn!(
                    "contraction helper {} failed: {}",
                    self.program.display(),
                    e
                );
                process.kill();
                Err(e)
            }
        }
    }
}

impl Drop for ExternalTable {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), HelperState::Failed);
        if let HelperState::Running(process) = state {
            log::debug!("stopping contraction helper {}", self.program.display());
            process.kill();
        }
    }
}

struct HelperProcess {
    child: Child,
    input: BufWriter<ChildStdin>,
    output: BufReader<ChildStdout>,
}

impl HelperProcess {
    fn spawn(program: &Path, args: &[OsString]) -> Result<HelperProcess, TranslateError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TranslateError::HelperSpawn {
                path: program.to_path_buf(),
                source,
            })?;

        match (child.stdin.take(), child.stdout.take()) {
            (Some(input), Some(output)) => Ok(HelperProcess {
                child,
                input: BufWriter::new(input),
                output: BufReader::new(output),
            }),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                Err(TranslateError::HelperProtocol(
                    "helper pipes unavailable".into(),
                ))
            }
        }
    }

    fn translate(
        &mut self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError> {
        let request = encode_request(session, text);
        self.input
            .write_all(request.as_bytes())
            .and_then(|_| self.input.flush())
            .map_err(TranslateError::HelperIo)?;

        let mut lines = vec![];
        loop {
            let mut line = String::new();
            let read = self
                .output
                .read_line(&mut line)
                .map_err(TranslateError::HelperIo)?;
            if read == 0 {
                return Err(TranslateError::HelperProtocol(
                    "helper closed its output".into(),
                ));
            }

            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            if line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        }

        let response = Response::parse(lines.iter().map(String::as_str))?;
        let translation = Translation::validated(
            response.cells,
            response.offsets,
            response.consumed,
            text.chars().count(),
            session.capacity,
        )
        .map_err(|e| TranslateError::HelperProtocol(e.to_string()))?;

        if let Some(capitalization) = response.capitalization {
            session.capitalization = capitalization;
        }

        Ok(translation)
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            ch => escaped.push(ch),
        }
    }
    escaped
}

fn encode_request(session: &TranslationSession, text: &str) -> String {
    let mut request = String::new();

    if let Some(cursor) = session.cursor {
        let _ = writeln!(request, "cursor-position={}", cursor);
    }
    let _ = writeln!(
        request,
        "expand-current-word={}",
        session.expand_current_word as u8
    );
    let _ = writeln!(
        request,
        "capitalization-mode={}",
        session.capitalization.to_u8()
    );
    let _ = writeln!(request, "maximum-length={}", session.capacity);
    let _ = writeln!(request, "text={}", escape(text));
    request.push('\n');

    request
}

#[derive(Debug, PartialEq)]
struct Response {
    consumed: usize,
    cells: Vec<Dots>,
    offsets: Vec<usize>,
    capitalization: Option<CapitalizationState>,
}

fn protocol(message: String) -> TranslateError {
    TranslateError::HelperProtocol(message)
}

fn parse_number(key: &str, value: &str) -> Result<usize, TranslateError> {
    value
        .trim()
        .parse()
        .map_err(|_| protocol(format!("bad {} `{}`", key, value)))
}

fn parse_list<T>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, TranslateError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse(item).ok_or_else(|| protocol(format!("bad {} entry `{}`", key, item))))
        .collect()
}

impl Response {
    fn parse<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Response, TranslateError> {
        let mut consumed = None;
        let mut cells = None;
        let mut offsets = None;
        let mut capitalization = None;

        for line in lines {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| protocol(format!("malformed line `{}`", line)))?;

            match key {
                "consumed-length" => consumed = Some(parse_number(key, value)?),
                "output-cells" => {
                    cells = Some(parse_list(key, value, |item| {
                        u8::from_str_radix(item, 16).ok()
                    })?)
                }
                "output-offsets" => {
                    offsets = Some(parse_list(key, value, |item| item.parse().ok())?)
                }
                "capitalization-mode" => {
                    let mode = parse_number(key, value)?;
                    capitalization = Some(
                        u8::try_from(mode)
                            .ok()
                            .and_then(CapitalizationState::from_u8)
                            .ok_or_else(|| protocol(format!("bad {} `{}`", key, value)))?,
                    );
                }
                other => log::trace!("ignoring helper response key `{}`", other),
            }
        }

        let consumed = consumed.ok_or_else(|| protocol("missing consumed-length".into()))?;
        let cells: Vec<Dots> = cells.ok_or_else(|| protocol("missing output-cells".into()))?;
        let offsets = offsets.unwrap_or_else(|| vec![0; cells.len()]);

        Ok(Response {
            consumed,
            cells,
            offsets,
            capitalization,
        })
    }
}
