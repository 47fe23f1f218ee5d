use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use bumpalo::Bump;
use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
pub(crate) use pebble_lex as lex;

use crate::compiler::parse_init_state;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::LogLevel;
use crate::stream::SourceStream;
use crate::vm::Outcome;

pub mod bytecode;
pub mod compiler;
pub mod diagnostics;
pub mod parse;
pub mod stream;
pub mod value;
pub mod vm;

const COPYRIGHT: &str = "Pebble - Copyright (c) 2026 The Pebble developers";

pub trait AllocPath {
    fn alloc_path(&self, path: impl AsRef<Path>) -> &Path;
}

impl AllocPath for Bump {
    fn alloc_path(&self, path: impl AsRef<Path>) -> &Path {
        Path::new(unsafe {
            OsStr::from_encoded_bytes_unchecked(
                self.alloc_slice_copy(path.as_ref().as_os_str().as_encoded_bytes()),
            )
        })
    }
}

pub trait Report {
    fn print(&self);
    fn exit_code(&self) -> i32;
}

impl<'a, T> From<T> for Box<dyn Report + 'a>
where
    T: Report + 'a,
{
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

impl Report for clap::Error {
    fn print(&self) {
        clap::Error::print(self).ok();
    }

    fn exit_code(&self) -> i32 {
        1
    }
}

struct NoProgram;

impl Report for NoProgram {
    fn print(&self) {
        eprintln!("pebble: no program file given");
    }

    fn exit_code(&self) -> i32 {
        1
    }
}

/// Pebble
#[derive(Debug, Parser)]
#[command(name = "pebble", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// print the version and exit
    #[arg(short = 'v', long)]
    version: bool,
    /// print the copyright line and exit
    #[arg(short = 'c', long)]
    copyright: bool,
    /// print bytecode disassembly after compiling
    #[arg(short = 'V', long)]
    verbose: bool,
    /// print this help text and exit
    #[arg(short = 'h', long)]
    help: bool,
    /// run one line of program source instead of FILE
    #[arg(short = 'e', long, value_name = "SOURCE")]
    evaluate: Option<String>,
    /// diagnostics below this level are suppressed
    #[arg(short = 'l', long, value_enum, default_value_t)]
    loglevel: LogLevel,
    /// map VM failures to a nonzero exit status
    #[arg(long)]
    strict: bool,
    /// program file to run
    filename: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Banner {
    Version,
    Copyright,
    Help,
}

/// Picks the informational flag that should short-circuit the run: the first
/// one given on the command line wins.
fn terminal_banner(args: &Args, matches: &clap::ArgMatches) -> Option<Banner> {
    let mut banner = None;
    let mut first = usize::MAX;
    let mut consider = |given: bool, index: Option<usize>, candidate: Banner| {
        if given {
            if let Some(index) = index {
                if index < first {
                    first = index;
                    banner = Some(candidate);
                }
            }
        }
    };
    consider(args.version, matches.index_of("version"), Banner::Version);
    consider(args.copyright, matches.index_of("copyright"), Banner::Copyright);
    consider(args.help, matches.index_of("help"), Banner::Help);
    banner
}

/// Fallback for argv that fails to parse as a whole: a left-to-right scan
/// that honours a version/copyright/help flag appearing before the
/// offending argument, the way a getopt loop would.
fn banner_before_parse_error(argv: &[OsString]) -> Option<Banner> {
    let mut args = argv.iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.to_str()? {
            "-v" | "--version" => return Some(Banner::Version),
            "-c" | "--copyright" => return Some(Banner::Copyright),
            "-h" | "--help" => return Some(Banner::Help),
            "-e" | "--evaluate" => {
                args.next();
            }
            "-l" | "--loglevel" => {
                let value = args.next()?;
                <LogLevel as clap::ValueEnum>::from_str(value.to_str()?, false).ok()?;
            }
            "-V" | "--verbose" | "--strict" => (),
            _ => return None,
        }
    }
    None
}

fn print_banner(banner: Banner) {
    match banner {
        Banner::Version => println!("Pebble {}", env!("CARGO_PKG_VERSION")),
        Banner::Copyright => println!("{COPYRIGHT}"),
        Banner::Help => print!("{}", Args::command().render_help()),
    }
}

/// Runs the whole pipeline for one process invocation: parse options, select
/// a source stream, compile, execute. Returns the exit status on the paths
/// that produced their own output; errors carry their report to `main`.
pub fn run<'a>(
    bump: &'a Bump,
    args: impl IntoIterator<Item = impl Into<OsString> + Clone>,
) -> Result<i32, Box<dyn Report + 'a>> {
    let argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let matches = match Args::command().try_get_matches_from(&argv) {
        Ok(matches) => matches,
        Err(error) =>
            return match banner_before_parse_error(&argv) {
                Some(banner) => {
                    print_banner(banner);
                    Ok(0)
                }
                None => Err(error.into()),
            },
    };
    let args = Args::from_arg_matches(&matches)?;

    if let Some(banner) = terminal_banner(&args, &matches) {
        print_banner(banner);
        return Ok(0);
    }

    let diagnostics = Diagnostics::new(args.loglevel);

    let stream = match (&args.evaluate, &args.filename) {
        (Some(source), filename) => {
            if let Some(filename) = filename {
                diagnostics.warn(format_args!(
                    "ignoring `{}` because --evaluate was given",
                    filename.display(),
                ));
            }
            SourceStream::memory(bump, source)
        }
        (None, Some(filename)) => SourceStream::file(bump, filename)?,
        (None, None) => return Err(NoProgram.into()),
    };
    diagnostics.debug(format_args!("reading program from {}", stream.origin().display()));

    let mut state = parse_init_state(bump, stream.node_box_size());
    state.verbose = args.verbose;
    compiler::compile(&mut state, &diagnostics, &stream)?;

    let mut status = 0;
    if let Some(chunk) = state.chunk() {
        let outcome = vm::run_chunk(bump, &diagnostics, chunk);
        diagnostics.debug(format_args!("vm finished: {outcome:?}"));
        if args.strict && outcome != Outcome::Completed {
            status = 1;
        }
    }
    Ok(status)
}
