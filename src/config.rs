//! CLI configuration. Parsed by hand-walking `std::env::args()` (the
//! teacher crate's own `sis-test-runner` binary takes the same approach
//! rather than pulling in a dedicated argument-parsing dependency).

use std::path::PathBuf;

use crate::error::EmuError;

pub const DEFAULT_RAM_SIZE: u32 = 8 * 1024 * 1024;
pub const RAM_BASE: u32 = 0x8000_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    Tty,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ram_size: u32,
    pub sandbox_root: PathBuf,
    pub guest_cwd: String,
    pub stdin: StreamTarget,
    pub stdout: StreamTarget,
    pub stderr: StreamTarget,
    pub program: PathBuf,
    pub program_args: Vec<String>,
}

const USAGE: &str = "\
usage: pyrv32 [--ram <bytes>] [--root <dir>] [--cwd <guest-path>]
              [--stdin <path>|--tty] [--stdout <path>|--tty] [--stderr <path>|--tty]
              <program.elf> [args...]";

impl Config {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, EmuError> {
        let mut iter = args.into_iter();
        let mut ram_size = DEFAULT_RAM_SIZE;
        let mut sandbox_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut guest_cwd = "/".to_string();
        let mut stdin = StreamTarget::Tty;
        let mut stdout = StreamTarget::Tty;
        let mut stderr = StreamTarget::Tty;
        let mut program: Option<PathBuf> = None;
        let mut program_args = Vec::new();

        while let Some(arg) = iter.next() {
            if program.is_some() {
                program_args.push(arg);
                continue;
            }
            match arg.as_str() {
                "-h" | "--help" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                "--ram" => {
                    let v = next_value(&mut iter, "--ram")?;
                    ram_size = parse_size(&v)?;
                }
                "--root" => {
                    sandbox_root = PathBuf::from(next_value(&mut iter, "--root")?);
                }
                "--cwd" => {
                    guest_cwd = next_value(&mut iter, "--cwd")?;
                }
                "--stdin" => stdin = parse_stream(&mut iter, "--stdin")?,
                "--stdout" => stdout = parse_stream(&mut iter, "--stdout")?,
                "--stderr" => stderr = parse_stream(&mut iter, "--stderr")?,
                other if other.starts_with("--") => {
                    return Err(EmuError::Config(format!("unknown flag {other}\n{USAGE}")));
                }
                other => program = Some(PathBuf::from(other)),
            }
        }

        let program = program.ok_or_else(|| EmuError::Config(format!("missing program\n{USAGE}")))?;

        Ok(Config {
            ram_size,
            sandbox_root,
            guest_cwd,
            stdin,
            stdout,
            stderr,
            program,
            program_args,
        })
    }
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, EmuError> {
    iter.next().ok_or_else(|| EmuError::Config(format!("{flag} requires a value")))
}

fn parse_stream(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<StreamTarget, EmuError> {
    let v = next_value(iter, flag)?;
    if v == "--tty" {
        Ok(StreamTarget::Tty)
    } else {
        Ok(StreamTarget::File(PathBuf::from(v)))
    }
}

fn parse_size(s: &str) -> Result<u32, EmuError> {
    s.parse::<u32>()
        .map_err(|_| EmuError::Config(format!("invalid --ram value: {s}")))
}
