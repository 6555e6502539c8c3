use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use env_logger::Env;
use log::{debug, LevelFilter};

use tokscope_tokenizer::{sha256_hex, Pattern, Tokenizer, TokenizerConfig};

/// Tokenize text with a byte-pair-encoding rank table and decode it back.
#[derive(Parser)]
#[command(name = "tokscope", version)]
struct Cli {
    /// Tokenizer config file (JSON).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Rank file in the tiktoken format (overrides the config).
    #[arg(long, value_name = "PATH", global = true)]
    ranks: Option<PathBuf>,

    /// Expected SHA-256 of the rank file.
    #[arg(long, value_name = "HEX", global = true, conflicts_with = "byte")]
    sha256: Option<String>,

    /// Use the byte-level table (one token per byte).
    #[arg(long, global = true, conflicts_with = "ranks")]
    byte: bool,

    /// Pre-split pattern: none, cl100k, o200k or custom:<regex>.
    #[arg(long, value_name = "PATTERN", global = true)]
    pattern: Option<Pattern>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode text into token IDs.
    Encode {
        /// Text to encode (reads from stdin if omitted and --file not given).
        text: Option<String>,

        /// Read input text from a file.
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Output token IDs as a JSON array instead of space-separated.
        #[arg(long)]
        json: bool,

        /// Emit special tokens where their literal text appears.
        #[arg(long)]
        special: bool,
    },

    /// Decode token IDs back into text.
    Decode {
        /// Token IDs to decode (reads from stdin if omitted and --file not given).
        ids: Vec<u32>,

        /// Read token IDs from a file (whitespace, comma or JSON array separated).
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Replace invalid UTF-8 with U+FFFD instead of failing.
        #[arg(long)]
        lossy: bool,
    },

    /// Display tokenizer info (vocab size, token lookups).
    Info {
        /// Look up specific pieces or special tokens and print their IDs.
        #[arg(long, value_name = "TOKEN")]
        lookup: Vec<String>,
    },

    /// Print the SHA-256 of a rank file.
    Checksum {
        path: PathBuf,
    },
}

/// Level forced by `-v`/`-q`; `None` leaves `RUST_LOG` in charge.
fn log_level(verbose: u8, quiet: bool) -> Option<LevelFilter> {
    if quiet {
        return Some(LevelFilter::Error);
    }
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    builder.format_timestamp_millis();
    if let Some(level) = log_level(verbose, quiet) {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}

fn build_config(cli: &Cli) -> Result<TokenizerConfig> {
    let mut config = match &cli.config {
        Some(path) => TokenizerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => TokenizerConfig::default(),
    };

    if cli.byte {
        config.ranks = None;
        config.sha256 = None;
    }
    if let Some(ranks) = &cli.ranks {
        config.ranks = Some(ranks.clone());
    }
    if let Some(digest) = &cli.sha256 {
        config.sha256 = Some(digest.clone());
    }
    if let Some(pattern) = &cli.pattern {
        config.pattern = pattern.clone();
    }
    Ok(config)
}

fn load_tokenizer(config: &TokenizerConfig) -> Result<Tokenizer> {
    match &config.ranks {
        Some(path) => debug!("Loading rank table from {}", path.display()),
        None => debug!("Using byte-level rank table"),
    }
    Tokenizer::from_config(config).context("Failed to build tokenizer")
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn read_text(text: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(t) = text {
        Ok(t.to_string())
    } else if let Some(path) = file {
        read_file(path)
    } else {
        debug!("Reading text from stdin");
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    }
}

fn read_ids(ids: &[u32], file: Option<&Path>) -> Result<Vec<u32>> {
    if !ids.is_empty() {
        return Ok(ids.to_vec());
    }

    let raw = if let Some(path) = file {
        read_file(path)?
    } else {
        debug!("Reading IDs from stdin");
        let mut buf = String::new();
        for line in io::stdin().lock().lines() {
            let line = line.context("Failed to read stdin")?;
            buf.push_str(&line);
            buf.push(' ');
        }
        buf
    };

    parse_ids(&raw)
}

/// Accepts `1 2 3`, `1,2,3` and `[1, 2, 3]`.
fn parse_ids(raw: &str) -> Result<Vec<u32>> {
    raw.split(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']'))
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .with_context(|| format!("Invalid token ID: {s}"))
        })
        .collect()
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    match cli.command {
        Command::Encode {
            text,
            file,
            json,
            special,
        } => {
            let tokenizer = load_tokenizer(&config)?;
            let input = read_text(text.as_deref(), file.as_deref())?;
            let ids = if special {
                tokenizer.encode_with_special_tokens(&input)
            } else {
                tokenizer.encode(&input)
            };

            if json {
                println!("{}", serde_json::to_string(&ids)?);
            } else {
                let line: Vec<String> = ids.iter().map(u32::to_string).collect();
                println!("{}", line.join(" "));
            }
        }
        Command::Decode { ids, file, lossy } => {
            let tokenizer = load_tokenizer(&config)?;
            let ids = read_ids(&ids, file.as_deref())?;
            let text = if lossy {
                tokenizer.decode_lossy(&ids)
            } else {
                tokenizer.decode(&ids)
            }
            .context("Failed to decode token IDs")?;
            println!("{text}");
        }
        Command::Info { lookup } => {
            let tokenizer = load_tokenizer(&config)?;
            println!("vocab size: {}", tokenizer.vocab_size());
            println!("max token id: {}", tokenizer.max_token_id());
            println!("pattern: {}", config.pattern);

            let mut specials: Vec<_> = tokenizer.special_tokens().iter().collect();
            specials.sort_by_key(|(_, id)| **id);
            for (text, id) in specials {
                println!("special: {text} {id}");
            }

            for token in &lookup {
                match tokenizer.token_to_id(token) {
                    Some(id) => println!("{token:?} -> {id}"),
                    None => println!("{token:?} -> not found"),
                }
            }
        }
        Command::Checksum { path } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            println!("{}", sha256_hex(&data));
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    run(cli)
}
