use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use texpand::{
    AiInvoker, AiSelection, DEFAULT_MAX_DEPTH, LiveAi, MockAi, Protocol, ResolveContext, Resolver,
    Result, RulePolicy, auto_output_path, find_directives,
};

const LONG_HELP: &str = r#"
Directive reference (inside a ```include fenced block):
  static: file.md          - Include file contents
  cli: command             - Include command stdout (requires a policy allow rule)
  glob: docs/**/*.md       - Concatenate matching files, sorted
  file.md                  - Bare line, same as static:
  :expand:static: a.texp   - Recursively resolve nested include blocks
  :tldr:static: long.md    - Prepend an AI bullet summary
  :translate[it]:static: a - AI-translate into a target language

Examples:
  # Resolve a source document (doc.md.texp writes doc.md)
  texpand doc.md.texp
  # Resolve from stdin to stdout
  cat doc.md | texpand -
  # Explicit output path and base directory
  texpand doc.md.texp -o out.md --base-dir docs/
  # Allow commands through the security gate
  texpand doc.md.texp --policy .texpand-policy.json
  # Validate directives without resolving
  texpand doc.md.texp --dry-run
  # List directives as JSON for scripting
  texpand doc.md.texp --list=json

Policy file (JSON, first match wins, deny by default):
  {
    "cli": { "rules": [ { "pattern": "git *", "action": "allow" } ] }
  }
"#;

/// Directive-block expansion for text documents.
#[derive(Parser, Debug)]
#[command(
    name = "texpand",
    version,
    about = "Expand ```include directive blocks in text documents.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Input document. Use '-' for stdin.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (defaults: INPUT ending in .texp writes the stripped
    /// path, otherwise stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Base directory for resolving relative paths and globs (defaults to
    /// the input file's directory)
    #[arg(short, long, value_name = "DIR", env = "TEXPAND_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Maximum recursion depth for the expand modifier
    #[arg(short = 'd', long, value_name = "DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// JSON security-policy file gating cli commands (and paths with
    /// --gate-paths)
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Also gate static/glob path resolution through the policy rules
    #[arg(long)]
    gate_paths: bool,

    /// AI provider override for tldr/translate (openai, anthropic)
    #[arg(long, value_name = "PROVIDER")]
    ai_provider: Option<String>,

    /// AI model override for tldr/translate
    #[arg(long, value_name = "MODEL")]
    ai_model: Option<String>,

    /// Target language for translate lines without a [lang] parameter
    #[arg(long, value_name = "LANG")]
    lang: Option<String>,

    /// Use the deterministic mock AI backend (no network, no keys)
    #[arg(long)]
    mock_ai: bool,

    /// Validate directives without resolving anything
    #[arg(long, conflicts_with = "list")]
    dry_run: bool,

    /// List directives (optionally with format: plain, detailed, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "dry_run")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// Simple list of directive lines
    Plain,
    /// Parsed details for each directive
    Detailed,
    /// JSON output for scripting
    Json,
}

#[derive(Serialize)]
struct DirectiveInfo {
    line: String,
    protocol: &'static str,
    argument: String,
    modifiers: Vec<&'static str>,
    block_start: usize,
    block_end: usize,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => LogLevel::Error,
        (false, 0) => LogLevel::Warn,
        (false, 1) => LogLevel::Info,
        (false, 2) => LogLevel::Debug,
        (false, _) => LogLevel::Trace,
    };

    if let Err(e) = run(&cli, log_level) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli, log_level: LogLevel) -> Result<()> {
    let content = read_input(cli, log_level)?;

    if cli.dry_run {
        return dry_run(&content, cli, log_level);
    }
    if let Some(format) = cli.list {
        return list_directives(&content, format);
    }

    let policy = load_policy(cli)?;
    let mut ctx = build_context(cli);

    let mock = MockAi;
    let live;
    let ai: &dyn AiInvoker = if cli.mock_ai {
        log(log_level, LogLevel::Debug, "Using mock AI backend");
        &mock
    } else {
        live = LiveAi::new().map_err(|e| {
            io::Error::other(format!("failed to initialize AI backend: {e}"))
        })?;
        &live
    };

    let resolver = Resolver::new(&policy, ai)?;

    log(log_level, LogLevel::Debug, "Resolving include blocks...");
    let resolved = resolver.resolve_document(&content, &mut ctx);

    write_output(cli, &resolved, log_level)
}

fn read_input(cli: &Cli, log_level: LogLevel) -> Result<String> {
    if cli.input.as_path() == Path::new("-") {
        log(log_level, LogLevel::Info, "Reading document from stdin...");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        log(
            log_level,
            LogLevel::Info,
            &format!("Reading document from {}", cli.input.display()),
        );
        if !cli.input.is_file() {
            return Err(texpand::TexpandError::InputNotFound {
                path: cli.input.clone(),
            });
        }
        std::fs::read_to_string(&cli.input).map_err(Into::into)
    }
}

fn load_policy(cli: &Cli) -> Result<RulePolicy> {
    let mut policy = match &cli.policy {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        }
        None => RulePolicy::default(),
    };
    policy.gate_paths |= cli.gate_paths;
    Ok(policy)
}

fn build_context(cli: &Cli) -> ResolveContext {
    let base_dir = cli
        .base_dir
        .clone()
        .or_else(|| {
            if cli.input.as_path() == Path::new("-") {
                None
            } else {
                cli.input.parent().map(Path::to_path_buf)
            }
        })
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let selection = AiSelection {
        provider: cli.ai_provider.clone(),
        model: cli.ai_model.clone(),
        api_key: None,
    };

    let mut ctx = ResolveContext::new(base_dir);
    ctx.max_depth = cli.max_depth;
    ctx.tldr = selection.clone();
    ctx.translate = selection;
    ctx.translate_lang = cli.lang.clone();
    ctx
}

fn write_output(cli: &Cli, resolved: &str, log_level: LogLevel) -> Result<()> {
    let target = cli.output.clone().or_else(|| {
        if cli.input.as_path() == Path::new("-") {
            None
        } else {
            auto_output_path(&cli.input)
        }
    });

    if let Some(path) = target {
        log(
            log_level,
            LogLevel::Info,
            &format!("Writing output to {}", path.display()),
        );
        std::fs::write(path, resolved)?;
    } else {
        print!("{resolved}");
        io::stdout().flush()?;
    }

    log(log_level, LogLevel::Info, "Done.");
    Ok(())
}

fn dry_run(content: &str, cli: &Cli, log_level: LogLevel) -> Result<()> {
    log(
        log_level,
        LogLevel::Info,
        "Performing dry run - validating directives...",
    );

    let policy = load_policy(cli)?;
    let ctx = build_context(cli);
    let directives = find_directives(content)?;
    let total = directives.len();

    let mut invalid = 0usize;
    for directive in &directives {
        let parsed = &directive.parsed;
        match parsed.protocol {
            Protocol::Static => {
                let path = Path::new(&parsed.argument);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    ctx.base_dir.join(path)
                };
                if path.is_file() {
                    log(
                        log_level,
                        LogLevel::Info,
                        &format!("ok: {} -> {}", directive.line, path.display()),
                    );
                } else {
                    log(
                        log_level,
                        LogLevel::Warn,
                        &format!("missing: {} -> {}", directive.line, path.display()),
                    );
                    invalid += 1;
                }
            }
            Protocol::Cli => {
                use texpand::SecurityGate;
                let decision = policy.check(Protocol::Cli, &parsed.argument);
                if decision.allowed {
                    log(log_level, LogLevel::Info, &format!("ok: {}", directive.line));
                } else {
                    log(
                        log_level,
                        LogLevel::Warn,
                        &format!("blocked: {} ({})", directive.line, decision.reason),
                    );
                    invalid += 1;
                }
            }
            Protocol::Glob => {
                // Glob misses are warnings at resolve time, not errors.
                log(
                    log_level,
                    LogLevel::Info,
                    &format!("glob: {}", directive.line),
                );
            }
        }
    }

    println!("\nSummary: {total} directives found");
    if invalid > 0 {
        println!("  {invalid} invalid");
        std::process::exit(1);
    }
    println!("  all valid");
    Ok(())
}

fn list_directives(content: &str, format: ListFormat) -> Result<()> {
    let directives = find_directives(content)?;

    match format {
        ListFormat::Plain => {
            for directive in &directives {
                println!("{}", directive.line);
            }
        }
        ListFormat::Detailed => {
            for directive in &directives {
                println!("Directive: {}", directive.line);
                println!("  Protocol: {}", directive.parsed.protocol.name());
                println!("  Argument: {}", directive.parsed.argument);
                if !directive.parsed.modifiers.is_empty() {
                    let names: Vec<_> = directive
                        .parsed
                        .modifiers
                        .iter()
                        .map(texpand::Modifier::name)
                        .collect();
                    println!("  Modifiers: {}", names.join(", "));
                }
                println!(
                    "  Block span: {}..{}",
                    directive.block_start, directive.block_end
                );
                println!();
            }
        }
        ListFormat::Json => {
            let infos: Vec<DirectiveInfo> = directives
                .iter()
                .map(|directive| DirectiveInfo {
                    line: directive.line.clone(),
                    protocol: directive.parsed.protocol.name(),
                    argument: directive.parsed.argument.clone(),
                    modifiers: directive
                        .parsed
                        .modifiers
                        .iter()
                        .map(texpand::Modifier::name)
                        .collect(),
                    block_start: directive.block_start,
                    block_end: directive.block_end,
                })
                .collect();
            let json = serde_json::to_string_pretty(&infos)?;
            println!("{json}");
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

fn log(current_level: LogLevel, message_level: LogLevel, message: &str) {
    if message_level >= current_level {
        eprintln!(
            "[{}] {}",
            match message_level {
                LogLevel::Trace => "TRACE",
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Error => "ERROR",
            },
            message
        );
    }
}
