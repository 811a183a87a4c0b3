use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use prose_patcher::adapter::{DocumentAdapter, TextAdapter};
use prose_patcher::assemble::Resolution;
use prose_patcher::chunk_validate::FlaggedPolicy;
use prose_patcher::chunker::Strategy;
use prose_patcher::detect::{Detector, RegexDetector};
use prose_patcher::ir::Severity;
use prose_patcher::pipeline::{self, Mode, PipelineConfig, PipelineError};
use prose_patcher::redline;
use prose_patcher::rewrite::{CoordinatorConfig, PassthroughSource, RewriteSource};
use prose_patcher::rules::{self, RulePack};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "prose-patcher")]
#[command(about = "Deterministic style editing for technical documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Safe,
    Rewrite,
    Holistic,
    HolisticPolish,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Safe => Mode::Safe,
            ModeArg::Rewrite => Mode::Rewrite,
            ModeArg::Holistic => Mode::Holistic,
            ModeArg::HolisticPolish => Mode::HolisticPolish,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FlaggedArg {
    KeepOriginal,
    AcceptRewrite,
}

impl From<FlaggedArg> for FlaggedPolicy {
    fn from(arg: FlaggedArg) -> Self {
        match arg {
            FlaggedArg::KeepOriginal => FlaggedPolicy::KeepOriginal,
            FlaggedArg::AcceptRewrite => FlaggedPolicy::AcceptRewrite,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Paragraph,
    Section,
    Adaptive,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Paragraph => Strategy::Paragraph,
            StrategyArg::Section => Strategy::Section,
            StrategyArg::Adaptive => Strategy::Adaptive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Edit a document and write run artifacts
    Edit {
        /// Input document (markdown-flavored text)
        input: PathBuf,

        /// Directory for run artifacts (created if missing)
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Editing mode
        #[arg(short, long, value_enum, default_value = "safe")]
        mode: ModeArg,

        /// Rule pack file or directory (default pack always included)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Extra protected terms, repeatable
        #[arg(long = "protect")]
        protected: Vec<String>,

        /// Minimum op confidence to apply
        #[arg(long, default_value_t = 0.7)]
        confidence_threshold: f64,

        /// Chunking strategy for holistic modes
        #[arg(long, value_enum, default_value = "adaptive")]
        strategy: StrategyArg,

        /// Concurrent rewrite requests
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 60)]
        request_timeout: u64,

        /// Whole-run deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// What to do with flagged rewrites (required for holistic modes)
        #[arg(long, value_enum)]
        flagged: Option<FlaggedArg>,
    },

    /// Report style findings without editing
    Lint {
        /// Input document
        input: PathBuf,

        /// Rule pack file or directory
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },

    /// List the active rule pack
    Rules {
        /// Rule pack file or directory
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Edit {
            input,
            out_dir,
            mode,
            rules,
            protected,
            confidence_threshold,
            strategy,
            concurrency,
            request_timeout,
            deadline,
            flagged,
        } => {
            cmd_edit(EditArgs {
                input,
                out_dir,
                mode: mode.into(),
                rules,
                protected,
                confidence_threshold,
                strategy: strategy.into(),
                concurrency,
                request_timeout,
                deadline,
                flagged: flagged.map(Into::into),
            })
            .await
        }

        Commands::Lint { input, rules } => cmd_lint(&input, rules.as_deref()),

        Commands::Rules { rules } => cmd_rules(rules.as_deref()),
    }
}

struct EditArgs {
    input: PathBuf,
    out_dir: PathBuf,
    mode: Mode,
    rules: Option<PathBuf>,
    protected: Vec<String>,
    confidence_threshold: f64,
    strategy: Strategy,
    concurrency: usize,
    request_timeout: u64,
    deadline: Option<u64>,
    flagged: Option<FlaggedPolicy>,
}

/// Load the default pack plus any packs at `path` (a file, or a directory
/// searched for .toml files).
fn load_rules(path: Option<&Path>) -> Result<RulePack> {
    let mut pack = rules::default_pack();

    let Some(path) = path else {
        return Ok(pack);
    };

    let mut files = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).max_depth(2) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
        if files.is_empty() {
            anyhow::bail!("no .toml rule packs found under {}", path.display());
        }
    } else {
        files.push(path.to_path_buf());
    }

    for file in files {
        let extra = rules::load_from_path(&file)
            .with_context(|| format!("loading rule pack {}", file.display()))?;
        pack.merge(extra);
    }
    Ok(pack)
}

fn parse_input(path: &Path) -> Result<prose_patcher::ir::DocumentIr> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    TextAdapter
        .parse(&bytes)
        .with_context(|| format!("parsing {}", path.display()))
}

async fn cmd_edit(args: EditArgs) -> Result<()> {
    let ir = parse_input(&args.input)?;
    let mut pack = load_rules(args.rules.as_deref())?;
    pack.protected_terms.extend(args.protected.iter().cloned());

    let mut config = PipelineConfig::new(args.mode, pack);
    config.confidence_threshold = args.confidence_threshold;
    config.strategy = args.strategy;
    config.flagged_policy = args.flagged;
    config.input_label = args.input.display().to_string();
    config.coordinator = CoordinatorConfig {
        concurrency: args.concurrency,
        request_timeout: Duration::from_secs(args.request_timeout),
        run_deadline: args.deadline.map(Duration::from_secs),
        retry_on_guardrail: true,
    };

    let source: Option<Arc<dyn RewriteSource>> = if args.mode.needs_rewrite_source() {
        // No model backend is wired in; rewrite modes run against the
        // passthrough source until one is. Real backends implement
        // RewriteSource and slot in here.
        Some(Arc::new(PassthroughSource))
    } else {
        None
    };

    let original_text = String::from_utf8_lossy(&TextAdapter.serialize(&ir)).into_owned();

    let run = match pipeline::run(&ir, &config, source).await {
        Ok(run) => run,
        Err(PipelineError::Verification(failure)) => {
            eprintln!("{}", "Verification failed; no output written:".red().bold());
            eprint!("{}", failure.report);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let edited_text = String::from_utf8_lossy(&TextAdapter.serialize(&run.ir)).into_owned();
    let label = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    fs::write(args.out_dir.join("original.txt"), &original_text)?;
    fs::write(args.out_dir.join("edited.txt"), &edited_text)?;
    fs::write(
        args.out_dir.join("redline.diff"),
        redline::unified(&original_text, &edited_text, &label),
    )?;
    fs::write(args.out_dir.join("changelog.json"), run.changelog.to_json()?)?;
    fs::write(args.out_dir.join("changelog.txt"), run.changelog.render_text())?;

    if args.mode.is_holistic() {
        let mut review = String::new();
        for res in &run.changelog.chunk_resolutions {
            if !matches!(res.resolution, Resolution::RewriteAccepted) {
                review.push_str(&format!(
                    "{} {:?}: {}\n",
                    res.chunk_id, res.resolution, res.detail
                ));
            }
        }
        fs::write(args.out_dir.join("review.txt"), review)?;
    }

    let stats = &run.changelog.stats;
    let (inserted, deleted) = redline::change_counts(&original_text, &edited_text);
    println!("{}", "Summary:".bold());
    println!(
        "  {} applied, {} rejected (of {} proposed)",
        format!("{}", stats.ops_applied).green(),
        format!("{}", stats.ops_rejected).yellow(),
        stats.ops_proposed
    );
    if stats.chunks_total > 0 {
        println!(
            "  {} of {} chunks rewritten",
            format!("{}", stats.rewrites_used).green(),
            stats.chunks_total
        );
    }
    println!("  {} lines added, {} removed", inserted, deleted);
    println!("  Artifacts in {}", args.out_dir.display());

    Ok(())
}

fn cmd_lint(input: &Path, rules_path: Option<&Path>) -> Result<()> {
    let ir = parse_input(input)?;
    let pack = load_rules(rules_path)?;
    let findings = RegexDetector.lint(&ir, &pack.lint_settings());

    if findings.is_empty() {
        println!("{}", "No findings.".green());
        return Ok(());
    }

    let mut critical = 0;
    for finding in &findings {
        let severity = match finding.severity {
            Severity::Critical => {
                critical += 1;
                "critical".red().bold()
            }
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".cyan(),
        };
        let location = finding
            .block_id
            .as_ref()
            .map(|b| format!(" [{b}]"))
            .unwrap_or_default();
        println!("{severity} {}{location}: {}", finding.rule_id, finding.message);
    }
    println!();
    println!("{} findings, {} critical", findings.len(), critical);

    if critical > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_rules(rules_path: Option<&Path>) -> Result<()> {
    let pack = load_rules(rules_path)?;

    println!("{} ({} rules)", "Active rule pack".bold(), pack.rules.len());
    for rule in &pack.rules {
        println!(
            "  {} [{}]: {:?} -> {:?}",
            rule.id.green(),
            rule.category,
            rule.search,
            rule.replace
        );
        if !rule.rationale.is_empty() {
            println!("      {}", rule.rationale.dimmed());
        }
    }
    if !pack.protected_terms.is_empty() {
        println!();
        println!("{}", "Protected terms:".bold());
        for term in &pack.protected_terms {
            println!("  - {term}");
        }
    }
    Ok(())
}
