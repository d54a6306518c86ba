use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use docx_carve::docx::captions::{renumber_file, CaptionScope, CaptionStarts};
use docx_carve::docx::extract::{extract_section, inject_placeholders, ExtractOptions};
use docx_carve::docx::labels::{
    labels_for_file, labels_for_package, source_digest, write_labels_json,
};
use docx_carve::docx::locator::SectionQuery;
use docx_carve::docx::package::DocxPackage;
use docx_carve::docx::strip::{hide_file, strip_file, StripOptions};
use docx_carve::docx::template::Injection;
use docx_carve::heuristics::HeuristicRules;
use docx_carve::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "docx-carve")]
#[command(about = "Carve, renumber and template WordprocessingML documents", long_about = None)]
struct Cli {
    /// Heuristics TOML (caption labels, locator tuning)
    #[arg(long, value_name = "TOML", global = true)]
    rules: Option<PathBuf>,

    /// Suppress progress lines on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract one numbered section into a standalone .docx
    Extract {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Section number as printed in the heading, e.g. "3" or "2.3"
        #[arg(value_name = "NUMBER")]
        number: String,

        /// Heading text after the number (sharpens matching)
        #[arg(long)]
        heading: Option<String>,

        /// Bold inline subtitle to narrow the extract to
        #[arg(long)]
        sub_heading: Option<String>,

        /// Stop right before the paragraph with this exact text
        #[arg(long)]
        end_title: Option<String>,

        /// Accept text-only subtitle matches (skip the bold check)
        #[arg(long)]
        loose_sub_match: bool,

        /// Treat TOC paragraphs as ordinary heading candidates
        #[arg(long)]
        keep_toc: bool,

        /// Drop header/footer references from the extract
        #[arg(long)]
        no_header_footer: bool,

        /// Output .docx (default: <input_stem>_<number>.docx)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Renumber figure/table captions and in-text references
    Renumber {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Restart numbering at each top-level heading ("2-1" style)
        #[arg(long)]
        per_section: bool,

        /// First figure number handed out
        #[arg(long, value_name = "N", default_value_t = 1)]
        figure_start: u32,

        /// First table number handed out
        #[arg(long, value_name = "N", default_value_t = 1)]
        table_start: u32,

        /// Output .docx (default: rewrite in place)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Reconstruct visible list labels ("3.2", "(a)") into JSON
    Labels {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Recompute even when a cached artifact matches the file digest
        #[arg(long)]
        no_cache: bool,

        /// Output JSON (default: <input_stem>.labels.json)
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
    },

    /// Apply a placeholder plan to turn a document into a template
    Inject {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Plan JSON: [{"index": 12, "var": "scope", "mode": "insert_after"}]
        #[arg(long, value_name = "JSON")]
        plan: PathBuf,

        /// Output .docx (default: <input_stem>_template.docx)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Remove TOC blocks, hidden runs and header/footer references
    Strip {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Drop TOC paragraphs from the body
        #[arg(long)]
        toc: bool,

        /// Delete runs marked vanished
        #[arg(long)]
        hidden_runs: bool,

        /// Remove header/footer references from section properties
        #[arg(long)]
        header_footer_refs: bool,

        /// Leave header/footer parts alone when sweeping hidden runs
        #[arg(long)]
        skip_header_footer: bool,

        /// Output .docx (default: rewrite in place)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Mark a section's runs hidden so Word renders nothing for it
    Hide {
        /// Input .docx
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Section number as printed in the heading, e.g. "4.1"
        #[arg(value_name = "NUMBER")]
        number: String,

        /// Heading text after the number
        #[arg(long)]
        heading: Option<String>,

        /// Bold inline subtitle narrowing what gets hidden
        #[arg(long)]
        sub_heading: Option<String>,

        /// Hide the heading paragraph too
        #[arg(long)]
        include_heading: bool,

        /// Output .docx (default: rewrite in place)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let progress = ConsoleProgress::new(!cli.quiet);

    let rules = match cli.rules.as_deref() {
        Some(path) => HeuristicRules::from_toml_path(path)?,
        None => HeuristicRules::default(),
    };

    match cli.command {
        Commands::Extract {
            input,
            number,
            heading,
            sub_heading,
            end_title,
            loose_sub_match,
            keep_toc,
            no_header_footer,
            output,
        } => {
            let query = SectionQuery {
                number,
                heading,
                sub_heading,
                end_title,
                skip_toc: !keep_toc,
                strict_sub_match: !loose_sub_match,
            };
            cmd_extract(&input, query, no_header_footer, output, &rules, &progress)
        }
        Commands::Renumber {
            input,
            per_section,
            figure_start,
            table_start,
            output,
        } => {
            let scope = if per_section {
                CaptionScope::PerSection
            } else {
                CaptionScope::Global
            };
            let starts = CaptionStarts {
                figure: figure_start,
                table: table_start,
            };
            cmd_renumber(&input, scope, starts, output, &rules, &progress)
        }
        Commands::Labels {
            input,
            no_cache,
            output,
        } => cmd_labels(&input, no_cache, output, &progress),
        Commands::Inject {
            input,
            plan,
            output,
        } => cmd_inject(&input, &plan, output, &progress),
        Commands::Strip {
            input,
            toc,
            hidden_runs,
            header_footer_refs,
            skip_header_footer,
            output,
        } => {
            if !(toc || hidden_runs || header_footer_refs) {
                return Err(anyhow::anyhow!(
                    "strip needs at least one of --toc, --hidden-runs, --header-footer-refs"
                ));
            }
            let opts = StripOptions {
                toc,
                hidden_runs,
                header_footer_refs,
                include_header_footer: !skip_header_footer,
            };
            cmd_strip(&input, &opts, output, &progress)
        }
        Commands::Hide {
            input,
            number,
            heading,
            sub_heading,
            include_heading,
            output,
        } => {
            let query = SectionQuery {
                number,
                heading,
                sub_heading,
                ..SectionQuery::default()
            };
            cmd_hide(&input, query, include_heading, output, &rules, &progress)
        }
    }
}

/// Sibling path built from the input's stem, e.g. `report_2.3.docx`.
fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}{suffix}"))
}

fn cmd_extract(
    input: &Path,
    query: SectionQuery,
    no_header_footer: bool,
    output: Option<PathBuf>,
    rules: &HeuristicRules,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_output(input, &format!("_{}.docx", query.number)));
    let opts = ExtractOptions {
        query,
        ignore_header_footer: no_header_footer,
    };
    let report = extract_section(input, &output, &opts, rules)?;
    let sub = report
        .sub_heading
        .as_deref()
        .map(|s| format!(" / \"{s}\""))
        .unwrap_or_default();
    progress.info(format!(
        "extracted \"{}\"{} ({} blocks) -> {}",
        report.heading,
        sub,
        report.blocks_kept,
        output.display()
    ));
    Ok(())
}

fn cmd_renumber(
    input: &Path,
    scope: CaptionScope,
    starts: CaptionStarts,
    output: Option<PathBuf>,
    rules: &HeuristicRules,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| input.to_path_buf());
    let stats = renumber_file(input, &output, rules, scope, starts)?;
    progress.info(format!(
        "renumbered {} captions and {} references ({} unresolved) -> {}",
        stats.captions,
        stats.references,
        stats.unresolved,
        output.display()
    ));
    Ok(())
}

fn cmd_labels(
    input: &Path,
    no_cache: bool,
    output: Option<PathBuf>,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_output(input, ".labels.json"));
    let bytes = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let digest = source_digest(&bytes);
    let labels = if no_cache {
        labels_for_package(&DocxPackage::read(input)?)?
    } else {
        labels_for_file(input)?
    };
    write_labels_json(&output, &digest, &labels)?;
    progress.info(format!(
        "{} label records -> {}",
        labels.len(),
        output.display()
    ));
    Ok(())
}

fn cmd_inject(
    input: &Path,
    plan: &Path,
    output: Option<PathBuf>,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_output(input, "_template.docx"));
    let plan_bytes =
        fs::read(plan).with_context(|| format!("read injection plan: {}", plan.display()))?;
    let injections: Vec<Injection> =
        serde_json::from_slice(&plan_bytes).context("parse injection plan (json)")?;
    let rendered = inject_placeholders(input, &output, &injections)?;
    progress.info(format!(
        "applied {} placeholders -> {}",
        injections.len(),
        rendered.display()
    ));
    Ok(())
}

fn cmd_strip(
    input: &Path,
    opts: &StripOptions,
    output: Option<PathBuf>,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| input.to_path_buf());
    let report = strip_file(input, &output, opts)?;
    progress.info(format!(
        "removed {} TOC blocks, {} hidden runs, {} header/footer references -> {}",
        report.toc_blocks,
        report.hidden_runs,
        report.reference_elements,
        output.display()
    ));
    Ok(())
}

fn cmd_hide(
    input: &Path,
    query: SectionQuery,
    include_heading: bool,
    output: Option<PathBuf>,
    rules: &HeuristicRules,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| input.to_path_buf());
    let hidden = hide_file(input, &output, &query, include_heading, rules)?;
    progress.info(format!("hid {} paragraphs -> {}", hidden, output.display()));
    Ok(())
}
