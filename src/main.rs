//! # study-harvest CLI (`harvest`)
//!
//! Finds the PDF notes linked from a semester index page (or one subject
//! page), downloads them into `{download_dir}/{subject}/`, and optionally
//! strips vendor branding from filenames and hyperlinks from the PDFs.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Write a commented default configuration file |
//! | `harvest subjects <url>` | List the subject pages linked from an index page |
//! | `harvest fetch [url]` | Download notes for the selected subjects |
//! | `harvest process <dir>` | Post-process PDFs already on disk |
//!
//! ## Examples
//!
//! ```bash
//! # Everything for one semester, no questions asked
//! harvest fetch https://www.ktunotes.in/ktu-s6-cse-notes-2019-scheme/ --select all --yes
//!
//! # A single subject page, with hyperlinks removed
//! harvest fetch https://www.ktunotes.in/ktu-cst302-notes/ --single --strip-hyperlinks --yes
//!
//! # Clean up an existing folder
//! harvest process ./KTU_Notes --strip-branding --recursive
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use study_harvest::config::{self, HarvestConfig};
use study_harvest::models::{RunSummary, Subject};
use study_harvest::pipeline::{process_directory, Harvester};
use study_harvest::postprocess::{BrandingFilter, ProcessOptions};
use study_harvest::progress::ProgressMode;
use study_harvest::prompt;
use study_harvest::selection::{parse_selection, Selection};
use study_harvest::subjects::subject_from_url;

const DEFAULT_CONFIG: &str = "./config/harvest.toml";

/// study-harvest: download and tidy PDF study notes linked from course pages.
///
/// All commands accept `--config`. When the default config file is missing,
/// built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Download and tidy PDF study notes linked from course pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/harvest.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress output on stderr. Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default configuration file to the `--config` path.
    Init,

    /// List the subject pages linked from an index page.
    Subjects {
        /// Index (semester) page URL.
        url: String,

        /// Print subjects as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Download the notes of the selected subjects.
    ///
    /// Files already on disk are never downloaded again, so re-running is
    /// safe. Missing arguments are asked for when stdin is a terminal.
    /// Without pass flags, the `[processing]` config section decides which
    /// passes run; with any, exactly the flagged passes run.
    Fetch {
        /// Index page URL, or a subject page URL with `--single`.
        url: Option<String>,

        /// Download directory. Overrides `[output].download_dir`.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Subjects to fetch: `all`, `none`, `2-5`, or `1,3,5`.
        #[arg(long)]
        select: Option<String>,

        /// Treat the URL as one subject page instead of an index page.
        #[arg(long)]
        single: bool,

        /// Remove vendor branding from filenames.
        #[arg(long)]
        strip_branding: bool,

        /// Remove hyperlink annotations from downloaded PDFs.
        #[arg(long)]
        strip_hyperlinks: bool,

        /// Start without asking for confirmation.
        #[arg(long, short = 'y')]
        yes: bool,

        /// Print the final summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Post-process PDFs already on disk.
    ///
    /// Without pass flags, the `[processing]` config section decides which
    /// passes run.
    Process {
        /// Directory containing PDFs.
        dir: PathBuf,

        /// Remove vendor branding from filenames.
        #[arg(long)]
        strip_branding: bool,

        /// Remove hyperlink annotations.
        #[arg(long)]
        strip_hyperlinks: bool,

        /// Descend into subdirectories.
        #[arg(long)]
        recursive: bool,

        /// Print the final summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    // Commands that don't require config
    if let Commands::Init = cli.command {
        config::write_template(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let mut cfg = config::load_or_default(&config_path, cli.config.is_some())?;

    match cli.command {
        Commands::Init => {}
        Commands::Subjects { url, json } => {
            let harvester = Harvester::new(&cfg, ProcessOptions::default(), progress.reporter())?;
            let subjects = harvester
                .discover_subjects(&url)
                .await
                .with_context(|| format!("Failed to read index page {}", url))?;
            print_subjects(&subjects, json)?;
        }
        Commands::Fetch {
            url,
            dir,
            select,
            single,
            strip_branding,
            strip_hyperlinks,
            yes,
            json,
        } => {
            if let Some(dir) = dir {
                cfg.output.download_dir = dir;
            }
            let options = pass_options(strip_branding, strip_hyperlinks, &cfg);
            let url = match url {
                Some(url) => url,
                None if prompt::is_interactive() => prompt::ask_url()?,
                None => bail!("a page URL is required when stdin is not a terminal"),
            };

            let mut harvester = Harvester::new(&cfg, options, progress.reporter())?;
            let subjects = if single {
                vec![subject_from_url(&url)]
            } else {
                let found = harvester
                    .discover_subjects(&url)
                    .await
                    .with_context(|| format!("Failed to read index page {}", url))?;
                if found.is_empty() {
                    eprintln!("No subjects found on {}. Check the URL or use --single.", url);
                }
                choose(found, select.as_deref())?
            };

            if subjects.is_empty() {
                let mut summary = RunSummary::start();
                summary.finish();
                print_summary(&summary, harvester.download_root(), json)?;
                return Ok(());
            }

            if !yes {
                if !prompt::is_interactive() {
                    bail!("pass --yes to start without confirmation");
                }
                let question = format!(
                    "Download {} subject(s) into {}?",
                    subjects.len(),
                    harvester.download_root().display()
                );
                if !prompt::confirm(&question)? {
                    eprintln!("Download cancelled.");
                    return Ok(());
                }
            }

            let summary = harvester.harvest_subjects(&subjects).await;
            print_summary(&summary, harvester.download_root(), json)?;
        }
        Commands::Process {
            dir,
            strip_branding,
            strip_hyperlinks,
            recursive,
            json,
        } => {
            let options = pass_options(strip_branding, strip_hyperlinks, &cfg);
            if !dir.is_dir() {
                bail!("Not a directory: {}", dir.display());
            }
            let branding = BrandingFilter::new(&cfg.processing.extra_branding_patterns)
                .context("invalid processing.extra_branding_patterns")?;
            let reporter = progress.reporter();
            let summary = process_directory(&dir, options, &branding, recursive, reporter.as_ref())?;
            print_summary(&summary, &dir, json)?;
        }
    }

    Ok(())
}

/// Passes named on the command line, or the `[processing]` section when
/// no pass flag is given.
fn pass_options(strip_branding: bool, strip_hyperlinks: bool, cfg: &HarvestConfig) -> ProcessOptions {
    if strip_branding || strip_hyperlinks {
        ProcessOptions {
            strip_branding,
            strip_hyperlinks,
        }
    } else {
        ProcessOptions {
            strip_branding: cfg.processing.strip_branding,
            strip_hyperlinks: cfg.processing.strip_hyperlinks,
        }
    }
}

/// `RUST_LOG` if set, otherwise warnings and errors only. Always stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Apply `--select`, or ask for a selection when interactive.
fn choose(subjects: Vec<Subject>, select: Option<&str>) -> Result<Vec<Subject>> {
    if subjects.is_empty() {
        return Ok(subjects);
    }
    let selection = match select {
        Some(expr) => {
            let (selection, dropped) = parse_selection(expr, subjects.len())?;
            if !dropped.is_empty() {
                eprintln!("Ignoring out-of-range entries: {:?}", dropped);
            }
            selection
        }
        None if prompt::is_interactive() => prompt::ask_selection(&subjects)?,
        None => bail!("--select is required when stdin is not a terminal"),
    };
    Ok(match selection {
        Selection::None => Vec::new(),
        Selection::Indices(indices) => indices
            .into_iter()
            .filter_map(|i| subjects.get(i).cloned())
            .collect(),
    })
}

fn print_subjects(subjects: &[Subject], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(subjects)?);
        return Ok(());
    }
    if subjects.is_empty() {
        println!("No subjects found.");
        return Ok(());
    }
    for (i, subject) in subjects.iter().enumerate() {
        println!("{:>3}. {}", i + 1, subject.name);
        println!("     {}", subject.url);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, location: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Subjects processed:   {}", summary.subjects);
    println!("Documents found:      {}", summary.discovered);
    println!("Downloaded:           {}", summary.downloaded);
    println!("Already present:      {}", summary.already_present);
    println!("Present (by server):  {}", summary.verified_present);
    println!("Renamed:              {}", summary.renamed);
    println!("Hyperlinks stripped:  {}", summary.hyperlinks_stripped);
    println!("Failed:               {}", summary.failed);
    println!("Location:             {}", location.display());
    Ok(())
}
