mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftag_core::{Fingerprint, LoadState, TagEngine, TagMap};
use output::{
    CategoryInfo, CategoryListOutput, DeclareOutput, GenerateOutput, InitOutput, OutputWriter,
    QueryAddOutput, QueryCheckOutput, SetOutput, ShowOutput, StatusData, StatusOutput,
    UntaggedOutput, format_tags,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// ftag - content-addressed file tagging
#[derive(Parser)]
#[command(name = "ftag")]
#[command(about = "Tag files by content and browse them through symlinks", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory to start looking for a database from (defaults to the current directory)
    #[arg(short, long, global = true, env = "FTAG_DIR")]
    dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database in the directory
    Init,

    /// Show whether a database was found and what it holds
    Status,

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Manage tag values
    #[command(subcommand)]
    Tag(TagCommands),

    /// Restrict which files are taggable
    #[command(subcommand)]
    Filter(FilterCommands),

    /// Manage named queries
    #[command(subcommand)]
    Query(QueryCommands),

    /// Replace the tags of a file and update its links
    Set {
        /// File to tag
        file: PathBuf,

        /// Tag assignment as category=value1,value2 (repeatable; none clears all tags)
        #[arg(short, long = "tag", value_parser = parse_assignment)]
        tags: Vec<(String, Vec<String>)>,
    },

    /// Show the fingerprint and tags of a file
    Show {
        /// File to inspect
        file: PathBuf,
    },

    /// List taggable files missing at least one category
    Untagged {
        /// Shuffle the list
        #[arg(long)]
        random: bool,

        /// Print at most this many files
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rebuild the whole symlink projection
    Generate,
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Declare a category
    Add {
        /// Category name
        name: String,
    },

    /// List categories with their values
    List,
}

#[derive(Subcommand)]
enum TagCommands {
    /// Declare a value in a category
    Add {
        /// Category name
        category: String,

        /// Tag value
        value: String,
    },
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Only files whose MIME type matches this regex (anchored at the start)
    Mime {
        /// Regular expression
        pattern: String,
    },

    /// Only files whose root-relative path contains a match of this regex
    Path {
        /// Regular expression
        pattern: String,
    },
}

#[derive(Subcommand)]
enum QueryCommands {
    /// Declare a query
    Add {
        /// Query name
        name: String,

        /// Required tags as category=value1,value2 (repeatable)
        #[arg(short, long = "rule", value_parser = parse_assignment)]
        rule: Vec<(String, Vec<String>)>,
    },

    /// Check whether a file satisfies a query
    Check {
        /// Query name
        name: String,

        /// File to check
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = OutputWriter::new(cli.json);
    if let Err(e) = run(cli, &output) {
        output.write_error(&e, 1);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Starting directory: --dir > FTAG_DIR (via clap) > current directory
    let start = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    tracing::debug!(start = %start.display(), "looking for database");

    match cli.command {
        Commands::Init => cmd_init(&start, output),
        Commands::Status => cmd_status(&start, output),
        Commands::Category(CategoryCommands::Add { name }) => {
            cmd_declare(&start, output, "category", &name, |e| e.add_category(&name))
        }
        Commands::Category(CategoryCommands::List) => cmd_category_list(&start, output),
        Commands::Tag(TagCommands::Add { category, value }) => {
            let label = format!("{}={}", category, value);
            cmd_declare(&start, output, "tag", &label, |e| e.add_tag(&category, &value))
        }
        Commands::Filter(FilterCommands::Mime { pattern }) => {
            cmd_declare(&start, output, "mime filter", &pattern, |e| {
                e.add_mime_filter(&pattern)
            })
        }
        Commands::Filter(FilterCommands::Path { pattern }) => {
            cmd_declare(&start, output, "path filter", &pattern, |e| {
                e.add_path_filter(&pattern)
            })
        }
        Commands::Query(QueryCommands::Add { name, rule }) => {
            cmd_query_add(&start, output, &name, collect_tags(rule))
        }
        Commands::Query(QueryCommands::Check { name, file }) => {
            cmd_query_check(&start, output, &name, &file)
        }
        Commands::Set { file, tags } => cmd_set(&start, output, &file, collect_tags(tags)),
        Commands::Show { file } => cmd_show(&start, output, &file),
        Commands::Untagged { random, limit } => cmd_untagged(&start, output, random, limit),
        Commands::Generate => cmd_generate(&start, output),
    }
}

/// Parse `category=value1,value2`. An empty right-hand side assigns the
/// category with no values.
fn parse_assignment(s: &str) -> Result<(String, Vec<String>), String> {
    let (category, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected category=value1,value2, got \"{}\"", s))?;
    if category.is_empty() {
        return Err(format!("missing category in \"{}\"", s));
    }
    let values = values
        .split(',')
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    Ok((category.to_string(), values))
}

/// Merge repeated assignments of the same category.
fn collect_tags(assignments: Vec<(String, Vec<String>)>) -> TagMap {
    let mut tags = TagMap::new();
    for (category, values) in assignments {
        tags.entry(category).or_default().extend(values);
    }
    tags
}

fn open_engine(start: &Path) -> Result<TagEngine> {
    match LoadState::discover(start) {
        LoadState::Loaded(engine) => Ok(engine),
        LoadState::NotLoaded => anyhow::bail!(
            "No ftag database found at or above {} (use 'ftag init' to create one)",
            start.display()
        ),
        LoadState::InvalidData { root, reason } => {
            anyhow::bail!("Database at {} is invalid: {}", root.display(), reason)
        }
    }
}

fn cmd_init(start: &Path, output: &OutputWriter) -> Result<()> {
    let engine = TagEngine::initialize(start)
        .with_context(|| format!("Failed to initialize database at {}", start.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: engine.root().display().to_string(),
        metadata_file: engine.metadata_file().display().to_string(),
    };
    output.write(&data, || {
        format!("Initialized ftag database at {}\n", engine.root().display())
    })
}

fn cmd_status(start: &Path, output: &OutputWriter) -> Result<()> {
    let data = match LoadState::discover(start) {
        LoadState::NotLoaded => StatusData::NotLoaded,
        LoadState::InvalidData { root, reason } => StatusData::InvalidData {
            root: root.display().to_string(),
            reason,
        },
        LoadState::Loaded(engine) => {
            let db = engine.store().db();
            StatusData::Loaded {
                root: engine.root().display().to_string(),
                version: engine.version(),
                categories: db.categories().len(),
                queries: db.queries().len(),
                files: db.files().len(),
            }
        }
    };

    let text = match &data {
        StatusData::NotLoaded => "No database found\n".to_string(),
        StatusData::InvalidData { root, reason } => {
            format!("Invalid database at {}\nReason: {}\n", root, reason)
        }
        StatusData::Loaded {
            root,
            version,
            categories,
            queries,
            files,
        } => format!(
            "Root: {}\nVersion: {}\nCategories: {}\nQueries: {}\nTagged files: {}\n",
            root, version, categories, queries, files
        ),
    };

    let data = StatusOutput {
        success: true,
        result_code: 0,
        data,
    };
    output.write(&data, || text)
}

/// Apply one declaration to the database and save it.
fn cmd_declare(
    start: &Path,
    output: &OutputWriter,
    kind: &str,
    name: &str,
    apply: impl FnOnce(&mut TagEngine) -> ftag_core::Result<()>,
) -> Result<()> {
    let mut engine = open_engine(start)?;
    apply(&mut engine).with_context(|| format!("Failed to add {}: {}", kind, name))?;
    engine.save().context("Failed to save database")?;

    let data = DeclareOutput {
        success: true,
        result_code: 0,
        kind: kind.to_string(),
        name: name.to_string(),
        version: engine.version(),
    };
    output.write(&data, || format!("Added {}: {}\n", kind, name))
}

fn cmd_category_list(start: &Path, output: &OutputWriter) -> Result<()> {
    let engine = open_engine(start)?;
    let categories: Vec<CategoryInfo> = engine
        .store()
        .db()
        .categories()
        .iter()
        .map(|c| CategoryInfo {
            name: c.name.clone(),
            values: c.values.clone(),
        })
        .collect();

    let text = if categories.is_empty() {
        "No categories (use 'ftag category add' to create one)\n".to_string()
    } else {
        categories
            .iter()
            .map(|c| format!("{}: {}\n", c.name, c.values.join(", ")))
            .collect()
    };

    let data = CategoryListOutput {
        success: true,
        result_code: 0,
        categories,
    };
    output.write(&data, || text)
}

fn cmd_query_add(start: &Path, output: &OutputWriter, name: &str, rule: TagMap) -> Result<()> {
    let mut engine = open_engine(start)?;
    let links_created = engine
        .add_query(name, rule.clone())
        .with_context(|| format!("Failed to add query: {}", name))?;
    engine.save().context("Failed to save database")?;

    let data = QueryAddOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
        rule,
        links_created,
    };
    output.write(&data, || {
        format!("Added query: {} ({} files linked)\n", name, links_created)
    })
}

fn cmd_query_check(start: &Path, output: &OutputWriter, name: &str, file: &Path) -> Result<()> {
    let engine = open_engine(start)?;
    let matches = engine
        .matches_query(name, file)
        .with_context(|| format!("Failed to evaluate query {} on {}", name, file.display()))?;

    let data = QueryCheckOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
        path: file.display().to_string(),
        matches,
    };
    output.write(&data, || {
        let verdict = if matches { "matches" } else { "does not match" };
        format!("{} {} {}\n", file.display(), verdict, name)
    })
}

fn cmd_set(start: &Path, output: &OutputWriter, file: &Path, tags: TagMap) -> Result<()> {
    let mut engine = open_engine(start)?;
    let fingerprint = engine
        .retag_and_resync(file, tags.clone())
        .with_context(|| format!("Failed to tag {}", file.display()))?;

    let data = SetOutput {
        success: true,
        result_code: 0,
        path: file.display().to_string(),
        fingerprint,
        tags,
        version: engine.version(),
    };
    output.write(&data, || {
        format!("{} {}\n{}", fingerprint, file.display(), format_tags(&data.tags))
    })
}

fn cmd_show(start: &Path, output: &OutputWriter, file: &Path) -> Result<()> {
    let engine = open_engine(start)?;
    let fingerprint = Fingerprint::compute(file)
        .with_context(|| format!("Failed to read {}", file.display()))?
        .with_context(|| format!("File not found: {}", file.display()))?;

    let db = engine.store().db();
    let entry = db.file(&fingerprint);
    let data = ShowOutput {
        success: true,
        result_code: 0,
        path: file.display().to_string(),
        fingerprint,
        tags: entry.map(|e| e.tags.clone()),
        queries: db.matching_queries(entry),
    };
    output.write(&data, || {
        let mut text = format!("{} {}\n", fingerprint, file.display());
        match &data.tags {
            Some(tags) => text.push_str(&format_tags(tags)),
            None => text.push_str("  (untagged)\n"),
        }
        if !data.queries.is_empty() {
            text.push_str(&format!("  queries: {}\n", data.queries.join(", ")));
        }
        text
    })
}

fn cmd_untagged(
    start: &Path,
    output: &OutputWriter,
    random: bool,
    limit: Option<usize>,
) -> Result<()> {
    let engine = open_engine(start)?;
    let (mut files, stats) = engine
        .untagged_with_statistics(random)
        .context("Failed to list untagged files")?;
    if let Some(limit) = limit {
        files.truncate(limit);
    }

    let files: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    let text = {
        let mut text: String = files.iter().map(|f| format!("{}\n", f)).collect();
        text.push_str(&format!(
            "{} of {} taggable files are untagged\n",
            stats.untagged, stats.taggable
        ));
        text
    };

    let data = UntaggedOutput {
        success: true,
        result_code: 0,
        taggable: stats.taggable,
        untagged: stats.untagged,
        files,
    };
    output.write(&data, || text)
}

fn cmd_generate(start: &Path, output: &OutputWriter) -> Result<()> {
    let engine = open_engine(start)?;
    let stats = engine
        .regenerate_all()
        .context("Failed to regenerate projection")?;

    let data = GenerateOutput::from(stats);
    output.write(&data, || {
        format!(
            "Scanned {} files\nLinked {} files ({} links)\nSkipped {} files\n",
            data.files_scanned, data.files_linked, data.links_created, data.files_skipped
        )
    })
}
