use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgprov::config::Config;
use pkgprov::error::ProvError;
use pkgprov::output::{self, Classification, OutputFormat};
use pkgprov::rebuild::select_tag;

#[derive(Parser)]
#[command(
    name = "pkgprov",
    about = "Signed build provenance for published package releases",
    version,
    author
)]
struct Cli {
    /// Config file path
    #[arg(long, short = 'c', global = true, env = "PKGPROV_CONFIG", default_value = "pkgprov.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify release filenames by packaging kind
    Classify {
        /// Release filenames
        #[arg(required = true)]
        files: Vec<String>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// Show one package's policy from a policy repository checkout
    Policy {
        /// Policy repository checkout
        #[arg(long, default_value = ".")]
        root: PathBuf,

        scope: String,

        package: String,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// List every policy in a policy repository checkout
    Policies {
        /// Policy repository checkout
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// Print the first tag that names a version
    MatchTag {
        #[arg(long)]
        version: String,

        /// Tags in listing order
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Copy archive metadata from a reference archive onto a rebuilt one
    Normalize {
        /// Published archive
        reference: PathBuf,

        /// Rebuilt archive, rewritten in place
        rebuilt: PathBuf,
    },

    /// Generate a starter pkgprov.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Classify { files, format } => cmd_classify(files, format),
        Commands::Policy {
            root,
            scope,
            package,
            format,
        } => cmd_policy(cli.config, root, scope, package, format).await,
        Commands::Policies { root, format } => cmd_policies(cli.config, root, format).await,
        Commands::MatchTag { version, tags } => cmd_match_tag(version, tags),
        Commands::Normalize { reference, rebuilt } => cmd_normalize(reference, rebuilt),
        Commands::Init { force } => cmd_init(cli.config, force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn parse_format(format_str: &str) -> OutputFormat {
    OutputFormat::from_str_lenient(format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    })
}

fn cmd_classify(files: Vec<String>, format_str: String) -> Result<i32, ProvError> {
    let items: Vec<Classification> = files.iter().map(|f| Classification::of(f)).collect();
    print!(
        "{}",
        output::render_classifications(&items, parse_format(&format_str))?
    );
    Ok(0)
}

async fn cmd_policy(
    config_path: PathBuf,
    root: PathBuf,
    scope: String,
    package: String,
    format_str: String,
) -> Result<i32, ProvError> {
    let config = Config::load(&config_path)?;
    let policy = pkgprov::load_policy(&root, &config, &scope, &package).await?;
    match parse_format(&format_str) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&policy)?),
        OutputFormat::Console => {
            print!("{}", output::render_policies(std::slice::from_ref(&policy), OutputFormat::Console)?);
            print!("{}", serde_yaml::to_string(&policy)?);
        }
    }
    Ok(0)
}

async fn cmd_policies(
    config_path: PathBuf,
    root: PathBuf,
    format_str: String,
) -> Result<i32, ProvError> {
    let config = Config::load(&config_path)?;
    let policies = pkgprov::load_policies(&root, &config).await?;
    print!(
        "{}",
        output::render_policies(&policies, parse_format(&format_str))?
    );
    Ok(0)
}

fn cmd_match_tag(version: String, tags: Vec<String>) -> Result<i32, ProvError> {
    match select_tag(&tags, &version)? {
        Some(tag) => {
            println!("{tag}");
            Ok(0)
        }
        None => {
            eprintln!("No tag matches version {version}");
            Ok(1)
        }
    }
}

fn cmd_normalize(reference: PathBuf, rebuilt: PathBuf) -> Result<i32, ProvError> {
    pkgprov::normalize_file(&reference, &rebuilt)?;
    tracing::info!(reference = %reference.display(), rebuilt = %rebuilt.display(), "normalized archive metadata");
    Ok(0)
}

fn cmd_init(path: PathBuf, force: bool) -> Result<i32, ProvError> {
    if path.exists() && !force {
        eprintln!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", path.display());

    Ok(0)
}
