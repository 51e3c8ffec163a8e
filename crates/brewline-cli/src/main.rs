mod commands;

use brewline_core::{install_signal_handler, CancelToken, PipelineConfig};
use brewline_schema::DigestAlgorithm;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "brewline",
    version,
    about = "Manifest-driven fetch, verify, build and install pipeline"
)]
struct Cli {
    /// Install prefix; artifacts go to <prefix>/bin. Overrides BREWLINE_PREFIX and the config file.
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,

    /// Configuration file (default: $BREWLINE_CONFIG or ~/.config/brewline/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, verify, build, install and smoke-test a package.
    Install {
        /// Path to manifest TOML file.
        #[arg(default_value = "brewline.toml")]
        manifest: PathBuf,
    },
    /// Parse and validate a manifest without fetching anything.
    Validate {
        /// Path to manifest TOML file.
        #[arg(default_value = "brewline.toml")]
        manifest: PathBuf,
    },
    /// Fill the {{key}} markers of a manifest template.
    Render {
        /// Template file.
        template: PathBuf,
        /// Marker value as KEY=VALUE; repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        /// Write the rendered manifest here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the digest of a file, e.g. to fill a manifest checksum.
    Checksum {
        file: PathBuf,
        /// md5, sha256, sha384 or sha512.
        #[arg(long, default_value = "sha256")]
        algorithm: DigestAlgorithm,
    },
    /// List packages installed into the prefix.
    List,
    /// Remove the files an install recorded in its receipt.
    Uninstall {
        /// Package name.
        name: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.trim().to_owned(), value.to_owned()))
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path),
        None => PipelineConfig::load_default(),
    }
    .map_err(|e| e.to_string())?
    .with_env_overrides();
    let config = match &cli.prefix {
        Some(prefix) => config.with_prefix(prefix),
        None => config,
    };
    tracing::debug!(
        prefix = ?config.prefix,
        work_dir = ?config.work_dir,
        "resolved configuration"
    );
    Ok(config)
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BREWLINE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let needs_config = matches!(
        cli.command,
        Commands::Install { .. } | Commands::List | Commands::Uninstall { .. }
    );
    let config = if needs_config {
        match load_config(&cli) {
            Ok(c) => c,
            Err(msg) => {
                eprintln!("error: {msg}");
                return ExitCode::from(EXIT_FAILURE);
            }
        }
    } else {
        PipelineConfig::default()
    };

    let result = match cli.command {
        Commands::Install { manifest } => {
            let cancel = CancelToken::new();
            install_signal_handler(&cancel);
            commands::install::run(config, &manifest, &cancel, json_output)
        }
        Commands::Validate { manifest } => commands::validate::run(&manifest, json_output),
        Commands::Render {
            template,
            vars,
            output,
        } => commands::render::run(&template, &vars, output.as_deref(), json_output),
        Commands::Checksum { file, algorithm } => {
            commands::checksum::run(&file, algorithm, json_output)
        }
        Commands::List => commands::list::run(&config, json_output),
        Commands::Uninstall { name } => commands::uninstall::run(&config, &name, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
