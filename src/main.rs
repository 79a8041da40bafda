use anyhow::{Context, Result};
use approot::debug::{self, Artifact, InspectFileSource};
use approot::paths::dialect_for;
use approot::sync_map::{CsvSyncMapResolver, InsecureRegistries};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "approot",
    about = "approot - find common root directories of Unix/Windows paths and app roots inside images",
    version
)]
struct Cli {
    /// Log debug details to stderr
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the common roots of the given paths, one per line
    Roots {
        /// Paths to group. If omitted, read one per line from stdin.
        paths: Vec<String>,

        /// Minimum number of components a root must have
        #[arg(long, default_value_t = 1)]
        min_depth: usize,

        #[command(flatten)]
        os: OsArg,
    },

    /// Show how a path is read: absolute, depth and volume
    Inspect {
        path: String,

        #[command(flatten)]
        os: OsArg,
    },

    /// Print the inferred application roots of an image
    AppRoots {
        image: String,

        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Print the image configuration used for debugging as JSON
    ImageConfig {
        image: String,

        /// `docker image inspect` output for the image
        #[arg(long)]
        config: PathBuf,

        #[command(flatten)]
        sync: SyncArgs,
    },
}

#[derive(Args, Debug)]
struct OsArg {
    /// Path rules to apply: `windows`, anything else means unix
    #[arg(long = "os", env = "APPROOT_TARGET_OS", default_value = "linux")]
    name: String,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// CSV file with `image,local,remote` rows
    #[arg(long)]
    sync_map: PathBuf,

    /// Registry to reach without TLS verification (repeatable)
    #[arg(long = "insecure-registry")]
    insecure_registries: Vec<String>,
}

impl SyncArgs {
    fn resolver(&self) -> CsvSyncMapResolver {
        CsvSyncMapResolver::new(&self.sync_map)
    }

    fn insecure(&self) -> InsecureRegistries {
        self.insecure_registries.iter().cloned().collect()
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.cmd {
        Command::Roots {
            paths,
            min_depth,
            os,
        } => roots(paths, min_depth, &os.name),
        Command::Inspect { path, os } => inspect(&path, &os.name),
        Command::AppRoots { image, sync } => app_roots(&image, &sync),
        Command::ImageConfig {
            image,
            config,
            sync,
        } => image_config(&image, config, &sync),
    }
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn roots(paths: Vec<String>, min_depth: usize, os: &str) -> Result<()> {
    let paths = if paths.is_empty() {
        read_paths()?
    } else {
        paths
    };

    for root in approot::compute_common_roots(&paths, min_depth, os) {
        println!("{root}");
    }
    Ok(())
}

fn inspect(path: &str, os: &str) -> Result<()> {
    let dialect = dialect_for(os);
    let volume = path.get(..dialect.vol_len(path)).unwrap_or(path);

    println!("absolute: {}", dialect.is_abs(path));
    println!("depth:    {}", dialect.depth(path));
    println!("volume:   {volume}");
    Ok(())
}

fn app_roots(image: &str, sync: &SyncArgs) -> Result<()> {
    let artifact = Artifact::new(image, image);
    for root in debug::infer_app_roots(&artifact, &sync.resolver(), &sync.insecure()) {
        println!("{root}");
    }
    Ok(())
}

fn image_config(image: &str, config: PathBuf, sync: &SyncArgs) -> Result<()> {
    let resolver = sync.resolver();
    let builds: Vec<Artifact> = resolver
        .images()
        .with_context(|| format!("load {}", resolver.path().display()))?
        .into_iter()
        .map(|name| Artifact::new(name.clone(), name))
        .collect();

    let source = InspectFileSource::new(config);
    let cfg = debug::configuration_for_image(image, &builds, &source, &resolver, &sync.insecure())?;

    let out = serde_json::to_string_pretty(&cfg).context("encode image configuration")?;
    println!("{out}");
    Ok(())
}

fn read_paths() -> Result<Vec<String>> {
    use std::io::Read;
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read stdin")?;

    Ok(buf
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
