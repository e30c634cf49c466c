use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use topicstore_core::{
    ChangeWatcher, ForumConfig, HttpRevisionLog, IntervalPoller, PostId, RevisionSnapshot,
    SaveOutcome, SharedTopicStore, StoreBackend, StoreConfig, StoreError, TopicId,
};
use tracing_subscriber::EnvFilter;

/// Settings file layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    forum: ForumConfig,
    store: StoreConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            forum: ForumConfig::default(),
            store: StoreConfig::forum_page(),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn topic_arg() -> Arg {
    Arg::new("topic")
        .long("topic")
        .required(true)
        .value_parser(value_parser!(u64))
        .help("Forum topic holding the document")
}

fn cli() -> Command {
    Command::new("topicstore")
        .version(topicstore_core::VERSION)
        .about("Read and write JSON documents kept in forum topics")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("Forum base URL, overriding the settings file"),
        )
        .subcommand(
            Command::new("load")
                .about("Print the latest revision as JSON")
                .arg(topic_arg()),
        )
        .subcommand(
            Command::new("save")
                .about("Post a new revision and wait for it to appear")
                .arg(topic_arg())
                .arg(
                    Arg::new("file")
                        .long("file")
                        .default_value("-")
                        .value_parser(value_parser!(PathBuf))
                        .help("Document to save; '-' reads stdin"),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Wait for the topic to move past a post")
                .arg(topic_arg())
                .arg(
                    Arg::new("baseline")
                        .long("baseline")
                        .value_parser(value_parser!(u64))
                        .help("Post id to move past; any post counts when omitted"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .default_value("50000")
                        .value_parser(value_parser!(u64))
                        .help("How long to wait"),
                ),
        )
}

fn read_document(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading document from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn topic_of(args: &ArgMatches) -> Result<TopicId> {
    match args.get_one::<u64>("topic") {
        Some(topic) => Ok(TopicId(*topic)),
        None => bail!("--topic is required"),
    }
}

async fn run_load(config: &CliConfig, topic: TopicId) -> Result<()> {
    let backend = StoreBackend::http(&config.forum, &config.store)?;
    let store = SharedTopicStore::new(topic, backend, config.store);
    let snapshot = store.load_data().await?;
    print_json(&snapshot)
}

async fn run_save(config: &CliConfig, topic: TopicId, file: &Path) -> Result<()> {
    let document = read_document(file)?;
    let backend = StoreBackend::http(&config.forum, &config.store)?;
    let store = SharedTopicStore::new(topic, backend, config.store);

    // The baseline must be known, or the current post would count as ours.
    match store.load_data().await {
        Ok(_) => {}
        Err(StoreError::NotFound(_)) => tracing::info!(%topic, "topic is empty"),
        Err(e) => return Err(e.into()),
    }

    let outcome = store.save_data(&document).await?;
    match &outcome {
        SaveOutcome::Confirmed(rev) => {
            tracing::info!(%topic, post = %rev.post_id, "save confirmed");
        }
        SaveOutcome::Unconfirmed { .. } => {
            tracing::warn!(%topic, "save not confirmed; reload later to check");
        }
    }
    print_json(&outcome)?;
    if !outcome.is_confirmed() {
        std::process::exit(2);
    }
    Ok(())
}

async fn run_watch(
    config: &CliConfig,
    topic: TopicId,
    baseline: Option<PostId>,
    timeout: Duration,
) -> Result<()> {
    let log = Arc::new(HttpRevisionLog::new(&config.forum)?);
    let poller = IntervalPoller::with_interval(log, config.store.poll_interval());
    let rev = poller.await_change(topic, baseline, timeout).await?;
    print_json(&RevisionSnapshot::from(&rev))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let mut config = load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.forum.base_url = base_url.clone();
    }

    match matches.subcommand() {
        Some(("load", args)) => run_load(&config, topic_of(args)?).await,
        Some(("save", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .map_or_else(|| PathBuf::from("-"), Clone::clone);
            run_save(&config, topic_of(args)?, &file).await
        }
        Some(("watch", args)) => {
            let baseline = args.get_one::<u64>("baseline").map(|id| PostId(*id));
            let timeout_ms = args.get_one::<u64>("timeout-ms").copied().unwrap_or(50_000);
            run_watch(
                &config,
                topic_of(args)?,
                baseline,
                Duration::from_millis(timeout_ms),
            )
            .await
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    }
}
