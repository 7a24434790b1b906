//! CLI entry point for the feedback analytics pipeline.
//!
//! Provides subcommands for the full analysis run, inspecting forms and
//! response sheets, fetching reference topics, summarizing free-text
//! answers, and uploading results to Google Drive.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use feedback_analytics::{
    config::Settings,
    fetch::BasicClient,
    google::{
        self, DriveClient, FormsClient, GoogleClient, SheetsClient,
        auth::{READ_SCOPES, UPLOAD_SCOPES},
    },
    llm::OpenAiClient,
    output::{print_json, write_json, write_table},
    pipeline::analyze_session,
    questions::TOPIC,
    services::{CsvFileSource, ResponseSource, response_source::DEFAULT_WORKSHEET},
    summarizer::{FeedbackSummarizer, load_few_shot_examples},
    table::Table,
    topics::{
        CacheStore, FileCacheStore, MemoryCacheStore, SessionType, TopicCategorizer,
        get_reference_topics,
    },
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const SEMINAR_TITLE: &str = "Seminar Feedback (Responses)";
const WONDER_TITLE: &str = "Wonder Session Feedback (Responses)";

#[derive(Parser)]
#[command(name = "feedback_analytics")]
#[command(about = "Analyze Seminar and Wonder Session feedback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, clean, categorize and aggregate both session types
    Run {
        /// Read Seminar responses from this CSV instead of Google Sheets
        #[arg(long)]
        seminar_csv: Option<PathBuf>,

        /// Read Wonder Session responses from this CSV instead of Google Sheets
        #[arg(long)]
        wonder_csv: Option<PathBuf>,

        /// Title of the Seminar response spreadsheet
        #[arg(long, default_value = SEMINAR_TITLE)]
        seminar_title: String,

        /// Title of the Wonder Session response spreadsheet
        #[arg(long, default_value = WONDER_TITLE)]
        wonder_title: String,

        /// Worksheet holding the form responses
        #[arg(long, default_value = DEFAULT_WORKSHEET)]
        worksheet: String,

        /// Read responses through the Forms API; the titles are then form IDs
        #[arg(long, default_value_t = false)]
        from_forms: bool,

        /// Column holding the free-text session topic
        #[arg(long, default_value = TOPIC)]
        topic_column: String,

        /// Directory to write output files to (overrides OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Keep categorizations in memory only
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Reuse cached categorization failures instead of retrying them
        #[arg(long, default_value_t = false)]
        keep_failed_matches: bool,

        /// Also summarize the free-text answers
        #[arg(long, default_value_t = false)]
        summaries: bool,

        /// Few-shot exemplars for the summaries (CSV or JSON)
        #[arg(long)]
        few_shot: Option<PathBuf>,

        /// Upload the output directory to DRIVE_FOLDER_ID afterwards
        #[arg(long, default_value_t = false)]
        upload: bool,
    },
    /// Print the reference topics currently in effect
    ReferenceTopics {
        #[arg(value_enum)]
        session: SessionType,
    },
    /// Print basic information about a form
    FormInfo {
        /// Form ID (defaults to FORM_ID)
        #[arg(long)]
        form_id: Option<String>,
    },
    /// Fetch all responses of a form through the Forms API
    FormResponses {
        /// Form ID (defaults to FORM_ID)
        #[arg(long)]
        form_id: Option<String>,

        /// CSV file to write (defaults to a timestamped file in the output dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fetch responses from a spreadsheet by ID
    SheetResponses {
        /// Spreadsheet ID (defaults to SPREADSHEET_ID)
        #[arg(long)]
        spreadsheet_id: Option<String>,

        /// Worksheet name or A1 range
        #[arg(long, default_value = DEFAULT_WORKSHEET)]
        range: String,

        /// CSV file to write (defaults to a timestamped file in the output dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload every file of a local directory to Google Drive
    Upload {
        /// Directory to upload (defaults to OUTPUT_DIR)
        #[arg(short = 'd', long)]
        dir: Option<PathBuf>,

        /// Target folder ID (defaults to DRIVE_FOLDER_ID, else the Drive root)
        #[arg(long)]
        folder_id: Option<String>,
    },
    /// Create a folder in Google Drive and print its ID
    CreateFolder {
        name: String,

        /// Parent folder ID
        #[arg(long)]
        parent: Option<String>,
    },
    /// Summarize the free-text answers of a response CSV
    Summarize {
        #[arg(value_name = "CSV")]
        input: PathBuf,

        /// Few-shot exemplars (CSV or JSON)
        #[arg(long)]
        few_shot: Option<PathBuf>,

        /// JSON file to write the summaries to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options of the `run` subcommand after merging with [`Settings`].
struct RunOptions {
    seminar_csv: Option<PathBuf>,
    wonder_csv: Option<PathBuf>,
    seminar_title: String,
    wonder_title: String,
    worksheet: String,
    from_forms: bool,
    topic_column: String,
    output_dir: PathBuf,
    summaries: bool,
    few_shot: Option<PathBuf>,
    upload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    let settings = Settings::from_env();

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = settings
        .log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = settings
        .log_file_path
        .file_name()
        .unwrap_or(OsStr::new("feedback_analytics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            seminar_csv,
            wonder_csv,
            seminar_title,
            wonder_title,
            worksheet,
            from_forms,
            topic_column,
            output_dir,
            no_cache,
            keep_failed_matches,
            summaries,
            few_shot,
            upload,
        } => {
            let options = RunOptions {
                seminar_csv,
                wonder_csv,
                seminar_title,
                wonder_title,
                worksheet,
                from_forms,
                topic_column,
                output_dir: output_dir.unwrap_or_else(|| settings.output_dir.clone()),
                summaries,
                few_shot,
                upload,
            };

            if no_cache {
                info!("Topic cache disabled, categorizations kept in memory");
                run(&settings, &options, MemoryCacheStore::new()).await?;
            } else {
                let store = FileCacheStore::load(&settings.topic_cache_file, !keep_failed_matches);
                run(&settings, &options, store).await?;
            }
        }
        Commands::ReferenceTopics { session } => {
            let client = BasicClient::new();
            let topics =
                get_reference_topics(&client, &settings.reference_topics_url, session).await?;
            for (i, topic) in topics.iter().enumerate() {
                info!(position = i + 1, topic = %topic, "Reference topic");
            }
        }
        Commands::FormInfo { form_id } => {
            let form_id = match form_id {
                Some(id) => id,
                None => settings.form_id()?.to_string(),
            };
            let client = FormsClient::new(google_client(&settings, READ_SCOPES).await?);
            let info = client.get_form_info(&form_id).await?;
            print_json(&info)?;
        }
        Commands::FormResponses { form_id, output } => {
            let form_id = match form_id {
                Some(id) => id,
                None => settings.form_id()?.to_string(),
            };
            let client = FormsClient::new(google_client(&settings, READ_SCOPES).await?);
            let table = client.get_responses(&form_id).await?;
            save_responses(&settings, &table, output, "form_responses")?;
        }
        Commands::SheetResponses {
            spreadsheet_id,
            range,
            output,
        } => {
            let spreadsheet_id = match spreadsheet_id {
                Some(id) => id,
                None => settings.spreadsheet_id()?.to_string(),
            };
            let client = SheetsClient::new(google_client(&settings, READ_SCOPES).await?);
            let table = client.get_values(&spreadsheet_id, &range).await?;
            save_responses(&settings, &table, output, "sheet_responses")?;
        }
        Commands::Upload { dir, folder_id } => {
            let dir = dir.unwrap_or_else(|| settings.output_dir.clone());
            let folder_id = folder_id.or_else(|| settings.drive_folder_id.clone());
            let client = DriveClient::new(google_client(&settings, UPLOAD_SCOPES).await?);
            client.upload_files(folder_id.as_deref(), &dir).await?;
        }
        Commands::CreateFolder { name, parent } => {
            let client = DriveClient::new(google_client(&settings, UPLOAD_SCOPES).await?);
            let id = client.create_folder(&name, parent.as_deref()).await?;
            println!("{id}");
        }
        Commands::Summarize {
            input,
            few_shot,
            output,
        } => {
            let table = CsvFileSource::File(input)
                .fetch_responses("summarize", DEFAULT_WORKSHEET)
                .await?;
            let table = feedback_analytics::cleaner::clean_responses(table);
            let summarizer = summarizer(&settings, few_shot.as_deref())?;
            let summaries = summarizer.summarize_qualitative_feedback(&table).await;

            match output {
                Some(path) => {
                    write_json(&path, &summaries)?;
                    info!(path = %path.display(), columns = summaries.len(), "Summaries written");
                }
                None => print_json(&summaries)?,
            }
        }
    }

    Ok(())
}

/// Full analysis of both session types, optionally followed by a Drive
/// upload of the output directory.
#[tracing::instrument(skip_all, fields(output_dir = %options.output_dir.display()))]
async fn run<S: CacheStore>(settings: &Settings, options: &RunOptions, store: S) -> Result<()> {
    let model = completion_model(settings)?;
    let mut categorizer = TopicCategorizer::new(model, store);
    let summarizer = if options.summaries {
        Some(summarizer(settings, options.few_shot.as_deref())?)
    } else {
        None
    };

    let needs_remote = options.seminar_csv.is_none() || options.wonder_csv.is_none();
    let remote: Option<Box<dyn ResponseSource>> = if needs_remote {
        match google_client(settings, READ_SCOPES).await {
            Ok(client) if options.from_forms => Some(Box::new(FormsClient::new(client))),
            Ok(client) => Some(Box::new(SheetsClient::new(client))),
            Err(e) => {
                error!(error = %e, "Google authentication failed, remote sources unavailable");
                None
            }
        }
    } else {
        None
    };

    let reference_client = BasicClient::new();
    let sessions = [
        (SessionType::Seminar, &options.seminar_title, &options.seminar_csv),
        (SessionType::WonderSession, &options.wonder_title, &options.wonder_csv),
    ];

    for (session, title, csv) in sessions {
        let result = match (csv, &remote) {
            (Some(path), _) => {
                CsvFileSource::File(path.clone())
                    .fetch_responses(title, &options.worksheet)
                    .await
            }
            (None, Some(remote)) => remote.fetch_responses(title, &options.worksheet).await,
            (None, None) => Err(anyhow!("No response source available")),
        };
        let raw = result.unwrap_or_else(|e| {
            error!(session = %session, title = %title, error = %e, "Failed to fetch responses");
            Table::default()
        });

        let reference_topics =
            get_reference_topics(&reference_client, &settings.reference_topics_url, session)
                .await
                .unwrap_or_else(|e| {
                    error!(session = %session, error = %e, "Failed to load reference topics");
                    Vec::new()
                });

        let report = analyze_session(
            raw,
            session,
            &reference_topics,
            &mut categorizer,
            summarizer.as_ref(),
            &options.topic_column,
            &options.output_dir,
        )
        .await?;

        info!(
            session = %report.session,
            responses = report.responses,
            unique_topics = report.categorization.total_unique_topics,
            unmatched_entries = report.categorization.unmatched_entries,
            "Session complete"
        );
    }

    info!(cached = categorizer.store().len(), "Analysis finished");

    if options.upload {
        match &settings.drive_folder_id {
            Some(folder_id) => {
                let client = DriveClient::new(google_client(settings, UPLOAD_SCOPES).await?);
                client
                    .upload_files(Some(folder_id), &options.output_dir)
                    .await?;
            }
            None => warn!("DRIVE_FOLDER_ID not set, skipping upload"),
        }
    }

    Ok(())
}

fn completion_model(settings: &Settings) -> Result<OpenAiClient> {
    let mut model = OpenAiClient::new(settings.openai_api_key()?, &settings.openai_model)?;
    if let Some(base_url) = &settings.openai_base_url {
        model = model.with_base_url(base_url.as_str());
    }
    info!(model = model.model(), base_url = model.base_url(), "Completion model configured");
    Ok(model)
}

async fn google_client(settings: &Settings, scopes: &[&str]) -> Result<GoogleClient> {
    google::authorize(settings.service_account_file()?, scopes).await
}

fn summarizer(settings: &Settings, few_shot: Option<&Path>) -> Result<FeedbackSummarizer<OpenAiClient>> {
    let model = completion_model(settings)?;
    let examples = match few_shot {
        Some(path) => load_few_shot_examples(path)?,
        None => Vec::new(),
    };
    Ok(FeedbackSummarizer::new(model).with_examples(examples))
}

/// Writes fetched responses to `output`, or to a timestamped file in the
/// output directory.
fn save_responses(
    settings: &Settings,
    table: &Table,
    output: Option<PathBuf>,
    stem: &str,
) -> Result<()> {
    if table.is_empty() {
        warn!("No data to save");
        return Ok(());
    }

    let path = output.unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        settings.output_dir.join(format!("{stem}_{stamp}.csv"))
    });
    write_table(&path, table)?;
    info!(path = %path.display(), responses = table.len(), "Responses saved");
    Ok(())
}
