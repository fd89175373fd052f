use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pattern_sense::{
    clipboard::copy_output,
    extract::{extract_fields, is_bulk_paste},
    generation::{resolve_api_key, GeminiClient},
    history::HistoryItem,
    logging::{preview, EngineFormatter},
    prompt::{build_user_prompt, load_system_instruction},
    storage::FileStore,
    ConfigManager, HistoryStore, ScriptEngine, ScriptParams, ScriptType,
};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use time::{macros::format_description, UtcOffset};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pattern-sense", version, about = "Generate scripts and research guides with Gemini")]
struct Cli {
    /// Path to a config.jsonc to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a script or research guide
    Generate {
        #[command(flatten)]
        params: ParamArgs,
        /// Also write the generated text to this file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Copy the generated text to the clipboard
        #[arg(long)]
        copy: bool,
    },
    /// Print the assembled prompt without calling the service
    Prompt {
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Show how a pasted block splits into fields ("-" reads stdin)
    Extract { input: String },
    /// Inspect stored generations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored generations, newest first
    List,
    /// Print a stored generation (full id or unique prefix)
    Show { id: String },
    /// Delete a stored generation (full id or unique prefix)
    Delete { id: String },
}

#[derive(Args)]
struct ParamArgs {
    /// full, short or research-guide
    #[arg(long = "type", short = 't', default_value = "full")]
    script_type: ScriptType,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    hook: Option<String>,
    #[arg(long)]
    angle: Option<String>,
    #[arg(long)]
    keywords: Option<String>,
    /// Labelled block (Topic:/Hook:/Angle:/Keywords:) to split into fields; "-" reads stdin
    #[arg(long)]
    paste: Option<String>,
    /// Research notes for full and short scripts
    #[arg(long, conflicts_with = "research_file")]
    research: Option<String>,
    /// File holding research notes; "-" reads stdin
    #[arg(long)]
    research_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pattern_sense=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .event_format(EngineFormatter::new()),
        )
        .init();

    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::load()?,
    };

    match cli.command {
        Command::Generate {
            params,
            output,
            copy,
        } => run_generate(&config_manager, params, output, copy).await,
        Command::Prompt { params } => run_prompt(&config_manager, params),
        Command::Extract { input } => run_extract(&input),
        Command::History { action } => run_history(&config_manager, action),
    }
}

fn build_client(config_manager: &ConfigManager) -> Result<GeminiClient> {
    let generation = &config_manager.get().generation;
    let api_key = resolve_api_key(generation.api_key.as_deref());
    GeminiClient::new(api_key, generation)
}

fn build_engine(
    config_manager: &ConfigManager,
    client: GeminiClient,
) -> Result<ScriptEngine<FileStore>> {
    let system_instruction =
        load_system_instruction(config_manager.system_prompt_path().as_deref())?;
    let store = FileStore::new(config_manager.history_dir()?)?;
    let history = HistoryStore::load(store);

    Ok(ScriptEngine::new(
        Arc::new(client),
        system_instruction,
        history,
    ))
}

async fn run_generate(
    config_manager: &ConfigManager,
    args: ParamArgs,
    output: Option<PathBuf>,
    copy: bool,
) -> Result<()> {
    let client = build_client(config_manager)?;
    client.initialize()?;
    info!("Model: {}", client.model());

    let mut engine = build_engine(config_manager, client)?;
    fill_params(&mut engine, args)?;

    if let Err(reason) = engine.params().validate() {
        bail!("Cannot submit: {reason}");
    }

    let shutdown = engine.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT (Ctrl+C), cancelling request");
            shutdown.cancel();
        }
    });

    let content = engine.submit().await?;
    println!("{content}");

    if let Some(path) = output {
        fs::write(&path, &content)
            .with_context(|| format!("Failed to write output to {:?}", path))?;
        info!("Wrote output to {:?}", path);
    }

    if copy || config_manager.get().auto_copy_clipboard {
        if copy_output(&content) {
            info!("📋 Output copied to clipboard");
        }
    }

    Ok(())
}

fn run_prompt(config_manager: &ConfigManager, args: ParamArgs) -> Result<()> {
    let mut engine = build_engine(config_manager, build_client(config_manager)?)?;
    fill_params(&mut engine, args)?;

    if let Err(reason) = engine.params().validate() {
        warn!("This request would not be submitted: {reason}");
    }

    println!("{}", build_user_prompt(engine.params()));
    Ok(())
}

fn run_extract(input: &str) -> Result<()> {
    let text = read_arg(input)?;
    let fields = extract_fields(&text);

    println!("bulk paste: {}", if is_bulk_paste(&text) { "yes" } else { "no" });
    for (name, value) in [
        ("title", &fields.title),
        ("hook", &fields.hook),
        ("angle", &fields.angle),
        ("keywords", &fields.keywords),
    ] {
        match value {
            Some(value) => println!("{name:<9} {}", preview(value, 120)),
            None => println!("{name:<9} (unchanged)"),
        }
    }
    Ok(())
}

fn run_history(config_manager: &ConfigManager, action: HistoryAction) -> Result<()> {
    let mut engine = build_engine(config_manager, build_client(config_manager)?)?;

    match action {
        HistoryAction::List => {
            if engine.history().is_empty() {
                println!("No history stored.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "Created", "Type", "Title", "Preview"]);

            for item in engine.history().items() {
                table.add_row(vec![
                    item.id.chars().take(8).collect::<String>(),
                    format_created(item),
                    item.params.script_type.label().to_string(),
                    item.params.display_title().to_string(),
                    preview(&item.content, 48),
                ]);
            }

            println!("{table}");
            println!(
                "{} of {} slots used",
                engine.history().len(),
                engine.history().capacity()
            );
        }
        HistoryAction::Show { id } => {
            let Some(id) = resolve_history_id(&engine, &id) else {
                bail!("No history item matches '{id}'");
            };
            let Some(item) = engine.select_history(&id).cloned() else {
                bail!("No history item matches '{id}'");
            };
            let params = &engine.state().params;

            println!("id:        {}", item.id);
            println!("created:   {}", format_created(&item));
            println!("type:      {}", params.script_type);
            println!("title:     {}", params.display_title());
            if !params.hook.is_empty() {
                println!("hook:      {}", params.hook);
            }
            if !params.angle.is_empty() {
                println!("angle:     {}", params.angle);
            }
            if !params.keywords.is_empty() {
                println!("keywords:  {}", params.keywords);
            }
            println!();
            println!("{}", engine.state().output);
        }
        HistoryAction::Delete { id } => match resolve_history_id(&engine, &id) {
            Some(full_id) if engine.delete_history(&full_id)? => println!("Deleted {full_id}"),
            _ => println!("No history item matches '{id}', nothing deleted"),
        },
    }

    Ok(())
}

/// Accepts a full id or a prefix matching exactly one stored id.
fn resolve_history_id(engine: &ScriptEngine<FileStore>, id: &str) -> Option<String> {
    engine.history().find(id).map(|item| item.id.clone())
}

/// Stdin can feed only one input per run.
fn ensure_single_stdin_reader(args: &ParamArgs) -> Result<()> {
    let paste_from_stdin = args.paste.as_deref() == Some("-");
    let research_from_stdin = args
        .research_file
        .as_deref()
        .is_some_and(|path| path.as_os_str() == "-");
    if paste_from_stdin && research_from_stdin {
        bail!("--paste - and --research-file - cannot both read stdin");
    }
    Ok(())
}

fn fill_params(engine: &mut ScriptEngine<FileStore>, args: ParamArgs) -> Result<()> {
    ensure_single_stdin_reader(&args)?;
    engine.set_params(ScriptParams::new(args.script_type));

    if let Some(paste) = args.paste.as_deref() {
        let block = read_arg(paste)?;
        engine.apply_title_input(&block);
    }

    let mut params = engine.params().clone();
    if let Some(title) = args.title {
        params.title = title;
    }
    if let Some(hook) = args.hook {
        params.hook = hook;
    }
    if let Some(angle) = args.angle {
        params.angle = angle;
    }
    if let Some(keywords) = args.keywords {
        params.keywords = keywords;
    }
    if let Some(research) = args.research {
        params.research_material = research;
    } else if let Some(path) = args.research_file {
        params.research_material = if path.as_os_str() == "-" {
            read_stdin()?
        } else {
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read research notes at {:?}", path))?
        };
    }

    engine.set_params(params);
    Ok(())
}

fn read_arg(value: &str) -> Result<String> {
    if value == "-" {
        read_stdin()
    } else {
        Ok(value.to_string())
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

fn format_created(item: &HistoryItem) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    item.created_at()
        .and_then(|at| {
            at.to_offset(offset)
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| "unknown".to_string())
}
