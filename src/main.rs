//! Faena CLI - construction scheduling from the command line.

use std::process;
use std::sync::Arc;

use clap::Parser;
use faena::backend::{Backend, BackendType, LocalBackend, RestBackend, UrlSigner};
use faena::cli::{
    ActivityCommands, BudgetCommands, Cli, Commands, ConfigCommands, MatrixCommands, OverrideCommands,
    PushCommands, ReflineCommands, WeeksCommands,
};
use faena::commands::{self, App, Output};
use faena::config::{self, ConfigFiles, ConfigOverrides, OutputFormat, ResolvedSettings};
use faena::notifications::{NotificationCenter, TerminalBell};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `FAENA_LOG=faena=debug`.
const LOG_ENV: &str = "FAENA_LOG";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut human = cli.human_readable;
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(faena::Error::from)
        .and_then(|runtime| runtime.block_on(run(cli, &mut human)));

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn overrides_from(cli: &Cli) -> faena::Result<ConfigOverrides> {
    let mut overrides = ConfigOverrides::new();
    if let Some(backend) = &cli.backend {
        let parsed = BackendType::parse(backend).ok_or_else(|| {
            faena::Error::InvalidInput(format!("backend must be 'local' or 'remote', got '{}'", backend))
        })?;
        overrides = overrides.with_backend(parsed);
    }
    overrides.remote_url = cli.remote_url.clone();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    Ok(overrides)
}

async fn run(cli: Cli, human: &mut bool) -> faena::Result<()> {
    let dir = config::data_dir(cli.data_dir.as_deref())?;
    let files = ConfigFiles::new(&dir);
    let overrides = overrides_from(&cli)?;
    let settings = config::resolve(&files.read_config()?, &files.read_state()?, &overrides);
    *human = settings.output_format.value == OutputFormat::Human;
    let human = *human;

    tracing::debug!(data_dir = %dir.display(), backend = %settings.backend.value, "resolved settings");

    match cli.command {
        Commands::Weeks { command } => match command {
            WeeksCommands::Expand { start, end } => output(&commands::weeks_expand(&start, &end)?, human),
            WeeksCommands::Between { start, end } => {
                output(&commands::weeks_between_cmd(&start, &end)?, human)
            }
            WeeksCommands::Validate { start, end } => {
                output(&commands::weeks_validate(&start, &end)?, human)
            }
        },
        Commands::Push { command } => match command {
            PushCommands::Decode { payload } => output(&commands::push_decode(&payload), human),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(&files, &settings), human),
            ConfigCommands::Set { key, value } => {
                output(&commands::config_set(&files, &key, &value)?, human)
            }
        },
        command => {
            let notifier = Arc::new(if human {
                NotificationCenter::with_sound(Box::new(TerminalBell))
            } else {
                NotificationCenter::new()
            });
            match settings.backend.value {
                BackendType::Local => {
                    let backend = Arc::new(LocalBackend::open(&dir)?);
                    run_backend(App::new(backend, settings, notifier), command, human).await?;
                }
                BackendType::Remote => {
                    let backend = Arc::new(remote_backend(&settings)?);
                    run_backend(App::new(backend, settings, notifier), command, human).await?;
                }
            }
        }
    }
    Ok(())
}

fn remote_backend(settings: &ResolvedSettings) -> faena::Result<RestBackend> {
    let url = settings.remote_url().ok_or_else(|| {
        faena::Error::Config(format!(
            "remote backend needs remote-url (config, --remote-url or {})",
            config::REMOTE_URL_ENV
        ))
    })?;
    let key = settings.api_key().ok_or_else(|| {
        faena::Error::Config(format!(
            "remote backend needs api-key (state.kdl or {})",
            config::API_KEY_ENV
        ))
    })?;
    RestBackend::new(url, key)
}

async fn run_backend<B: Backend + UrlSigner>(app: App<B>, command: Commands, human: bool) -> faena::Result<()> {
    match command {
        Commands::Override { command } => match command {
            OverrideCommands::List { client, project } => {
                output(&app.override_list(&client, &project).await?, human)
            }
            OverrideCommands::Set {
                client,
                project,
                month,
                concept,
                value,
            } => output(
                &app.override_set(&client, &project, &month, &concept, &value).await?,
                human,
            ),
            OverrideCommands::Rm {
                client,
                project,
                month,
                concept,
            } => output(&app.override_rm(&client, &project, &month, &concept).await?, human),
        },
        Commands::Refline { command } => match command {
            ReflineCommands::List { plan, start, months } => {
                output(&app.refline_list(&plan, start.as_deref(), months).await?, human)
            }
            ReflineCommands::Add {
                plan,
                at,
                label,
                color,
            } => output(&app.refline_add(&plan, &at, &label, color).await?, human),
            ReflineCommands::Update { id, at, label, color } => {
                output(&app.refline_update(&id, at.as_deref(), label, color).await?, human)
            }
            ReflineCommands::Rm { id } => output(&app.refline_rm(&id).await?, human),
        },
        Commands::Activity { command } => match command {
            ActivityCommands::List { client, project } => {
                output(&app.activity_list(&client, &project).await?, human)
            }
        },
        Commands::Budget { command } => match command {
            BudgetCommands::Set { client, project, file } => {
                output(&app.budget_set(&client, &project, &file).await?, human)
            }
            BudgetCommands::Show {
                client,
                project,
                discount,
            } => output(
                &app.budget_show(&client, &project, discount.as_deref()).await?,
                human,
            ),
            BudgetCommands::Sync { client, project } => {
                output(&app.budget_sync(&client, &project).await?, human)
            }
        },
        Commands::Matrix { command } => match command {
            MatrixCommands::Show { client, project, start } => {
                output(&app.matrix_show(&client, &project, &start).await?, human)
            }
        },
        Commands::Sign { bucket, path, ttl } => output(&app.sign(&bucket, &path, ttl).await?, human),
        Commands::Weeks { .. } | Commands::Push { .. } | Commands::Config { .. } => {
            return Err(faena::Error::Other("command does not use a backend".to_string()));
        }
    }
    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
