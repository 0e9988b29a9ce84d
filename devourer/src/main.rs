use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::*;
use devourer::{
    init_logging, Attachment, ClientConfig, HttpTaskRemote, LoadSource, SyncCoordinator,
    TagSelection, Task, TaskEvent, TaskKey, WriteOutcome,
};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::{Path, PathBuf};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "devourer")]
#[command(about = "Personal task tracker with offline fallback", long_about = None)]
struct Cli {
    /// Backend base URL (overrides DEVOURER_API_URL)
    #[arg(short, long)]
    api_url: Option<String>,

    /// Work on the local task file only
    #[arg(long, conflicts_with = "api_url")]
    offline: bool,

    /// Local task file (overrides DEVOURER_DATA_FILE)
    #[arg(short, long)]
    data_file: Option<PathBuf>,

    /// Show where every change was saved
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks, optionally filtered
    List {
        /// Case-insensitive text to look for in title or description
        #[arg(short, long)]
        search: Option<String>,
        /// Only tasks carrying this tag ("All" for every task)
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// List every tag in use
    Tags,
    /// Add a task
    Add {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Due date, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS (default: today)
        #[arg(long)]
        due: Option<String>,
    },
    /// Change a task's fields and tags in one save
    Edit {
        /// Position in `list` (1-based)
        task: usize,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long = "add-tag")]
        add_tags: Vec<String>,
        #[arg(long = "remove-tag")]
        remove_tags: Vec<String>,
    },
    /// Mark a task completed
    Done { task: usize },
    /// Mark a task not completed
    Undo { task: usize },
    /// Delete a task
    Rm { task: usize },
    /// Delete every completed task
    Clean {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Add a copy of a task
    #[command(name = "clone")]
    Duplicate { task: usize },
    /// Work with sub-tasks
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// Add or remove tags
    #[command(subcommand)]
    Tag(TagCommand),
    /// Add or remove attachments
    #[command(subcommand)]
    Attach(AttachCommand),
    /// Upload every task to the backend, replacing what it holds
    Sync,
}

#[derive(Subcommand)]
enum SubtaskCommand {
    Add { task: usize, title: String },
    /// Flip a sub-task between open and completed
    Toggle { task: usize, index: usize },
    Rename { task: usize, index: usize, title: String },
    Rm { task: usize, index: usize },
}

#[derive(Subcommand)]
enum TagCommand {
    Add { task: usize, tag: String },
    Rm { task: usize, tag: String },
}

#[derive(Subcommand)]
enum AttachCommand {
    Add { task: usize, path: PathBuf },
    Rm { task: usize, index: usize },
}

type Coordinator = SyncCoordinator<HttpTaskRemote>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config.api_base_url = Some(url.clone());
    }
    if cli.offline {
        config.api_base_url = None;
    }
    if let Some(path) = &cli.data_file {
        config.data_file = path.clone();
    }

    init_logging(&config.log_filter, config.log_file.as_deref())?;
    tracing::info!("Application starting");

    let mut coordinator = SyncCoordinator::from_config(&config)?;
    let events = coordinator.events();
    let verbose = cli.verbose;
    events.register_callback(move |event| print_event(&event, verbose))?;

    let report = coordinator.initialize().await;
    if verbose || report.source != LoadSource::Remote {
        let source = match report.source {
            LoadSource::Remote => "server".green(),
            LoadSource::Local => config.data_file.display().to_string().yellow(),
            LoadSource::Empty => "nothing".red(),
        };
        println!("📂 {} tasks loaded from {}", report.count, source);
    }

    let result = run(&mut coordinator, cli.command).await;
    events.process_events()?;
    tracing::info!("Application exiting");
    result
}

async fn run(coordinator: &mut Coordinator, command: Command) -> CliResult<()> {
    match command {
        Command::List { search, tag } => {
            if let Some(search) = search {
                coordinator.set_search_text(&search);
            }
            if let Some(tag) = tag {
                coordinator.select_tag(TagSelection::parse(&tag));
            }
            list_tasks(coordinator);
        }
        Command::Tags => {
            if coordinator.tag_universe().is_empty() {
                println!("🏷️  No tags yet.");
            }
            for tag in coordinator.tag_universe() {
                println!("🏷️  {}", tag.cyan());
            }
        }
        Command::Add {
            title,
            description,
            due,
        } => {
            let due = parse_due(due.as_deref())?;
            let outcome = coordinator.add_task(&title, &description, due).await;
            report(outcome, "Task added");
        }
        Command::Edit {
            task,
            title,
            description,
            due,
            add_tags,
            remove_tags,
        } => {
            let key = task_at(coordinator, task)?;
            let Some(mut session) = coordinator.begin_edit(key) else {
                return Err(format!("No task #{task}").into());
            };
            if let Some(title) = title {
                session.set_title(title);
            }
            if let Some(description) = description {
                session.set_description(description);
            }
            if let Some(due) = due {
                session.set_due_date(parse_due(Some(&due))?);
            }
            for tag in &add_tags {
                session.add_tag(tag);
            }
            for tag in &remove_tags {
                session.remove_tag(tag);
            }
            let outcome = coordinator.commit_edit(session).await;
            report(outcome, "Task updated");
        }
        Command::Done { task } => {
            let key = task_at(coordinator, task)?;
            report(coordinator.set_completed(key, true).await, "Task completed");
        }
        Command::Undo { task } => {
            let key = task_at(coordinator, task)?;
            report(coordinator.set_completed(key, false).await, "Task reopened");
        }
        Command::Rm { task } => {
            let key = task_at(coordinator, task)?;
            report(coordinator.delete_task(key).await, "Task deleted");
        }
        Command::Clean { yes } => {
            let deleted = coordinator
                .delete_completed(|count| {
                    yes || Confirm::with_theme(&ColorfulTheme::default())
                        .with_prompt(format!("Delete {count} completed task(s)?"))
                        .default(false)
                        .interact()
                        .unwrap_or(false)
                })
                .await;
            println!("🗑️  {} completed task(s) deleted", deleted);
        }
        Command::Duplicate { task } => {
            let key = task_at(coordinator, task)?;
            report(coordinator.clone_task(key).await, "Task cloned");
        }
        Command::Subtask(command) => run_subtask(coordinator, command).await?,
        Command::Tag(TagCommand::Add { task, tag }) => {
            let key = task_at(coordinator, task)?;
            report(coordinator.add_tag(key, &tag).await, "Tag added");
        }
        Command::Tag(TagCommand::Rm { task, tag }) => {
            let key = task_at(coordinator, task)?;
            report(coordinator.remove_tag(key, &tag).await, "Tag removed");
        }
        Command::Attach(AttachCommand::Add { task, path }) => {
            let key = task_at(coordinator, task)?;
            let attachment = attachment_for(&path)?;
            report(
                coordinator.add_attachment(key, attachment).await,
                "Attachment added",
            );
        }
        Command::Attach(AttachCommand::Rm { task, index }) => {
            let key = task_at(coordinator, task)?;
            let item = coordinator
                .task(key)
                .and_then(|t| index.checked_sub(1).and_then(|i| t.attachments().get(i)))
                .map(|a| a.key)
                .ok_or_else(|| format!("Task #{task} has no attachment #{index}"))?;
            report(
                coordinator.remove_attachment(key, item).await,
                "Attachment removed",
            );
        }
        Command::Sync => {
            if !coordinator.has_remote() {
                println!("{}", "⚠️  No backend configured, saving locally".yellow());
            }
            report(coordinator.sync_all().await, "Tasks synchronized");
        }
    }
    Ok(())
}

async fn run_subtask(coordinator: &mut Coordinator, command: SubtaskCommand) -> CliResult<()> {
    match command {
        SubtaskCommand::Add { task, title } => {
            let key = task_at(coordinator, task)?;
            report(coordinator.add_sub_task(key, &title).await, "Sub-task added");
        }
        SubtaskCommand::Toggle { task, index } => {
            let key = task_at(coordinator, task)?;
            let (item, completed) = {
                let sub = sub_task_at(coordinator, key, task, index)?;
                (sub.key, sub.is_completed)
            };
            let outcome = coordinator
                .set_sub_task_completed(key, item, !completed)
                .await;
            report(outcome, "Sub-task updated");
        }
        SubtaskCommand::Rename { task, index, title } => {
            let key = task_at(coordinator, task)?;
            let item = sub_task_at(coordinator, key, task, index)?.key;
            report(
                coordinator.rename_sub_task(key, item, &title).await,
                "Sub-task renamed",
            );
        }
        SubtaskCommand::Rm { task, index } => {
            let key = task_at(coordinator, task)?;
            let item = sub_task_at(coordinator, key, task, index)?.key;
            report(
                coordinator.remove_sub_task(key, item).await,
                "Sub-task removed",
            );
        }
    }
    Ok(())
}

fn task_at(coordinator: &Coordinator, position: usize) -> CliResult<TaskKey> {
    position
        .checked_sub(1)
        .and_then(|i| coordinator.tasks().get(i))
        .map(Task::key)
        .ok_or_else(|| format!("No task #{position}").into())
}

fn sub_task_at<'a>(
    coordinator: &'a Coordinator,
    key: TaskKey,
    position: usize,
    index: usize,
) -> CliResult<&'a devourer::SubTask> {
    coordinator
        .task(key)
        .and_then(|t| index.checked_sub(1).and_then(|i| t.sub_tasks().get(i)))
        .ok_or_else(|| format!("Task #{position} has no sub-task #{index}").into())
}

fn parse_due(raw: Option<&str>) -> CliResult<NaiveDateTime> {
    let today = || Local::now().date_naive().and_hms_opt(0, 0, 0);
    let parsed = match raw.map(str::trim) {
        None | Some("") => today(),
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date.and_hms_opt(0, 0, 0),
            Err(_) => Some(raw.parse::<NaiveDateTime>()?),
        },
    };
    parsed.ok_or_else(|| "Invalid due date".into())
}

fn attachment_for(path: &Path) -> CliResult<Attachment> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| format!("Cannot attach {}: {e}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("{} is not a file", path.display()))?;
    let full_path = std::fs::canonicalize(path)?;
    Ok(Attachment::new(
        file_name,
        Some(full_path.display().to_string()),
        i64::try_from(metadata.len()).unwrap_or(i64::MAX),
    ))
}

fn list_tasks(coordinator: &Coordinator) {
    let visible = coordinator.filtered_tasks();
    if visible.is_empty() {
        println!("📭 No tasks found.");
        return;
    }

    println!("{}", "📋 Your Tasks:".bold());
    println!("{}", "─".repeat(80).dimmed());
    for task in visible {
        let position = coordinator
            .tasks()
            .iter()
            .position(|t| t.key() == task.key())
            .map(|i| i + 1)
            .unwrap_or_default();
        let status_icon = if task.is_completed() { "✅" } else { "⏳" };
        let title = if task.is_completed() {
            task.title.dimmed().strikethrough()
        } else {
            task.title.white().bold()
        };
        let progress = task.progress();
        let counters = if progress.total > 0 {
            format!(" ({}/{})", progress.completed, progress.total)
        } else {
            String::new()
        };
        let tags = if task.tags().is_empty() {
            String::new()
        } else {
            format!(" [{}]", task.tags().join(", "))
        };
        let sync_icon = if task.is_persisted_remotely() { "" } else { " 📱" };

        println!(
            "{:>3}. {} {}{}{} {}{}",
            position,
            status_icon,
            title,
            counters.cyan(),
            tags.blue(),
            task.due_date.format("due %Y-%m-%d").to_string().dimmed(),
            sync_icon
        );
        if !task.description.is_empty() {
            println!("       {}", task.description.dimmed());
        }
        for (i, sub) in task.sub_tasks().iter().enumerate() {
            let mark = if sub.is_completed { "☑" } else { "☐" };
            println!("       {}.{} {} {}", position, i + 1, mark, sub.title);
        }
        for (i, att) in task.attachments().iter().enumerate() {
            let name = if att.is_available() {
                att.file_name.normal()
            } else {
                att.file_name.dimmed()
            };
            println!("       📎{} {} ({} bytes)", i + 1, name, att.size_bytes);
        }
    }
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", "Legend: ✅=done ⏳=open | 📱=not on server yet".dimmed());
}

fn report(outcome: WriteOutcome, done: &str) {
    match outcome {
        WriteOutcome::PersistedRemote => println!("✅ {}", done.green()),
        WriteOutcome::PersistedLocalFallback => {
            println!("💾 {} {}", done.green(), "(saved locally)".yellow())
        }
        WriteOutcome::Rejected(reason) => {
            println!("{}", format!("⚠️  Nothing changed: {reason}").yellow())
        }
        WriteOutcome::NotPersisted => println!(
            "{}",
            format!("❌ {done}, but it could not be saved").red()
        ),
    }
}

fn print_event(event: &TaskEvent, verbose: bool) {
    match event {
        TaskEvent::RemoteFailed { operation, message } => {
            if verbose {
                println!("{}", format!("🌐 {operation} failed: {message}").yellow());
            }
        }
        TaskEvent::PersistFailed { message } => {
            eprintln!("{}", format!("❌ Could not write task file: {message}").red());
        }
        TaskEvent::LoadFailed { message } => {
            eprintln!("{}", format!("❌ Could not load tasks: {message}").red());
        }
        TaskEvent::Persisted { key, outcome } if verbose => {
            let scope = key.map(|k| k.to_string()).unwrap_or_else(|| "all".into());
            println!("{}", format!("   {scope}: {outcome:?}").dimmed());
        }
        _ => {}
    }
}
