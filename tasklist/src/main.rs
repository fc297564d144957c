//! `tasklist`: line-oriented task list driver.
//!
//! Runs against the in-process store. Suggestions come from the remote
//! classification functions when a functions URL is configured.
//!
//! ```bash
//! # Local only, no suggestions
//! cargo run --bin tasklist -- --user-id alice
//!
//! # With classification functions
//! cargo run --bin tasklist -- --user-id alice \
//!     --functions-url http://127.0.0.1:54321/functions/v1 --api-key anon
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use tasklist::config::{AppConfig, CliArgs};
use tasklist::enrich::{Enricher, FixedEnricher, HttpEnricher, SlotState};
use tasklist::session::Session;
use tasklist::store::InMemoryStore;
use tasklist::tasks::{Filter, TaskDraft, TaskListEvent, TaskListHandle};
use tasklist_proto::{SortOrder, Task, TaskId, UserId};

const DEFAULT_USER: &str = "local";

const HELP: &str = "\
commands:
  add <title> [due:YYYY-MM-DD]   create a task
  toggle <n|id>                  flip completion
  rm <n|id>                      delete a task
  list                           show the visible tasks
  sort <order>                   created-asc, created-desc, due-asc, due-desc
  filter <all|category>          personal, work, shopping, health, other
  type <text>                    preview suggestions for a title
  help                           this text
  quit                           exit";

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let mut config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            AppConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("tasklist starting");

    let user = UserId::new(config.user_id.clone().unwrap_or_else(|| DEFAULT_USER.to_string()));
    let store = Arc::new(InMemoryStore::signed_in(user));

    let result = match config.functions_url.clone() {
        Some(url) => {
            match HttpEnricher::new(&url, config.api_key.clone(), config.request_timeout) {
                Ok(enricher) => run(store, Arc::new(enricher), &config).await,
                Err(e) => {
                    eprintln!("Warning: suggestions unavailable ({e})");
                    config.task_list.enrichment.enabled = false;
                    run(store, Arc::new(FixedEnricher::new()), &config).await
                }
            }
        }
        None => {
            tracing::info!("no functions url configured, suggestions disabled");
            config.task_list.enrichment.enabled = false;
            run(store, Arc::new(FixedEnricher::new()), &config).await
        }
    };

    tracing::info!("tasklist exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs go to a file so they never interleave with the prompt. Returns a
/// [`WorkerGuard`] that must be held until shutdown to flush buffered lines.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasklist.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

enum Flow {
    Continue,
    Quit,
}

/// Signs in, then alternates between stdin commands and task-list events.
async fn run<E: Enricher>(
    store: Arc<InMemoryStore>,
    enricher: Arc<E>,
    config: &AppConfig,
) -> io::Result<()> {
    let mut session = match Session::sign_in(store, enricher, &config.task_list).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("could not start session: {e}");
            return Ok(());
        }
    };
    println!("signed in as {} (type `help` for commands)", session.user());

    let handle = session.handle().clone();
    let mut view: Vec<Task> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if matches!(handle_line(&handle, &mut view, line.trim()).await, Flow::Quit) {
                    break;
                }
            }
            Some(event) = session.next_event() => print_event(&mut view, event),
        }
    }

    session.sign_out().await;
    Ok(())
}

async fn handle_line(handle: &TaskListHandle, view: &mut Vec<Task>, line: &str) -> Flow {
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));

    let result = match command {
        "" => Ok(()),
        "quit" | "exit" => return Flow::Quit,
        "help" => {
            println!("{HELP}");
            Ok(())
        }
        "add" => match parse_draft(rest) {
            Some(draft) => handle.add(draft).await,
            None => {
                println!("usage: add <title> [due:YYYY-MM-DD]");
                Ok(())
            }
        },
        "toggle" => match lookup(view, rest) {
            Some(id) => handle.toggle(id).await,
            None => {
                println!("no task {rest:?}");
                Ok(())
            }
        },
        "rm" => match lookup(view, rest) {
            Some(id) => handle.remove(id).await,
            None => {
                println!("no task {rest:?}");
                Ok(())
            }
        },
        "list" => handle.snapshot().await.map(|tasks| {
            *view = tasks;
            print_tasks(view);
        }),
        "sort" => match rest.parse::<SortOrder>() {
            Ok(sort) => handle.set_sort(sort).await,
            Err(e) => {
                println!("{e}");
                Ok(())
            }
        },
        "filter" => match rest.parse::<Filter>() {
            Ok(filter) => handle.set_filter(filter).await,
            Err(e) => {
                println!("{e}");
                Ok(())
            }
        },
        "type" => handle.input(rest).await,
        other => {
            println!("unknown command `{other}` (type `help`)");
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("error: {e}");
    }
    Flow::Continue
}

/// Splits an optional trailing `due:YYYY-MM-DD` token off the title.
fn parse_draft(rest: &str) -> Option<TaskDraft> {
    let due_token = rest
        .rsplit_once(char::is_whitespace)
        .and_then(|(head, tail)| tail.strip_prefix("due:").map(|raw| (head, raw)));
    let (title, due) = match due_token {
        Some((head, raw)) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
            (head.trim(), Some(date))
        }
        None => (rest, None),
    };
    if title.is_empty() {
        return None;
    }
    let draft = TaskDraft::new(title);
    Some(match due {
        Some(date) => draft.with_due_date(date),
        None => draft,
    })
}

/// Resolves a 1-based position in the last printed view, or a raw id.
fn lookup(view: &[Task], key: &str) -> Option<TaskId> {
    if key.is_empty() {
        return None;
    }
    if let Ok(n) = key.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| view.get(i))
            .map(|task| task.id.clone());
    }
    view.iter()
        .find(|task| task.id.as_str() == key)
        .map(|task| task.id.clone())
}

fn print_event(view: &mut Vec<Task>, event: TaskListEvent) {
    match event {
        TaskListEvent::Changed(tasks) => *view = tasks,
        TaskListEvent::Loaded { count } => println!("loaded {count} task(s)"),
        TaskListEvent::Added(task) => println!("added: {}", task.title),
        TaskListEvent::Failed { action, error } => println!("{action} failed: {error}"),
        TaskListEvent::Suggested(update) => match update.state {
            SlotState::Ready(suggestion) => {
                println!("suggested {}: {}", update.kind, suggestion.value);
            }
            SlotState::Unavailable => println!("{} suggestion unavailable", update.kind),
            SlotState::Idle | SlotState::Pending => {}
        },
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("(no tasks)");
        return;
    }
    let today = Local::now().date_naive();
    for (i, task) in tasks.iter().enumerate() {
        println!("{}", format_task(i + 1, task, today));
    }
}

fn format_task(position: usize, task: &Task, today: NaiveDate) -> String {
    let mark = if task.is_complete { "x" } else { " " };
    let mut line = format!("{position:>3}. [{mark}] {} ({}", task.title, task.category);
    if let Some(duration) = task.duration_estimate {
        line.push_str(&format!(", {duration} {}", duration.tier()));
    }
    line.push(')');
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {due}"));
        if task.is_past_due(today) {
            line.push_str(" PAST DUE");
        }
    }
    if task.is_provisional() {
        line.push_str(" (saving)");
    }
    line
}
