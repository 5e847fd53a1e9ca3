mod cli;

use std::collections::HashMap;
use std::io::Read as _;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rusqlite::Connection;

use cli::{Cli, Command, ItemCommand, TimerCommand};
use taskprog::changes::{Change, ChangeKind};
use taskprog::model::{ItemKind, TaskStatus};
use taskprog::progress::ProgressReport;
use taskprog::sync::{ProgressStore, ProgressSync, TaskSnapshot};
use taskprog::{db, ops, output, paths, timer, watch};

type Tracker<'a> = ProgressSync<'a, Connection>;

fn open_db(db_path: &str) -> Result<Connection> {
    let conn = db::open(db_path)?;
    db::init(&conn)?;
    Ok(conn)
}

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();
}

fn print_report(report: &ProgressReport) {
    print!("{}", output::format_report(report));
}

/// Tell `task`'s subscribers what changed, then show its recomputed progress.
fn announce(sync: &mut Tracker<'_>, task: &str, kind: ChangeKind) -> Result<()> {
    sync.publish(Change::new(task, kind));
    print_report(&sync.on_related_change(task)?);
    Ok(())
}

fn dispatch_item(
    conn: &Connection,
    sync: &mut Tracker<'_>,
    kind: ItemKind,
    command: ItemCommand,
) -> Result<()> {
    let label = kind.label();
    let change = ChangeKind::from(kind);
    match command {
        ItemCommand::Add { task, title } => {
            let id = ops::add_item(conn, kind, &task, &title)?;
            println!("{id}");
            eprintln!("Added {label} #{id} to '{task}'");
            announce(sync, &task, change)?;
        }
        ItemCommand::Done { id } => {
            let task = ops::set_item_done(conn, kind, id, true)?;
            eprintln!("Completed {label} #{id}");
            announce(sync, &task, change)?;
        }
        ItemCommand::Undo { id } => {
            let task = ops::set_item_done(conn, kind, id, false)?;
            eprintln!("Reopened {label} #{id}");
            announce(sync, &task, change)?;
        }
        ItemCommand::Rm { id } => {
            let task = ops::remove_item(conn, kind, id)?;
            eprintln!("Removed {label} #{id}");
            announce(sync, &task, change)?;
        }
        ItemCommand::List { task, json } => {
            let items = ops::list_items(conn, kind, &task)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in &items {
                    let mark = if item.done { "x" } else { " " };
                    println!("[{mark}] #{} {}", item.id, item.title);
                }
            }
        }
    }
    Ok(())
}

fn dispatch_timer(conn: &Connection, command: TimerCommand) -> Result<()> {
    match command {
        TimerCommand::Start { task, user } => {
            timer::start_timer(conn, &task, &user)?;
            eprintln!("Timing '{task}' for '{user}'");
        }
        TimerCommand::Pause { user } => {
            let entry = timer::pause_timer(conn, &user)?;
            print!("{}", output::format_time_entry(&entry, timer::now_unix(conn)?));
        }
        TimerCommand::Resume { user } => {
            let entry = timer::resume_timer(conn, &user)?;
            eprintln!("Resumed '{}' for '{user}'", entry.task);
        }
        TimerCommand::Stop { user } => {
            let entry = timer::stop_timer(conn, &user)?;
            print!("{}", output::format_time_entry(&entry, timer::now_unix(conn)?));
        }
        TimerCommand::Show { user } => match timer::active_timer(conn, &user)? {
            Some(entry) => print!("{}", output::format_time_entry(&entry, timer::now_unix(conn)?)),
            None => eprintln!("'{user}' has no active timer"),
        },
        TimerCommand::Log { task, json } => {
            let entries = timer::list_time_entries(conn, &task)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                let now = timer::now_unix(conn)?;
                for entry in &entries {
                    print!("{}", output::format_time_entry(entry, now));
                }
            }
        }
    }
    Ok(())
}

/// Dispatch a single parsed command against an open database connection.
/// Used both for direct invocations and within `exec` batches.
fn dispatch(conn: &Connection, sync: &mut Tracker<'_>, command: Command) -> Result<()> {
    match command {
        Command::Add { name, title } => {
            ops::add_task(conn, &name, &title)?;
            eprintln!("Added task '{name}'");
        }

        Command::Rm { name } => {
            ops::remove_task(conn, &name)?;
            eprintln!("Removed task '{name}'");
        }

        Command::Retitle { name, title } => {
            ops::retitle_task(conn, &name, &title)?;
            eprintln!("Updated title for '{name}'");
        }

        Command::Show { name, json } => {
            let task = ops::get_task(conn, &name)?;
            let report = sync.on_related_change(&name)?;
            let subtasks = ops::list_items(conn, ItemKind::Subtask, &name)?;
            let checklist = ops::list_items(conn, ItemKind::Checklist, &name)?;
            let tracked_secs = timer::total_tracked(conn, &name)?;
            if json {
                let detail = output::TaskDetail {
                    task: &task,
                    report: &report,
                    subtasks: &subtasks,
                    checklist: &checklist,
                    tracked_secs,
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_task_detail(&task, &report, &subtasks, &checklist, tracked_secs)
                );
            }
        }

        Command::List { status, json } => {
            let status = status.map(|s| TaskStatus::parse(&s)).transpose()?;
            let tasks = ops::list_tasks(conn, status)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print!("{}", output::format_task_list(&tasks));
            }
        }

        Command::Status { name, status } => {
            let status = TaskStatus::parse(&status)?;
            ops::set_status(conn, &name, status)?;
            eprintln!("Set '{name}' to {status}");
            announce(sync, &name, ChangeKind::Status)?;
        }

        Command::Subtask(command) => dispatch_item(conn, sync, ItemKind::Subtask, command)?,

        Command::Check(command) => dispatch_item(conn, sync, ItemKind::Checklist, command)?,

        Command::Progress { name, json } => {
            let report = sync.on_related_change(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Command::SetProgress { name, percentage } => {
            print_report(&sync.set_manual(&name, percentage)?);
        }

        Command::ResetProgress { name } => {
            print_report(&sync.reset_to_auto(&name)?);
        }

        Command::Timer(command) => dispatch_timer(conn, command)?,

        Command::Watch { .. } => bail!("watch cannot be used inside exec"),
        Command::Exec => bail!("exec cannot be nested"),
    }

    Ok(())
}

fn parse_exec_line(line: &str) -> Result<Command> {
    let Some(tokens) = shlex::split(line) else {
        bail!("unbalanced quotes: {line}");
    };
    let mut args = vec!["taskprog".to_string()];
    args.extend(tokens);
    let cli = Cli::try_parse_from(&args).with_context(|| format!("failed to parse: {line}"))?;
    Ok(cli.command)
}

fn run_exec(conn: &Connection, input: &str) -> Result<()> {
    // Parse all commands first, before starting the transaction
    let mut commands = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command = parse_exec_line(trimmed).with_context(|| format!("line {lineno}"))?;
        match &command {
            Command::Exec => bail!("line {lineno}: exec cannot be nested"),
            Command::Watch { .. } => bail!("line {lineno}: watch cannot be used inside exec"),
            _ => {}
        }
        commands.push((lineno, trimmed.to_string(), command));
    }

    if commands.is_empty() {
        return Ok(());
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| -> Result<()> {
        let mut sync = ProgressSync::new(conn);
        for (lineno, line, command) in commands {
            dispatch(conn, &mut sync, command).with_context(|| format!("line {lineno}: {line}"))?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Watched tasks whose snapshot differs from the one recorded in `seen`.
/// A task that disappears counts as changed. `seen` is updated in place.
fn changed_tasks(
    conn: &Connection,
    names: &[String],
    seen: &mut HashMap<String, Option<TaskSnapshot>>,
) -> Result<Vec<String>> {
    let mut changed = Vec::new();
    for name in names {
        let snap = ProgressStore::snapshot(conn, name)?;
        if seen.get(name) != Some(&snap) {
            seen.insert(name.clone(), snap);
            changed.push(name.clone());
        }
    }
    Ok(changed)
}

/// Print each task's progress, then reprint whenever it changes. On every
/// database event, only the watched tasks whose state actually moved get an
/// external change; the poll interval is a fallback for missed events.
fn run_watch(db_path: &str, conn: &Connection, names: &[String], poll_interval: u64) -> Result<()> {
    let mut sync = ProgressSync::new(conn);
    let receivers: Vec<_> = names.iter().map(|n| sync.subscribe(n)).collect();

    let mut seen = HashMap::new();
    changed_tasks(conn, names, &mut seen)?;
    let mut shown: HashMap<String, ProgressReport> = HashMap::new();
    for name in names {
        let report = sync.on_related_change(name)?;
        print_report(&report);
        shown.insert(name.clone(), report);
    }

    let (_watcher, rx) = watch::watch_db(db_path)?;
    let poll = Duration::from_millis(poll_interval);
    loop {
        watch::wait_for_change(&rx, poll);
        watch::drain_events(&rx);

        for name in changed_tasks(conn, names, &mut seen)? {
            sync.publish(Change::new(name, ChangeKind::External));
        }
        for (name, sub) in names.iter().zip(&receivers) {
            match sync.process_pending(sub)? {
                Some(report) => {
                    if shown.get(name) != Some(&report) {
                        print_report(&report);
                        shown.insert(name.clone(), report);
                    }
                }
                None => {
                    if shown.contains_key(name) && sync.displayed(name).is_none() {
                        println!("{name}: removed");
                        shown.remove(name);
                    }
                }
            }
        }
    }
}

fn main() {
    setup_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = paths::resolve_db_path(cli.db)?;
    paths::ensure_db_dir(&db_path)?;
    let conn = open_db(&db_path)?;

    match cli.command {
        Command::Exec => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            run_exec(&conn, &input)?;
        }

        Command::Watch {
            names,
            poll_interval,
        } => {
            run_watch(&db_path, &conn, &names, poll_interval)?;
        }

        other => {
            let mut sync = ProgressSync::new(&conn);
            dispatch(&conn, &mut sync, other)?;
        }
    }

    Ok(())
}
