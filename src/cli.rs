use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taskprog", about = "Task progress tracker", version)]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.taskprog/taskprog.db]
    #[arg(long, env = "TASKPROG_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a task
    Add {
        /// Task name (alphanumeric, hyphens, underscores)
        name: String,
        /// Task title
        #[arg(default_value = "")]
        title: String,
    },

    /// Remove a task with its subtasks, checklist, and timers
    Rm {
        /// Task name
        name: String,
    },

    /// Change a task's title
    Retitle {
        /// Task name
        name: String,
        /// New title
        title: String,
    },

    /// Show task details
    Show {
        /// Task name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tasks
    List {
        /// Filter by status (pending, in_progress, review, completed)
        #[arg(long)]
        status: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a task's status
    Status {
        /// Task name
        name: String,
        /// New status (pending, in_progress, review, completed)
        status: String,
    },

    /// Manage subtasks
    #[command(subcommand)]
    Subtask(ItemCommand),

    /// Manage checklist items
    #[command(subcommand)]
    Check(ItemCommand),

    /// Show stored and calculated progress
    Progress {
        /// Task name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Override stored progress
    #[command(name = "set-progress")]
    SetProgress {
        /// Task name
        name: String,
        /// Percentage, 0-100
        #[arg(allow_negative_numbers = true)]
        percentage: i64,
    },

    /// Replace stored progress with the calculated value
    #[command(name = "reset-progress")]
    ResetProgress {
        /// Task name
        name: String,
    },

    /// Time tracking
    #[command(subcommand)]
    Timer(TimerCommand),

    /// Print progress whenever a task changes (runs until interrupted)
    Watch {
        /// Task names
        #[arg(required = true)]
        names: Vec<String>,
        /// Fallback poll interval in milliseconds
        #[arg(long, default_value = "5000")]
        poll_interval: u64,
    },

    /// Run commands from stdin in a single transaction
    Exec,
}

#[derive(Subcommand)]
pub enum ItemCommand {
    /// Add an item to a task
    Add {
        /// Task name
        task: String,
        /// Item title
        title: String,
    },
    /// Mark an item complete
    Done {
        /// Item id
        id: i64,
    },
    /// Mark an item incomplete
    Undo {
        /// Item id
        id: i64,
    },
    /// Delete an item
    Rm {
        /// Item id
        id: i64,
    },
    /// List a task's items
    List {
        /// Task name
        task: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TimerCommand {
    /// Start (or resume) timing a task
    Start {
        /// Task name
        task: String,
        /// User the timer belongs to
        user: String,
    },
    /// Pause a user's running timer
    Pause {
        /// User
        user: String,
    },
    /// Resume a user's paused timer
    Resume {
        /// User
        user: String,
    },
    /// Stop a user's timer
    Stop {
        /// User
        user: String,
    },
    /// Show a user's active timer
    Show {
        /// User
        user: String,
    },
    /// List time entries for a task
    Log {
        /// Task name
        task: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
