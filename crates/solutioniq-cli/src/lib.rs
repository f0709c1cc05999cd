use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use solutioniq_api::{AgentApi, ApiClient, ApprovalDecision, TaskStatus};
use solutioniq_stream::{ConnectionState, StreamChannel};
use solutioniq_sync::{
    ConfirmedView, DispatchOutcome, DisplayMessage, Notice, NotificationCenter, SyncEngine,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{info, warn};

pub mod config;
pub mod preferences;
mod render;

pub use config::{Config, ConfigError};
pub use preferences::{PreferenceStore, Preferences, PreferencesError};

/// How long a dispatch waits for the push channel before falling back to
/// status polling.
const CONNECT_GRACE: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "solutioniq")]
#[command(about = "SolutionIQ agent platform client")]
pub struct SolutionIqCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Send a chat message and wait for the agent's reply
    Chat {
        text: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Uploaded file ids to attach
        #[arg(long = "file")]
        files: Vec<String>,
        #[arg(long, default_value_t = 150)]
        wait_secs: u64,
    },
    /// Create a task and wait for its outcome
    Task {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// 1 (highest) to 5; defaults to the stored preference
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        priority: Option<u8>,
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, default_value_t = 150)]
        wait_secs: u64,
    },
    /// List conversations
    Conversations,
    /// Show the confirmed history of a conversation
    History { conversation_id: String },
    /// Delete a conversation
    Delete { conversation_id: String },
    /// List tasks, optionally filtered by status
    Tasks {
        /// pending, queued, running, awaiting_approval, completed or failed
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// List approvals waiting on a decision
    Approvals,
    /// Approve a pending approval
    Approve {
        approval_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject a pending approval
    Reject {
        approval_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Stream notifications until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Probe the backend health endpoint
    Health,
    /// Show or change stored preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

#[derive(clap::Subcommand)]
pub enum PrefsCommand {
    Show,
    Set { key: String, value: String },
}

pub async fn run(cli: SolutionIqCli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = PreferenceStore::new(config.preferences_path.clone());

    match cli.command {
        Commands::Chat {
            text,
            conversation,
            files,
            wait_secs,
        } => {
            let request = Dispatch::Chat { text, files };
            dispatch(&config, request, conversation, wait_secs, out).await
        }
        Commands::Task {
            title,
            description,
            priority,
            conversation,
            wait_secs,
        } => {
            let priority = priority.unwrap_or(store.load().default_task_priority);
            let request = Dispatch::Task {
                title,
                description,
                priority,
            };
            dispatch(&config, request, conversation, wait_secs, out).await
        }
        Commands::Conversations => {
            let api = api_client(&config)?;
            for conversation in api.list_conversations().await? {
                writeln!(out, "{}", render::render_conversation(&conversation))?;
            }
            Ok(())
        }
        Commands::History { conversation_id } => {
            let api = api_client(&config)?;
            let messages = api
                .conversation_messages(&conversation_id)
                .await
                .with_context(|| format!("failed to load conversation {conversation_id}"))?;
            for message in &messages {
                let view = DisplayMessage::Confirmed(ConfirmedView::from(message));
                writeln!(out, "{}", render::render_message(&view))?;
            }
            Ok(())
        }
        Commands::Delete { conversation_id } => {
            let api = api_client(&config)?;
            api.delete_conversation(&conversation_id)
                .await
                .with_context(|| format!("failed to delete conversation {conversation_id}"))?;
            writeln!(out, "deleted {conversation_id}")?;
            Ok(())
        }
        Commands::Tasks { status } => {
            let api = api_client(&config)?;
            let response = api.list_tasks(status).await?;
            let total = response.total();
            let tasks = response.into_tasks();
            for task in &tasks {
                writeln!(out, "{}", render::render_task(task))?;
            }
            writeln!(out, "{} of {} tasks", tasks.len(), total)?;
            Ok(())
        }
        Commands::Approvals => {
            let api = api_client(&config)?;
            let approvals = api.pending_approvals().await?;
            for approval in &approvals {
                writeln!(out, "{}", render::render_approval(approval))?;
            }
            writeln!(out, "{} pending approvals", approvals.len())?;
            Ok(())
        }
        Commands::Approve { approval_id, notes } => {
            decide(&config, &approval_id, ApprovalDecision::Approve, notes, out).await
        }
        Commands::Reject { approval_id, notes } => {
            decide(&config, &approval_id, ApprovalDecision::Reject, notes, out).await
        }
        Commands::Watch { seconds } => watch(&config, &store.load(), seconds, out).await,
        Commands::Health => {
            let api = api_client(&config)?;
            if !api.health_check().await {
                bail!("{} is unreachable", api.base_url());
            }
            writeln!(out, "{} is healthy", api.base_url())?;
            Ok(())
        }
        Commands::Prefs { command } => {
            let preferences = match command {
                PrefsCommand::Show => store.load(),
                PrefsCommand::Set { key, value } => store.update(&key, &value)?,
            };
            writeln!(out, "# {}", store.path().display())?;
            writeln!(out, "{}", serde_json::to_string_pretty(&preferences)?)?;
            Ok(())
        }
    }
}

fn api_client(config: &Config) -> anyhow::Result<Arc<ApiClient>> {
    let client = ApiClient::new(config.api_client_config())
        .with_context(|| format!("invalid SOLUTIONIQ_API_URL {}", config.api_url))?;
    Ok(Arc::new(client))
}

enum Dispatch {
    Chat {
        text: String,
        files: Vec<String>,
    },
    Task {
        title: String,
        description: Option<String>,
        priority: u8,
    },
}

/// A connected channel with an engine consuming its events.
struct Session {
    channel: StreamChannel,
    engine: SyncEngine,
    pump: JoinHandle<()>,
}

impl Session {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let api = api_client(config)?;
        let channel = StreamChannel::new(config.channel_config())
            .with_context(|| format!("invalid SOLUTIONIQ_WS_URL {}", config.ws_url))?;
        channel.connect();
        let engine = SyncEngine::new(api, channel.handle(), config.sync_config());
        let pump = engine.spawn_event_pump();
        Ok(Self {
            channel,
            engine,
            pump,
        })
    }

    async fn wait_connected(&self, grace: Duration) -> bool {
        let mut state = self.channel.handle().watch_state();
        matches!(
            timeout(grace, state.wait_for(|state| *state == ConnectionState::Connected)).await,
            Ok(Ok(_))
        )
    }

    async fn close(self) {
        self.pump.abort();
        self.engine.poller().cancel_all();
        self.channel.teardown().await;
    }
}

async fn dispatch(
    config: &Config,
    request: Dispatch,
    conversation: Option<String>,
    wait_secs: u64,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    if !session.wait_connected(CONNECT_GRACE).await {
        info!("stream not connected; replies will be polled");
    }

    if let Some(conversation_id) = conversation.as_deref() {
        session.engine.select_conversation(Some(conversation_id));
    }

    let mut notices = session.engine.subscribe_notices();
    let outcome = match request {
        Dispatch::Chat { text, files } => {
            session.engine.send_message_with_files(&text, files).await
        }
        Dispatch::Task {
            title,
            description,
            priority,
        } => {
            session
                .engine
                .submit_task(&title, description, Some(priority))
                .await
        }
    };

    match &outcome {
        DispatchOutcome::Settled(status) => {
            writeln!(out, "dispatch {}", render::dispatch_status_label(*status))?;
        }
        DispatchOutcome::Queued { task_id, source } => {
            writeln!(
                out,
                "task {task_id} queued; waiting on {}",
                render::source_label(*source)
            )?;
            let limit = Duration::from_secs(wait_secs);
            if !await_resolution(&session.engine, task_id, limit).await {
                writeln!(out, "task {task_id} still running after {wait_secs}s")?;
            }
        }
        DispatchOutcome::Rejected { rate_limited } => {
            let reason = drain_notices(&mut notices)
                .pop()
                .map(|notice| notice.message())
                .unwrap_or_else(|| {
                    if *rate_limited {
                        Notice::RateLimited.message()
                    } else {
                        "request failed".to_string()
                    }
                });
            session.close().await;
            bail!(reason);
        }
        DispatchOutcome::Abandoned => {
            writeln!(out, "conversation changed before the response arrived")?;
        }
    }

    let messages = match session.engine.refresh_active_conversation().await {
        Ok(messages) => messages,
        Err(error) => {
            warn!("failed to refresh conversation: {}", error);
            session.engine.displayed_messages()
        }
    };
    if let Some(conversation_id) = session.engine.active_conversation() {
        writeln!(out, "conversation {conversation_id}")?;
    }
    for message in &messages {
        writeln!(out, "{}", render::render_message(message))?;
    }

    session.close().await;
    Ok(())
}

/// Wait until nothing is awaiting `task_id`. Returns `false` on timeout.
async fn await_resolution(engine: &SyncEngine, task_id: &str, limit: Duration) -> bool {
    // Subscribe before checking so a resolution between the two is not missed.
    let mut invalidations = engine.subscribe_invalidations();
    let deadline = Instant::now() + limit;
    while engine.placeholder_for(task_id).is_some() {
        match timeout_at(deadline, invalidations.recv()).await {
            Err(_) => return false,
            Ok(Ok(_) | Err(RecvError::Lagged(_))) => {}
            Ok(Err(RecvError::Closed)) => break,
        }
    }
    engine.placeholder_for(task_id).is_none()
}

/// Send an approval decision and report what is still pending.
async fn decide(
    config: &Config,
    approval_id: &str,
    decision: ApprovalDecision,
    notes: Option<String>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let channel = StreamChannel::new(config.channel_config())
        .with_context(|| format!("invalid SOLUTIONIQ_WS_URL {}", config.ws_url))?;
    let engine = SyncEngine::new(api_client(config)?, channel.handle(), config.sync_config());
    engine
        .decide_approval(approval_id, decision, notes)
        .await
        .with_context(|| format!("failed to {} approval {approval_id}", decision.as_str()))?;
    let verb = match decision {
        ApprovalDecision::Approve => "approved",
        ApprovalDecision::Reject => "rejected",
    };
    writeln!(out, "{verb} {approval_id}")?;

    match engine.pending_approvals().await {
        Ok(remaining) => writeln!(out, "{} pending approvals", remaining.len())?,
        Err(error) => warn!("failed to reload approvals: {}", error),
    }
    Ok(())
}

fn drain_notices(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut drained = Vec::new();
    loop {
        match notices.try_recv() {
            Ok(notice) => drained.push(notice),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return drained,
        }
    }
}

async fn watch(
    config: &Config,
    preferences: &Preferences,
    seconds: Option<u64>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !preferences.notifications_enabled {
        writeln!(
            out,
            "notifications are disabled; run `solutioniq prefs set notifications_enabled true`"
        )?;
        return Ok(());
    }

    let channel = StreamChannel::new(config.channel_config())
        .with_context(|| format!("invalid SOLUTIONIQ_WS_URL {}", config.ws_url))?;
    let handle = channel.handle();
    let center = NotificationCenter::new(true);
    let mut events = handle.subscribe();
    let mut states = handle.watch_state();
    channel.connect();

    let deadline = seconds.map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let stop = async move {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for ctrl-c: {}", error);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                writeln!(out, "[{}]", state.as_str())?;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(notification) = center.record(&event) {
                        writeln!(
                            out,
                            "{} {}",
                            notification.timestamp.format("%H:%M:%S"),
                            notification.message
                        )?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification feed lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.teardown().await;
    writeln!(
        out,
        "{} notifications, {} unread",
        center.notifications().len(),
        center.unread_count()
    )?;
    Ok(())
}
