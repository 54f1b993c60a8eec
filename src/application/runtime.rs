use crate::application::calendar_sync::{ApplyResult, FetchOutcome, FetchTicket, SyncController, SyncStatus};
use crate::application::reconciler::{TimerReconciler, TimerSnapshot};
use crate::application::schedule_store::ScheduleStore;
use crate::domain::models::{Act, ActDraft, ActId};
use crate::infrastructure::calendar_bridge::CalendarBridge;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::AppConfig;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddAct(ActDraft),
    RemoveAct(ActId),
    Reorder { from_index: usize, to_index: usize },
    StartNow(ActId),
    EnableSync,
    DisableSync,
    CalendarChanged,
    StartCountdown,
    StopCountdown,
    ResetCountdown,
    SetCountdown(Duration),
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::AddAct(_) => "add_act",
            Self::RemoveAct(_) => "remove_act",
            Self::Reorder { .. } => "reorder",
            Self::StartNow(_) => "start_now",
            Self::EnableSync => "enable_sync",
            Self::DisableSync => "disable_sync",
            Self::CalendarChanged => "calendar_changed",
            Self::StartCountdown => "start_countdown",
            Self::StopCountdown => "stop_countdown",
            Self::ResetCountdown => "reset_countdown",
            Self::SetCountdown(_) => "set_countdown",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Schedule, countdown and sync state owned by one execution context. Ticks,
/// edits and finished calendar fetches are applied one at a time; fetches
/// themselves run on separate tasks so a slow calendar never delays a tick.
pub struct StageTimer<B: CalendarBridge + 'static> {
    store: ScheduleStore,
    reconciler: TimerReconciler,
    sync: SyncController<B>,
    journal: CommandLog,
    now_provider: NowProvider,
    tick_interval: std::time::Duration,
    sync_on_start: bool,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    schedule_tx: watch::Sender<Vec<Act>>,
    status_tx: watch::Sender<SyncStatus>,
    published_revision: u64,
}

impl<B: CalendarBridge + 'static> StageTimer<B> {
    pub fn new(bridge: Arc<B>, config: &AppConfig, journal: CommandLog) -> Self {
        Self::with_now_provider(bridge, config, journal, Arc::new(Utc::now))
    }

    pub fn with_now_provider(
        bridge: Arc<B>,
        config: &AppConfig,
        journal: CommandLog,
        now_provider: NowProvider,
    ) -> Self {
        let store = ScheduleStore::new();
        let mut reconciler = TimerReconciler::new(config.default_countdown);
        let sync = SyncController::new(bridge, config.time_zone);
        let initial = reconciler.tick(store.acts(), now_provider());
        let (snapshot_tx, _) = watch::channel(initial);
        let (schedule_tx, _) = watch::channel(Vec::new());
        let (status_tx, _) = watch::channel(sync.status());

        Self {
            published_revision: store.revision(),
            store,
            reconciler,
            sync,
            journal,
            now_provider,
            tick_interval: config.tick_interval,
            sync_on_start: config.calendar_sync_enabled,
            snapshot_tx,
            schedule_tx,
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_schedule(&self) -> watch::Receiver<Vec<Act>> {
        self.schedule_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn sync(&self) -> &SyncController<B> {
        &self.sync
    }

    pub fn reconciler(&self) -> &TimerReconciler {
        &self.reconciler
    }

    pub fn tick(&mut self) -> TimerSnapshot {
        let now = (self.now_provider)();
        let snapshot = self.reconciler.tick(self.store.acts(), now);
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    /// Applies one command. A returned ticket is a calendar fetch the caller
    /// has to run and hand back through `apply_fetch`.
    pub fn handle_command(&mut self, command: Command) -> Option<FetchTicket> {
        let now = (self.now_provider)();
        let name = command.name();
        let mut ticket = None;

        match command {
            Command::AddAct(draft) => match self.store.add(draft) {
                Ok(id) => self.journal.info(name, &format!("added act_id={id}")),
                Err(error) => self.journal.warn(name, &format!("rejected: {error}")),
            },
            Command::RemoveAct(id) => {
                let removed = self.store.remove(id);
                self.journal.info(name, &format!("act_id={id} removed={removed}"));
            }
            Command::Reorder { from_index, to_index } => {
                let moved = self.store.reorder(from_index, to_index);
                self.journal
                    .info(name, &format!("from={from_index} to={to_index} applied={moved}"));
            }
            Command::StartNow(id) => match self.store.start_now(id, now) {
                Some(promoted) => {
                    if let Some(act) = self.store.get(promoted) {
                        self.reconciler.begin_act(act, now);
                    }
                    self.journal
                        .info(name, &format!("act_id={id} promoted as act_id={promoted}"));
                }
                None => self.journal.warn(name, &format!("act_id={id} not in schedule")),
            },
            Command::EnableSync => {
                ticket = Some(self.sync.begin_enable(now));
                self.journal.info(name, "calendar sync enabled");
            }
            Command::DisableSync => {
                let cleared = self.store.len();
                self.sync.disable_sync(&mut self.store);
                self.journal.info(name, &format!("cleared {cleared} act(s)"));
            }
            Command::CalendarChanged => {
                ticket = self.sync.begin_refresh(now);
                if ticket.is_some() {
                    self.journal.info(name, "refreshing from calendar");
                }
            }
            Command::StartCountdown => {
                self.reconciler.start();
                self.journal.info(name, self.reconciler.running_state().as_str());
            }
            Command::StopCountdown => {
                self.reconciler.stop();
                self.journal.info(name, self.reconciler.running_state().as_str());
            }
            Command::ResetCountdown => {
                self.reconciler.reset();
                self.journal.info(name, "countdown reset");
            }
            Command::SetCountdown(duration) => {
                self.reconciler.set_countdown(duration);
                self.journal
                    .info(name, &format!("countdown set to {}s", duration.num_seconds()));
            }
            Command::Shutdown => self.journal.info(name, "shutting down"),
        }

        self.publish_changes();
        ticket
    }

    pub fn apply_fetch(&mut self, ticket: FetchTicket, outcome: FetchOutcome) -> ApplyResult {
        let result = self.sync.apply(ticket, outcome, &mut self.store);
        match result {
            ApplyResult::Applied { acts } => self
                .journal
                .info("calendar_refresh", &format!("{acts} act(s) for {}", ticket.window.date)),
            ApplyResult::AccessDenied => self.journal.warn("calendar_refresh", "access denied"),
            ApplyResult::Failed => self
                .journal
                .error("calendar_refresh", "fetch failed, schedule unchanged"),
            ApplyResult::Stale => {}
        }
        self.publish_changes();
        result
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<(FetchTicket, FetchOutcome)>();
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.sync_on_start {
            let ticket = self.sync.begin_enable((self.now_provider)());
            self.journal.info("startup", "calendar sync enabled");
            self.spawn_fetch(ticket, &fetch_tx);
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        self.journal.info("shutdown", "runtime stopped");
                        break;
                    }
                    Some(command) => {
                        if let Some(ticket) = self.handle_command(command) {
                            self.spawn_fetch(ticket, &fetch_tx);
                        }
                    }
                },
                Some((ticket, outcome)) = fetch_rx.recv() => {
                    self.apply_fetch(ticket, outcome);
                }
            }
        }
    }

    fn spawn_fetch(
        &self,
        ticket: FetchTicket,
        fetch_tx: &mpsc::UnboundedSender<(FetchTicket, FetchOutcome)>,
    ) {
        let job = self.sync.job(ticket);
        let fetch_tx = fetch_tx.clone();
        tokio::spawn(async move {
            let outcome = job.run().await;
            let _ = fetch_tx.send((ticket, outcome));
        });
    }

    fn publish_changes(&mut self) {
        if self.store.revision() != self.published_revision {
            self.published_revision = self.store.revision();
            self.schedule_tx.send_replace(self.store.acts().to_vec());
        }
        let status = self.sync.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
