// ABOUTME: Discussion control: owns run state and drives the turn loop
// ABOUTME: Serializes process calls, streams replies, runs actions and enforces the round limit

use crate::action_runner::ActionRunner;
use crate::actions::CapabilityRegistry;
use crate::error::DiscussionError;
use crate::events::{DiscussionEvent, RunSnapshot, RunState};
use crate::metrics;
use crate::responder::{ResponseRequest, StreamingResponder};
use crate::selector::SpeakerSelector;
use crate::traits::{AgentDirectory, MessageStore, ReloadHook};
use crate::types::{AgentDef, Member, Message, MessageDraft, Settings};
use roundtable_agent::CompletionHandle;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct ControlState {
    discussion_id: Option<String>,
    members: Vec<Member>,
    settings: Settings,
    run_state: RunState,
    processed: usize,
    round_limit: usize,
    current_speaker_id: Option<String>,
    /// Set only while a reply is in flight
    current_abort: Option<CancellationToken>,
}

impl ControlState {
    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            discussion_id: self.discussion_id.clone(),
            state: self.run_state,
            is_running: self.run_state == RunState::Running,
            current_speaker_id: self.current_speaker_id.clone(),
            processed: self.processed,
            round_limit: self.round_limit,
        }
    }
}

/// What the loop should do at the top of an iteration
enum Step {
    Stop,
    RoundLimit(usize),
    Continue {
        members: Vec<Member>,
        settings: Settings,
    },
}

/// Orchestrates turns for the current discussion
///
/// Share it behind an `Arc`; every entry point takes `&self`.
pub struct DiscussionControl {
    store: Arc<dyn MessageStore>,
    agents: Arc<dyn AgentDirectory>,
    reload: Arc<dyn ReloadHook>,
    responder: StreamingResponder,
    actions: ActionRunner,
    state: Mutex<ControlState>,
    selector: Mutex<SpeakerSelector>,
    /// Fair mutex; waiters acquire it in FIFO order
    turn_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<DiscussionEvent>,
}

impl DiscussionControl {
    pub fn new(
        store: Arc<dyn MessageStore>,
        agents: Arc<dyn AgentDirectory>,
        completion: CompletionHandle,
        capabilities: CapabilityRegistry,
        reload: Arc<dyn ReloadHook>,
    ) -> Self {
        let capabilities = Arc::new(capabilities);
        let settings = Settings::default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            responder: StreamingResponder::new(
                Arc::clone(&store),
                completion,
                Arc::clone(&capabilities),
                Arc::clone(&reload),
            ),
            actions: ActionRunner::new(Arc::clone(&store), capabilities, Arc::clone(&reload)),
            store,
            agents,
            reload,
            state: Mutex::new(ControlState {
                discussion_id: None,
                members: Vec::new(),
                round_limit: settings.round_limit(),
                settings,
                run_state: RunState::Idle,
                processed: 0,
                current_speaker_id: None,
                current_abort: None,
            }),
            selector: Mutex::new(SpeakerSelector::new()),
            turn_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_selector(&self) -> MutexGuard<'_, SpeakerSelector> {
        self.selector.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send while holding the state lock so subscribers see transitions in order
    fn emit(&self, event: DiscussionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_snapshot(&self, state: &ControlState) {
        self.emit(DiscussionEvent::Snapshot(state.snapshot()));
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<DiscussionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.lock_state().snapshot()
    }

    pub fn current_discussion_id(&self) -> Option<String> {
        self.lock_state().discussion_id.clone()
    }

    pub fn members(&self) -> Vec<Member> {
        self.lock_state().members.clone()
    }

    pub fn settings(&self) -> Settings {
        self.lock_state().settings.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().run_state == RunState::Running
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Switch discussions; resets round accounting and forgets in-flight bookkeeping
    pub fn set_current_discussion_id(&self, discussion_id: Option<String>) {
        let mut state = self.lock_state();
        if state.discussion_id == discussion_id {
            return;
        }

        tracing::info!(
            from = ?state.discussion_id,
            to = ?discussion_id,
            "Switching discussion"
        );
        state.discussion_id = discussion_id.clone();
        state.round_limit = state.settings.round_limit();
        state.processed = 0;
        state.run_state = RunState::Idle;
        state.current_speaker_id = None;
        state.current_abort = None;
        self.lock_selector().reset();

        self.emit(DiscussionEvent::DiscussionChanged { discussion_id });
        self.emit_snapshot(&state);
    }

    pub fn set_members(&self, members: Vec<Member>) {
        let mut state = self.lock_state();
        state.members = members;
        self.emit_snapshot(&state);
    }

    pub fn set_settings(&self, settings: Settings) {
        let mut state = self.lock_state();
        state.round_limit = settings.round_limit();
        state.settings = settings;
        tracing::debug!(round_limit = state.round_limit, "Settings updated");
        self.emit_snapshot(&state);
    }

    // =========================================================================
    // Run control
    // =========================================================================

    /// Enter Running when the roster is non-empty; returns whether it started
    pub fn start_if_eligible(&self) -> bool {
        let mut state = self.lock_state();
        if state.run_state == RunState::Running || state.members.is_empty() {
            return false;
        }
        state.run_state = RunState::Running;
        state.processed = 0;
        tracing::debug!(discussion_id = ?state.discussion_id, "Run started");
        self.emit_snapshot(&state);
        true
    }

    /// Cancel the in-flight reply, if any, and stop the loop
    pub fn pause(&self) {
        let mut state = self.lock_state();
        if let Some(abort) = state.current_abort.take() {
            abort.cancel();
        }
        state.current_speaker_id = None;
        state.run_state = RunState::Paused;
        tracing::info!(
            discussion_id = ?state.discussion_id,
            processed = state.processed,
            "Paused"
        );
        self.emit_snapshot(&state);
    }

    /// Re-enter Running with a fresh round count
    pub fn resume(&self) {
        let mut state = self.lock_state();
        state.run_state = RunState::Running;
        state.processed = 0;
        tracing::info!(discussion_id = ?state.discussion_id, "Resumed");
        self.emit_snapshot(&state);
    }

    pub fn run(&self) {
        self.resume();
    }

    /// Resume and continue from the latest message of the current discussion
    pub async fn resume_and_continue(&self) -> Result<(), DiscussionError> {
        let Some(discussion_id) = self.current_discussion_id() else {
            return Err(self.fail(DiscussionError::no_discussion()));
        };
        self.resume();
        let last = self
            .store
            .list_messages(&discussion_id)
            .await
            .map_err(|e| self.fail(DiscussionError::store("Failed to load discussion", e)))?
            .pop();
        match last {
            Some(trigger) => self.process(trigger).await,
            None => Ok(()),
        }
    }

    // =========================================================================
    // Turn loop
    // =========================================================================

    /// Run turns starting from `trigger`
    ///
    /// Calls are queued and never interleave. Any failure is reported on the
    /// event channel, pauses the discussion and is returned.
    pub async fn process(&self, trigger: Message) -> Result<(), DiscussionError> {
        let _turn = self.turn_lock.lock().await;
        self.process_locked(trigger).await.map_err(|e| self.fail(e))
    }

    fn fail(&self, error: DiscussionError) -> DiscussionError {
        tracing::error!(kind = %error.kind(), error = %error.detail(), "Discussion error");
        metrics::record_error(error.kind().as_str());
        self.emit(DiscussionEvent::Error(error.report()));
        self.pause();
        error
    }

    async fn process_locked(&self, trigger: Message) -> Result<(), DiscussionError> {
        let discussion_id = self
            .current_discussion_id()
            .ok_or_else(DiscussionError::no_discussion)?;

        if trigger.discussion_id() != discussion_id {
            tracing::warn!(
                discussion_id = %discussion_id,
                trigger_discussion = %trigger.discussion_id(),
                "Ignoring trigger from another discussion"
            );
            return Ok(());
        }

        if !self.is_running() && !self.start_if_eligible() {
            tracing::debug!(discussion_id = %discussion_id, "No members, nothing to do");
            return Ok(());
        }

        self.run_turns(&discussion_id, trigger).await?;
        self.reload.reload().await;
        Ok(())
    }

    fn next_step(&self, discussion_id: &str) -> Step {
        let state = self.lock_state();
        if state.discussion_id.as_deref() != Some(discussion_id)
            || state.run_state != RunState::Running
        {
            return Step::Stop;
        }
        if state.processed >= state.round_limit {
            return Step::RoundLimit(state.round_limit);
        }
        Step::Continue {
            members: state.members.clone(),
            settings: state.settings.clone(),
        }
    }

    async fn run_turns(
        &self,
        discussion_id: &str,
        mut trigger: Message,
    ) -> Result<(), DiscussionError> {
        let mut last_responder = self.origin_author(&trigger).await?;

        loop {
            let (members, settings) = match self.next_step(discussion_id) {
                Step::Stop => break,
                Step::RoundLimit(limit) => {
                    self.reach_round_limit(discussion_id, limit).await?;
                    break;
                }
                Step::Continue { members, settings } => (members, settings),
            };

            let agents = self.agents.agents();
            let speaker = self.lock_selector().select(
                &trigger,
                last_responder.as_deref(),
                &members,
                &agents,
            );
            let Some(speaker_id) = speaker else {
                tracing::debug!(discussion_id = %discussion_id, "No next speaker");
                break;
            };
            let Some(agent) = agents.iter().find(|a| a.id == speaker_id).cloned() else {
                tracing::warn!(agent_id = %speaker_id, "Selected speaker has no agent definition");
                break;
            };
            let member_defs: Vec<AgentDef> = members
                .iter()
                .filter_map(|m| agents.iter().find(|a| a.id == m.agent_id).cloned())
                .collect();
            let can_use_actions = settings.can_use_actions(agent.role);

            let Some(cancel) = self.begin_turn(&speaker_id) else {
                break;
            };
            let outcome = self
                .take_turn(
                    discussion_id,
                    &agent,
                    &trigger,
                    &member_defs,
                    can_use_actions,
                    cancel.clone(),
                )
                .await;
            self.end_turn();
            let outcome = outcome?;

            if cancel.is_cancelled() {
                tracing::info!(agent_id = %speaker_id, "Turn cancelled");
                break;
            }

            if !self.complete_turn(discussion_id, &speaker_id, outcome.id()) {
                tracing::info!(
                    discussion_id = %discussion_id,
                    agent_id = %speaker_id,
                    "Discussion switched during turn, not counting it"
                );
                break;
            }
            metrics::record_turn_completed(&speaker_id);
            last_responder = Some(speaker_id);
            trigger = outcome;
        }

        Ok(())
    }

    /// Mark the speaker and arm a fresh cancellation token; `None` if no longer running
    fn begin_turn(&self, speaker_id: &str) -> Option<CancellationToken> {
        let mut state = self.lock_state();
        if state.run_state != RunState::Running {
            return None;
        }
        let token = CancellationToken::new();
        state.current_abort = Some(token.clone());
        state.current_speaker_id = Some(speaker_id.to_string());
        self.emit(DiscussionEvent::SpeakerStarted {
            agent_id: speaker_id.to_string(),
        });
        self.emit_snapshot(&state);
        Some(token)
    }

    fn end_turn(&self) {
        let mut state = self.lock_state();
        state.current_abort = None;
        if state.current_speaker_id.take().is_some() {
            self.emit_snapshot(&state);
        }
    }

    /// Count a finished turn; false when the discussion changed meanwhile
    fn complete_turn(&self, discussion_id: &str, speaker_id: &str, message_id: &str) -> bool {
        let mut state = self.lock_state();
        if state.discussion_id.as_deref() != Some(discussion_id) {
            return false;
        }
        state.processed += 1;
        tracing::info!(
            agent_id = %speaker_id,
            message_id = %message_id,
            processed = state.processed,
            round_limit = state.round_limit,
            "Turn completed"
        );
        self.emit(DiscussionEvent::TurnCompleted {
            agent_id: speaker_id.to_string(),
            message_id: message_id.to_string(),
            processed: state.processed,
        });
        self.emit_snapshot(&state);
        true
    }

    /// Author of the reply an action result came from, so the actor speaks next
    async fn origin_author(&self, trigger: &Message) -> Result<Option<String>, DiscussionError> {
        let Message::ActionResult(report) = trigger else {
            return Ok(None);
        };
        let origin = self
            .store
            .get_message(&report.origin_message_id)
            .await
            .map_err(|e| DiscussionError::store("Failed to load action origin", e))?;
        Ok(origin.map(|m| m.agent_id().to_string()))
    }

    /// One speaker turn: the reply plus any actions it carries
    async fn take_turn(
        &self,
        discussion_id: &str,
        agent: &AgentDef,
        trigger: &Message,
        members: &[AgentDef],
        can_use_actions: bool,
        cancel: CancellationToken,
    ) -> Result<Message, DiscussionError> {
        let reply = self
            .responder
            .respond(ResponseRequest {
                discussion_id,
                agent,
                agent_id: &agent.id,
                trigger,
                members,
                can_use_actions,
                cancel: cancel.clone(),
            })
            .await?;

        if !can_use_actions || cancel.is_cancelled() {
            return Ok(reply);
        }

        match self.actions.run(&reply, can_use_actions).await? {
            Some(result) => Ok(result),
            None => Ok(reply),
        }
    }

    async fn reach_round_limit(
        &self,
        discussion_id: &str,
        limit: usize,
    ) -> Result<(), DiscussionError> {
        tracing::info!(discussion_id = %discussion_id, limit, "Round limit reached");
        metrics::record_round_limit();
        self.store
            .create_message(MessageDraft::system(
                discussion_id,
                format!(
                    "Reached the limit of {} rounds. The discussion is paused; resume to continue.",
                    limit
                ),
            ))
            .await
            .map_err(|e| DiscussionError::store("Failed to post round limit notice", e))?;
        self.reload.reload().await;

        self.emit(DiscussionEvent::RoundLimitReached { limit });
        self.pause();
        Ok(())
    }
}
