//! The request/poll session behind one submitted prompt.
//!
//! A session posts the prompt, waits roughly as long as the first card takes
//! to animate, then polls the stage endpoint. After every stage update it
//! waits for the UI to report that the updated card finished animating before
//! polling again. It runs as its own tokio task and talks to the UI only
//! through channels:
//!
//! - [`SessionMessage`]s flow to the UI, tagged with the session generation so
//!   the UI can drop messages from a session it already reset.
//! - Card completions flow back through [`SessionHandle::card_completed`].
//!
//! Cancelling the handle (or dropping it) abandons every pending wait and
//! in-flight request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::backend::{ModelPlan, Stage, StageBackend, StageReport};
use crate::config::{AnimationConfig, ClientConfig, PollingConfig};
use crate::error::{ClientError, ClientResult, RecoveryHint};
use crate::retry::RetryStrategy;

/// Something the session wants the UI to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend accepted the prompt; its plan goes on the first card.
    PlanReceived(ModelPlan),
    /// A poll returned a stage report.
    StageUpdated(StageReport),
    /// A poll failed with a retryable error and will be retried.
    Retrying {
        attempt: u32,
        delay: Duration,
        error: ClientError,
    },
    /// The deploying card finished; nothing more to poll.
    Finished,
    /// The session stopped on an error.
    Failed(ClientError),
}

/// A [`SessionEvent`] stamped with the generation of the session that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub generation: u64,
    pub event: SessionEvent,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished,
    Cancelled,
    Failed(ClientError),
}

/// Owner side of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    generation: u64,
    cancel_sender: watch::Sender<bool>,
    completions: mpsc::UnboundedSender<Stage>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Spawn a session for `prompt` on the current tokio runtime.
    pub fn spawn(
        backend: Arc<dyn StageBackend>,
        config: &ClientConfig,
        prompt: String,
        generation: u64,
        events: mpsc::UnboundedSender<SessionMessage>,
    ) -> Self {
        let (cancel_sender, cancel_receiver) = watch::channel(false);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let session = Session {
            backend,
            animation: config.animation.clone(),
            polling: config.polling.clone(),
            retry: config.polling.retry.strategy(),
            generation,
            events,
            completions: completions_rx,
            cancel: cancel_receiver,
            polls: 0,
        };
        let span = tracing::info_span!("session", generation);
        let task = tokio::spawn(session.run(prompt).instrument(span));

        Self {
            generation,
            cancel_sender,
            completions: completions_tx,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tell the session that the card for `stage` finished animating.
    pub fn card_completed(&self, stage: Stage) {
        // A finished session no longer listens; that is fine.
        let _ = self.completions.send(stage);
    }

    /// Abandon all pending waits and requests of this session.
    pub fn cancel(&self) {
        let _ = self.cancel_sender.send(true);
    }

    /// Wait for the session task to end.
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => SessionOutcome::Cancelled,
            Err(e) => SessionOutcome::Failed(ClientError::Network {
                url: String::new(),
                message: format!("session task panicked: {}", e),
            }),
        }
    }
}

struct Session {
    backend: Arc<dyn StageBackend>,
    animation: AnimationConfig,
    polling: PollingConfig,
    retry: RetryStrategy,
    generation: u64,
    events: mpsc::UnboundedSender<SessionMessage>,
    completions: mpsc::UnboundedReceiver<Stage>,
    cancel: watch::Receiver<bool>,
    polls: u32,
}

impl Session {
    async fn run(mut self, prompt: String) -> SessionOutcome {
        match self.drive(&prompt).await {
            Ok(()) => {
                tracing::info!(polls = self.polls, "session finished");
                let _ = self.emit(SessionEvent::Finished);
                SessionOutcome::Finished
            }
            Err(ClientError::Cancelled) => {
                tracing::info!("session cancelled");
                SessionOutcome::Cancelled
            }
            Err(error) => {
                tracing::error!(error = %error, "session failed");
                let _ = self.emit(SessionEvent::Failed(error.clone()));
                SessionOutcome::Failed(error)
            }
        }
    }

    async fn drive(&mut self, prompt: &str) -> ClientResult<()> {
        // The model request starts work on the backend, so it is never retried.
        let plan = with_cancel(&mut self.cancel, self.backend.request_model(prompt)).await?;
        let estimate = self.animation.reveal_estimate(&plan.webscraping_prompt);
        tracing::info!(
            backend = self.backend.name(),
            wait_ms = estimate.as_millis() as u64,
            "model request accepted"
        );
        self.emit(SessionEvent::PlanReceived(plan))?;

        self.sleep(estimate).await?;

        loop {
            let report = match self.poll().await? {
                Some(report) => report,
                None => {
                    tracing::debug!("empty stage result, polling once more");
                    match self.poll().await? {
                        Some(report) => report,
                        None => continue,
                    }
                }
            };

            let stage = report.stage;
            let timeout = self.card_timeout(&report.summary);
            tracing::info!(stage = %stage, "stage updated");
            // Completions of earlier cards, the first one included, can land
            // after their wait ended. Only the card shown next may end the wait.
            self.discard_completions();
            self.emit(SessionEvent::StageUpdated(report))?;
            self.wait_for_card(stage, timeout).await?;

            if stage.is_terminal() && self.polling.stop_after_deploying {
                return Ok(());
            }
            self.sleep(self.polling.resume_delay()).await?;
        }
    }

    /// One logical poll: the poll delay, the request, and backoff retries.
    async fn poll(&mut self) -> ClientResult<Option<StageReport>> {
        let mut failures = 0;
        let mut delay = self.polling.poll_delay();

        loop {
            self.sleep(delay).await?;

            if self.polling.max_polls != 0 && self.polls >= self.polling.max_polls {
                return Err(ClientError::PollBudgetExhausted(self.polls));
            }
            self.polls += 1;

            match with_cancel(&mut self.cancel, self.backend.request_stage()).await {
                Ok(report) => return Ok(report),
                Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
                Err(error) => {
                    let category = error.category();
                    if !self.retry.should_retry(failures, &category) {
                        return Err(error);
                    }
                    failures += 1;
                    let backoff = self.retry.calculate_delay(failures);
                    delay = match category.recovery_hint() {
                        RecoveryHint::RetryAfter(after) => after.max(backoff),
                        _ => backoff,
                    };
                    tracing::warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "stage poll failed, backing off"
                    );
                    self.emit(SessionEvent::Retrying {
                        attempt: failures,
                        delay,
                        error,
                    })?;
                }
            }
        }
    }

    /// Wait until the UI reports that the card for `stage` finished.
    ///
    /// Gives up after `timeout` and carries on polling, so a UI that never
    /// reports back cannot stall the session.
    async fn wait_for_card(&mut self, stage: Stage, timeout: Duration) -> ClientResult<()> {
        let completions = &mut self.completions;
        let wait = async {
            loop {
                match completions.recv().await {
                    Some(done) if done == stage => return Ok(()),
                    Some(other) => {
                        tracing::trace!(stage = %other, "ignoring completion of another card")
                    }
                    None => return Err(ClientError::Cancelled),
                }
            }
        };
        let bounded = async {
            match tokio::time::timeout(timeout, wait).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(stage = %stage, "card did not report completion, continuing");
                    Ok(())
                }
            }
        };

        with_cancel(&mut self.cancel, bounded).await
    }

    fn discard_completions(&mut self) {
        while let Ok(stale) = self.completions.try_recv() {
            tracing::trace!(stage = %stale, "discarding stale card completion");
        }
    }

    /// Upper bound for a card's reshow plus its own animation.
    fn card_timeout(&self, summary: &str) -> Duration {
        self.polling.reshow_delay() + self.animation.reveal_estimate(summary) * 2
            + Duration::from_secs(5)
    }

    async fn sleep(&mut self, duration: Duration) -> ClientResult<()> {
        with_cancel(&mut self.cancel, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    fn emit(&self, event: SessionEvent) -> ClientResult<()> {
        self.events
            .send(SessionMessage {
                generation: self.generation,
                event,
            })
            .map_err(|_| ClientError::Cancelled)
    }
}

/// Run `fut` unless the session is cancelled first.
async fn with_cancel<T>(
    cancel: &mut watch::Receiver<bool>,
    fut: impl Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
    tokio::select! {
        result = fut => result,
        _ = cancelled(cancel) => Err(ClientError::Cancelled),
    }
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Backend that replays scripted stage answers in order.
    struct ScriptedBackend {
        plan: Mutex<Option<ClientResult<ModelPlan>>>,
        stages: Mutex<VecDeque<ClientResult<Option<StageReport>>>>,
        prompts: Mutex<Vec<String>>,
        stage_calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(
            plan: ClientResult<ModelPlan>,
            stages: Vec<ClientResult<Option<StageReport>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                plan: Mutex::new(Some(plan)),
                stages: Mutex::new(stages.into()),
                prompts: Mutex::new(Vec::new()),
                stage_calls: Mutex::new(Vec::new()),
            })
        }

        fn stage_calls(&self) -> usize {
            self.stage_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StageBackend for ScriptedBackend {
        async fn request_model(&self, prompt: &str) -> ClientResult<ModelPlan> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.plan
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ClientError::malformed("request_model", "called twice")))
        }

        async fn request_stage(&self) -> ClientResult<Option<StageReport>> {
            self.stage_calls.lock().unwrap().push(Instant::now());
            self.stages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Some(StageReport::new(Stage::Deploying, "Deploying model..."))))
        }
    }

    fn plan(prompt: &str) -> ClientResult<ModelPlan> {
        Ok(ModelPlan {
            webscraping_prompt: prompt.to_string(),
            model_type: None,
            data_type: None,
        })
    }

    fn report(stage: Stage, summary: &str) -> ClientResult<Option<StageReport>> {
        Ok(Some(StageReport::new(stage, summary)))
    }

    /// Run a session to the end, acknowledging every stage card at once.
    async fn run_to_end(
        backend: Arc<ScriptedBackend>,
        config: ClientConfig,
    ) -> (Vec<SessionEvent>, SessionOutcome) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(backend, &config, "build me a cat classifier".into(), 7, tx);

        let mut events = Vec::new();
        while let Some(message) = rx.recv().await {
            assert_eq!(message.generation, 7);
            if let SessionEvent::StageUpdated(ref report) = message.event {
                handle.card_completed(report.stage);
            }
            events.push(message.event);
        }
        (events, handle.join().await)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_reaches_deploying() {
        let backend = ScriptedBackend::new(
            plan("searching for cat images"),
            vec![
                report(Stage::Scraping, "found 40 pages"),
                report(Stage::Finetuning, "epoch 1/3"),
                report(Stage::Deploying, "live at endpoint X"),
            ],
        );

        let (events, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(
            backend.prompts.lock().unwrap().clone(),
            vec!["build me a cat classifier".to_string()]
        );
        assert_eq!(
            events,
            vec![
                SessionEvent::PlanReceived(plan("searching for cat images").unwrap()),
                SessionEvent::StageUpdated(StageReport::new(Stage::Scraping, "found 40 pages")),
                SessionEvent::StageUpdated(StageReport::new(Stage::Finetuning, "epoch 1/3")),
                SessionEvent::StageUpdated(StageReport::new(
                    Stage::Deploying,
                    "live at endpoint X"
                )),
                SessionEvent::Finished,
            ]
        );
        assert_eq!(backend.stage_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_for_estimate_and_poll_delay() {
        let backend = ScriptedBackend::new(
            plan("searching for cat images"),
            vec![report(Stage::Deploying, "live")],
        );
        let start = Instant::now();

        let (_, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert_eq!(outcome, SessionOutcome::Finished);
        let first_call = backend.stage_calls.lock().unwrap()[0];
        // 24 chars: 360ms reveal + 1500ms hold/collapse, then the 5s poll delay
        let expected = Duration::from_millis(1860) + Duration::from_secs(5);
        assert!(first_call - start >= expected);
        assert!(first_call - start < expected + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_polled_once_more() {
        let backend = ScriptedBackend::new(
            plan("query"),
            vec![Ok(None), report(Stage::Deploying, "live")],
        );

        let (events, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(backend.stage_calls(), 2);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_empty_results_keep_polling() {
        let backend = ScriptedBackend::new(
            plan("query"),
            vec![Ok(None), Ok(None), Ok(None), report(Stage::Deploying, "live")],
        );

        let (_, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(backend.stage_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_backs_off_then_recovers() {
        let backend = ScriptedBackend::new(
            plan("query"),
            vec![
                Err(ClientError::HttpStatus {
                    url: "http://backend/request_stage/".into(),
                    status: 503,
                }),
                report(Stage::Deploying, "live"),
            ],
        );

        let (events, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert_eq!(outcome, SessionOutcome::Finished);
        assert!(matches!(
            events[1],
            SessionEvent::Retrying {
                attempt: 1,
                error: ClientError::HttpStatus { status: 503, .. },
                ..
            }
        ));
        let calls = backend.stage_calls.lock().unwrap().clone();
        // Second attempt waits the backoff, not another full poll delay
        assert!(calls[1] - calls[0] < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_fails_session() {
        let backend = ScriptedBackend::new(
            plan("query"),
            vec![Err(ClientError::UnknownStage("not_ready".into()))],
        );

        let (events, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        let expected = ClientError::UnknownStage("not_ready".into());
        assert_eq!(outcome, SessionOutcome::Failed(expected.clone()));
        assert_eq!(events.last(), Some(&SessionEvent::Failed(expected)));
        assert_eq!(backend.stage_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let network = || {
            Err(ClientError::Network {
                url: "http://backend/request_stage/".into(),
                message: "connection refused".into(),
            })
        };
        let mut config = ClientConfig::default();
        config.polling.retry.max_attempts = 2;
        let backend = ScriptedBackend::new(plan("query"), vec![network(), network(), network()]);

        let (events, outcome) = run_to_end(Arc::clone(&backend), config).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Failed(ClientError::Network { .. })
        ));
        let retries = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 2);
        assert_eq!(backend.stage_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_request_failure_is_not_retried() {
        let backend = ScriptedBackend::new(
            Err(ClientError::Network {
                url: "http://backend/request_model/".into(),
                message: "connection refused".into(),
            }),
            vec![],
        );

        let (events, outcome) = run_to_end(Arc::clone(&backend), ClientConfig::default()).await;

        assert!(matches!(outcome, SessionOutcome::Failed(_)));
        assert_eq!(events.len(), 1);
        assert_eq!(backend.stage_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_is_enforced() {
        let mut config = ClientConfig::default();
        config.polling.max_polls = 2;
        config.polling.stop_after_deploying = false;
        let backend = ScriptedBackend::new(plan("query"), vec![]);

        let (events, outcome) = run_to_end(Arc::clone(&backend), config).await;

        assert_eq!(
            outcome,
            SessionOutcome::Failed(ClientError::PollBudgetExhausted(2))
        );
        assert_eq!(backend.stage_calls(), 2);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Failed(ClientError::PollBudgetExhausted(2)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_without_further_events() {
        let backend = ScriptedBackend::new(plan("query"), vec![report(Stage::Scraping, "x")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            Arc::clone(&backend) as Arc<dyn StageBackend>,
            &ClientConfig::default(),
            "query".into(),
            1,
            tx,
        );

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, SessionEvent::PlanReceived(_)));

        handle.cancel();
        assert_eq!(handle.join().await, SessionOutcome::Cancelled);
        assert_eq!(rx.recv().await, None);
        assert_eq!(backend.stage_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_first_card_completion_does_not_end_next_wait() {
        let summary = "x".repeat(400);
        let backend = ScriptedBackend::new(
            plan("searching for cat images!"),
            vec![
                report(Stage::Parsing, &summary),
                report(Stage::Deploying, "live"),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            Arc::clone(&backend) as Arc<dyn StageBackend>,
            &ClientConfig::default(),
            "query".into(),
            1,
            tx,
        );

        // 400 chars take 6s to reveal; acknowledge well after that.
        let card_time = Duration::from_millis(8000);
        while let Some(message) = rx.recv().await {
            match message.event {
                SessionEvent::PlanReceived(_) => {
                    // 25 chars reveal in 13 ticks, past the 1875ms estimate.
                    tokio::time::sleep(Duration::from_millis(1890)).await;
                    handle.card_completed(Stage::Parsing);
                }
                SessionEvent::StageUpdated(update) if update.stage == Stage::Parsing => {
                    tokio::time::sleep(card_time).await;
                    handle.card_completed(Stage::Parsing);
                }
                SessionEvent::StageUpdated(update) => handle.card_completed(update.stage),
                _ => {}
            }
        }

        assert_eq!(handle.join().await, SessionOutcome::Finished);
        let calls = backend.stage_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        let config = ClientConfig::default();
        let expected = card_time + config.polling.resume_delay() + config.polling.poll_delay();
        assert!(calls[1] - calls[0] >= expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_card_completion_does_not_stall() {
        let backend = ScriptedBackend::new(
            plan("query"),
            vec![report(Stage::Scraping, "x"), report(Stage::Deploying, "live")],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            Arc::clone(&backend) as Arc<dyn StageBackend>,
            &ClientConfig::default(),
            "query".into(),
            1,
            tx,
        );

        // Never acknowledge any card.
        let mut last = None;
        while let Some(message) = rx.recv().await {
            last = Some(message.event);
        }

        assert_eq!(last, Some(SessionEvent::Finished));
        assert_eq!(handle.join().await, SessionOutcome::Finished);
    }
}
