use crate::error::AttemptError;
use crate::models::{Quiz, QuizResult};
use crate::runner::{AttemptSnapshot, QuizRunner, ResultSink, SubmitTrigger, TickOutcome};
use crate::timer::{format_clock, is_low_time};
use crate::ws_protocol::{WsEnvelope, ATTEMPT_ABANDONED, QUIZ_SUBMITTED, TIMER_TICK};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};
use uuid::Uuid;

type Reply<T> = oneshot::Sender<Result<T, AttemptError>>;

enum Command {
    Snapshot(Reply<AttemptSnapshot>),
    SelectOption {
        question_id: String,
        option_id: String,
        reply: Reply<AttemptSnapshot>,
    },
    SetText {
        question_id: String,
        value: String,
        reply: Reply<AttemptSnapshot>,
    },
    Next(Reply<AttemptSnapshot>),
    Previous(Reply<AttemptSnapshot>),
    Submit {
        confirmed: bool,
        reply: Reply<QuizResult>,
    },
    Abandon(Reply<()>),
}

/// Cheap handle to an attempt task. All mutations of the attempt go through
/// this handle and are applied in order by the task, interleaved with timer
/// ticks.
#[derive(Clone)]
pub struct AttemptHandle {
    pub id: Uuid,
    pub quiz_id: String,
    pub user_id: Option<String>,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<WsEnvelope>,
}

impl AttemptHandle {
    pub fn spawn(
        id: Uuid,
        quiz: Arc<Quiz>,
        user_id: Option<String>,
        tick_period: Duration,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let (commands, rx) = mpsc::channel(32);
        let (events, _) = broadcast::channel(128);
        let quiz_id = quiz.id.clone();
        let runner = QuizRunner::new(id, quiz, sink);
        tokio::spawn(run_attempt(runner, rx, events.clone(), tick_period));
        info!(attempt_id = %id, quiz_id = %quiz_id, "attempt started");
        Self {
            id,
            quiz_id,
            user_id,
            commands,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEnvelope> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, AttemptError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| AttemptError::Closed)?;
        response.await.map_err(|_| AttemptError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<AttemptSnapshot, AttemptError> {
        self.request(Command::Snapshot).await
    }

    pub async fn select_option(&self, question_id: &str, option_id: &str) -> Result<AttemptSnapshot, AttemptError> {
        let question_id = question_id.to_string();
        let option_id = option_id.to_string();
        self.request(|reply| Command::SelectOption {
            question_id,
            option_id,
            reply,
        })
        .await
    }

    pub async fn set_text_answer(&self, question_id: &str, value: &str) -> Result<AttemptSnapshot, AttemptError> {
        let question_id = question_id.to_string();
        let value = value.to_string();
        self.request(|reply| Command::SetText {
            question_id,
            value,
            reply,
        })
        .await
    }

    pub async fn go_next(&self) -> Result<AttemptSnapshot, AttemptError> {
        self.request(Command::Next).await
    }

    pub async fn go_previous(&self) -> Result<AttemptSnapshot, AttemptError> {
        self.request(Command::Previous).await
    }

    pub async fn submit(&self, confirmed: bool) -> Result<QuizResult, AttemptError> {
        self.request(|reply| Command::Submit { confirmed, reply }).await
    }

    /// Stops the attempt without a result. The task exits afterwards, as it
    /// does once the attempt is submitted.
    pub async fn abandon(&self) -> Result<(), AttemptError> {
        self.request(Command::Abandon).await
    }
}

fn tick_event(remaining: u32) -> WsEnvelope {
    WsEnvelope::now(
        TIMER_TICK,
        json!({
            "remainingSeconds": remaining,
            "display": format_clock(remaining),
            "lowTime": is_low_time(remaining),
        }),
    )
}

fn submitted_event(trigger: SubmitTrigger, result: &QuizResult) -> WsEnvelope {
    WsEnvelope::now(QUIZ_SUBMITTED, json!({ "trigger": trigger, "result": result }))
}

async fn run_attempt(
    mut runner: QuizRunner,
    mut commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<WsEnvelope>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    // Every handle is gone; nobody can observe the attempt any more.
                    runner.abandon();
                    break;
                };
                if !handle_command(&mut runner, command, &events) {
                    break;
                }
            }
            _ = ticker.tick(), if runner.is_active() => {
                match runner.tick() {
                    TickOutcome::Running(remaining) => {
                        let _ = events.send(tick_event(remaining));
                    }
                    TickOutcome::AutoSubmitted(result) => {
                        let _ = events.send(tick_event(0));
                        let _ = events.send(submitted_event(SubmitTrigger::Timer, &result));
                        break;
                    }
                    TickOutcome::Idle => {}
                }
            }
        }
    }
    debug!(attempt_id = %runner.attempt_id(), "attempt task stopped");
}

/// Returns false once the task should stop.
fn handle_command(runner: &mut QuizRunner, command: Command, events: &broadcast::Sender<WsEnvelope>) -> bool {
    match command {
        Command::Snapshot(reply) => {
            let _ = reply.send(Ok(runner.snapshot()));
        }
        Command::SelectOption {
            question_id,
            option_id,
            reply,
        } => {
            let outcome = runner
                .select_option(&question_id, &option_id)
                .map(|_| runner.snapshot());
            let _ = reply.send(outcome);
        }
        Command::SetText {
            question_id,
            value,
            reply,
        } => {
            let outcome = runner
                .set_text_answer(&question_id, &value)
                .map(|_| runner.snapshot());
            let _ = reply.send(outcome);
        }
        Command::Next(reply) => {
            let outcome = runner.go_next().map(|_| runner.snapshot());
            let _ = reply.send(outcome);
        }
        Command::Previous(reply) => {
            let outcome = runner.go_previous().map(|_| runner.snapshot());
            let _ = reply.send(outcome);
        }
        Command::Submit { confirmed, reply } => {
            let outcome = runner.submit(confirmed);
            let finalized = outcome.is_ok();
            if let Ok(result) = &outcome {
                let _ = events.send(submitted_event(SubmitTrigger::Manual, result));
            }
            let _ = reply.send(outcome);
            if finalized {
                return false;
            }
        }
        Command::Abandon(reply) => {
            if runner.abandon() {
                let _ = events.send(WsEnvelope::now(
                    ATTEMPT_ABANDONED,
                    json!({ "attemptId": runner.attempt_id() }),
                ));
            }
            let _ = reply.send(Ok(()));
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use crate::runner::tests::CountingSink;
    use crate::runner::RunnerStatus;
    use tokio::time::timeout;

    fn spawn(tick_ms: u64) -> (AttemptHandle, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let handle = AttemptHandle::spawn(
            Uuid::new_v4(),
            Arc::new(water_quiz()),
            None,
            Duration::from_millis(tick_ms),
            sink.clone(),
        );
        (handle, sink)
    }

    async fn next_event(rx: &mut broadcast::Receiver<WsEnvelope>, name: &str) -> WsEnvelope {
        loop {
            let env = rx.recv().await.unwrap();
            if env.event == name {
                return env;
            }
        }
    }

    #[tokio::test]
    async fn commands_update_the_attempt() {
        let (handle, sink) = spawn(60_000);
        let snap = handle.select_option("q1", "o2").await.unwrap();
        assert_eq!(snap.answers["q1"], vec!["o2"]);
        let snap = handle.go_next().await.unwrap();
        assert_eq!(snap.current_question_index, 1);
        handle.set_text_answer("q2", "Water").await.unwrap();

        assert_eq!(handle.submit(false).await, Err(AttemptError::NotConfirmed));
        assert_eq!(handle.snapshot().await.unwrap().status, RunnerStatus::Active);

        let result = handle.submit(true).await.unwrap();
        assert_eq!(result.correct_count, 2);
        assert_eq!(handle.submit(true).await, Err(AttemptError::Closed));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn timer_expiry_auto_submits() {
        let (handle, sink) = spawn(2);
        let mut events = handle.subscribe();
        handle.select_option("q1", "o2").await.unwrap();

        let env = timeout(Duration::from_secs(5), next_event(&mut events, QUIZ_SUBMITTED))
            .await
            .unwrap();
        assert_eq!(env.payload["trigger"], "timer");
        assert_eq!(env.payload["result"]["correctCount"], 1);

        assert_eq!(handle.go_next().await, Err(AttemptError::Closed));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn manual_submit_stops_a_running_timer() {
        let (handle, sink) = spawn(5);
        handle.go_next().await.unwrap();
        let mut events = handle.subscribe();
        handle.submit(true).await.unwrap();

        let env = timeout(Duration::from_secs(5), next_event(&mut events, QUIZ_SUBMITTED))
            .await
            .unwrap();
        assert_eq!(env.payload["trigger"], "manual");

        // Well past the point where the 60 ticks would have expired.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.calls.lock().unwrap()[0].1, SubmitTrigger::Manual);
        assert_eq!(handle.snapshot().await.unwrap_err(), AttemptError::Closed);
    }

    #[tokio::test]
    async fn abandon_stops_the_task() {
        let (handle, sink) = spawn(1);
        let mut events = handle.subscribe();
        handle.abandon().await.unwrap();
        let env = next_event(&mut events, ATTEMPT_ABANDONED).await;
        assert_eq!(env.payload["attemptId"], handle.id.to_string());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.snapshot().await.unwrap_err(), AttemptError::Closed);
        assert_eq!(sink.count(), 0);
    }
}
