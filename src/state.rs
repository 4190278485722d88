use crate::attempt::AttemptHandle;
use crate::config::Config;
use crate::models::{validate_quiz, Quiz, QuizResult};
use crate::runner::{AttemptSnapshot, ResultSink, SubmitTrigger};
use crate::shuffle::QuestionShuffler;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const BUNDLED_CATALOG: &str = include_str!("../fixtures/quizzes.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogSnapshot {
    quizzes: Vec<Quiz>,
}

/// Read-only quiz storage handed to the engine. Quizzes are shared as
/// `Arc<Quiz>` and never mutated while attempts run.
#[derive(Debug, Default)]
pub struct QuizCatalog {
    quizzes: BTreeMap<String, Arc<Quiz>>,
}

impl QuizCatalog {
    pub fn from_quizzes(quizzes: Vec<Quiz>) -> Self {
        let mut map = BTreeMap::new();
        for quiz in quizzes {
            if let Err(issues) = validate_quiz(&quiz) {
                for issue in issues {
                    warn!(
                        quiz_id = %quiz.id,
                        field = %issue.field,
                        "quiz integrity issue: {}",
                        issue.issue
                    );
                }
            }
            if map.contains_key(&quiz.id) {
                warn!(quiz_id = %quiz.id, "duplicate quiz id in catalog, keeping the first one");
                continue;
            }
            map.insert(quiz.id.clone(), Arc::new(quiz));
        }
        Self { quizzes: map }
    }

    pub fn bundled() -> anyhow::Result<Self> {
        let snapshot: CatalogSnapshot = serde_json::from_str(BUNDLED_CATALOG)?;
        Ok(Self::from_quizzes(snapshot.quizzes))
    }

    /// Loads the snapshot at `path`, falling back to the bundled catalog when
    /// the file is missing or unreadable.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let snapshot = path.and_then(|path| {
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("failed to read quiz catalog {}: {}", path, err);
                    return None;
                }
            };
            match serde_json::from_str::<CatalogSnapshot>(&raw) {
                Ok(s) => Some(s),
                Err(err) => {
                    warn!("failed to parse quiz catalog {}: {}", path, err);
                    None
                }
            }
        });
        let catalog = match snapshot {
            Some(s) => Self::from_quizzes(s.quizzes),
            None => Self::bundled()?,
        };
        info!(quizzes = catalog.len(), "quiz catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Quiz>> {
        self.quizzes.get(id).cloned()
    }

    /// Quiz by id, only when `user_id` may see it.
    pub fn get_visible(&self, id: &str, user_id: Option<&str>) -> Option<Arc<Quiz>> {
        self.get(id).filter(|q| q.is_visible_to(user_id))
    }

    pub fn visible_to(&self, user_id: Option<&str>) -> Vec<Arc<Quiz>> {
        self.quizzes
            .values()
            .filter(|q| q.is_visible_to(user_id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResult {
    pub trigger: SubmitTrigger,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip)]
    pub final_state: AttemptSnapshot,
    #[serde(flatten)]
    pub result: QuizResult,
}

/// Keeps finalized results for the presentation layer to pick up.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: DashMap<Uuid, StoredResult>,
}

impl ResultStore {
    pub fn record(&self, final_state: &AttemptSnapshot, trigger: SubmitTrigger, result: &QuizResult) {
        self.results.insert(
            final_state.attempt_id,
            StoredResult {
                trigger,
                submitted_at: Utc::now(),
                final_state: final_state.clone(),
                result: result.clone(),
            },
        );
    }

    pub fn get(&self, attempt_id: &Uuid) -> Option<StoredResult> {
        self.results.get(attempt_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, attempt_id: &Uuid) -> bool {
        self.results.contains_key(attempt_id)
    }
}

/// Sink handed to every attempt: records the result, then drops the attempt
/// from the live registry so its task can wind down.
struct CompletionSink {
    results: Arc<ResultStore>,
    attempts: Arc<DashMap<Uuid, AttemptHandle>>,
}

impl ResultSink for CompletionSink {
    fn accept(&self, final_state: &AttemptSnapshot, trigger: SubmitTrigger, result: &QuizResult) {
        self.results.record(final_state, trigger, result);
        self.attempts.remove(&final_state.attempt_id);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<QuizCatalog>,
    pub attempts: Arc<DashMap<Uuid, AttemptHandle>>,
    pub results: Arc<ResultStore>,
    pub shuffler: Arc<dyn QuestionShuffler>,
    completion: Arc<CompletionSink>,
}

impl AppState {
    pub fn new(config: Config, catalog: QuizCatalog, shuffler: Arc<dyn QuestionShuffler>) -> Self {
        let attempts = Arc::new(DashMap::new());
        let results = Arc::new(ResultStore::default());
        let completion = Arc::new(CompletionSink {
            results: results.clone(),
            attempts: attempts.clone(),
        });
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            attempts,
            results,
            shuffler,
            completion,
        }
    }

    pub fn start_attempt(&self, quiz: Arc<Quiz>, user_id: Option<String>) -> AttemptHandle {
        let id = Uuid::new_v4();
        let handle = AttemptHandle::spawn(
            id,
            quiz,
            user_id,
            self.config.tick_period(),
            self.completion.clone(),
        );
        self.attempts.insert(id, handle.clone());
        // A very short attempt can finalize before it is registered.
        if self.results.contains(&id) {
            self.attempts.remove(&id);
        }
        handle
    }

    /// Live attempt by id. Finalized and abandoned attempts are not listed.
    pub fn attempt(&self, id: &Uuid) -> Option<AttemptHandle> {
        self.attempts.get(id).map(|h| h.value().clone())
    }

    pub fn remove_attempt(&self, id: &Uuid) -> Option<AttemptHandle> {
        self.attempts.remove(id).map(|(_, h)| h)
    }
}
