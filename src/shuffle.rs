use crate::error::ShuffleError;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// External reordering service for question texts. The result is used as
/// returned; no ordering guarantee is assumed.
pub trait QuestionShuffler: Send + Sync {
    fn shuffle(&self, questions: Vec<String>) -> BoxFuture<'static, anyhow::Result<Vec<String>>>;
}

/// Uniform random permutation, used when no remote shuffler is configured.
#[derive(Clone, Default)]
pub struct LocalShuffler;

impl QuestionShuffler for LocalShuffler {
    fn shuffle(&self, mut questions: Vec<String>) -> BoxFuture<'static, anyhow::Result<Vec<String>>> {
        questions.shuffle(&mut rand::thread_rng());
        Box::pin(async move { Ok(questions) })
    }
}

#[derive(Debug, Serialize)]
struct ShuffleRequest<'a> {
    questions: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShuffleResponse {
    shuffled_questions: Vec<String>,
}

#[derive(Clone)]
pub struct HttpShuffler {
    pub endpoint: String,
    client: reqwest::Client,
}

impl HttpShuffler {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

impl QuestionShuffler for HttpShuffler {
    fn shuffle(&self, questions: Vec<String>) -> BoxFuture<'static, anyhow::Result<Vec<String>>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let response = client
                .post(&endpoint)
                .json(&ShuffleRequest { questions: &questions })
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("shuffle service returned {}: {}", status, body.trim());
            }
            let payload: ShuffleResponse = response.json().await?;
            Ok(payload.shuffled_questions)
        })
    }
}

/// Drops blank entries, rejects an empty list, then defers to `shuffler`.
pub async fn shuffle_questions(
    shuffler: &dyn QuestionShuffler,
    questions: Vec<String>,
) -> Result<Vec<String>, ShuffleError> {
    let questions: Vec<String> = questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.is_empty() {
        return Err(ShuffleError::Empty);
    }
    let count = questions.len();
    let shuffled = shuffler.shuffle(questions).await.map_err(|err| {
        warn!("question shuffle failed: {:#}", err);
        ShuffleError::Upstream(err)
    })?;
    if shuffled.len() != count {
        warn!(expected = count, got = shuffled.len(), "shuffler changed the number of questions");
    }
    Ok(shuffled)
}
