pub mod attempt;
pub mod config;
pub mod error;
pub mod grading;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod runner;
pub mod session;
pub mod shuffle;
pub mod state;
pub mod timer;
pub mod ws_protocol;

use std::sync::Arc;

pub fn build_state(config: config::Config) -> anyhow::Result<state::AppState> {
    let catalog = state::QuizCatalog::load(config.local_state_path.as_deref())?;
    let shuffler: Arc<dyn shuffle::QuestionShuffler> = match config.shuffle_api_url.as_deref() {
        Some(url) => Arc::new(shuffle::HttpShuffler::new(url, config.shuffle_timeout_secs)?),
        None => Arc::new(shuffle::LocalShuffler),
    };
    Ok(state::AppState::new(config, catalog, shuffler))
}
