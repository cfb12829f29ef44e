pub mod answers;
pub mod catalog;
pub mod config;
pub mod content;
pub mod cursor;
pub mod error;
pub mod flags;
pub mod handlers;
pub mod models;
pub mod results;
pub mod routes;
pub mod session;
pub mod state;
pub mod timer;
pub mod ws_protocol;

use std::sync::Arc;

pub fn build_state(config: config::Config) -> anyhow::Result<state::AppState> {
    let content: Arc<dyn content::ContentSource> = Arc::new(content::MockContent::new()?);
    Ok(state::AppState::new(content, config))
}
