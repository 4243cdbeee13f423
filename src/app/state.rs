//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{MatchOutcome, MatchRegistry};
use crate::rooms::RoomService;
use crate::store::ResultsClient;
use crate::tournament::TournamentService;
use crate::ws::fanout::Fanout;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fanout: Arc<Fanout>,
    pub store: Arc<ResultsClient>,
    pub registry: Arc<MatchRegistry>,
    pub tournaments: Arc<TournamentService>,
    pub rooms: Arc<RoomService>,
}

impl AppState {
    /// Build the service graph. The returned receiver carries finished match
    /// outcomes; the caller wires it into the tournament engine.
    pub fn new(config: Config) -> (Self, mpsc::UnboundedReceiver<MatchOutcome>) {
        let config = Arc::new(config);

        let fanout = Arc::new(Fanout::new());
        let store = Arc::new(ResultsClient::new(&config));

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(MatchRegistry::new(fanout.clone(), store.clone(), outcome_tx));

        let tournaments = Arc::new(TournamentService::new(registry.clone(), fanout.clone()));
        let rooms = Arc::new(RoomService::new(
            registry.clone(),
            tournaments.clone(),
            fanout.clone(),
        ));

        (
            Self {
                config,
                fanout,
                store,
                registry,
                tournaments,
                rooms,
            },
            outcome_rx,
        )
    }
}
