//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::AuthService;
use crate::config::Config;
use crate::game::{GameService, MatchRegistry, RoomRegistry};
use crate::social::{FriendService, ProfileService};
use crate::store::{Database, MemoryDatabase, SupabaseClient, SupabaseDatabase};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub profiles: ProfileService,
    pub friends: FriendService,
    pub games: GameService,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let db: Arc<dyn Database> = match &config.supabase {
            Some(supabase) => {
                info!(url = %supabase.url, "Using Supabase storage");
                Arc::new(SupabaseDatabase::new(SupabaseClient::new(supabase)))
            }
            None => {
                warn!("SUPABASE_URL not set, using in-memory storage");
                Arc::new(MemoryDatabase::new())
            }
        };
        Self::with_database(config, db)
    }

    pub fn with_database(config: Config, db: Arc<dyn Database>) -> Self {
        let config = Arc::new(config);

        let auth = AuthService::new(&config, db.clone());
        let profiles = ProfileService::new(db.clone());
        let friends = FriendService::new(db);

        let games = GameService::new(Arc::new(RoomRegistry::new()), Arc::new(MatchRegistry::new()));

        Self {
            config,
            auth,
            profiles,
            friends,
            games,
        }
    }
}
