use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::db::Database;
use crate::mailer::Mailer;
use crate::uploads::UploadStore;

/// Shared state handed to every request handler
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub jwt: JwtKeys,
    pub uploads: UploadStore,
    pub mailer: Option<Mailer>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Arc<Self>> {
        let mailer = match config.smtp() {
            Some(settings) => {
                info!("Mail notifications enabled via {}", settings.host);
                Some(Mailer::new(&settings)?)
            }
            None => {
                warn!("SMTP not configured, mail notifications disabled");
                None
            }
        };

        Ok(Arc::new(Self {
            jwt: JwtKeys::from_config(&config),
            uploads: UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes),
            config,
            db,
            mailer,
        }))
    }
}
