use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::export::CsvMirror;
use crate::mail::OutboxDelivery;
use crate::marksheet::HtmlDocumentRenderer;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub renderer: HtmlDocumentRenderer,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            renderer: HtmlDocumentRenderer,
        }
    }

    /// Mirror sink for the selected workspace.
    pub fn mirror(&self) -> Option<CsvMirror> {
        self.workspace
            .as_ref()
            .map(|ws| CsvMirror::new(self.config.mirror_path(ws)))
    }

    pub fn outbox(&self) -> Option<OutboxDelivery> {
        self.workspace
            .as_ref()
            .map(|ws| OutboxDelivery::new(self.config.outbox_path(ws)))
    }
}
