//! Run notifications
//!
//! [`NotificationSender::send_if_needed`] is a no-op unless the logging
//! section enables notifications. The built-in [`JsonlNotifier`] appends one
//! JSON line per notification to a local endpoint; network transports are
//! left to external senders.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::model::LoggingConfig;
use crate::error::{HegemonError, HegemonResult};

/// Delivers success notifications
pub trait NotificationSender {
    fn send_if_needed(&self, config: &LoggingConfig, message: &str);
}

/// One notification record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Appends notifications as JSON lines to a file endpoint
///
/// Endpoints may be a plain path or a `file://` URL. Anything else is
/// logged and dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlNotifier;

impl JsonlNotifier {
    pub fn new() -> Self {
        Self
    }

    fn endpoint_path(endpoint: &str) -> Option<PathBuf> {
        if let Some(path) = endpoint.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        if endpoint.contains("://") || endpoint.is_empty() {
            return None;
        }
        Some(PathBuf::from(endpoint))
    }

    fn append(path: &Path, notification: &Notification) -> HegemonResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HegemonError::Io(format!("Failed to open notification log: {}", e)))?;

        let json = serde_json::to_string(notification)?;
        writeln!(file, "{}", json)
            .map_err(|e| HegemonError::Io(format!("Failed to write notification: {}", e)))?;
        file.flush()
            .map_err(|e| HegemonError::Io(format!("Failed to flush notification log: {}", e)))?;
        Ok(())
    }
}

impl NotificationSender for JsonlNotifier {
    fn send_if_needed(&self, config: &LoggingConfig, message: &str) {
        if !config.enable_notifications {
            debug!("Notifications disabled, not sending");
            return;
        }

        let Some(endpoint) = config.notification_endpoint.as_deref() else {
            warn!("Notifications enabled but no endpoint configured");
            return;
        };

        let Some(path) = Self::endpoint_path(endpoint) else {
            warn!(endpoint, "Unsupported notification endpoint");
            return;
        };

        let notification = Notification {
            timestamp: Utc::now(),
            message: message.to_string(),
        };
        if let Err(e) = Self::append(&path, &notification) {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}
