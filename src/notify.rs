//! User-visible notifications raised on access denial.

use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Wrong role or unreadable profile. The two are deliberately indistinguishable.
    AccessDenied,
    AwaitingApproval,
    ModuleNotPurchased,
}

impl NotificationCategory {
    pub fn message(&self) -> &'static str {
        match self {
            NotificationCategory::AccessDenied => "Acesso negado para esta modalidade.",
            NotificationCategory::AwaitingApproval => "Acesso negado. Aguardando homologação do usuário.",
            NotificationCategory::ModuleNotPurchased => "Módulo não contratado. Faça upgrade do seu plano.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notification {
    pub category: NotificationCategory,
    pub message: String,
}

impl From<NotificationCategory> for Notification {
    fn from(category: NotificationCategory) -> Self {
        Self {
            category,
            message: category.message().to_string(),
        }
    }
}

/// Side channel for denial notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to a receiver owned by the caller, e.g. a request
/// handler that returns them in its response body.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // receiver gone means the caller no longer cares
        let _ = self.tx.send(notification);
    }
}
