use crate::error::Result;
use crate::events::MonitorEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Получатель пользовательских уведомлений (всплывающие подсказки, лог и т.п.)
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &MonitorEvent) -> Result<()>;
}

/// Уведомления в лог
pub struct LogNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, event: &MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::ErrorOccurred(_) => warn!("Уведомление: {}", event),
            _ => info!("Уведомление: {}", event),
        }
        Ok(())
    }
}

/// Доставлять события сервиса в sink, пока канал не закроется
pub fn spawn_notification_pump(
    mut receiver: broadcast::Receiver<MonitorEvent>,
    sink: Box<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = sink.notify(&event).await {
                        warn!("Не удалось доставить уведомление \"{}\": {}", event, e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Пропущено уведомлений: {}", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm_error;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct RecordingSink {
        delivered: Arc<Mutex<Vec<MonitorEvent>>>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &MonitorEvent) -> Result<()> {
            if matches!(event, MonitorEvent::ErrorOccurred(m) if m == "reject") {
                return Err(fsm_error!(internal, "sink rejected"));
            }
            self.delivered.lock().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pump_delivers_in_order_until_closed() {
        let (sender, receiver) = broadcast::channel(8);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let pump = spawn_notification_pump(
            receiver,
            Box::new(RecordingSink {
                delivered: delivered.clone(),
            }),
        );

        sender.send(MonitorEvent::MonitoringStateChanged(true)).unwrap();
        sender.send(MonitorEvent::ErrorOccurred("reject".into())).unwrap();
        sender.send(MonitorEvent::WindowsMinimized(2)).unwrap();
        drop(sender);

        pump.await.unwrap();
        assert_eq!(
            *delivered.lock(),
            vec![
                MonitorEvent::MonitoringStateChanged(true),
                MonitorEvent::WindowsMinimized(2)
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_survives_lag() {
        let (sender, receiver) = broadcast::channel(2);
        for count in 1..=5 {
            sender.send(MonitorEvent::WindowsRestored(count)).unwrap();
        }
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let pump = spawn_notification_pump(
            receiver,
            Box::new(RecordingSink {
                delivered: delivered.clone(),
            }),
        );
        drop(sender);

        pump.await.unwrap();
        assert_eq!(
            *delivered.lock(),
            vec![MonitorEvent::WindowsRestored(4), MonitorEvent::WindowsRestored(5)]
        );
    }

    #[tokio::test]
    async fn test_log_sink_accepts_everything() {
        let sink = LogNotificationSink;
        assert!(sink.notify(&MonitorEvent::WindowsMinimized(1)).await.is_ok());
        assert!(sink.notify(&MonitorEvent::ErrorOccurred("x".into())).await.is_ok());
    }
}
