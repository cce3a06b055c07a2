// SQLite notification store
//
// The rusqlite connection is not Sync, so it is owned by one worker thread
// running a command loop. Each store call sends a command with a oneshot
// reply channel and awaits the answer. The worker being single-threaded
// also makes every status guard race-free: the optimistic transition is
// one conditional UPDATE, and exactly one caller sees a row change.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use flotilla_common::logging::Logger;
use flotilla_node::notify::store::NotificationStore;
use flotilla_node::{
    NotificationRecord, NotificationType, ProcessingStatus, ReceivedNotification, SendStatus,
    SentNotification,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sent_notifications (
    record_id         TEXT PRIMARY KEY,
    notification_id   TEXT NOT NULL,
    from_node         TEXT NOT NULL,
    to_node           TEXT NOT NULL,
    account           TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    payload_json      TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    status            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sent_notification_id
    ON sent_notifications (notification_id);

CREATE TABLE IF NOT EXISTS received_notifications (
    record_id         TEXT PRIMARY KEY,
    notification_id   TEXT NOT NULL,
    from_node         TEXT NOT NULL,
    to_node           TEXT NOT NULL,
    account           TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    payload_json      TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    status            TEXT NOT NULL,
    error             TEXT
);
CREATE INDEX IF NOT EXISTS idx_received_status
    ON received_notifications (status);
CREATE INDEX IF NOT EXISTS idx_received_notification_id
    ON received_notifications (notification_id);
";

enum StoreCommand {
    CreateSent {
        record: NotificationRecord,
        reply_to: oneshot::Sender<Result<SentNotification, String>>,
    },
    UpdateSendStatus {
        record_id: String,
        status: SendStatus,
        reply_to: oneshot::Sender<Result<(), String>>,
    },
    FindSentById {
        notification_id: String,
        reply_to: oneshot::Sender<Result<Option<SentNotification>, String>>,
    },
    CreateReceived {
        record: NotificationRecord,
        reply_to: oneshot::Sender<Result<ReceivedNotification, String>>,
    },
    FindReceivedByStatus {
        status: ProcessingStatus,
        reply_to: oneshot::Sender<Result<Vec<ReceivedNotification>, String>>,
    },
    TransitionReceived {
        record_id: String,
        from: ProcessingStatus,
        to: ProcessingStatus,
        reply_to: oneshot::Sender<Result<bool, String>>,
    },
    MarkFailed {
        record_id: String,
        error: String,
        reply_to: oneshot::Sender<Result<(), String>>,
    },
    FindReceivedFor {
        notification_id: String,
        reply_to: oneshot::Sender<Result<Vec<ReceivedNotification>, String>>,
    },
    Shutdown {
        reply_to: oneshot::Sender<()>,
    },
}

struct StoreWorker {
    connection: Connection,
    receiver: mpsc::Receiver<StoreCommand>,
    logger: Arc<Logger>,
}

impl StoreWorker {
    fn new(
        db_path: PathBuf,
        receiver: mpsc::Receiver<StoreCommand>,
        logger: Arc<Logger>,
    ) -> Result<Self, String> {
        let connection = Connection::open(&db_path).map_err(|e| {
            let msg = format!("cannot open sqlite database {}: {e}", db_path.display());
            logger.error(&msg);
            msg
        })?;
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| format!("cannot apply notification schema: {e}"))?;
        Ok(Self {
            connection,
            receiver,
            logger,
        })
    }

    async fn run(mut self) {
        self.logger.debug("store worker started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                StoreCommand::CreateSent { record, reply_to } => {
                    let _ = reply_to.send(self.create_sent(record));
                }
                StoreCommand::UpdateSendStatus {
                    record_id,
                    status,
                    reply_to,
                } => {
                    let _ = reply_to.send(self.update_send_status(&record_id, status));
                }
                StoreCommand::FindSentById {
                    notification_id,
                    reply_to,
                } => {
                    let _ = reply_to.send(self.find_sent_by_id(&notification_id));
                }
                StoreCommand::CreateReceived { record, reply_to } => {
                    let _ = reply_to.send(self.create_received(record));
                }
                StoreCommand::FindReceivedByStatus { status, reply_to } => {
                    let _ = reply_to.send(self.find_received_by_status(status));
                }
                StoreCommand::TransitionReceived {
                    record_id,
                    from,
                    to,
                    reply_to,
                } => {
                    let _ = reply_to.send(self.transition_received(&record_id, from, to));
                }
                StoreCommand::MarkFailed {
                    record_id,
                    error,
                    reply_to,
                } => {
                    let _ = reply_to.send(self.mark_failed(&record_id, &error));
                }
                StoreCommand::FindReceivedFor {
                    notification_id,
                    reply_to,
                } => {
                    let _ = reply_to.send(self.find_received_for(&notification_id));
                }
                StoreCommand::Shutdown { reply_to } => {
                    let _ = reply_to.send(());
                    break;
                }
            }
        }
        self.logger.debug("store worker finished");
    }

    fn create_sent(&self, record: NotificationRecord) -> Result<SentNotification, String> {
        let sent = SentNotification {
            record_id: Uuid::new_v4().to_string(),
            status: SendStatus::Created,
            record,
        };
        self.connection
            .execute(
                "INSERT INTO sent_notifications
                 (record_id, notification_id, from_node, to_node, account,
                  notification_type, payload_json, created_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    sent.record_id,
                    sent.record.notification_id,
                    sent.record.from_node,
                    sent.record.to_node,
                    sent.record.account,
                    sent.record.notification_type.as_str(),
                    sent.record.payload_json,
                    sent.record.created_at.to_rfc3339(),
                    sent.status.as_str(),
                ],
            )
            .map_err(|e| format!("cannot insert sent record: {e}"))?;
        Ok(sent)
    }

    fn update_send_status(&self, record_id: &str, status: SendStatus) -> Result<(), String> {
        let current: String = self
            .connection
            .query_row(
                "SELECT status FROM sent_notifications WHERE record_id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .map_err(|e| format!("no sent record {record_id}: {e}"))?;
        let current = SendStatus::from_str(&current).map_err(|e| e.to_string())?;
        if status.rank() <= current.rank() {
            return Err(format!(
                "send status of {record_id} cannot move from {current} to {status}"
            ));
        }
        self.connection
            .execute(
                "UPDATE sent_notifications SET status = ?2 WHERE record_id = ?1",
                params![record_id, status.as_str()],
            )
            .map_err(|e| format!("cannot update send status: {e}"))?;
        Ok(())
    }

    fn find_sent_by_id(&self, notification_id: &str) -> Result<Option<SentNotification>, String> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT record_id, notification_id, from_node, to_node, account,
                        notification_type, payload_json, created_at, status
                 FROM sent_notifications WHERE notification_id = ?1
                 ORDER BY created_at LIMIT 1",
            )
            .map_err(|e| e.to_string())?;
        let mut rows = stmt
            .query_map(params![notification_id], row_to_sent)
            .map_err(|e| e.to_string())?;
        match rows.next() {
            Some(row) => row.map(Some).map_err(|e| e.to_string()),
            None => Ok(None),
        }
    }

    fn create_received(&self, record: NotificationRecord) -> Result<ReceivedNotification, String> {
        let received = ReceivedNotification {
            record_id: Uuid::new_v4().to_string(),
            status: ProcessingStatus::Received,
            error: None,
            record,
        };
        self.connection
            .execute(
                "INSERT INTO received_notifications
                 (record_id, notification_id, from_node, to_node, account,
                  notification_type, payload_json, created_at, status, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
                params![
                    received.record_id,
                    received.record.notification_id,
                    received.record.from_node,
                    received.record.to_node,
                    received.record.account,
                    received.record.notification_type.as_str(),
                    received.record.payload_json,
                    received.record.created_at.to_rfc3339(),
                    received.status.as_str(),
                ],
            )
            .map_err(|e| format!("cannot insert received record: {e}"))?;
        Ok(received)
    }

    fn find_received_by_status(
        &self,
        status: ProcessingStatus,
    ) -> Result<Vec<ReceivedNotification>, String> {
        self.query_received(
            "SELECT record_id, notification_id, from_node, to_node, account,
                    notification_type, payload_json, created_at, status, error
             FROM received_notifications WHERE status = ?1
             ORDER BY created_at",
            status.as_str(),
        )
    }

    fn transition_received(
        &self,
        record_id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<bool, String> {
        let exists: bool = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM received_notifications WHERE record_id = ?1",
                params![record_id],
                |row| row.get::<_, i64>(0).map(|n| n > 0),
            )
            .map_err(|e| e.to_string())?;
        if !exists {
            return Err(format!("no received record {record_id}"));
        }
        let changed = self
            .connection
            .execute(
                "UPDATE received_notifications SET status = ?3
                 WHERE record_id = ?1 AND status = ?2",
                params![record_id, from.as_str(), to.as_str()],
            )
            .map_err(|e| format!("cannot transition received record: {e}"))?;
        Ok(changed == 1)
    }

    fn mark_failed(&self, record_id: &str, error: &str) -> Result<(), String> {
        let exists: bool = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM received_notifications WHERE record_id = ?1",
                params![record_id],
                |row| row.get::<_, i64>(0).map(|n| n > 0),
            )
            .map_err(|e| e.to_string())?;
        if !exists {
            return Err(format!("no received record {record_id}"));
        }
        // terminal records are left untouched
        self.connection
            .execute(
                "UPDATE received_notifications SET status = 'failed', error = ?2
                 WHERE record_id = ?1 AND status IN ('received', 'processing')",
                params![record_id, error],
            )
            .map_err(|e| format!("cannot mark received record failed: {e}"))?;
        Ok(())
    }

    fn find_received_for(
        &self,
        notification_id: &str,
    ) -> Result<Vec<ReceivedNotification>, String> {
        self.query_received(
            "SELECT record_id, notification_id, from_node, to_node, account,
                    notification_type, payload_json, created_at, status, error
             FROM received_notifications WHERE notification_id = ?1
             ORDER BY created_at",
            notification_id,
        )
    }

    fn query_received(&self, sql: &str, arg: &str) -> Result<Vec<ReceivedNotification>, String> {
        let mut stmt = self.connection.prepare(sql).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![arg], row_to_received)
            .map_err(|e| e.to_string())?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| e.to_string())
    }
}

fn parse_created_at(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_record(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    let type_raw: String = row.get(5)?;
    let created_raw: String = row.get(7)?;
    let notification_type = NotificationType::from_str(&type_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(NotificationRecord {
        notification_id: row.get(1)?,
        from_node: row.get(2)?,
        to_node: row.get(3)?,
        account: row.get(4)?,
        notification_type,
        payload_json: row.get(6)?,
        created_at: parse_created_at(&created_raw)?,
    })
}

fn row_to_sent(row: &Row<'_>) -> rusqlite::Result<SentNotification> {
    let status_raw: String = row.get(8)?;
    let status = SendStatus::from_str(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(SentNotification {
        record_id: row.get(0)?,
        status,
        record: parse_record(row)?,
    })
}

fn row_to_received(row: &Row<'_>) -> rusqlite::Result<ReceivedNotification> {
    let status_raw: String = row.get(8)?;
    let status = ProcessingStatus::from_str(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(ReceivedNotification {
        record_id: row.get(0)?,
        status,
        error: row.get(9)?,
        record: parse_record(row)?,
    })
}

/// SQLite-backed implementation of the notification store contract.
pub struct SqliteNotificationStore {
    sender: mpsc::Sender<StoreCommand>,
}

impl SqliteNotificationStore {
    /// Open (or create) the database at `db_path` and start the worker.
    pub async fn open(db_path: impl Into<PathBuf>, logger: Arc<Logger>) -> Result<Self> {
        let db_path = db_path.into();
        let (sender, receiver) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("store worker runtime");
            runtime.block_on(async move {
                match StoreWorker::new(db_path, receiver, logger.clone()) {
                    Ok(worker) => {
                        let _ = ready_tx.send(Ok(()));
                        worker.run().await;
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });
        });

        ready_rx
            .await
            .map_err(|_| anyhow!("store worker exited before signalling readiness"))?
            .map_err(|e| anyhow!(e))?;
        Ok(Self { sender })
    }

    /// Stop the worker thread. Further store calls fail.
    pub async fn close(&self) -> Result<()> {
        let (reply_to, reply) = oneshot::channel();
        self.sender
            .send(StoreCommand::Shutdown { reply_to })
            .await
            .map_err(|_| anyhow!("store worker already stopped"))?;
        reply
            .await
            .map_err(|_| anyhow!("store worker dropped shutdown reply"))
    }

    async fn call<T>(
        &self,
        command: StoreCommand,
        reply: oneshot::Receiver<Result<T, String>>,
    ) -> Result<T> {
        self.sender
            .send(command)
            .await
            .map_err(|_| anyhow!("store worker stopped"))?;
        reply
            .await
            .map_err(|_| anyhow!("store worker dropped reply"))?
            .map_err(|e| anyhow!(e))
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn create_sent(&self, record: NotificationRecord) -> Result<SentNotification> {
        let (reply_to, reply) = oneshot::channel();
        self.call(StoreCommand::CreateSent { record, reply_to }, reply)
            .await
    }

    async fn update_send_status(&self, record_id: &str, status: SendStatus) -> Result<()> {
        let (reply_to, reply) = oneshot::channel();
        self.call(
            StoreCommand::UpdateSendStatus {
                record_id: record_id.to_string(),
                status,
                reply_to,
            },
            reply,
        )
        .await
    }

    async fn find_sent_by_id(&self, notification_id: &str) -> Result<Option<SentNotification>> {
        let (reply_to, reply) = oneshot::channel();
        self.call(
            StoreCommand::FindSentById {
                notification_id: notification_id.to_string(),
                reply_to,
            },
            reply,
        )
        .await
    }

    async fn create_received(&self, record: NotificationRecord) -> Result<ReceivedNotification> {
        let (reply_to, reply) = oneshot::channel();
        self.call(StoreCommand::CreateReceived { record, reply_to }, reply)
            .await
    }

    async fn find_received_by_status(
        &self,
        status: ProcessingStatus,
    ) -> Result<Vec<ReceivedNotification>> {
        let (reply_to, reply) = oneshot::channel();
        self.call(StoreCommand::FindReceivedByStatus { status, reply_to }, reply)
            .await
    }

    async fn transition_received(
        &self,
        record_id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<bool> {
        if to.rank() <= from.rank() {
            return Err(anyhow!("processing status cannot move from {from} to {to}"));
        }
        let (reply_to, reply) = oneshot::channel();
        self.call(
            StoreCommand::TransitionReceived {
                record_id: record_id.to_string(),
                from,
                to,
                reply_to,
            },
            reply,
        )
        .await
    }

    async fn mark_failed(&self, record_id: &str, error: &str) -> Result<()> {
        let (reply_to, reply) = oneshot::channel();
        self.call(
            StoreCommand::MarkFailed {
                record_id: record_id.to_string(),
                error: error.to_string(),
                reply_to,
            },
            reply,
        )
        .await
    }

    async fn find_received_for(
        &self,
        notification_id: &str,
    ) -> Result<Vec<ReceivedNotification>> {
        let (reply_to, reply) = oneshot::channel();
        self.call(
            StoreCommand::FindReceivedFor {
                notification_id: notification_id.to_string(),
                reply_to,
            },
            reply,
        )
        .await
    }
}
