// Flotilla Store
//
// INTENTION:
// Durable SQLite persistence for the Sent and Received notification
// streams, behind the same store contract the in-memory implementation
// serves. The database connection lives on a dedicated worker thread; the
// async side talks to it over a command channel, so no executor thread
// ever blocks on disk I/O.

pub mod sqlite;

pub use sqlite::SqliteNotificationStore;
