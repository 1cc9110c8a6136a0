//! Single writer actor.
//!
//! SQLite allows one writer at a time, so every write funnels through one
//! dedicated thread that owns a pooled connection. Each job runs inside an
//! immediate transaction and is rolled back when it returns an error.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use bistro_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Keeps diesel's own errors apart from the job's error while inside the transaction.
enum TxError {
    Diesel(diesel::result::Error),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

#[derive(Clone, Debug)]
pub struct WriteHandle {
    sender: mpsc::UnboundedSender<Job>,
}

pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("sqlite-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    error!("Writer actor could not acquire a connection: {}", err);
                    return;
                }
            };
            while let Some(job) = receiver.blocking_recv() {
                job(&mut *conn);
            }
        });
    if let Err(err) = spawned {
        error!("Failed to start writer actor thread: {}", err);
    }

    WriteHandle { sender }
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn: &mut SqliteConnection| {
            let outcome = conn
                .immediate_transaction::<T, TxError, _>(|tx_conn| job(tx_conn).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Diesel(e) => Error::from(StorageError::from(e)),
                    TxError::Job(e) => e,
                });
            let _ = reply.send(outcome);
        });

        self.sender.send(wrapped).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Writer actor is not running".to_string(),
            ))
        })?;

        response.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Writer actor dropped the job".to_string(),
            ))
        })?
    }
}
