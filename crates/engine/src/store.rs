use leadline_core::errors::ApplicationError;
use leadline_db::{DbPool, RepositoryError};
use sqlx::{Sqlite, Transaction};

pub(crate) type Tx = Transaction<'static, Sqlite>;

pub(crate) async fn begin(pool: &DbPool) -> Result<Tx, ApplicationError> {
    pool.begin().await.map_err(|error| RepositoryError::from(error).into())
}

pub(crate) async fn commit(tx: Tx) -> Result<(), ApplicationError> {
    tx.commit().await.map_err(|error| RepositoryError::from(error).into())
}
