// src/common/db_utils.rs

use sqlx::{pool::PoolConnection, PgPool, Postgres};

use crate::common::error::AppError;

/// Chave do advisory lock que protege o ciclo de sync.
pub const SYNC_CYCLE_LOCK_KEY: i64 = 0x5ABA_0C41;

// ---
// Helper de lock: segura uma conexão dedicada enquanto o lock estiver ativo.
// Advisory locks de sessão pertencem à conexão, então ela não pode voltar
// para a pool antes do unlock.
// ---
pub(crate) async fn try_advisory_lock(
    pool: &PgPool,
    key: i64,
) -> Result<Option<PoolConnection<Postgres>>, AppError> {
    // O operador '?' converte automaticamente sqlx::Error -> AppError::DatabaseError
    let mut conn = pool.acquire().await?;

    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(key)
        .fetch_one(&mut *conn)
        .await?;

    Ok(acquired.then_some(conn))
}

/// Em caso de erro a conexão é fechada: o lock morre com a sessão em vez de
/// voltar para a pool preso a ela.
pub(crate) async fn release_advisory_lock(
    mut conn: PoolConnection<Postgres>,
    key: i64,
) -> Result<(), AppError> {
    let released = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
        .bind(key)
        .fetch_one(&mut *conn)
        .await;

    match released {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!("Advisory lock {} não pertencia a esta sessão", key);
            Ok(())
        }
        Err(e) => {
            if let Err(close_err) = conn.close().await {
                tracing::warn!("Falha ao fechar a conexão do lock {}: {}", key, close_err);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn backend_pid(conn: &mut PoolConnection<Postgres>) -> i32 {
        sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut **conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Precisa de um Postgres em DATABASE_URL
    async fn failed_unlock_does_not_return_the_session_to_the_pool() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
        let key = SYNC_CYCLE_LOCK_KEY + 1;

        let mut conn = try_advisory_lock(&pool, key).await.unwrap().unwrap();
        let locked_pid = backend_pid(&mut conn).await;

        // Transação abortada: o unlock falha nesta sessão
        sqlx::query("BEGIN").execute(&mut *conn).await.unwrap();
        assert!(sqlx::query("SELECT 1/0").execute(&mut *conn).await.is_err());
        assert!(release_advisory_lock(conn, key).await.is_err());

        let mut fresh = pool.acquire().await.unwrap();
        assert_ne!(backend_pid(&mut fresh).await, locked_pid);
    }
}
