//! Device persistence: the online/offline bookkeeping C4 drives on
//! connect/disconnect, and the stale-state reset C12 runs at boot.

use sqlx::PgPool;

use crate::error::AppResult;

/// Ensure a `(device_id, user_id)` row exists, updating `user_id` if the
/// device reconnects under a different account (re-login on the same
/// physical device).
pub async fn ensure_device(pool: &PgPool, device_id: i64, user_id: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO devices (device_id, user_id) VALUES ($1, $2) \
         ON CONFLICT (device_id) DO UPDATE SET user_id = EXCLUDED.user_id, updated_at = now()",
    )
    .bind(device_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Best-effort mark a device online. Driven by C4 on a successful
/// sign-in; failures are logged by the caller, not propagated as a
/// connection-fatal error.
pub async fn mark_online(pool: &PgPool, device_id: i64, address: Option<&str>) -> AppResult<()> {
    sqlx::query(
        "UPDATE devices SET online = true, last_address = $2, updated_at = now() WHERE device_id = $1",
    )
    .bind(device_id)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(())
}

/// Best-effort mark a device offline. Driven by C4 on disconnect, and by
/// C12 at boot to clear stale state from an unclean prior shutdown.
pub async fn mark_offline(pool: &PgPool, device_id: i64) -> AppResult<()> {
    sqlx::query("UPDATE devices SET online = false, updated_at = now() WHERE device_id = $1")
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// C12 step 6: clear every stale `online = true` row left over from a
/// previous, uncleanly terminated process. A fresh process always starts
/// with an empty Connection Registry, so any row still marked online at
/// boot is stale by construction.
pub async fn reset_all_offline(pool: &PgPool) -> AppResult<u64> {
    let result = sqlx::query("UPDATE devices SET online = false WHERE online = true")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
