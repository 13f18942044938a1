use crate::error::AppError;
use sqlx::SqlitePool;

/// 사용자 표시 이름을 등록하거나 갱신합니다.
///
/// 작업을 제출할 때마다 호출되며, 이름이 바뀐 경우에만 updated_at을 갱신합니다.
pub async fn upsert_user(pool: &SqlitePool, id: &str, display_name: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, display_name)
        VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE
        SET display_name = excluded.display_name,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE users.display_name <> excluded.display_name
        "#,
    )
    .bind(id)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(())
}
