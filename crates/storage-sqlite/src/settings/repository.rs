use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;

use bistro_core::Result;

use super::model::AppSettingDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::app_settings;

pub struct SettingsRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SettingsRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = app_settings::table
            .find(key)
            .select(app_settings::setting_value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    pub fn list_settings(&self) -> Result<Vec<AppSettingDB>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = app_settings::table
            .order(app_settings::setting_key.asc())
            .select(AppSettingDB::as_select())
            .load::<AppSettingDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    pub async fn upsert_setting(&self, key: String, value: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(app_settings::table)
                    .values(AppSettingDB {
                        setting_key: key,
                        setting_value: value.clone(),
                    })
                    .on_conflict(app_settings::setting_key)
                    .do_update()
                    .set(app_settings::setting_value.eq(value))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn delete_setting(&self, key: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(app_settings::table.find(key))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::db::{create_pool, init, run_migrations, spawn_writer};

    fn setup_db() -> (TempDir, SettingsRepository) {
        let app_data = TempDir::new().expect("tempdir");
        let db_path = init(&app_data.path().to_string_lossy()).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        (app_data, SettingsRepository::new(pool, writer))
    }

    #[tokio::test]
    async fn upsert_overwrites_and_delete_removes() {
        let (_dir, repo) = setup_db();
        assert_eq!(repo.get_setting("cloud_api_url").expect("read"), None);

        repo.upsert_setting("cloud_api_url".to_string(), "http://a".to_string())
            .await
            .expect("insert");
        repo.upsert_setting("cloud_api_url".to_string(), "http://b".to_string())
            .await
            .expect("update");
        assert_eq!(
            repo.get_setting("cloud_api_url").expect("read").as_deref(),
            Some("http://b")
        );
        assert_eq!(repo.list_settings().expect("list").len(), 1);

        repo.delete_setting("cloud_api_url".to_string())
            .await
            .expect("delete");
        assert_eq!(repo.get_setting("cloud_api_url").expect("read"), None);
    }
}
