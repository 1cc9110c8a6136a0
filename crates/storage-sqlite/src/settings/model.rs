use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(primary_key(setting_key))]
#[diesel(table_name = crate::schema::app_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AppSettingDB {
    pub setting_key: String,
    pub setting_value: String,
}
