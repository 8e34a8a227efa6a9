use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Single process state, lost on restart
    #[default]
    Memory,
    Mongodb(MongoConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub connection_uri: String,

    #[serde(default = "default_db_name")]
    pub database_name: String,
}

fn default_db_name() -> String {
    "publisher".to_string()
}
