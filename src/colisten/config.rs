use serde::Deserialize;

/// Process configuration, read from a JSON file at boot. The path defaults to
/// `config.json` and can be overridden with the `COLISTEN_CONFIG` env var.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub music: MusicConfig,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub persist: Vec<PersistHouse>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MusicConfig {
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub netease: String,
    #[serde(default)]
    pub qq: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
}

/// Administrator-defined room, re-created on every boot and never
/// garbage-collected.
#[derive(Clone, Debug, Deserialize)]
pub struct PersistHouse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub password: String,
}

impl Config {
    pub fn load() -> Config {
        let path = dotenvy::var("COLISTEN_CONFIG").unwrap_or_else(|_| "config.json".to_owned());
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("cannot read config {path}: {err}");
                return Config::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                error!("invalid config {path}: {err}");
                Config::default()
            }
        }
    }
}
