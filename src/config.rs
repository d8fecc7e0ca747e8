use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the peer set is ordered before it lands in `trusted_domains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerOrder {
    /// Numeric IP order, duplicates removed.
    Sorted,
    /// Relation iteration order with the local unit last, duplicates kept.
    Legacy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Nextcloud installation root; `occ` lives here.
    pub install_dir: PathBuf,
    pub config_php: PathBuf,
    pub php: String,
    /// Account occ runs as through `sudo -u`. Unset runs occ directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as: Option<String>,
    pub peer_relation: String,
    pub peer_order: PeerOrder,
    pub state_file: PathBuf,
    pub http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: "/var/www/nextcloud".into(),
            config_php: "/var/www/nextcloud/config/config.php".into(),
            php: "php".into(),
            run_as: Some("www-data".into()),
            peer_relation: "cluster".into(),
            peer_order: PeerOrder::Sorted,
            state_file: ".unit-state.json".into(),
            http_port: 80,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("nextcloud-charm.toml"))
            .merge(Json::file("nextcloud-charm.json"))
            .merge(Env::prefixed("NEXTCLOUD_CHARM_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Juju runs hooks from the charm directory, but be explicit about it.
        if let Ok(charm_dir) = std::env::var("JUJU_CHARM_DIR") {
            config.state_file = resolve_against(&config.state_file, Path::new(&charm_dir));
        }

        Ok(config)
    }

    pub fn occ_path(&self) -> PathBuf {
        self.install_dir.join("occ")
    }
}

fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
