use anyhow::{Context, Result};
use common::sessions::SendMode;
use common::validation::validate_site_id;
use reqwest::Url;
use std::env;

/// Site identifier used when none is configured
pub const DEFAULT_SITE_ID: &str = "none";

#[derive(Debug, Clone)]
pub struct PlateServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Where accepted detections are posted (optional)
    pub transport_url: Option<Url>,

    /// Device identifier stamped on every detection report
    pub node_id: String,

    /// Opaque site/venue identifier attached to reports
    pub site_id: String,

    /// Default attachment mode for new sessions
    pub send_mode: SendMode,
}

impl PlateServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("PLATE_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8084".to_string());

        let transport_url = env::var("TRANSPORT_URL")
            .ok()
            .map(|s| Url::parse(&s).context("Invalid TRANSPORT_URL"))
            .transpose()?;

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "plate-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let site_id = env::var("SITE_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_ID.to_string());
        validate_site_id(&site_id).context("Invalid SITE_ID")?;

        let send_mode = match env::var("SEND_MODE") {
            Ok(value) => value
                .parse::<SendMode>()
                .map_err(anyhow::Error::msg)
                .context("Invalid SEND_MODE")?,
            Err(_) => SendMode::default(),
        };

        Ok(Self {
            bind_addr,
            transport_url,
            node_id,
            site_id,
            send_mode,
        })
    }

    /// Standalone configuration with no transport, for embedding and tests
    pub fn standalone(node_id: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            transport_url: None,
            node_id: node_id.into(),
            site_id: DEFAULT_SITE_ID.to_string(),
            send_mode: SendMode::default(),
        }
    }
}
