use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{self, AlertService, ThumbnailService};
use crate::logging;
use crate::realtime;
use crate::supabase;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let log_file = cfg.log.file.clone().or_else(config::default_log_path);
    logging::init(cfg.log.debug, log_file.as_deref());

    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let mut alert_service: Option<Arc<dyn AlertService>> = None;
    let mut thumbnail_service: Option<Arc<dyn ThumbnailService>> = None;
    let mut bridge: Option<realtime::Bridge> = None;
    let mut realtime_events = None;
    let mut preview_records = Vec::new();
    let status: String;

    let has_credentials =
        !cfg.supabase.url.trim().is_empty() && !cfg.supabase.key.trim().is_empty();

    if has_credentials {
        let client = Arc::new(
            supabase::Client::new(supabase::ClientConfig {
                url: cfg.supabase.url.clone(),
                key: cfg.supabase.key.clone(),
                http_client: None,
            })
            .context("initialize backend client")?,
        );

        let alerts: Arc<dyn AlertService> =
            Arc::new(data::SupabaseAlertService::new(client.clone()));
        let thumbnails: Arc<dyn ThumbnailService> =
            Arc::new(data::SupabaseThumbnailService::new(client.clone()));
        alert_service = Some(alerts);
        thumbnail_service = Some(thumbnails);

        if cfg.realtime.enabled {
            match realtime::Bridge::connect(realtime::Options {
                changes_url: client.changes_url(),
                access_key: client.access_key().to_string(),
                reconnect_delay: cfg.realtime.reconnect_delay,
                http_client: None,
            }) {
                Ok((connected, events)) => {
                    bridge = Some(connected);
                    realtime_events = Some(events);
                }
                Err(err) => {
                    logging::error(format!("realtime bridge unavailable: {err:#}"));
                }
            }
        }

        status =
            "Monitoring media alerts. Press j/k to navigate, Enter to expand, q to quit."
                .to_string();
    } else {
        status = format!(
            "Set supabase.url and supabase.key in {display_path} to connect."
        );
        preview_records = vec![
            preview_record(
                "welcome",
                "Bienvenido a Medios-TUI",
                "Monitor media-mention alerts from your terminal. Configure the backend to load live data.",
            ),
            preview_record(
                "shortcuts",
                "Atajos",
                "j/k move, Enter expand, r refresh, m load more, / filter, s sort, v play, c capture, h hide, q quit.",
            ),
        ];
    }

    let options = ui::Options {
        status_message: status,
        alert_service,
        thumbnail_service,
        realtime_events,
        page_size: cfg.feed.page_size,
        video_command: cfg.player.video_command.clone(),
        config_path: display_path,
        preview_records,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    if let Some(bridge) = bridge {
        bridge.shutdown();
    }

    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/medios-tui/config.yaml".to_string()
    }
}

fn preview_record(id: &str, title: &str, body: &str) -> supabase::AlertRecord {
    supabase::AlertRecord {
        id: id.to_string(),
        termino_detectado: Some(supabase::Terms::One(title.to_string())),
        contexto: Some(body.to_string()),
        nombre_archivo: Some(format!("{title} 000.mp4")),
        ..supabase::AlertRecord::default()
    }
}
