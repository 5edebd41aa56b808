use anyhow::Result;
use hydrogen::audio::{AudioClip, AudioStack, AudioStackItem};
use hydrogen::config::WebPoolDesc;
use hydrogen::events::HydrogenEvent;
use hydrogen::singleton;
use std::collections::HashMap;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://example.com/".to_string());

    log::info!("=== Web pool ===");
    run_web_requests(&uri)?;

    log::info!("=== Audio stack ===");
    run_audio_stack()?;

    singleton::shutdown();
    Ok(())
}

fn run_web_requests(uri: &str) -> Result<()> {
    let web = singleton::init(
        WebPoolDesc::default()
            .prewarm_workers(2)
            .request_timeout(Some(Duration::from_secs(10))),
    )?;

    let get_id = web.get(uri, |status, headers, body| {
        log::info!(
            "GET finished with {} ({} headers, {} bytes)",
            status,
            headers.len(),
            body.len()
        );
    })?;
    log::info!("Submitted {}", get_id);

    let mut fields = HashMap::new();
    fields.insert("player".to_string(), "demo".to_string());
    fields.insert("score".to_string(), "42".to_string());
    let form_id = web.form(uri, &fields)?;
    log::info!("Submitted {} (no callback)", form_id);

    let deadline = Instant::now() + Duration::from_secs(15);
    while web.active_requests() > 0 && Instant::now() < deadline {
        for event in web.poll_timeout(Duration::from_millis(250)) {
            match event {
                HydrogenEvent::RequestFailed { request_id, error } => {
                    log::warn!("{} failed: {}", request_id, error)
                }
                other => log::info!("{:?}", other),
            }
        }
    }

    log::info!("Pool stats after requests: {:?}", web.stats()?);
    Ok(())
}

fn run_audio_stack() -> Result<()> {
    let mut stack = AudioStack::default();
    stack.add(
        AudioStackItem::new(AudioClip::new("ambience", 120.0))
            .looping(true)
            .fade(true)
            .start_volume(0.0)
            .target_volume(0.8),
    )?;
    stack.add(AudioStackItem::new(AudioClip::new("door", 0.6)))?;

    let delta = 1.0 / 60.0;
    for frame in 0..240 {
        if frame == 90 {
            log::info!("Fading out ambience");
            stack.fade_out("ambience")?;
        }
        for event in stack.update(delta) {
            log::info!("frame {}: {:?}", frame, event);
        }
        if frame % 30 == 0 {
            if let Some(volume) = stack.get("ambience").and_then(AudioStackItem::volume) {
                log::debug!("ambience volume {:.3}", volume);
            }
        }
    }

    log::info!("Items left: {:?}", stack.keys());
    Ok(())
}
