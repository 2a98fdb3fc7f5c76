//! Example showing the engine's tracing output for a full mock session.
//!
//! Run with: cargo run -p sunprint-core --example session_tracing

use std::sync::Arc;

use chrono::NaiveDate;
use sunprint_core::{ClientConfig, Edit, HqStep, MockBackend, SessionState};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("sunprint_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Sunprint Session Tracing Demo ===\n");

    let mut session = SessionState::new(Arc::new(MockBackend::demo()), ClientConfig::default());

    let status = session.check_health(|attempt, e| println!("retry {attempt}: {e}")).await;
    println!("Health: {status:?}\n");

    if let Some(task) = session.begin_catalog_resolution() {
        let resolved = session.finish_catalog_resolution(task.run().await);
        println!("Resolved {resolved} products\n");
    }

    let Some(date) = NaiveDate::from_ymd_opt(2024, 5, 10) else {
        return;
    };
    session.select(date, 171);
    let preview = match session.begin_preview() {
        Ok(task) => task,
        Err(e) => {
            eprintln!("Failed to start preview: {e}");
            return;
        }
    };
    if let Err(e) = session.finish_preview(preview.run().await) {
        eprintln!("Preview failed: {e}");
        return;
    }
    if let Err(e) = session.apply_edit(Edit::Contrast(25)) {
        eprintln!("Edit rejected: {e}");
    }

    if let Ok(HqStep::Generate(task)) = session.begin_hq() {
        match session.finish_hq_url(task.run().await) {
            Ok(Some(download)) => {
                let _ = session.finish_hq_image(download.run().await);
            }
            Ok(None) => {}
            Err(e) => eprintln!("HQ failed: {e}"),
        }
    }

    match session.begin_checkout("tote_bag", |s| println!("  -> {:?}: {}", s.step, s.message)) {
        Ok(task) => {
            if let Ok(Some(done)) = session.finish_checkout(task.run().await) {
                println!("\nCheckout finished: {:?}", done.storefront_url);
            }
        }
        Err(e) => println!("\nCheckout refused: {}", e.user_message()),
    }
}
