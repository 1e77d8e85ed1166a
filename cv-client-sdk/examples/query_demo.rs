//! CV Backend Query Example
//!
//! Asks a few questions for one session, schedules an interview and prints
//! the backend's health.
//!
//! To run this example:
//! ```
//! BACKEND_URL=http://localhost:8000 cargo run --example query_demo
//! ```

use std::sync::Arc;

use anyhow::Context;
use cv_client_sdk::{
    init_logging, BackendClient, BackendConfig, ConfidenceBand, LoggingConfig, ResponseFormat,
    SessionContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(Some(LoggingConfig::default())).context("installing log subscriber")?;

    println!("CV Backend Query Example");

    let config = BackendConfig::from_env().context("loading backend configuration")?;
    let session = Arc::new(SessionContext::new());
    let client = BackendClient::builder()
        .config(config)
        .session(session.clone())
        .build()
        .context("building backend client")?;

    let health = client.get_health_status().await;
    println!("Backend is {} ({:.0} ms)", health.status, health.latency_ms);

    let questions = [
        ("What programming languages do you know?", "Bullet points"),
        ("Tell me about your work experience", "Detailed"),
        ("Summarize your background", "Summary"),
    ];

    for (question, label) in questions {
        println!("\n> {}", question);
        let result = client
            .query_with_format(question, Some(ResponseFormat::from_label(label)))
            .await;

        match result.error() {
            None => {
                println!("{}", result.content());
                if let Some(score) = result.confidence_score() {
                    println!("(confidence {:.2}, {:?})", score, ConfidenceBand::from_score(score));
                }
            }
            Some(error) => {
                println!("Failed: {}", error);
                println!("{}", error.kind.guidance());
            }
        }
    }

    let interview = client
        .schedule_interview("Monday, Jan 1", "9:00-10:00", "recruiter@example.com")
        .await;
    println!("\nInterview: {}", interview.message());

    println!(
        "\nSession {}: {} messages, circuit {}",
        session.session_id(),
        session.message_count(),
        client.circuit_status()
    );

    Ok(())
}
