//! Magic-link delivery via the Resend HTTP API.
//!
//! Delivery is best-effort: a failed or unconfigured send is logged and
//! the link is echoed to the server log so local development works
//! without an email account. Callers never see a delivery error.

use serde_json::json;

use crate::config::EmailConfig;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub async fn send_magic_link(config: &EmailConfig, email: &str, link: &str) {
    let Some(api_key) = config.resend_api_key.as_deref() else {
        tracing::warn!("RESEND_API_KEY not configured; magic link only logged");
        log_link(email, link);
        return;
    };

    let body = json!({
        "from": config.from,
        "to": [email],
        "subject": "Sign in to LLMVerse",
        "html": format!(
            "<div><h1>Welcome to LLMVerse!</h1>\
             <p>Click the link below to sign in:</p>\
             <a href=\"{link}\">Sign In to LLMVerse</a>\
             <p>This link is single-use and will expire shortly.</p></div>"
        ),
    });

    let client = reqwest::Client::new();
    let result = client
        .post(RESEND_ENDPOINT)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::info!("Magic link email sent to {}", email);
        }
        Ok(response) => {
            tracing::error!(
                "Resend rejected magic link email for {}: {}",
                email,
                response.status()
            );
            log_link(email, link);
        }
        Err(e) => {
            tracing::error!("Failed to send magic link email to {}: {}", email, e);
            log_link(email, link);
        }
    }
}

/// Development fallback channel: the link lands in the server log.
fn log_link(email: &str, link: &str) {
    tracing::info!("Magic link for {}: {}", email, link);
}
