use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use echo_sessions::models::{Conversation, ConversationKind};
use echo_sessions::services::{AppSettings, SettingsService};
use echo_sessions::{App, AppMsg};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = run_session(SettingsService::load()).await?;
    for conv in app.view() {
        log_row(&conv);
    }
    Ok(())
}

/// Scripted session: a pinned topic, a debug chat that gets a reply, and a
/// scratch chat deleted before its reply lands. Returns the app after shutdown.
async fn run_session(settings: AppSettings) -> Result<App> {
    let reply_wait = Duration::from_millis(settings.reply_delay_ms) * 4;
    let (mut app, mut replies) = App::new(settings);

    app.update(AppMsg::NewChat {
        title: Some("Deploy checklist".to_string()),
        kind: ConversationKind::Topic,
    });
    let pinned = active_id(&app)?;
    app.update(AppMsg::TogglePin(pinned));

    app.update(AppMsg::NewChat {
        title: None,
        kind: ConversationKind::Debug,
    });
    let debug_id = active_id(&app)?;
    app.update(AppMsg::SendMessage(
        debug_id.clone(),
        "Why does the worker restart every hour?".to_string(),
    ));

    let event = tokio::time::timeout(reply_wait, replies.recv())
        .await
        .context("Timed out waiting for the assistant reply")?
        .context("Reply channel closed")?;
    app.handle_cmd(event.into());

    app.update(AppMsg::NewChat {
        title: Some("Scratch".to_string()),
        kind: ConversationKind::General,
    });
    let scratch = active_id(&app)?;
    app.update(AppMsg::SendMessage(scratch.clone(), "never mind".to_string()));
    app.update(AppMsg::DeleteConversation(scratch));

    if let Some(err) = app.last_error() {
        bail!("Session failed: {}", err);
    }

    let transcript = app.export(&debug_id)?;
    tracing::info!("{}", transcript);

    app.shutdown().await;
    Ok(app)
}

fn active_id(app: &App) -> Result<String> {
    app.active_conversation()
        .map(|c| c.id.clone())
        .context("No active conversation")
}

fn log_row(conv: &Conversation) {
    tracing::info!(
        "{} {:<8} {} ({} messages)",
        if conv.pinned { "*" } else { " " },
        conv.kind.as_str(),
        conv.title,
        conv.message_ids.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_session() {
        let app = run_session(AppSettings {
            reply_delay_ms: 50,
            ..Default::default()
        })
        .await
        .unwrap();

        let view = app.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].title, "Deploy checklist");
        assert!(view[0].pinned);
        assert_eq!(view[1].title, "Why does the worker restart every hour?");
        assert_eq!(view[1].message_ids.len(), 2);
        assert!(app.last_error().is_none());
    }
}
