use std::sync::Arc;

use teloxide::prelude::*;

use pbot_core::router::Sender;

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(msg: Message, state: Arc<AppState>, from: Sender) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let (cmd, _args) = parse_command(text);

    match cmd.as_str() {
        "start" => state.router.show_personas(from.chat_id).await,
        "clear" => state.router.clear_history(from).await,
        other => tracing::debug!(user_id = %from.user_id, command = other, "unknown command"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_addressed_commands() {
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
        assert_eq!(
            parse_command("/Clear@persona_bot  now please "),
            ("clear".to_string(), "now please".to_string())
        );
        assert_eq!(parse_command("  /start@bot"), ("start".to_string(), String::new()));
    }

    #[test]
    fn bare_slash_is_empty_command() {
        assert_eq!(parse_command("/"), (String::new(), String::new()));
    }
}
