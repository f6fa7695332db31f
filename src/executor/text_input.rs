// Layout-safe text injection.
// Some desktops need the keyboard layout switched to a Latin layout before ASCII text
// comes out right; the switch is undone afterwards no matter how injection went.
use std::time::Duration;

use crate::errors::DeskPilotResult;
use crate::executor::input::{InputDriver, KeyChord};

const LAYOUT_SWITCH_SETTLE: Duration = Duration::from_millis(200);

pub fn contains_ascii(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii())
}

/// Injects `text`, wrapped in the layout toggle chord when one is configured and the
/// text contains ASCII characters.
pub async fn type_with_layout(
    input: &dyn InputDriver,
    toggle: Option<&KeyChord>,
    text: &str,
) -> DeskPilotResult<()> {
    let toggle = match toggle {
        Some(chord) if contains_ascii(text) => chord,
        _ => return input.text(text),
    };

    input.key_chord(toggle)?;
    tokio::time::sleep(LAYOUT_SWITCH_SETTLE).await;

    let typed = input.text(text);

    let reverted = input.key_chord(toggle);
    tokio::time::sleep(LAYOUT_SWITCH_SETTLE).await;
    if let Err(e) = &reverted {
        tracing::error!(error = %e, "failed to restore keyboard layout");
    }

    typed.and(reverted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InputCall, RecordingInput};

    fn alt_shift() -> KeyChord {
        KeyChord::parse("alt+shift").unwrap()
    }

    #[tokio::test]
    async fn toggle_wraps_ascii_text() {
        let input = RecordingInput::new(1920, 1080);
        let toggle = alt_shift();
        type_with_layout(&input, Some(&toggle), "hello").await.unwrap();
        assert_eq!(
            input.calls(),
            vec![
                InputCall::Chord(toggle.clone()),
                InputCall::Text("hello".into()),
                InputCall::Chord(toggle),
            ]
        );
    }

    #[tokio::test]
    async fn toggle_is_reverted_when_injection_fails() {
        let input = RecordingInput::new(1920, 1080);
        input.fail_text(true);
        let toggle = alt_shift();
        let result = type_with_layout(&input, Some(&toggle), "abc").await;
        assert!(result.is_err());
        let chords = input
            .calls()
            .into_iter()
            .filter(|c| matches!(c, InputCall::Chord(_)))
            .count();
        assert_eq!(chords, 2);
    }

    #[tokio::test]
    async fn no_toggle_for_non_ascii_or_when_unconfigured() {
        let input = RecordingInput::new(1920, 1080);
        let toggle = alt_shift();
        type_with_layout(&input, Some(&toggle), "привет").await.unwrap();
        type_with_layout(&input, None, "plain").await.unwrap();
        assert_eq!(
            input.calls(),
            vec![
                InputCall::Text("привет".into()),
                InputCall::Text("plain".into()),
            ]
        );
    }
}
