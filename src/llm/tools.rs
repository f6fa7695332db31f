use crate::llm::types::DisplayDescriptor;
use crate::perception::types::ScreenshotArtifact;

pub const COMPUTER_TOOL_NAME: &str = "computer";
pub const COMPUTER_TOOL_TYPE: &str = "computer_20241022";

/// System prompt describing both response encodings, embedded at compile time.
pub fn system_prompt() -> &'static str {
    include_str!("../../prompts/system.md")
}

/// Display declared to the model: the encoded (model-space) size of `shot`.
pub fn display_for(shot: &ScreenshotArtifact) -> DisplayDescriptor {
    DisplayDescriptor {
        width: shot.meta.encoded.width,
        height: shot.meta.encoded.height,
        display_number: 1,
    }
}

/// The single pointer-and-keyboard capability descriptor in the provider's tool format.
pub fn computer_tool(display: &DisplayDescriptor) -> serde_json::Value {
    serde_json::json!({
        "type": COMPUTER_TOOL_TYPE,
        "name": COMPUTER_TOOL_NAME,
        "display_width_px": display.width,
        "display_height_px": display.height,
        "display_number": display.display_number,
    })
}
