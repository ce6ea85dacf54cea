use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Meta,
    Chunk,
    Done,
    Error,
    /// Any `type` this client does not know about. Dispatch ignores it.
    #[serde(other)]
    Unknown,
}

/// One `data: ` line of the chat event stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
