/// One parsed frame: `data:` lines joined with newlines, typed by the
/// preceding `event:` line or defaulting to "message".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event_type: String,
    pub data: String,
}

/// Incremental parser over the event-stream wire format. Feed it chunks
/// as they arrive; complete frames come back, partial lines are buffered
/// until the next chunk.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            self.handle_line(line, &mut frames);
        }
        frames
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            // Blank line terminates the frame.
            if !self.data_lines.is_empty() {
                frames.push(SseFrame {
                    event_type: self
                        .event_type
                        .take()
                        .unwrap_or_else(|| "message".to_string()),
                    data: self.data_lines.join("\n"),
                });
                self.data_lines.clear();
            } else {
                self.event_type = None;
            }
        } else if let Some(rest) = line.strip_prefix("data: ") {
            self.data_lines.push(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("event: ") {
            self.event_type = Some(rest.to_string());
        }
        // id:, retry: and comment lines are accepted and ignored.
    }
}
