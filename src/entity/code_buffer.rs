//! The pre-code / code / post-code emission buffer
//!
//! Every emission context carries one of these. Writing happens through
//! exactly three operations: `add_code`, `add_code_to_previous_line` and
//! `add_code_to_next_line`.
//!
//! The two modes differ in when the buffers flush:
//!
//! In a plain code entity (`Flushing`), pre-code lands directly above the
//! line currently under construction and post-code flushes below it as soon
//! as a newline arrives. A reference on one line is therefore set up
//! immediately above that line and torn down immediately below it.
//!
//! In a string entity (`Literal`) nothing flushes automatically: setup must
//! stay outside the quoted region, so pre-code and post-code accumulate
//! separately and the enclosing context decides where they go. References
//! inside a multi-line string are resolved before the whole string and
//! cleared after it.

/// A compiled code fragment in three parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSegment {
    pub pre_code: String,
    pub code: String,
    pub post_code: String,
}

impl CodeSegment {
    /// The full segment as one string, with separating newlines only where
    /// needed
    pub fn full_code(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.pre_code);
        if !self.pre_code.is_empty() && !self.pre_code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.code);
        if !self.post_code.is_empty() && !self.code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.post_code);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Plain code entity: buffers flush on newline
    Flushing,
    /// String entity: buffers never flush automatically
    Literal,
}

#[derive(Debug, Clone)]
pub struct CodeBuffer {
    mode: BufferMode,
    /// Finalized output (Flushing mode only)
    emitted: String,
    /// Accumulated pre-code (Literal mode only)
    pre: String,
    /// The line (Flushing) or expression text (Literal) under construction
    line: String,
    /// Accumulated post-code awaiting flush
    post: String,
}

/// True when `text` contains a newline that is not backslash-escaped
fn has_unescaped_newline(text: &str) -> bool {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' && (i == 0 || bytes[i - 1] != b'\\') {
            return true;
        }
    }
    false
}

impl CodeBuffer {
    pub fn code() -> Self {
        Self::new(BufferMode::Flushing)
    }

    pub fn string() -> Self {
        Self::new(BufferMode::Literal)
    }

    pub fn new(mode: BufferMode) -> Self {
        Self {
            mode,
            emitted: String::new(),
            pre: String::new(),
            line: String::new(),
            post: String::new(),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Append to the code buffer. In Flushing mode a newline completes the
    /// current line: the line moves to the output and the post-code buffer
    /// flushes below it.
    pub fn add_code(&mut self, text: &str) {
        self.line.push_str(text);
        if self.mode == BufferMode::Flushing && has_unescaped_newline(text) {
            self.flush_line();
            self.flush_post();
        }
    }

    /// Append without ever triggering a flush, even across a newline
    pub fn add_code_inline(&mut self, text: &str) {
        self.line.push_str(text);
    }

    /// Append setup code that must run before the current line
    pub fn add_code_to_previous_line(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.mode {
            // The pending line has not been emitted yet, so writing straight
            // to the output places the text above it
            BufferMode::Flushing => {
                self.emitted.push_str(text);
                if !text.ends_with('\n') {
                    self.emitted.push('\n');
                }
            }
            BufferMode::Literal => {
                self.pre.push_str(text);
            }
        }
    }

    /// Append teardown code that must run after the current line
    pub fn add_code_to_next_line(&mut self, text: &str) {
        self.post.push_str(text);
    }

    fn flush_line(&mut self) {
        if !self.line.is_empty() {
            self.emitted.push_str(&self.line);
            if !self.line.ends_with('\n') {
                self.emitted.push('\n');
            }
            self.line.clear();
        }
    }

    fn flush_post(&mut self) {
        if !self.post.is_empty() {
            self.emitted.push_str(&self.post);
            if !self.post.ends_with('\n') {
                self.emitted.push('\n');
            }
            self.post.clear();
        }
    }

    /// Emit pre-code, code and post-code in order into the output
    pub fn flush_code_buffers(&mut self) {
        if !self.pre.is_empty() {
            let pre = std::mem::take(&mut self.pre);
            self.emitted.push_str(&pre);
            if !pre.ends_with('\n') {
                self.emitted.push('\n');
            }
        }
        self.flush_line();
        self.flush_post();
    }

    pub fn clear_all_buffers(&mut self) {
        self.emitted.clear();
        self.pre.clear();
        self.line.clear();
        self.post.clear();
    }

    pub fn pre_code(&self) -> &str {
        &self.pre
    }

    pub fn code_line(&self) -> &str {
        &self.line
    }

    pub fn post_code(&self) -> &str {
        &self.post
    }

    /// The finalized output of a Flushing buffer. Flushes any pending line
    /// first.
    pub fn take_output(&mut self) -> String {
        self.flush_code_buffers();
        std::mem::take(&mut self.emitted)
    }

    /// The three Literal-mode buffers as a code segment
    pub fn take_segment(&mut self) -> CodeSegment {
        CodeSegment {
            pre_code: std::mem::take(&mut self.pre),
            code: std::mem::take(&mut self.line),
            post_code: std::mem::take(&mut self.post),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushing_linearization() {
        let mut buf = CodeBuffer::code();
        buf.add_code_to_previous_line("setup\n");
        buf.add_code_to_next_line("teardown\n");
        buf.add_code("echo hi\n");
        assert_eq!(buf.take_output(), "setup\necho hi\nteardown\n");
    }

    #[test]
    fn test_flushing_partial_line() {
        let mut buf = CodeBuffer::code();
        buf.add_code("echo ");
        buf.add_code_to_previous_line("pre\n");
        buf.add_code("${x}");
        buf.add_code_to_next_line("unset tmp\n");
        buf.add_code("\n");
        assert_eq!(buf.take_output(), "pre\necho ${x}\nunset tmp\n");
    }

    #[test]
    fn test_literal_never_flushes() {
        let mut buf = CodeBuffer::string();
        buf.add_code_to_previous_line("pre\n");
        buf.add_code("line one\nline two");
        buf.add_code_to_next_line("post\n");
        assert_eq!(buf.pre_code(), "pre\n");
        assert_eq!(buf.code_line(), "line one\nline two");
        assert_eq!(buf.post_code(), "post\n");
    }

    #[test]
    fn test_escaped_newline_does_not_flush() {
        let mut buf = CodeBuffer::code();
        buf.add_code_to_next_line("post\n");
        buf.add_code("echo a \\\n");
        assert_eq!(buf.code_line(), "echo a \\\n");
        buf.add_code("b\n");
        assert_eq!(buf.take_output(), "echo a \\\nb\npost\n");
    }

    #[test]
    fn test_segment_full_code_separators() {
        let seg = CodeSegment {
            pre_code: "a".into(),
            code: "b".into(),
            post_code: "c".into(),
        };
        assert_eq!(seg.full_code(), "a\nb\nc");
        let seg = CodeSegment::default();
        assert_eq!(seg.full_code(), "");
    }
}
