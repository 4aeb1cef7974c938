//! Indented line writer for generated sclang code.

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct ScriptWriter {
    buf: String,
    depth: usize,
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One line at the current indentation; empty text writes a blank line
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.buf.push_str(INDENT);
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
        self
    }

    pub fn lines<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    /// `//` comment, folded onto one line
    pub fn comment(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
        self.line(format!("// {}", text))
    }

    /// Write `text` and indent what follows
    pub fn open(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.line(text);
        self.depth += 1;
        self
    }

    /// Dedent and write `text`
    pub fn close(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(text)
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
