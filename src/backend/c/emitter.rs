//! Append-only output sink for generated C text
#![allow(dead_code)]

use crate::utils::Result;

const INDENT: &str = "    ";

pub struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self { out: String::new(), indent: 0 }
    }

    pub fn finish(self) -> String {
        self.out
    }

    /// Write one indented line
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Redirect output into a fresh buffer while `f` runs, then restore the
    /// original sink. The sink is restored even when `f` fails, so a failed
    /// nested compile never leaves the output permanently swapped.
    pub fn capture<F>(&mut self, f: F) -> Result<String>
    where
        F: FnOnce(&mut Emitter) -> Result<()>,
    {
        let saved = std::mem::take(&mut self.out);
        let saved_indent = std::mem::replace(&mut self.indent, 0);
        let result = f(self);
        let captured = std::mem::replace(&mut self.out, saved);
        self.indent = saved_indent;
        result.map(|()| captured)
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Error;

    #[test]
    fn test_indented_lines() {
        let mut em = Emitter::new();
        em.line("struct Point {");
        em.indent();
        em.line("int x;");
        em.dedent();
        em.line("};");
        assert_eq!(em.finish(), "struct Point {\n    int x;\n};\n");
    }

    #[test]
    fn test_capture_returns_nested_output() {
        let mut em = Emitter::new();
        em.line("before");
        let nested = em
            .capture(|em| {
                em.line("inner");
                Ok(())
            })
            .unwrap();
        em.line("after");
        assert_eq!(nested, "inner\n");
        assert_eq!(em.finish(), "before\nafter\n");
    }

    #[test]
    fn test_capture_restores_sink_on_failure() {
        let mut em = Emitter::new();
        em.line("kept");
        let result: Result<String> = em.capture(|em| {
            em.line("discarded");
            Err(Error::Io("nested compile failed".to_string()))
        });
        assert!(result.is_err());
        em.line("still kept");
        assert_eq!(em.finish(), "kept\nstill kept\n");
    }
}
