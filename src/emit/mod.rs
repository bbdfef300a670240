//! Text rendering: consumes a lowered `Program` and produces source text.
//!
//! Renderers do no shape logic. Everything they print comes from the
//! instruction stream and the buffer plan.

mod hls;

pub use hls::HlsEmitter;

use crate::lower::Program;

/// Renders a lowered program into source lines for one backend.
pub trait Emitter {
    /// Convert a program into output text lines.
    fn emit(&self, program: &Program) -> Vec<String>;

    /// The whole design as one newline-terminated string.
    fn render(&self, program: &Program) -> String {
        let mut text = self.emit(program).join("\n");
        text.push('\n');
        text
    }
}
