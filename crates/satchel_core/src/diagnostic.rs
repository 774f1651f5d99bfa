mod code_frame;
mod code_highlight;

pub use code_frame::CodeFrame;
pub use code_highlight::CodeHighlight;
