/// One contiguous span of recognized speech.
///
/// `id` is the zero-based position in the model's output order. `text` is kept
/// exactly as the model produced it, leading whitespace included.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(id: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            text: text.into(),
        }
    }
}
