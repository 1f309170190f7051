//! Vietnamese sentence segmentation.
//!
//! [`segment`] is a pure function of its input and two fixed dictionaries.
//! It has no network or storage dependency.
//!
//! ```rust
//! use askweb::text::segment;
//!
//! let sentences = segment("Bom nguyên tử ra đời năm 1945. Dự án Manhattan dẫn đầu.");
//! assert_eq!(sentences.len(), 2);
//! ```

mod lexicon;
mod patterns;
mod segmenter;

pub use lexicon::{is_abbreviation, is_exception, ABBREVIATIONS, EXCEPTIONS};
pub use patterns::{LexicalClass, SplitAction};
pub use segmenter::{segment, SentenceSegmenter};
