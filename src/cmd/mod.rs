//! Command-line entry points.

pub mod ocr;
