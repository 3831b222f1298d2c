//! Utility functions for display formatting and matching.

pub mod format;

pub use format::{
    contains_ignore_case, format_date, format_phone, parse_date, parse_leading_float, parse_leading_int,
};
