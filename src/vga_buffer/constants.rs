//! Screen geometry constants for the VGA text buffer.

/// Number of character columns.
pub const BUFFER_WIDTH: usize = 80;

/// Number of character rows.
pub const BUFFER_HEIGHT: usize = 25;
