//! Plain text output: just the value, for scripts.

use crate::protocol::Value;

/// Print the optimal value on its own line.
pub fn print_plain(value: Value) {
    println!("{}", value);
}
