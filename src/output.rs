//! Plain-text output helpers for CLI commands.

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print a cached payload, pretty-printing it when it is JSON.
pub fn print_payload(raw: &[u8]) {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", String::from_utf8_lossy(raw)),
        },
        Err(_) => println!("{}", String::from_utf8_lossy(raw)),
    }
}
