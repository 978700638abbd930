use colored::*;
use std::io::{self, Write};

/// Ask a yes/no question; anything but y/yes is "no"
pub fn confirm(message: &str) -> io::Result<bool> {
    print!("{} ", message.white().bold());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Display a warning message
pub fn warn(message: &str) {
    println!("{}", format!("Warning: {}", message).yellow().bold());
}

/// Display an info message
pub fn info(message: &str) {
    println!("{}", message.cyan());
}

/// Display a success message
pub fn success(message: &str) {
    println!("{}", message.green().bold());
}

/// Display a dimmed/secondary message
pub fn dimmed(message: &str) {
    println!("{}", message.dimmed());
}
