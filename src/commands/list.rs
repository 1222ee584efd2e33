//! List command implementation

use crate::programmers::available_programmers;

/// List all supported programmers
pub fn list_programmers() {
    println!("Supported programmers:");
    println!();

    for p in available_programmers() {
        println!("  {:14} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:14}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}
