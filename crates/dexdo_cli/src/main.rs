//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `dexdo_core` linkage.
//! - Classify due dates passed as arguments for quick local checks.

fn main() {
    println!("dexdo_core ping={}", dexdo_core::ping());
    println!("dexdo_core version={}", dexdo_core::core_version());

    let today = dexdo_core::today_local();
    for due_date in std::env::args().skip(1) {
        let priority = dexdo_core::classify(false, &due_date, today);
        println!("due={due_date} priority={}", priority.label());
    }
}
