//! System check command implementation.

use std::path::Path;

use procrate_exporter::config::{validate_effective_config, Config};
use procrate_exporter::process::{
    collect_proc_entries, parse_stat, ProcScanner, ProcessSource, CLOCK_TICKS, PAGE_SIZE,
};

/// Validates /proc access, configuration and role matching.
pub fn command_check(
    proc: bool,
    roles: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 procrate-exporter - System Check");
    println!("===================================");

    let mut all_ok = true;

    // Check /proc filesystem
    if proc || all {
        println!("\n📁 Checking /proc filesystem...");
        let root = Path::new("/proc");
        if root.exists() {
            println!("   ✅ /proc filesystem accessible");

            let entries = collect_proc_entries(root);
            if entries.is_empty() {
                println!("   ❌ Cannot read any process entries from /proc");
                all_ok = false;
            } else {
                println!("   ✅ Can read {} process entries", entries.len());
            }

            let self_stat = root.join(std::process::id().to_string()).join("stat");
            match std::fs::read_to_string(&self_stat).and_then(|s| parse_stat(&s))
            {
                Ok(stat) => println!(
                    "   ✅ stat parsing successful: cpu={:.2}s vsize={}MB",
                    stat.cpu_time_seconds(),
                    stat.vsize_bytes / 1024 / 1024
                ),
                Err(e) => {
                    println!("   ❌ stat parsing failed: {}", e);
                    all_ok = false;
                }
            }
        } else {
            println!("   ❌ /proc filesystem not found");
            all_ok = false;
        }

        println!(
            "   ℹ️  clock ticks: {}/s, page size: {} bytes",
            *CLOCK_TICKS, *PAGE_SIZE
        );
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    // Check role matching
    if roles || all {
        println!("\n🎭 Checking role matching...");
        let scanner = ProcScanner::new(config.role_rules());
        let found = scanner.sample();
        for rule in scanner.rules() {
            match found.iter().find(|o| o.role == rule.role) {
                Some(obs) => println!("   ✅ {} -> pid {}", rule.role, obs.pid),
                None => println!("   ⚠️  {} -> no matching process", rule.role),
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
