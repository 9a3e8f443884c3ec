//! Roles command implementation.

use procrate_exporter::config::Config;
use procrate_exporter::process::ProcScanner;

/// Lists configured roles with the processes currently matching them
pub fn command_roles(verbose: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let scanner = ProcScanner::new(config.role_rules());
    let mut candidates = scanner.candidates();
    candidates.sort_by_key(|c| (c.start_time_ticks, c.observation.pid));

    println!("🎭 Configured roles");
    println!("==================");

    for rule in scanner.rules() {
        println!("\n{}", rule.role);
        if verbose {
            if !rule.matches.is_empty() {
                println!("   matches:         {}", rule.matches.join(", "));
            }
            if !rule.cmdline_matches.is_empty() {
                println!("   cmdline_matches: {}", rule.cmdline_matches.join(", "));
            }
        }

        let matching: Vec<_> = candidates
            .iter()
            .filter(|c| c.observation.role == rule.role)
            .collect();
        if matching.is_empty() {
            println!("   ⚠️  no matching process");
            continue;
        }
        // Candidates are sorted oldest first; the first one is reported.
        for (idx, c) in matching.iter().enumerate() {
            let marker = if idx == 0 { "✅" } else { "  " };
            println!(
                "   {} pid {:>7}  cpu {:>10.2}s  rss {:>6} MB",
                marker,
                c.observation.pid,
                c.observation.cpu_time_seconds,
                c.observation.rss_bytes / 1024 / 1024
            );
        }
    }

    Ok(())
}
