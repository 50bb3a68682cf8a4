//! Jenkins `cron` specs → GitHub `schedule` entries.
//!
//! GitHub has no hash-based spreading, so `H` picks the lowest value of its
//! range.

/// One schedule entry per non-empty, non-comment line of a spec.
pub fn cron_schedules(spec: &str) -> Vec<String> {
    spec.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("TZ="))
        .filter_map(cron_line)
        .collect()
}

fn cron_line(line: &str) -> Option<String> {
    if let Some(alias) = line.strip_prefix('@') {
        return Some(
            match alias {
                "yearly" | "annually" => "0 0 1 1 *",
                "monthly" => "0 0 1 * *",
                "weekly" => "0 0 * * 0",
                "daily" | "midnight" => "0 0 * * *",
                "hourly" => "0 * * * *",
                _ => return None,
            }
            .to_string(),
        );
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }
    let converted: Vec<String> = fields.iter().map(|f| hash_field(f)).collect();
    Some(converted.join(" "))
}

/// `H` → `0`, `H/15` → `*/15`, `H(8-17)` → `8`, `H(0-29)/10` → `0-29/10`.
fn hash_field(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let Some(rest) = part.strip_prefix('H') else {
                return part.to_string();
            };
            if rest.is_empty() {
                return "0".to_string();
            }
            if let Some(step) = rest.strip_prefix('/') {
                return format!("*/{}", step);
            }
            if let Some(inner) = rest.strip_prefix('(') {
                if let Some((range, tail)) = inner.split_once(')') {
                    let low = range.split('-').next().unwrap_or("0");
                    return match tail.strip_prefix('/') {
                        Some(step) => format!("{}/{}", range, step),
                        None => low.to_string(),
                    };
                }
            }
            part.to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}
