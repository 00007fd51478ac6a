use sysinfo::{System, SystemExt};

/// Seconds since system boot.
pub fn uptime_secs() -> u64 {
    System::new().uptime()
}

/// Whole hours since system boot.
pub fn uptime_hours() -> u64 {
    uptime_secs() / 3600
}

/// Boot-relative uptime formatted as `HHHH:MM:SS`.
///
/// Appended to artifact filenames so that repeated captures of the same
/// class within one boot never overwrite each other.
pub fn uptime_string() -> String {
    format_uptime(uptime_secs())
}

fn format_uptime(secs: u64) -> String {
    format!("{:04}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_uptime_pads_fields() {
        assert_eq!(format_uptime(0), "0000:00:00");
        assert_eq!(format_uptime(3661), "0001:01:01");
        assert_eq!(format_uptime(36_000 * 360 + 59), "3600:00:59");
    }
}
