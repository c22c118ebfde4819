//! Size units for reports and log lines (1024-based).

/// A binary size unit. The discriminant is the power of 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Byte = 0,
    Kilobyte = 1,
    Megabyte = 2,
    Gigabyte = 3,
}

/// Convert a byte count into `unit`.
pub fn scaled(bytes: u64, unit: Unit) -> f64 {
    (0..unit as u32).fold(bytes as f64, |size, _| size / 1024.0)
}

/// Format a byte count in gigabytes with three decimals, as used in log lines.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.3} Gb", scaled(bytes, Unit::Gigabyte))
}

/// Format a byte count in megabytes with three decimals, as used in CSV reports.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.3}", scaled(bytes, Unit::Megabyte))
}
