//! Application constants for commute-stats
//!
//! Default values, calendar name tables and parameter store key names
//! used throughout the processor.

// =============================================================================
// Parameter Store Keys
// =============================================================================

/// Default hierarchical prefix for all parameters
pub const DEFAULT_PARAMETER_PREFIX: &str = "/commute";

/// Category holding database connection and table identity parameters
pub const DATABASE_CATEGORY: &str = "database";

/// Category holding runtime configuration such as routes
pub const CONFIG_CATEGORY: &str = "config";

/// Parameter name (under the config category) carrying the routes JSON
pub const ROUTES_PARAMETER: &str = "routes";

/// Database parameters that must be present for a run
pub const REQUIRED_DATABASE_KEYS: &[&str] = &["host", "user", "pass", "name", "table", "stats/table"];

/// Default MySQL port when `<prefix>/database/port` is absent
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

// =============================================================================
// Processing Defaults
// =============================================================================

/// Default schema document path
pub const DEFAULT_SCHEMA_PATH: &str = "schema.yml";

/// First year enumerated when no floor is configured
pub const DEFAULT_FROM_YEAR: i32 = 2018;

/// Local time zone used for calendar grouping
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Column holding the UTC sample timestamp
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "timestamp";

/// Column holding the measured duration
pub const DEFAULT_DURATION_COLUMN: &str = "duration_in_traffic";

/// Default connect timeout for the database transport
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Substituted when a group has no samples so that every statistic,
/// including the sample variance, has at least two points. Empty groups
/// therefore report zeros.
pub const EMPTY_SAMPLE_FALLBACK: [f64; 2] = [0.0, 0.0];

/// Class interval used by the grouped median
pub const MEDIAN_GROUPED_INTERVAL: f64 = 1.0;

// =============================================================================
// Calendar Names
// =============================================================================

/// Month names as produced by `MONTHNAME()`, calendar order
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Weekday names as produced by `DAYNAME()`, Monday first
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Highest valid hour in a schedule window
pub const MAX_HOUR: u32 = 23;

// =============================================================================
// Results Table Fields
// =============================================================================

/// Record key fields, in addition to one field per statistic
pub mod fields {
    pub const ID: &str = "id";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const WEEKDAY: &str = "weekday";
    pub const SCHEDULE: &str = "schedule";
    pub const SCHEDULE_START: &str = "schedule_start";
    pub const SCHEDULE_END: &str = "schedule_end";
}

/// Separator joined between fingerprint parts, client and server side
pub const FINGERPRINT_SEPARATOR: &str = "|";
