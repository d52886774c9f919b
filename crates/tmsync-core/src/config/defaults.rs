//! Default values for tmsync configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Server Defaults
// ============================================================================

/// Path appended to the host to reach the versioned API.
pub const API_PATH: &str = "index.php?/api/v2/";

/// Prefix that pagination links carry and that must be stripped before reuse.
pub const API_LINK_PREFIX: &str = "/api/v2/";

/// Request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Number of retries for throttled or transiently failing requests.
pub const DEFAULT_RETRIES: u32 = 3;

/// Status codes that are retried.
pub const RETRY_STATUS_CODES: &[u16] = &[429, 500, 502];

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("tmsync/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Entity Fetching Defaults
// ============================================================================

/// Page size requested when following pagination links.
pub const PAGE_SIZE_HINT: usize = 250;

/// Number of local cases from which ID validation switches from targeted
/// per-ID lookups to a single bulk fetch of the suite's cases.
pub const BULK_VALIDATION_THRESHOLD: usize = 1000;

/// Maximum number of nonexistent case IDs listed in an error message.
pub const NONEXISTENT_IDS_DISPLAY_LIMIT: usize = 20;

/// Remote case field names that may hold the automation identifier.
pub const AUTOMATION_ID_FIELDS: &[&str] = &["custom_automation_id", "custom_case_automation_id"];

// ============================================================================
// Upload Defaults
// ============================================================================

/// Maximum number of concurrent case add/update requests.
pub const DEFAULT_CASE_WORKERS: usize = 10;

/// Maximum number of concurrent result batch submissions.
pub const DEFAULT_RESULT_WORKERS: usize = 5;

/// Number of results submitted per request.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Maximum length of a test case title.
pub const MAX_TITLE_LENGTH: usize = 250;

// ============================================================================
// Report Defaults
// ============================================================================

/// File name of the transient report produced when merging several JUnit files.
pub const MERGED_REPORT_NAME: &str = "Merged_JUnit_report.xml";

/// Project-local config file name.
pub const LOCAL_CONFIG_FILE: &str = "tmsync.toml";
