// -
// Channel

/// Topic every authority publishes flag changes on
pub const DEFAULT_TOPIC: &str = "feature-flags-updates";

// -
// Well-known flags

pub const DARK_MODE_FLAG: &str = "dark_mode";
pub const MAINTENANCE_MODE_FLAG: &str = "maintenance_mode";

// -
// Authority HTTP routes

pub(crate) const FLAGS_PATH: &str = "/api/flags";
pub(crate) const FLAGS_HEALTH_PATH: &str = "/api/flags/health";

/// Body returned by the authority health probe; consumers match on it
pub(crate) const AUTHORITY_HEALTHY_BODY: &str = "Feature Flag Service is healthy";

// -
// Sled database tree namespaces

pub(crate) const FLAGS_TREE: &str = "_flags";
pub(crate) const FLAG_NAMES_TREE: &str = "_flag_names";
